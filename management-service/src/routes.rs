//! 管理服务路由模块

use axum::{routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::handlers;
use crate::state::AppState;

/// Declares the documented endpoints of one resource and its router.
///
/// Each endpoint delegates to the generic handler of the same verb.
macro_rules! resource_api {
    ($module:ident, $adapter:ty, $tag:tt, $collection:tt, $item:tt) => {
        pub mod $module {
            use std::sync::Arc;

            use axum::extract::{Path, State};
            use axum::routing::get;
            use axum::{Json, Router};
            use common::errors::AppError;
            use common::response::ApiResponse;
            use mongodb::bson::Document;

            use crate::handlers::{self, ResourceQuery};
            use crate::models::{FindResult, OneOrMany, Page};
            use crate::service::Service;
            use crate::state::AppState;

            type Shared = State<Arc<Service<$adapter>>>;

            /// 查询记录
            #[utoipa::path(
                get,
                path = $collection,
                tag = $tag,
                responses(
                    (status = 200, description = "匹配的记录，启用分页时为分页结构", body = ApiResponse<Page>),
                    (status = 400, description = "查询参数无效")
                )
            )]
            pub async fn find(
                service: Shared,
                query: ResourceQuery,
            ) -> Result<Json<ApiResponse<FindResult>>, AppError> {
                handlers::find(service, query).await
            }

            /// 创建一个或一批对象
            #[utoipa::path(
                post,
                path = $collection,
                tag = $tag,
                request_body = Object,
                responses(
                    (status = 200, description = "已创建的记录"),
                    (status = 400, description = "缺少名称或必填选项")
                )
            )]
            pub async fn create(
                service: Shared,
                query: ResourceQuery,
                body: Json<OneOrMany<Document>>,
            ) -> Result<Json<ApiResponse<OneOrMany<Document>>>, AppError> {
                handlers::create(service, query, body).await
            }

            /// 删除所有匹配查询的对象
            #[utoipa::path(
                delete,
                path = $collection,
                tag = $tag,
                responses(
                    (status = 200, description = "已删除的记录"),
                    (status = 400, description = "查询参数无效")
                )
            )]
            pub async fn remove_all(
                service: Shared,
                query: ResourceQuery,
            ) -> Result<Json<ApiResponse<OneOrMany<Document>>>, AppError> {
                handlers::remove_all(service, query).await
            }

            /// 根据标识获取对象
            #[utoipa::path(
                get,
                path = $item,
                tag = $tag,
                params(
                    ("id" = String, Path, description = "对象名称")
                ),
                responses(
                    (status = 200, description = "对象详情"),
                    (status = 404, description = "对象未找到")
                )
            )]
            pub async fn get_one(
                service: Shared,
                id: Path<String>,
                query: ResourceQuery,
            ) -> Result<Json<ApiResponse<Document>>, AppError> {
                handlers::get(service, id, query).await
            }

            /// 根据标识删除对象
            #[utoipa::path(
                delete,
                path = $item,
                tag = $tag,
                params(
                    ("id" = String, Path, description = "对象名称")
                ),
                responses(
                    (status = 200, description = "已删除的记录"),
                    (status = 404, description = "对象未找到")
                )
            )]
            pub async fn remove(
                service: Shared,
                id: Path<String>,
                query: ResourceQuery,
            ) -> Result<Json<ApiResponse<OneOrMany<Document>>>, AppError> {
                handlers::remove(service, id, query).await
            }

            /// 局部更新（不支持）
            #[utoipa::path(
                patch,
                path = $item,
                tag = $tag,
                params(
                    ("id" = String, Path, description = "对象名称")
                ),
                responses(
                    (status = 501, description = "不支持该方法")
                )
            )]
            pub async fn patch(
                service: Shared,
                id: Path<String>,
            ) -> Result<Json<ApiResponse<Document>>, AppError> {
                handlers::patch(service, id).await
            }

            /// 整体更新（不支持）
            #[utoipa::path(
                put,
                path = $item,
                tag = $tag,
                params(
                    ("id" = String, Path, description = "对象名称")
                ),
                responses(
                    (status = 501, description = "不支持该方法")
                )
            )]
            pub async fn update(
                service: Shared,
                id: Path<String>,
            ) -> Result<Json<ApiResponse<Document>>, AppError> {
                handlers::update(service, id).await
            }

            /// 资源路由
            pub fn router() -> Router<AppState> {
                Router::new()
                    .route($collection, get(find).post(create).delete(remove_all))
                    .route(
                        $item,
                        get(get_one).delete(remove).patch(patch).put(update),
                    )
            }
        }
    };
}

resource_api!(
    databases,
    crate::databases::DatabaseAdapter,
    "databases",
    "/api/databases",
    "/api/databases/{id}"
);
resource_api!(
    collections,
    crate::collections::CollectionAdapter,
    "collections",
    "/api/collections",
    "/api/collections/{id}"
);
resource_api!(
    users,
    crate::users::UserAdapter,
    "users",
    "/api/users",
    "/api/users/{id}"
);

#[derive(OpenApi)]
#[openapi(
    info(
        title = "管理服务 API",
        version = "0.1.0",
        description = "MongoDB 数据库、集合与用户管理微服务"
    ),
    paths(
        databases::find,
        databases::create,
        databases::remove_all,
        databases::get_one,
        databases::remove,
        databases::patch,
        databases::update,
        collections::find,
        collections::create,
        collections::remove_all,
        collections::get_one,
        collections::remove,
        collections::patch,
        collections::update,
        users::find,
        users::create,
        users::remove_all,
        users::get_one,
        users::remove,
        users::patch,
        users::update,
        handlers::health_check,
    ),
    components(schemas(
        common::config::Paginate,
        crate::models::Page,
        handlers::HealthResponse,
    )),
    tags(
        (name = "databases", description = "数据库管理端点"),
        (name = "collections", description = "集合管理端点"),
        (name = "users", description = "用户管理端点"),
        (name = "health", description = "健康检查端点")
    )
)]
pub struct ApiDoc;

/// 创建资源管理路由
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(databases::router())
        .merge(collections::router())
        .merge(users::router())
        .route("/api/health", get(handlers::health_check))
}

/// Builds the full application with middleware and state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::config::AppConfig;
    use mongodb::Client;
    use tower::ServiceExt;

    async fn app() -> Router {
        let config = AppConfig::from_lookup(crate::SERVICE_NAME, |_| None).unwrap();
        let client = Client::with_uri_str(&config.mongodb_url).await.unwrap();
        create_router(AppState::new(config, client).unwrap())
    }

    async fn send(request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app().await.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let request = Request::get("/api/health").body(Body::empty()).unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], crate::SERVICE_NAME);
        assert_eq!(body["database"], "admin");
        assert_eq!(body["paginate"]["default"], 10);
    }

    #[tokio::test]
    async fn test_request_id_is_set() {
        let request = Request::get("/api/health").body(Body::empty()).unwrap();
        let response = app().await.oneshot(request).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_patch_and_put_not_implemented() {
        for method in ["PATCH", "PUT"] {
            let request = Request::builder()
                .method(method)
                .uri("/api/collections/orders")
                .body(Body::empty())
                .unwrap();
            let (status, body) = send(request).await;
            assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
            assert_eq!(body["success"], false);
            assert_eq!(body["error"]["code"], "NOT_IMPLEMENTED");
        }
    }

    #[tokio::test]
    async fn test_create_without_name_is_bad_request() {
        for uri in ["/api/databases", "/api/collections", "/api/users"] {
            let (status, body) = send(json_post(uri, r#"{"capped": true}"#)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn test_create_user_without_password_is_bad_request() {
        let (status, body) = send(json_post("/api/users", r#"{"name": "u"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Password option must be provided"));
    }

    #[tokio::test]
    async fn test_invalid_paginate_override_is_bad_request() {
        let request = Request::get("/api/databases?%24paginate=%7B%22default%22%3A0%7D")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_create_with_malformed_select_is_bad_request() {
        let uri = "/api/collections?%24select=%5B1%5D";
        let (status, body) = send(json_post(uri, r#"{"name": "orders"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let request = Request::get("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        for path in [
            "/api/health",
            "/api/databases",
            "/api/databases/{id}",
            "/api/collections",
            "/api/collections/{id}",
            "/api/users",
            "/api/users/{id}",
        ] {
            assert!(body["paths"].get(path).is_some(), "missing {}", path);
        }
        let item = &body["paths"]["/api/users/{id}"];
        for verb in ["get", "delete", "patch", "put"] {
            assert!(item.get(verb).is_some(), "missing {} on users item", verb);
        }
    }
}
