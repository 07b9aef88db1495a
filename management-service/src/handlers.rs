//! Handler模块
//!
//! Handlers are generic over the resource adapter; `routes` mounts one copy
//! per resource.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use common::config::{AppConfig, Paginate};
use common::errors::{AppError, AppResult};
use common::response::ApiResponse;
use mongodb::bson::{Bson, Document};
use serde::Serialize;
use utoipa::ToSchema;

use crate::adapter::ResourceAdapter;
use crate::models::{FindResult, OneOrMany, PaginateParam, Params, RemoveTarget};
use crate::service::Service;
use crate::SERVICE_NAME;

/// Raw query string pairs, in request order.
pub type RawQuery = Vec<(String, String)>;

/// Query string extractor of the resource handlers.
pub type ResourceQuery = Query<RawQuery>;

/// Builds call parameters from a query string.
///
/// `$paginate` and `$db` are transport parameters. Every other value is
/// parsed as JSON when it starts with `{`, `[` or `"` and kept as a string
/// otherwise.
pub fn params_from_query(raw: RawQuery) -> AppResult<Params> {
    let mut params = Params::default();
    let mut query = Document::new();

    for (key, value) in raw {
        match key.as_str() {
            "$paginate" => {
                let paginate: PaginateParam = serde_json::from_str(&value).map_err(|e| {
                    AppError::Validation(format!("invalid $paginate '{}': {}", value, e))
                })?;
                params.paginate = Some(paginate);
            }
            "$db" => params.db = Some(value),
            _ => {
                let parsed = parse_value(&key, value)?;
                query.insert(key, parsed);
            }
        }
    }

    if !query.is_empty() {
        params.query = Some(query);
    }
    Ok(params)
}

fn parse_value(key: &str, value: String) -> AppResult<Bson> {
    if value.starts_with(['{', '[', '"']) {
        serde_json::from_str(&value)
            .map_err(|e| AppError::Validation(format!("invalid JSON for '{}': {}", key, e)))
    } else {
        Ok(Bson::String(value))
    }
}

/// Lists records matching the query string.
pub async fn find<A: ResourceAdapter>(
    State(service): State<Arc<Service<A>>>,
    Query(raw): ResourceQuery,
) -> Result<Json<ApiResponse<FindResult>>, AppError> {
    let params = params_from_query(raw)?;
    let data = service.find(&params).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// Creates one object or a batch.
pub async fn create<A: ResourceAdapter>(
    State(service): State<Arc<Service<A>>>,
    Query(raw): ResourceQuery,
    Json(body): Json<OneOrMany<Document>>,
) -> Result<Json<ApiResponse<OneOrMany<Document>>>, AppError> {
    let params = params_from_query(raw)?;
    let data = service.create(body, &params).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// Removes every record matching the query string.
pub async fn remove_all<A: ResourceAdapter>(
    State(service): State<Arc<Service<A>>>,
    Query(raw): ResourceQuery,
) -> Result<Json<ApiResponse<OneOrMany<Document>>>, AppError> {
    let params = params_from_query(raw)?;
    let data = service.remove(None, &params).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// Returns the normalized record of one object.
pub async fn get<A: ResourceAdapter>(
    State(service): State<Arc<Service<A>>>,
    Path(id): Path<String>,
    Query(raw): ResourceQuery,
) -> Result<Json<ApiResponse<Document>>, AppError> {
    let params = params_from_query(raw)?;
    let data = service.describe(&id, &params).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// Removes one object by identity.
pub async fn remove<A: ResourceAdapter>(
    State(service): State<Arc<Service<A>>>,
    Path(id): Path<String>,
    Query(raw): ResourceQuery,
) -> Result<Json<ApiResponse<OneOrMany<Document>>>, AppError> {
    let params = params_from_query(raw)?;
    let data = service.remove(Some(RemoveTarget::Id(id)), &params).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// Partial updates answer 501.
pub async fn patch<A: ResourceAdapter>(
    State(service): State<Arc<Service<A>>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Document>>, AppError> {
    let data = service.patch(&id, Document::new(), &Params::default()).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// Full updates answer 501.
pub async fn update<A: ResourceAdapter>(
    State(service): State<Arc<Service<A>>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Document>>, AppError> {
    let data = service.update(&id, Document::new(), &Params::default()).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(config): State<AppConfig>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: config.service_name,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        database: config.db_name,
        paginate: config.paginate,
    })
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 集合与用户服务绑定的数据库
    pub database: String,
    /// 默认分页策略
    pub paginate: Paginate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn pairs(raw: &[(&str, &str)]) -> RawQuery {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_plain_values_stay_strings() {
        let params = params_from_query(pairs(&[("name", "123"), ("$limit", "2")])).unwrap();
        assert_eq!(
            params.query.unwrap(),
            doc! { "name": "123", "$limit": "2" }
        );
    }

    #[test]
    fn test_json_values_are_parsed() {
        let params = params_from_query(pairs(&[
            ("name", r#"{"$in": ["a", "b"]}"#),
            ("$sort", r#"{"name": -1}"#),
            ("$select", r#"["name"]"#),
        ]))
        .unwrap();

        let query = params.query.unwrap();
        let names = query.get_document("name").unwrap().get_array("$in").unwrap();
        assert_eq!(names.len(), 2);
        assert!(query.get_document("$sort").unwrap().contains_key("name"));
        assert_eq!(
            query.get_array("$select").unwrap(),
            &vec![Bson::String("name".into())]
        );
    }

    #[test]
    fn test_transport_params_are_separated() {
        let params = params_from_query(pairs(&[
            ("$paginate", "false"),
            ("$db", "admin"),
        ]))
        .unwrap();
        assert_eq!(params.paginate, Some(PaginateParam::Flag(false)));
        assert_eq!(params.db.as_deref(), Some("admin"));
        assert!(params.query.is_none());

        let params =
            params_from_query(pairs(&[("$paginate", r#"{"default": 1, "max": 2}"#)])).unwrap();
        assert_eq!(
            params.paginate,
            Some(PaginateParam::Policy(Paginate::new(1, 2)))
        );
    }

    #[test]
    fn test_malformed_json_is_validation_error() {
        let err = params_from_query(pairs(&[("name", "{oops")])).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = params_from_query(pairs(&[("$paginate", "maybe")])).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
