//! MongoDB 管理服务入口

use common::config::AppConfig;
use management_service::routes::create_router;
use management_service::state::AppState;
use management_service::SERVICE_NAME;
use mongodb::Client;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME)?;

    // 创建 MongoDB 客户端（首次操作时才建立连接）
    let client = Client::with_uri_str(&config.mongodb_url).await?;
    let state = AppState::new(config.clone(), client)?;

    let app = create_router(state);

    // 启动服务
    let addr = config.bind_address();
    info!(service = SERVICE_NAME, address = %addr, db = %config.db_name, "启动服务");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
