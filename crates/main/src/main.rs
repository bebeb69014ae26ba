//! 主应用程序入口
//!
//! 加载配置，装配仓储与实时连接中心，启动 Axum 服务。

use std::sync::Arc;

use application::{
    ChatService, ChatServiceDependencies, Clock, ConversationStore, NotificationRouter,
    RealtimeHub, SystemClock,
};
use config::AppConfig;
use domain::ConversationRepository;
use infrastructure::{create_pg_pool, InMemoryConversationRepository, PgConversationRepository, MIGRATOR};
use tracing_subscriber::EnvFilter;
use web_api::{app, AppState};

async fn build_repository(config: &AppConfig) -> anyhow::Result<Arc<dyn ConversationRepository>> {
    match &config.database.url {
        Some(url) => {
            let pool = create_pg_pool(url, config.database.max_connections).await?;
            MIGRATOR.run(&pool).await?;
            tracing::info!("使用 PostgreSQL 会话存储");
            Ok(Arc::new(PgConversationRepository::new(pool)))
        }
        None => {
            tracing::warn!("未配置 database.url，会话仅保存在内存中");
            Ok(Arc::new(InMemoryConversationRepository::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听退出信号");
    }
    tracing::info!("收到退出信号，停止服务");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let repository = build_repository(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = ConversationStore::new(repository, clock);

    let chat_service = ChatService::new(ChatServiceDependencies {
        hub: Arc::new(RealtimeHub::new()),
        store: Arc::new(store),
        router: NotificationRouter::new(),
    });

    let state = AppState::new(Arc::new(chat_service), &config.realtime);
    let router = app(state, &config.server);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("在线状态服务启动在 http://{}", address);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
