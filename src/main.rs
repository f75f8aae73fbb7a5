use std::sync::Arc;

use chat_service::{
    config::Config,
    db,
    error::AppError,
    logging, routes,
    services::push::{FcmPush, PushProvider},
    state::AppState,
    storage::{ChatStore, PgStore},
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let config = Arc::new(Config::from_env()?);

    let pool = db::init_pool(&config.database_url)
        .await
        .map_err(|e| AppError::StartServer(format!("db: {e}")))?;
    db::MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| AppError::StartServer(format!("migrations: {e}")))?;

    let store: Arc<dyn ChatStore> = Arc::new(PgStore::new(pool));
    let push: Option<Arc<dyn PushProvider>> = match config.fcm.as_ref() {
        Some(fcm_cfg) => Some(Arc::new(FcmPush::new(fcm_cfg)) as Arc<dyn PushProvider>),
        None => {
            tracing::info!("FCM_API_KEY not set; push delivery disabled");
            None
        }
    };

    let state = AppState::new(config.clone(), store, push);
    let app = routes::build_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%bind_addr, "starting chat-service");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;

    Ok(())
}
