use std::future::Future;
use std::path::Path;

use axum::{
    routing::{get, post},
    Router,
};
use convo_core::config::ServerConfig;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    chat_handler, delete_session_handler, full_history_handler, get_prompt_handler,
    history_handler, list_sessions_handler, prompts_handler, set_prompt_handler,
    use_prompt_handler,
};
use crate::state::AppState;
use crate::ws::ws_handler;

/// All API routes, plus `static_dir` for anything unmatched
pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let app = Router::new()
        .route("/chat", post(chat_handler))
        .route("/sessions", get(list_sessions_handler))
        .route(
            "/sessions/:session_id",
            axum::routing::delete(delete_session_handler),
        )
        .route("/sessions/:session_id/history", get(history_handler))
        .route("/sessions/:session_id/full_history", get(full_history_handler))
        .route(
            "/sessions/:session_id/prompt",
            get(get_prompt_handler).post(set_prompt_handler),
        )
        .route(
            "/sessions/:session_id/use_prompt/:prompt_type",
            post(use_prompt_handler),
        )
        .route("/prompts", get(prompts_handler))
        .route("/ws/:session_id", get(ws_handler))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    };

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind `host:port` and serve until `shutdown` resolves
pub async fn run_server<F>(state: AppState, config: &ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state, config.static_dir.as_deref().map(Path::new));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Server shutting down signal received");
        })
        .await?;

    Ok(())
}

/// Resolves on Ctrl+C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
