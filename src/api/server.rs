//! HTTP server setup and routing

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::crawl::queue::CrawlQueue;
use crate::engine::MoveEngine;
use crate::error::{Error, Result};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub db: SqlitePool,
    pub engine: Arc<dyn MoveEngine>,
    pub queue: CrawlQueue,
    pub config: Arc<Config>,
}

/// Build the router. `/health` and `/analyzePositionFromMatch` are open;
/// everything else authenticates via the `BasicUser` extractor.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route(
            "/analyzePositionFromMatch",
            post(super::handlers::analyze_position_from_match),
        )
        .route("/getQuiz", get(super::handlers::get_quiz))
        .route("/getQuiz/:id", get(super::handlers::get_quiz_by_id))
        .route("/updateQuiz", post(super::handlers::update_quiz))
        .route("/getPlayers", get(super::handlers::get_players))
        .route("/getStatistics", get(super::handlers::get_statistics))
        .route(
            "/addLastMatchesAndSave",
            post(super::handlers::add_last_matches_and_save),
        )
        .route(
            "/addLastMatchesAndSave/stream",
            get(super::sse::crawl_stream),
        )
        .with_state(ctx)
        .layer(CorsLayer::permissive())
}

/// Bind and serve until shutdown.
pub async fn run(ctx: AppContext) -> Result<()> {
    let bind_addr = ctx.config.bind_addr();
    let app = router(ctx);

    info!("Starting HTTP server on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| Error::Internal(format!("failed to bind {}: {}", bind_addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Internal(format!("server error: {}", e)))?;

    Ok(())
}
