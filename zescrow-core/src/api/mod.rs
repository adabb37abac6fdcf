//! REST API
//!
//! Thin JSON wrappers over the escrow context. Every service call is
//! synchronous (DuckDB, file-locked chain state), so handlers hop onto the
//! blocking pool through [`blocking`].

mod error;
mod handlers;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

use crate::services::{LogEvent, LoggingService};
use crate::EscrowContext;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<EscrowContext>,
    logger: Option<Arc<LoggingService>>,
}

impl AppState {
    pub fn new(context: Arc<EscrowContext>) -> Self {
        Self {
            context,
            logger: None,
        }
    }

    /// Record lifecycle events in the event log
    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    fn audit(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            if let Err(e) = logger.log(event) {
                tracing::warn!("failed to write event log: {:#}", e);
            }
        }
    }
}

/// JSON body extractor whose rejections use the API error shape
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

/// Run `f` on the blocking pool
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppState) -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| ApiError::internal(format!("Worker task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Build the router.
pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/status", get(handlers::status))
        .route("/api/wallets", post(handlers::create_wallet))
        .route("/api/wallets/import", post(handlers::import_wallet))
        .route("/api/wallets/:user_id", get(handlers::get_wallet))
        .route("/api/wallets/:user_id/fund", post(handlers::fund_wallet))
        .route("/api/deals", post(handlers::create_deal))
        .route("/api/deals/:deal_id", get(handlers::get_deal))
        .route("/api/deals/:deal_id/transactions", get(handlers::deal_transactions))
        .route("/api/deals/:deal_id/submit", post(handlers::submit_work))
        .route("/api/deals/:deal_id/approve", post(handlers::approve_work))
        .route("/api/deals/:deal_id/dispute", post(handlers::dispute_work))
        .route("/api/deals/:deal_id/resolve", post(handlers::resolve_dispute))
        .route("/api/deals/:deal_id/cancel", post(handlers::cancel_deal))
        .route("/api/users/:user_id/deals", get(handlers::user_deals))
        .route("/api/users/:user_id/intents", get(handlers::user_intents))
        .route("/api/intents/:intent_id", get(handlers::get_intent))
        .route("/api/monitor/check", post(handlers::check_monitor))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` resolves
pub async fn serve<F>(state: AppState, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("zescrow API listening on {}", addr);

    axum::serve(listener, app_router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server failed")?;
    Ok(())
}
