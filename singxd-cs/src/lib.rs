//! singxd-cs library interface
//!
//! The Creation Service drives the three media pipeline stages (separation,
//! alignment, rendering) behind an HTTP API. Exposed as a library so
//! integration tests can build the router and the pipeline directly.

pub mod api;
pub mod config;
pub mod error;
pub mod invoker;
pub mod pipeline;
pub mod store;
pub mod workspace;

pub use crate::error::{ApiError, ApiResult, PipelineError};

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    Router,
};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::pipeline::Pipeline;
use crate::store::{ArtifactStore, LocalUrlSigner};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Stage orchestration (store, tool invoker, workspaces)
    pub pipeline: Arc<Pipeline>,
    /// Verifies `/artifacts` links; `None` when the store presigns natively
    pub url_signer: Option<LocalUrlSigner>,
    /// Echo raw tool output in error bodies
    pub expose_tool_output: bool,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last server-side error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        url_signer: Option<LocalUrlSigner>,
        expose_tool_output: bool,
    ) -> Self {
        Self {
            pipeline,
            url_signer,
            expose_tool_output,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
///
/// Stage and session routes live under `/api`; `/health` and the signed
/// artifact route sit at the root.
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let api = Router::new()
        .merge(api::separation_routes())
        .merge(api::alignment_routes())
        .merge(api::rendering_routes())
        .merge(api::session_routes());

    Router::new()
        .nest("/api", api)
        .merge(api::artifact_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
}

/// Periodically delete expired artifacts until `cancel` fires
pub async fn run_expiry_sweeper(
    store: Arc<dyn ArtifactStore>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; startup sweeps leftovers
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Expiry sweeper stopped");
                return;
            }
            _ = ticker.tick() => {
                match store.sweep_expired().await {
                    Ok(removed) => debug!(removed, "Expiry sweep finished"),
                    Err(e) => warn!(error = %e, "Expiry sweep failed"),
                }
            }
        }
    }
}
