// Meter Anchor - Web Server
// REST surface over the same pipeline the CLI drives

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use meter_anchor::{init_tracing, Config, LedgerRegistry, Pipeline, RunOutcome};

/// Shared application state
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    fn err(data: T, error: String) -> Self {
        Self {
            success: false,
            data,
            error: Some(error),
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/meters/:meter_id/anchor - Run the pipeline for one meter
async fn anchor_meter(
    State(state): State<AppState>,
    Path(meter_id): Path<String>,
) -> impl IntoResponse {
    let outcome = state.pipeline.run(&meter_id).await;

    let status = match &outcome {
        RunOutcome::Anchored { .. } => StatusCode::CREATED,
        RunOutcome::PersistedNotAnchored { .. } => StatusCode::ACCEPTED,
        RunOutcome::NoData { .. } => StatusCode::NOT_FOUND,
        RunOutcome::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let response = if outcome.is_success() {
        ApiResponse::ok(outcome)
    } else {
        let summary = outcome.summary();
        ApiResponse::err(outcome, summary)
    };

    (status, Json(response))
}

/// GET /api/registry/:did/hashes - Hashes anchored for a DID
async fn get_hashes(State(state): State<AppState>, Path(did): Path<String>) -> impl IntoResponse {
    match state.pipeline.registry().hashes(&did).await {
        Ok(hashes) => (StatusCode::OK, Json(ApiResponse::ok(hashes))),
        Err(e) => {
            error!(did = %did, error = %e, "error reading registry");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(Vec::new(), e.to_string())),
            )
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/meters/:meter_id/anchor", post(anchor_meter))
        .route("/api/registry/:did/hashes", get(get_hashes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    let registry = LedgerRegistry::open(&config.ledger_path, config.rpc_url.clone())
        .with_context(|| format!("Failed to open registry ledger at {:?}", config.ledger_path))?;

    let state = AppState {
        pipeline: Arc::new(Pipeline::from_config(&config, Arc::new(registry))),
    };

    let listener = tokio::net::TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server_addr))?;

    info!(addr = %config.server_addr, "meter-anchor server listening");
    axum::serve(listener, router(state)).await?;

    Ok(())
}
