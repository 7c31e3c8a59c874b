//! Fleet Control - idle-runner alignment service
//!
//! Aligns every configured pool to its idle policy on a fixed interval and
//! exposes health, status, and metrics endpoints.
//!
//! # HTTP Endpoints
//!
//! ## Health & Readiness
//! - `GET /health` - Health check
//! - `GET /ready` - Ready once a login to the runner service has succeeded
//!
//! ## Observability
//! - `GET /metrics` - Prometheus metrics
//! - `GET /v1/pools` - Outcome of the last pass per pool

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use fleet_control::{AlignmentOutcome, ControlConfig, PoolAligner, PoolTarget, Result};
use fleet_session::{HttpRunnerService, SessionConfig, SessionManager};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type StatusBoard = Arc<RwLock<BTreeMap<String, PoolStatus>>>;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    session: Arc<SessionManager<HttpRunnerService>>,
    pools: StatusBoard,
    metrics: PrometheusHandle,
}

// ============================================================================
// Health Endpoints
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "fleet-control",
    })
}

async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.session.is_authenticated() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not logged in")
    }
}

// ============================================================================
// Observability Endpoints
// ============================================================================

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

/// A runner whose deletion failed in the last pass.
#[derive(Debug, Clone, Serialize)]
struct FailedDeletion {
    runner: String,
    error: String,
}

/// Last pass outcome of one pool.
#[derive(Debug, Clone, Serialize)]
struct PoolStatus {
    pool_id: String,
    min_idle_runners: u32,
    min_idle_runner_age_seconds: u64,
    last_pass: DateTime<Utc>,
    observed: usize,
    idle: usize,
    candidates: usize,
    deleted: Vec<String>,
    failed: Vec<FailedDeletion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl PoolStatus {
    fn new(target: &PoolTarget, result: &Result<AlignmentOutcome>) -> Self {
        let mut status = Self {
            pool_id: target.pool_id.to_string(),
            min_idle_runners: target.policy.min_idle_runners,
            min_idle_runner_age_seconds: target.policy.min_idle_runner_age.as_secs(),
            last_pass: Utc::now(),
            observed: 0,
            idle: 0,
            candidates: 0,
            deleted: Vec::new(),
            failed: Vec::new(),
            error: None,
        };

        match result {
            Ok(outcome) => {
                status.observed = outcome.observed;
                status.idle = outcome.idle;
                status.candidates = outcome.candidates;
                status.deleted = outcome.report.deleted.iter().map(ToString::to_string).collect();
                status.failed = outcome
                    .report
                    .failed
                    .iter()
                    .map(|f| FailedDeletion {
                        runner: f.runner.to_string(),
                        error: f.error.to_string(),
                    })
                    .collect();
            }
            Err(e) => status.error = Some(e.to_string()),
        }
        status
    }
}

/// Last pass outcome of every pool.
///
/// GET /v1/pools
async fn pools_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pools: Vec<PoolStatus> = state.pools.read().values().cloned().collect();
    Json(pools)
}

// ============================================================================
// Router
// ============================================================================

fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & readiness
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        // Observability
        .route("/metrics", get(metrics_handler))
        .route("/v1/pools", get(pools_handler))
        .with_state(state)
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleet=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Fleet Control");

    let metrics = PrometheusBuilder::new().install_recorder()?;

    // Load configuration from environment
    let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let session_config = SessionConfig::from_env()?;
    let control_config = ControlConfig::from_env()?;

    let client = HttpRunnerService::new(session_config.clone())?;
    let base_url = client.base_url().to_string();
    let session = Arc::new(SessionManager::new(client, session_config));
    let aligner = Arc::new(PoolAligner::new(Arc::clone(&session), control_config));

    tracing::info!(
        base_url = %base_url,
        pools = aligner.config().pools.len(),
        sync_interval_secs = aligner.config().sync_interval.as_secs(),
        "Loaded configuration"
    );
    if aligner.config().pools.is_empty() {
        tracing::warn!("FLEET_POOLS is empty, no pool will be aligned");
    }

    let pools: StatusBoard = Arc::default();
    let cancel = CancellationToken::new();

    // Start the alignment loop as a background task
    let loop_aligner = Arc::clone(&aligner);
    let loop_pools = Arc::clone(&pools);
    let loop_cancel = cancel.clone();
    let alignment = tokio::spawn(async move {
        loop_aligner
            .run(loop_cancel, |target, result| {
                loop_pools
                    .write()
                    .insert(target.pool_id.to_string(), PoolStatus::new(target, result));
            })
            .await;
    });

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown requested");
        signal_cancel.cancel();
    });

    let state = AppState {
        session,
        pools,
        metrics,
    };
    let app = create_router(state);

    // Start server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    alignment.await?;
    tracing::info!("Fleet Control stopped");

    Ok(())
}
