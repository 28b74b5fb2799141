use axum::extract::MatchedPath;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use anyhow::Context;
use capstan_actions::ProviderSet;
use capstan_orchestrator::{TaskRunner, TaskStore};
use capstan_providers::{HttpCloudClient, HttpConsoleClient, HttpVirtClient, ProcessSshClient};
use serde_json::json;

pub mod api;
pub mod events;
pub mod logs;
pub mod store;

use crate::logs::LogManager;
use crate::store::{DeploymentStore, StoreConfig};

/// Shared handles every API handler works with.
#[derive(Clone)]
pub struct AppState {
    pub deployments: Arc<dyn DeploymentStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub runner: Arc<TaskRunner>,
    pub logs: Arc<LogManager>,
}

/// Everything `serve` needs to bring the server up.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

/// Root router: liveness probe plus the JSON API under `/api`.
pub fn app_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api::api_router())
        .layer(
            TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<axum::body::Body>| {
                    let matched_path = request
                        .extensions()
                        .get::<MatchedPath>()
                        .map(MatchedPath::as_str)
                        .unwrap_or(request.uri().path());
                    tracing::debug_span!(
                        "http-request",
                        method = %request.method(),
                        matched_path = matched_path,
                    )
                },
            ),
        )
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .context("Failed to create data directory")?;

    let (deployments, tasks) = store::open_store(&StoreConfig::Redb {
        path: config.data_dir.join("capstan.redb"),
    });

    let providers = build_providers().context("Failed to build provider clients")?;
    let logs = Arc::new(LogManager::new(config.log_dir));
    let runner = Arc::new(TaskRunner::new(tasks.clone(), providers));

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    events::spawn_event_pump(logs.clone(), runner.subscribe(), shutdown_rx);

    let state = AppState {
        deployments,
        tasks,
        runner,
        logs,
    };
    let app = app_router().with_state(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!(
        "Capstan server listening on http://{}",
        listener.local_addr().context("Failed to get local address")?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

/// The provider clients the real server runs with. Tests build an [`AppState`]
/// with mocks instead.
fn build_providers() -> capstan_providers::Result<ProviderSet> {
    Ok(ProviderSet::new(
        Arc::new(HttpCloudClient::new()?),
        Arc::new(HttpVirtClient::new()?),
        Arc::new(ProcessSshClient::new()),
        Arc::new(HttpConsoleClient::new()?),
    ))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn shutdown_signal(shutdown_tx: watch::Sender<()>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.unwrap_or_else(|e| {
            error!("Failed to listen for Ctrl+C: {}", e);
        });
        info!("Received Ctrl+C");
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) = signal(SignalKind::terminate()) {
            signal.recv().await;
            info!("Received SIGTERM");
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let _ = shutdown_tx.send(());
    info!("Shutting down");

    // Force exit if graceful shutdown stalls.
    tokio::spawn(async {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        std::process::exit(0);
    });
}
