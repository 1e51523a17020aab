//! clubsync agent - keeps the local club data in sync with the shared remote
//! document and serves it to the UI over a loopback HTTP API.

use clubsync_agent::transport::{HttpTransport, Offline, RemoteTransport};
use clubsync_agent::{app, AppState, Config, FileBackend, SyncOrchestrator};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clubsync_agent=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting clubsync agent on {}:{}", config.host, config.port);

    // Open local store
    let backend = FileBackend::open(&config.data_path)?;
    tracing::info!(path = %config.data_path.display(), "Local store opened");

    // Remote transport
    let transport: Arc<dyn RemoteTransport> = match &config.sync_endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "Syncing with remote endpoint");
            Arc::new(HttpTransport::new(
                endpoint.clone(),
                config.sync_token.clone(),
                config.request_timeout,
            )?)
        }
        None => {
            tracing::warn!("SYNC_ENDPOINT not set, running offline");
            Arc::new(Offline)
        }
    };

    let orchestrator = SyncOrchestrator::new_shared(backend, transport, config.sync_settings());
    orchestrator.start();

    // Build application state
    let state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        config: Arc::new(config.clone()),
    };

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    orchestrator.stop();

    // flush pending changes before exiting
    if !orchestrator.dirty_keys().is_empty() {
        let outcome = orchestrator.push_now(false).await;
        tracing::info!(?outcome, "Final push");
    }

    Ok(())
}
