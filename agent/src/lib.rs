//! clubsync agent - keeps a device's local club data in sync with the shared
//! remote document and serves it to the UI over a loopback HTTP API.
//!
//! The agent owns one [`SyncOrchestrator`]: local writes are persisted
//! immediately and pushed after a short debounce, remote changes are pulled
//! on a fixed interval, and rejected pushes are merged and retried once.

pub mod auth;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod routes;
pub mod storage;
pub mod transport;

pub use config::Config;
pub use error::AgentError;
pub use orchestrator::{PullOutcome, PushOutcome, SyncOrchestrator, SyncSettings, SyncStatus};
pub use storage::FileBackend;
pub use transport::{GetOutcome, RemoteTransport, SetOutcome, TransportError};

use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub config: Arc<Config>,
}

/// Build the local API router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
