//! HTTP route definitions.

mod club;
mod health;
mod records;
mod store;
mod sync;

use crate::AppState;
use axum::Router;

/// Create all API routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(store::routes())
        .merge(sync::routes())
        .merge(club::routes())
        .merge(records::routes())
}
