//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The server exposes the transform store to remote clients: one upsert and
//! one lookup per (workspace, node), both behind session auth. Live updates
//! are not pushed; clients poll the lookup.

pub mod auth;
pub mod transforms;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{delete, get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full API router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/workspaces/{workspace_id}/nodes/{node_id}/transforms",
            get(transforms::find_transforms).post(transforms::store_transforms),
        )
        .route("/api/session", delete(auth::logout))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
