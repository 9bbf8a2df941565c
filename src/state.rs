//! Shared application state.
//!
//! `AppState` is injected into Axum handlers via the `State` extractor. The
//! server keeps no per-workspace state in memory: every request reads and
//! writes Postgres directly.

use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
