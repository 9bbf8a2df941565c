//! Runtime configuration parsed from environment variables.
//!
//! Every knob has a default; a missing or unparseable variable falls back to
//! it rather than failing startup. Only `DATABASE_URL` is required, and only
//! by the server binary.

use std::time::Duration;

pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 16;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 100;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;
pub const DEFAULT_SUBSCRIPTION_POLL_MS: u64 = 250;
pub const DEFAULT_CONVERGENCE_TOLERANCE: f64 = 0.1;
pub const DEFAULT_ECHO_MEMORY: usize = 8;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// SYNC
// =============================================================================

/// Timing and tolerance knobs for the transform sync core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Minimum spacing between two accepted samples for one node.
    pub sampling_interval: Duration,
    /// Period of the batch flush loop.
    pub flush_interval: Duration,
    /// Period of the playback loop.
    pub frame_interval: Duration,
    /// Poll period for stores that cannot push changes.
    pub subscription_poll: Duration,
    /// Maximum per-field difference at which local and persisted transforms
    /// are considered converged.
    pub convergence_tolerance: f64,
    /// How many of this client's own flushed batches are remembered per node
    /// so their echo from the store is not replayed.
    pub echo_memory: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_millis(DEFAULT_SAMPLING_INTERVAL_MS),
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            frame_interval: Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS),
            subscription_poll: Duration::from_millis(DEFAULT_SUBSCRIPTION_POLL_MS),
            convergence_tolerance: DEFAULT_CONVERGENCE_TOLERANCE,
            echo_memory: DEFAULT_ECHO_MEMORY,
        }
    }
}

impl SyncConfig {
    /// Build from environment variables.
    ///
    /// - `SYNC_SAMPLING_INTERVAL_MS`: default 16
    /// - `SYNC_FLUSH_INTERVAL_MS`: default 100
    /// - `SYNC_FRAME_INTERVAL_MS`: default 16
    /// - `SYNC_SUBSCRIPTION_POLL_MS`: default 250
    /// - `SYNC_CONVERGENCE_TOLERANCE`: default 0.1
    /// - `SYNC_ECHO_MEMORY`: default 8
    #[must_use]
    pub fn from_env() -> Self {
        let tolerance = env_parse("SYNC_CONVERGENCE_TOLERANCE", DEFAULT_CONVERGENCE_TOLERANCE);
        Self {
            sampling_interval: Duration::from_millis(env_parse(
                "SYNC_SAMPLING_INTERVAL_MS",
                DEFAULT_SAMPLING_INTERVAL_MS,
            )),
            flush_interval: Duration::from_millis(
                env_parse("SYNC_FLUSH_INTERVAL_MS", DEFAULT_FLUSH_INTERVAL_MS).max(1),
            ),
            frame_interval: Duration::from_millis(
                env_parse("SYNC_FRAME_INTERVAL_MS", DEFAULT_FRAME_INTERVAL_MS).max(1),
            ),
            subscription_poll: Duration::from_millis(
                env_parse("SYNC_SUBSCRIPTION_POLL_MS", DEFAULT_SUBSCRIPTION_POLL_MS).max(1),
            ),
            convergence_tolerance: if tolerance.is_finite() && tolerance >= 0.0 {
                tolerance
            } else {
                DEFAULT_CONVERGENCE_TOLERANCE
            },
            echo_memory: env_parse("SYNC_ECHO_MEMORY", DEFAULT_ECHO_MEMORY),
        }
    }
}

// =============================================================================
// SERVER
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
}

/// Settings for the HTTP server binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
}

impl ServerConfig {
    /// Build from environment variables.
    ///
    /// - `DATABASE_URL`: required
    /// - `PORT`: default 3000
    /// - `DB_MAX_CONNECTIONS`: default 5
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if `DATABASE_URL` is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        Ok(Self {
            database_url,
            port: env_parse("PORT", DEFAULT_PORT),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
        })
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
