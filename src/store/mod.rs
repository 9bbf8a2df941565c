//! Transform batch store: persistence for the latest batch per node.
//!
//! ARCHITECTURE
//! ============
//! The sync core only sees [`TransformStore`]: a caller-scoped upsert and
//! lookup keyed by (workspace, node). Implementations bind the caller's
//! identity at construction, the way a host's authenticated client would.
//!
//! - [`memory`]: in-process backend with push notifications, for tests and
//!   single-process hosts.
//! - [`postgres`]: the server's durable backend.
//! - [`http`]: client for the server's REST routes.
//!
//! SUBSCRIPTIONS
//! =============
//! `subscribe` delivers the current stored batch whenever it may have
//! changed. Delivery is at-least-once and may repeat unchanged values; the
//! player deduplicates by content. A failed read delivers nothing.

pub mod http;
pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::sync::{NodeId, TransformAction, TransformBatch, WorkspaceId};

const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(WorkspaceId),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: status {status}")]
    Response { status: u16, body: String },
    #[error("decode failed: {0}")]
    Decode(String),
}

impl StoreError {
    /// Grepable code for logs and error bodies.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "E_UNAUTHENTICATED",
            Self::WorkspaceNotFound(_) => "E_WORKSPACE_NOT_FOUND",
            Self::Database(_) => "E_DATABASE",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Response { .. } => "E_RESPONSE",
            Self::Decode(_) => "E_DECODE",
        }
    }

    /// Whether the same call could succeed if tried again unchanged.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Transport(_) | Self::Response { status: 429 | 500..=599, .. })
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOutcome {
    /// `true` when no batch existed for the (workspace, node) before.
    pub inserted: bool,
}

/// Stored row for one (workspace, node).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBatch {
    pub workspace_id: WorkspaceId,
    pub node_id: NodeId,
    pub actions: TransformBatch,
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Caller-scoped persistence for the latest transform batch per node.
#[async_trait::async_trait]
pub trait TransformStore: Send + Sync + 'static {
    /// Replace the stored batch for (workspace, node), creating it if absent.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unauthenticated`] without a caller identity,
    /// [`StoreError::WorkspaceNotFound`] if the caller does not own the
    /// workspace, or a backend error.
    async fn store(
        &self,
        workspace_id: WorkspaceId,
        node_id: &str,
        actions: &[TransformAction],
    ) -> Result<StoreOutcome, StoreError>;

    /// Latest stored batch for (workspace, node). `None` if the caller does
    /// not own the workspace or nothing is stored.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unauthenticated`] without a caller identity, or a
    /// backend error.
    async fn find(&self, workspace_id: WorkspaceId, node_id: &str) -> Result<Option<TransformBatch>, StoreError>;

    /// Watch the stored batch for (workspace, node).
    ///
    /// The default implementation polls `find` every `poll`.
    fn subscribe(self: Arc<Self>, workspace_id: WorkspaceId, node_id: NodeId, poll: Duration) -> BatchSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !deliver_latest(self.as_ref(), workspace_id, &node_id, &tx).await {
                    break;
                }
            }
        });
        BatchSubscription { rx, task }
    }
}

/// Read the current batch and push it to `tx`. Returns `false` once the
/// receiving side has gone away.
pub(crate) async fn deliver_latest<S>(
    store: &S,
    workspace_id: WorkspaceId,
    node_id: &str,
    tx: &mpsc::Sender<Option<TransformBatch>>,
) -> bool
where
    S: TransformStore + ?Sized,
{
    if tx.is_closed() {
        return false;
    }
    match store.find(workspace_id, node_id).await {
        Ok(batch) => tx.send(batch).await.is_ok(),
        Err(e) => {
            debug!(error = %e, code = e.error_code(), workspace_id, node_id, "subscription read failed");
            true
        }
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Live feed of the stored batch for one node. The feeding task stops when
/// this is dropped.
#[derive(Debug)]
pub struct BatchSubscription {
    rx: mpsc::Receiver<Option<TransformBatch>>,
    task: JoinHandle<()>,
}

impl BatchSubscription {
    /// Next delivered value, or `None` once the feed has ended.
    pub async fn recv(&mut self) -> Option<Option<TransformBatch>> {
        self.rx.recv().await
    }
}

impl Drop for BatchSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
