//! In-memory transform store.
//!
//! DESIGN
//! ======
//! One `MemoryBackend` plays the part of the shared database: it knows which
//! identity owns which workspace and keeps one batch per
//! (identity, workspace, node). Clients get caller-bound handles through
//! [`MemoryBackend::scoped`]. Every successful write bumps a revision on a
//! watch channel so subscriptions re-read immediately instead of polling.
//!
//! Failures can be injected per node to exercise flush isolation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use super::{BatchSubscription, StoreError, StoreOutcome, TransformStore, deliver_latest};
use crate::sync::{NodeId, TransformAction, TransformBatch, WorkspaceId};

type BatchKey = (String, WorkspaceId, NodeId);

#[derive(Default)]
struct MemoryInner {
    workspaces: HashSet<(String, WorkspaceId)>,
    batches: HashMap<BatchKey, TransformBatch>,
    failing_nodes: HashSet<NodeId>,
    store_calls: usize,
}

pub struct MemoryBackend {
    inner: Mutex<MemoryInner>,
    revision: watch::Sender<u64>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (revision, _) = watch::channel(0);
        Arc::new(Self { inner: Mutex::new(MemoryInner::default()), revision })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that `subject` owns `workspace_id`.
    pub fn grant_workspace(&self, subject: &str, workspace_id: WorkspaceId) {
        self.lock().workspaces.insert((subject.to_owned(), workspace_id));
    }

    /// Make every `store` for `node_id` fail until cleared.
    pub fn fail_node(&self, node_id: &str) {
        self.lock().failing_nodes.insert(node_id.to_owned());
    }

    pub fn clear_failures(&self) {
        self.lock().failing_nodes.clear();
    }

    /// Number of `store` calls received, including failed ones.
    #[must_use]
    pub fn store_calls(&self) -> usize {
        self.lock().store_calls
    }

    /// A store handle acting as `subject`. `None` acts as an anonymous caller.
    #[must_use]
    pub fn scoped(self: &Arc<Self>, subject: Option<&str>) -> MemoryTransformStore {
        MemoryTransformStore { backend: Arc::clone(self), subject: subject.map(str::to_owned) }
    }
}

/// Caller-bound handle onto a [`MemoryBackend`].
pub struct MemoryTransformStore {
    backend: Arc<MemoryBackend>,
    subject: Option<String>,
}

impl MemoryTransformStore {
    fn subject(&self) -> Result<&str, StoreError> {
        self.subject.as_deref().ok_or(StoreError::Unauthenticated)
    }
}

#[async_trait::async_trait]
impl TransformStore for MemoryTransformStore {
    async fn store(
        &self,
        workspace_id: WorkspaceId,
        node_id: &str,
        actions: &[TransformAction],
    ) -> Result<StoreOutcome, StoreError> {
        let subject = self.subject()?;
        let inserted = {
            let mut inner = self.backend.lock();
            inner.store_calls += 1;

            if inner.failing_nodes.contains(node_id) {
                return Err(StoreError::Transport(format!("injected failure for node {node_id}")));
            }
            if !inner.workspaces.contains(&(subject.to_owned(), workspace_id)) {
                return Err(StoreError::WorkspaceNotFound(workspace_id));
            }

            let key = (subject.to_owned(), workspace_id, node_id.to_owned());
            inner.batches.insert(key, actions.to_vec()).is_none()
        };

        self.backend.revision.send_modify(|rev| *rev += 1);
        Ok(StoreOutcome { inserted })
    }

    async fn find(&self, workspace_id: WorkspaceId, node_id: &str) -> Result<Option<TransformBatch>, StoreError> {
        let subject = self.subject()?;
        let inner = self.backend.lock();
        if !inner.workspaces.contains(&(subject.to_owned(), workspace_id)) {
            return Ok(None);
        }
        let key = (subject.to_owned(), workspace_id, node_id.to_owned());
        Ok(inner.batches.get(&key).cloned())
    }

    /// Re-read on every backend write instead of polling.
    fn subscribe(self: Arc<Self>, workspace_id: WorkspaceId, node_id: NodeId, _poll: Duration) -> BatchSubscription {
        let (tx, rx) = mpsc::channel(super::SUBSCRIPTION_CHANNEL_CAPACITY);
        let mut changes = self.backend.revision.subscribe();
        let task = tokio::spawn(async move {
            loop {
                if !deliver_latest(self.as_ref(), workspace_id, &node_id, &tx).await {
                    break;
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
        });
        BatchSubscription { rx, task }
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
