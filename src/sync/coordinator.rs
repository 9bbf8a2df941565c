//! Sync coordinator: one per mounted workspace view.
//!
//! ARCHITECTURE
//! ============
//! The coordinator owns the canvas, sampler, batcher, player, and arbiter
//! behind a single mutex and is passed explicitly to whatever drives it:
//! host event callbacks, the flush loop, the playback loop, and one
//! subscription task per watched node. Every callback mutates state
//! synchronously under the lock and never awaits while holding it.
//!
//! Network I/O is fire-and-forget. Each flushed batch gets its own task, so a
//! slow or failing node never holds up the others, and failures are logged
//! and dropped: the next interval's batch for that node supersedes them.
//!
//! LIFECYCLE
//! =========
//! `start` spawns the flush and playback loops and returns a [`SyncSession`].
//! Dropping the session aborts every task it spawned; `shutdown` also flushes
//! whatever is still pending.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::arbiter::Arbiter;
use super::batcher::Batcher;
use super::player::{Delivery, Player};
use super::sampler::{GesturePhase, Sampler};
use super::{NodeId, NodePosition, TransformAction, TransformBatch, WorkspaceId};
use crate::canvas::{Canvas, NodeChange, NodeCommit, NodeTransform, PersistedNode};
use crate::config::SyncConfig;
use crate::store::TransformStore;

struct SyncState {
    canvas: Canvas,
    sampler: Sampler,
    batcher: Batcher,
    player: Player,
    arbiter: Arbiter,
}

#[derive(Clone)]
pub struct SyncCoordinator {
    client_id: Uuid,
    workspace_id: WorkspaceId,
    config: SyncConfig,
    store: Arc<dyn TransformStore>,
    state: Arc<Mutex<SyncState>>,
}

impl SyncCoordinator {
    /// Coordinator for one workspace view. Hosts normally pass
    /// [`SyncConfig::from_env`]; see [`SyncCoordinator::from_env`].
    #[must_use]
    pub fn new(workspace_id: WorkspaceId, store: Arc<dyn TransformStore>, config: SyncConfig) -> Self {
        let state = SyncState {
            canvas: Canvas::new(),
            sampler: Sampler::new(config.sampling_interval),
            batcher: Batcher::new(),
            player: Player::new(config.echo_memory),
            arbiter: Arbiter::new(config.convergence_tolerance),
        };
        Self { client_id: Uuid::new_v4(), workspace_id, config, store, state: Arc::new(Mutex::new(state)) }
    }

    /// Coordinator configured from the `SYNC_*` environment variables.
    #[must_use]
    pub fn from_env(workspace_id: WorkspaceId, store: Arc<dyn TransformStore>) -> Self {
        Self::new(workspace_id, store, SyncConfig::from_env())
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    #[must_use]
    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    // =========================================================================
    // CANVAS ACCESS
    // =========================================================================

    /// Place a node on the local canvas (host mounted it).
    pub fn mount_node(&self, node_id: impl Into<NodeId>, transform: NodeTransform) {
        self.lock().canvas.insert(node_id, transform);
    }

    /// Current live transform of a node.
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<NodeTransform> {
        self.lock().canvas.get(node_id).copied()
    }

    /// Node currently under local manipulation, if any.
    #[must_use]
    pub fn interacting(&self) -> Option<NodeId> {
        self.lock().arbiter.interacting().map(str::to_owned)
    }

    /// Actions sampled for a node and not yet flushed.
    #[must_use]
    pub fn pending_actions(&self, node_id: &str) -> TransformBatch {
        self.lock().batcher.pending(node_id).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Remote batches waiting behind the one being played for a node.
    #[must_use]
    pub fn queued_batches(&self, node_id: &str) -> usize {
        self.lock().player.queued(node_id)
    }

    // =========================================================================
    // LOCAL GESTURES
    // =========================================================================

    /// Drag start: take ownership of the node and raise it to the top.
    ///
    /// Returns a commit carrying the new z-index when the node moved up.
    pub fn begin_drag(&self, node_id: &str) -> Option<NodeCommit> {
        let mut state = self.lock();
        state.arbiter.begin(node_id);
        let z = state.canvas.promote_z_index(node_id)?;
        let node = state.canvas.get(node_id)?;
        debug!(node_id, z, "node promoted on drag start");
        Some(NodeCommit {
            node_id: node_id.to_owned(),
            position: Some(NodePosition::new(node.x, node.y, z)),
            size: None,
        })
    }

    /// Resize start: take ownership of the node.
    pub fn begin_resize(&self, node_id: &str) {
        self.lock().arbiter.begin(node_id);
    }

    /// Apply a host change event, sample it, and report the committed value
    /// when the gesture ended.
    pub fn handle_change(&self, change: &NodeChange, now: Instant) -> Option<NodeCommit> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let node_id = change.node_id();

        if let NodeChange::Remove { .. } = change {
            // Pending actions stay queued and are flushed as-is. Their clock
            // stays too, in case the id is mounted again before the flush.
            state.canvas.remove(node_id);
            if state.batcher.has_pending(node_id) {
                state.sampler.end_gesture(node_id);
            } else {
                state.sampler.forget(node_id);
            }
            state.player.forget(node_id);
            state.arbiter.release(node_id);
            return None;
        }

        let applied = state.canvas.apply_change(change);
        let gesture = match change {
            NodeChange::Position { dragging, .. } => *dragging,
            NodeChange::Dimensions { resizing, .. } => *resizing,
            NodeChange::Remove { .. } => None,
        };

        let known = state.canvas.get(node_id).is_some();
        if known && (gesture.is_some() || state.sampler.is_tracking(node_id)) {
            let phase = if change.in_progress() {
                state.arbiter.begin(node_id);
                GesturePhase::Active
            } else {
                GesturePhase::Ended
            };

            if !state.batcher.has_pending(node_id) {
                state.sampler.rebase(node_id, now);
            }
            if let Some(action) = state.sampler.sample(node_id, phase, now, &state.canvas) {
                state.batcher.append(node_id, action);
            }
        }

        if !applied || change.in_progress() {
            return None;
        }
        commit_for(change, state.canvas.get(node_id))
    }

    /// Merge freshly read persisted nodes into the canvas.
    pub fn reconcile(&self, persisted: &[PersistedNode]) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.canvas.reconcile(persisted, &mut state.arbiter);
    }

    // =========================================================================
    // FLUSH
    // =========================================================================

    /// Swap out pending batches and send each to the store on its own task.
    ///
    /// Returns the spawned tasks; callers normally drop them. Nothing is
    /// spawned when no node has pending actions.
    pub fn flush(&self) -> Vec<JoinHandle<()>> {
        let batches = {
            let mut state = self.lock();
            let taken = state.batcher.take();
            for (node_id, batch) in &taken {
                state.player.remember_outgoing(node_id, batch);
            }
            taken
        };

        batches
            .into_iter()
            .map(|(node_id, batch)| {
                let store = Arc::clone(&self.store);
                let workspace_id = self.workspace_id;
                tokio::spawn(async move { store_batch(store.as_ref(), workspace_id, &node_id, &batch).await })
            })
            .collect()
    }

    // =========================================================================
    // PLAYBACK
    // =========================================================================

    /// Hand a subscription value for `node_id` to the player.
    pub fn deliver(&self, node_id: &str, batch: Option<TransformBatch>) -> Delivery {
        self.lock().player.deliver(node_id, batch)
    }

    /// Advance remote playback to `now`. Returns the nodes that were written.
    pub fn tick(&self, now: Instant) -> Vec<NodeId> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.player.tick(now, &mut state.canvas, &state.arbiter)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Spawn the flush and playback loops.
    #[must_use]
    pub fn start(&self) -> SyncSession {
        info!(
            client_id = %self.client_id,
            workspace_id = self.workspace_id,
            flush_ms = self.config.flush_interval.as_millis(),
            frame_ms = self.config.frame_interval.as_millis(),
            "transform sync started"
        );

        let flusher = {
            let coordinator = self.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(coordinator.config.flush_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    coordinator.flush();
                }
            })
        };

        let player = {
            let coordinator = self.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(coordinator.config.frame_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    let now = ticker.tick().await;
                    coordinator.tick(now);
                }
            })
        };

        SyncSession { coordinator: self.clone(), loops: vec![flusher, player], watches: HashMap::new() }
    }
}

async fn store_batch(store: &dyn TransformStore, workspace_id: WorkspaceId, node_id: &str, batch: &[TransformAction]) {
    match store.store(workspace_id, node_id, batch).await {
        Ok(outcome) => {
            debug!(workspace_id, node_id, actions = batch.len(), inserted = outcome.inserted, "transform batch flushed");
        }
        Err(e) => {
            warn!(
                error = %e,
                code = e.error_code(),
                workspace_id,
                node_id,
                actions = batch.len(),
                "transform batch flush failed; superseded by next interval"
            );
        }
    }
}

fn commit_for(change: &NodeChange, node: Option<&NodeTransform>) -> Option<NodeCommit> {
    let node = node?;
    match change {
        NodeChange::Position { id, position: Some(point), .. } => Some(NodeCommit {
            node_id: id.clone(),
            position: Some(NodePosition::new(point.x, point.y, node.z_index)),
            size: None,
        }),
        NodeChange::Dimensions { id, dimensions: Some(size), .. } => Some(NodeCommit {
            node_id: id.clone(),
            position: None,
            size: Some(*size),
        }),
        _ => None,
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Running sync loops for one workspace view.
pub struct SyncSession {
    coordinator: SyncCoordinator,
    loops: Vec<JoinHandle<()>>,
    watches: HashMap<NodeId, JoinHandle<()>>,
}

impl SyncSession {
    #[must_use]
    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Subscribe to remote batches for `node_id`. Re-watching a node
    /// replaces its subscription.
    pub fn watch(&mut self, node_id: &str) {
        let coordinator = self.coordinator.clone();
        let mut subscription = Arc::clone(&coordinator.store).subscribe(
            coordinator.workspace_id,
            node_id.to_owned(),
            coordinator.config.subscription_poll,
        );
        let watched = node_id.to_owned();
        let task = tokio::spawn(async move {
            while let Some(batch) = subscription.recv().await {
                coordinator.deliver(&watched, batch);
            }
        });

        if let Some(previous) = self.watches.insert(node_id.to_owned(), task) {
            previous.abort();
        }
    }

    pub fn unwatch(&mut self, node_id: &str) {
        if let Some(task) = self.watches.remove(node_id) {
            task.abort();
        }
    }

    /// Stop every loop and subscription, then flush what is still pending.
    pub async fn shutdown(mut self) {
        self.abort_all();
        let flushes = self.coordinator.flush();
        let count = flushes.len();
        futures::future::join_all(flushes).await;
        info!(client_id = %self.coordinator.client_id, final_flushes = count, "transform sync stopped");
    }

    fn abort_all(&mut self) {
        for task in self.loops.drain(..) {
            task.abort();
        }
        for (_, task) in self.watches.drain() {
            task.abort();
        }
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.abort_all();
    }
}

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod tests;
