//! Player: replays remote batches onto the canvas on a per-frame clock.
//!
//! DESIGN
//! ======
//! Each node has a FIFO of batches delivered by its subscription and at most
//! one batch in playback. A tick applies, in order, every unapplied action
//! whose timestamp has elapsed since that batch started playing. There is no
//! interpolation: a late tick catches up by applying several actions at once,
//! and only the last one stays visible.
//!
//! Deliveries are deduplicated by content against the last batch seen for
//! the node, since subscriptions may re-deliver an unchanged value. Batches
//! this client flushed itself are remembered and ignored when they come back.

use std::collections::{HashMap, VecDeque};

use tokio::time::Instant;
use tracing::{debug, trace};

use super::arbiter::Arbiter;
use super::{NodeId, TransformAction, TransformBatch};
use crate::canvas::Canvas;

/// Outcome of handing a subscription value to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Enqueued,
    /// Same content as the last delivery for this node.
    Unchanged,
    /// No batch stored, or the batch has no actions.
    Empty,
    /// This client flushed the batch itself.
    Echo,
}

#[derive(Debug)]
struct ActiveBatch {
    actions: TransformBatch,
    next: usize,
    started_at: Instant,
}

#[derive(Debug, Default)]
struct NodePlayback {
    last_seen: Option<TransformBatch>,
    queue: VecDeque<TransformBatch>,
    current: Option<ActiveBatch>,
    outgoing: VecDeque<TransformBatch>,
}

impl NodePlayback {
    fn is_idle(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }
}

#[derive(Debug)]
pub struct Player {
    nodes: HashMap<NodeId, NodePlayback>,
    echo_memory: usize,
}

impl Player {
    #[must_use]
    pub fn new(echo_memory: usize) -> Self {
        Self { nodes: HashMap::new(), echo_memory }
    }

    /// Handle the latest stored batch for a node.
    pub fn deliver(&mut self, node_id: &str, batch: Option<TransformBatch>) -> Delivery {
        let entry = self.nodes.entry(node_id.to_owned()).or_default();
        if entry.last_seen == batch {
            return Delivery::Unchanged;
        }
        entry.last_seen.clone_from(&batch);

        let Some(batch) = batch.filter(|b| !b.is_empty()) else {
            return Delivery::Empty;
        };

        if entry.outgoing.iter().any(|own| same_actions(own, &batch)) {
            trace!(node_id, "ignoring echo of own batch");
            return Delivery::Echo;
        }

        debug!(node_id, actions = batch.len(), queued = entry.queue.len(), "remote batch enqueued");
        entry.queue.push_back(batch);
        Delivery::Enqueued
    }

    /// Remember a batch this client is about to flush for `node_id`.
    pub fn remember_outgoing(&mut self, node_id: &str, batch: &TransformBatch) {
        if self.echo_memory == 0 {
            return;
        }
        let entry = self.nodes.entry(node_id.to_owned()).or_default();
        while entry.outgoing.len() >= self.echo_memory {
            entry.outgoing.pop_front();
        }
        entry.outgoing.push_back(batch.clone());
    }

    /// Batches waiting behind the one in playback.
    #[must_use]
    pub fn queued(&self, node_id: &str) -> usize {
        self.nodes.get(node_id).map_or(0, |n| n.queue.len())
    }

    #[must_use]
    pub fn is_playing(&self, node_id: &str) -> bool {
        self.nodes.get(node_id).is_some_and(|n| n.current.is_some())
    }

    /// Drop all playback state for a node (it was removed).
    pub fn forget(&mut self, node_id: &str) {
        self.nodes.remove(node_id);
    }

    /// Advance playback for every node to `now`.
    ///
    /// Nodes held by the arbiter are skipped for this frame. Returns the ids
    /// of nodes whose canvas transform was written.
    pub fn tick(&mut self, now: Instant, canvas: &mut Canvas, arbiter: &Arbiter) -> Vec<NodeId> {
        let mut touched = Vec::new();

        for (node_id, playback) in &mut self.nodes {
            if playback.is_idle() || arbiter.is_interacting(node_id) {
                continue;
            }

            if playback.current.is_none() {
                let Some(actions) = playback.queue.pop_front() else {
                    continue;
                };
                playback.current = Some(ActiveBatch { actions, next: 0, started_at: now });
            }
            let Some(active) = playback.current.as_mut() else {
                continue;
            };

            let elapsed = now.saturating_duration_since(active.started_at);
            let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

            let mut wrote = false;
            while let Some(action) = active.actions.get(active.next) {
                if action.time_since_batch_start > elapsed_ms {
                    break;
                }
                wrote |= canvas.apply_action(node_id, action);
                active.next += 1;
            }
            if wrote {
                touched.push(node_id.clone());
            }

            if active.next >= active.actions.len() {
                trace!(node_id = %node_id, "batch playback complete");
                playback.current = None;
            }
        }

        touched
    }
}

/// Content equality that tolerates the last-bit float drift a JSON round trip
/// can introduce.
fn same_actions(a: &[TransformAction], b: &[TransformAction]) -> bool {
    const EPSILON: f64 = 1e-9;
    let close = |x: f64, y: f64| (x - y).abs() <= EPSILON * x.abs().max(y.abs()).max(1.0);
    a.len() == b.len()
        && a.iter().zip(b).all(|(a, b)| {
            a.time_since_batch_start == b.time_since_batch_start
                && a.position.z == b.position.z
                && close(a.position.x, b.position.x)
                && close(a.position.y, b.position.y)
                && close(a.size.width, b.size.width)
                && close(a.size.height, b.size.height)
        })
}

#[cfg(test)]
#[path = "player_test.rs"]
mod tests;
