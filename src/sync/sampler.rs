//! Sampler: turns a continuous gesture into rate-limited transform actions.
//!
//! DESIGN
//! ======
//! Each node under a gesture gets a track holding the time of the last
//! accepted sample. Events closer together than the sampling interval are
//! dropped, not queued. The event that ends a gesture is always sampled so
//! the final frame is never throttled away, and it closes the track.
//!
//! Timestamps are measured against a per-node batch clock that outlives the
//! track. Closing a gesture leaves the clock running, so a second gesture
//! that lands in the same unflushed batch keeps counting up from it. Only
//! `rebase` restarts the clock, once the node's previous batch is gone.
//!
//! Every action carries the node's full resolved transform read back from the
//! canvas, not just the field the event changed.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use super::{NodeId, TransformAction};
use crate::canvas::Canvas;

/// Phase of the gesture an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, Default)]
struct Track {
    last_sample: Option<Instant>,
}

#[derive(Debug)]
pub struct Sampler {
    interval: Duration,
    tracks: HashMap<NodeId, Track>,
    clocks: HashMap<NodeId, Instant>,
}

impl Sampler {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval, tracks: HashMap::new(), clocks: HashMap::new() }
    }

    /// Restart the batch clock for a node at `now`.
    ///
    /// Called while the node has nothing pending, so the next batch starts
    /// at t=0. Must not be called while actions for the node are still
    /// waiting to be flushed, or that batch would go backwards in time.
    pub fn rebase(&mut self, node_id: &str, now: Instant) {
        self.clocks.insert(node_id.to_owned(), now);
    }

    /// Whether a gesture is currently being sampled for `node_id`.
    #[must_use]
    pub fn is_tracking(&self, node_id: &str) -> bool {
        self.tracks.contains_key(node_id)
    }

    /// Close the node's gesture without touching its batch clock.
    pub fn end_gesture(&mut self, node_id: &str) {
        self.tracks.remove(node_id);
    }

    /// Forget a node entirely, batch clock included.
    pub fn forget(&mut self, node_id: &str) {
        self.tracks.remove(node_id);
        self.clocks.remove(node_id);
    }

    /// Sample the node's current transform, if the rate limit allows.
    ///
    /// Returns `None` when the sample is throttled or the node's transform
    /// cannot be resolved. An `Ended` phase bypasses the throttle and closes
    /// the track either way.
    pub fn sample(&mut self, node_id: &str, phase: GesturePhase, now: Instant, canvas: &Canvas) -> Option<TransformAction> {
        let track = *self.tracks.entry(node_id.to_owned()).or_default();
        let batch_start = *self.clocks.entry(node_id.to_owned()).or_insert(now);

        if phase == GesturePhase::Ended {
            self.end_gesture(node_id);
        }

        let throttled = match track.last_sample {
            Some(last) => now.saturating_duration_since(last) < self.interval,
            None => false,
        };
        if throttled && phase == GesturePhase::Active {
            trace!(node_id, "sample throttled");
            return None;
        }

        let Some((position, size)) = canvas.get(node_id).and_then(|n| n.resolved()) else {
            trace!(node_id, "sample discarded; transform unresolved");
            return None;
        };

        if phase == GesturePhase::Active {
            if let Some(open) = self.tracks.get_mut(node_id) {
                open.last_sample = Some(now);
            }
        }

        let elapsed = now.saturating_duration_since(batch_start);
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        Some(TransformAction::new(elapsed_ms, position, size))
    }
}

#[cfg(test)]
#[path = "sampler_test.rs"]
mod tests;
