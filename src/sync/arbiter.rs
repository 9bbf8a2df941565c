//! Interaction arbiter: decides who owns a node's live transform.
//!
//! DESIGN
//! ======
//! At most one node is under local direct manipulation at a time. While a
//! node is held, remote playback skips it and persisted reads do not
//! overwrite its optimistic local transform. Ownership is released once a
//! persisted read agrees with the local value within a tolerance, because
//! floats lose precision on the round trip through the network and storage.

use tracing::debug;

use super::NodeId;
use crate::canvas::NodeTransform;

/// What reconciliation should do with a freshly read persisted transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Node is not held locally; take the persisted value.
    AcceptRemote,
    /// Node is held and the persisted value lags behind; keep local state.
    KeepLocal,
    /// Node was held and the persisted value caught up; ownership released.
    Converged,
}

#[derive(Debug, Clone)]
pub struct Arbiter {
    interacting: Option<NodeId>,
    tolerance: f64,
}

impl Arbiter {
    #[must_use]
    pub fn new(tolerance: f64) -> Self {
        Self { interacting: None, tolerance }
    }

    /// Mark `node_id` as under local manipulation (drag or resize start).
    pub fn begin(&mut self, node_id: &str) {
        if self.interacting.as_deref() != Some(node_id) {
            debug!(node_id, "local interaction started");
            self.interacting = Some(node_id.to_owned());
        }
    }

    #[must_use]
    pub fn interacting(&self) -> Option<&str> {
        self.interacting.as_deref()
    }

    #[must_use]
    pub fn is_interacting(&self, node_id: &str) -> bool {
        self.interacting.as_deref() == Some(node_id)
    }

    /// Drop ownership if `node_id` is the held node (e.g. the node was removed).
    pub fn release(&mut self, node_id: &str) {
        if self.is_interacting(node_id) {
            self.interacting = None;
        }
    }

    /// Decide between the local optimistic transform and a persisted one.
    ///
    /// Clears the held node when both agree within tolerance.
    pub fn resolve(&mut self, node_id: &str, local: Option<&NodeTransform>, persisted: &NodeTransform) -> Resolution {
        if !self.is_interacting(node_id) {
            return Resolution::AcceptRemote;
        }

        let Some(local) = local else {
            // Nothing optimistic to protect.
            self.interacting = None;
            return Resolution::Converged;
        };

        if local.approx_eq(persisted, self.tolerance) {
            debug!(node_id, "persisted transform caught up; releasing local ownership");
            self.interacting = None;
            Resolution::Converged
        } else {
            Resolution::KeepLocal
        }
    }
}

#[cfg(test)]
#[path = "arbiter_test.rs"]
mod tests;
