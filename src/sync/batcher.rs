//! Batcher: accumulates sampled actions per node until the next flush.
//!
//! The flush itself is driven by the coordinator. This type only owns the
//! pending map and hands it over wholesale: `take` swaps in a fresh map so
//! samples that arrive while a flush is in flight land in the next batch,
//! never lost and never sent twice.

use std::collections::HashMap;

use super::{NodeId, TransformAction, TransformBatch};

#[derive(Debug, Default)]
pub struct Batcher {
    pending: HashMap<NodeId, TransformBatch>,
}

impl Batcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action to the node's in-progress batch.
    pub fn append(&mut self, node_id: &str, action: TransformAction) {
        self.pending.entry(node_id.to_owned()).or_default().push(action);
    }

    /// Whether the node already has actions waiting for the next flush.
    #[must_use]
    pub fn has_pending(&self, node_id: &str) -> bool {
        self.pending.get(node_id).is_some_and(|batch| !batch.is_empty())
    }

    #[must_use]
    pub fn pending(&self, node_id: &str) -> Option<&[TransformAction]> {
        self.pending.get(node_id).map(Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.values().all(Vec::is_empty)
    }

    /// Swap out every pending batch, keeping only non-empty ones.
    pub fn take(&mut self) -> Vec<(NodeId, TransformBatch)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .filter(|(_, batch)| !batch.is_empty())
            .collect()
    }
}

#[cfg(test)]
#[path = "batcher_test.rs"]
mod tests;
