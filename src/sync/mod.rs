//! Transform sync: capture, batch, persist, and replay node gestures.
//!
//! DESIGN
//! ======
//! A local drag or resize is sampled at a capped rate into per-node batches.
//! The batcher flushes those batches to the transform store on a fixed
//! interval. Other clients subscribe to the latest batch per node and replay
//! it on a per-frame clock. The arbiter keeps remote playback and stale
//! server reads away from the node the local user is holding.
//!
//! All mutable state lives inside one [`coordinator::SyncCoordinator`] per
//! mounted workspace view; nothing here is a process-wide singleton.

pub mod arbiter;
pub mod batcher;
pub mod coordinator;
pub mod player;
pub mod sampler;

use serde::{Deserialize, Serialize};

/// Workspace identifier. Workspaces are numbered per owner starting at 1.
pub type WorkspaceId = i64;

/// Canvas node identifier, assigned by the host when the node is created.
pub type NodeId = String;

// =============================================================================
// GEOMETRY
// =============================================================================

/// Canvas position plus stacking order.
///
/// `z` is a stacking index, not a spatial coordinate. Legacy records may omit
/// it or store it as a float; deserialization normalizes both to an integer
/// with 0 as the default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
    #[serde(default, deserialize_with = "deserialize_z")]
    pub z: i32,
}

impl NodePosition {
    #[must_use]
    pub fn new(x: f64, y: f64, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Rendered node size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeSize {
    pub width: f64,
    pub height: f64,
}

impl NodeSize {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Deserialize a stacking index from any JSON number, treating `null` and
/// non-finite values as 0. Paired with `#[serde(default)]` this is the single
/// place a missing `z` is normalized.
#[allow(clippy::cast_possible_truncation)]
fn deserialize_z<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.filter(|z| z.is_finite()).map_or(0, |z| z.round() as i32))
}

// =============================================================================
// ACTIONS
// =============================================================================

/// One observed state of a node during a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformAction {
    /// Milliseconds since the first sample of the batch.
    pub time_since_batch_start: u64,
    pub position: NodePosition,
    pub size: NodeSize,
}

impl TransformAction {
    #[must_use]
    pub fn new(time_since_batch_start: u64, position: NodePosition, size: NodeSize) -> Self {
        Self { time_since_batch_start, position, size }
    }
}

/// Actions for one node in ascending `time_since_batch_start` order.
pub type TransformBatch = Vec<TransformAction>;

/// Whether the batch timestamps never go backwards.
#[must_use]
pub fn is_monotonic(batch: &[TransformAction]) -> bool {
    batch
        .windows(2)
        .all(|pair| pair[0].time_since_batch_start <= pair[1].time_since_batch_start)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
