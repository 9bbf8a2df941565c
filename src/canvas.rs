//! Client-local canvas state: the live transform of every node.
//!
//! DESIGN
//! ======
//! This is what the renderer reads. Local gestures, remote playback, and
//! persisted-node reconciliation all write here; the arbiter decides which of
//! them may touch a given node. Nothing in this module talks to the network.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::sync::arbiter::{Arbiter, Resolution};
use crate::sync::{NodeId, NodePosition, NodeSize, TransformAction};

// =============================================================================
// NODE TRANSFORM
// =============================================================================

/// Live render transform of one node. Size is unknown until the host has
/// measured the node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeTransform {
    pub x: f64,
    pub y: f64,
    pub z_index: i32,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl NodeTransform {
    #[must_use]
    pub fn new(position: NodePosition, size: NodeSize) -> Self {
        Self {
            x: position.x,
            y: position.y,
            z_index: position.z,
            width: Some(size.width),
            height: Some(size.height),
        }
    }

    /// Position and size if every field currently resolves to a finite number.
    #[must_use]
    pub fn resolved(&self) -> Option<(NodePosition, NodeSize)> {
        let width = self.width.filter(|w| w.is_finite())?;
        let height = self.height.filter(|h| h.is_finite())?;
        if !self.x.is_finite() || !self.y.is_finite() {
            return None;
        }
        Some((NodePosition::new(self.x, self.y, self.z_index), NodeSize::new(width, height)))
    }

    pub fn apply_action(&mut self, action: &TransformAction) {
        self.x = action.position.x;
        self.y = action.position.y;
        self.z_index = action.position.z;
        self.width = Some(action.size.width);
        self.height = Some(action.size.height);
    }

    /// Position and size agree within `tolerance` on every axis.
    ///
    /// Stacking order is not compared. An unmeasured size only matches another
    /// unmeasured size.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance;
        let close_opt = |a: Option<f64>, b: Option<f64>| match (a, b) {
            (Some(a), Some(b)) => close(a, b),
            (None, None) => true,
            _ => false,
        };
        close(self.x, other.x)
            && close(self.y, other.y)
            && close_opt(self.width, other.width)
            && close_opt(self.height, other.height)
    }
}

// =============================================================================
// HOST EVENTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Change event emitted by the host canvas while the user manipulates nodes.
///
/// `dragging` / `resizing` are `Some(true)` while the gesture is in progress.
/// `Some(false)` or `None` means the gesture just ended (or was a one-off
/// programmatic change).
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
    Position { id: NodeId, position: Option<Point>, dragging: Option<bool> },
    Dimensions { id: NodeId, dimensions: Option<NodeSize>, resizing: Option<bool> },
    Remove { id: NodeId },
}

impl NodeChange {
    #[must_use]
    pub fn node_id(&self) -> &str {
        match self {
            Self::Position { id, .. } | Self::Dimensions { id, .. } | Self::Remove { id } => id,
        }
    }

    /// Whether the gesture this change belongs to is still in progress.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        match self {
            Self::Position { dragging, .. } => *dragging == Some(true),
            Self::Dimensions { resizing, .. } => *resizing == Some(true),
            Self::Remove { .. } => false,
        }
    }
}

/// Final state of a gesture to hand to the host's node persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeCommit {
    pub node_id: NodeId,
    pub position: Option<NodePosition>,
    pub size: Option<NodeSize>,
}

/// Node record as read back from the workspace node store. Extra fields on
/// the record are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedNode {
    pub id: NodeId,
    pub position: NodePosition,
    pub size: NodeSize,
}

// =============================================================================
// CANVAS
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct Canvas {
    nodes: HashMap<NodeId, NodeTransform>,
}

impl Canvas {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node_id: impl Into<NodeId>, transform: NodeTransform) {
        self.nodes.insert(node_id.into(), transform);
    }

    #[must_use]
    pub fn get(&self, node_id: &str) -> Option<&NodeTransform> {
        self.nodes.get(node_id)
    }

    pub fn remove(&mut self, node_id: &str) -> Option<NodeTransform> {
        self.nodes.remove(node_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeTransform)> {
        self.nodes.iter()
    }

    /// Apply a host change event to local state. Returns `false` when the
    /// node is unknown or the event carries no value.
    pub fn apply_change(&mut self, change: &NodeChange) -> bool {
        match change {
            NodeChange::Position { id, position: Some(point), .. } => {
                let Some(node) = self.nodes.get_mut(id) else {
                    return false;
                };
                node.x = point.x;
                node.y = point.y;
                true
            }
            NodeChange::Dimensions { id, dimensions: Some(size), .. } => {
                let Some(node) = self.nodes.get_mut(id) else {
                    return false;
                };
                node.width = Some(size.width);
                node.height = Some(size.height);
                true
            }
            NodeChange::Remove { id } => self.nodes.remove(id).is_some(),
            _ => false,
        }
    }

    /// Write a replayed action into the node's live state.
    pub fn apply_action(&mut self, node_id: &str, action: &TransformAction) -> bool {
        match self.nodes.get_mut(node_id) {
            Some(node) => {
                node.apply_action(action);
                true
            }
            None => false,
        }
    }

    /// Raise `node_id` above every peer it ties with or sits under.
    ///
    /// Returns the new z-index, or `None` when the node is missing or already
    /// strictly on top.
    pub fn promote_z_index(&mut self, node_id: &str) -> Option<i32> {
        let current = self.nodes.get(node_id)?.z_index;

        let mut max_z = current;
        let mut contested = false;
        for (id, node) in &self.nodes {
            if id == node_id {
                continue;
            }
            if node.z_index >= current {
                contested = true;
            }
            max_z = max_z.max(node.z_index);
        }
        if !contested {
            return None;
        }

        let next = max_z.saturating_add(1);
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.z_index = next;
        }
        Some(next)
    }

    /// Replace the canvas with freshly read persisted nodes.
    ///
    /// Nodes missing from `persisted` are dropped. The node held by the
    /// arbiter keeps its optimistic local transform until the persisted value
    /// converges with it.
    pub fn reconcile(&mut self, persisted: &[PersistedNode], arbiter: &mut Arbiter) {
        let mut next = HashMap::with_capacity(persisted.len());
        for node in persisted {
            let remote = NodeTransform::new(node.position, node.size);
            let local = self.nodes.get(&node.id);
            let chosen = match arbiter.resolve(&node.id, local, &remote) {
                Resolution::KeepLocal => local.copied().unwrap_or(remote),
                Resolution::AcceptRemote | Resolution::Converged => remote,
            };
            next.insert(node.id.clone(), chosen);
        }

        if let Some(held) = arbiter.interacting().map(str::to_owned) {
            if !next.contains_key(&held) {
                arbiter.release(&held);
            }
        }

        self.nodes = next;
    }
}

#[cfg(test)]
#[path = "canvas_test.rs"]
mod tests;
