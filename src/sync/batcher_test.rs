use super::*;
use crate::sync::{NodePosition, NodeSize};

fn action(t: u64, x: f64) -> TransformAction {
    TransformAction::new(t, NodePosition::new(x, 0.0, 0), NodeSize::new(100.0, 50.0))
}

#[test]
fn new_batcher_is_empty() {
    let batcher = Batcher::new();
    assert!(batcher.is_empty());
    assert!(!batcher.has_pending("a"));
    assert!(batcher.pending("a").is_none());
}

#[test]
fn append_keeps_order_per_node() {
    let mut batcher = Batcher::new();
    batcher.append("a", action(0, 1.0));
    batcher.append("b", action(0, 9.0));
    batcher.append("a", action(20, 2.0));

    let pending = batcher.pending("a").unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].position.x, 1.0);
    assert_eq!(pending[1].position.x, 2.0);
    assert!(batcher.has_pending("b"));
}

#[test]
fn take_swaps_out_everything() {
    let mut batcher = Batcher::new();
    batcher.append("a", action(0, 1.0));
    batcher.append("b", action(0, 2.0));

    let mut taken = batcher.take();
    taken.sort_by(|x, y| x.0.cmp(&y.0));
    assert_eq!(taken.len(), 2);
    assert_eq!(taken[0].0, "a");
    assert_eq!(taken[1].0, "b");
    assert!(batcher.is_empty());
    assert!(!batcher.has_pending("a"));
}

#[test]
fn take_on_empty_batcher_returns_nothing() {
    let mut batcher = Batcher::new();
    assert!(batcher.take().is_empty());
}

#[test]
fn append_after_take_starts_a_new_batch() {
    let mut batcher = Batcher::new();
    batcher.append("a", action(0, 1.0));
    let first = batcher.take();
    batcher.append("a", action(0, 5.0));

    assert_eq!(first[0].1.len(), 1);
    assert_eq!(first[0].1[0].position.x, 1.0);
    let pending = batcher.pending("a").unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].position.x, 5.0);
}
