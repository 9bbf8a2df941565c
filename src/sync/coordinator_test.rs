use std::time::Duration;

use super::*;
use crate::canvas::Point;
use crate::store::memory::MemoryBackend;
use crate::sync::{NodePosition, NodeSize};

const WORKSPACE: WorkspaceId = 1;

fn coordinator(backend: &Arc<MemoryBackend>) -> SyncCoordinator {
    backend.grant_workspace("alice", WORKSPACE);
    SyncCoordinator::new(WORKSPACE, Arc::new(backend.scoped(Some("alice"))), SyncConfig::default())
}

fn mounted(backend: &Arc<MemoryBackend>, ids: &[&str]) -> SyncCoordinator {
    let coordinator = coordinator(backend);
    for id in ids {
        coordinator.mount_node(*id, NodeTransform::new(NodePosition::new(0.0, 0.0, 0), NodeSize::new(100.0, 50.0)));
    }
    coordinator
}

fn drag(id: &str, x: f64, y: f64, dragging: Option<bool>) -> NodeChange {
    NodeChange::Position { id: id.into(), position: Some(Point { x, y }), dragging }
}

fn at(base: Instant, ms: u64) -> Instant {
    base + Duration::from_millis(ms)
}

async fn flush_all(coordinator: &SyncCoordinator) -> usize {
    let handles = coordinator.flush();
    let count = handles.len();
    for handle in handles {
        handle.await.unwrap();
    }
    count
}

async fn stored(backend: &Arc<MemoryBackend>, node_id: &str) -> Option<TransformBatch> {
    backend.scoped(Some("alice")).find(WORKSPACE, node_id).await.unwrap()
}

// =============================================================================
// gestures
// =============================================================================

#[tokio::test]
async fn drag_is_sampled_and_commits_on_release() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    let base = Instant::now();

    assert!(sync.handle_change(&drag("a", 10.0, 0.0, Some(true)), base).is_none());
    sync.handle_change(&drag("a", 20.0, 0.0, Some(true)), at(base, 20));
    sync.handle_change(&drag("a", 25.0, 0.0, Some(true)), at(base, 25));
    let commit = sync.handle_change(&drag("a", 30.0, 5.0, Some(false)), at(base, 30)).unwrap();

    assert_eq!(commit.node_id, "a");
    assert_eq!(commit.position, Some(NodePosition::new(30.0, 5.0, 0)));
    assert!(commit.size.is_none());

    let pending = sync.pending_actions("a");
    let times: Vec<u64> = pending.iter().map(|a| a.time_since_batch_start).collect();
    assert_eq!(times, vec![0, 20, 30]);
    assert_eq!(pending[2].position, NodePosition::new(30.0, 5.0, 0));
    assert_eq!(sync.interacting().as_deref(), Some("a"));
}

#[tokio::test]
async fn resize_commits_final_size() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    let base = Instant::now();
    sync.begin_resize("a");

    let resize = |w: f64, resizing| NodeChange::Dimensions {
        id: "a".into(),
        dimensions: Some(NodeSize::new(w, 80.0)),
        resizing,
    };
    assert!(sync.handle_change(&resize(150.0, Some(true)), base).is_none());
    let commit = sync.handle_change(&resize(180.0, Some(false)), at(base, 40)).unwrap();

    assert_eq!(commit.size, Some(NodeSize::new(180.0, 80.0)));
    assert!(commit.position.is_none());
    assert_eq!(sync.pending_actions("a").len(), 2);
}

#[tokio::test]
async fn begin_drag_promotes_contested_node() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a", "b"]);

    let commit = sync.begin_drag("a").unwrap();
    assert_eq!(commit.position.map(|p| p.z), Some(1));
    assert_eq!(sync.node("a").unwrap().z_index, 1);
    assert_eq!(sync.interacting().as_deref(), Some("a"));

    // Already on top: ownership taken, nothing to commit.
    assert!(sync.begin_drag("a").is_none());
}

#[tokio::test]
async fn unknown_node_changes_are_ignored() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &[]);
    assert!(sync.handle_change(&drag("ghost", 1.0, 1.0, Some(false)), Instant::now()).is_none());
    assert!(sync.pending_actions("ghost").is_empty());
}

// =============================================================================
// flush
// =============================================================================

#[tokio::test]
async fn flush_persists_pending_batch_and_clears_it() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    let base = Instant::now();
    sync.handle_change(&drag("a", 10.0, 0.0, Some(true)), base);
    sync.handle_change(&drag("a", 20.0, 0.0, Some(false)), at(base, 30));

    assert_eq!(flush_all(&sync).await, 1);
    assert!(sync.pending_actions("a").is_empty());
    assert_eq!(stored(&backend, "a").await.unwrap().len(), 2);
}

#[tokio::test]
async fn empty_flush_makes_no_store_calls() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);

    assert_eq!(flush_all(&sync).await, 0);
    assert_eq!(backend.store_calls(), 0);
}

#[tokio::test]
async fn failing_node_does_not_block_others() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a", "b"]);
    backend.fail_node("a");
    let base = Instant::now();
    sync.handle_change(&drag("a", 1.0, 1.0, Some(false)), base);
    sync.handle_change(&drag("b", 2.0, 2.0, Some(false)), base);

    assert_eq!(flush_all(&sync).await, 2);
    assert_eq!(backend.store_calls(), 2);
    assert!(stored(&backend, "a").await.is_none());
    assert_eq!(stored(&backend, "b").await.unwrap()[0].position.x, 2.0);
}

#[tokio::test]
async fn batch_after_flush_restarts_at_zero() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    let base = Instant::now();
    sync.handle_change(&drag("a", 1.0, 0.0, Some(true)), base);
    sync.handle_change(&drag("a", 2.0, 0.0, Some(true)), at(base, 50));
    flush_all(&sync).await;

    sync.handle_change(&drag("a", 3.0, 0.0, Some(true)), at(base, 120));
    sync.handle_change(&drag("a", 4.0, 0.0, Some(true)), at(base, 150));

    let times: Vec<u64> = sync.pending_actions("a").iter().map(|a| a.time_since_batch_start).collect();
    assert_eq!(times, vec![0, 30]);
}

#[tokio::test]
async fn second_gesture_in_same_window_continues_batch_clock() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    let base = Instant::now();

    sync.begin_drag("a");
    sync.handle_change(&drag("a", 1.0, 0.0, Some(true)), base);
    sync.handle_change(&drag("a", 2.0, 0.0, Some(true)), at(base, 40));
    sync.handle_change(&drag("a", 3.0, 0.0, Some(false)), at(base, 80));
    sync.begin_drag("a");
    sync.handle_change(&drag("a", 4.0, 0.0, Some(true)), at(base, 90));
    sync.handle_change(&drag("a", 5.0, 0.0, Some(false)), at(base, 130));

    let pending = sync.pending_actions("a");
    let times: Vec<u64> = pending.iter().map(|a| a.time_since_batch_start).collect();
    assert_eq!(times, vec![0, 40, 80, 90, 130]);
    assert!(crate::sync::is_monotonic(&pending));
}

#[tokio::test]
async fn untagged_change_mid_drag_keeps_batch_monotonic() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    let base = Instant::now();

    sync.handle_change(&drag("a", 1.0, 0.0, Some(true)), base);
    sync.handle_change(&drag("a", 2.0, 0.0, None), at(base, 30));
    sync.handle_change(&drag("a", 3.0, 0.0, Some(true)), at(base, 60));

    let times: Vec<u64> = sync.pending_actions("a").iter().map(|a| a.time_since_batch_start).collect();
    assert_eq!(times, vec![0, 30, 60]);
}

#[tokio::test]
async fn remounted_node_continues_unflushed_batch() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    let base = Instant::now();

    sync.handle_change(&drag("a", 1.0, 0.0, Some(true)), base);
    sync.handle_change(&drag("a", 2.0, 0.0, Some(true)), at(base, 50));
    sync.handle_change(&NodeChange::Remove { id: "a".into() }, at(base, 60));
    sync.mount_node("a", NodeTransform::new(NodePosition::new(0.0, 0.0, 0), NodeSize::new(100.0, 50.0)));
    sync.handle_change(&drag("a", 3.0, 0.0, Some(true)), at(base, 70));

    assert!(crate::sync::is_monotonic(&sync.pending_actions("a")));
}

#[tokio::test]
async fn gesture_after_flush_restarts_at_zero() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    let base = Instant::now();
    sync.handle_change(&drag("a", 1.0, 0.0, Some(true)), base);
    sync.handle_change(&drag("a", 2.0, 0.0, Some(false)), at(base, 40));
    flush_all(&sync).await;

    sync.handle_change(&drag("a", 3.0, 0.0, Some(true)), at(base, 300));
    let times: Vec<u64> = sync.pending_actions("a").iter().map(|a| a.time_since_batch_start).collect();
    assert_eq!(times, vec![0]);
}

#[tokio::test]
async fn removed_node_still_flushes_pending_batch() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    let base = Instant::now();
    sync.begin_drag("a");
    sync.handle_change(&drag("a", 5.0, 5.0, Some(true)), base);
    sync.handle_change(&NodeChange::Remove { id: "a".into() }, at(base, 5));

    assert!(sync.node("a").is_none());
    assert!(sync.interacting().is_none());
    assert_eq!(flush_all(&sync).await, 1);
    assert_eq!(stored(&backend, "a").await.unwrap().len(), 1);
}

// =============================================================================
// playback
// =============================================================================

#[tokio::test]
async fn remote_batch_plays_onto_idle_node() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    let remote = vec![TransformAction::new(0, NodePosition::new(70.0, 80.0, 3), NodeSize::new(100.0, 50.0))];

    assert_eq!(sync.deliver("a", Some(remote)), Delivery::Enqueued);
    assert_eq!(sync.tick(Instant::now()), vec!["a".to_owned()]);
    let node = sync.node("a").unwrap();
    assert_eq!((node.x, node.y, node.z_index), (70.0, 80.0, 3));
}

#[tokio::test]
async fn remote_batch_waits_while_node_is_held() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    sync.begin_drag("a");
    let remote = vec![TransformAction::new(0, NodePosition::new(70.0, 80.0, 0), NodeSize::new(100.0, 50.0))];
    sync.deliver("a", Some(remote));

    assert!(sync.tick(Instant::now()).is_empty());
    assert_eq!(sync.node("a").unwrap().x, 0.0);
    assert_eq!(sync.queued_batches("a"), 1);
}

#[tokio::test]
async fn own_flushed_batch_is_not_replayed() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    sync.handle_change(&drag("a", 9.0, 9.0, Some(false)), Instant::now());
    flush_all(&sync).await;

    let echoed = stored(&backend, "a").await;
    assert_eq!(sync.deliver("a", echoed), Delivery::Echo);
    assert_eq!(sync.queued_batches("a"), 0);
}

// =============================================================================
// reconcile
// =============================================================================

#[tokio::test]
async fn reconcile_keeps_dragged_node_until_server_catches_up() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a", "b"]);
    sync.begin_drag("a");
    sync.handle_change(&drag("a", 200.0, 100.0, Some(false)), Instant::now());

    let stale = [
        PersistedNode { id: "a".into(), position: NodePosition::new(0.0, 0.0, 0), size: NodeSize::new(100.0, 50.0) },
        PersistedNode { id: "b".into(), position: NodePosition::new(9.0, 9.0, 0), size: NodeSize::new(100.0, 50.0) },
    ];
    sync.reconcile(&stale);
    assert_eq!(sync.node("a").unwrap().x, 200.0);
    assert_eq!(sync.node("b").unwrap().x, 9.0);

    let fresh = [PersistedNode {
        id: "a".into(),
        position: NodePosition::new(200.0, 100.0, 1),
        size: NodeSize::new(100.0, 50.0),
    }];
    sync.reconcile(&fresh);
    assert!(sync.interacting().is_none());
    assert!(sync.node("b").is_none());
}

// =============================================================================
// session
// =============================================================================

#[tokio::test]
async fn shutdown_flushes_remaining_batches() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    let session = sync.start();
    sync.handle_change(&drag("a", 42.0, 0.0, Some(false)), Instant::now());

    session.shutdown().await;
    assert_eq!(stored(&backend, "a").await.unwrap()[0].position.x, 42.0);
    assert!(sync.pending_actions("a").is_empty());
}

#[tokio::test(start_paused = true)]
async fn flush_loop_runs_on_interval() {
    let backend = MemoryBackend::new();
    let sync = mounted(&backend, &["a"]);
    let _session = sync.start();
    sync.handle_change(&drag("a", 7.0, 0.0, Some(false)), Instant::now());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(stored(&backend, "a").await.unwrap()[0].position.x, 7.0);
}

#[tokio::test]
async fn from_env_reads_sync_settings() {
    unsafe { std::env::set_var("SYNC_ECHO_MEMORY", "3") };
    let backend = MemoryBackend::new();
    let sync = SyncCoordinator::from_env(WORKSPACE, Arc::new(backend.scoped(Some("alice"))));
    unsafe { std::env::remove_var("SYNC_ECHO_MEMORY") };

    assert_eq!(sync.workspace_id(), WORKSPACE);
    assert_eq!(sync.config().echo_memory, 3);
}
