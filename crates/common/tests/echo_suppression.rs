//! Watcher behaviour against the real filesystem watcher

mod support;

use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::watch;

use common::peer::protocol::MemoryNetwork;
use common::snapshot::{snapshot, Snap};
use common::store::{MemoryStore, ReplicatedStore, SNAP_KEY};
use common::sync::SyncEvent;

use support::{connect_all, eventually, fast_config, init_tracing, TestNode};

async fn wait_for_publish(rx: &mut tokio::sync::broadcast::Receiver<SyncEvent>) -> usize {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no publish within timeout")
            .unwrap();
        if let SyncEvent::Published { entries } = event {
            return entries;
        }
    }
}

#[tokio::test]
async fn local_write_is_published() {
    init_tracing();
    let network = MemoryNetwork::new();
    let store = MemoryStore::new();
    let a = TestNode::new(&network, &store, 1, fast_config());
    let mut activity = a.context.activity().subscribe();

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let running = tokio::spawn(a.adapter.clone().run(shutdown_rx));
    assert_eq!(wait_for_publish(&mut activity).await, 0);

    a.write("fresh.txt", b"fresh");

    let published = eventually(Duration::from_secs(5), || {
        let store = store.clone();
        async move {
            match store.get(SNAP_KEY).await.unwrap() {
                Some(bytes) => Snap::from_bytes(&bytes)
                    .unwrap()
                    .metas
                    .iter()
                    .any(|meta| meta.path == "fresh.txt"),
                None => false,
            }
        }
    })
    .await;
    assert!(published);

    shutdown_tx.send(()).unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn hidden_and_ignored_changes_are_not_published() {
    init_tracing();
    let network = MemoryNetwork::new();
    let store = MemoryStore::new();
    let a = TestNode::new(&network, &store, 1, fast_config());
    std::fs::create_dir_all(a.root().join(".git")).unwrap();
    let mut activity = a.context.activity().subscribe();

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let running = tokio::spawn(a.adapter.clone().run(shutdown_rx));
    wait_for_publish(&mut activity).await;

    a.write(".git/index", b"index");
    a.write(".swap", b"editor state");
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(matches!(activity.try_recv(), Err(TryRecvError::Empty)));

    shutdown_tx.send(()).unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn pulled_file_is_not_republished() {
    init_tracing();
    let network = MemoryNetwork::new();
    let store = MemoryStore::new();
    let a = TestNode::new(&network, &store, 1, fast_config());
    let b = TestNode::new(&network, &store, 2, fast_config());
    connect_all(&[&a, &b]);
    let mut activity = b.context.activity().subscribe();

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let running = tokio::spawn(b.adapter.clone().run(shutdown_rx));
    wait_for_publish(&mut activity).await;

    a.write("from_a.txt", b"payload from a");
    b.coordinator
        .reconcile(snapshot(a.id, a.root()).unwrap())
        .await
        .unwrap();
    assert_eq!(b.read("from_a.txt").unwrap(), b"payload from a");

    // long enough for settle delay, debounce and a flush tick
    tokio::time::sleep(Duration::from_millis(400)).await;

    let mut republished = false;
    loop {
        match activity.try_recv() {
            Ok(SyncEvent::Published { .. }) => republished = true,
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert!(!republished);

    shutdown_tx.send(()).unwrap();
    running.await.unwrap().unwrap();
}
