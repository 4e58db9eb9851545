//! Mirror Tests
//!
//! A host model relays its diffs over a channel, encoded as MessagePack, to a
//! mirror model that replays them. After every step the mirror's root must
//! equal the host's.

use std::sync::Arc;

use lattice_sync::{path, Diff, Lifetime, MapDiff, Model, ReactiveModel};
use tokio::sync::mpsc;

/// Wire a host model to a fresh mirror through an unbounded channel.
fn connect() -> (ReactiveModel, Arc<ReactiveModel>, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let host = ReactiveModel::new(Lifetime::new()).with_diff_consumer(move |diff: &MapDiff| {
        let frame = rmp_serde::to_vec_named(diff).expect("encode diff");
        tx.send(frame).expect("mirror hung up");
    });
    let mirror = Arc::new(ReactiveModel::new(Lifetime::new()));
    (host, mirror, rx)
}

fn replay(mirror: &ReactiveModel, frame: &[u8]) {
    let diff: MapDiff = rmp_serde::from_slice(frame).expect("decode diff");
    mirror
        .perform_transaction(|old| old.patch(&Diff::Map(diff)))
        .expect("apply diff");
}

#[tokio::test]
async fn mirror_tracks_host() {
    let (host, mirror, mut rx) = connect();

    let replayer = {
        let mirror = Arc::clone(&mirror);
        tokio::spawn(async move {
            let mut applied = 0usize;
            while let Some(frame) = rx.recv().await {
                replay(&mirror, &frame);
                applied += 1;
            }
            applied
        })
    };

    host.transaction(|m| path!["b", "c"].put_in(m, "x")).unwrap();
    host.transaction(|m| path!["items", lattice_sync::Segment::Last].put_in(m, 1)).unwrap();
    host.transaction(|m| path!["items", lattice_sync::Segment::Last].put_in(m, 2.5)).unwrap();
    host.transaction(|m| path!["b", "c"].put_in(m, "y")).unwrap();
    host.transaction(|m| path!["b"].put_in(m, Model::Absent)).unwrap();
    // No-op: never reaches the channel.
    host.transaction(|m| m).unwrap();

    let expected = host.root();
    drop(host);

    let applied = replayer.await.expect("replayer panicked");
    assert_eq!(applied, 5);
    assert_eq!(mirror.root(), expected);
}

#[tokio::test]
async fn hosted_subtree_reaches_mirror_without_lifetime() {
    let (host, mirror, mut rx) = connect();

    let lifetime = host
        .host(&path!["panel"], &["tool"], |path, _, init| {
            let title = path / "title";
            init.mutate(move |m| title.put_in(m, "Build"))
        })
        .unwrap();

    let frame = rx.recv().await.expect("one diff");
    replay(&mirror, &frame);
    assert!(rx.try_recv().is_err());

    let panel = mirror.get(&path!["panel"]).unwrap();
    assert_eq!(mirror.get(&path!["panel", "title"]), Some(Model::from("Build")));
    // Markers travel, lifetimes stay local.
    assert_eq!(panel.meta().and_then(|meta| meta.host.as_ref()).map(|h| &h.path), Some(&path!["panel"]));
    assert_eq!(panel.meta().map(|meta| meta.tags.clone()), Some(vec!["tool".to_string()]));
    assert!(panel.lifetime().is_none());
    assert!(!lifetime.is_terminated());
}

#[tokio::test]
async fn mirror_subscribers_see_replayed_changes() {
    let (host, mirror, mut rx) = connect();
    let watcher = Lifetime::new();
    let title = mirror.subscribe(&watcher, path!["title"]);

    host.transaction(|m| path!["title"].put_in(m, "Run")).unwrap();
    let frame = rx.recv().await.expect("one diff");
    replay(&mirror, &frame);

    assert_eq!(title.get(), Some(Model::from("Run")));
}
