// tests/engine_events.rs
//
// Classification and delivery of native notifications, driven through the
// mock backend against a real directory tree.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use jsonstore_watch::engine::{Token, WatchEngine};
use jsonstore_watch::types::RelPath;
use jsonstore_watch::watch::mock::MockBackend;
use jsonstore_watch::watch::{Event, NativeEvent, Origin};
use jsonstore_watch_test_utils::builders::{TempTree, WatchConfigBuilder};
use jsonstore_watch_test_utils::{drain_for, init_tracing, recv_matching, wait_until};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(150);

struct Harness {
    tree: TempTree,
    engine: WatchEngine,
    backend: MockBackend,
}

impl Harness {
    fn new(tree: TempTree) -> Self {
        init_tracing();
        let backend = MockBackend::new();
        let config = WatchConfigBuilder::new()
            .settle_delay_ms(10)
            .poll_timeout_ms(50)
            .build();
        let engine = WatchEngine::with_backend(tree.root(), config, Arc::new(backend.clone()))
            .expect("engine should open");
        Self {
            tree,
            engine,
            backend,
        }
    }

    /// Absolute path under the canonical root.
    fn abs(&self, rel: &str) -> PathBuf {
        self.engine.root().as_path().join(rel)
    }

    fn token(&self, dir_patterns: &[&str], file_patterns: &[&str]) -> Token {
        let token = self.engine.create_token().unwrap();
        for p in dir_patterns {
            token.register_directory_pattern(p).unwrap();
        }
        for p in file_patterns {
            token.register_file_pattern(p).unwrap();
        }
        token
    }

    fn emit(&self, events: impl IntoIterator<Item = NativeEvent>) {
        assert!(self.backend.emit(events), "mock primitive should be open");
    }
}

fn is_created(path: &'static str, origin: Origin) -> impl FnMut(&Event) -> bool {
    move |e: &Event| matches!(e, Event::Created { path: p, origin: o, .. } if p.as_str() == path && *o == origin)
}

#[tokio::test]
async fn matching_file_in_root_is_delivered_once() {
    let h = Harness::new(TempTree::new());
    let mut token = h.token(&["^$"], &[r"^[^/]+\.txt$"]);

    h.tree.write("note.txt", "hello");
    h.emit([NativeEvent::Created(h.abs("note.txt"))]);

    let events = drain_for(&mut token, QUIET).await;
    assert_eq!(events.len(), 1, "got {events:?}");
    assert!(is_created("note.txt", Origin::Watch)(&events[0]));
}

#[tokio::test]
async fn modify_and_delete_follow_creation_in_order() {
    let h = Harness::new(TempTree::new());
    let mut token = h.token(&["^$"], &[r"^[^/]+\.txt$"]);

    h.tree.write("note.txt", "v1");
    h.emit([
        NativeEvent::Created(h.abs("note.txt")),
        NativeEvent::Modified(h.abs("note.txt")),
        NativeEvent::Deleted(h.abs("note.txt")),
    ]);

    let events = drain_for(&mut token, QUIET).await;
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            Event::Created { .. } => "created",
            Event::Modified { .. } => "modified",
            Event::Deleted { .. } => "deleted",
            Event::Overflow => "overflow",
        })
        .collect();
    assert_eq!(kinds, vec!["created", "modified", "deleted"]);
}

#[tokio::test]
async fn non_matching_file_produces_nothing() {
    let h = Harness::new(TempTree::new());
    let mut token = h.token(&["^$"], &[r"^[^/]+\.txt$"]);

    h.tree.write("note.json", "{}");
    h.emit([NativeEvent::Created(h.abs("note.json"))]);

    assert!(drain_for(&mut token, QUIET).await.is_empty());
}

#[tokio::test]
async fn notifications_from_unwatched_directories_are_dropped() {
    let h = Harness::new(TempTree::new().dir("elsewhere"));
    let mut token = h.token(&["^$"], &[".*"]);

    h.tree.write("elsewhere/a.txt", "x");
    h.emit([NativeEvent::Created(h.abs("elsewhere/a.txt"))]);

    assert!(drain_for(&mut token, QUIET).await.is_empty());
}

#[tokio::test]
async fn every_matching_token_receives_the_event() {
    let h = Harness::new(TempTree::new());
    let mut txt = h.token(&["^$"], &[r"\.txt$"]);
    let mut all = h.token(&["^$"], &[".*"]);
    let mut json = h.token(&["^$"], &[r"\.json$"]);

    h.tree.write("note.txt", "x");
    h.emit([NativeEvent::Modified(h.abs("note.txt"))]);

    assert!(recv_matching(&mut txt, WAIT, |e| e.path().is_some()).await.is_some());
    assert!(recv_matching(&mut all, WAIT, |e| e.path().is_some()).await.is_some());
    assert!(drain_for(&mut json, QUIET).await.is_empty());
}

#[tokio::test]
async fn new_directory_is_watched_and_scanned() {
    let h = Harness::new(TempTree::new());
    let mut token = h.token(&["^$", "^sub$"], &[r"^(sub/)?[^/]+\.txt$"]);

    // Content lands before the engine hears about the directory.
    h.tree.write("sub/a.txt", "early");
    h.emit([NativeEvent::Created(h.abs("sub"))]);

    let scanned = recv_matching(&mut token, WAIT, is_created("sub/a.txt", Origin::Scan)).await;
    assert!(scanned.is_some(), "catch-up scan should report sub/a.txt");
    assert!(h.backend.is_watched(h.abs("sub")));

    let snap = token.snapshot().unwrap();
    assert_eq!(snap.watched_dirs(), vec!["", "sub"]);
    let sub = h.engine.root().join(&RelPath::new("sub").unwrap());
    assert!(snap.entry("").unwrap().children.contains(&sub));

    h.tree.write("sub/b.txt", "late");
    h.emit([NativeEvent::Created(h.abs("sub/b.txt"))]);
    let live = recv_matching(&mut token, WAIT, is_created("sub/b.txt", Origin::Watch)).await;
    assert!(live.is_some());
}

#[tokio::test]
async fn scan_descends_into_matching_subdirectories() {
    let h = Harness::new(TempTree::new());
    let mut token = h.token(&["^$", "^a(/.*)?$"], &[r"\.txt$"]);

    h.tree.write("a/b/c/deep.txt", "x");
    h.emit([NativeEvent::Created(h.abs("a"))]);

    let found = recv_matching(&mut token, WAIT, is_created("a/b/c/deep.txt", Origin::Scan)).await;
    assert!(found.is_some());
    assert!(
        wait_until(WAIT, || token.snapshot().unwrap().watched_dirs().len() == 4).await,
        "root, a, a/b and a/b/c should all be watched"
    );
}

#[tokio::test]
async fn non_matching_directory_is_recorded_but_not_watched() {
    let h = Harness::new(TempTree::new());
    let mut token = h.token(&["^$"], &[".*"]);

    h.tree.mkdir("plain");
    h.emit([NativeEvent::Created(h.abs("plain"))]);

    assert!(drain_for(&mut token, QUIET).await.is_empty());
    assert!(!h.backend.is_watched(h.abs("plain")));
    let snap = token.snapshot().unwrap();
    let plain = h.engine.root().join(&RelPath::new("plain").unwrap());
    assert!(snap.entry("").unwrap().children.contains(&plain));
}

#[tokio::test]
async fn deleting_a_watched_directory_tears_down_its_entry() {
    let h = Harness::new(TempTree::new().dir("sub/inner"));
    let mut token = h.token(&["^$", "^sub(/.*)?$"], &[".*"]);
    assert_eq!(token.snapshot().unwrap().watched_dirs(), vec!["", "sub", "sub/inner"]);

    h.tree.remove_dir("sub");
    h.emit([NativeEvent::Deleted(h.abs("sub"))]);

    assert!(
        wait_until(WAIT, || token.snapshot().unwrap().watched_dirs() == vec![""]).await,
        "sub and sub/inner entries should be gone"
    );
    let snap = token.snapshot().unwrap();
    assert!(snap.entry("").unwrap().children.is_empty());
    assert!(!h.backend.is_watched(h.abs("sub")));
    assert!(!h.backend.is_watched(h.abs("sub/inner")));
    assert_eq!(h.engine.watch_key_count(), 1);
    // A directory deletion is bookkeeping, not a file event.
    assert!(drain_for(&mut token, QUIET).await.is_empty());
}

#[tokio::test]
async fn deleting_a_file_has_no_directory_side_effect() {
    let h = Harness::new(TempTree::new().dir("sub").file("note.txt", "x"));
    let mut token = h.token(&["^$", "^sub$"], &[r"\.txt$"]);

    h.tree.remove("note.txt");
    h.emit([NativeEvent::Deleted(h.abs("note.txt"))]);

    let deleted = recv_matching(&mut token, WAIT, |e| matches!(e, Event::Deleted { .. })).await;
    assert_eq!(deleted.unwrap().path().unwrap().as_str(), "note.txt");
    let snap = token.snapshot().unwrap();
    assert_eq!(snap.watched_dirs(), vec!["", "sub"]);
    assert_eq!(snap.entry("").unwrap().children.len(), 1);
}

#[tokio::test]
async fn repeated_directory_deletion_is_not_a_file_event() {
    let h = Harness::new(TempTree::new().dir("sub"));
    let mut token = h.token(&["^$", "^sub$"], &[".*"]);

    h.tree.remove_dir("sub");
    // Parent and self registrations both report the deletion.
    h.emit([NativeEvent::Deleted(h.abs("sub")), NativeEvent::Deleted(h.abs("sub"))]);
    h.emit([NativeEvent::DeletedDir(h.abs("sub"))]);

    let events = drain_for(&mut token, QUIET).await;
    assert!(events.is_empty(), "directory deletion leaked as {events:?}");
    assert_eq!(token.snapshot().unwrap().watched_dirs(), vec![""]);
    assert_eq!(h.engine.watch_key_count(), 1);
}

#[tokio::test]
async fn unknown_directory_deletion_is_dropped() {
    let h = Harness::new(TempTree::new());
    let mut token = h.token(&["^$"], &[".*"]);

    h.emit([NativeEvent::DeletedDir(h.abs("never-seen"))]);

    assert!(drain_for(&mut token, QUIET).await.is_empty());
}

#[tokio::test]
async fn directory_watched_without_its_parent_is_forgotten_on_delete() {
    let h = Harness::new(TempTree::new().dir("sub"));
    let mut token = h.token(&["^sub$"], &[".*"]);
    assert_eq!(token.snapshot().unwrap().watched_dirs(), vec!["sub"]);
    assert_eq!(h.engine.watch_key_count(), 1);

    h.tree.remove_dir("sub");
    // Only the directory's own registration can report this.
    h.emit([NativeEvent::Deleted(h.abs("sub"))]);

    assert!(
        wait_until(WAIT, || token.snapshot().unwrap().watched_dirs().is_empty()).await,
        "sub entry should be gone"
    );
    assert_eq!(h.engine.watch_key_count(), 0);
    assert!(!h.backend.is_watched(h.abs("sub")));
    assert!(drain_for(&mut token, QUIET).await.is_empty());
}

#[tokio::test]
async fn recreated_directory_is_watched_again() {
    let h = Harness::new(TempTree::new().dir("sub"));
    let first = h.token(&["^sub$"], &[]);

    h.tree.remove_dir("sub");
    h.emit([NativeEvent::Deleted(h.abs("sub"))]);
    assert!(wait_until(WAIT, || h.engine.watch_key_count() == 0).await);
    let calls = h.backend.watch_calls();

    h.tree.mkdir("sub");
    let mut second = h.token(&["^sub$"], &[r"^sub/[^/]+\.txt$"]);
    assert!(h.backend.is_watched(h.abs("sub")));
    assert_eq!(h.backend.watch_calls(), calls + 1);
    assert_eq!(second.snapshot().unwrap().watched_dirs(), vec!["sub"]);
    assert!(first.snapshot().unwrap().watched_dirs().is_empty());

    h.tree.write("sub/x.txt", "x");
    h.emit([NativeEvent::Created(h.abs("sub/x.txt"))]);
    let got = recv_matching(&mut second, WAIT, is_created("sub/x.txt", Origin::Watch)).await;
    assert!(got.is_some(), "sub/x.txt should come from the fresh registration");
}

#[tokio::test]
async fn failed_watch_still_records_the_child_for_every_token() {
    let h = Harness::new(TempTree::new());
    let a = h.token(&["^$", "^sub$"], &[]);
    let b = h.token(&["^$", "^sub$"], &[]);
    h.backend.refuse_watch(h.abs("sub"));

    h.tree.mkdir("sub");
    h.emit([NativeEvent::Created(h.abs("sub"))]);

    let sub = h.engine.root().join(&RelPath::new("sub").unwrap());
    let recorded = |t: &Token| t.snapshot().unwrap().entry("").unwrap().children.contains(&sub);
    assert!(
        wait_until(WAIT, || recorded(&a) && recorded(&b)).await,
        "both tokens should record sub as a child of the root"
    );
    assert!(!h.backend.is_watched(h.abs("sub")));
    assert_eq!(a.snapshot().unwrap().watched_dirs(), vec![""]);
    assert_eq!(b.snapshot().unwrap().watched_dirs(), vec![""]);
}

#[tokio::test]
async fn overflow_reaches_only_tokens_owning_the_directory() {
    let h = Harness::new(TempTree::new().dir("a").dir("b"));
    let mut on_a = h.token(&["^a$"], &[]);
    let mut on_b = h.token(&["^b$"], &[]);

    h.emit([NativeEvent::Overflow(Some(h.abs("a")))]);

    let got = recv_matching(&mut on_a, WAIT, |e| matches!(e, Event::Overflow)).await;
    assert!(got.is_some());
    assert!(drain_for(&mut on_b, QUIET).await.is_empty());
}

#[tokio::test]
async fn overflow_without_a_directory_reaches_every_watching_token() {
    let h = Harness::new(TempTree::new().dir("a"));
    let mut on_root = h.token(&["^$"], &[]);
    let mut on_a = h.token(&["^a$"], &[]);
    let mut idle = h.engine.create_token().unwrap();

    h.emit([NativeEvent::Overflow(None)]);

    assert!(recv_matching(&mut on_root, WAIT, |e| matches!(e, Event::Overflow)).await.is_some());
    assert!(recv_matching(&mut on_a, WAIT, |e| matches!(e, Event::Overflow)).await.is_some());
    assert!(drain_for(&mut idle, QUIET).await.is_empty());
}

#[tokio::test]
async fn events_stop_after_destroy() {
    let h = Harness::new(TempTree::new());
    let mut token = h.token(&["^$"], &[".*"]);
    let _other = h.token(&["^$"], &[".*"]);

    token.destroy();
    h.tree.write("late.txt", "x");
    h.emit([NativeEvent::Created(h.abs("late.txt"))]);

    assert!(drain_for(&mut token, QUIET).await.is_empty());
}
