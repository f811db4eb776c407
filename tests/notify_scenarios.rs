// tests/notify_scenarios.rs
//
// End-to-end scenarios against the real platform watcher. Timings are
// generous; these only assert what every backend guarantees eventually.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::time::Duration;

use serde::Deserialize;

use jsonstore_watch::engine::{Token, WatchEngine};
use jsonstore_watch::records::{RecordEvent, RecordSubscription};
use jsonstore_watch::watch::{Event, Origin, PathTemplate};
use jsonstore_watch_test_utils::builders::{TempTree, WatchConfigBuilder};
use jsonstore_watch_test_utils::{drain_for, init_tracing, recv_matching, wait_until};

const WAIT: Duration = Duration::from_secs(5);

fn engine_for(tree: &TempTree) -> WatchEngine {
    init_tracing();
    let config = WatchConfigBuilder::new()
        .settle_delay_ms(50)
        .poll_timeout_ms(50)
        .build();
    WatchEngine::new(tree.root(), config).expect("engine should open")
}

fn on_path(path: &'static str) -> impl FnMut(&Event) -> bool {
    move |e: &Event| e.path().is_some_and(|p| p.as_str() == path)
}

async fn next_for(token: &mut Token, path: &'static str) -> Event {
    recv_matching(token, WAIT, on_path(path))
        .await
        .unwrap_or_else(|| panic!("no event for {path} within {WAIT:?}"))
}

#[tokio::test]
async fn text_file_lifecycle_in_root() {
    let tree = TempTree::new();
    let engine = engine_for(&tree);
    let mut token = engine.create_token().unwrap();
    token.register_root_directory().unwrap();
    token.register_file_pattern(r"^[^/]+\.txt$").unwrap();

    let note = engine.root().as_path().join("note.txt");
    fs::write(&note, "first").unwrap();
    let created = next_for(&mut token, "note.txt").await;
    assert!(
        matches!(created, Event::Created { origin: Origin::Watch, .. }),
        "got {created:?}"
    );

    // Give the backend a moment so the append is reported separately.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut file = OpenOptions::new().append(true).open(&note).unwrap();
    writeln!(file, "second").unwrap();
    drop(file);
    let modified = recv_matching(&mut token, WAIT, |e| matches!(e, Event::Modified { .. })).await;
    assert!(modified.is_some(), "append should be reported as a modification");

    fs::remove_file(&note).unwrap();
    let deleted = recv_matching(&mut token, WAIT, |e| matches!(e, Event::Deleted { .. })).await;
    assert_eq!(deleted.unwrap().path().unwrap().as_str(), "note.txt");

    fs::write(engine.root().as_path().join("note.json"), "{}").unwrap();
    let stray = drain_for(&mut token, Duration::from_millis(300)).await;
    assert!(
        stray.iter().all(|e| e.path().is_none_or(|p| p.as_str() != "note.json")),
        "note.json must not be reported: {stray:?}"
    );
}

#[tokio::test]
async fn new_subdirectory_is_caught_up_then_watched() {
    let tree = TempTree::new();
    let engine = engine_for(&tree);
    let mut token = engine.create_token().unwrap();
    token.register_root_directory().unwrap();
    token.register_directory_pattern("^sub$").unwrap();
    token.register_file_pattern(r"^(sub/)?[^/]+\.txt$").unwrap();

    let sub = engine.root().as_path().join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("a.txt"), "early").unwrap();

    // Whether the scan or the new watch sees a.txt first is a race; either
    // way it must be reported.
    let early = next_for(&mut token, "sub/a.txt").await;
    assert!(matches!(early, Event::Created { .. }), "got {early:?}");

    assert!(
        wait_until(WAIT, || token
            .snapshot()
            .is_some_and(|s| s.watched_dirs().contains(&"sub".to_string())))
        .await
    );
    // Let the catch-up scan finish before writing the next file.
    tokio::time::sleep(Duration::from_millis(200)).await;

    fs::write(sub.join("b.txt"), "late").unwrap();
    let late = recv_matching(&mut token, WAIT, |e| {
        matches!(e, Event::Created { path, origin: Origin::Watch, .. } if path.as_str() == "sub/b.txt")
    })
    .await;
    assert!(late.is_some(), "sub/b.txt should arrive from the live watch");

    fs::remove_dir_all(&sub).unwrap();
    assert!(
        wait_until(WAIT, || token
            .snapshot()
            .is_some_and(|s| s.watched_dirs() == vec![""]))
        .await,
        "deleted subdirectory should be forgotten"
    );
    assert_eq!(engine.watch_key_count(), 1);
}

#[derive(Debug, Deserialize)]
struct Profile {
    name: String,
}

#[tokio::test]
async fn record_subscription_over_real_files() {
    let tree = TempTree::new().dir("profiles");
    let engine = engine_for(&tree);
    let template = PathTemplate::parse("profiles/{handle}.json").unwrap();
    let mut sub: RecordSubscription<Profile> = RecordSubscription::subscribe(&engine, template).unwrap();

    fs::write(
        engine.root().as_path().join("profiles/ada.json"),
        r#"{"name": "Ada"}"#,
    )
    .unwrap();

    let event = tokio::time::timeout(WAIT, async {
        loop {
            match sub.next().await {
                Some(RecordEvent::Created { key, record, .. })
                | Some(RecordEvent::Updated { key, record, .. }) => return Some((key, record)),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await
    .expect("record event within timeout");

    let (key, record) = event.unwrap();
    assert_eq!(key.get("handle"), Some("ada"));
    assert_eq!(record.name, "Ada");

    engine.shut_down();
    assert!(sub.token().is_destroyed());
    assert!(!engine.is_running());
}
