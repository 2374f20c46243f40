//! End-to-end tests for the database-first consistency engine: write
//! coalescing, internal/external event classification, and rename-proof
//! ID links.

use std::time::Duration;

use flint_core::engine::{EngineOptions, NewNote, NoteEngine, NoteUpdate};
use flint_core::queue::QueueOptions;
use flint_core::watcher::{VaultEventKind, WatcherOptions};
use tempfile::TempDir;
use tokio::time::timeout;

fn spec_options() -> EngineOptions {
    EngineOptions {
        queue: QueueOptions {
            delay: Duration::from_millis(1000),
            write_ttl: Duration::from_millis(1000),
        },
        watcher: WatcherOptions {
            debounce: Duration::from_millis(100),
            startup_grace: Duration::from_millis(500),
        },
    }
}

async fn engine_with_watcher(dir: &TempDir) -> NoteEngine {
    let engine = NoteEngine::open_with(dir.path(), spec_options()).await.unwrap();
    engine.start_watcher(spec_options().watcher).unwrap();
    // Let the startup grace window pass before tests provoke events.
    tokio::time::sleep(Duration::from_millis(600)).await;
    engine
}

#[tokio::test(flavor = "multi_thread")]
async fn rapid_typing_produces_no_external_events() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with_watcher(&dir).await;
    let mut events = engine.subscribe_events().unwrap();

    let note = engine
        .create_note(NewNote {
            note_type: "general".to_string(),
            title: "Rapid".to_string(),
            content: "body v0".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    // Five updates at 400 ms intervals, each carrying the previous hash.
    let mut hash = note.content_hash.clone();
    for n in 1..=5 {
        let body = format!("body v{n}");
        let outcome = engine.update_note(&note.id, &body, &hash).await.unwrap();
        let NoteUpdate::Applied(updated) = outcome else {
            panic!("update {n} unexpectedly conflicted");
        };
        hash = updated.content_hash;
        tokio::time::sleep(Duration::from_millis(400)).await;
    }

    // Let the coalesced write land and its notification settle.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let got = events.try_recv();
    assert!(got.is_err(), "no external event may surface, got {got:?}");

    let stored = engine.get_note(&note.id).unwrap().unwrap();
    assert_eq!(stored.content, "body v5");

    // Exactly one coalesced write reached disk, with the final content.
    let on_disk = std::fs::read_to_string(dir.path().join(&note.path)).unwrap();
    assert!(on_disk.ends_with("body v5"));

    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn external_edit_is_detected() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with_watcher(&dir).await;

    let note = engine
        .create_note(NewNote {
            note_type: "general".to_string(),
            title: "Watched".to_string(),
            content: "original".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    // Wait out the write TTL so the creation's hash is no longer expected.
    tokio::time::sleep(Duration::from_millis(2200)).await;
    let mut events = engine.subscribe_events().unwrap();

    let external = format!(
        "---\nflint_id: {}\nflint_type: general\nflint_title: Watched\n---\n\nedited elsewhere",
        note.id
    );
    std::fs::write(dir.path().join(&note.path), &external).unwrap();

    let event = timeout(Duration::from_secs(3), events.recv())
        .await
        .expect("external event must fire")
        .unwrap();
    assert_eq!(event.kind, VaultEventKind::Changed);
    assert_eq!(event.path, note.path);

    // Exactly one event for the edit.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(events.try_recv().is_err(), "only one external-change expected");

    engine.sync().await.unwrap();
    let stored = engine.get_note(&note.id).unwrap().unwrap();
    assert_eq!(stored.content, "edited elsewhere");

    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn id_link_survives_title_rename() {
    let dir = TempDir::new().unwrap();
    let engine = NoteEngine::open_with(dir.path(), spec_options()).await.unwrap();

    let target = engine
        .create_note(NewNote {
            note_type: "general".to_string(),
            title: "Target".to_string(),
            content: "target body".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let source = engine
        .create_note(NewNote {
            note_type: "general".to_string(),
            title: "Source".to_string(),
            content: "See [[Target]]".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    // The title link was rewritten to an ID link at save time.
    let expected_body = format!("See [[{}|Target]]", target.id);
    assert_eq!(source.content, expected_body);

    let links = engine.db().outgoing_links(&source.id).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].target_id, Some(target.id.clone()));

    engine.rename_note_title(&target.id, "Target v2").await.unwrap();
    assert_eq!(
        engine.get_note(&target.id).unwrap().unwrap().title,
        "Target v2"
    );

    // The source body and its link row are untouched by the rename.
    let source_after = engine.get_note(&source.id).unwrap().unwrap();
    assert_eq!(source_after.content, expected_body);
    let links = engine.db().outgoing_links(&source.id).unwrap();
    assert_eq!(links[0].target_id, Some(target.id.clone()));

    // Backlinks still reach the renamed note.
    let backlinks = engine.backlinks(&target.id).unwrap();
    assert_eq!(backlinks.len(), 1);
    assert_eq!(backlinks[0].source_id, source.id);

    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_target_breaks_links_without_dropping_rows() {
    let dir = TempDir::new().unwrap();
    let engine = NoteEngine::open_with(dir.path(), spec_options()).await.unwrap();

    let target = engine
        .create_note(NewNote {
            note_type: "general".to_string(),
            title: "Doomed".to_string(),
            content: String::new(),
            ..Default::default()
        })
        .await
        .unwrap();
    let source = engine
        .create_note(NewNote {
            note_type: "general".to_string(),
            title: "Pointer".to_string(),
            content: "Go [[Doomed]]".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    engine.delete_note(&target.id).await.unwrap();

    let links = engine.db().outgoing_links(&source.id).unwrap();
    assert_eq!(links.len(), 1);
    assert!(links[0].target_id.is_none(), "link must degrade to broken");

    engine.shutdown().await;
}
