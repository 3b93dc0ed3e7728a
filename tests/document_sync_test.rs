//! Integration tests for live document sessions: attach authorization,
//! fan-out, persistence, idle unloading and failure handling

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use collabspace::backend::collab::{AttachmentEvent, CrdtDocument, CrdtEngine, DiamondEngine, SessionAttachment};
use collabspace::backend::store::RelationalStore;
use collabspace::shared::{EditOperation, ErrorKind};
use common::{
    register, spawn_app, spawn_app_with, test_config, wait_until_unloaded, InstrumentedStore, TestApp, TestUser,
};

struct Fixture {
    owner: TestUser,
    code: String,
    group_id: Uuid,
    document_id: Uuid,
}

async fn fixture(app: &TestApp) -> Fixture {
    let owner = register(app, "Owner", "owner@example.com").await;
    let group = app.state.guard.create_group(owner.id, "Study", "").await.unwrap();
    let doc = app
        .state
        .documents
        .create_document(owner.id, &group.code, "Notes")
        .await
        .unwrap();
    Fixture {
        owner,
        code: group.code,
        group_id: group.id,
        document_id: doc.id,
    }
}

async fn next_update(attachment: &mut SessionAttachment) -> AttachmentEvent {
    tokio::time::timeout(Duration::from_secs(2), attachment.next_event())
        .await
        .expect("no event within two seconds")
        .expect("session closed")
}

#[tokio::test]
async fn test_non_member_attach_never_reads_state() {
    let app = spawn_app();
    let f = fixture(&app).await;
    let outsider = register(&app, "Outsider", "outsider@example.com").await;

    let result = app.state.bridge.attach(f.document_id, &outsider.identity).await;
    assert_kind!(result, ErrorKind::NotAuthorized);
    assert_eq!(app.store.reads(), 0);
    assert!(app.state.bridge.live_documents().await.is_empty());
}

#[tokio::test]
async fn test_unknown_document_is_not_found() {
    let app = spawn_app();
    let f = fixture(&app).await;

    let result = app.state.bridge.attach(Uuid::new_v4(), &f.owner.identity).await;
    assert_kind!(result, ErrorKind::NotFound);
    assert_eq!(app.store.reads(), 0);
}

#[tokio::test]
async fn test_new_document_starts_empty() {
    let app = spawn_app();
    let f = fixture(&app).await;

    let attachment = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();
    assert_eq!(attachment.initial_state().content, "");
    assert_eq!(attachment.document_id(), f.document_id);
    assert_eq!(app.store.reads(), 1);
}

#[tokio::test]
async fn test_edits_reach_every_client_including_author() {
    let app = spawn_app();
    let f = fixture(&app).await;
    let member = register(&app, "Member", "member@example.com").await;
    app.state.guard.join(member.id, &f.code).await.unwrap();

    let mut alice = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();
    let mut bob = app.state.bridge.attach(f.document_id, &member.identity).await.unwrap();
    assert_ne!(alice.client_id(), bob.client_id());
    // Both clients share one session and one load
    assert_eq!(app.store.reads(), 1);

    let author = alice.client_id();
    let state = alice.edit(vec![EditOperation::insert(0, "hello")]).await.unwrap();
    assert_eq!(state.content, "hello");

    for attachment in [&mut alice, &mut bob] {
        match next_update(attachment).await {
            AttachmentEvent::Update(event) => {
                assert_eq!(event.state.content, "hello");
                assert_eq!(event.author, author);
            }
            other => panic!("Expected update, got {:?}", other),
        }
    }

    let state = bob.edit(vec![EditOperation::insert(5, " world")]).await.unwrap();
    assert_eq!(state.content, "hello world");
    assert_eq!(alice.snapshot().await.unwrap().content, "hello world");
}

#[tokio::test]
async fn test_batch_applies_in_order() {
    let app = spawn_app();
    let f = fixture(&app).await;
    let attachment = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();

    let state = attachment
        .edit(vec![
            EditOperation::insert(0, "abcdef"),
            EditOperation::delete(1, 3),
            EditOperation::insert(4, "!"),
        ])
        .await
        .unwrap();
    assert_eq!(state.content, "adef!");
}

#[tokio::test]
async fn test_out_of_bounds_batch_is_rejected_whole() {
    let app = spawn_app();
    let f = fixture(&app).await;
    let attachment = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();
    attachment.edit(vec![EditOperation::insert(0, "abc")]).await.unwrap();

    let result = attachment
        .edit(vec![EditOperation::insert(3, "d"), EditOperation::delete(2, 10)])
        .await;
    assert_kind!(result, ErrorKind::Validation);
    assert_eq!(attachment.snapshot().await.unwrap().content, "abc");
}

#[tokio::test]
async fn test_changes_are_persisted_and_reload_byte_identical() {
    let store = Arc::new(InstrumentedStore::new());
    let app = spawn_app_with(test_config(), store.clone());
    let f = fixture(&app).await;

    {
        let attachment = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();
        attachment.edit(vec![EditOperation::insert(0, "persist me")]).await.unwrap();
        app.state.bridge.flush(f.document_id).await.unwrap();
    }
    let saved = store.last_saved().expect("state was saved");
    assert!(wait_until_unloaded(&app).await);

    // A fresh service graph over the same store plays the part of a restart
    let restarted = spawn_app_with(test_config(), store.clone());
    let attachment = restarted
        .state
        .bridge
        .attach(f.document_id, &f.owner.identity)
        .await
        .unwrap();
    assert_eq!(attachment.initial_state().content, "persist me");
    assert_eq!(restarted.engine.loaded(), vec![saved]);
}

#[tokio::test]
async fn test_idle_session_is_unloaded_after_final_persist() {
    let app = spawn_app();
    let f = fixture(&app).await;

    let attachment = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();
    attachment.edit(vec![EditOperation::insert(0, "bye")]).await.unwrap();
    assert_eq!(app.state.bridge.live_documents().await, vec![f.document_id]);
    drop(attachment);

    assert!(wait_until_unloaded(&app).await);
    assert!(app.store.writes() >= 1);
    assert!(app.store.last_saved().is_some());

    // Reattaching loads a fresh session from storage
    let attachment = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();
    assert_eq!(attachment.initial_state().content, "bye");
    assert_eq!(app.store.reads(), 2);
}

#[tokio::test]
async fn test_reattach_within_grace_keeps_session() {
    let mut config = test_config();
    config.session_idle_grace_ms = 5_000;
    let app = spawn_app_with(config, Arc::new(InstrumentedStore::new()));
    let f = fixture(&app).await;

    let first = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();
    first.edit(vec![EditOperation::insert(0, "kept")]).await.unwrap();
    drop(first);

    let second = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();
    assert_eq!(second.initial_state().content, "kept");
    assert_eq!(app.store.reads(), 1);
}

#[tokio::test]
async fn test_load_failure_is_a_storage_error_not_an_empty_document() {
    let app = spawn_app();
    let f = fixture(&app).await;
    app.store.fail_state_reads.store(true, Ordering::SeqCst);

    let result = app.state.bridge.attach(f.document_id, &f.owner.identity).await;
    assert_kind!(result, ErrorKind::StorageError);
    // One retry before giving up
    assert_eq!(app.store.reads(), 2);
    assert!(wait_until_unloaded(&app).await);

    app.store.fail_state_reads.store(false, Ordering::SeqCst);
    let attachment = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();
    assert_eq!(attachment.initial_state().content, "");
}

#[tokio::test]
async fn test_corrupt_snapshot_fails_attach() {
    let app = spawn_app();
    let f = fixture(&app).await;
    app.store
        .save_document_state(f.document_id, b"definitely not an oplog")
        .await
        .unwrap();

    let result = app.state.bridge.attach(f.document_id, &f.owner.identity).await;
    assert_kind!(result, ErrorKind::StorageError);
}

#[tokio::test]
async fn test_failed_persist_is_retried() {
    let app = spawn_app();
    let f = fixture(&app).await;
    let attachment = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();

    app.store.fail_state_writes.store(true, Ordering::SeqCst);
    attachment.edit(vec![EditOperation::insert(0, "draft")]).await.unwrap();
    assert_kind!(app.state.bridge.flush(f.document_id).await, ErrorKind::StorageError);
    assert!(app.store.last_saved().is_none());

    app.store.fail_state_writes.store(false, Ordering::SeqCst);
    app.state.bridge.flush(f.document_id).await.unwrap();
    let saved = app.store.last_saved().expect("retry saved the state");

    assert_eq!(DiamondEngine.load(&saved).unwrap().content(), "draft");
}

#[tokio::test]
async fn test_attach_times_out() {
    let mut config = test_config();
    config.join_timeout_ms = 50;
    let app = spawn_app_with(config, Arc::new(InstrumentedStore::new()));
    let f = fixture(&app).await;
    app.store.metadata_delay_ms.store(500, Ordering::SeqCst);

    let result = app.state.bridge.attach(f.document_id, &f.owner.identity).await;
    assert_kind!(result, ErrorKind::Timeout);
}

#[tokio::test]
async fn test_shutdown_flushes_live_documents() {
    let app = spawn_app();
    let f = fixture(&app).await;
    let attachment = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();
    attachment.edit(vec![EditOperation::insert(0, "final words")]).await.unwrap();

    let results = app.state.bridge.flush_all().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].1.is_ok());
    app.state.bridge.shutdown().await;
    assert!(app.store.last_saved().is_some());
}

/// Drain buffered updates until the event stream ends
async fn stream_ends(attachment: &mut SessionAttachment) -> bool {
    for _ in 0..10 {
        match tokio::time::timeout(Duration::from_secs(2), attachment.next_event()).await {
            Ok(None) => return true,
            Ok(Some(_)) => continue,
            Err(_) => return false,
        }
    }
    false
}

#[tokio::test]
async fn test_deleting_group_closes_its_live_documents() {
    let app = spawn_app();
    let f = fixture(&app).await;
    let mut attachment = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();
    attachment.edit(vec![EditOperation::insert(0, "doomed")]).await.unwrap();
    app.state.bridge.flush(f.document_id).await.unwrap();

    let group = app.state.guard.delete_group(f.owner.id, &f.code).await.unwrap();
    assert_eq!(group.id, f.group_id);
    assert_eq!(app.state.bridge.close_group(group.id).await, 1);

    assert!(stream_ends(&mut attachment).await);
    assert_kind!(
        attachment.edit(vec![EditOperation::insert(0, "more")]).await,
        ErrorKind::NotFound
    );
    assert!(wait_until_unloaded(&app).await);
}

#[tokio::test]
async fn test_session_for_vanished_document_stops_saving_and_unloads() {
    let app = spawn_app();
    let f = fixture(&app).await;
    let attachment = app.state.bridge.attach(f.document_id, &f.owner.identity).await.unwrap();
    attachment.edit(vec![EditOperation::insert(0, "draft")]).await.unwrap();
    app.state.bridge.flush(f.document_id).await.unwrap();

    // Removed behind the session's back
    app.store.delete_group(f.group_id).await.unwrap();
    let _ = attachment.edit(vec![EditOperation::insert(0, "lost ")]).await;
    drop(attachment);

    assert!(wait_until_unloaded(&app).await);
    let writes = app.store.writes();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(app.store.writes(), writes);
    assert!(app.state.bridge.live_documents().await.is_empty());
}

#[tokio::test]
async fn test_failed_load_is_not_retried_by_reopening() {
    let app = spawn_app();
    let f = fixture(&app).await;
    app.store.fail_state_reads.store(true, Ordering::SeqCst);

    for expected_reads in [2, 4] {
        let result = app.state.bridge.attach(f.document_id, &f.owner.identity).await;
        assert_kind!(result, ErrorKind::StorageError);
        assert_eq!(app.store.reads(), expected_reads);
        assert!(wait_until_unloaded(&app).await);
    }
}
