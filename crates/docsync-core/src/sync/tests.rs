use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use super::*;
use crate::config::SyncSettings;
use crate::models::{Document, DocumentUpdate, Entity, EntityId, EntityKind, Resolution, TrackedField};
use crate::monitor::{NetworkMonitor, SessionSlot, UserId, VisibilityMonitor};
use crate::remote::{InMemoryRemote, RemoteCall, RemoteError, RemoteRecord};
use crate::store::{EntityStore, InMemoryStore};

struct Harness {
    service: SyncService,
    store: InMemoryStore,
    remote: InMemoryRemote,
    network: NetworkMonitor,
    visibility: VisibilityMonitor,
    session: SessionSlot,
    user: UserId,
}

fn harness() -> Harness {
    harness_with(SyncSettings::default(), true)
}

fn harness_with(settings: SyncSettings, signed_in: bool) -> Harness {
    let store = InMemoryStore::new();
    let remote = InMemoryRemote::new();
    let network = NetworkMonitor::new(true);
    let visibility = VisibilityMonitor::new(true);
    let user = UserId::new("user-1");
    let session = if signed_in {
        SessionSlot::signed_in(user.clone())
    } else {
        SessionSlot::default()
    };
    let service = SyncService::builder(Arc::new(store.clone()), Arc::new(remote.clone()))
        .settings(settings)
        .network(network.clone())
        .visibility(visibility.clone())
        .session(Arc::new(session.clone()))
        .build()
        .unwrap();
    Harness {
        service,
        store,
        remote,
        network,
        visibility,
        session,
        user,
    }
}

async fn load(h: &Harness, id: &EntityId) -> Entity {
    h.store
        .get(EntityKind::Document, id)
        .await
        .unwrap()
        .unwrap()
}

/// Create a document and push it to the remote
async fn synced_document(h: &Harness, title: &str) -> Entity {
    let document = h
        .service
        .create_with_sync(title, None, None, Some(&h.user))
        .await
        .unwrap();
    h.service.force_sync_now(&h.user).await.unwrap();
    let entity = load(h, &document.id).await;
    assert!(!entity.is_dirty());
    entity
}

/// Change a local document field with an explicit timestamp
async fn edit_local(h: &Harness, entity: &Entity, field: TrackedField, value: Value, updated_at: i64) {
    let mut current = load(h, entity.id()).await;
    current.set_field_value(field, &value).unwrap();
    current.set_updated_at(updated_at);
    h.store.put(current).await.unwrap();
}

/// Change a remote field as another device would
async fn edit_remote(h: &Harness, entity: &Entity, key: &str, value: Value, updated_at: i64) {
    let cloud_id = entity.sync().cloud_id.clone().unwrap();
    let mut record = h.remote.record(entity.kind(), &cloud_id).await.unwrap();
    record.fields[key] = value;
    record.updated_at = updated_at;
    h.remote.seed(record).await;
}

fn watermark(entity: &Entity) -> i64 {
    entity.sync().last_sync_at.unwrap()
}

#[tokio::test]
async fn offline_force_sync_leaves_operation_queued() {
    let h = harness();
    h.network.set_online(false);

    let document = h
        .service
        .create_with_sync("Offline note", None, None, Some(&h.user))
        .await
        .unwrap();
    let report = h.service.force_sync_now(&h.user).await.unwrap();

    assert_eq!(report.enqueued, 1);
    assert_eq!(report.drain.remaining, 1);
    assert_eq!(h.service.queue().len(), 1);
    assert_eq!(h.remote.total_calls().await, 0);

    let status = h.service.get_sync_status(Some(&h.user)).await.unwrap();
    assert_eq!(status.level, SyncLevel::Offline);
    assert_eq!(status.last_error, None);
    assert_eq!(load(&h, &document.id).await.sync().sync_error, None);

    h.network.set_online(true);
    h.service.force_sync_now(&h.user).await.unwrap();
    assert!(load(&h, &document.id).await.sync().cloud_synced);
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 1);
}

#[tokio::test]
async fn concurrent_title_edits_resolve_to_newer_value() {
    let h = harness();
    let entity = synced_document(&h, "Original").await;
    let base = watermark(&entity);

    edit_local(&h, &entity, TrackedField::Title, json!("Local title"), base + 100).await;
    edit_remote(&h, &entity, "title", json!("Remote title"), base + 200).await;

    h.service.force_sync_now(&h.user).await.unwrap();

    let detected: Vec<_> = h
        .service
        .history()
        .into_iter()
        .filter_map(|event| match event.kind {
            SyncEventKind::ConflictDetected { count, .. } => Some(count),
            _ => None,
        })
        .collect();
    assert_eq!(detected, vec![1]);

    let resolved = load(&h, entity.id()).await;
    assert_eq!(resolved.as_document().unwrap().title, "Remote title");
    assert!(resolved.sync().conflicts.is_empty());
    assert!(resolved.sync().sync_version > entity.sync().sync_version);
    assert!(!resolved.is_dirty());
}

#[tokio::test]
async fn newer_local_title_wins_and_is_uploaded() {
    let h = harness();
    let entity = synced_document(&h, "Original").await;
    let base = watermark(&entity);

    edit_remote(&h, &entity, "title", json!("Remote title"), base + 100).await;
    edit_local(&h, &entity, TrackedField::Title, json!("Local title"), base + 200).await;

    h.service.force_sync_now(&h.user).await.unwrap();

    let resolved = load(&h, entity.id()).await;
    assert_eq!(resolved.as_document().unwrap().title, "Local title");
    assert!(resolved.sync().conflicts.is_empty());

    let cloud_id = resolved.sync().cloud_id.clone().unwrap();
    let record = h.remote.record(EntityKind::Document, &cloud_id).await.unwrap();
    assert_eq!(record.fields["title"], json!("Local title"));
}

#[tokio::test]
async fn local_delete_survives_newer_remote_move() {
    let h = harness();
    let entity = synced_document(&h, "Doomed").await;
    let base = watermark(&entity);

    edit_local(&h, &entity, TrackedField::Deleted, json!(true), base + 100).await;
    edit_remote(&h, &entity, "workspaceId", json!("ws-other"), base + 200).await;
    h.service.force_sync_now(&h.user).await.unwrap();

    let current = load(&h, entity.id()).await;
    let document = current.as_document().unwrap();
    assert!(document.is_deleted);
    assert_eq!(document.workspace_id, Some(EntityId::from("ws-other")));
    assert!(current.sync().conflicts.is_empty());
    assert!(!current.is_dirty());

    let cloud_id = current.sync().cloud_id.clone().unwrap();
    let record = h.remote.record(EntityKind::Document, &cloud_id).await.unwrap();
    assert_eq!(record.fields["isDeleted"], json!(true));
    assert_eq!(record.fields["workspaceId"], json!("ws-other"));
}

#[tokio::test]
async fn resolved_copies_converge_on_every_field() {
    let h = harness();
    let entity = synced_document(&h, "Original").await;
    let base = watermark(&entity);

    edit_local(&h, &entity, TrackedField::Deleted, json!(true), base + 100).await;
    edit_remote(&h, &entity, "title", json!("Renamed"), base + 200).await;
    h.service.force_sync_now(&h.user).await.unwrap();
    h.service.force_sync_now(&h.user).await.unwrap();

    let current = load(&h, entity.id()).await;
    assert!(!current.is_dirty());
    let cloud_id = current.sync().cloud_id.clone().unwrap();
    let record = h.remote.record(EntityKind::Document, &cloud_id).await.unwrap();
    assert_eq!(record.fields, current.wire_fields().unwrap());
    assert_eq!(record.fields["title"], json!("Renamed"));
    assert_eq!(record.fields["isDeleted"], json!(true));
}

#[tokio::test]
async fn conflict_detection_without_auto_resolve_keeps_data() {
    let settings = SyncSettings {
        auto_resolve_conflicts: false,
        ..SyncSettings::default()
    };
    let h = harness_with(settings, true);
    let entity = synced_document(&h, "Original").await;
    let base = watermark(&entity);

    edit_local(&h, &entity, TrackedField::Title, json!("Local title"), base + 100).await;
    edit_remote(&h, &entity, "title", json!("Remote title"), base + 200).await;
    h.service.force_sync_now(&h.user).await.unwrap();

    let flagged = load(&h, entity.id()).await;
    assert_eq!(flagged.as_document().unwrap().title, "Local title");
    assert_eq!(flagged.sync().conflicts.len(), 1);
    assert_eq!(flagged.sync().conflicts[0].field, TrackedField::Title);

    let status = h.service.get_sync_status(None).await.unwrap();
    assert_eq!(status.level, SyncLevel::Error);
    assert_eq!(status.conflict_count, 1);
}

#[tokio::test]
async fn manual_content_conflict_resolved_by_choice() {
    let h = harness();
    let entity = synced_document(&h, "Draft").await;
    let base = watermark(&entity);

    edit_local(&h, &entity, TrackedField::Content, json!("mine"), base + 100).await;
    edit_remote(&h, &entity, "content", json!("theirs"), base + 200).await;
    h.service.force_sync_now(&h.user).await.unwrap();

    let conflicted = h.service.conflicted().await.unwrap();
    assert_eq!(conflicted.len(), 1);
    let conflict = conflicted[0].sync().conflicts[0].clone();
    assert_eq!(conflict.field, TrackedField::Content);
    assert_eq!(conflict.resolution, Some(Resolution::Manual));
    assert_eq!(
        h.service.get_sync_status(None).await.unwrap().level,
        SyncLevel::Error
    );

    // Uploads are held back while the conflict is open.
    let outcome = {
        h.service
            .queue()
            .enqueue(SyncOperation::upload(conflicted[0].clone()));
        h.service.queue().process_next(&h.user).await.unwrap().unwrap()
    };
    assert_eq!(outcome, OperationOutcome::Skipped("unresolved conflicts"));

    let choices = HashMap::from([(conflict.id, Resolution::Local)]);
    let resolved = h
        .service
        .resolve_conflicts(EntityKind::Document, entity.id(), &choices)
        .await
        .unwrap();
    assert!(resolved.sync().conflicts.is_empty());
    assert_eq!(resolved.as_document().unwrap().content, "mine");

    h.service.force_sync_now(&h.user).await.unwrap();
    let cloud_id = resolved.sync().cloud_id.clone().unwrap();
    let record = h.remote.record(EntityKind::Document, &cloud_id).await.unwrap();
    assert_eq!(record.fields["content"], json!("mine"));
    assert!(!load(&h, entity.id()).await.is_dirty());
    assert_eq!(
        h.service.get_sync_status(None).await.unwrap().level,
        SyncLevel::Synced
    );
}

#[tokio::test]
async fn resolve_conflicts_rejects_unknown_ids() {
    let h = harness();
    let entity = synced_document(&h, "Draft").await;
    let base = watermark(&entity);
    edit_local(&h, &entity, TrackedField::Content, json!("mine"), base + 100).await;
    edit_remote(&h, &entity, "content", json!("theirs"), base + 200).await;
    h.service.force_sync_now(&h.user).await.unwrap();

    let choices = HashMap::from([(crate::models::ConflictId::new(), Resolution::Local)]);
    let error = h
        .service
        .resolve_conflicts(EntityKind::Document, entity.id(), &choices)
        .await
        .unwrap_err();
    assert!(matches!(error, crate::Error::InvalidInput(_)));
    assert_eq!(load(&h, entity.id()).await.sync().conflicts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_timeouts_stop_after_three_attempts() {
    let h = harness();
    h.remote
        .fail_always(|| RemoteError::Timeout(Duration::from_secs(30)))
        .await;

    let document = h
        .service
        .create_with_sync("Flaky", None, None, Some(&h.user))
        .await
        .unwrap();
    h.service.force_sync_now(&h.user).await.unwrap();
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 1);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 2);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 3);

    let entity = load(&h, &document.id).await;
    assert!(
        entity
            .sync()
            .sync_error
            .as_deref()
            .is_some_and(|error| error.contains("timed out"))
    );
    assert!(!entity.sync().cloud_synced);
    assert_eq!(h.service.queue().depth(), 0);
}

#[tokio::test(start_paused = true)]
async fn retry_delays_double_between_attempts() {
    let h = harness();
    h.remote
        .fail_always(|| RemoteError::Timeout(Duration::from_secs(30)))
        .await;
    h.service
        .create_with_sync("Backoff", None, None, Some(&h.user))
        .await
        .unwrap();
    h.service.force_sync_now(&h.user).await.unwrap();
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 1);

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 1);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 2);

    // Second retry waits 10s after the second attempt at t=5s.
    tokio::time::sleep(Duration::from_millis(9_800)).await;
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 2);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 3);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 3);
}

#[tokio::test(start_paused = true)]
async fn hung_remote_call_is_bounded_by_request_timeout() {
    let settings = SyncSettings {
        request_timeout: Duration::from_secs(2),
        max_retries: 1,
        ..SyncSettings::default()
    };
    let h = harness_with(settings, true);
    h.remote.set_latency(Some(Duration::from_secs(3600))).await;

    let document = h
        .service
        .create_with_sync("Slow", None, None, Some(&h.user))
        .await
        .unwrap();
    h.service.queue().enqueue(SyncOperation::upload(load(&h, &document.id).await));
    let outcome = h.service.queue().process_next(&h.user).await.unwrap().unwrap();

    assert!(matches!(outcome, OperationOutcome::Failed(ref error) if error.contains("timed out")));
}

#[tokio::test]
async fn coalesced_uploads_reach_remote_once() {
    let h = harness();
    let document = h
        .service
        .create_with_sync("Twice", None, None, Some(&h.user))
        .await
        .unwrap();
    let entity = load(&h, &document.id).await;

    h.service.queue().enqueue(SyncOperation::upload(entity.clone()));
    h.service.queue().enqueue(SyncOperation::upload(entity));
    assert_eq!(h.service.queue().len(), 1);

    h.service.queue().drain(&h.user).await;
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 1);
    assert_eq!(h.remote.calls(RemoteCall::Update).await, 0);
}

#[tokio::test]
async fn repeated_change_signals_are_deduplicated() {
    let h = harness();
    let document = h
        .service
        .create_with_sync("Note", None, None, Some(&h.user))
        .await
        .unwrap();
    for title in ["Note 1", "Note 2", "Note 3"] {
        h.service
            .update_with_sync(&document.id, DocumentUpdate::default().title(title), Some(&h.user))
            .await
            .unwrap();
    }
    assert_eq!(h.service.scheduler().pending_changes(), 1);

    h.service.force_sync_now(&h.user).await.unwrap();
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 1);
    let record = &h.remote.records(EntityKind::Document).await[0];
    assert_eq!(record.fields["title"], json!("Note 3"));
}

#[tokio::test(start_paused = true)]
async fn edit_during_upload_keeps_entity_dirty() {
    let h = harness();
    h.remote.set_latency(Some(Duration::from_secs(1))).await;
    let document = h
        .service
        .create_with_sync("Before", None, None, Some(&h.user))
        .await
        .unwrap();
    let snapshot = load(&h, &document.id).await;

    let queue = h.service.queue().clone();
    let user = h.user.clone();
    queue.enqueue(SyncOperation::upload(snapshot.clone()));
    let upload = tokio::spawn(async move { queue.drain(&user).await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    edit_local(
        &h,
        &snapshot,
        TrackedField::Title,
        json!("During"),
        snapshot.updated_at() + 50,
    )
    .await;
    upload.await.unwrap();

    let current = load(&h, &document.id).await;
    assert_eq!(current.as_document().unwrap().title, "During");
    assert!(current.sync().cloud_id.is_some());
    assert!(current.is_dirty());
}

#[tokio::test]
async fn full_sync_downloads_remote_only_records() {
    let h = harness();
    let fields = serde_json::to_value(Document::new("From laptop", None).fields()).unwrap();
    h.remote
        .seed(RemoteRecord {
            id: "remote-1".to_string(),
            kind: EntityKind::Document,
            local_id: EntityId::from("doc-laptop"),
            updated_at: 0,
            fields,
        })
        .await;

    let report = h.service.force_sync_now(&h.user).await.unwrap();
    assert_eq!(report.enqueued, 1);
    assert_eq!(report.drain.succeeded, 1);

    let adopted = load(&h, &EntityId::from("doc-laptop")).await;
    assert_eq!(adopted.as_document().unwrap().title, "From laptop");
    assert_eq!(adopted.sync().cloud_id.as_deref(), Some("remote-1"));
    assert!(!adopted.is_dirty());
}

#[tokio::test]
async fn remote_only_change_overwrites_local_copy() {
    let h = harness();
    let entity = synced_document(&h, "Original").await;
    let base = watermark(&entity);
    edit_remote(&h, &entity, "title", json!("Renamed elsewhere"), base + 100).await;

    h.service.force_sync_now(&h.user).await.unwrap();

    let current = load(&h, entity.id()).await;
    assert_eq!(current.as_document().unwrap().title, "Renamed elsewhere");
    assert!(current.sync().conflicts.is_empty());
    assert_eq!(h.remote.calls(RemoteCall::Update).await, 0);
}

#[tokio::test]
async fn guest_documents_migrate_on_sign_in() {
    let h = harness_with(SyncSettings::default(), false);
    let document = h
        .service
        .create_with_sync("Guest note", None, None, None)
        .await
        .unwrap();
    assert_eq!(h.service.scheduler().pending_changes(), 0);
    assert_eq!(
        h.service.get_sync_status(None).await.unwrap().level,
        SyncLevel::Synced
    );

    h.session.sign_in(h.user.clone());
    h.service.trigger_guest_migration(&h.user).await.unwrap();

    assert!(load(&h, &document.id).await.sync().cloud_synced);
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 1);
}

#[tokio::test]
async fn deletion_replicates_as_soft_delete() {
    let h = harness();
    let entity = synced_document(&h, "Doomed").await;

    h.service
        .delete_with_sync(EntityKind::Document, entity.id(), Some(&h.user))
        .await
        .unwrap();
    h.service.force_sync_now(&h.user).await.unwrap();

    let cloud_id = entity.sync().cloud_id.clone().unwrap();
    let record = h.remote.record(EntityKind::Document, &cloud_id).await.unwrap();
    assert_eq!(record.fields["isDeleted"], json!(true));
}

#[tokio::test]
async fn permanent_failure_surfaces_in_status_and_health() {
    let h = harness();
    h.remote
        .fail_always(|| RemoteError::PermissionDenied("read-only".to_string()))
        .await;
    h.service
        .create_with_sync("Locked", None, None, Some(&h.user))
        .await
        .unwrap();
    let report = h.service.force_sync_now(&h.user).await.unwrap();
    assert_eq!(report.drain.failed, 1);
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 1);

    let status = h.service.get_sync_status(Some(&h.user)).await.unwrap();
    assert_eq!(status.level, SyncLevel::Error);
    assert_eq!(status.failed_count, 1);

    let health = h.service.check_sync_health(Some(&h.user)).await.unwrap();
    assert!(!health.healthy);
    assert!(health.issues.iter().any(|issue| issue.contains("failed to sync")));
}

#[tokio::test]
async fn stored_sync_error_survives_restart() {
    let h = harness();
    h.remote
        .fail_always(|| RemoteError::PermissionDenied("read-only".to_string()))
        .await;
    h.service
        .create_with_sync("Locked", None, None, Some(&h.user))
        .await
        .unwrap();
    h.service.force_sync_now(&h.user).await.unwrap();

    let restarted = SyncService::builder(Arc::new(h.store.clone()), Arc::new(h.remote.clone()))
        .network(h.network.clone())
        .visibility(h.visibility.clone())
        .session(Arc::new(h.session.clone()))
        .build()
        .unwrap();
    let status = restarted.get_sync_status(Some(&h.user)).await.unwrap();
    assert_eq!(status.level, SyncLevel::Error);
    assert_eq!(status.failed_count, 1);
    assert!(status.last_error.is_some_and(|error| error.contains("read-only")));

    let health = restarted.check_sync_health(Some(&h.user)).await.unwrap();
    assert!(health.issues.iter().any(|issue| issue.contains("failed to sync")));
}

#[tokio::test]
async fn status_subscribers_see_sync_progress() {
    let h = harness();
    let levels = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&levels);
    let subscription = h
        .service
        .subscribe_to_status(move |status| sink.lock().unwrap().push(status.level));

    synced_document(&h, "Watched").await;
    subscription.unsubscribe();

    let levels = levels.lock().unwrap();
    assert!(levels.contains(&SyncLevel::Syncing));
    assert_eq!(levels.last(), Some(&SyncLevel::Synced));
}

#[tokio::test]
async fn change_signals_wait_for_visibility() {
    let h = harness();
    h.visibility.set_visible(false);
    assert!(!h.service.scheduler().should_sync(true));

    h.visibility.set_visible(true);
    assert!(h.service.scheduler().should_sync(true));
    assert!(!h.service.scheduler().should_sync(false));
}

#[tokio::test(start_paused = true)]
async fn required_activity_gates_sync() {
    let settings = SyncSettings {
        require_user_activity: true,
        ..SyncSettings::default()
    };
    let h = harness_with(settings, true);
    assert!(!h.service.scheduler().should_sync(true));

    h.service.record_activity();
    assert!(h.service.scheduler().should_sync(true));

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(!h.service.scheduler().is_user_active());
}

#[tokio::test(start_paused = true)]
async fn background_loop_flushes_changes_after_debounce() {
    let h = harness();
    h.service.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let document = h
        .service
        .create_with_sync("Debounced", None, None, None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 1);
    assert!(load(&h, &document.id).await.sync().cloud_synced);

    h.service.shutdown().await;
    assert!(!h.service.scheduler().is_running());
}

#[tokio::test(start_paused = true)]
async fn reconnect_triggers_batch_sync() {
    let h = harness();
    h.network.set_online(false);
    h.service.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let document = h
        .service
        .create_with_sync("Written offline", None, None, None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.remote.total_calls().await, 0);

    h.network.set_online(true);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(load(&h, &document.id).await.sync().cloud_synced);
    assert!(h.service.history().iter().any(|event| matches!(
        event.kind,
        SyncEventKind::ConnectionChange { online: true }
    )));
    h.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn periodic_trigger_runs_full_pass() {
    let settings = SyncSettings {
        sync_interval: Duration::from_secs(60),
        ..SyncSettings::default()
    };
    let h = harness_with(settings, true);
    let fields = serde_json::to_value(Document::new("Arrived later", None).fields()).unwrap();
    h.service.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    h.remote
        .seed(RemoteRecord {
            id: "remote-9".to_string(),
            kind: EntityKind::Document,
            local_id: EntityId::from("doc-9"),
            updated_at: 0,
            fields,
        })
        .await;
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert!(h.remote.calls(RemoteCall::List).await >= 1);
    assert_eq!(
        load(&h, &EntityId::from("doc-9"))
            .await
            .as_document()
            .unwrap()
            .title,
        "Arrived later"
    );
    h.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn visibility_regain_syncs_only_when_stale() {
    let settings = SyncSettings {
        sync_interval: Duration::from_secs(60),
        triggers: crate::config::TriggerToggles {
            periodic: false,
            ..crate::config::TriggerToggles::default()
        },
        ..SyncSettings::default()
    };
    let h = harness_with(settings, true);
    h.service.force_sync_now(&h.user).await.unwrap();
    h.service.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let fields = serde_json::to_value(Document::new("From another device", None).fields()).unwrap();
    h.remote
        .seed(RemoteRecord {
            id: "remote-7".to_string(),
            kind: EntityKind::Document,
            local_id: EntityId::from("doc-7"),
            updated_at: 0,
            fields,
        })
        .await;
    let listed = h.remote.calls(RemoteCall::List).await;

    h.visibility.set_visible(false);
    tokio::time::sleep(Duration::from_secs(10)).await;
    h.visibility.set_visible(true);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.remote.calls(RemoteCall::List).await, listed);

    h.visibility.set_visible(false);
    tokio::time::sleep(Duration::from_secs(61)).await;
    h.visibility.set_visible(true);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h.remote.calls(RemoteCall::List).await > listed);
    assert_eq!(
        load(&h, &EntityId::from("doc-7"))
            .await
            .as_document()
            .unwrap()
            .title,
        "From another device"
    );
    h.service.shutdown().await;
}

#[tokio::test]
async fn batch_pass_flushes_at_most_max_batch_size_changes() {
    let h = harness();
    for index in 0..12 {
        h.service
            .create_with_sync(&format!("Note {index}"), None, None, Some(&h.user))
            .await
            .unwrap();
    }
    assert_eq!(h.service.scheduler().pending_changes(), 12);

    let first = h.service.scheduler().run_batch(&h.user).await;
    assert_eq!(first.enqueued, 10);
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 10);
    assert_eq!(h.service.scheduler().pending_changes(), 2);

    let second = h.service.scheduler().run_batch(&h.user).await;
    assert_eq!(second.enqueued, 2);
    assert_eq!(h.remote.calls(RemoteCall::Create).await, 12);
    assert_eq!(h.service.scheduler().pending_changes(), 0);
}

#[test]
fn builder_rejects_invalid_settings() {
    let settings = SyncSettings {
        max_batch_size: 0,
        ..SyncSettings::default()
    };
    let result = SyncService::builder(
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryRemote::new()),
    )
    .settings(settings)
    .build();
    assert!(matches!(result, Err(crate::Error::Config(_))));
}
