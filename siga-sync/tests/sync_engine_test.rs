//! Sync engine integration tests
//!
//! Runs the engine against in-memory local and remote stores on a paused
//! clock, covering:
//! - offline-first persistence with remote sync disabled
//! - debounced, deduplicated pushes
//! - per-record merge of remote snapshots (idempotence, echoes, tombstones)
//! - forced push and pull
//! - config merge that keeps local credentials

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;

use siga_registry::{
    Address, AppConfig, Gender, Presentation, RemoteConnection, RemoteCredentials, Resident,
    ResidentCollection, ResidentCommand, ResidentId, ResidentStatus,
};
use siga_sync::{
    CollectionBody, LocalStore, MemoryLocalStore, MemoryRemoteStore, RemoteChange,
    RemoteDocument, SyncEngine, SyncError, SyncPhase, SyncSettings, VersionToken,
};

const KK_A: &str = "3316010101010001";
const KK_B: &str = "3316010101010002";

// =============================================================================
// Helpers
// =============================================================================

fn resident(id: &str, no_kk: &str, head: bool) -> Resident {
    Resident {
        id: id.into(),
        no_kk: no_kk.into(),
        nik: "3316010101850001".into(),
        full_name: id.to_uppercase(),
        relationship: if head { "1. Kepala Keluarga".into() } else { "3. Anak".into() },
        gender: Gender::Male,
        birth_date: NaiveDate::from_ymd_opt(1985, 3, 14).unwrap(),
        birth_place: "BLORA".into(),
        father_name: String::new(),
        mother_name: String::new(),
        address: Address {
            dusun: "Ngumbul Krajan".into(),
            rt: "01".into(),
            rw: "02".into(),
        },
        is_head_of_family: head,
        status: ResidentStatus::Active,
        pregnancy: None,
    }
}

fn sync_on() -> AppConfig {
    AppConfig {
        connection: RemoteConnection {
            enabled: true,
            credentials: RemoteCredentials {
                api_key: "kunci-rahasia".into(),
                project_id: "siga-ngumbul".into(),
                endpoint: "https://docs.example.com".into(),
                auth_endpoint: None,
            },
        },
        ..Default::default()
    }
}

fn local_store(config: &AppConfig, residents: &[Resident]) -> Arc<MemoryLocalStore> {
    let settings = SyncSettings::default();
    let local = Arc::new(MemoryLocalStore::new());
    local.set(&settings.config_key, &config.to_json().unwrap()).unwrap();
    if !residents.is_empty() {
        let collection: ResidentCollection = residents.to_vec().into();
        local
            .set(&settings.residents_key, &collection.to_json().unwrap())
            .unwrap();
    }
    local
}

fn open(local: &Arc<MemoryLocalStore>, remote: &Arc<MemoryRemoteStore>) -> SyncEngine {
    SyncEngine::open(local.clone(), remote.clone(), SyncSettings::default()).unwrap()
}

fn residents_path() -> String {
    SyncSettings::default().residents_path
}

fn config_path() -> String {
    SyncSettings::default().config_path
}

fn stored_residents(local: &MemoryLocalStore) -> ResidentCollection {
    let json = local
        .get(&SyncSettings::default().residents_key)
        .unwrap()
        .unwrap();
    ResidentCollection::from_json(&json).unwrap()
}

fn remote_residents(remote: &MemoryRemoteStore) -> ResidentCollection {
    remote
        .collection(&residents_path())
        .records
        .into_values()
        .map(|value| serde_json::from_value::<Resident>(value).unwrap())
        .collect()
}

fn collection_document(residents: &[Resident], removed: &[&str]) -> RemoteDocument {
    let body = CollectionBody {
        records: residents
            .iter()
            .map(|r| (r.id.to_string(), serde_json::to_value(r).unwrap()))
            .collect(),
        removed: removed.iter().map(|s| s.to_string()).collect(),
    };
    RemoteDocument {
        version: Some(VersionToken::generate()),
        body: body.to_value().unwrap(),
    }
}

fn add(engine: &SyncEngine, record: Resident) {
    engine
        .mutate_residents(|mut residents| {
            residents.upsert(record);
            residents
        })
        .unwrap();
}

fn rename(engine: &SyncEngine, id: &str, name: &str) {
    engine
        .mutate_residents(|mut residents| {
            residents.update_where(|r| r.id.as_str() == id, |r| r.full_name = name.into());
            residents
        })
        .unwrap();
}

async fn hydrated(engine: &SyncEngine) {
    let mut status = engine.watch_status();
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| s.hydrated))
        .await
        .expect("engine should hydrate")
        .unwrap();
}

/// Let the debounce window pass and the push run
async fn settle() {
    tokio::time::sleep(Duration::from_secs(2)).await;
}

async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

async fn connected_engine(
    local: &Arc<MemoryLocalStore>,
    remote: &Arc<MemoryRemoteStore>,
) -> SyncEngine {
    let engine = open(local, remote);
    engine.initialize().await.unwrap();
    hydrated(&engine).await;
    engine
}

// =============================================================================
// Offline-first
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_sync_disabled_never_touches_remote() {
    let local = local_store(&AppConfig::default(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = open(&local, &remote);

    engine.initialize().await.unwrap();
    let status = engine.status();
    assert!(status.hydrated);
    assert_eq!(status.phase, SyncPhase::Disconnected);

    for i in 0..5 {
        add(&engine, resident(&format!("r{}", i), KK_A, i == 0));
    }
    settle().await;

    assert_eq!(remote.calls(), 0);
    assert_eq!(stored_residents(&local).len(), 5);
    assert_eq!(engine.residents().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_residents_survive_restart() {
    let local = local_store(&AppConfig::default(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());

    let engine = open(&local, &remote);
    add(&engine, resident("r1", KK_A, true));
    drop(engine);

    let reopened = open(&local, &remote);
    assert!(reopened.residents().contains(&"r1".into()));
}

#[tokio::test(start_paused = true)]
async fn test_local_write_failure_keeps_state() {
    let local = local_store(&AppConfig::default(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = open(&local, &remote);
    local.reject_writes(true);

    let result = engine.mutate_residents(|mut residents| {
        residents.upsert(resident("r1", KK_A, true));
        residents
    });

    assert!(matches!(result, Err(SyncError::LocalPersistence(_))));
    assert!(engine.residents().is_empty());
    assert_eq!(engine.status().queued_changes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_mutation_is_a_no_op() {
    let local = local_store(&AppConfig::default(), &[resident("r1", KK_A, true)]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = open(&local, &remote);
    let writes_before = local.write_count();
    let mut changes = engine.watch_residents();
    changes.borrow_and_update();

    engine.mutate_residents(|residents| residents).unwrap();

    assert_eq!(local.write_count(), writes_before);
    assert!(!changes.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_command_persists_nothing() {
    let local = local_store(&AppConfig::default(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = open(&local, &remote);
    let writes_before = local.write_count();

    let result = engine.apply(ResidentCommand::ReportDeath {
        id: ResidentId::from("nobody"),
        date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
    });

    assert!(matches!(result, Err(SyncError::Validation(_))));
    assert_eq!(local.write_count(), writes_before);
}

// =============================================================================
// Pushing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_burst_of_mutations_is_one_batched_write() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;

    for i in 0..50 {
        add(&engine, resident(&format!("r{}", i), KK_A, i == 0));
    }
    assert_eq!(remote.batch_writes(), 0);

    settle().await;

    assert_eq!(remote.batch_writes(), 1);
    assert_eq!(remote.commits(), 1);
    assert_eq!(remote_residents(&remote).len(), 50);
    assert_eq!(engine.status().queued_changes, 0);
    assert_eq!(engine.status().phase, SyncPhase::Synced);
}

#[tokio::test(start_paused = true)]
async fn test_large_push_is_chunked() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;

    engine
        .mutate_residents(|mut residents| {
            for i in 0..1200 {
                residents.upsert(resident(&format!("r{:04}", i), KK_A, false));
            }
            residents
        })
        .unwrap();
    engine.flush().await;

    assert_eq!(remote.batch_writes(), 1);
    assert_eq!(remote.commits(), 3);
    assert_eq!(remote_residents(&remote).len(), 1200);
}

#[tokio::test(start_paused = true)]
async fn test_local_removal_becomes_tombstone() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;

    add(&engine, resident("r1", KK_A, true));
    add(&engine, resident("r2", KK_A, false));
    settle().await;

    engine
        .mutate_residents(|mut residents| {
            residents.remove(&"r2".into());
            residents
        })
        .unwrap();
    settle().await;

    let body = remote.collection(&residents_path());
    assert!(body.records.contains_key("r1"));
    assert!(!body.records.contains_key("r2"));
    assert!(body.removed.contains("r2"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_push_stays_queued() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;

    remote.set_offline(true);
    add(&engine, resident("r1", KK_A, true));
    settle().await;

    let status = engine.status();
    assert_eq!(status.queued_changes, 1);
    assert!(status.last_error.is_some());
    assert!(remote_residents(&remote).is_empty());

    remote.set_offline(false);
    engine.flush().await;

    assert!(remote_residents(&remote).contains(&"r1".into()));
    assert_eq!(engine.status().queued_changes, 0);
    assert!(engine.status().last_error.is_none());
}

// =============================================================================
// Hydration and merge
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_remote_keeps_and_uploads_local_records() {
    let records = [
        resident("a-head", KK_A, true),
        resident("a-child", KK_A, false),
        resident("b-head", KK_B, true),
    ];
    let local = local_store(&sync_on(), &records);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;

    assert_eq!(engine.residents().len(), 3);

    engine.on_remote_residents_update(RemoteChange::snapshot(None));
    assert_eq!(engine.residents().len(), 3);

    settle().await;
    assert_eq!(remote.batch_writes(), 1);
    assert_eq!(remote_residents(&remote).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_enabling_sync_connects_and_uploads() {
    let records: Vec<Resident> = (0..4)
        .map(|i| resident(&format!("r{}", i), KK_A, i == 0))
        .collect();
    let local = local_store(&AppConfig::default(), &records);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = open(&local, &remote);
    engine.initialize().await.unwrap();
    assert_eq!(remote.calls(), 0);

    engine
        .update_config(|mut config| {
            config.connection = sync_on().connection;
            config
        })
        .await
        .unwrap();
    hydrated(&engine).await;
    settle().await;

    assert_eq!(remote.batch_writes(), 1);
    assert_eq!(remote_residents(&remote).len(), 4);

    // Only presentation fields reach the remote config document
    let config = remote.document(&config_path()).unwrap();
    assert!(config.body.get("connection").is_none());
    assert!(!config.body.to_string().contains("kunci-rahasia"));
}

#[tokio::test(start_paused = true)]
async fn test_disabling_sync_disconnects() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;
    assert_eq!(remote.subscriber_count(&residents_path()), 1);

    engine
        .update_config(|mut config| {
            config.connection.enabled = false;
            config
        })
        .await
        .unwrap();

    eventually(|| remote.subscriber_count(&residents_path()) == 0).await;
    assert_eq!(engine.status().phase, SyncPhase::Disconnected);

    let writes = remote.batch_writes();
    add(&engine, resident("r1", KK_A, true));
    settle().await;
    assert_eq!(remote.batch_writes(), writes);
}

#[tokio::test(start_paused = true)]
async fn test_mutation_after_empty_hydration_is_one_full_write() {
    let records: Vec<Resident> = (0..3)
        .map(|i| resident(&format!("r{}", i), KK_A, i == 0))
        .collect();
    let local = local_store(&AppConfig::default(), &records);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = open(&local, &remote);
    engine.initialize().await.unwrap();

    engine
        .update_config(|mut config| {
            config.connection = sync_on().connection;
            config
        })
        .await
        .unwrap();
    hydrated(&engine).await;
    assert!(engine.status().hydrated);

    add(&engine, resident("r3", KK_A, false));
    settle().await;

    assert_eq!(remote.batch_writes(), 1);
    let pushed = remote_residents(&remote);
    assert_eq!(pushed.len(), 4);
    assert_eq!(pushed, *engine.residents());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_pushes_changes_made_while_disabled() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;

    add(&engine, resident("r1", KK_A, true));
    settle().await;

    engine
        .update_config(|mut config| {
            config.connection.enabled = false;
            config
        })
        .await
        .unwrap();
    add(&engine, resident("r2", KK_A, false));

    engine
        .update_config(|mut config| {
            config.connection.enabled = true;
            config
        })
        .await
        .unwrap();
    hydrated(&engine).await;
    settle().await;

    let status = engine.status();
    assert_eq!(status.phase, SyncPhase::Synced);
    assert_eq!(status.queued_changes, 0);
    let pushed = remote_residents(&remote);
    assert!(pushed.contains(&"r1".into()));
    assert!(pushed.contains(&"r2".into()));
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_pushes_do_not_replay_own_echoes() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;
    add(&engine, resident("r1", KK_A, true));
    engine.flush().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    rename(&engine, "r1", "FIRST");
    engine.flush().await;
    rename(&engine, "r1", "SECOND");
    engine.flush().await;

    let mut changes = engine.watch_residents();
    changes.borrow_and_update();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!changes.has_changed().unwrap());
    assert_eq!(
        engine.residents().get(&"r1".into()).unwrap().full_name,
        "SECOND"
    );
    assert_eq!(
        remote_residents(&remote).get(&"r1".into()).unwrap().full_name,
        "SECOND"
    );
}

#[tokio::test(start_paused = true)]
async fn test_same_snapshot_twice_publishes_once() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;

    let snapshot = collection_document(&[resident("r1", KK_A, true)], &[]);
    remote.put(&residents_path(), snapshot.clone());
    eventually(|| engine.residents().contains(&"r1".into())).await;

    let mut changes = engine.watch_residents();
    changes.borrow_and_update();

    // Same content under a new version
    remote.put(
        &residents_path(),
        RemoteDocument {
            version: Some(VersionToken::generate()),
            body: snapshot.body,
        },
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!changes.has_changed().unwrap());
    assert_eq!(engine.residents().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_own_echo_is_ignored() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;

    add(&engine, resident("r1", KK_A, true));
    settle().await;
    let pushed_version = remote.document(&residents_path()).unwrap().version;

    // A snapshot under our own version is our write coming back
    let mut tampered = collection_document(&[], &["r1"]);
    tampered.version = pushed_version;
    remote.put(&residents_path(), tampered);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.residents().contains(&"r1".into()));

    engine.on_remote_residents_update(RemoteChange::Snapshot {
        document: Some(collection_document(&[], &["r1"])),
        is_local_echo: true,
    });
    assert!(engine.residents().contains(&"r1".into()));
}

#[tokio::test(start_paused = true)]
async fn test_remote_tombstone_removes_and_absence_keeps() {
    let local = local_store(
        &sync_on(),
        &[resident("r1", KK_A, true), resident("r2", KK_A, false)],
    );
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;
    settle().await;

    // r1 missing from records without a tombstone, r2 tombstoned
    remote.put(&residents_path(), collection_document(&[], &["r2"]));
    eventually(|| !engine.residents().contains(&"r2".into())).await;

    assert!(engine.residents().contains(&"r1".into()));
    assert!(!stored_residents(&local).contains(&"r2".into()));
}

#[tokio::test(start_paused = true)]
async fn test_unpushed_local_edit_wins_over_snapshot() {
    let local = local_store(&sync_on(), &[resident("r1", KK_A, true)]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;
    settle().await;

    rename(&engine, "r1", "SITI LOKAL");
    let mut remote_copy = resident("r1", KK_A, true);
    remote_copy.full_name = "SITI REMOTE".into();
    remote.put(&residents_path(), collection_document(&[remote_copy], &[]));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        engine.residents().get(&"r1".into()).unwrap().full_name,
        "SITI LOKAL"
    );

    settle().await;
    assert_eq!(
        remote_residents(&remote).get(&"r1".into()).unwrap().full_name,
        "SITI LOKAL"
    );
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_remote_record_is_skipped() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;

    let mut records = BTreeMap::new();
    records.insert("bad".to_string(), json!({"id": "bad", "gender": 42}));
    records.insert(
        "r1".to_string(),
        serde_json::to_value(resident("r1", KK_A, true)).unwrap(),
    );
    let body = CollectionBody {
        records,
        removed: Default::default(),
    };
    remote.put(
        &residents_path(),
        RemoteDocument {
            version: Some(VersionToken::generate()),
            body: body.to_value().unwrap(),
        },
    );

    eventually(|| engine.residents().contains(&"r1".into())).await;
    assert_eq!(engine.residents().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_two_sessions_converge() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let office = connected_engine(&local_store(&sync_on(), &[]), &remote).await;
    let laptop_local = local_store(&sync_on(), &[]);

    add(&office, resident("r1", KK_A, true));
    settle().await;

    let laptop = connected_engine(&laptop_local, &remote).await;
    assert!(laptop.residents().contains(&"r1".into()));

    rename(&laptop, "r1", "SULARNO");
    settle().await;

    eventually(|| {
        office
            .residents()
            .get(&"r1".into())
            .map(|r| r.full_name == "SULARNO")
            .unwrap_or(false)
    })
    .await;
    assert_eq!(stored_residents(&laptop_local).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_import_reaches_other_sessions_with_head() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let office = connected_engine(&local_store(&sync_on(), &[]), &remote).await;

    let row = |nik: &str, name: &str, relationship: &str| -> BTreeMap<String, String> {
        [
            ("No.KK", KK_B),
            ("NIK", nik),
            ("Nama Lengkap", name),
            ("Status Hubungan dalam Keluarga", relationship),
            ("Jenis Kelamin", "L"),
            ("Tanggal Lahir", "1979-08-17"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    };
    office
        .apply(ResidentCommand::Import {
            rows: vec![
                row("3316010101790001", "Darmo", "1. Kepala Keluarga"),
                row("3316010101050002", "Joko", "3. Anak Kandung"),
            ],
        })
        .unwrap();
    settle().await;

    let laptop = connected_engine(&local_store(&sync_on(), &[]), &remote).await;
    let residents = laptop.residents();
    assert_eq!(residents.household(KK_B).count(), 2);
    assert_eq!(
        residents.head_of_household(KK_B).unwrap().full_name,
        "DARMO"
    );
}

// =============================================================================
// Disconnect
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_disconnect_unsubscribes_and_stops_pushing() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;
    assert_eq!(remote.subscriber_count(&residents_path()), 1);
    assert_eq!(remote.subscriber_count(&config_path()), 1);

    add(&engine, resident("r1", KK_A, true));
    engine.disconnect();

    eventually(|| {
        remote.subscriber_count(&residents_path()) == 0
            && remote.subscriber_count(&config_path()) == 0
    })
    .await;
    settle().await;

    assert_eq!(remote.batch_writes(), 0);
    assert_eq!(engine.status().queued_changes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_engine_unsubscribes() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;
    assert_eq!(remote.subscriber_count(&residents_path()), 1);

    drop(engine);
    eventually(|| remote.subscriber_count(&residents_path()) == 0).await;
}

// =============================================================================
// Forced operations
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_force_operations_need_sync() {
    let local = local_store(&AppConfig::default(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = open(&local, &remote);

    assert!(matches!(engine.force_push().await, Err(SyncError::SyncDisabled)));
    assert!(matches!(engine.force_pull().await, Err(SyncError::SyncDisabled)));
    assert_eq!(remote.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_force_pull_refuses_empty_remote() {
    let local = local_store(
        &sync_on(),
        &[resident("r1", KK_A, true), resident("r2", KK_A, false)],
    );
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = open(&local, &remote);

    let result = engine.force_pull().await;

    assert!(matches!(result, Err(SyncError::RefusedEmptyPull { local: 2 })));
    assert_eq!(engine.residents().len(), 2);
    assert_eq!(stored_residents(&local).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_force_pull_replaces_local() {
    let local = local_store(&sync_on(), &[resident("r1", KK_A, true)]);
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.put(
        &residents_path(),
        collection_document(&[resident("r9", KK_B, true)], &[]),
    );
    let engine = open(&local, &remote);
    rename(&engine, "r1", "UNPUSHED");

    let residents = engine.force_pull().await.unwrap();

    assert_eq!(residents.len(), 1);
    assert!(residents.contains(&"r9".into()));
    assert_eq!(engine.status().queued_changes, 0);
    assert!(stored_residents(&local).contains(&"r9".into()));
}

#[tokio::test(start_paused = true)]
async fn test_force_push_replaces_remote() {
    let local = local_store(&sync_on(), &[resident("r1", KK_A, true)]);
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.put(
        &residents_path(),
        collection_document(&[resident("r8", KK_B, true), resident("r9", KK_B, false)], &[]),
    );
    let engine = open(&local, &remote);

    engine.force_push().await.unwrap();

    let body = remote.collection(&residents_path());
    assert_eq!(body.records.keys().collect::<Vec<_>>(), vec!["r1"]);
    assert!(body.removed.contains("r8"));
    assert!(body.removed.contains("r9"));
}

#[tokio::test(start_paused = true)]
async fn test_force_push_surfaces_remote_failure() {
    let local = local_store(&sync_on(), &[resident("r1", KK_A, true)]);
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.set_offline(true);
    let engine = open(&local, &remote);

    assert!(matches!(engine.force_push().await, Err(SyncError::RemoteRead(_))));
}

// =============================================================================
// Config
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_remote_config_keeps_local_credentials() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;
    settle().await;
    assert_eq!(remote.document_writes(), 1);

    let presentation = Presentation {
        app_name: "SIGA Desa Ngumbul".into(),
        village_head_name: "SUPARMAN".into(),
        ..Default::default()
    };
    let mut body = serde_json::to_value(&presentation).unwrap();
    body["connection"] = json!({"enabled": false, "credentials": {"apiKey": "bocor"}});
    remote.put(
        &config_path(),
        RemoteDocument {
            version: Some(VersionToken::generate()),
            body,
        },
    );

    eventually(|| engine.config().presentation.app_name == "SIGA Desa Ngumbul").await;
    let config = engine.config();
    assert_eq!(config.presentation.village_head_name, "SUPARMAN");
    assert_eq!(config.connection, sync_on().connection);

    let stored = AppConfig::from_json(
        &local.get(&SyncSettings::default().config_key).unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(stored, *config);
}

#[tokio::test(start_paused = true)]
async fn test_presentation_edit_is_pushed() {
    let local = local_store(&sync_on(), &[]);
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = connected_engine(&local, &remote).await;
    settle().await;

    engine
        .update_config(|mut config| {
            config.presentation.operator_name = "BU SRI".into();
            config
        })
        .await
        .unwrap();
    settle().await;

    let document = remote.document(&config_path()).unwrap();
    let pushed: Presentation = serde_json::from_value(document.body).unwrap();
    assert_eq!(pushed.operator_name, "BU SRI");
    assert_eq!(engine.config().presentation.operator_name, "BU SRI");
}
