//! Session gate integration tests
//!
//! The engine must stay off the remote store until a user signs in, and drop
//! its subscriptions when the session ends.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use siga_registry::{
    Address, AppConfig, Gender, RemoteConnection, RemoteCredentials, Resident, ResidentStatus,
};
use siga_sync::{
    AuthState, Credentials, LocalStore, MemoryLocalStore, MemoryRemoteStore,
    MemorySessionProvider, SessionGate, SyncEngine, SyncError, SyncPhase, SyncSettings,
};

const EMAIL: &str = "operator@ngumbul.desa.id";
const PASSWORD: &str = "rahasia-desa";

fn sync_on() -> AppConfig {
    AppConfig {
        connection: RemoteConnection {
            enabled: true,
            credentials: RemoteCredentials {
                project_id: "siga-ngumbul".into(),
                ..Default::default()
            },
        },
        ..Default::default()
    }
}

struct Office {
    engine: SyncEngine,
    remote: Arc<MemoryRemoteStore>,
    provider: Arc<MemorySessionProvider>,
    gate: SessionGate,
}

async fn office(config: AppConfig) -> Office {
    let settings = SyncSettings::default();
    let local = Arc::new(MemoryLocalStore::new());
    local.set(&settings.config_key, &config.to_json().unwrap()).unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());

    let provider = Arc::new(MemorySessionProvider::new());
    provider.add_account(EMAIL, PASSWORD).unwrap();
    let gate = SessionGate::new(provider.clone());
    gate.start().await;

    let engine = SyncEngine::open(local, remote.clone(), settings).unwrap();
    engine.attach_session_gate(gate.clone());
    engine.initialize().await.unwrap();

    Office {
        engine,
        remote,
        provider,
        gate,
    }
}

fn resident(id: &str) -> Resident {
    Resident {
        id: id.into(),
        no_kk: "3316010101010001".into(),
        nik: "3316010101850001".into(),
        full_name: id.to_uppercase(),
        relationship: "3. Anak".into(),
        gender: Gender::Female,
        birth_date: NaiveDate::from_ymd_opt(2001, 5, 2).unwrap(),
        birth_place: "BLORA".into(),
        father_name: String::new(),
        mother_name: String::new(),
        address: Address::default(),
        is_head_of_family: false,
        status: ResidentStatus::Active,
        pregnancy: None,
    }
}

fn add(engine: &SyncEngine, id: &str) {
    engine
        .mutate_residents(|mut residents| {
            residents.upsert(resident(id));
            residents
        })
        .unwrap();
}

fn remote_has(remote: &MemoryRemoteStore, id: &str) -> bool {
    remote.collection(&residents_path()).records.contains_key(id)
}

fn residents_path() -> String {
    SyncSettings::default().residents_path
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

#[tokio::test(start_paused = true)]
async fn test_engine_waits_for_sign_in() {
    let office = office(sync_on()).await;

    assert_eq!(office.gate.state(), AuthState::Unauthenticated);
    assert_eq!(office.engine.status().phase, SyncPhase::Disconnected);
    assert_eq!(office.remote.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_forced_operations_need_a_session() {
    let office = office(sync_on()).await;

    assert!(matches!(
        office.engine.force_push().await,
        Err(SyncError::NotAuthenticated)
    ));
    assert!(matches!(
        office.engine.force_pull().await,
        Err(SyncError::NotAuthenticated)
    ));
    assert_eq!(office.remote.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sign_in_connects_and_sign_out_disconnects() {
    let office = office(sync_on()).await;

    office
        .gate
        .sign_in(&Credentials::new(EMAIL, PASSWORD))
        .await
        .unwrap();
    eventually(|| office.remote.subscriber_count(&residents_path()) == 1).await;
    eventually(|| office.engine.status().hydrated).await;
    assert_eq!(office.engine.status().phase, SyncPhase::Synced);

    office.gate.sign_out().await.unwrap();
    eventually(|| office.remote.subscriber_count(&residents_path()) == 0).await;
    assert_eq!(office.engine.status().phase, SyncPhase::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_edits_while_signed_out_are_pushed_after_sign_in() {
    let office = office(sync_on()).await;
    let credentials = Credentials::new(EMAIL, PASSWORD);

    office.gate.sign_in(&credentials).await.unwrap();
    eventually(|| office.engine.status().hydrated).await;
    add(&office.engine, "r1");
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(remote_has(&office.remote, "r1"));

    office.gate.sign_out().await.unwrap();
    eventually(|| office.engine.status().phase == SyncPhase::Disconnected).await;
    add(&office.engine, "r2");

    office.gate.sign_in(&credentials).await.unwrap();
    eventually(|| office.engine.status().phase == SyncPhase::Synced).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let status = office.engine.status();
    assert!(status.hydrated);
    assert_eq!(status.queued_changes, 0);
    assert!(remote_has(&office.remote, "r2"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_sign_in_stays_offline() {
    let office = office(sync_on()).await;

    let result = office
        .gate
        .sign_in(&Credentials::new(EMAIL, "salah"))
        .await;
    assert!(result.is_err());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(office.remote.calls(), 0);
    assert!(office.gate.status().last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_provider_revocation_disconnects() {
    let office = office(sync_on()).await;
    office.gate.follow_provider().unwrap();

    office
        .gate
        .sign_in(&Credentials::new(EMAIL, PASSWORD))
        .await
        .unwrap();
    eventually(|| office.remote.subscriber_count(&residents_path()) == 1).await;

    office.provider.revoke_session();
    eventually(|| office.gate.state() == AuthState::Unauthenticated).await;
    eventually(|| office.remote.subscriber_count(&residents_path()) == 0).await;
}

#[tokio::test(start_paused = true)]
async fn test_gate_is_bypassed_when_sync_disabled() {
    let office = office(AppConfig::default()).await;

    assert!(office.gate.is_open(&office.engine.config()));
    let status = office.engine.status();
    assert!(status.hydrated);
    assert_eq!(status.phase, SyncPhase::Disconnected);
    assert_eq!(office.remote.calls(), 0);
}
