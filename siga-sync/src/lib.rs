//! Local-first sync core for the SIGA village civil registry
//!
//! The registry must keep working on a village office laptop with a flaky
//! connection. Every change lands in the on-device store first; a shared
//! remote document store is an optional, eventually consistent replica.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  mutate / apply   ┌──────────────┐  write_batched  ┌─────────────┐
//! │  UI layer  │ ────────────────► │  SyncEngine  │ ──────────────► │ RemoteStore │
//! │            │ ◄──── watch ───── │              │ ◄── subscribe ─ │             │
//! └────────────┘                   └──────┬───────┘                 └─────────────┘
//!                                         │ get / set
//!                                  ┌──────▼───────┐
//!                                  │  LocalStore  │
//!                                  └──────────────┘
//! ```
//!
//! - **Local store**: [`SqliteLocalStore`] on device, [`MemoryLocalStore`] in tests
//! - **Remote store**: [`HttpRemoteStore`] against the document service,
//!   [`MemoryRemoteStore`] for tests and multi-session simulations
//! - **Session gate**: [`SessionGate`] keeps the engine offline until a user
//!   signs in, when remote sync is enabled
//!
//! ## Example
//!
//! ```ignore
//! use siga_sync::{SqliteLocalStore, HttpRemoteStore, SyncEngine, SyncSettings};
//!
//! let settings = SyncSettings::load("siga.toml")?;
//! let local = Arc::new(SqliteLocalStore::open(&data_dir.join("siga.db"))?);
//! let remote = Arc::new(HttpRemoteStore::new(&credentials, &settings)?);
//!
//! let engine = SyncEngine::open(local, remote, settings)?;
//! engine.initialize().await?;
//! engine.apply(ResidentCommand::ReportDeath { id, date })?;
//! ```

pub mod debounce;
pub mod engine;
pub mod error;
pub mod local;
pub mod logging;
pub mod push_queue;
pub mod remote;
pub mod session;
pub mod settings;

// Re-export main types
pub use engine::{SyncEngine, SyncPhase, SyncStatus};
pub use error::{LocalStoreError, RemoteError, Result, SessionError, SettingsError, SyncError};
pub use local::{LocalStore, MemoryLocalStore, SqliteLocalStore};
pub use remote::{
    CollectionBody, HttpRemoteStore, MemoryRemoteStore, RecordWrite, RemoteChange,
    RemoteDocument, RemoteStore, RemoteSubscription, VersionToken,
};
pub use session::{
    AuthState, Credentials, GateStatus, HttpSessionProvider, MemorySessionProvider, Session,
    SessionGate, SessionProvider,
};
pub use settings::SyncSettings;

// Domain types callers need alongside the engine
pub use siga_registry::{AppConfig, ResidentCollection, ResidentCommand};
