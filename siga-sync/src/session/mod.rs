//! Session gate
//!
//! When remote sync is enabled the engine only talks to the remote store
//! while a user session exists. The gate is a three-state machine over a
//! [`SessionProvider`]; with sync disabled it is bypassed entirely.

mod http;
mod memory;
pub mod password;

pub use http::HttpSessionProvider;
pub use memory::MemorySessionProvider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::SessionError;
use siga_registry::AppConfig;

/// Email and password sign-in
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated user session
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Identity backend
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Session restored from a previous sign-in, if still valid
    async fn current_session(&self) -> Result<Option<Session>, SessionError>;

    /// Provider-side session changes (expiry, sign-out elsewhere)
    fn on_session_change(&self) -> watch::Receiver<Option<Session>>;

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, SessionError>;

    async fn sign_out(&self) -> Result<(), SessionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// Observable gate state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateStatus {
    pub state: AuthState,
    pub session: Option<Session>,
    pub last_error: Option<String>,
}

impl Default for GateStatus {
    fn default() -> Self {
        Self {
            state: AuthState::Unauthenticated,
            session: None,
            last_error: None,
        }
    }
}

struct GateInner {
    provider: Arc<dyn SessionProvider>,
    status_tx: watch::Sender<GateStatus>,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for GateInner {
    fn drop(&mut self) {
        let follower = match self.follower.get_mut() {
            Ok(follower) => follower.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = follower {
            task.abort();
        }
    }
}

/// Authentication gate in front of remote sync
#[derive(Clone)]
pub struct SessionGate {
    inner: Arc<GateInner>,
}

impl SessionGate {
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        let (status_tx, _) = watch::channel(GateStatus::default());
        Self {
            inner: Arc::new(GateInner {
                provider,
                status_tx,
                follower: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> AuthState {
        self.inner.status_tx.borrow().state
    }

    pub fn status(&self) -> GateStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<GateStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Sync may proceed: either it is disabled or a session exists
    pub fn is_open(&self, config: &AppConfig) -> bool {
        !config.sync_enabled() || self.state() == AuthState::Authenticated
    }

    fn set(&self, state: AuthState, session: Option<Session>, last_error: Option<String>) {
        let next = GateStatus {
            state,
            session,
            last_error,
        };
        self.inner.status_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Resume an existing session if the provider has one
    pub async fn start(&self) -> AuthState {
        self.set(AuthState::Authenticating, None, None);
        match self.inner.provider.current_session().await {
            Ok(Some(session)) => {
                info!(user = %session.email, "Session resumed");
                self.set(AuthState::Authenticated, Some(session), None);
            }
            Ok(None) => self.set(AuthState::Unauthenticated, None, None),
            Err(e) => {
                warn!(error = %e, "Could not restore session");
                self.set(AuthState::Unauthenticated, None, Some(e.to_string()));
            }
        }
        self.state()
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        self.set(AuthState::Authenticating, None, None);
        match self.inner.provider.sign_in(credentials).await {
            Ok(session) => {
                info!(user = %session.email, "Signed in");
                self.set(AuthState::Authenticated, Some(session.clone()), None);
                Ok(session)
            }
            Err(e) => {
                warn!(user = %credentials.email, error = %e, "Sign-in failed");
                self.set(AuthState::Unauthenticated, None, Some(e.to_string()));
                Err(e)
            }
        }
    }

    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.inner.provider.sign_out().await?;
        info!("Signed out");
        self.set(AuthState::Unauthenticated, None, None);
        Ok(())
    }

    /// Track provider-side session changes in the background
    pub fn follow_provider(&self) -> Result<(), SessionError> {
        let runtime = Handle::try_current().map_err(|e| SessionError::Runtime(e.to_string()))?;
        let mut changes = self.inner.provider.on_session_change();
        let gate = Arc::downgrade(&self.inner);

        let task = runtime.spawn(async move {
            while changes.changed().await.is_ok() {
                let session = changes.borrow_and_update().clone();
                let Some(inner) = gate.upgrade() else { break };
                let gate = SessionGate { inner };
                if gate.state() == AuthState::Authenticating {
                    continue;
                }
                match session {
                    Some(session) => gate.set(AuthState::Authenticated, Some(session), None),
                    None => {
                        if gate.state() == AuthState::Authenticated {
                            info!("Session ended by provider");
                        }
                        gate.set(AuthState::Unauthenticated, None, None);
                    }
                }
            }
        });

        let mut follower = self.follower();
        if let Some(previous) = follower.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn follower(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.inner.follower.lock() {
            Ok(follower) => follower,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
