//! In-process identity provider with Argon2-hashed accounts

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

use super::password::{hash_password, verify_password};
use super::{Credentials, Session, SessionProvider};
use crate::error::SessionError;

/// Session lifetime handed out on sign-in
const SESSION_TTL_HOURS: i64 = 8;

pub struct MemorySessionProvider {
    accounts: Mutex<HashMap<String, String>>,
    session_tx: watch::Sender<Option<Session>>,
}

impl Default for MemorySessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionProvider {
    pub fn new() -> Self {
        let (session_tx, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session_tx,
        }
    }

    fn accounts(&self) -> MutexGuard<'_, HashMap<String, String>> {
        match self.accounts.lock() {
            Ok(accounts) => accounts,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register an account; emails are matched case-insensitively
    pub fn add_account(&self, email: &str, password: &str) -> Result<(), SessionError> {
        let hash = hash_password(password)?;
        self.accounts().insert(email.trim().to_lowercase(), hash);
        Ok(())
    }

    /// End the session from the provider side, as an expiry would
    pub fn revoke_session(&self) {
        self.session_tx.send_replace(None);
    }
}

#[async_trait]
impl SessionProvider for MemorySessionProvider {
    async fn current_session(&self) -> Result<Option<Session>, SessionError> {
        let session = self.session_tx.borrow().clone();
        Ok(session.filter(|s| !s.is_expired(Utc::now())))
    }

    fn on_session_change(&self) -> watch::Receiver<Option<Session>> {
        self.session_tx.subscribe()
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        let email = credentials.email.trim().to_lowercase();
        let hash = self
            .accounts()
            .get(&email)
            .cloned()
            .ok_or(SessionError::InvalidCredentials)?;
        if !verify_password(&credentials.password, &hash)? {
            return Err(SessionError::InvalidCredentials);
        }

        let session = Session {
            user_id: uuid::Uuid::new_v4().to_string(),
            email,
            token: uuid::Uuid::new_v4().simple().to_string(),
            expires_at: Some(Utc::now() + chrono::Duration::hours(SESSION_TTL_HOURS)),
        };
        self.session_tx.send_replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        self.session_tx.send_replace(None);
        Ok(())
    }
}
