//! Password sign-in against the document store's identity service

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use super::{Credentials, Session, SessionProvider};
use crate::error::SessionError;
use crate::settings::SyncSettings;
use siga_registry::RemoteCredentials;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    user_id: String,
    email: String,
    token: String,
    /// Seconds until the token expires
    #[serde(default)]
    expires_in: Option<i64>,
}

pub struct HttpSessionProvider {
    base_url: String,
    api_key: String,
    client: Client,
    session_tx: watch::Sender<Option<Session>>,
}

impl HttpSessionProvider {
    /// Uses `auth_endpoint` when set, the document endpoint otherwise
    pub fn new(credentials: &RemoteCredentials, settings: &SyncSettings) -> Result<Self, SessionError> {
        let endpoint = credentials
            .auth_endpoint
            .as_deref()
            .unwrap_or(credentials.endpoint.as_str())
            .trim()
            .trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(SessionError::NotConfigured("identity endpoint is empty".to_string()));
        }

        let client = Client::builder().timeout(settings.request_timeout()).build()?;
        let (session_tx, _) = watch::channel(None);

        Ok(Self {
            base_url: endpoint.to_string(),
            api_key: credentials.api_key.clone(),
            client,
            session_tx,
        })
    }

    fn sign_in_url(&self) -> String {
        format!("{}/v1/accounts:signInWithPassword", self.base_url)
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn current_session(&self) -> Result<Option<Session>, SessionError> {
        let session = self.session_tx.borrow().clone();
        Ok(session.filter(|s| !s.is_expired(Utc::now())))
    }

    fn on_session_change(&self) -> watch::Receiver<Option<Session>> {
        self.session_tx.subscribe()
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        let response = self
            .client
            .post(self.sign_in_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&SignInRequest {
                email: credentials.email.trim(),
                password: &credentials.password,
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(SessionError::InvalidCredentials);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SessionError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let body: SignInResponse = response.json().await?;
        let session = Session {
            user_id: body.user_id,
            email: body.email,
            token: body.token,
            expires_at: body
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        };
        debug!(user = %session.email, "Identity service accepted credentials");
        self.session_tx.send_replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        self.session_tx.send_replace(None);
        Ok(())
    }
}
