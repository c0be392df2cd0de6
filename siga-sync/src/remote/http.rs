//! REST client for the hosted document store
//!
//! Subscriptions are emulated by polling: the document is re-read every
//! `poll_interval` and a change is emitted only when its version moved.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{RecordWrite, RemoteChange, RemoteDocument, RemoteStore, RemoteSubscription, VersionToken};
use crate::error::RemoteError;
use crate::settings::SyncSettings;
use siga_registry::RemoteCredentials;

#[derive(Serialize)]
struct CommitRequest<'a> {
    version: &'a VersionToken,
    writes: &'a [RecordWrite],
}

/// HTTP client for the document API
#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    client: Client,
    poll_interval: Duration,
}

impl HttpRemoteStore {
    pub fn new(credentials: &RemoteCredentials, settings: &SyncSettings) -> Result<Self, RemoteError> {
        let endpoint = credentials.endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(RemoteError::InvalidConfig("endpoint is empty".to_string()));
        }
        if credentials.project_id.trim().is_empty() {
            return Err(RemoteError::InvalidConfig("project id is empty".to_string()));
        }

        let mut headers = header::HeaderMap::new();
        if !credentials.api_key.is_empty() {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", credentials.api_key))
                .map_err(|_| RemoteError::InvalidConfig("API key is not a valid header".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self {
            base_url: format!("{}/v1/projects/{}", endpoint, credentials.project_id.trim()),
            client,
            poll_interval: settings.poll_interval(),
        })
    }

    fn document_url(&self, path: &str) -> String {
        format!("{}/documents/{}", self.base_url, path.trim_matches('/'))
    }

    fn commit_url(&self, path: &str) -> String {
        format!("{}:commit", self.document_url(path))
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(response.url().path().to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn handle_empty(&self, response: reqwest::Response) -> Result<(), RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn read_once(&self, path: &str) -> Result<Option<RemoteDocument>, RemoteError> {
        let response = self.client.get(self.document_url(path)).send().await?;
        match self.handle_response(response).await {
            Ok(doc) => Ok(Some(doc)),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn subscribe(&self, path: &str) -> Result<RemoteSubscription, RemoteError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();
        let path = path.to_string();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_version: Option<Option<VersionToken>> = None;
            let mut failing = false;

            loop {
                ticker.tick().await;
                let change = match store.read_once(&path).await {
                    Ok(document) => {
                        failing = false;
                        let version = document.as_ref().and_then(|d| d.version.clone());
                        if last_version.as_ref() == Some(&version) {
                            continue;
                        }
                        last_version = Some(version);
                        RemoteChange::snapshot(document)
                    }
                    Err(e) => {
                        if failing {
                            continue;
                        }
                        failing = true;
                        warn!(path = %path, error = %e, "Remote poll failed");
                        RemoteChange::Failed(e.to_string())
                    }
                };
                if tx.send(change).is_err() {
                    break;
                }
            }
            debug!(path = %path, "Poller stopped");
        });

        Ok(RemoteSubscription::with_task(rx, task))
    }

    async fn write_batched(
        &self,
        path: &str,
        writes: Vec<RecordWrite>,
        version: &VersionToken,
        max_batch_size: usize,
    ) -> Result<(), RemoteError> {
        for chunk in writes.chunks(max_batch_size.max(1)) {
            let response = self
                .client
                .post(self.commit_url(path))
                .json(&CommitRequest {
                    version,
                    writes: chunk,
                })
                .send()
                .await?;
            self.handle_empty(response).await?;
            debug!(path, size = chunk.len(), %version, "Committed chunk");
        }
        Ok(())
    }

    async fn write_document(&self, path: &str, document: RemoteDocument) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.document_url(path))
            .json(&document)
            .send()
            .await?;
        self.handle_empty(response).await
    }
}
