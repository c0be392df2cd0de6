//! Application config singleton
//!
//! Split in two halves with different sync rules: the presentation fields are
//! shared with every session through the remote store, the connection
//! descriptor never leaves the device it was entered on.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Public identity and presentation fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    pub app_name: String,
    pub subtitle: String,
    pub logo_url: String,
    pub operator_name: String,
    pub village_head_name: String,
    #[serde(default)]
    pub theme: Theme,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            app_name: "SIGA Ngumbul".to_string(),
            subtitle: "Kec. Todanan, Kab. Blora".to_string(),
            logo_url: "https://upload.wikimedia.org/wikipedia/commons/1/1d/Lambang_Kabupaten_Blora.png"
                .to_string(),
            operator_name: "ADMIN DESA".to_string(),
            village_head_name: "SULARNO".to_string(),
            theme: Theme::Light,
        }
    }
}

/// Credentials for the remote document store
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCredentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub project_id: String,
    /// Base URL of the document API
    #[serde(default)]
    pub endpoint: String,
    /// Base URL of the identity API, if it differs from `endpoint`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_endpoint: Option<String>,
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("api_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("endpoint", &self.endpoint)
            .field("auth_endpoint", &self.auth_endpoint)
            .finish()
    }
}

/// Whether remote sync is on, and how to reach the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConnection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub credentials: RemoteCredentials,
}

/// The config singleton
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(flatten)]
    pub presentation: Presentation,
    #[serde(default)]
    pub connection: RemoteConnection,
}

impl AppConfig {
    /// Sync needs the flag and a project to talk to
    pub fn sync_enabled(&self) -> bool {
        self.connection.enabled && !self.connection.credentials.project_id.trim().is_empty()
    }

    /// Take presentation fields from a remote copy, keep local credentials
    pub fn merged_with_remote(&self, remote: Presentation) -> AppConfig {
        AppConfig {
            presentation: remote,
            connection: self.connection.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
