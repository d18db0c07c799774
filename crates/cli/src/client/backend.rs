// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session backend: service connections for the current session.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::read_json;
use crate::gateway::{with_query, ApiRequest, GatewayProfile, SessionGateway};
use crate::session::TokenGrant;
use crate::store::{ConfigStore, SessionFile};

/// Services the backend can connect on behalf of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Kyg,
    Jira,
    Confluence,
    Bitbucket,
}

impl Service {
    pub const ALL: [Service; 4] = [Self::Kyg, Self::Jira, Self::Confluence, Self::Bitbucket];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kyg => "kyg",
            Self::Jira => "jira",
            Self::Confluence => "confluence",
            Self::Bitbucket => "bitbucket",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Kyg => "KYG Trade",
            Self::Jira => "Jira",
            Self::Confluence => "Confluence",
            Self::Bitbucket => "Bitbucket",
        }
    }

    /// Whether connecting uses email/password instead of a browser flow.
    pub fn uses_credentials(&self) -> bool {
        matches!(self, Self::Kyg)
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl ConnectionUser {
    /// `Name (email)`, or whichever half is known.
    pub fn label(&self) -> Option<String> {
        let name = self.name.as_ref().or(self.display_name.as_ref()).or(self.username.as_ref());
        match (name, &self.email) {
            (Some(n), Some(e)) if n != e => Some(format!("{n} ({e})")),
            (Some(n), _) => Some(n.clone()),
            (None, Some(e)) => Some(e.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConnection {
    #[serde(default)]
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ConnectionUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionsStatus {
    #[serde(default)]
    pub connections: BTreeMap<String, ServiceConnection>,
}

impl ConnectionsStatus {
    pub fn get(&self, service: Service) -> Option<&ServiceConnection> {
        self.connections.get(service.as_str())
    }

    pub fn is_connected(&self, service: Service) -> bool {
        self.get(service).is_some_and(|c| c.connected)
    }
}

/// Body of `POST /connections/connect`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectResponse {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub authorization_url: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_reset: bool,
}

impl ConnectResponse {
    /// Authorization URL and state when the service needs a browser step.
    pub fn authorization(&self) -> Option<(&str, &str)> {
        let url = self.authorization_url.as_deref().filter(|u| !u.is_empty())?;
        let state = self.state.as_deref().filter(|s| !s.is_empty())?;
        Some((url, state))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisconnectResponse {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Answer of `GET /auth/status/{state}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub grant: TokenGrant,
}

impl AuthStatus {
    pub fn is_pending(&self) -> bool {
        self.status == "pending"
    }

    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

/// Read an `/auth/status` answer. A 400 means the state is unknown or stale.
pub(crate) async fn read_auth_status(response: reqwest::Response) -> anyhow::Result<AuthStatus> {
    if response.status() == StatusCode::BAD_REQUEST {
        anyhow::bail!("Invalid or expired state parameter");
    }
    read_json(response, "status check").await
}

/// Client for the session backend (`session.json`, classified recovery).
#[derive(Clone)]
pub struct BackendClient {
    gateway: SessionGateway,
}

impl BackendClient {
    pub fn new(http: reqwest::Client, base_url: &str, state_dir: &Path) -> Self {
        let gateway = SessionGateway::new(
            http,
            GatewayProfile::session(base_url),
            Arc::new(SessionFile::new(state_dir)),
            ConfigStore::new(state_dir),
        );
        Self { gateway }
    }

    pub fn gateway(&self) -> &SessionGateway {
        &self.gateway
    }

    pub fn session_id(&self) -> anyhow::Result<Option<String>> {
        self.gateway.session_id()
    }

    pub async fn connections(&self, session_id: &str) -> anyhow::Result<ConnectionsStatus> {
        let path = with_query("/connections", &[("session_id", session_id)]);
        let response = self.gateway.fetch(&path, &ApiRequest::get()).await?;
        read_json(response, "fetching connection status").await
    }

    /// Start connecting `service`. A returned `session_id` becomes the
    /// session's current id.
    pub async fn connect(
        &self,
        service: Service,
        request: &ConnectRequest,
    ) -> anyhow::Result<ConnectResponse> {
        let path = with_query("/connections/connect", &[("service", service.as_str())]);
        let body = serde_json::to_value(request)?;
        let response = self.gateway.fetch(&path, &ApiRequest::post().json(&body)).await?;
        let connected: ConnectResponse = read_json(response, "connect").await?;
        if let Some(id) = connected.session_id.as_deref().filter(|s| !s.is_empty()) {
            self.gateway.config().set("session_id", id)?;
        }
        info!(%service, reset = connected.session_reset, "connect started");
        Ok(connected)
    }

    pub async fn disconnect(
        &self,
        service: Service,
        session_id: &str,
    ) -> anyhow::Result<DisconnectResponse> {
        let path = with_query("/connections/disconnect", &[("service", service.as_str())]);
        let body = serde_json::json!({ "session_id": session_id });
        let response = self.gateway.fetch(&path, &ApiRequest::post().json(&body)).await?;
        read_json(response, "disconnect").await
    }

    pub async fn auth_status(&self, state: &str) -> anyhow::Result<AuthStatus> {
        let path = format!("/auth/status/{state}");
        let response = self.gateway.fetch(&path, &ApiRequest::get()).await?;
        read_auth_status(response).await
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
