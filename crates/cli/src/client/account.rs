// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account API: browser login, profile, `ask`, and backend health.
//!
//! Credentials live as flat keys in `config.json` and are recovered with a
//! refresh on 401.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::backend::{read_auth_status, AuthStatus};
use super::{read_json, unreachable};
use crate::error::GatewayError;
use crate::gateway::{ApiRequest, GatewayProfile, SessionGateway};
use crate::session::{SessionRecord, TokenGrant};
use crate::store::{ConfigStore, FlatSession};

/// Answer of `GET /auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInit {
    pub authorization_url: String,
    pub state: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserResource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountUser {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub account_type: String,
    #[serde(default)]
    pub account_status: String,
    #[serde(default)]
    pub resources: Vec<UserResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub data: AccountUser,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskRequest {
    pub prompt: String,
    pub interactive: bool,
    pub confirm: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl AskResponse {
    /// Token for `/ask/confirm` when the backend wants an approval.
    pub fn pending_confirmation(&self) -> Option<&str> {
        self.confirmation_token.as_deref().filter(|t| self.requires_confirmation && !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceHealth {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configured: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceHealth>,
}

/// How `logout` ended. The local session is cleared in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    LoggedOut,
    AlreadyExpired,
    Unreachable,
}

/// Client for the account API.
#[derive(Clone)]
pub struct AccountClient {
    gateway: SessionGateway,
}

impl AccountClient {
    pub fn new(http: reqwest::Client, base_url: &str, config: ConfigStore) -> Self {
        let slot = Arc::new(FlatSession::new(config.clone()));
        let gateway = SessionGateway::new(http, GatewayProfile::account(base_url), slot, config);
        Self { gateway }
    }

    pub fn gateway(&self) -> &SessionGateway {
        &self.gateway
    }

    pub fn base_url(&self) -> &str {
        &self.gateway.profile().base_url
    }

    pub fn session(&self) -> anyhow::Result<Option<SessionRecord>> {
        self.gateway.session()
    }

    pub fn is_logged_in(&self) -> anyhow::Result<bool> {
        Ok(self.session()?.is_some())
    }

    /// Start a browser login.
    pub async fn begin_login(&self) -> anyhow::Result<LoginInit> {
        let url = self.gateway.profile().url("/auth/login");
        let response =
            self.gateway.http().get(&url).send().await.map_err(unreachable(self.base_url()))?;
        read_json(response, "initiating login").await
    }

    /// Poll the login started by [`begin_login`](Self::begin_login).
    pub async fn login_status(&self, state: &str) -> anyhow::Result<AuthStatus> {
        let url = self.gateway.profile().url(&format!("/auth/status/{state}"));
        let response =
            self.gateway.http().get(&url).send().await.map_err(unreachable(self.base_url()))?;
        read_auth_status(response).await
    }

    /// Persist the tokens from a completed login.
    pub fn save_login(&self, grant: TokenGrant) -> anyhow::Result<SessionRecord> {
        anyhow::ensure!(grant.access_token().is_some(), "login completed without a token");
        let record = grant.into_record(None, Utc::now());
        self.gateway.save_session(&record)?;
        info!(account_id = record.account_id.as_deref().unwrap_or("-"), "logged in");
        Ok(record)
    }

    pub async fn me(&self) -> anyhow::Result<MeResponse> {
        let response = self.gateway.fetch("/auth/me", &ApiRequest::get()).await?;
        read_json(response, "fetching user information").await
    }

    pub async fn ask(&self, request: &AskRequest) -> anyhow::Result<AskResponse> {
        let body = serde_json::to_value(request)?;
        let response = self.gateway.fetch("/ask", &ApiRequest::post().json(&body)).await?;
        let answer: AskResponse = read_json(response, "ask").await?;
        anyhow::ensure!(!answer.message.is_empty(), "Invalid response structure from backend");
        Ok(answer)
    }

    pub async fn ask_confirm(&self, token: &str, approved: bool) -> anyhow::Result<AskResponse> {
        let body = serde_json::json!({ "confirmation_token": token, "approved": approved });
        let response = self.gateway.fetch("/ask/confirm", &ApiRequest::post().json(&body)).await?;
        read_json(response, "confirmation").await
    }

    /// Backend health, authenticated when a session exists.
    pub async fn health(&self) -> anyhow::Result<HealthReport> {
        let response = if self.is_logged_in()? {
            self.gateway.fetch("/health", &ApiRequest::get()).await?
        } else {
            let url = self.gateway.profile().url("/health");
            self.gateway.http().get(&url).send().await.map_err(unreachable(self.base_url()))?
        };
        read_json(response, "health check").await
    }

    /// Revoke the session server-side and forget it locally.
    ///
    /// Returns `Ok(None)` when there was nothing to log out.
    pub async fn logout(&self) -> anyhow::Result<Option<LogoutOutcome>> {
        let Some(record) = self.session()? else {
            return Ok(None);
        };
        let url = self.gateway.profile().url("/auth/logout");
        let sent = self
            .gateway
            .http()
            .post(&url)
            .bearer_auth(&record.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await;

        let outcome = match sent {
            Ok(response) if response.status().is_success() => LogoutOutcome::LoggedOut,
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                LogoutOutcome::AlreadyExpired
            }
            Ok(response) => {
                read_json::<serde_json::Value>(response, "logout").await?;
                LogoutOutcome::LoggedOut
            }
            Err(e) => {
                let err = GatewayError::Transport { url: self.base_url().to_owned(), source: e };
                warn!(err = %err, "logout call failed, clearing local session anyway");
                LogoutOutcome::Unreachable
            }
        };
        self.gateway.clear_session()?;
        info!(?outcome, "logged out");
        Ok(Some(outcome))
    }
}

#[cfg(test)]
#[path = "account_tests.rs"]
mod tests;
