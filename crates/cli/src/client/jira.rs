// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Direct Jira access with credentials stored under the `jira` config key.
//!
//! Basic-auth credentials (email + API token) are sent as-is. OAuth
//! credentials go through a [`SessionGateway`] with the Jira profile, so an
//! expired access token is refreshed once with the stored refresh token.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{read_json, unreachable};
use crate::gateway::{ApiRequest, GatewayProfile, SessionGateway};
use crate::session::{SessionRecord, SessionSlot, TokenGrant};
use crate::store::ConfigStore;

pub const JIRA_KEY: &str = "jira";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JiraAuthType {
    #[default]
    Basic,
    Oauth,
}

/// The `jira` config entry. Field names are camelCase on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub base_url: String,
    /// Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub auth_type: JiraAuthType,
}

fn present(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.is_empty())
}

impl JiraCredentials {
    /// Read the entry. A malformed entry reads as absent.
    pub fn load(config: &ConfigStore) -> anyhow::Result<Option<Self>> {
        let Some(value) = config.get(JIRA_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_value::<Self>(value) {
            Ok(creds) if creds.is_usable() => Ok(Some(creds)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(err = %e, "ignoring malformed jira credentials");
                Ok(None)
            }
        }
    }

    pub fn save(&self, config: &ConfigStore) -> anyhow::Result<()> {
        config.set(JIRA_KEY, serde_json::to_value(self)?)
    }

    pub fn clear(config: &ConfigStore) -> anyhow::Result<()> {
        config.delete(JIRA_KEY)
    }

    pub fn is_usable(&self) -> bool {
        !self.base_url.is_empty() && (present(&self.access_token) || self.basic().is_some())
    }

    /// Email and API token when basic auth applies.
    pub fn basic(&self) -> Option<(&str, &str)> {
        if self.auth_type != JiraAuthType::Basic {
            return None;
        }
        let email = self.email.as_deref().filter(|s| !s.is_empty())?;
        let token = self.api_token.as_deref().filter(|s| !s.is_empty())?;
        Some((email, token))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|ms| ms <= now.timestamp_millis())
    }
}

/// Store basic-auth credentials for `base_url`.
pub fn save_basic(
    config: &ConfigStore,
    base_url: &str,
    email: &str,
    api_token: &str,
) -> anyhow::Result<JiraCredentials> {
    let creds = JiraCredentials {
        email: Some(email.to_owned()),
        api_token: Some(api_token.to_owned()),
        base_url: base_url.trim_end_matches('/').to_owned(),
        auth_type: JiraAuthType::Basic,
        ..JiraCredentials::default()
    };
    creds.save(config)?;
    Ok(creds)
}

/// Store the tokens from an OAuth code exchange.
pub fn save_oauth(
    config: &ConfigStore,
    base_url: &str,
    client_id: &str,
    grant: &TokenGrant,
    now: DateTime<Utc>,
) -> anyhow::Result<JiraCredentials> {
    let access_token = grant.access_token().context("token exchange returned no access token")?;
    let expires_at = grant.expiry(now).and_then(|at| rfc3339_to_ms(&at));
    let creds = JiraCredentials {
        access_token: Some(access_token.to_owned()),
        refresh_token: grant.refresh_token.clone().filter(|s| !s.is_empty()),
        client_id: Some(client_id.to_owned()),
        base_url: base_url.trim_end_matches('/').to_owned(),
        expires_at,
        auth_type: JiraAuthType::Oauth,
        ..JiraCredentials::default()
    };
    creds.save(config)?;
    Ok(creds)
}

fn rfc3339_to_ms(at: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(at).ok().map(|t| t.timestamp_millis())
}

fn ms_to_rfc3339(ms: i64) -> Option<String> {
    Utc.timestamp_millis_opt(ms).single().map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// OAuth tokens of the `jira` entry seen as a session record.
///
/// Lenient: any stored access token is returned, with or without a refresh
/// token or expiry. Clearing removes the whole entry.
pub struct JiraSlot {
    config: ConfigStore,
}

impl JiraSlot {
    pub fn new(config: ConfigStore) -> Self {
        Self { config }
    }
}

impl SessionSlot for JiraSlot {
    fn load(&self) -> anyhow::Result<Option<SessionRecord>> {
        let Some(creds) = JiraCredentials::load(&self.config)? else {
            return Ok(None);
        };
        if creds.auth_type != JiraAuthType::Oauth {
            return Ok(None);
        }
        let Some(access_token) = creds.access_token.filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        Ok(Some(SessionRecord {
            access_token,
            refresh_token: creds.refresh_token.unwrap_or_default(),
            expires_at: creds.expires_at.and_then(ms_to_rfc3339).unwrap_or_default(),
            session_id: None,
            account_id: None,
        }))
    }

    fn save(&self, record: &SessionRecord) -> anyhow::Result<()> {
        let mut creds = JiraCredentials::load(&self.config)?.unwrap_or_default();
        creds.access_token = Some(record.access_token.clone());
        if !record.refresh_token.is_empty() {
            creds.refresh_token = Some(record.refresh_token.clone());
        }
        creds.expires_at = rfc3339_to_ms(&record.expires_at);
        creds.auth_type = JiraAuthType::Oauth;
        creds.save(&self.config)
    }

    fn clear(&self) -> anyhow::Result<()> {
        JiraCredentials::clear(&self.config)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraUser {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email_address: String,
}

/// Client for one Jira site.
pub struct JiraClient {
    http: reqwest::Client,
    credentials: JiraCredentials,
    gateway: Option<SessionGateway>,
}

impl JiraClient {
    /// Build a client from stored credentials, if any.
    pub fn load(http: reqwest::Client, config: &ConfigStore) -> anyhow::Result<Option<Self>> {
        let Some(credentials) = JiraCredentials::load(config)? else {
            return Ok(None);
        };
        let gateway = (credentials.auth_type == JiraAuthType::Oauth).then(|| {
            let client_id = credentials.client_id.as_deref().unwrap_or_default();
            SessionGateway::new(
                http.clone(),
                GatewayProfile::jira(&credentials.base_url, client_id),
                Arc::new(JiraSlot::new(config.clone())),
                config.clone(),
            )
        });
        Ok(Some(Self { http, credentials, gateway }))
    }

    pub fn credentials(&self) -> &JiraCredentials {
        &self.credentials
    }

    pub fn base_url(&self) -> &str {
        &self.credentials.base_url
    }

    /// The authenticated user (`GET /rest/api/3/myself`).
    pub async fn myself(&self) -> anyhow::Result<JiraUser> {
        let response = self.get("/rest/api/3/myself").await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            anyhow::bail!("Invalid or expired credentials. Run 'kay login' to re-authenticate.");
        }
        read_json(response, "Jira request").await
    }

    async fn get(&self, path: &str) -> anyhow::Result<Response> {
        if let Some(ref gateway) = self.gateway {
            return Ok(gateway.fetch(path, &ApiRequest::get()).await?);
        }
        let (email, token) = self.credentials.basic().context("Invalid credentials")?;
        let url = format!("{}{path}", self.base_url());
        let response = self
            .http
            .get(&url)
            .basic_auth(email, Some(token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(unreachable(self.base_url()))?;
        Ok(response)
    }

    /// Unauthenticated reachability probe (`GET /rest/api/3/serverInfo`).
    pub async fn server_info(&self, timeout: Duration) -> anyhow::Result<Value> {
        let url = format!("{}/rest/api/3/serverInfo", self.base_url());
        let response = self
            .http
            .get(&url)
            .timeout(timeout)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(unreachable(self.base_url()))?;
        let info = read_json(response, "Jira server info").await?;
        info!(site = %self.base_url(), "jira reachable");
        Ok(info)
    }
}

#[cfg(test)]
#[path = "jira_tests.rs"]
mod tests;
