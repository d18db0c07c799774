// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use anyhow::Context;
use chrono::Utc;
use reqwest::header::ACCEPT;
use tracing::{debug, info, warn};

use super::{RefreshFormat, SessionGateway};
use crate::error::GatewayError;
use crate::session::{SessionRecord, TokenGrant};

impl SessionGateway {
    /// One refresh round-trip. Every failure reads as `false`.
    pub(super) async fn refresh_once(&self) -> bool {
        match self.try_refresh().await {
            Ok(()) => true,
            Err(e) => {
                warn!(err = %format!("{e:#}"), "session refresh failed");
                false
            }
        }
    }

    async fn try_refresh(&self) -> anyhow::Result<()> {
        let current = self.slot.load()?;
        let refresh_token = current
            .as_ref()
            .map(|r| r.refresh_token.clone())
            .filter(|t| !t.is_empty())
            .context("no refresh token stored")?;

        let url = self.profile.url(&self.profile.refresh_path);
        let request = self.http.post(&url).header(ACCEPT, "application/json");
        let request = match self.profile.refresh_format {
            RefreshFormat::Json => {
                request.json(&serde_json::json!({ "refresh_token": refresh_token }))
            }
            RefreshFormat::OAuthForm { ref client_id } => request.form(&[
                ("grant_type", "refresh_token"),
                ("client_id", client_id.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ]),
        };

        debug!(%url, "refreshing session");
        let response = request.send().await?;
        let status = response.status();
        anyhow::ensure!(status.is_success(), "refresh rejected ({status})");

        let grant: TokenGrant = response.json().await.context("invalid refresh response")?;
        let rotated_session = grant.session_id.clone().filter(|s| !s.is_empty());
        let record = grant.into_record(current.as_ref(), Utc::now());
        self.slot.save(&record)?;
        if let Some(id) = rotated_session {
            self.config.set("session_id", id)?;
        }
        info!("session refreshed");
        Ok(())
    }

    /// Obtain a first token pair from the bootstrap endpoint and persist it.
    ///
    /// Unlike refresh, failures propagate: an unreachable backend is a
    /// [`GatewayError::Transport`] and a non-2xx answer is
    /// [`GatewayError::Bootstrap`].
    pub async fn init_session(&self) -> Result<SessionRecord, GatewayError> {
        let hint = self.profile.reauth_hint;
        let Some(ref path) = self.profile.bootstrap_path else {
            return Err(GatewayError::InitFailed { hint });
        };

        let url = self.profile.url(path);
        debug!(%url, "initializing session");
        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| self.transport(source))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Bootstrap { status: status.as_u16(), hint });
        }

        let grant: TokenGrant = match response.json().await {
            Ok(g) => g,
            Err(e) => {
                warn!(err = %e, "invalid bootstrap response");
                return Err(GatewayError::InitFailed { hint });
            }
        };
        let record = grant.into_record(None, Utc::now());
        self.slot.save(&record)?;
        if let Some(ref id) = record.session_id {
            self.config.set("session_id", id.as_str())?;
        }
        info!(session_id = record.session_id.as_deref().unwrap_or("-"), "session initialized");
        Ok(record)
    }
}
