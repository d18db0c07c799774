// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session record model and the [`SessionSlot`] seam over where it is stored.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Durable authentication state for one identity.
///
/// `expires_at` is advisory. The backend's 401/403 responses remain the
/// source of truth for whether a token still works.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl SessionRecord {
    /// A record is usable only when the token pair and expiry are all present.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty()
            && !self.refresh_token.is_empty()
            && !self.expires_at.is_empty()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Missing or unparsable expiry counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match DateTime::parse_from_rfc3339(&self.expires_at) {
            Ok(at) => at.with_timezone(&Utc) <= now,
            Err(_) => true,
        }
    }

    /// The bearer credential, if any.
    pub fn bearer(&self) -> Option<&str> {
        Some(self.access_token.as_str()).filter(|t| !t.is_empty())
    }
}

/// Token payload returned by the bootstrap, refresh, and login-status
/// endpoints. Every field is optional; [`TokenGrant::into_record`] is the one
/// place where the variants are reconciled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl TokenGrant {
    /// Access token by preference: `session_token`, then `token`, then
    /// `access_token`. Empty strings are skipped.
    pub fn access_token(&self) -> Option<&str> {
        [&self.session_token, &self.token, &self.access_token]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .find(|v| !v.is_empty())
    }

    /// Expiry as RFC 3339, from `expires_at` or derived from `expires_in`.
    pub fn expiry(&self, now: DateTime<Utc>) -> Option<String> {
        if let Some(at) = self.expires_at.as_deref().filter(|v| !v.is_empty()) {
            return Some(at.to_owned());
        }
        let secs = i64::try_from(self.expires_in?).ok()?;
        let at = now.checked_add_signed(chrono::Duration::seconds(secs))?;
        Some(at.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    /// Fold this grant over the `previous` record.
    ///
    /// Fields the grant omits keep their previous value. An expiry that is
    /// unknown on both sides is recorded as `now`, so the advisory check
    /// treats it as already expired.
    pub fn into_record(self, previous: Option<&SessionRecord>, now: DateTime<Utc>) -> SessionRecord {
        let expires_at = self
            .expiry(now)
            .or_else(|| previous.map(|p| p.expires_at.clone()).filter(|v| !v.is_empty()))
            .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Secs, true));
        let access_token = self.access_token().unwrap_or_default().to_owned();

        SessionRecord {
            access_token,
            refresh_token: keep(self.refresh_token, previous.map(|p| &p.refresh_token))
                .unwrap_or_default(),
            expires_at,
            session_id: keep(self.session_id, previous.and_then(|p| p.session_id.as_ref())),
            account_id: keep(self.account_id, previous.and_then(|p| p.account_id.as_ref())),
        }
    }
}

fn keep(fresh: Option<String>, old: Option<&String>) -> Option<String> {
    fresh.filter(|v| !v.is_empty()).or_else(|| old.cloned())
}

/// Where a [`SessionRecord`] lives.
///
/// Implementations re-read storage on every call; nothing is cached.
pub trait SessionSlot: Send + Sync {
    /// Load the stored record. `None` means no usable session.
    fn load(&self) -> anyhow::Result<Option<SessionRecord>>;

    fn save(&self, record: &SessionRecord) -> anyhow::Result<()>;

    fn clear(&self) -> anyhow::Result<()>;
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
