// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request primitive with transparent session recovery.
//!
//! [`SessionGateway::fetch`] attaches the stored bearer token, and on an
//! authentication failure runs one recovery step (refresh or bootstrap)
//! before replaying the request exactly once. Concurrent refreshes on the
//! same gateway share a single in-flight call.

mod inflight;
mod query;
mod recovery;

use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use tracing::{debug, warn};

use crate::error::{AuthErrorCode, ErrorBody, GatewayError};
use crate::session::{SessionRecord, SessionSlot};
use crate::store::ConfigStore;

pub use query::{rewrite_session_param, with_query};

use self::inflight::RefreshCell;

/// Replays allowed after a successful recovery.
pub const MAX_AUTH_RETRIES: u32 = 1;

/// How an authentication failure is turned into a recovery step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    /// 401 and 403, branching on the body's error code.
    Classified,
    /// 401 only, always answered with a refresh.
    RefreshOnly,
}

/// Body encoding for the refresh call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshFormat {
    /// `{"refresh_token": ...}`
    Json,
    /// OAuth 2.0 `grant_type=refresh_token` form.
    OAuthForm { client_id: String },
}

/// Everything that differs between backends sharing the recovery protocol.
#[derive(Debug, Clone)]
pub struct GatewayProfile {
    pub base_url: String,
    pub bootstrap_path: Option<String>,
    pub refresh_path: String,
    pub refresh_format: RefreshFormat,
    pub mode: RecoveryMode,
    /// Command suggested in terminal errors.
    pub reauth_hint: &'static str,
}

impl GatewayProfile {
    /// The session backend: `session.json`, classified 401/403 recovery.
    pub fn session(base_url: &str) -> Self {
        Self {
            base_url: trim_base(base_url),
            bootstrap_path: Some("/session/init".into()),
            refresh_path: "/session/refresh".into(),
            refresh_format: RefreshFormat::Json,
            mode: RecoveryMode::Classified,
            reauth_hint: "kay connect",
        }
    }

    /// The account API: flattened credentials, refresh on 401.
    pub fn account(base_url: &str) -> Self {
        Self {
            base_url: trim_base(base_url),
            bootstrap_path: None,
            refresh_path: "/auth/refresh".into(),
            refresh_format: RefreshFormat::Json,
            mode: RecoveryMode::RefreshOnly,
            reauth_hint: "kay login",
        }
    }

    /// A Jira site using OAuth 2.0 bearer tokens.
    pub fn jira(base_url: &str, client_id: &str) -> Self {
        Self {
            base_url: trim_base(base_url),
            bootstrap_path: None,
            refresh_path: "/rest/oauth2/latest/token".into(),
            refresh_format: RefreshFormat::OAuthForm { client_id: client_id.to_owned() },
            mode: RecoveryMode::RefreshOnly,
            reauth_hint: "kay jira login",
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn is_auth_failure(&self, status: StatusCode) -> bool {
        match self.mode {
            RecoveryMode::Classified => {
                status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
            }
            RecoveryMode::RefreshOnly => status == StatusCode::UNAUTHORIZED,
        }
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_owned()
}

/// A replayable request description.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post() -> Self {
        Self { method: Method::POST, ..Self::default() }
    }

    pub fn json(mut self, value: &serde_json::Value) -> Self {
        self.body = Some(Bytes::from(value.to_string()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Authenticated HTTP access to one backend.
///
/// Clones share the underlying client and the in-flight refresh cell.
#[derive(Clone)]
pub struct SessionGateway {
    http: reqwest::Client,
    profile: Arc<GatewayProfile>,
    slot: Arc<dyn SessionSlot>,
    config: ConfigStore,
    inflight: RefreshCell,
}

impl SessionGateway {
    pub fn new(
        http: reqwest::Client,
        profile: GatewayProfile,
        slot: Arc<dyn SessionSlot>,
        config: ConfigStore,
    ) -> Self {
        Self { http, profile: Arc::new(profile), slot, config, inflight: RefreshCell::default() }
    }

    pub fn profile(&self) -> &GatewayProfile {
        &self.profile
    }

    pub fn session(&self) -> anyhow::Result<Option<SessionRecord>> {
        self.slot.load()
    }

    pub fn save_session(&self, record: &SessionRecord) -> anyhow::Result<()> {
        self.slot.save(record)
    }

    pub fn clear_session(&self) -> anyhow::Result<()> {
        self.slot.clear()
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Perform `request` against `path`, recovering from one authentication
    /// failure.
    ///
    /// Statuses other than the profile's auth failures are returned as-is.
    pub async fn fetch(&self, path: &str, request: &ApiRequest) -> Result<Response, GatewayError> {
        let mut path = path.to_owned();
        let mut attempt = 0;
        loop {
            let token = self.slot.load()?.and_then(|r| r.bearer().map(str::to_owned));
            let response = self.send(&path, request, token.as_deref(), attempt).await?;
            let status = response.status();
            if !self.profile.is_auth_failure(status) {
                return Ok(response);
            }

            if attempt >= MAX_AUTH_RETRIES {
                warn!(%path, %status, "authentication failed after retry");
                self.discard_session();
                return Err(GatewayError::RetryExhausted { hint: self.profile.reauth_hint });
            }

            let body = response.bytes().await.unwrap_or_default();
            let error = ErrorBody::parse(&body);
            debug!(%path, %status, code = %error.code(), "authentication failure");
            if let Err(e) = self.recover(&error, attempt, token.is_some()).await {
                warn!(%path, err = %e, "session recovery failed");
                self.discard_session();
                return Err(e);
            }

            attempt += 1;
            path = rewrite_session_param(&path, self.session_id()?.as_deref());
        }
    }

    async fn recover(
        &self,
        error: &ErrorBody,
        attempt: u32,
        had_token: bool,
    ) -> Result<(), GatewayError> {
        let hint = self.profile.reauth_hint;
        if self.profile.mode == RecoveryMode::RefreshOnly {
            return self.recover_by_refresh().await;
        }
        match error.code() {
            AuthErrorCode::TokenMissing => self.recover_by_init().await,
            AuthErrorCode::TokenExpired => self.recover_by_refresh().await,
            AuthErrorCode::TokenInvalid => Err(GatewayError::InvalidToken { hint }),
            AuthErrorCode::Unrecognized => {
                let unauthorized = || GatewayError::Unauthorized {
                    message: error.summary().unwrap_or("Authorization failed.").to_owned(),
                    hint,
                };
                if attempt > 0 || had_token {
                    return Err(unauthorized());
                }
                match self.recover_by_init().await {
                    Ok(()) => Ok(()),
                    Err(e @ (GatewayError::Transport { .. } | GatewayError::Store(_))) => Err(e),
                    Err(_) => Err(unauthorized()),
                }
            }
        }
    }

    async fn recover_by_init(&self) -> Result<(), GatewayError> {
        let hint = self.profile.reauth_hint;
        self.init_session().await?;
        match self.slot.load()? {
            Some(r) if r.bearer().is_some() => Ok(()),
            _ => Err(GatewayError::InitFailed { hint }),
        }
    }

    async fn recover_by_refresh(&self) -> Result<(), GatewayError> {
        let hint = self.profile.reauth_hint;
        if !self.refresh_session().await {
            return Err(GatewayError::RefreshFailed { hint });
        }
        match self.slot.load()? {
            Some(r) if r.bearer().is_some() => Ok(()),
            _ => Err(GatewayError::RefreshLost { hint }),
        }
    }

    /// Rotate the stored token pair. Concurrent callers share one call.
    pub async fn refresh_session(&self) -> bool {
        let gateway = self.clone();
        self.inflight.run(move || async move { gateway.refresh_once().await }.boxed()).await
    }

    /// Current session id: the record's, then the config's `session_id`.
    pub fn session_id(&self) -> anyhow::Result<Option<String>> {
        if let Some(id) = self.slot.load()?.and_then(|r| r.session_id) {
            return Ok(Some(id));
        }
        self.config.get_str("session_id")
    }

    fn discard_session(&self) {
        if let Err(e) = self.slot.clear() {
            warn!(err = %e, "failed to clear session");
        }
    }

    async fn send(
        &self,
        path: &str,
        request: &ApiRequest,
        token: Option<&str>,
        attempt: u32,
    ) -> Result<Response, GatewayError> {
        let url = self.profile.url(path);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| GatewayError::Store(e.into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }

        let mut builder = self.http.request(request.method.clone(), &url).headers(headers);
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        debug!(method = %request.method, %url, attempt, "sending request");
        builder.send().await.map_err(|source| self.transport(source))
    }

    fn transport(&self, source: reqwest::Error) -> GatewayError {
        GatewayError::Transport { url: self.profile.base_url.clone(), source }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
