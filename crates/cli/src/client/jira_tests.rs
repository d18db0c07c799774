// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use reqwest::Method;
use serde_json::json;

use super::*;
use crate::client::http_client;
use crate::test_support::{dead_url, MockBackend};

fn http() -> reqwest::Client {
    http_client(Duration::from_secs(5)).unwrap_or_else(|e| panic!("{e:#}"))
}

fn oauth_creds(base: &str, expires_at: Option<i64>) -> JiraCredentials {
    JiraCredentials {
        access_token: Some("at1".into()),
        refresh_token: Some("rt1".into()),
        client_id: Some("cid".into()),
        base_url: base.to_owned(),
        expires_at,
        auth_type: JiraAuthType::Oauth,
        ..JiraCredentials::default()
    }
}

fn load_client(dir: &Path) -> anyhow::Result<JiraClient> {
    JiraClient::load(http(), &ConfigStore::new(dir))?.context("expected jira credentials")
}

#[test]
fn entry_uses_camel_case_keys() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = ConfigStore::new(dir.path());
    save_basic(&config, "https://jira.example.com/", "ada@example.com", "tok")?;

    let raw = config.get(JIRA_KEY)?.context("missing entry")?;
    assert_eq!(
        raw,
        json!({
            "email": "ada@example.com",
            "apiToken": "tok",
            "baseUrl": "https://jira.example.com",
            "authType": "basic"
        })
    );
    let creds = JiraCredentials::load(&config)?.context("missing creds")?;
    assert_eq!(creds.basic(), Some(("ada@example.com", "tok")));
    Ok(())
}

#[yare::parameterized(
    no_base_url   = { json!({ "accessToken": "a", "authType": "oauth" }) },
    no_secret     = { json!({ "baseUrl": "https://j", "email": "e", "authType": "basic" }) },
    not_an_object = { json!("oops") },
)]
fn unusable_entries_read_as_absent(entry: serde_json::Value) {
    let check = || -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = ConfigStore::new(dir.path());
        config.set(JIRA_KEY, entry.clone())?;
        assert_eq!(JiraCredentials::load(&config)?, None);
        Ok(())
    };
    if let Err(e) = check() {
        panic!("{e:#}");
    }
}

#[test]
fn oauth_expiry_is_stored_in_millis() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = ConfigStore::new(dir.path());
    let now = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")?.with_timezone(&Utc);
    let grant = TokenGrant {
        access_token: Some("at".into()),
        refresh_token: Some("rt".into()),
        expires_in: Some(60),
        ..TokenGrant::default()
    };

    let creds = save_oauth(&config, "https://jira.example.com", "cid", &grant, now)?;
    assert_eq!(creds.expires_at, Some(now.timestamp_millis() + 60_000));
    assert!(!creds.is_expired_at(now));
    assert!(creds.is_expired_at(now + chrono::Duration::seconds(61)));

    let record = JiraSlot::new(config).load()?.context("expected record")?;
    assert_eq!(record.access_token, "at");
    assert_eq!(record.refresh_token, "rt");
    assert_eq!(record.expires_at, "2026-01-01T00:01:00Z");
    Ok(())
}

#[test]
fn slot_ignores_basic_credentials() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = ConfigStore::new(dir.path());
    save_basic(&config, "https://jira.example.com", "e", "t")?;
    assert_eq!(JiraSlot::new(config).load()?, None);
    Ok(())
}

#[tokio::test]
async fn basic_auth_myself() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = MockBackend::new().route(
        Method::GET,
        "/rest/api/3/myself",
        vec![(200, json!({ "accountId": "u1", "displayName": "Ada", "emailAddress": "ada@example.com" }))],
    );
    let base = backend.spawn().await?;
    save_basic(&ConfigStore::new(dir.path()), &base, "ada@example.com", "tok")?;

    let user = load_client(dir.path())?.myself().await?;
    assert_eq!(user.display_name, "Ada");
    // base64("ada@example.com:tok")
    assert_eq!(
        backend.seen(Method::GET, "/rest/api/3/myself")[0].authorization.as_deref(),
        Some("Basic YWRhQGV4YW1wbGUuY29tOnRvaw==")
    );
    Ok(())
}

#[tokio::test]
async fn basic_auth_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = MockBackend::new().route(Method::GET, "/rest/api/3/myself", vec![(401, json!({}))]);
    let base = backend.spawn().await?;
    save_basic(&ConfigStore::new(dir.path()), &base, "e", "t")?;

    let result = load_client(dir.path())?.myself().await;
    crate::assert_err_contains!(result, "Invalid or expired credentials");
    assert_eq!(backend.calls(Method::GET, "/rest/api/3/myself"), 1);
    Ok(())
}

#[tokio::test]
async fn oauth_refreshes_with_form_grant() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = MockBackend::new()
        .guarded(
            Method::GET,
            "/rest/api/3/myself",
            "at2",
            (200, json!({ "accountId": "u1", "displayName": "Ada" })),
            (401, json!({})),
        )
        .route(
            Method::POST,
            "/rest/oauth2/latest/token",
            vec![(200, json!({ "access_token": "at2", "refresh_token": "rt2", "expires_in": 3600 }))],
        );
    let base = backend.spawn().await?;
    let config = ConfigStore::new(dir.path());
    oauth_creds(&base, Some(0)).save(&config)?;

    let user = load_client(dir.path())?.myself().await?;
    assert_eq!(user.account_id, "u1");

    let refresh = &backend.seen(Method::POST, "/rest/oauth2/latest/token")[0];
    assert_eq!(refresh.content_type.as_deref(), Some("application/x-www-form-urlencoded"));
    assert!(refresh.body.contains("grant_type=refresh_token"));
    assert!(refresh.body.contains("client_id=cid"));
    assert!(refresh.body.contains("refresh_token=rt1"));

    let creds = JiraCredentials::load(&config)?.context("creds kept")?;
    assert_eq!(creds.access_token.as_deref(), Some("at2"));
    assert_eq!(creds.refresh_token.as_deref(), Some("rt2"));
    assert_eq!(creds.client_id.as_deref(), Some("cid"));
    assert!(creds.expires_at.is_some_and(|ms| ms > 0));
    Ok(())
}

#[tokio::test]
async fn oauth_refresh_failure_clears_entry() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = MockBackend::new()
        .route(Method::GET, "/rest/api/3/myself", vec![(401, json!({}))])
        .route(Method::POST, "/rest/oauth2/latest/token", vec![(400, json!({ "error": "invalid_grant" }))]);
    let base = backend.spawn().await?;
    let config = ConfigStore::new(dir.path());
    oauth_creds(&base, None).save(&config)?;

    let result = load_client(dir.path())?.myself().await;
    crate::assert_err_contains!(result, "kay jira login");
    assert_eq!(config.get(JIRA_KEY)?, None);
    Ok(())
}

#[tokio::test]
async fn server_info_probe() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = MockBackend::new().route(
        Method::GET,
        "/rest/api/3/serverInfo",
        vec![(200, json!({ "version": "9.12.0" }))],
    );
    let base = backend.spawn().await?;
    save_basic(&ConfigStore::new(dir.path()), &base, "e", "t")?;

    let info = load_client(dir.path())?.server_info(Duration::from_secs(5)).await?;
    assert_eq!(info["version"], "9.12.0");
    assert_eq!(backend.seen(Method::GET, "/rest/api/3/serverInfo")[0].authorization, None);
    Ok(())
}

#[tokio::test]
async fn server_info_unreachable() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    save_basic(&ConfigStore::new(dir.path()), &dead_url()?, "e", "t")?;
    let err = match load_client(dir.path())?.server_info(Duration::from_secs(5)).await {
        Ok(_) => anyhow::bail!("expected an error"),
        Err(e) => e,
    };
    assert!(crate::error::transport_cause(&err).is_some());
    Ok(())
}
