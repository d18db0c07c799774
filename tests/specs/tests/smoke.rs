// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that run the real `kay` binary against a
//! scripted backend.

use axum::http::Method;
use serde_json::json;

use kay::test_support::{dead_url, MockBackend};
use kay_specs::Kay;

fn me_body() -> serde_json::Value {
    json!({
        "message": "ok",
        "data": {
            "account_id": "acc-1",
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "account_type": "atlassian",
            "account_status": "active",
            "resources": [{"id": "r1", "name": "Example", "url": "https://example.atlassian.net"}],
        },
    })
}

fn flat_session(token: &str) -> serde_json::Value {
    json!({
        "token": token,
        "refresh_token": "r1",
        "expires_at": "2099-01-01T00:00:00Z",
        "session_id": "s1",
    })
}

// -- Account -------------------------------------------------------------------

#[tokio::test]
async fn health_json_without_login() -> anyhow::Result<()> {
    let backend = MockBackend::new().route(
        Method::GET,
        "/health",
        vec![(200, json!({"status": "ok", "timestamp": "2026-01-01T00:00:00Z", "services": {"jira": {"status": "ok", "configured": true}}}))],
    );
    let kay = Kay::new(&backend.spawn().await?)?;

    let out = kay.run(&["health", "--json"]).await?;
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    assert_eq!(out.json()?["status"], "ok");
    assert_eq!(backend.seen(Method::GET, "/health")[0].authorization, None);
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_is_explained() -> anyhow::Result<()> {
    let url = dead_url()?;
    let kay = Kay::new(&url)?;

    let out = kay.run(&["health"]).await?;
    assert_eq!(out.code, 1);
    assert!(
        out.stderr.contains(&format!("Cannot connect to Kay backend at {url}")),
        "stderr: {}",
        out.stderr
    );
    Ok(())
}

#[tokio::test]
async fn invalid_backend_url_is_a_usage_error() -> anyhow::Result<()> {
    let kay = Kay::new("ftp://kay.example.com")?;
    let out = kay.run(&["health"]).await?;
    assert_eq!(out.code, 2);
    Ok(())
}

#[tokio::test]
async fn login_polls_until_completed() -> anyhow::Result<()> {
    let backend = MockBackend::new()
        .route(
            Method::GET,
            "/auth/login",
            vec![(200, json!({"authorization_url": "https://auth.example/authorize", "state": "st1"}))],
        )
        .route(
            Method::GET,
            "/auth/status/st1",
            vec![
                (200, json!({"status": "pending"})),
                (200, json!({"status": "completed", "token": "t-new", "refresh_token": "r-new", "expires_in": 3600})),
            ],
        )
        .guarded(Method::GET, "/auth/me", "t-new", (200, me_body()), (401, json!({"code": "TOKEN_INVALID"})));
    let kay = Kay::new(&backend.spawn().await?)?;

    let out = kay.run(&["login", "--json"]).await?;
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    let result = out.json()?;
    assert_eq!(result["success"], true);
    assert_eq!(result["email"], "ada@example.com");
    assert_eq!(backend.calls(Method::GET, "/auth/status/st1"), 2);

    let config = kay.read("config.json")?.unwrap_or_default();
    assert_eq!(config["token"], "t-new");
    assert_eq!(config["refresh_token"], "r-new");
    Ok(())
}

#[tokio::test]
async fn login_times_out() -> anyhow::Result<()> {
    let backend = MockBackend::new()
        .route(Method::GET, "/auth/login", vec![(200, json!({"authorization_url": "https://a", "state": "st"}))])
        .route(Method::GET, "/auth/status/st", vec![(200, json!({"status": "pending"}))]);
    let kay = Kay::new(&backend.spawn().await?)?;

    let out = kay.run(&["login"]).await?;
    assert_eq!(out.code, 1);
    assert!(out.stderr.contains("Authentication timeout"), "stderr: {}", out.stderr);
    assert_eq!(backend.calls(Method::GET, "/auth/status/st"), 5);
    assert_eq!(kay.read("config.json")?, None);
    Ok(())
}

#[tokio::test]
async fn whoami_refreshes_expired_token() -> anyhow::Result<()> {
    let backend = MockBackend::new()
        .guarded(Method::GET, "/auth/me", "t2", (200, me_body()), (401, json!({"code": "TOKEN_EXPIRED"})))
        .route(
            Method::POST,
            "/auth/refresh",
            vec![(200, json!({"token": "t2", "refresh_token": "r2", "expires_in": 3600}))],
        );
    let kay = Kay::new(&backend.spawn().await?)?;
    kay.seed("config.json", &flat_session("t1"))?;

    let out = kay.run(&["whoami", "--json"]).await?;
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    assert_eq!(out.json()?["data"]["name"], "Ada Lovelace");
    assert_eq!(backend.calls(Method::GET, "/auth/me"), 2);
    assert_eq!(backend.calls(Method::POST, "/auth/refresh"), 1);

    let config = kay.read("config.json")?.unwrap_or_default();
    assert_eq!(config["token"], "t2");
    Ok(())
}

#[tokio::test]
async fn whoami_requires_login() -> anyhow::Result<()> {
    let backend = MockBackend::new();
    let kay = Kay::new(&backend.spawn().await?)?;

    let out = kay.run(&["whoami"]).await?;
    assert_eq!(out.code, 1);
    assert!(out.stderr.contains("Run 'kay login' first"), "stderr: {}", out.stderr);
    assert_eq!(backend.calls(Method::GET, "/auth/me"), 0);
    Ok(())
}

#[tokio::test]
async fn logout_with_expired_session_still_clears() -> anyhow::Result<()> {
    let backend = MockBackend::new().route(
        Method::POST,
        "/auth/logout",
        vec![(401, json!({"code": "TOKEN_EXPIRED"}))],
    );
    let kay = Kay::new(&backend.spawn().await?)?;
    kay.seed("config.json", &flat_session("t1"))?;

    let out = kay.run(&["logout"]).await?;
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    assert!(out.stderr.contains("Session already expired"));
    assert!(out.stdout.contains("Successfully logged out"));

    let config = kay.read("config.json")?.unwrap_or_default();
    assert!(config.get("token").is_none());
    assert_eq!(config["session_id"], "s1");
    Ok(())
}

// -- Connections ---------------------------------------------------------------

#[tokio::test]
async fn connections_without_session_lists_nothing_connected() -> anyhow::Result<()> {
    let backend = MockBackend::new();
    let kay = Kay::new(&backend.spawn().await?)?;

    let out = kay.run(&["connections", "--json"]).await?;
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    let rows = out.json()?;
    let rows = rows.as_array().cloned().unwrap_or_default();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r["connected"] == false));
    assert!(out.stderr.contains("No active session found"));
    Ok(())
}

#[tokio::test]
async fn connections_bootstraps_missing_token() -> anyhow::Result<()> {
    let backend = MockBackend::new()
        .guarded(
            Method::GET,
            "/connections",
            "sess-tok",
            (200, json!({"connections": {"jira": {"connected": true, "user": {"name": "Ada", "email": "ada@example.com"}}}})),
            (401, json!({"code": "TOKEN_MISSING"})),
        )
        .route(
            Method::POST,
            "/session/init",
            vec![(200, json!({"session_token": "sess-tok", "refresh_token": "sr", "session_id": "s9", "expires_in": 3600}))],
        );
    let kay = Kay::new(&backend.spawn().await?)?;
    kay.seed("config.json", &json!({"session_id": "s1"}))?;

    let out = kay.run(&["connections"]).await?;
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("Ada (ada@example.com)"), "stdout: {}", out.stdout);
    assert_eq!(backend.calls(Method::POST, "/session/init"), 1);
    assert_eq!(backend.calls(Method::GET, "/connections"), 2);

    let session = kay.read("session.json")?.unwrap_or_default();
    assert_eq!(session["access_token"], "sess-tok");
    Ok(())
}

#[tokio::test]
async fn disconnect_not_connected_is_a_warning() -> anyhow::Result<()> {
    let backend = MockBackend::new().route(
        Method::GET,
        "/connections",
        vec![(200, json!({"connections": {"jira": {"connected": false}}}))],
    );
    let kay = Kay::new(&backend.spawn().await?)?;
    kay.seed(
        "session.json",
        &json!({"access_token": "a", "refresh_token": "r", "expires_at": "2099-01-01T00:00:00Z", "session_id": "s1"}),
    )?;

    let out = kay.run(&["disconnect", "-s", "jira", "--yes"]).await?;
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    assert!(out.stderr.contains("not connected"), "stderr: {}", out.stderr);
    assert_eq!(backend.calls(Method::POST, "/connections/disconnect"), 0);
    Ok(())
}

// -- Jira ----------------------------------------------------------------------

#[tokio::test]
async fn jira_basic_login_status_and_logout() -> anyhow::Result<()> {
    let jira = MockBackend::new().route(
        Method::GET,
        "/rest/api/3/myself",
        vec![(200, json!({"accountId": "a1", "displayName": "Ada", "emailAddress": "ada@example.com"}))],
    );
    let site = jira.spawn().await?;
    let kay = Kay::new(&dead_url()?)?;

    let out = kay
        .run(&["jira", "login", "--url", &site, "--email", "ada@example.com", "--api-token", "tok"])
        .await?;
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    let auth = jira.seen(Method::GET, "/rest/api/3/myself")[0].authorization.clone();
    assert!(auth.is_some_and(|a| a.starts_with("Basic ")));

    let out = kay.run(&["status", "--json"]).await?;
    assert_eq!(out.code, 0, "stderr: {}", out.stderr);
    let status = out.json()?;
    assert_eq!(status["valid"], true);
    assert_eq!(status["displayName"], "Ada");

    let out = kay.run(&["jira", "logout"]).await?;
    assert_eq!(out.code, 0);
    let out = kay.run(&["status", "--json"]).await?;
    assert_eq!(out.code, 1);
    assert_eq!(out.json()?["authenticated"], false);
    Ok(())
}
