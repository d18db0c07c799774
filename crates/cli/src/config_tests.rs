// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serial_test::serial;

use super::Config;
use crate::client::backend::Service;
use crate::command::{Command, JiraCommand};

fn parse(args: &[&str]) -> anyhow::Result<Config> {
    Ok(Config::try_parse_from(args)?)
}

#[test]
fn defaults() -> anyhow::Result<()> {
    let config = parse(&["kay", "health"])?;
    config.validate()?;
    assert_eq!(config.backend_base(), "http://localhost:4000");
    assert_eq!(config.log_level, "warn");
    assert_eq!(config.log_format, "text");
    assert!(matches!(config.command, Command::Health(ref a) if !a.json));
    Ok(())
}

#[test]
fn global_flags_after_subcommand() -> anyhow::Result<()> {
    let config = parse(&[
        "kay",
        "connections",
        "--json",
        "--backend-url",
        "https://kay.example.com/",
        "--config-dir",
        "/tmp/kay-test",
    ])?;
    config.validate()?;
    assert_eq!(config.backend_base(), "https://kay.example.com");
    assert_eq!(config.state_dir()?, PathBuf::from("/tmp/kay-test"));
    assert!(matches!(config.command, Command::Connections(ref a) if a.json));
    Ok(())
}

#[test]
fn connect_service_flag() -> anyhow::Result<()> {
    let config = parse(&["kay", "connect", "-s", "confluence"])?;
    let Command::Connect(args) = config.command else {
        anyhow::bail!("expected connect");
    };
    assert_eq!(args.service, Service::Confluence);
    Ok(())
}

#[test]
fn unknown_service_is_a_usage_error() {
    assert!(parse(&["kay", "connect", "-s", "gitlab"]).is_err());
    assert!(parse(&["kay", "connect"]).is_err());
}

#[test]
fn jira_login_modes() -> anyhow::Result<()> {
    let config = parse(&[
        "kay", "jira", "login", "--url", "https://j.example", "--email", "a@b.c", "--api-token", "t",
    ])?;
    let Command::Jira(JiraCommand::Login(args)) = config.command else {
        anyhow::bail!("expected jira login");
    };
    assert_eq!(args.email.as_deref(), Some("a@b.c"));
    assert_eq!(args.client_id, None);

    // Basic and OAuth flags are exclusive.
    assert!(parse(&[
        "kay", "jira", "login", "--url", "https://j", "--email", "e", "--api-token", "t", "--client-id", "c",
    ])
    .is_err());
    Ok(())
}

#[yare::parameterized(
    not_a_url   = { "not a url", "invalid --backend-url" },
    ftp_scheme  = { "ftp://kay.example.com", "http or https" },
)]
fn invalid_backend_url(url: &str, expected_substr: &str) {
    let config = Config { backend_url: url.into(), ..Config::test(PathBuf::from("/tmp")) };
    crate::assert_err_contains!(config.validate(), expected_substr);
}

#[test]
fn invalid_log_format() {
    let config = Config { log_format: "xml".into(), ..Config::test(PathBuf::from("/tmp")) };
    crate::assert_err_contains!(config.validate(), "log format");
}

#[test]
fn test_config_overrides() {
    let config = Config::test(PathBuf::from("/tmp"));
    assert_eq!(config.http_timeout(), Duration::from_millis(5_000));
    assert_eq!(config.poll_policy().interval, Duration::from_millis(10));
    assert_eq!(config.poll_policy().max_attempts, 5);
}

#[test]
#[serial]
fn knobs_fall_back_to_env_then_default() -> anyhow::Result<()> {
    let mut config = parse(&["kay", "health"])?;
    config.poll_attempts = None;

    std::env::remove_var("KAY_POLL_INTERVAL_MS");
    std::env::remove_var("KAY_POLL_ATTEMPTS");
    assert_eq!(config.poll_interval(), Duration::from_secs(2));
    assert_eq!(config.poll_attempts(), 150);

    std::env::set_var("KAY_POLL_INTERVAL_MS", "25");
    std::env::set_var("KAY_POLL_ATTEMPTS", "3");
    assert_eq!(config.poll_interval(), Duration::from_millis(25));
    assert_eq!(config.poll_attempts(), 3);

    std::env::remove_var("KAY_POLL_INTERVAL_MS");
    std::env::remove_var("KAY_POLL_ATTEMPTS");
    Ok(())
}

#[test]
#[serial]
fn default_state_dir_under_home() -> anyhow::Result<()> {
    let config = parse(&["kay", "doctor"])?;
    if let Some(home) = std::env::var_os("HOME") {
        assert_eq!(config.state_dir()?, PathBuf::from(home).join(".kay"));
    }
    Ok(())
}
