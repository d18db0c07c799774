// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kay health`, `kay status`, `kay doctor`.

use std::time::Duration;

use chrono::Utc;
use reqwest::Url;
use serde_json::json;

use super::{print_json, Context, JsonArgs};
use crate::client::jira::JiraClient;

/// Timeout of the Jira reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, clap::Args)]
pub struct StatusArgs {
    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
    /// Show connection details.
    #[arg(short, long)]
    pub verbose: bool,
}

pub async fn health(ctx: &Context, args: JsonArgs) -> i32 {
    let report = match ctx.account().health().await {
        Ok(report) => report,
        Err(e) => return ctx.fail(&e),
    };
    if args.json {
        return print_json(&report);
    }

    println!("Kay Backend Health Status");
    if let Some(ref at) = report.timestamp {
        println!("Last checked: {at}");
    }
    println!();
    println!("Overall Status: {}", report.status.to_uppercase());
    println!();
    println!("Services:");
    for (name, service) in &report.services {
        let mut line = format!("  {name:<12} {}", service.status);
        match service.configured.or(service.enabled) {
            Some(true) => line.push_str(" (configured)"),
            Some(false) => line.push_str(" (not configured)"),
            None => {}
        }
        println!("{line}");
        if let Some(ref msg) = service.message {
            println!("    {msg}");
        }
    }
    0
}

pub async fn status(ctx: &Context, args: &StatusArgs) -> i32 {
    let client = match ctx.jira() {
        Ok(Some(client)) => client,
        Ok(None) => {
            if args.json {
                print_json(&json!({ "authenticated": false, "valid": false, "message": "Not authenticated" }));
            } else {
                eprintln!("error: Not authenticated. Run 'kay login' first.");
            }
            return 1;
        }
        Err(e) => return ctx.fail(&e),
    };

    match client.myself().await {
        Ok(user) if args.json => {
            print_json(&json!({
                "authenticated": true,
                "valid": true,
                "email": user.email_address,
                "accountId": user.account_id,
                "displayName": user.display_name,
                "baseUrl": client.base_url(),
            }));
            0
        }
        Ok(user) => {
            println!("Authentication status: Valid");
            if args.verbose {
                println!();
                println!("Connection details:");
                println!("  User:       {}", user.display_name);
                println!("  Email:      {}", user.email_address);
                println!("  Account ID: {}", user.account_id);
                println!("  Base URL:   {}", client.base_url());
            }
            0
        }
        Err(e) if args.json => {
            print_json(&json!({ "authenticated": true, "valid": false, "error": format!("{e:#}") }));
            1
        }
        Err(e) => {
            eprintln!("error: Authentication status: Invalid");
            eprintln!("error: {e:#}");
            if !args.verbose {
                eprintln!("Run 'kay status --verbose' for more details");
            }
            1
        }
    }
}

/// One line of the doctor report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Check {
    pub name: &'static str,
    pub pass: bool,
    pub message: String,
    pub detail: Option<String>,
}

impl Check {
    fn pass(name: &'static str, message: impl Into<String>) -> Self {
        Self { name, pass: true, message: message.into(), detail: None }
    }

    fn fail(name: &'static str, message: impl Into<String>) -> Self {
        Self { name, pass: false, message: message.into(), detail: None }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Default)]
pub(crate) struct Diagnosis {
    pub checks: Vec<Check>,
    /// `(issue, suggested fix)`
    pub issues: Vec<(String, String)>,
}

impl Diagnosis {
    fn issue(&mut self, issue: impl Into<String>, fix: impl Into<String>) {
        self.issues.push((issue.into(), fix.into()));
    }
}

pub(crate) async fn diagnose(ctx: &Context) -> Diagnosis {
    let mut report = Diagnosis::default();
    let config_path = ctx.config.path().display().to_string();

    const CONFIG: &str = "Configuration file access";
    match ctx.config.load() {
        Ok(_) => report.checks.push(Check::pass(CONFIG, format!("Can read {config_path}"))),
        Err(e) => {
            report.issue(
                "Cannot read configuration file",
                format!("Check file permissions for {config_path} or run 'kay login' to create it"),
            );
            report.checks.push(Check::fail(CONFIG, format!("Cannot read {config_path}")).with_detail(format!("{e:#}")));
        }
    }

    const AUTH: &str = "Authentication status";
    const URL: &str = "Base URL format";
    const TOKEN: &str = "Token validity";
    const NETWORK: &str = "Network connectivity";
    let client = match ctx.jira() {
        Ok(Some(client)) => {
            let message = if client.credentials().is_expired_at(Utc::now()) {
                "Authenticated (OAuth token expired, refreshed on next request)"
            } else {
                "Authenticated"
            };
            report.checks.push(Check::pass(AUTH, message));
            client
        }
        Ok(None) | Err(_) => {
            report.issue("Not authenticated", "Run 'kay jira login' to authenticate");
            report.checks.push(Check::fail(AUTH, "Not authenticated"));
            for name in [URL, TOKEN, NETWORK] {
                report.checks.push(Check::fail(name, "Skipped (not authenticated)"));
            }
            return report;
        }
    };

    let base_url = client.base_url().to_owned();
    match Url::parse(&base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            report.checks.push(Check::pass(URL, format!("Valid URL: {base_url}")));
        }
        Ok(_) => {
            report.issue("Invalid URL protocol", "Base URL must start with http:// or https://");
            report.checks.push(Check::fail(URL, "Invalid URL protocol"));
        }
        Err(e) => {
            report.issue("Invalid URL format", format!("Fix base URL format in {config_path}: {base_url}"));
            report.checks.push(Check::fail(URL, "Invalid URL format").with_detail(e.to_string()));
        }
    }

    check_token(&client, &mut report).await;

    match client.server_info(PROBE_TIMEOUT).await {
        Ok(_) => report.checks.push(Check::pass(NETWORK, "Can reach Jira server")),
        Err(e) => {
            report.issue(
                "Cannot reach Jira server",
                format!("Check network connectivity and verify base URL: {base_url}"),
            );
            report.checks.push(Check::fail(NETWORK, "Cannot reach server").with_detail(format!("{e:#}")));
        }
    }
    report
}

async fn check_token(client: &JiraClient, report: &mut Diagnosis) {
    const TOKEN: &str = "Token validity";
    match client.myself().await {
        Ok(user) => report
            .checks
            .push(Check::pass(TOKEN, format!("Token valid (authenticated as {})", user.display_name))),
        Err(e) => {
            report.issue("Invalid or expired token", "Run 'kay jira login' to refresh credentials");
            report.checks.push(Check::fail(TOKEN, "Token invalid or expired").with_detail(format!("{e:#}")));
        }
    }
}

/// Exits 1 when any check found an issue.
pub async fn doctor(ctx: &Context) -> i32 {
    println!("Running diagnostic checks...");
    println!();
    let report = diagnose(ctx).await;
    for check in &report.checks {
        let mark = if check.pass { "ok" } else { "FAIL" };
        println!("{}: [{mark}] {}", check.name, check.message);
        if let Some(ref detail) = check.detail {
            println!("  {detail}");
        }
    }
    println!();

    if report.issues.is_empty() {
        println!("All checks passed! Your authentication is working correctly.");
        return 0;
    }
    println!("Found {} issue(s):", report.issues.len());
    for (issue, _) in &report.issues {
        println!("  - {issue}");
    }
    println!();
    println!("Suggested fixes:");
    for (i, (_, fix)) in report.issues.iter().enumerate() {
        println!("  {}. {fix}", i + 1);
    }
    1
}

#[cfg(test)]
#[path = "system_tests.rs"]
mod tests;
