// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommands. Each handler prints its own output and returns a
//! process exit code.

pub mod ask;
pub mod auth;
pub mod connections;
pub mod jira;
pub mod system;

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::client::account::AccountClient;
use crate::client::backend::{AuthStatus, BackendClient};
use crate::client::http_client;
use crate::client::jira::JiraClient;
use crate::config::Config;
use crate::error::transport_cause;
use crate::poll::{PollPolicy, PollStep};
use crate::store::ConfigStore;

pub use self::ask::AskArgs;
pub use self::auth::LoginArgs;
pub use self::connections::{ConnectArgs, DisconnectArgs};
pub use self::jira::{JiraCommand, JiraLoginArgs};
pub use self::system::StatusArgs;

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Log in to your Kay account in the browser.
    Login(LoginArgs),
    /// Log out and forget the stored account session.
    Logout,
    /// Show the logged-in account.
    Whoami(JsonArgs),
    /// Check the stored Jira credentials.
    Status(StatusArgs),
    /// Log in again, replacing the current account session.
    Reauth,
    /// Connect a service to the current session.
    Connect(ConnectArgs),
    /// Disconnect a service from the current session.
    Disconnect(DisconnectArgs),
    /// List service connections for the current session.
    Connections(JsonArgs),
    /// Ask Kay something.
    Ask(AskArgs),
    /// Show backend health.
    Health(JsonArgs),
    /// Diagnose configuration and connectivity problems.
    Doctor,
    /// Manage direct Jira credentials.
    #[command(subcommand)]
    Jira(JiraCommand),
}

#[derive(Debug, Clone, Copy, clap::Args)]
pub struct JsonArgs {
    /// Print machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

/// Everything a handler needs, resolved once from [`Config`].
pub struct Context {
    pub backend_url: String,
    pub state_dir: PathBuf,
    pub config: ConfigStore,
    pub http: reqwest::Client,
    pub poll: PollPolicy,
}

impl Context {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let state_dir = config.state_dir()?;
        Ok(Self {
            backend_url: config.backend_base().to_owned(),
            config: ConfigStore::new(&state_dir),
            state_dir,
            http: http_client(config.http_timeout())?,
            poll: config.poll_policy(),
        })
    }

    pub fn account(&self) -> AccountClient {
        AccountClient::new(self.http.clone(), &self.backend_url, self.config.clone())
    }

    pub fn backend(&self) -> BackendClient {
        BackendClient::new(self.http.clone(), &self.backend_url, &self.state_dir)
    }

    pub fn jira(&self) -> anyhow::Result<Option<JiraClient>> {
        JiraClient::load(self.http.clone(), &self.config)
    }

    /// Print `err` and return the failure exit code.
    ///
    /// An unreachable Kay backend gets a dedicated hint instead of the
    /// error chain.
    pub fn fail(&self, err: &anyhow::Error) -> i32 {
        match transport_cause(err) {
            Some(crate::error::GatewayError::Transport { url, .. }) if *url == self.backend_url => {
                eprintln!(
                    "error: Cannot connect to Kay backend at {url}. Make sure the backend is running."
                );
            }
            _ => eprintln!("error: {err:#}"),
        }
        1
    }
}

/// Run the parsed command. Returns a process exit code.
pub async fn run(config: &Config) -> i32 {
    let ctx = match Context::from_config(config) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("error: {e:#}");
            return 2;
        }
    };

    match config.command {
        Command::Login(ref args) => auth::login(&ctx, args).await,
        Command::Logout => auth::logout(&ctx).await,
        Command::Whoami(args) => auth::whoami(&ctx, args).await,
        Command::Status(ref args) => system::status(&ctx, args).await,
        Command::Reauth => auth::login(&ctx, &LoginArgs { force: true, json: false }).await,
        Command::Connect(ref args) => connections::connect(&ctx, args).await,
        Command::Disconnect(ref args) => connections::disconnect(&ctx, args).await,
        Command::Connections(args) => connections::list(&ctx, args).await,
        Command::Ask(ref args) => ask::run(&ctx, args).await,
        Command::Health(args) => system::health(&ctx, args).await,
        Command::Doctor => system::doctor(&ctx).await,
        Command::Jira(ref cmd) => jira::run(&ctx, cmd).await,
    }
}

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json(value: &impl serde::Serialize) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{text}");
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

/// Line-oriented stdin reader for prompts.
pub(crate) struct Prompt {
    lines: tokio::io::Lines<BufReader<tokio::io::Stdin>>,
}

impl Prompt {
    pub fn new() -> Self {
        Self { lines: BufReader::new(tokio::io::stdin()).lines() }
    }

    /// Print `question` and read one trimmed line. `None` at end of input.
    pub async fn ask(&mut self, question: &str) -> anyhow::Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(question.as_bytes()).await?;
        stdout.flush().await?;
        Ok(self.lines.next_line().await?.map(|l| l.trim().to_owned()))
    }

    /// Ask a yes/no question. Anything but `y`/`yes` is a no.
    pub async fn confirm(&mut self, question: &str) -> anyhow::Result<bool> {
        let answer = self.ask(&format!("{question} [y/N] ")).await?;
        Ok(answer.is_some_and(|a| is_yes(&a)))
    }
}

/// Map an `/auth/status` answer onto a poll step.
pub(crate) fn auth_step(status: AuthStatus) -> anyhow::Result<PollStep<AuthStatus>> {
    if status.is_completed() {
        return Ok(PollStep::Done(status));
    }
    if status.is_pending() {
        return Ok(PollStep::Pending);
    }
    let state = if status.status.is_empty() { "unknown" } else { status.status.as_str() };
    match status.message {
        Some(ref msg) => anyhow::bail!("Unexpected status: {state} - {msg}"),
        None => anyhow::bail!("Unexpected status: {state}"),
    }
}

/// `5 minutes`, `90 seconds`.
pub(crate) fn describe(budget: Duration) -> String {
    let secs = budget.as_secs();
    match (secs / 60, secs % 60) {
        (1, 0) => "1 minute".to_owned(),
        (m, 0) if m > 0 => format!("{m} minutes"),
        _ => format!("{secs} seconds"),
    }
}

pub(crate) fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
