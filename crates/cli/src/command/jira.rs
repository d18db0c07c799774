// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kay jira login`, `kay jira logout`.

use chrono::Utc;
use reqwest::Url;
use tracing::info;

use super::Context;
use crate::client::jira::{save_basic, save_oauth, JiraClient, JiraCredentials};
use crate::oauth::pkce::{exchange_code, PkceFlow};
use crate::oauth::{open_browser, CallbackListener};

/// Ports tried for the OAuth callback listener, starting at `--port`.
const CALLBACK_PORT_ATTEMPTS: u16 = 10;

#[derive(Debug, clap::Subcommand)]
pub enum JiraCommand {
    /// Store Jira credentials (API token or OAuth).
    Login(JiraLoginArgs),
    /// Forget the stored Jira credentials.
    Logout,
}

#[derive(Debug, Clone, clap::Args)]
#[command(group(clap::ArgGroup::new("basic").args(["email", "api_token"]).multiple(true)))]
pub struct JiraLoginArgs {
    /// Jira base URL, e.g. `https://jira.example.com`.
    #[arg(long)]
    pub url: String,
    /// Account email for API-token auth.
    #[arg(long, requires = "api_token")]
    pub email: Option<String>,
    /// API token for API-token auth.
    #[arg(long, env = "KAY_JIRA_API_TOKEN", hide_env_values = true, requires = "email")]
    pub api_token: Option<String>,
    /// OAuth client id; selects the browser flow.
    #[arg(long, conflicts_with = "basic")]
    pub client_id: Option<String>,
    /// First local port tried for the OAuth callback.
    #[arg(long, default_value_t = 8085)]
    pub port: u16,
}

pub async fn run(ctx: &Context, cmd: &JiraCommand) -> i32 {
    match cmd {
        JiraCommand::Login(args) => login(ctx, args).await,
        JiraCommand::Logout => match JiraCredentials::clear(&ctx.config) {
            Ok(()) => {
                println!("Jira credentials removed.");
                0
            }
            Err(e) => ctx.fail(&e),
        },
    }
}

async fn login(ctx: &Context, args: &JiraLoginArgs) -> i32 {
    let base_url = match parse_site(&args.url) {
        Ok(url) => url,
        Err(e) => return ctx.fail(&e),
    };
    let result = match (&args.client_id, &args.email, &args.api_token) {
        (Some(client_id), _, _) => login_oauth(ctx, &base_url, client_id, args.port).await,
        (None, Some(email), Some(token)) => login_basic(ctx, &base_url, email, token).await,
        _ => Err(anyhow::anyhow!("either --email with --api-token, or --client-id, is required")),
    };
    match result {
        Ok(client) => match client.myself().await {
            Ok(user) => {
                println!("Logged in to Jira at {base_url} as {} ({})", user.display_name, user.email_address);
                0
            }
            Err(e) => {
                eprintln!("warning: credentials saved but verification failed");
                ctx.fail(&e)
            }
        },
        Err(e) => ctx.fail(&e),
    }
}

/// Validate `--url` and drop any trailing slash.
fn parse_site(raw: &str) -> anyhow::Result<String> {
    let url = Url::parse(raw).map_err(|e| anyhow::anyhow!("invalid --url {raw:?}: {e}"))?;
    anyhow::ensure!(
        matches!(url.scheme(), "http" | "https"),
        "invalid --url {raw:?}: must be http or https"
    );
    Ok(raw.trim_end_matches('/').to_owned())
}

async fn login_basic(
    ctx: &Context,
    base_url: &str,
    email: &str,
    api_token: &str,
) -> anyhow::Result<JiraClient> {
    save_basic(&ctx.config, base_url, email, api_token)?;
    loaded(ctx)
}

async fn login_oauth(
    ctx: &Context,
    base_url: &str,
    client_id: &str,
    port: u16,
) -> anyhow::Result<JiraClient> {
    let flow = PkceFlow::new();
    let listener = CallbackListener::bind(port, CALLBACK_PORT_ATTEMPTS).await?;
    let redirect_uri = listener.redirect_uri();
    let url = flow.authorize_url(base_url, client_id, &redirect_uri)?;
    info!(port = listener.port(), "waiting for jira authorization");

    eprintln!("Open this URL to authorize Kay with Jira:");
    eprintln!("  {url}");
    if !open_browser(&url) {
        eprintln!("(could not open a browser; copy the URL above)");
    }

    let params = listener.wait(ctx.poll.budget()).await?;
    let code = params.into_code(&flow.state)?;
    let grant = exchange_code(&ctx.http, base_url, client_id, &code, &flow.verifier, &redirect_uri).await?;
    save_oauth(&ctx.config, base_url, client_id, &grant, Utc::now())?;
    loaded(ctx)
}

fn loaded(ctx: &Context) -> anyhow::Result<JiraClient> {
    ctx.jira()?.ok_or_else(|| anyhow::anyhow!("stored Jira credentials are not usable"))
}
