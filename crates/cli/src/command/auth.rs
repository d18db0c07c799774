// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kay login`, `kay logout`, `kay whoami`.

use serde_json::json;

use super::{auth_step, describe, print_json, Context, JsonArgs};
use crate::client::account::{AccountClient, LogoutOutcome, MeResponse};
use crate::oauth::open_browser;
use crate::poll::{bounded_poll, PollTimeout};

#[derive(Debug, Clone, clap::Args)]
pub struct LoginArgs {
    /// Log in again even when a session exists.
    #[arg(long)]
    pub force: bool,
    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

pub async fn login(ctx: &Context, args: &LoginArgs) -> i32 {
    let account = ctx.account();
    if !args.force && !args.json {
        if let Some(me) = current_user(&account).await {
            println!("You are already logged in as {} ({}).", me.data.name, me.data.email);
            println!("Run 'kay reauth' to log in with different credentials.");
            return 0;
        }
    }

    match browser_login(ctx, &account, args.json).await {
        Ok(me) if args.json => print_json(&json!({
            "success": true,
            "email": me.data.email,
            "accountId": me.data.account_id,
            "displayName": me.data.name,
            "resources": me.data.resources,
        })),
        Ok(me) => {
            println!("Successfully authenticated as {}", me.data.name);
            println!("Email: {}", me.data.email);
            println!("Account ID: {}", me.data.account_id);
            if !me.data.resources.is_empty() {
                println!("Resources: {} site(s) accessible", me.data.resources.len());
            }
            0
        }
        Err(e) => ctx.fail(&e),
    }
}

/// The logged-in user, if the stored session still works.
async fn current_user(account: &AccountClient) -> Option<MeResponse> {
    if !account.is_logged_in().ok()? {
        return None;
    }
    account.me().await.ok()
}

async fn browser_login(
    ctx: &Context,
    account: &AccountClient,
    quiet: bool,
) -> anyhow::Result<MeResponse> {
    let init = account.begin_login().await?;
    if !quiet {
        eprintln!("Please authorize in your browser.");
        eprintln!("If the browser doesn't open, visit:");
        eprintln!("{}", init.authorization_url);
        eprintln!();
    }
    open_browser(&init.authorization_url);

    let state = init.state.as_str();
    let completed = bounded_poll(ctx.poll, move |_| async move {
        auth_step(account.login_status(state).await?)
    })
    .await;
    let completed = match completed {
        Ok(status) => status,
        Err(e) if e.is::<PollTimeout>() => anyhow::bail!(
            "Authentication timeout ({}). Please try again or check if you completed the login flow.",
            describe(ctx.poll.budget())
        ),
        Err(e) => return Err(e),
    };

    account.save_login(completed.grant)?;
    account.me().await
}

pub async fn logout(ctx: &Context) -> i32 {
    match ctx.account().logout().await {
        Ok(None) => {
            eprintln!("Not authenticated. Nothing to logout.");
            0
        }
        Ok(Some(outcome)) => {
            match outcome {
                LogoutOutcome::AlreadyExpired => {
                    eprintln!("warning: Session already expired or invalid.");
                }
                LogoutOutcome::Unreachable => {
                    eprintln!("warning: Cannot reach backend, but clearing local credentials anyway.");
                }
                LogoutOutcome::LoggedOut => {}
            }
            println!("Successfully logged out");
            0
        }
        Err(e) => ctx.fail(&e),
    }
}

pub async fn whoami(ctx: &Context, args: JsonArgs) -> i32 {
    let account = ctx.account();
    match account.is_logged_in() {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("error: Not authenticated. Run 'kay login' first.");
            return 1;
        }
        Err(e) => return ctx.fail(&e),
    }

    let me = match account.me().await {
        Ok(me) => me,
        Err(e) => return ctx.fail(&e),
    };
    if args.json {
        return print_json(&me);
    }

    let user = &me.data;
    println!("Currently authenticated as:");
    println!("  Name:         {}", user.name);
    println!("  Email:        {}", user.email);
    println!("  Account Type: {}", user.account_type);
    println!("  Status:       {}", user.account_status);
    if !user.resources.is_empty() {
        println!();
        println!("Accessible Jira sites:");
        for (i, resource) in user.resources.iter().enumerate() {
            println!("  {}. {}", i + 1, resource.name);
            println!("     URL: {}", resource.url);
        }
    }
    0
}
