// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kay connect`, `kay disconnect`, `kay connections`.

use serde_json::json;
use tracing::debug;

use super::{auth_step, describe, print_json, Context, JsonArgs, Prompt};
use crate::client::backend::{BackendClient, ConnectRequest, ConnectionsStatus, Service};
use crate::oauth::open_browser;
use crate::poll::{bounded_poll, PollTimeout};

#[derive(Debug, Clone, clap::Args)]
pub struct ConnectArgs {
    /// Service to connect.
    #[arg(short, long, value_enum)]
    pub service: Service,
    /// Account email (kyg only; prompted when omitted).
    #[arg(long)]
    pub email: Option<String>,
    /// Account password (kyg only; prompted when omitted).
    #[arg(long, env = "KAY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct DisconnectArgs {
    /// Service to disconnect.
    #[arg(short, long, value_enum)]
    pub service: Service,
    /// Skip the confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,
}

pub async fn connect(ctx: &Context, args: &ConnectArgs) -> i32 {
    let backend = ctx.backend();
    let service = args.service;
    let session_id = match backend.session_id() {
        Ok(id) => id,
        Err(e) => return ctx.fail(&e),
    };

    if let Some(ref id) = session_id {
        match backend.connections(id).await {
            Ok(status) if status.is_connected(service) => {
                eprintln!("warning: {} is already connected.", service.display_name());
                eprintln!("Run 'kay connections' to see which services are not connected.");
                return 0;
            }
            Ok(_) => {}
            Err(e) => debug!(err = %format!("{e:#}"), "connection check failed, continuing"),
        }
    }

    let result = if service.uses_credentials() {
        connect_with_credentials(ctx, &backend, args, session_id).await
    } else {
        connect_with_browser(ctx, &backend, service, session_id).await
    };
    match result {
        Ok(()) => {
            println!("{} connected successfully.", service.display_name());
            0
        }
        Err(e) => ctx.fail(&e),
    }
}

async fn connect_with_credentials(
    ctx: &Context,
    backend: &BackendClient,
    args: &ConnectArgs,
    session_id: Option<String>,
) -> anyhow::Result<()> {
    let mut prompt = Prompt::new();
    let email = match args.email {
        Some(ref email) => email.trim().to_owned(),
        None => prompt.ask("Email: ").await?.unwrap_or_default(),
    };
    anyhow::ensure!(!email.is_empty(), "Email is required");
    anyhow::ensure!(email.contains('@'), "Please enter a valid email address");
    let password = match args.password {
        Some(ref password) => password.clone(),
        None => prompt.ask("Password: ").await?.unwrap_or_default(),
    };
    anyhow::ensure!(!password.is_empty(), "Password is required");

    let request = ConnectRequest { email: Some(email), password: Some(password), session_id };
    let started = backend.connect(args.service, &request).await?;
    if started.session_reset {
        eprintln!("warning: Session was reset. New session created.");
    }
    match started.authorization() {
        None => Ok(()),
        Some((url, state)) => {
            show_authorization_url(url);
            wait_for_authorization(ctx, backend, state).await
        }
    }
}

async fn connect_with_browser(
    ctx: &Context,
    backend: &BackendClient,
    service: Service,
    session_id: Option<String>,
) -> anyhow::Result<()> {
    let first_connection = session_id.is_none();
    let request = ConnectRequest { session_id, ..ConnectRequest::default() };
    let started = backend.connect(service, &request).await?;
    if started.session_reset {
        eprintln!("warning: Session was reset. New session created.");
    }
    let (url, state) = started
        .authorization()
        .ok_or_else(|| anyhow::anyhow!("Invalid response from backend: missing authorization URL or state"))?;

    show_authorization_url(url);
    if first_connection || started.session_reset {
        wait_for_authorization(ctx, backend, state).await?;
    }
    Ok(())
}

fn show_authorization_url(url: &str) {
    eprintln!("Please authorize in your browser.");
    eprintln!("If the browser doesn't open, visit:");
    eprintln!("{url}");
    eprintln!();
    open_browser(url);
}

async fn wait_for_authorization(
    ctx: &Context,
    backend: &BackendClient,
    state: &str,
) -> anyhow::Result<()> {
    eprintln!("Waiting for authorization...");
    let result = bounded_poll(ctx.poll, move |_| async move {
        auth_step(backend.auth_status(state).await?)
    })
    .await;
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is::<PollTimeout>() => anyhow::bail!(
            "Connection timeout ({}). Please try again or check if you completed the authorization flow.",
            describe(ctx.poll.budget())
        ),
        Err(e) => Err(e),
    }
}

pub async fn disconnect(ctx: &Context, args: &DisconnectArgs) -> i32 {
    let backend = ctx.backend();
    let name = args.service.display_name();
    let session_id = match backend.session_id() {
        Ok(Some(id)) => id,
        Ok(None) => {
            eprintln!("warning: No session found. Please connect a service first.");
            return 0;
        }
        Err(e) => return ctx.fail(&e),
    };

    match backend.connections(&session_id).await {
        Ok(status) if !status.is_connected(args.service) => {
            eprintln!("warning: {name} is not connected.");
            eprintln!("Run 'kay connections' to see which services are connected.");
            return 0;
        }
        Ok(_) => {}
        Err(e) => debug!(err = %format!("{e:#}"), "connection check failed, continuing"),
    }

    if !args.yes {
        let question = format!("Are you sure you want to disconnect {name}?");
        match Prompt::new().confirm(&question).await {
            Ok(true) => {}
            Ok(false) => {
                println!("Disconnect cancelled.");
                return 0;
            }
            Err(e) => return ctx.fail(&e),
        }
    }

    match backend.disconnect(args.service, &session_id).await {
        Ok(resp) => {
            let message = resp.message.filter(|m| !m.is_empty());
            println!("{}", message.unwrap_or_else(|| format!("{name} disconnected successfully.")));
            0
        }
        Err(e) => ctx.fail(&e),
    }
}

pub async fn list(ctx: &Context, args: JsonArgs) -> i32 {
    let backend = ctx.backend();
    let status = match backend.session_id() {
        Ok(Some(id)) => match backend.connections(&id).await {
            Ok(status) => status,
            Err(e) => return ctx.fail(&e),
        },
        Ok(None) => {
            eprintln!(
                "warning: No active session found. Connect a service first with 'kay connect -s <service>'."
            );
            ConnectionsStatus::default()
        }
        Err(e) => return ctx.fail(&e),
    };

    if args.json {
        let rows: Vec<_> = Service::ALL
            .iter()
            .map(|service| {
                let conn = status.get(*service);
                json!({
                    "service": service,
                    "displayName": service.display_name(),
                    "connected": status.is_connected(*service),
                    "user": conn.and_then(|c| c.user.as_ref()),
                    "metadata": conn.and_then(|c| c.metadata.as_ref()),
                })
            })
            .collect();
        return print_json(&rows);
    }

    print!("{}", render_table(&status));
    0
}

pub(crate) fn render_table(status: &ConnectionsStatus) -> String {
    let mut out = format!("{:<20} {:<16} {}\n", "SERVICE", "STATUS", "USER");
    out.push_str(&"-".repeat(56));
    out.push('\n');
    for service in Service::ALL {
        let state = if status.is_connected(service) { "connected" } else { "not connected" };
        let user = status
            .get(service)
            .and_then(|c| c.user.as_ref())
            .and_then(|u| u.label())
            .unwrap_or_else(|| "-".to_owned());
        out.push_str(&format!("{:<20} {state:<16} {user}\n", service.display_name()));
    }
    out
}
