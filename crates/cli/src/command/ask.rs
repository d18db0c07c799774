// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kay ask`: one-shot questions and a line-based chat.

use super::{print_json, Context, Prompt};
use crate::client::account::{AccountClient, AskRequest, AskResponse};

#[derive(Debug, Clone, clap::Args)]
pub struct AskArgs {
    /// The question. Optional with --interactive.
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,
    /// Keep chatting until `exit` or `quit`.
    #[arg(short, long)]
    pub interactive: bool,
    /// Allow Kay to propose actions that need confirmation.
    #[arg(long)]
    pub confirm: bool,
    /// Print the raw answer as JSON.
    #[arg(long)]
    pub json: bool,
}

impl AskArgs {
    fn prompt(&self) -> Option<String> {
        let joined = self.prompt.join(" ");
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }
}

pub async fn run(ctx: &Context, args: &AskArgs) -> i32 {
    let account = ctx.account();
    match account.is_logged_in() {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("error: Not authenticated. Run 'kay login' first.");
            return 1;
        }
        Err(e) => return ctx.fail(&e),
    }

    if args.interactive {
        return match chat(&account, args).await {
            Ok(()) => 0,
            Err(e) => ctx.fail(&e),
        };
    }

    let Some(prompt) = args.prompt() else {
        eprintln!("error: Please provide a prompt. Usage: kay ask \"your question here\"");
        return 1;
    };
    let request = AskRequest { prompt, interactive: false, confirm: args.confirm, session_id: None };
    let answer = match account.ask(&request).await {
        Ok(answer) => answer,
        Err(e) => return ctx.fail(&e),
    };
    if args.json {
        return print_json(&answer);
    }

    println!("{}", answer.message);
    if let Some(token) = answer.pending_confirmation() {
        confirm_action(&account, &mut Prompt::new(), token).await;
    }
    0
}

async fn chat(account: &AccountClient, args: &AskArgs) -> anyhow::Result<()> {
    let mut input = Prompt::new();
    let mut session_id = None;
    println!("Interactive chat. Type 'exit' or 'quit' to end the conversation.");

    if let Some(first) = args.prompt() {
        println!("You: {first}");
        let answer = turn(account, first, args.confirm, &mut session_id).await?;
        reply(account, &mut input, &answer).await;
    }

    loop {
        let Some(line) = input.ask("You: ").await? else {
            break;
        };
        if line.is_empty() {
            continue;
        }
        if matches!(line.to_ascii_lowercase().as_str(), "exit" | "quit") {
            break;
        }
        match turn(account, line, args.confirm, &mut session_id).await {
            Ok(answer) => reply(account, &mut input, &answer).await,
            Err(e) => eprintln!("error: {e:#}"),
        }
    }
    println!("Chat ended. Goodbye!");
    Ok(())
}

/// Send one chat message, carrying the conversation id forward.
async fn turn(
    account: &AccountClient,
    prompt: String,
    confirm: bool,
    session_id: &mut Option<String>,
) -> anyhow::Result<AskResponse> {
    let request = AskRequest { prompt, interactive: true, confirm, session_id: session_id.clone() };
    let answer = account.ask(&request).await?;
    if answer.session_id.is_some() {
        session_id.clone_from(&answer.session_id);
    }
    Ok(answer)
}

async fn reply(account: &AccountClient, input: &mut Prompt, answer: &AskResponse) {
    println!("Kay: {}", answer.message);
    if let Some(token) = answer.pending_confirmation() {
        confirm_action(account, input, token).await;
    }
}

async fn confirm_action(account: &AccountClient, input: &mut Prompt, token: &str) {
    println!("This action requires confirmation.");
    let approved = match input.confirm("Do you want to proceed?").await {
        Ok(approved) => approved,
        Err(e) => {
            eprintln!("error: {e:#}");
            return;
        }
    };
    match account.ask_confirm(token, approved).await {
        Ok(result) => println!("Kay: {}", result.message),
        Err(e) => eprintln!("error: {e:#}"),
    }
}
