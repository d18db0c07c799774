// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use reqwest::Url;

use crate::command::Command;
use crate::poll::PollPolicy;

/// Kay: AI assistant for Jira and Atlassian workflows.
#[derive(Debug, Parser)]
#[command(name = "kay", version, about)]
pub struct Config {
    /// Base URL of the Kay backend.
    #[arg(long, global = true, env = "KAY_BACKEND_URL", default_value = "http://localhost:4000")]
    pub backend_url: String,

    /// Directory holding config.json and session.json (default: ~/.kay).
    #[arg(long, global = true, env = "KAY_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, global = true, env = "KAY_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "KAY_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,

    // -- Overrides (skip from CLI; set in Config::test()) --------------------
    #[clap(skip)]
    pub http_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub poll_interval_ms: Option<u64>,
    #[clap(skip)]
    pub poll_attempts: Option<u32>,
}

fn env_duration_ms(var: &str, default: u64) -> Duration {
    let ms = std::env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default);
    Duration::from_millis(ms)
}

macro_rules! duration_field {
    ($method:ident, $field:ident, $env:literal, $default:expr) => {
        pub fn $method(&self) -> Duration {
            match self.$field {
                Some(ms) => Duration::from_millis(ms),
                None => env_duration_ms($env, $default),
            }
        }
    };
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        let url = Url::parse(&self.backend_url)
            .map_err(|e| anyhow::anyhow!("invalid --backend-url {:?}: {e}", self.backend_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("--backend-url must use http or https, got {}", url.scheme());
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid log format: {}", self.log_format);
        }
        Ok(())
    }

    /// Backend URL without a trailing slash.
    pub fn backend_base(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }

    pub fn state_dir(&self) -> anyhow::Result<PathBuf> {
        match self.config_dir {
            Some(ref dir) => Ok(dir.clone()),
            None => crate::store::default_state_dir(),
        }
    }

    // -- Tuning knobs (field override → env var → compiled default) --------

    duration_field!(http_timeout, http_timeout_ms, "KAY_HTTP_TIMEOUT_MS", 30_000);
    duration_field!(poll_interval, poll_interval_ms, "KAY_POLL_INTERVAL_MS", 2_000);

    pub fn poll_attempts(&self) -> u32 {
        self.poll_attempts
            .or_else(|| std::env::var("KAY_POLL_ATTEMPTS").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(150)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy { interval: self.poll_interval(), max_attempts: self.poll_attempts() }
    }

    /// Build a minimal `Config` for tests (`health` against localhost).
    #[doc(hidden)]
    pub fn test(state_dir: PathBuf) -> Self {
        Self {
            backend_url: "http://127.0.0.1:4000".into(),
            config_dir: Some(state_dir),
            log_format: "text".into(),
            log_level: "debug".into(),
            command: Command::Health(crate::command::JsonArgs { json: false }),
            http_timeout_ms: Some(5_000),
            poll_interval_ms: Some(10),
            poll_attempts: Some(5),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
