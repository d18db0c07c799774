// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Runs the real `kay` binary as a subprocess against a scripted backend,
//! with its state directory isolated in a temp dir.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Upper bound on a single `kay` invocation.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(20);

/// Resolve the path to the compiled `kay` binary.
pub fn kay_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("kay")
}

/// Captured result of one `kay` run.
#[derive(Debug)]
pub struct KayOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl KayOutput {
    /// Parse stdout as JSON.
    pub fn json(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.stdout)?)
    }
}

/// An isolated `kay` environment: one state directory, one backend URL.
pub struct Kay {
    backend_url: String,
    state: tempfile::TempDir,
}

impl Kay {
    pub fn new(backend_url: &str) -> anyhow::Result<Self> {
        Ok(Self { backend_url: backend_url.to_owned(), state: tempfile::tempdir()? })
    }

    pub fn state_dir(&self) -> &Path {
        self.state.path()
    }

    /// Write a file into the state directory before running.
    pub fn seed(&self, name: &str, value: &serde_json::Value) -> anyhow::Result<()> {
        std::fs::write(self.state.path().join(name), serde_json::to_vec_pretty(value)?)?;
        Ok(())
    }

    /// Read a JSON file from the state directory. Missing reads as `None`.
    pub fn read(&self, name: &str) -> anyhow::Result<Option<serde_json::Value>> {
        match std::fs::read(self.state.path().join(name)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Run `kay <args>` with stdin closed and browsers disabled.
    pub async fn run(&self, args: &[&str]) -> anyhow::Result<KayOutput> {
        let binary = kay_binary();
        anyhow::ensure!(binary.exists(), "kay binary not found at {}", binary.display());

        let child = Command::new(&binary)
            .args(args)
            .env("KAY_BACKEND_URL", &self.backend_url)
            .env("KAY_CONFIG_DIR", self.state.path())
            .env("KAY_NO_BROWSER", "1")
            .env("KAY_POLL_INTERVAL_MS", "20")
            .env("KAY_POLL_ATTEMPTS", "5")
            .env_remove("KAY_PASSWORD")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(RUN_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| anyhow::anyhow!("kay {args:?} did not finish within {RUN_TIMEOUT:?}"))??;
        Ok(KayOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
