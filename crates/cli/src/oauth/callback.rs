// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loopback listener for the OAuth redirect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const CALLBACK_PATH: &str = "/callback";

/// Query parameters of the redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CallbackParams {
    /// The authorization code, after checking the error and the state.
    pub fn into_code(self, expected_state: &str) -> anyhow::Result<String> {
        if let Some(error) = self.error {
            anyhow::bail!("authorization failed: {error}");
        }
        anyhow::ensure!(
            self.state.as_deref() == Some(expected_state),
            "authorization state mismatch"
        );
        self.code.filter(|c| !c.is_empty()).ok_or_else(|| anyhow::anyhow!("no authorization code"))
    }
}

type Slot = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

/// A bound loopback port waiting for one redirect.
pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
}

impl CallbackListener {
    /// Bind `127.0.0.1:{start_port}`, moving to the next port while the
    /// current one is taken, for at most `attempts` ports.
    pub async fn bind(start_port: u16, attempts: u16) -> anyhow::Result<Self> {
        let mut port = start_port;
        for _ in 0..attempts.max(1) {
            match TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => {
                    let port = listener.local_addr()?.port();
                    debug!(port, "callback listener bound");
                    return Ok(Self { listener, port });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && port != 0 => {
                    debug!(port, "port in use, trying next");
                    port = port.checked_add(1).ok_or_else(|| anyhow::anyhow!("no free port"))?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        anyhow::bail!("no free port in {start_port}..{port}")
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{CALLBACK_PATH}", self.port)
    }

    /// Serve until the first redirect carrying a code or an error, or until
    /// `timeout` elapses.
    pub async fn wait(self, timeout: Duration) -> anyhow::Result<CallbackParams> {
        let Self { listener, port } = self;
        let (tx, rx) = oneshot::channel();
        let slot: Slot = Arc::new(Mutex::new(Some(tx)));
        let router = Router::new().route(CALLBACK_PATH, get(handle_callback)).with_state(slot);

        let shutdown = CancellationToken::new();
        let sd = shutdown.clone();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router).with_graceful_shutdown(sd.cancelled_owned()).await;
        });

        let result = tokio::time::timeout(timeout, rx).await;
        shutdown.cancel();
        match result {
            Ok(Ok(params)) => {
                info!(port, "received OAuth callback");
                Ok(params)
            }
            Ok(Err(_)) => anyhow::bail!("callback listener stopped"),
            Err(_) => {
                server.abort();
                anyhow::bail!("timed out waiting for authorization")
            }
        }
    }
}

async fn handle_callback(State(slot): State<Slot>, Query(params): Query<CallbackParams>) -> Response {
    if params.code.is_none() && params.error.is_none() {
        return (StatusCode::BAD_REQUEST, "Invalid request").into_response();
    }
    let title = if params.error.is_some() { "Authentication Failed" } else { "Authentication Successful" };
    if let Some(tx) = slot.lock().take() {
        let _ = tx.send(params);
    }
    Html(format!(
        "<html><body><h1>{title}</h1><p>You can close this window and return to the terminal.</p></body></html>"
    ))
    .into_response()
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
