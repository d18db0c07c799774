// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named service clients over [`SessionGateway`](crate::gateway::SessionGateway).

pub mod account;
pub mod backend;
pub mod jira;

use std::sync::Once;
use std::time::Duration;

use anyhow::Context;
use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::error::{ErrorBody, GatewayError};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls. Only the first call
/// has an effect.
pub fn install_crypto_provider() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// HTTP client shared by every service client.
pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    install_crypto_provider();
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("kay/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

/// Map a send failure on an unauthenticated call to a transport error.
pub(crate) fn unreachable(base_url: &str) -> impl FnOnce(reqwest::Error) -> GatewayError + '_ {
    move |source| GatewayError::Transport { url: base_url.to_owned(), source }
}

/// Decode a 2xx JSON body, or turn any other status into an error naming
/// `what` and the backend's message.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    what: &str,
) -> anyhow::Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.bytes().await.unwrap_or_default();
        let detail = ErrorBody::parse(&body);
        match detail.summary() {
            Some(msg) => anyhow::bail!("{what} failed ({status}): {msg}"),
            None => anyhow::bail!("{what} failed ({status})"),
        }
    }
    response.json::<T>().await.with_context(|| format!("invalid {what} response"))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
