// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization code + PKCE (RFC 7636) against a Jira site's OAuth 2.0
//! endpoints.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use reqwest::header::ACCEPT;
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::client::{read_json, unreachable};
use crate::session::TokenGrant;

pub const AUTHORIZE_PATH: &str = "/rest/oauth2/latest/authorize";
pub const TOKEN_PATH: &str = "/rest/oauth2/latest/token";
pub const DEFAULT_SCOPE: &str = "WRITE";

/// Generate a PKCE code verifier (32 random bytes, 43 chars).
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute code_challenge = base64url_nopad(sha256(verifier)).
pub fn compute_code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// One authorization attempt: verifier, its challenge, and the CSRF state.
#[derive(Debug, Clone)]
pub struct PkceFlow {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = generate_code_verifier();
        let challenge = compute_code_challenge(&verifier);
        Self { verifier, challenge, state: generate_state() }
    }

    /// Authorization URL on `site` for this attempt.
    pub fn authorize_url(
        &self,
        site: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> anyhow::Result<String> {
        let mut url = Url::parse(site)?.join(AUTHORIZE_PATH)?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", DEFAULT_SCOPE)
            .append_pair("code_challenge", &self.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &self.state);
        Ok(url.into())
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Exchange an authorization code for tokens (form body).
pub async fn exchange_code(
    http: &reqwest::Client,
    site: &str,
    client_id: &str,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> anyhow::Result<TokenGrant> {
    let token_url = Url::parse(site)?.join(TOKEN_PATH)?;
    let response = http
        .post(token_url)
        .header(ACCEPT, "application/json")
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ])
        .send()
        .await
        .map_err(unreachable(site))?;

    let grant: TokenGrant = read_json(response, "token exchange").await?;
    anyhow::ensure!(grant.access_token().is_some(), "token exchange returned no access token");
    Ok(grant)
}

#[cfg(test)]
#[path = "pkce_tests.rs"]
mod tests;
