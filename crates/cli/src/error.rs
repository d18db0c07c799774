// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde_json::Value;

/// Classification read from the body of a 401/403 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    TokenMissing,
    TokenExpired,
    TokenInvalid,
    /// Absent, unparsable, or any value the client does not know.
    Unrecognized,
}

impl AuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenMissing => "TOKEN_MISSING",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::Unrecognized => "UNRECOGNIZED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "TOKEN_MISSING" => Self::TokenMissing,
            "TOKEN_EXPIRED" => Self::TokenExpired,
            "TOKEN_INVALID" => Self::TokenInvalid,
            _ => Self::Unrecognized,
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort view of a backend error body.
///
/// Only non-empty string fields are kept; anything else reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: Option<String>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl ErrorBody {
    /// Unparsable bodies read as empty.
    pub fn parse(bytes: &[u8]) -> Self {
        let value: Value = serde_json::from_slice(bytes).unwrap_or_default();
        let text = |key: &str| {
            value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_owned)
        };
        Self { code: text("code"), error: text("error"), message: text("message") }
    }

    /// `code` takes precedence over `error`.
    pub fn code(&self) -> AuthErrorCode {
        self.code
            .as_deref()
            .or(self.error.as_deref())
            .map(AuthErrorCode::parse)
            .unwrap_or(AuthErrorCode::Unrecognized)
    }

    /// Human-readable message: `message`, then `error`.
    pub fn summary(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref()).filter(|s| !s.is_empty())
    }
}

/// Terminal outcomes of an authenticated request.
///
/// Every authentication variant carries the command the user should run to
/// re-authenticate. Transport failures never do.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Authentication failed after retry. Please run '{hint}' to reconnect.")]
    RetryExhausted { hint: &'static str },

    #[error("Failed to initialize session. Please run '{hint}' to authenticate.")]
    InitFailed { hint: &'static str },

    #[error("Session bootstrap was rejected ({status}). Please run '{hint}' to authenticate.")]
    Bootstrap { status: u16, hint: &'static str },

    #[error("Your session has expired or been revoked. Please run '{hint}' again.")]
    RefreshFailed { hint: &'static str },

    #[error("Session refresh failed. Please run '{hint}' again.")]
    RefreshLost { hint: &'static str },

    #[error("Invalid or revoked session. Please run '{hint}' to reconnect.")]
    InvalidToken { hint: &'static str },

    #[error("{message} Please run '{hint}' to reconnect.")]
    Unauthorized { message: String, hint: &'static str },

    #[error("cannot reach backend at {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl GatewayError {
    /// True for every variant that asks the user to re-authenticate.
    pub fn is_auth(&self) -> bool {
        !matches!(self, Self::Transport { .. } | Self::Store(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Find a [`GatewayError::Transport`] anywhere in an error chain.
pub fn transport_cause(err: &anyhow::Error) -> Option<&GatewayError> {
    err.chain().filter_map(|e| e.downcast_ref::<GatewayError>()).find(|e| e.is_transport())
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
