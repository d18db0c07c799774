// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth 2.0 authorization-code flow helpers for Jira sites.

pub mod callback;
pub mod pkce;

pub use callback::{CallbackListener, CallbackParams};

use tracing::{debug, warn};

/// Set to skip launching a browser; the URL is still printed.
pub const NO_BROWSER_ENV: &str = "KAY_NO_BROWSER";

/// Open `url` in the default browser. Returns whether a launcher started.
pub fn open_browser(url: &str) -> bool {
    if std::env::var_os(NO_BROWSER_ENV).is_some_and(|v| !v.is_empty()) {
        debug!("browser launch disabled");
        return false;
    }

    #[cfg(target_os = "macos")]
    let launcher = "open";
    #[cfg(target_os = "windows")]
    let launcher = "explorer";
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let launcher = "xdg-open";

    match std::process::Command::new(launcher)
        .arg(url)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        Ok(_) => true,
        Err(e) => {
            warn!(launcher, err = %e, "failed to open browser");
            false
        }
    }
}
