// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk credential store.
//!
//! Two documents live under the state directory (default `~/.kay`):
//! `config.json`, a flat key/value map, and `session.json`, the dedicated
//! session record. Both are written owner-only through a temp file + rename.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::session::{SessionRecord, SessionSlot};

pub const CONFIG_FILE: &str = "config.json";
pub const SESSION_FILE: &str = "session.json";

/// Resolve the state directory: `$HOME/.kay`.
pub fn default_state_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .context("HOME is not set; pass --config-dir")?;
    Ok(PathBuf::from(home).join(".kay"))
}

/// Write `bytes` to `path` so that readers never observe a partial file.
///
/// The temp file is created next to the target with mode 0600 and then
/// renamed over it.
pub fn write_private(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = path.parent().context("store path has no parent directory")?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".kay-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file().set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}

/// Key/value configuration persisted as one JSON object.
///
/// Every accessor is a full read-modify-write; no state is held in memory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(state_dir: &Path) -> Self {
        Self { path: state_dir.join(CONFIG_FILE) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An absent file is an empty map. A file that exists but is not a JSON
    /// object is an error.
    pub fn load(&self) -> anyhow::Result<Map<String, Value>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => anyhow::bail!("{} is not a JSON object", self.path.display()),
            Err(e) => Err(e).with_context(|| format!("failed to parse {}", self.path.display())),
        }
    }

    pub fn save(&self, map: &Map<String, Value>) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(map)?;
        write_private(&self.path, &bytes)?;
        debug!(path = %self.path.display(), keys = map.len(), "saved config");
        Ok(())
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.load()?.remove(key))
    }

    /// String value for `key`. Non-string and empty values read as `None`.
    pub fn get_str(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(match self.get(key)? {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        })
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> anyhow::Result<()> {
        self.update(|map| {
            map.insert(key.to_owned(), value.into());
        })
    }

    pub fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.update(|map| {
            map.remove(key);
        })
    }

    /// Apply several edits in a single read-modify-write.
    pub fn update(&self, edit: impl FnOnce(&mut Map<String, Value>)) -> anyhow::Result<()> {
        let mut map = self.load()?;
        edit(&mut map);
        self.save(&map)
    }
}

/// The dedicated `session.json` document.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(state_dir: &Path) -> Self {
        Self { path: state_dir.join(SESSION_FILE) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionSlot for SessionFile {
    /// Corrupt or incomplete records are removed and read as no session.
    fn load(&self) -> anyhow::Result<Option<SessionRecord>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        match serde_json::from_slice::<SessionRecord>(&bytes) {
            Ok(record) if record.is_valid() => Ok(Some(record)),
            Ok(_) => {
                warn!(path = %self.path.display(), "discarding incomplete session record");
                remove_if_present(&self.path)?;
                Ok(None)
            }
            Err(e) => {
                warn!(path = %self.path.display(), err = %e, "discarding corrupt session record");
                remove_if_present(&self.path)?;
                Ok(None)
            }
        }
    }

    fn save(&self, record: &SessionRecord) -> anyhow::Result<()> {
        write_private(&self.path, &serde_json::to_vec_pretty(record)?)
    }

    fn clear(&self) -> anyhow::Result<()> {
        remove_if_present(&self.path)
    }
}

/// Session record flattened into top-level config keys.
///
/// `session_id` is shared with the session backend's correlator, so
/// [`SessionSlot::clear`] leaves it in place. A missing `expires_at` reads
/// as expired; only an incomplete token pair is discarded.
#[derive(Debug, Clone)]
pub struct FlatSession {
    config: ConfigStore,
}

const FLAT_TOKEN: &str = "token";
const FLAT_REFRESH: &str = "refresh_token";
const FLAT_EXPIRES: &str = "expires_at";
const FLAT_ACCOUNT: &str = "account_id";
const FLAT_SESSION: &str = "session_id";

impl FlatSession {
    pub fn new(config: ConfigStore) -> Self {
        Self { config }
    }
}

impl SessionSlot for FlatSession {
    fn load(&self) -> anyhow::Result<Option<SessionRecord>> {
        let map = self.config.load()?;
        let field = |key: &str| map.get(key).and_then(Value::as_str).unwrap_or_default().to_owned();
        let optional = |key: &str| Some(field(key)).filter(|v| !v.is_empty());

        let record = SessionRecord {
            access_token: field(FLAT_TOKEN),
            refresh_token: field(FLAT_REFRESH),
            // Older layouts carry no expiry; treat it as already expired and
            // let the backend's 401 drive the refresh.
            expires_at: optional(FLAT_EXPIRES).unwrap_or_else(|| {
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            }),
            session_id: optional(FLAT_SESSION),
            account_id: optional(FLAT_ACCOUNT),
        };
        if record.is_valid() {
            return Ok(Some(record));
        }
        if [FLAT_TOKEN, FLAT_REFRESH, FLAT_EXPIRES].iter().any(|k| map.contains_key(*k)) {
            warn!(path = %self.config.path().display(), "discarding incomplete account session");
            self.clear()?;
        }
        Ok(None)
    }

    fn save(&self, record: &SessionRecord) -> anyhow::Result<()> {
        self.config.update(|map| {
            map.insert(FLAT_TOKEN.into(), record.access_token.clone().into());
            map.insert(FLAT_REFRESH.into(), record.refresh_token.clone().into());
            map.insert(FLAT_EXPIRES.into(), record.expires_at.clone().into());
            if let Some(ref id) = record.account_id {
                map.insert(FLAT_ACCOUNT.into(), id.clone().into());
            }
            if let Some(ref id) = record.session_id {
                map.insert(FLAT_SESSION.into(), id.clone().into());
            }
        })
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.config.update(|map| {
            for key in [FLAT_TOKEN, FLAT_REFRESH, FLAT_EXPIRES, FLAT_ACCOUNT] {
                map.remove(key);
            }
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
