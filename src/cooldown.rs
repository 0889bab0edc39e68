//! # Cooldown Store
//!
//! Persisted `login → last raid time` mapping. The ranking reads it on every pass;
//! only the raid recorder (and operator resets) write to it.
//!
//! - File format: `{ "last_raids": { "<login>": "<RFC3339 UTC>" } }`, hand-editable.
//! - Missing file → empty state (first run).
//! - Malformed file → warning + empty state; a single malformed entry is skipped.
//! - Writes replace the whole file via a uniquely named temp file + rename, never
//!   in place; concurrent writers are last-writer-wins.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::config::normalize_login;

pub const ENV_STATE_PATH: &str = "RAID_SCOUT_STATE_PATH";
pub const STATE_FILE_NAME: &str = ".raid_scout_state.json";

/// In-memory view of the persisted cooldown history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooldownState {
    last_raids: BTreeMap<String, DateTime<Utc>>,
}

impl CooldownState {
    pub fn get(&self, login: &str) -> Option<DateTime<Utc>> {
        self.last_raids.get(&normalize_login(login)).copied()
    }

    pub fn insert(&mut self, login: &str, at: DateTime<Utc>) {
        self.last_raids.insert(normalize_login(login), at);
    }

    pub fn remove(&mut self, login: &str) -> Option<DateTime<Utc>> {
        self.last_raids.remove(&normalize_login(login))
    }

    pub fn len(&self) -> usize {
        self.last_raids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_raids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DateTime<Utc>)> {
        self.last_raids.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Swappable persistence for cooldown history.
pub trait CooldownStore: Send + Sync {
    /// Read the full mapping. Never fails: unreadable state is treated as empty.
    fn load(&self) -> CooldownState;

    /// Replace the full mapping.
    fn save(&self, state: &CooldownState) -> io::Result<()>;

    fn get(&self, login: &str) -> Option<DateTime<Utc>> {
        self.load().get(login)
    }

    /// Insert or overwrite one entry. Re-reads first so entries written by
    /// other sessions survive; concurrent writers are last-writer-wins.
    fn record(&self, login: &str, at: DateTime<Utc>) -> io::Result<()> {
        let mut state = self.load();
        state.insert(login, at);
        self.save(&state)
    }

    /// Drop one entry (operator reset). Returns whether anything was removed.
    fn forget(&self, login: &str) -> io::Result<bool> {
        let mut state = self.load();
        let removed = state.remove(login).is_some();
        if removed {
            self.save(&state)?;
        }
        Ok(removed)
    }

    /// Drop every entry.
    fn clear(&self) -> io::Result<()> {
        self.save(&CooldownState::default())
    }
}

/* ----------------------------
File-backed store
---------------------------- */

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    last_raids: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct FileCooldownStore {
    path: PathBuf,
}

impl FileCooldownStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path resolution: explicit, then $RAID_SCOUT_STATE_PATH, then `~/.raid_scout_state.json`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var(ENV_STATE_PATH) {
            return PathBuf::from(p);
        }
        let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
        match home {
            Some(h) => PathBuf::from(h).join(STATE_FILE_NAME),
            None => PathBuf::from(STATE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CooldownStore for FileCooldownStore {
    fn load(&self) -> CooldownState {
        let content = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return CooldownState::default(),
            Err(e) => {
                warn!(target: "cooldown", path = %self.path.display(), error = %e, "cannot read cooldown state; treating as empty");
                return CooldownState::default();
            }
        };
        parse_state(&content, &self.path)
    }

    fn save(&self, state: &CooldownState) -> io::Result<()> {
        let file = StateFile {
            last_raids: state
                .iter()
                .map(|(login, at)| {
                    (
                        login.to_string(),
                        serde_json::Value::String(format_timestamp(at)),
                    )
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let dir = match self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            Some(d) => {
                fs::create_dir_all(d)?;
                d
            }
            None => Path::new("."),
        };
        // One temp file per writer, same directory as the target.
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn parse_state(content: &str, path: &Path) -> CooldownState {
    if content.trim().is_empty() {
        return CooldownState::default();
    }
    let file: StateFile = match serde_json::from_str(content) {
        Ok(f) => f,
        Err(e) => {
            warn!(target: "cooldown", path = %path.display(), error = %e, "malformed cooldown state; treating as empty");
            return CooldownState::default();
        }
    };

    let mut state = CooldownState::default();
    for (login, raw) in file.last_raids {
        match raw.as_str().and_then(parse_timestamp) {
            Some(at) => state.insert(&login, at),
            None => {
                warn!(target: "cooldown", %login, value = %raw, "skipping unreadable cooldown entry");
            }
        }
    }
    state
}

/// RFC3339 with offset, or a naive ISO-8601 datetime which is taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

/// RFC3339 UTC with `Z`; sub-second digits are kept only when present.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/* ----------------------------
In-memory store
---------------------------- */

#[derive(Debug, Default)]
pub struct MemoryCooldownStore {
    inner: Mutex<CooldownState>,
}

impl MemoryCooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: CooldownState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }
}

impl CooldownStore for MemoryCooldownStore {
    fn load(&self) -> CooldownState {
        self.inner
            .lock()
            .map(|g| g.clone())
            .unwrap_or_else(|poison| poison.into_inner().clone())
    }

    fn save(&self, state: &CooldownState) -> io::Result<()> {
        let mut g = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("cooldown mutex poisoned"))?;
        *g = state.clone();
        Ok(())
    }
}
