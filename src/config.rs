// src/config.rs
//! Operator configuration: raid policy, watch-list and Twitch app credentials.
//!
//! Loaded once at start and again on explicit reload. A config that fails any
//! check is rejected whole; there is no partially-valid configuration.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::error::ConfigError;
use crate::ranking::RankStrategy;

pub const DEFAULT_CONFIG_PATH: &str = "config/raid_scout.toml";
pub const ENV_CONFIG_PATH: &str = "RAID_SCOUT_CONFIG_PATH";
pub const ENV_CLIENT_ID: &str = "TWITCH_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "TWITCH_CLIENT_SECRET";

/// One watch-list entry. Lower `priority` is preferred; ties are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub login: String,
    pub priority: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaidPolicy {
    pub cooldown_hours: f64,
    pub long_stream_hours: f64,
    pub strategy: RankStrategy,
}

impl RaidPolicy {
    pub fn new(cooldown_hours: f64, long_stream_hours: f64) -> Self {
        Self {
            cooldown_hours,
            long_stream_hours,
            strategy: RankStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitchCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct ScoutConfig {
    pub twitch: Option<TwitchCredentials>,
    pub policy: RaidPolicy,
    pub channels: Vec<ChannelConfig>,
}

/* ----------------------------
Raw schema (TOML / JSON)
---------------------------- */

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    twitch: Option<RawTwitch>,
    raid: RawRaid,
    channels: Vec<RawChannel>,
}

#[derive(Debug, Deserialize)]
struct RawTwitch {
    /// "ENV" means: read from TWITCH_CLIENT_ID
    client_id: String,
    /// "ENV" means: read from TWITCH_CLIENT_SECRET
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct RawRaid {
    cooldown_hours: f64,
    long_stream_hours: f64,
    #[serde(default)]
    pick_strategy: RankStrategy,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    name: String,
    priority: i64,
}

impl ScoutConfig {
    /// Path resolution: explicit path, then $RAID_SCOUT_CONFIG_PATH, then `config/raid_scout.toml`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load from a file. `.json` files are parsed as JSON, everything else as TOML.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_raw(raw)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let policy = RaidPolicy {
            cooldown_hours: check_hours("cooldown_hours", raw.raid.cooldown_hours)?,
            long_stream_hours: check_hours("long_stream_hours", raw.raid.long_stream_hours)?,
            strategy: raw.raid.pick_strategy,
        };

        let mut seen = BTreeSet::new();
        let mut channels = Vec::with_capacity(raw.channels.len());
        for (index, ch) in raw.channels.into_iter().enumerate() {
            let login = normalize_login(&ch.name);
            if login.is_empty() {
                return Err(ConfigError::EmptyLogin { index });
            }
            if !seen.insert(login.clone()) {
                return Err(ConfigError::DuplicateLogin(login));
            }
            channels.push(ChannelConfig {
                login,
                priority: ch.priority,
            });
        }

        let twitch = raw.twitch.map(resolve_credentials).transpose()?;

        Ok(Self {
            twitch,
            policy,
            channels,
        })
    }

    /// Watch-list logins in configured order.
    pub fn logins(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.login.clone()).collect()
    }

    /// Credentials required for talking to Helix.
    pub fn require_credentials(&self) -> Result<&TwitchCredentials, ConfigError> {
        match &self.twitch {
            Some(c) if !c.client_id.trim().is_empty() && !c.client_secret.trim().is_empty() => {
                Ok(c)
            }
            Some(_) => Err(ConfigError::MissingCredentials(
                "client_id/client_secret are empty".into(),
            )),
            None => Err(ConfigError::MissingCredentials(
                "no [twitch] section in config".into(),
            )),
        }
    }
}

/// Twitch logins are case-insensitive; the watch-list, telemetry and cooldown
/// state all key on the trimmed lowercase form.
pub fn normalize_login(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

fn check_hours(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidThreshold { field, value })
    }
}

fn resolve_credentials(raw: RawTwitch) -> Result<TwitchCredentials, ConfigError> {
    Ok(TwitchCredentials {
        client_id: resolve_env_value(raw.client_id, ENV_CLIENT_ID)?,
        client_secret: resolve_env_value(raw.client_secret, ENV_CLIENT_SECRET)?,
    })
}

fn resolve_env_value(value: String, var: &str) -> Result<String, ConfigError> {
    if value.trim().eq_ignore_ascii_case("env") {
        env::var(var).map_err(|_| ConfigError::MissingCredentials(format!("{var} env var not set")))
    } else {
        Ok(value)
    }
}
