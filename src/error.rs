//! Error conditions surfaced by the raid core.
//!
//! `ConfigError` is fatal at load time. `Auth` and `Telemetry` abort one refresh
//! cycle and leave the previous suggestion in place (marked stale).
//! `InvalidTarget` rejects an operator action without mutating anything.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(String),

    #[error("channel entry #{index} has an empty name")]
    EmptyLogin { index: usize },

    #[error("duplicate channel in watch-list: {0}")]
    DuplicateLogin(String),

    #[error("`raid.{field}` must be a finite, non-negative number (got {value})")]
    InvalidThreshold { field: &'static str, value: f64 },

    #[error("missing Twitch credentials: {0}")]
    MissingCredentials(String),
}

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("telemetry error: {0}")]
    Telemetry(String),

    #[error("invalid target: {0} is not a live channel on the watch-list")]
    InvalidTarget(String),

    #[error("cooldown store: {0}")]
    Store(#[from] std::io::Error),
}

impl ScoutError {
    /// Short machine-friendly tag used in API bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ScoutError::Config(_) => "config",
            ScoutError::Auth(_) => "auth",
            ScoutError::Telemetry(_) => "telemetry",
            ScoutError::InvalidTarget(_) => "invalid_target",
            ScoutError::Store(_) => "store",
        }
    }
}

pub type Result<T, E = ScoutError> = std::result::Result<T, E>;
