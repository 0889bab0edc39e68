// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod metrics;
pub mod overrides;
pub mod ranking;
pub mod recorder;
pub mod scout;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::{ChannelConfig, RaidPolicy, ScoutConfig};
pub use crate::cooldown::{CooldownState, CooldownStore, FileCooldownStore, MemoryCooldownStore};
pub use crate::error::{ConfigError, ScoutError};
pub use crate::overrides::{OverrideController, Suggestion, SuggestionOrigin};
pub use crate::ranking::{rank, RankStrategy, RankedEntry};
pub use crate::recorder::{RaidReceipt, RaidRecorder};
pub use crate::scout::{RaidScout, Snapshot};
pub use crate::telemetry::{LiveChannelStatus, TelemetrySource};
