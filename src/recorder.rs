//! "Mark as raided" bookkeeping.
//!
//! Writes one timestamp into the cooldown store for a current candidate. The
//! session's override is not touched; the operator clears it explicitly.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::info;

use crate::config::normalize_login;
use crate::cooldown::CooldownStore;
use crate::error::{Result, ScoutError};
use crate::overrides::is_candidate;
use crate::ranking::RankedEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaidReceipt {
    pub login: String,
    pub raided_at: DateTime<Utc>,
    /// Previous raid time, if the channel had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<DateTime<Utc>>,
}

pub struct RaidRecorder;

impl RaidRecorder {
    /// Record a raid on `login` at `now`. Any live candidate is accepted, not
    /// only the current suggestion. Non-candidates are rejected before any write.
    pub fn mark_raided(
        store: &dyn CooldownStore,
        candidates: &[RankedEntry],
        login: &str,
        now: DateTime<Utc>,
    ) -> Result<RaidReceipt> {
        let login = normalize_login(login);
        if !is_candidate(&login, candidates) {
            return Err(ScoutError::InvalidTarget(login));
        }

        let previous = store.get(&login);
        store.record(&login, now)?;
        counter!("raid_scout_raids_recorded_total").increment(1);
        info!(target: "recorder", %login, at = %now, ?previous, "raid recorded");

        Ok(RaidReceipt {
            login,
            raided_at: now,
            previous,
        })
    }
}
