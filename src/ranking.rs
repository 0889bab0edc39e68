//! # Ranking Engine
//! Pure, testable logic that maps `(policy, watch-list, live telemetry, cooldowns, now)`
//! to an ordered list of raid candidates. No I/O; `now` is always passed in.
//!
//! Order: ascending over `(cooldown, long_stream, priority, uptime_hours, viewers)`
//! with `false < true`. Entries equal on all five signals fall back to
//! "raided longest ago first" (never-raided before raided) and finally to the login,
//! so repeated passes over the same input always produce the same list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{normalize_login, ChannelConfig, RaidPolicy};
use crate::cooldown::CooldownState;
use crate::telemetry::LiveChannelStatus;

/// How the candidate list is finally ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankStrategy {
    /// The full signal tuple.
    #[default]
    PriorityThenViewers,
    /// Fewest viewers first; the signal tuple breaks ties.
    ViewersOnly,
    /// Lowest priority number first; the signal tuple breaks ties.
    PriorityOnly,
}

/// One live, configured channel with its ranking signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub login: String,
    pub display_name: String,
    pub cooldown: bool,
    pub long_stream: bool,
    pub priority: i64,
    pub uptime_hours: f64,
    pub viewers: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_raided_at: Option<DateTime<Utc>>,
}

impl RankedEntry {
    /// Lexicographic comparison over the five ranking signals only.
    pub fn cmp_signals(&self, other: &Self) -> Ordering {
        self.cooldown
            .cmp(&other.cooldown)
            .then(self.long_stream.cmp(&other.long_stream))
            .then(self.priority.cmp(&other.priority))
            .then(self.uptime_hours.total_cmp(&other.uptime_hours))
            .then(self.viewers.cmp(&other.viewers))
    }

    /// Signal order plus the deterministic fallbacks.
    pub fn cmp_total(&self, other: &Self) -> Ordering {
        self.cmp_signals(other)
            .then_with(|| cmp_last_raid(self.last_raided_at, other.last_raided_at))
            .then_with(|| self.login.cmp(&other.login))
    }
}

/// Never-raided sorts before raided; among raided, the older raid first.
fn cmp_last_raid(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    }
}

/// Hours between `started_at` and `now`, clamped at zero for clock skew.
pub fn uptime_hours(started_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    hours_between(started_at, now).max(0.0)
}

/// True iff a raid was recorded and it happened less than `cooldown_hours` ago.
pub fn is_on_cooldown(
    last_raid: Option<DateTime<Utc>>,
    cooldown_hours: f64,
    now: DateTime<Utc>,
) -> bool {
    if cooldown_hours <= 0.0 {
        return false;
    }
    match last_raid {
        Some(last) => hours_between(last, now) < cooldown_hours,
        None => false,
    }
}

/// Inclusive threshold: exactly `long_stream_hours` of uptime counts as long.
pub fn is_long_stream(uptime_hours: f64, long_stream_hours: f64) -> bool {
    uptime_hours >= long_stream_hours
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

/// Rank the live subset of the watch-list. Channels that are live but not
/// configured are not candidates. An empty result is a valid "no suggestion".
pub fn rank(
    policy: &RaidPolicy,
    channels: &[ChannelConfig],
    live: &[LiveChannelStatus],
    cooldowns: &CooldownState,
    now: DateTime<Utc>,
) -> Vec<RankedEntry> {
    let priorities: BTreeMap<String, i64> = channels
        .iter()
        .map(|c| (normalize_login(&c.login), c.priority))
        .collect();

    let mut seen = BTreeSet::new();
    let mut entries = Vec::with_capacity(live.len().min(priorities.len()));

    for status in live {
        let login = normalize_login(&status.login);
        let Some(&priority) = priorities.get(&login) else {
            continue;
        };
        // Telemetry can repeat a channel across batches; the first record wins.
        if !seen.insert(login.clone()) {
            continue;
        }

        let last_raided_at = cooldowns.get(&login);
        let uptime = uptime_hours(status.started_at, now);

        entries.push(RankedEntry {
            cooldown: is_on_cooldown(last_raided_at, policy.cooldown_hours, now),
            long_stream: is_long_stream(uptime, policy.long_stream_hours),
            priority,
            uptime_hours: uptime,
            viewers: status.viewer_count,
            display_name: status.display_name.clone(),
            last_raided_at,
            login,
        });
    }

    entries.sort_by(RankedEntry::cmp_total);

    // Both re-sorts are stable, so the signal order breaks their ties.
    match policy.strategy {
        RankStrategy::PriorityThenViewers => {}
        RankStrategy::ViewersOnly => entries.sort_by_key(|e| e.viewers),
        RankStrategy::PriorityOnly => entries.sort_by_key(|e| e.priority),
    }

    entries
}
