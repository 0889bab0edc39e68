//! One operator session: config + cooldown store + telemetry + override state.
//!
//! A refresh runs telemetry → cooldown load → ranking → override reconcile,
//! strictly in that order. If telemetry or auth fails, the last snapshot stays
//! in place marked stale, and the error goes back to the caller.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{info, warn};

use crate::config::ScoutConfig;
use crate::cooldown::CooldownStore;
use crate::error::{Result, ScoutError};
use crate::overrides::{OverrideController, Suggestion};
use crate::ranking::{rank, RankedEntry};
use crate::recorder::{RaidReceipt, RaidRecorder};
use crate::telemetry::{LiveChannelStatus, TelemetrySource};

/// What the presentation layer shows after a refresh or an operator action.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub refreshed_at: Option<DateTime<Utc>>,
    pub suggestion: Option<Suggestion>,
    pub ranked: Vec<RankedEntry>,
    /// Telemetry for the ranked channels (title, game, avatar).
    pub live: Vec<LiveChannelStatus>,
    /// True when the latest refresh failed and this is older data.
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Session {
    overrides: OverrideController,
    snapshot: Snapshot,
}

pub struct RaidScout {
    config_path: Option<PathBuf>,
    config: RwLock<Arc<ScoutConfig>>,
    store: Arc<dyn CooldownStore>,
    telemetry: Arc<dyn TelemetrySource>,
    session: Mutex<Session>,
}

impl RaidScout {
    pub fn new(
        config: ScoutConfig,
        store: Arc<dyn CooldownStore>,
        telemetry: Arc<dyn TelemetrySource>,
    ) -> Self {
        Self {
            config_path: None,
            config: RwLock::new(Arc::new(config)),
            store,
            telemetry,
            session: Mutex::new(Session::default()),
        }
    }

    /// File that `reload_config` re-reads. Without it, the default resolution applies.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn config(&self) -> Arc<ScoutConfig> {
        match self.config.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CooldownStore> {
        &self.store
    }

    pub fn snapshot(&self) -> Snapshot {
        self.session().snapshot.clone()
    }

    pub fn current_override(&self) -> Option<String> {
        self.session().overrides.current().map(str::to_string)
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        match self.session.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    /// One ranking pass at `now`.
    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<Snapshot> {
        let cfg = self.config();
        counter!("raid_scout_refresh_total").increment(1);

        let live = match self.telemetry.fetch_live(&cfg.logins()).await {
            Ok(v) => v,
            Err(e) => {
                counter!("raid_scout_refresh_errors_total", "kind" => e.kind()).increment(1);
                warn!(target: "scout", source = self.telemetry.name(), error = %e, "refresh failed; keeping previous suggestion");
                let mut s = self.session();
                s.snapshot.stale = true;
                s.snapshot.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let mut s = self.session();
        // A reload may have landed while the fetch was in flight.
        let cfg = self.config();
        rebuild(&mut s, &cfg, self.store.as_ref(), live, now);
        s.snapshot.refreshed_at = Some(now);
        s.snapshot.stale = false;
        s.snapshot.last_error = None;

        info!(
            target: "scout",
            live = s.snapshot.ranked.len(),
            suggestion = ?s.snapshot.suggestion.as_ref().map(|x| x.login.as_str()),
            "refresh"
        );
        Ok(s.snapshot.clone())
    }

    /// Operator picks a row. Must be a candidate from the last refresh.
    pub fn set_override(&self, login: &str) -> Result<Snapshot> {
        let mut guard = self.session();
        let s = &mut *guard;
        s.overrides.set(login, &s.snapshot.ranked)?;
        s.snapshot.suggestion = s.overrides.resolve(&s.snapshot.ranked);
        Ok(s.snapshot.clone())
    }

    pub fn clear_override(&self) -> Snapshot {
        let mut guard = self.session();
        let s = &mut *guard;
        s.overrides.clear();
        s.snapshot.suggestion = s.overrides.resolve(&s.snapshot.ranked);
        s.snapshot.clone()
    }

    /// Record a raid on any current candidate and re-rank with the new cooldown.
    pub fn mark_raided(&self, login: &str, now: DateTime<Utc>) -> Result<RaidReceipt> {
        let cfg = self.config();
        let mut guard = self.session();
        let receipt =
            RaidRecorder::mark_raided(self.store.as_ref(), &guard.snapshot.ranked, login, now)?;
        let live = std::mem::take(&mut guard.snapshot.live);
        rebuild(&mut guard, &cfg, self.store.as_ref(), live, now);
        Ok(receipt)
    }

    /// Re-read the config file and swap it in whole. On failure the previous
    /// config stays active.
    pub fn reload_config(&self, now: DateTime<Utc>) -> Result<Snapshot> {
        let path = ScoutConfig::resolve_path(self.config_path.as_deref());
        let fresh = ScoutConfig::load_from(&path).map_err(|e| {
            warn!(target: "scout", path = %path.display(), error = %e, "config reload rejected");
            ScoutError::from(e)
        })?;
        let fresh = Arc::new(fresh);
        match self.config.write() {
            Ok(mut g) => *g = fresh.clone(),
            Err(poison) => *poison.into_inner() = fresh.clone(),
        }
        info!(target: "scout", path = %path.display(), channels = fresh.channels.len(), "config reloaded");

        let mut guard = self.session();
        let live = std::mem::take(&mut guard.snapshot.live);
        rebuild(&mut guard, &fresh, self.store.as_ref(), live, now);
        Ok(guard.snapshot.clone())
    }
}

/// Rank `live` against `cfg` and the stored cooldowns, then settle the override.
fn rebuild(
    s: &mut Session,
    cfg: &ScoutConfig,
    store: &dyn CooldownStore,
    live: Vec<LiveChannelStatus>,
    now: DateTime<Utc>,
) {
    let cooldowns = store.load();
    let ranked = rank(&cfg.policy, &cfg.channels, &live, &cooldowns, now);
    s.overrides.reconcile(&ranked);

    let live = live
        .into_iter()
        .filter(|l| ranked.iter().any(|r| r.login.eq_ignore_ascii_case(&l.login)))
        .collect();

    gauge!("raid_scout_live_candidates").set(ranked.len() as f64);
    s.snapshot.suggestion = s.overrides.resolve(&ranked);
    s.snapshot.ranked = ranked;
    s.snapshot.live = live;
}
