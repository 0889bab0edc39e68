// tests/raid_scenarios.rs
//
// End-to-end passes through `RaidScout` with fixed telemetry and an in-memory
// cooldown store. The clock is always passed in explicitly.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use raid_scout::cooldown::{CooldownStore, MemoryCooldownStore};
use raid_scout::telemetry::StaticTelemetry;
use raid_scout::{
    ChannelConfig, LiveChannelStatus, RaidPolicy, RaidScout, ScoutConfig, ScoutError,
    SuggestionOrigin,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap()
}

fn config(policy: RaidPolicy, channels: &[(&str, i64)]) -> ScoutConfig {
    ScoutConfig {
        twitch: None,
        policy,
        channels: channels
            .iter()
            .map(|(l, p)| ChannelConfig {
                login: l.to_string(),
                priority: *p,
            })
            .collect(),
    }
}

fn live(login: &str, uptime: Duration, viewers: u64) -> LiveChannelStatus {
    LiveChannelStatus {
        login: login.to_string(),
        display_name: login.to_string(),
        title: format!("{login} is live"),
        game: "Art".into(),
        viewer_count: viewers,
        started_at: t0() - uptime,
        avatar_url: Some(format!("https://img.example/{login}.png")),
    }
}

struct Rig {
    scout: RaidScout,
    telemetry: Arc<StaticTelemetry>,
    store: Arc<MemoryCooldownStore>,
}

fn rig(cfg: ScoutConfig, lives: Vec<LiveChannelStatus>) -> Rig {
    let telemetry = Arc::new(StaticTelemetry::new(lives));
    let store = Arc::new(MemoryCooldownStore::new());
    let scout = RaidScout::new(cfg, store.clone(), telemetry.clone());
    Rig {
        scout,
        telemetry,
        store,
    }
}

fn order(snap: &raid_scout::Snapshot) -> Vec<&str> {
    snap.ranked.iter().map(|e| e.login.as_str()).collect()
}

#[tokio::test]
async fn short_stream_wins_over_long_stream_regardless_of_viewers() {
    let r = rig(
        config(RaidPolicy::new(168.0, 2.0), &[("a", 1), ("b", 2)]),
        vec![
            live("a", Duration::minutes(30), 10),
            live("b", Duration::hours(3), 5),
        ],
    );
    let snap = r.scout.refresh(t0()).await.unwrap();
    assert_eq!(order(&snap), vec!["a", "b"]);
    assert!(!snap.ranked[0].long_stream);
    assert!(snap.ranked[1].long_stream);
    let s = snap.suggestion.unwrap();
    assert_eq!(s.login, "a");
    assert_eq!(s.origin, SuggestionOrigin::Automatic);
}

#[tokio::test]
async fn recently_raided_channel_drops_behind_fresh_one() {
    let r = rig(
        config(RaidPolicy::new(168.0, 2.0), &[("a", 1), ("b", 2)]),
        vec![
            live("a", Duration::minutes(30), 1),
            live("b", Duration::minutes(30), 900),
        ],
    );
    r.store.record("a", t0() - Duration::hours(1)).unwrap();
    let snap = r.scout.refresh(t0()).await.unwrap();
    assert_eq!(order(&snap), vec!["b", "a"]);
    assert!(snap.ranked[1].cooldown);
}

#[tokio::test]
async fn mark_raided_puts_channel_on_cooldown_for_next_pass() {
    let r = rig(
        config(RaidPolicy::new(168.0, 2.0), &[("a", 1), ("b", 2)]),
        vec![
            live("a", Duration::minutes(30), 10),
            live("b", Duration::minutes(40), 10),
        ],
    );
    r.scout.refresh(t0()).await.unwrap();

    let receipt = r.scout.mark_raided("a", t0()).unwrap();
    assert_eq!(receipt.login, "a");
    assert_eq!(r.store.get("a"), Some(t0()));

    // The snapshot is re-ranked right away...
    let snap = r.scout.snapshot();
    assert_eq!(order(&snap), vec!["b", "a"]);

    // ...and a later pass inside the window agrees.
    let later = t0() + Duration::minutes(5);
    let snap = r.scout.refresh(later).await.unwrap();
    let a = snap.ranked.iter().find(|e| e.login == "a").unwrap();
    assert!(a.cooldown);
    assert_eq!(snap.suggestion.unwrap().login, "b");
}

#[tokio::test]
async fn mark_raided_rejects_offline_channel() {
    let r = rig(
        config(RaidPolicy::new(168.0, 2.0), &[("a", 1), ("b", 2)]),
        vec![live("a", Duration::minutes(30), 10)],
    );
    r.scout.refresh(t0()).await.unwrap();
    let err = r.scout.mark_raided("b", t0()).unwrap_err();
    assert!(matches!(err, ScoutError::InvalidTarget(_)));
    assert!(r.store.load().is_empty());
}

#[tokio::test]
async fn override_wins_until_channel_goes_offline() {
    let r = rig(
        config(RaidPolicy::new(168.0, 2.0), &[("a", 1), ("b", 2)]),
        vec![
            live("a", Duration::minutes(30), 10),
            live("b", Duration::minutes(30), 10),
        ],
    );
    r.scout.refresh(t0()).await.unwrap();

    let snap = r.scout.set_override("b").unwrap();
    let s = snap.suggestion.unwrap();
    assert_eq!((s.login.as_str(), s.origin), ("b", SuggestionOrigin::Override));

    // Still live: override survives a refresh.
    let snap = r.scout.refresh(t0() + Duration::minutes(1)).await.unwrap();
    assert_eq!(snap.suggestion.unwrap().login, "b");

    // b goes offline: silently back to automatic, head of the ranking.
    r.telemetry
        .set_live(vec![live("a", Duration::minutes(32), 10)]);
    let snap = r.scout.refresh(t0() + Duration::minutes(2)).await.unwrap();
    let s = snap.suggestion.unwrap();
    assert_eq!(s.login, snap.ranked[0].login);
    assert_eq!(s.origin, SuggestionOrigin::Automatic);
    assert_eq!(r.scout.current_override(), None);
}

#[tokio::test]
async fn override_on_non_candidate_is_rejected_and_state_kept() {
    let r = rig(
        config(RaidPolicy::new(168.0, 2.0), &[("a", 1), ("b", 2)]),
        vec![
            live("a", Duration::minutes(30), 10),
            live("stranger", Duration::minutes(30), 10),
        ],
    );
    r.scout.refresh(t0()).await.unwrap();
    r.scout.set_override("a").unwrap();

    for bad in ["b", "stranger", ""] {
        let err = r.scout.set_override(bad).unwrap_err();
        assert!(matches!(err, ScoutError::InvalidTarget(_)), "{bad}");
        assert_eq!(r.scout.current_override().as_deref(), Some("a"));
    }
}

#[tokio::test]
async fn marking_another_channel_keeps_override() {
    let r = rig(
        config(RaidPolicy::new(168.0, 2.0), &[("a", 1), ("b", 2)]),
        vec![
            live("a", Duration::minutes(30), 10),
            live("b", Duration::minutes(30), 10),
        ],
    );
    r.scout.refresh(t0()).await.unwrap();
    r.scout.set_override("b").unwrap();
    r.scout.mark_raided("a", t0()).unwrap();
    assert_eq!(r.scout.current_override().as_deref(), Some("b"));
    assert_eq!(r.scout.snapshot().suggestion.unwrap().login, "b");

    let snap = r.scout.clear_override();
    assert_eq!(snap.suggestion.unwrap().login, "b"); // a is on cooldown now
}

#[tokio::test]
async fn telemetry_failure_keeps_stale_suggestion() {
    let r = rig(
        config(RaidPolicy::new(168.0, 2.0), &[("a", 1)]),
        vec![live("a", Duration::minutes(30), 10)],
    );
    r.scout.refresh(t0()).await.unwrap();

    r.telemetry.set_failure(Some("helix down"));
    let err = r.scout.refresh(t0() + Duration::minutes(1)).await.unwrap_err();
    assert!(matches!(err, ScoutError::Telemetry(_)));

    let snap = r.scout.snapshot();
    assert!(snap.stale);
    assert_eq!(snap.refreshed_at, Some(t0()));
    assert_eq!(snap.suggestion.unwrap().login, "a");
    assert!(snap.last_error.unwrap().contains("helix down"));

    r.telemetry.set_failure(None);
    let snap = r.scout.refresh(t0() + Duration::minutes(2)).await.unwrap();
    assert!(!snap.stale);
    assert!(snap.last_error.is_none());
}

#[tokio::test]
async fn nobody_live_is_a_valid_empty_result() {
    let r = rig(config(RaidPolicy::new(168.0, 2.0), &[("a", 1)]), vec![]);
    let snap = r.scout.refresh(t0()).await.unwrap();
    assert!(snap.ranked.is_empty());
    assert!(snap.suggestion.is_none());
    assert!(!snap.stale);
}

#[tokio::test]
async fn snapshot_live_data_covers_only_candidates() {
    let r = rig(
        config(RaidPolicy::new(168.0, 2.0), &[("a", 1)]),
        vec![
            live("a", Duration::minutes(30), 10),
            live("zz", Duration::minutes(30), 10),
        ],
    );
    let snap = r.scout.refresh(t0()).await.unwrap();
    assert_eq!(snap.live.len(), 1);
    assert_eq!(snap.live[0].login, "a");
}
