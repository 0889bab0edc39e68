use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

/// One-time metrics registration (so series show up on /metrics before first use).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("raid_scout_refresh_total", "Ranking passes started.");
        describe_counter!(
            "raid_scout_refresh_errors_total",
            "Ranking passes aborted by auth/telemetry errors."
        );
        describe_counter!(
            "raid_scout_raids_recorded_total",
            "Raids written to the cooldown store."
        );
        describe_gauge!(
            "raid_scout_live_candidates",
            "Live channels from the watch-list in the latest ranking."
        );
    });
}

impl Metrics {
    /// Install the Prometheus recorder. Only one recorder can exist per process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
