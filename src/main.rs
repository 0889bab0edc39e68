//! raid-scout binary entrypoint
//!
//! `raid-scout serve`        operator HTTP API with periodic refresh (default)
//! `raid-scout once`         one refresh, print the ranking and the suggestion
//! `raid-scout mark <login>` refresh, then record a raid on `<login>`
//! `raid-scout reset [login]` forget one channel's cooldown, or all of them

use anyhow::{bail, Context};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use raid_scout::cooldown::{CooldownStore, FileCooldownStore};
use raid_scout::metrics::Metrics;
use raid_scout::ranking::RankedEntry;
use raid_scout::telemetry::HelixTelemetry;
use raid_scout::{api, LiveChannelStatus, RaidScout, ScoutConfig};

const ENV_ADDR: &str = "RAID_SCOUT_ADDR";
const ENV_REFRESH_SECS: &str = "RAID_SCOUT_REFRESH_SECS";
const DEFAULT_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_REFRESH_SECS: u64 = 60;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("raid_scout=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; harmless when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cmd = args.first().map(String::as_str).unwrap_or("serve");

    let store = Arc::new(FileCooldownStore::new(FileCooldownStore::resolve_path(None)));

    if cmd == "reset" {
        return reset(store.as_ref(), args.get(1).map(String::as_str));
    }

    let config_path = ScoutConfig::resolve_path(None);
    let config = ScoutConfig::load_from(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    let telemetry = Arc::new(HelixTelemetry::from_credentials(config.require_credentials()?)?);
    info!(
        channels = config.channels.len(),
        state = %store.path().display(),
        "raid-scout starting"
    );

    let scout = Arc::new(RaidScout::new(config, store, telemetry).with_config_path(config_path));

    match cmd {
        "serve" => serve(scout).await,
        "once" => once(&scout).await,
        "mark" => {
            let Some(login) = args.get(1) else {
                bail!("usage: raid-scout mark <login>");
            };
            scout.refresh(Utc::now()).await?;
            let receipt = scout.mark_raided(login, Utc::now())?;
            println!("Marked {} as raided at {}", receipt.login, receipt.raided_at);
            Ok(())
        }
        other => bail!("unknown command `{other}` (expected serve | once | mark | reset)"),
    }
}

async fn serve(scout: Arc<RaidScout>) -> anyhow::Result<()> {
    let metrics = Metrics::init()?;

    let period = std::env::var(ENV_REFRESH_SECS)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|&s| s > 0)
        .unwrap_or(DEFAULT_REFRESH_SECS);

    let poller = scout.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(period));
        loop {
            ticker.tick().await;
            // Errors are already logged and reflected as a stale snapshot.
            let _ = poller.refresh(Utc::now()).await;
        }
    });

    let addr: SocketAddr = std::env::var(ENV_ADDR)
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
        .context("parsing RAID_SCOUT_ADDR")?;
    let app = api::router(scout).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, refresh_secs = period, "operator API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn once(scout: &RaidScout) -> anyhow::Result<()> {
    let snap = scout.refresh(Utc::now()).await?;
    if snap.ranked.is_empty() {
        warn!("None of the raid targets are live.");
        return Ok(());
    }

    println!("\nCurrently live from list:\n");
    for e in &snap.ranked {
        let status = snap.live.iter().find(|l| l.login == e.login);
        println!("{}", summary_line(e, status));
    }
    println!();

    if let Some(s) = snap.suggestion {
        println!("SUGGESTED RAID TARGET: {}", s.login);
        println!("Command: /raid {}", s.login);
    }
    Ok(())
}

fn reset(store: &dyn CooldownStore, login: Option<&str>) -> anyhow::Result<()> {
    match login {
        Some(l) => {
            if store.forget(l)? {
                println!("Cooldown reset for {l}");
            } else {
                println!("No cooldown recorded for {l}");
            }
        }
        None => {
            store.clear()?;
            println!("All cooldowns reset");
        }
    }
    Ok(())
}

const TITLE_WIDTH: usize = 60;

fn summary_line(e: &RankedEntry, status: Option<&LiveChannelStatus>) -> String {
    let mut flags = Vec::new();
    if e.cooldown {
        flags.push("cooldown");
    }
    if e.long_stream {
        flags.push("long");
    }
    let (game, title) = status
        .map(|s| {
            let title: String = s
                .title
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .chars()
                .take(TITLE_WIDTH)
                .collect();
            (s.game.as_str(), title)
        })
        .unwrap_or(("", String::new()));
    format!(
        "{:<24} p{:<4} {:>6} {:>7}  {:<14} {:<20} {}",
        e.login,
        e.priority,
        format_uptime(e.uptime_hours),
        e.viewers,
        flags.join(","),
        game,
        title
    )
    .trim_end()
    .to_string()
}

fn format_uptime(hours: f64) -> String {
    let total_m = (hours * 60.0).round() as i64;
    format!("{:02}:{:02}", total_m / 60, total_m % 60)
}
