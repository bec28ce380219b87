mod scenario;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use safeflame::dispatch::{AlertDispatcher, AlertLog, AlertSink, FallbackAdvisor, LogSink, DEFAULT_ADVICE_TIMEOUT};
use safeflame::{overlay, EngineConfig, HazardEngine};
use safeflame_dashboard::{start_server, AlertBus, KitchenHandle, ServerConfig};
use scenario::Scenario;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Replays a recorded kitchen session through the hazard engine.
#[derive(Parser, Debug)]
#[command(name = "safeflame_monitor", version, about)]
struct Cli {
    /// Scenario file: zones plus per-tick detections and optional frame images.
    #[arg(long)]
    scenario: PathBuf,

    /// Engine config file (partial JSON over the defaults).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the short demo timers. Ignored when --config is given.
    #[arg(long)]
    demo: bool,

    /// Write an annotated PNG per tick into this directory.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,

    /// Serve the dashboard on this address and keep running after the replay.
    #[arg(long)]
    serve: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("safeflame=info,safeflame_monitor=info")))
        .init();

    // --- 1. Argument Parsing & Setup ---
    let cli = Cli::parse();
    let config = match (&cli.config, cli.demo) {
        (Some(path), _) => EngineConfig::from_json_file(path).with_context(|| format!("loading config {}", path.display()))?,
        (None, true) => EngineConfig::demo(),
        (None, false) => EngineConfig::default(),
    };
    let scenario = Scenario::load(&cli.scenario)?;
    info!(zones = scenario.zones.len(), ticks = scenario.ticks.len(), "scenario loaded");

    if let Some(dir) = &cli.overlay_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    // --- 2. Engine & Delivery Initialization ---
    let engine = HazardEngine::with_zones(config, scenario.zones.clone())?;
    let log = AlertLog::default();
    let bus = AlertBus::new(64);
    let replay_clock = Arc::new(AtomicU64::new(0f64.to_bits()));
    let handle = {
        let clock = replay_clock.clone();
        KitchenHandle::new(engine, log.clone(), bus.clone()).with_clock(move || f64::from_bits(clock.load(Ordering::Relaxed)))
    };

    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogSink), Arc::new(log.clone())];
    let server = match &cli.serve {
        Some(addr) => {
            sinks.push(Arc::new(bus.clone()));
            Some(start_server(handle.clone(), ServerConfig { bind_addr: addr.clone() }).await?)
        }
        None => None,
    };
    let dispatcher = AlertDispatcher::spawn(Arc::new(FallbackAdvisor), sinks, DEFAULT_ADVICE_TIMEOUT);

    // --- 3. Main Processing Loop ---
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for (index, tick) in scenario.ticks.iter().enumerate() {
        let frame = scenario.frame_for(tick)?;
        replay_clock.store(tick.timestamp.to_bits(), Ordering::Relaxed);

        let (report, zones) = {
            let mut engine = handle.engine.lock().await;
            let report = engine.tick(&frame, &tick.detections, tick.timestamp);
            (report, engine.zones().to_vec())
        };

        for alert in &report.alerts {
            *counts.entry(format!("{}/{}", alert.kind(), alert.severity)).or_default() += 1;
        }

        if let Some(dir) = &cli.overlay_dir {
            let path = dir.join(format!("tick_{index:05}.png"));
            if let Err(e) = overlay::save_png(&path, &overlay::annotate(&frame, &report.facts, &zones)) {
                warn!("failed to write overlay {}: {e}", path.display());
            }
        }

        dispatcher.dispatch(report.alerts);
    }

    // --- 4. Summary ---
    dispatcher.shutdown().await;
    let total: usize = counts.values().sum();
    info!(total, "replay finished");
    for (kind, count) in &counts {
        info!("  {kind}: {count}");
    }

    if let Some(server) = server {
        info!("dashboard still running, press Ctrl-C to stop");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = server => {}
        }
    }
    Ok(())
}
