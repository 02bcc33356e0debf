//! holo-bridge server
//!
//! Usage: `holo-bridge [settings.yaml]`
//!
//! Without a settings file the bridge listens on `0.0.0.0:10000` with the
//! tracking and event outlets. Logging follows `RUST_LOG` (default `info`);
//! `RUST_LOG=holo_bridge=debug` also prints every published sample.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use holo_bridge::restart::supervise;
use holo_bridge::{Bridge, BridgeMetrics, BridgeSettings, InletMap, Outlet, OutletMap};

fn load_settings() -> Result<BridgeSettings> {
    match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading settings from {}", path);
            BridgeSettings::load(&path).with_context(|| format!("failed to load settings from {}", path))
        }
        None => {
            info!("Using default settings");
            Ok(BridgeSettings::default())
        }
    }
}

/// Log every sample an outlet publishes.
fn spawn_tap(outlet: &Arc<Outlet>) {
    let mut consumer = outlet.subscribe();
    tokio::spawn(async move {
        while let Some(batch) = consumer.pull().await {
            for sample in batch {
                debug!(outlet = %sample.stream_name, timestamp = sample.timestamp, value = %sample.value, "Sample");
            }
        }
        if consumer.lagged() > 0 {
            warn!(outlet = consumer.outlet_name(), lagged = consumer.lagged(), "Sample tap fell behind");
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings()?;

    // Outlets and inlets live for the whole process; restarts reuse them
    let outlets = settings.build_outlets();
    let inlets = settings.build_inlets();
    let metrics = Arc::new(BridgeMetrics::new());

    let bridge = Bridge::from_settings(&settings, OutletMap::from_outlets(&outlets), InletMap::from_channels(&inlets))
        .context("invalid bridge settings")?
        .with_metrics(Arc::clone(&metrics));
    let bridge = Arc::new(bridge);

    for outlet in &outlets {
        info!(outlet = outlet.key(), display_name = %outlet.info().name, "Outlet ready");
        spawn_tap(outlet);
    }
    info!(address = %bridge.address(), policy = ?bridge.policy(), "Bridge server starting");

    let stop = CancellationToken::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown requested");
                    stop.cancel();
                }
                Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
            }
        });
    }

    let failures = supervise(settings.restart, stop.clone(), &metrics, || {
        let bridge = Arc::clone(&bridge);
        let stop = stop.clone();
        async move { bridge.run_until(stop).await }
    })
    .await;

    for outlet in &outlets {
        outlet.close();
        if outlet.overflow() > 0 {
            warn!(outlet = outlet.key(), evicted = outlet.overflow(), "Outlet dropped samples to overflow");
        }
    }
    info!(restarts = failures, metrics = ?metrics.snapshot(), "Bridge server stopped");
    Ok(())
}
