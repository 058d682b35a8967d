use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use stern_insider::config::Config;
use stern_insider::entry::InsiderEntry;
use stern_insider::scheduler::EntryState;
use stern_insider::sensor::HighScoreSensor;

/// Set up the entry and poll until Ctrl-C or until credentials are rejected
pub async fn run(config: Config, metrics_file: Option<PathBuf>) -> Result<()> {
    if let Err(e) = stern_insider::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let entry = InsiderEntry::setup(config).await.context("Entry setup failed")?;

    println!(
        "Polling {} machines every {} minutes ({} sensors). Press Ctrl-C to stop.",
        entry.snapshot().len(),
        entry.config().polling.scan_interval_minutes,
        entry.sensors().len()
    );
    log_sensor_states(entry.sensors());

    let mut snapshots = entry.subscribe_snapshots();
    let mut events = entry.subscribe_events();
    let mut status_check = tokio::time::interval(Duration::from_secs(60));

    let reauth_required = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "Failed to wait for Ctrl-C");
                }
                println!("\nShutdown signal received, stopping...");
                break false;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break false;
                }
                log_sensor_states(entry.sensors());
            }
            received = events.recv() => match received {
                Ok(event) => println!("New high score: {}", event.summary()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Missed new high score events");
                }
                Err(RecvError::Closed) => break false,
            },
            _ = status_check.tick() => {
                export_metrics(metrics_file.as_deref()).await;
                if entry.status().await.state == EntryState::ReauthRequired {
                    break true;
                }
            }
        }
    };

    let status = entry.unload().await;
    export_metrics(metrics_file.as_deref()).await;
    tracing::info!(
        cycles = status.total_cycles,
        last_success = ?status.last_success,
        "Entry stopped"
    );

    if reauth_required {
        bail!(
            "Credentials were rejected: {}",
            status.last_error.unwrap_or_default()
        );
    }
    Ok(())
}

fn log_sensor_states(sensors: &[HighScoreSensor]) {
    for sensor in sensors {
        let value = sensor.native_value();
        let player = sensor
            .attributes()
            .and_then(|a| a.player)
            .map(|p| p.player_initials);

        tracing::debug!(
            unique_id = %sensor.unique_id(),
            name = sensor.name(),
            value = ?value,
            player = ?player,
            "Sensor state"
        );
    }
}

async fn export_metrics(path: Option<&Path>) {
    let Some(path) = path else {
        return;
    };

    if let Err(e) = stern_insider::metrics::write_metrics_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to write metrics file");
    }
}
