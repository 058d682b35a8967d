use anyhow::{Context, Result};

use stern_insider::api::InsiderClient;
use stern_insider::config::Config;
use stern_insider::coordinator::UpdateCoordinator;
use stern_insider::notifications::EventBus;

fn coordinator(config: &Config) -> Result<UpdateCoordinator<InsiderClient>> {
    let client = InsiderClient::new(config.credentials.clone(), &config.api)
        .context("Failed to create API client")?;
    Ok(UpdateCoordinator::new(client, EventBus::default()))
}

/// Run one poll cycle and print the snapshot as JSON
pub async fn snapshot(config: Config, pretty: bool) -> Result<()> {
    let mut coordinator = coordinator(&config)?;

    let report = coordinator
        .refresh_within(config.polling.cycle_timeout())
        .await
        .context("Update cycle failed")?;

    if !report.stale_machines.is_empty() {
        tracing::warn!(machines = ?report.stale_machines, "Some leaderboards could not be fetched");
    }

    let snapshot = coordinator.snapshot();
    let json = if pretty {
        serde_json::to_string_pretty(&*snapshot)?
    } else {
        serde_json::to_string(&*snapshot)?
    };
    println!("{json}");
    Ok(())
}

/// Print the account's teams as JSON
pub async fn teams(config: Config, pretty: bool) -> Result<()> {
    let mut coordinator = coordinator(&config)?;

    let teams = coordinator.fetch_teams().await.context("Failed to fetch teams")?;

    let json = if pretty {
        serde_json::to_string_pretty(&teams)?
    } else {
        serde_json::to_string(&teams)?
    };
    println!("{json}");
    Ok(())
}
