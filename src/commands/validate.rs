use anyhow::{bail, Context, Result};

use stern_insider::api::InsiderClient;
use stern_insider::config::Config;

/// Check the configured credentials against the API
pub async fn validate(config: Config) -> Result<()> {
    let mut client = InsiderClient::new(config.credentials.clone(), &config.api)
        .context("Failed to create API client")?;

    let valid = client
        .check_credentials()
        .await
        .context("Cannot connect to the Stern Insider API")?;

    if !valid {
        bail!("Invalid username or password for {}", config.credentials.username);
    }

    if let Some(token) = client.token() {
        println!(
            "Credentials valid for {} (token expires {})",
            client.username(),
            token.expires_at().format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}
