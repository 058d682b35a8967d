//! stern-insider - Stern Insider Connected leaderboard poller
//!
//! Polls the Stern Insider Connected cloud service for the pinball machines an
//! account owns, their top-five leaderboards and the account's teams, and
//! exposes the results as per-rank sensors.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`] - Machines, high scores and teams
//! - [`api`] - HTTP client with token refresh and tolerant response parsing
//! - [`coordinator`] - One poll cycle: fetch, diff, publish
//! - [`sensor`] - Per-machine, per-rank presentation of the snapshot
//! - [`scheduler`] - Periodic refresh and refresh status
//! - [`notifications`] - New high score events and their delivery channels
//! - [`entry`] - Lifecycle of one configured account
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus counters
//!
//! # Example
//!
//! ```no_run
//! use stern_insider::config::Config;
//! use stern_insider::entry::InsiderEntry;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let entry = InsiderEntry::setup(config).await?;
//!     for sensor in entry.sensors() {
//!         println!("{} {}: {:?}", sensor.machine_id(), sensor.name(), sensor.native_value());
//!     }
//!     entry.unload().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod coordinator;
pub mod entry;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod scheduler;
pub mod sensor;

/// Integration domain, used in device identifiers
pub const DOMAIN: &str = "stern_insider_connected";

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{ApiError, InsiderApi, InsiderClient};
    pub use crate::config::{Config, Credentials};
    pub use crate::coordinator::{Snapshot, UpdateCoordinator, UpdateError};
    pub use crate::entry::{InsiderEntry, SetupError};
    pub use crate::models::{HighScore, Machine, Team, TeamMember};
    pub use crate::notifications::{EventBus, NewHighScoreEvent};
    pub use crate::sensor::HighScoreSensor;
}

// Direct re-exports for convenience
pub use models::{HighScore, Machine, Team, TeamMember};
