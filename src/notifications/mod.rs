//! New high score events and their delivery
//!
//! The update coordinator publishes a [`NewHighScoreEvent`] on the
//! [`EventBus`] whenever a leaderboard rank changes hands. Subscribers decide
//! what to do with it; the [`NotificationManager`] forwards every event to its
//! registered channels.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  UpdateCoordinator   │
//! └──────────┬───────────┘
//!            │ publish
//!            ▼
//! ┌──────────────────────┐
//! │  EventBus (broadcast)│──────▶ other subscribers
//! └──────────┬───────────┘
//!            │ subscribe
//!            ▼
//! ┌──────────────────────┐
//! │ NotificationManager  │
//! └──────────┬───────────┘
//!       ┌────┴─────┐
//!       ▼          ▼
//!  ┌─────────┐ ┌─────────┐
//!  │   Log   │ │ Webhook │
//!  │ Channel │ │ Channel │
//!  └─────────┘ └─────────┘
//! ```

pub mod channels;
mod manager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{HighScore, Machine};

// Re-exports
pub use channels::log::LogChannel;
pub use channels::webhook::{WebhookChannel, WebhookConfig};
pub use channels::{Channel, ChannelError, DeliveryStatus};
pub use manager::NotificationManager;

/// Event type name carried by every new high score event
pub const EVENT_NEW_HIGH_SCORE: &str = "stern_insider_connected_new_high_score";

/// Default number of events buffered per subscriber
const DEFAULT_BUS_CAPACITY: usize = 64;

/// A leaderboard rank that changed hands since the previous poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHighScoreEvent {
    /// Unique event identifier
    pub id: String,
    /// Always [`EVENT_NEW_HIGH_SCORE`]
    pub event_type: String,
    pub machine_id: String,
    pub machine_name: String,
    pub score: u64,
    pub rank: u32,
    pub player_name: String,
    pub player_username: String,
    pub player_initials: String,
    /// True when the rank held a different entry on the previous poll
    pub is_new_entry: bool,
    pub fired_at: DateTime<Utc>,
}

impl NewHighScoreEvent {
    /// Build the event for `score` on `machine`
    pub fn new(machine: &Machine, score: &HighScore) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: EVENT_NEW_HIGH_SCORE.to_string(),
            machine_id: machine.machine_id.clone(),
            machine_name: machine.name.clone(),
            score: score.score,
            rank: score.rank,
            player_name: score.player_name.clone(),
            player_username: score.player_username.clone(),
            player_initials: score.player_initials.clone(),
            is_new_entry: true,
            fired_at: Utc::now(),
        }
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} scored {} on {} (rank {})",
            self.player_name, self.score, self.machine_name, self.rank
        )
    }
}

/// In-process fan-out of new high score events
///
/// Cloning the bus yields another handle onto the same channel. Publishing
/// with no subscribers is not an error; the event is simply dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<NewHighScoreEvent>,
}

impl EventBus {
    /// Create a bus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: NewHighScoreEvent) -> usize {
        tracing::debug!(
            event_type = %event.event_type,
            machine_id = %event.machine_id,
            rank = event.rank,
            "Publishing event"
        );
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<NewHighScoreEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
