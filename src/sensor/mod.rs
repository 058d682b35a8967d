//! Per-machine, per-rank high score sensors
//!
//! A sensor holds only its machine id, its rank and a receiver on the
//! coordinator's snapshot channel. Every read looks the value up in the
//! latest snapshot, so sensors never go stale and dropping one is all it
//! takes to unregister it.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::coordinator::Snapshot;
use crate::models::{HighScore, Machine, HIGH_SCORE_COUNT};
use crate::DOMAIN;

/// Manufacturer reported for every machine device
pub const MANUFACTURER: &str = "Stern Pinball";

/// Icon shown for every sensor
pub const ICON: &str = "mdi:trophy";

const RANK_NAMES: [&str; HIGH_SCORE_COUNT] = [
    "Grand Champion",
    "High Score #1",
    "High Score #2",
    "High Score #3",
    "High Score #4",
];

/// Display label for a 1-based rank
pub fn rank_name(rank: u32) -> Option<&'static str> {
    let index = usize::try_from(rank).ok()?.checked_sub(1)?;
    RANK_NAMES.get(index).copied()
}

/// How the host should treat the sensor's value over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
}

impl StateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Measurement => "measurement",
        }
    }
}

/// Device a sensor is grouped under, one per machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// (domain, machine id)
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

/// Extra state reported alongside the score
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorAttributes {
    pub rank: u32,
    pub machine_name: String,
    pub machine_id: String,
    pub game_title: String,
    pub square_logo_url: Option<String>,
    pub variable_width_logo_url: Option<String>,
    pub backglass_image_url: Option<String>,
    pub background_image_url: Option<String>,
    pub gradient_start: Option<String>,
    pub gradient_stop: Option<String>,

    /// Present only when the rank is currently held
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerAttributes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerAttributes {
    pub player_name: String,
    pub player_username: String,
    pub player_initials: String,
    pub avatar_url: Option<String>,
}

impl From<&HighScore> for PlayerAttributes {
    fn from(score: &HighScore) -> Self {
        Self {
            player_name: score.player_name.clone(),
            player_username: score.player_username.clone(),
            player_initials: score.player_initials.clone(),
            avatar_url: score.avatar_url.clone(),
        }
    }
}

/// One leaderboard rank of one machine
#[derive(Debug, Clone)]
pub struct HighScoreSensor {
    machine_id: String,
    rank: u32,
    name: &'static str,
    unique_id: String,
    device_info: DeviceInfo,
    snapshot: watch::Receiver<Arc<Snapshot>>,
}

impl HighScoreSensor {
    /// Create the sensor for `rank` (1..=5) of `machine`
    ///
    /// Returns `None` for ranks outside the leaderboard.
    pub fn new(
        machine: &Machine,
        rank: u32,
        snapshot: watch::Receiver<Arc<Snapshot>>,
    ) -> Option<Self> {
        let name = rank_name(rank)?;

        Some(Self {
            machine_id: machine.machine_id.clone(),
            rank,
            name,
            unique_id: format!("{}_high_score_{rank}", machine.machine_id),
            device_info: DeviceInfo {
                identifiers: vec![(DOMAIN.to_string(), machine.machine_id.clone())],
                name: machine.name.clone(),
                manufacturer: MANUFACTURER.to_string(),
                model: machine.game_title.clone(),
            },
            snapshot,
        })
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// Fixed label for the rank, e.g. "Grand Champion"
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn icon(&self) -> &'static str {
        ICON
    }

    pub fn state_class(&self) -> StateClass {
        StateClass::Measurement
    }

    /// Current score at this rank, if the machine and rank exist
    pub fn native_value(&self) -> Option<u64> {
        let snapshot = self.snapshot.borrow();
        snapshot
            .get(&self.machine_id)
            .and_then(|m| m.score_at(self.rank))
            .map(|s| s.score)
    }

    /// Attributes for the current snapshot, `None` once the machine is gone
    pub fn attributes(&self) -> Option<SensorAttributes> {
        let snapshot = self.snapshot.borrow();
        let machine = snapshot.get(&self.machine_id)?;

        Some(SensorAttributes {
            rank: self.rank,
            machine_name: machine.name.clone(),
            machine_id: machine.machine_id.clone(),
            game_title: machine.game_title.clone(),
            square_logo_url: machine.square_logo_url.clone(),
            variable_width_logo_url: machine.variable_width_logo_url.clone(),
            backglass_image_url: machine.backglass_image_url.clone(),
            background_image_url: machine.background_image_url.clone(),
            gradient_start: machine.gradient_start.clone(),
            gradient_stop: machine.gradient_stop.clone(),
            player: machine.score_at(self.rank).map(PlayerAttributes::from),
        })
    }

    /// Whether the machine is still part of the latest snapshot
    pub fn available(&self) -> bool {
        self.snapshot.borrow().contains_key(&self.machine_id)
    }

    /// Wait for the next published snapshot
    ///
    /// Returns `false` once the coordinator is gone and no further update
    /// can arrive.
    pub async fn changed(&mut self) -> bool {
        self.snapshot.changed().await.is_ok()
    }
}

/// Five sensors for every machine in `snapshot`
pub fn build_sensors(
    snapshot: &Snapshot,
    receiver: &watch::Receiver<Arc<Snapshot>>,
) -> Vec<HighScoreSensor> {
    let ranks = 1..=HIGH_SCORE_COUNT as u32;
    snapshot
        .values()
        .flat_map(|machine| {
            ranks
                .clone()
                .filter_map(move |rank| HighScoreSensor::new(machine, rank, receiver.clone()))
        })
        .collect()
}
