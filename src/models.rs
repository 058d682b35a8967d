//! Core data structures for the Stern Insider poller

use serde::{Deserialize, Serialize};

/// Number of leaderboard entries kept per machine
pub const HIGH_SCORE_COUNT: usize = 5;

/// A single leaderboard entry on a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighScore {
    pub score_id: String,
    pub rank: u32, // 1-based, 1 is the grand champion
    pub score: u64,
    pub player_name: String,
    pub player_username: String,
    pub player_initials: String,
    pub avatar_url: Option<String>,
}

/// A pinball machine owned by the authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Machine {
    pub machine_id: String,
    pub name: String,
    pub game_title: String,
    pub image_url: Option<String>,
    pub square_logo_url: Option<String>,
    pub variable_width_logo_url: Option<String>,
    pub backglass_image_url: Option<String>,
    pub background_image_url: Option<String>,
    pub gradient_start: Option<String>,
    pub gradient_stop: Option<String>,

    /// Top scores ordered by ascending rank, at most [`HIGH_SCORE_COUNT`]
    #[serde(default)]
    pub high_scores: Vec<HighScore>,
}

impl Machine {
    /// Create a machine with no artwork and no scores
    pub fn new(
        machine_id: impl Into<String>,
        name: impl Into<String>,
        game_title: impl Into<String>,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            name: name.into(),
            game_title: game_title.into(),
            ..Default::default()
        }
    }

    /// Look up the score holding `rank`
    pub fn score_at(&self, rank: u32) -> Option<&HighScore> {
        self.high_scores.iter().find(|s| s.rank == rank)
    }
}

/// A member of a team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// A team (or venue) the user belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}
