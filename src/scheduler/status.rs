//! Refresh bookkeeping shared between the scheduler and its owner

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::coordinator::{CycleReport, UpdateError};

/// Lifecycle state of a config entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Set up and polling
    Loaded,
    /// Credentials were rejected; polling has stopped
    ReauthRequired,
    /// Torn down
    NotLoaded,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::ReauthRequired => "reauth_required",
            Self::NotLoaded => "not_loaded",
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome history of scheduled refreshes
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub state: EntryState,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub total_cycles: u64,
}

impl Default for RefreshStatus {
    fn default() -> Self {
        Self {
            state: EntryState::Loaded,
            last_attempt: None,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
            total_cycles: 0,
        }
    }
}

impl RefreshStatus {
    /// Record a published cycle; a reauth-required entry is loaded again
    pub fn record_success(&mut self, report: &CycleReport) {
        if self.state != EntryState::NotLoaded {
            self.state = EntryState::Loaded;
        }
        self.last_attempt = Some(report.completed_at);
        self.last_success = Some(report.completed_at);
        self.last_error = None;
        self.consecutive_failures = 0;
        self.total_cycles += 1;
    }

    /// Record a failed cycle; an auth failure moves the entry to reauth
    pub fn record_failure(&mut self, error: &UpdateError) {
        self.last_attempt = Some(Utc::now());
        self.last_error = Some(error.to_string());
        self.consecutive_failures += 1;
        self.total_cycles += 1;

        if !error.is_recoverable() {
            self.state = EntryState::ReauthRequired;
        }
    }

    /// Whether the last attempt succeeded
    pub fn last_update_success(&self) -> bool {
        self.total_cycles > 0 && self.consecutive_failures == 0
    }
}
