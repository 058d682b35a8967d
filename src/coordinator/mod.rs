//! Update coordinator: one poll cycle against the Insider API
//!
//! A cycle fetches the machine list, then each machine's leaderboard, diffs
//! the result against the previous cycle and publishes the new snapshot.
//!
//! ```text
//! Idle ──▶ FetchingMachines ──▶ FetchingScores ──▶ Diffing ──▶ Published
//!              │                     │
//!              │ error               │ per-machine error:
//!              ▼                     │ keep stale scores, continue
//!       UpdateError                  ▼
//! ```
//!
//! Results are built in locals and committed in one step at the end, so a
//! failed or cancelled cycle leaves the snapshot, the score history and the
//! event bus untouched.

pub mod diff;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;

use crate::api::{ApiError, InsiderApi};
use crate::metrics;
use crate::models::{Machine, Team};
use crate::notifications::EventBus;

pub use diff::{detect_new_scores, rank_map, RankMap, ScoreHistory};

/// Machines keyed by machine id
pub type Snapshot = BTreeMap<String, Machine>;

/// Why a cycle did not publish
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// Credentials were rejected; polling must stop until re-authentication
    #[error("Authentication failed - please re-authenticate: {0}")]
    AuthRequired(String),

    /// Transient failure; the next scheduled cycle may succeed
    #[error("Update failed: {0}")]
    UpdateFailed(String),
}

impl UpdateError {
    /// Check whether polling should simply continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UpdateFailed(_))
    }
}

impl From<ApiError> for UpdateError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Authentication(msg) => Self::AuthRequired(msg),
            ApiError::Connection(msg) => {
                Self::UpdateFailed(format!("Failed to connect to Stern API: {msg}"))
            }
            ApiError::Api(msg) => Self::UpdateFailed(format!("Error fetching data: {msg}")),
        }
    }
}

/// Where a cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Idle,
    FetchingMachines,
    FetchingScores,
    Diffing,
    Published,
}

impl CycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FetchingMachines => "fetching_machines",
            Self::FetchingScores => "fetching_scores",
            Self::Diffing => "diffing",
            Self::Published => "published",
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Summary of a published cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub machines: usize,
    /// Machines whose leaderboard could not be fetched this cycle
    pub stale_machines: Vec<String>,
    pub new_high_scores: usize,
    pub completed_at: DateTime<Utc>,
}

/// Owns the authoritative snapshot for one config entry
pub struct UpdateCoordinator<A> {
    api: A,
    events: EventBus,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    history: ScoreHistory,
    stage: CycleStage,
    last_success: Option<DateTime<Utc>>,
}

impl<A: InsiderApi> UpdateCoordinator<A> {
    /// Create a coordinator with an empty snapshot
    pub fn new(api: A, events: EventBus) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::new()));
        Self {
            api,
            events,
            snapshot_tx,
            history: ScoreHistory::new(),
            stage: CycleStage::Idle,
            last_success: None,
        }
    }

    /// Receiver that is woken on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot_tx.borrow().clone()
    }

    pub fn stage(&self) -> CycleStage {
        self.stage
    }

    /// When the last cycle was published
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    /// Event bus new high scores are published on
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    /// Teams of the account, fetched outside the poll cycle
    pub async fn fetch_teams(&mut self) -> Result<Vec<Team>, UpdateError> {
        self.api.fetch_teams().await.map_err(UpdateError::from)
    }

    /// Run one cycle, giving up after `deadline`
    ///
    /// An elapsed deadline is a recoverable failure and publishes nothing.
    pub async fn refresh_within(&mut self, deadline: Duration) -> Result<CycleReport, UpdateError> {
        match tokio::time::timeout(deadline, self.refresh()).await {
            Ok(result) => result,
            Err(_) => {
                self.set_stage(CycleStage::Idle);
                metrics::record_cycle("timeout", deadline.as_secs_f64());
                tracing::warn!(deadline_secs = deadline.as_secs(), "Update cycle timed out");
                Err(UpdateError::UpdateFailed(format!(
                    "Update cycle timed out after {}s",
                    deadline.as_secs()
                )))
            }
        }
    }

    /// Run one cycle and publish its result
    pub async fn refresh(&mut self) -> Result<CycleReport, UpdateError> {
        let started = Instant::now();
        let result = self.run_cycle().await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(report) => {
                metrics::record_cycle("success", elapsed);
                tracing::info!(
                    machines = report.machines,
                    stale = report.stale_machines.len(),
                    new_high_scores = report.new_high_scores,
                    elapsed_secs = elapsed,
                    "Update cycle published"
                );
            }
            Err(e) => {
                self.set_stage(CycleStage::Idle);
                let outcome = match e {
                    UpdateError::AuthRequired(_) => "auth_required",
                    UpdateError::UpdateFailed(_) => "update_failed",
                };
                metrics::record_cycle(outcome, elapsed);
                tracing::error!(error = %e, "Update cycle failed");
            }
        }

        result
    }

    async fn run_cycle(&mut self) -> Result<CycleReport, UpdateError> {
        self.set_stage(CycleStage::FetchingMachines);
        let machines = self.api.fetch_machines().await?;

        self.set_stage(CycleStage::FetchingScores);
        let previous = self.snapshot();
        let mut snapshot = Snapshot::new();
        let mut stale_machines = Vec::new();

        for mut machine in machines {
            match self.api.fetch_high_scores(&machine.machine_id).await {
                Ok(scores) => machine.high_scores = scores,
                Err(e) => {
                    tracing::warn!(
                        machine_id = %machine.machine_id,
                        machine = %machine.name,
                        error = %e,
                        "Failed to fetch high scores"
                    );
                    metrics::record_score_fetch_failure(&machine.machine_id);
                    if let Some(known) = previous.get(&machine.machine_id) {
                        machine.high_scores = known.high_scores.clone();
                    }
                    stale_machines.push(machine.machine_id.clone());
                }
            }
            snapshot.insert(machine.machine_id.clone(), machine);
        }

        self.set_stage(CycleStage::Diffing);
        let mut history = ScoreHistory::new();
        let mut events = Vec::new();

        for (machine_id, machine) in &snapshot {
            if stale_machines.contains(machine_id) {
                if let Some(known) = self.history.get(machine_id) {
                    history.insert(machine_id.clone(), known.clone());
                }
                continue;
            }

            events.extend(detect_new_scores(&self.history, machine));
            history.insert(machine_id.clone(), rank_map(machine));
        }

        // commit
        let report = CycleReport {
            machines: snapshot.len(),
            stale_machines,
            new_high_scores: events.len(),
            completed_at: Utc::now(),
        };

        self.history = history;
        metrics::set_machine_count(snapshot.len());
        self.snapshot_tx.send_replace(Arc::new(snapshot));
        for event in events {
            tracing::info!(
                machine = %event.machine_name,
                rank = event.rank,
                score = event.score,
                player = %event.player_name,
                "New high score detected"
            );
            metrics::record_new_high_score(&event.machine_id);
            self.events.publish(event);
        }
        self.last_success = Some(report.completed_at);
        self.set_stage(CycleStage::Published);

        Ok(report)
    }

    fn set_stage(&mut self, stage: CycleStage) {
        if self.stage != stage {
            tracing::debug!(from = %self.stage, to = %stage, "Cycle stage");
            self.stage = stage;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResult;
    use crate::models::HighScore;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};

    /// Scripted API: each call pops the next queued answer
    #[derive(Default)]
    struct FakeApi {
        machines: VecDeque<ApiResult<Vec<Machine>>>,
        scores: HashMap<String, VecDeque<ApiResult<Vec<HighScore>>>>,
        teams: Vec<Team>,
        /// Delay before each score fetch answers
        score_delay: Option<Duration>,
    }

    impl FakeApi {
        fn push_machines(&mut self, result: ApiResult<Vec<Machine>>) {
            self.machines.push_back(result);
        }

        fn push_scores(&mut self, machine_id: &str, result: ApiResult<Vec<HighScore>>) {
            self.scores
                .entry(machine_id.to_string())
                .or_default()
                .push_back(result);
        }
    }

    #[async_trait]
    impl InsiderApi for FakeApi {
        async fn fetch_machines(&mut self) -> ApiResult<Vec<Machine>> {
            self.machines
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::api("no scripted machines")))
        }

        async fn fetch_high_scores(&mut self, machine_id: &str) -> ApiResult<Vec<HighScore>> {
            if let Some(delay) = self.score_delay {
                tokio::time::sleep(delay).await;
            }
            self.scores
                .get_mut(machine_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Err(ApiError::api("no scripted scores")))
        }

        async fn fetch_teams(&mut self) -> ApiResult<Vec<Team>> {
            Ok(self.teams.clone())
        }
    }

    fn machine(id: &str) -> Machine {
        Machine::new(id, format!("Machine {id}"), "Godzilla")
    }

    fn score(rank: u32, score_id: &str, value: u64) -> HighScore {
        HighScore {
            score_id: score_id.to_string(),
            rank,
            score: value,
            player_name: format!("Player {score_id}"),
            player_username: score_id.to_lowercase(),
            player_initials: score_id.to_string(),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn test_first_cycle_publishes_without_events() {
        let mut api = FakeApi::default();
        api.push_machines(Ok(vec![machine("m1")]));
        api.push_scores("m1", Ok(vec![score(1, "A", 500)]));

        let bus = EventBus::new(8);
        let mut events = bus.subscribe();
        let mut coordinator = UpdateCoordinator::new(api, bus);

        let report = coordinator.refresh().await.unwrap();

        assert_eq!(report.machines, 1);
        assert_eq!(report.new_high_scores, 0);
        assert_eq!(coordinator.stage(), CycleStage::Published);
        assert_eq!(coordinator.snapshot()["m1"].high_scores[0].score, 500);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_changed_rank_emits_exactly_one_event() {
        let mut api = FakeApi::default();
        api.push_machines(Ok(vec![machine("m1")]));
        api.push_scores("m1", Ok(vec![score(1, "A", 500)]));
        api.push_machines(Ok(vec![machine("m1")]));
        api.push_scores("m1", Ok(vec![score(1, "B", 900)]));

        let bus = EventBus::new(8);
        let mut events = bus.subscribe();
        let mut coordinator = UpdateCoordinator::new(api, bus);

        coordinator.refresh().await.unwrap();
        let report = coordinator.refresh().await.unwrap();

        assert_eq!(report.new_high_scores, 1);
        let event = events.try_recv().unwrap();
        assert_eq!(event.machine_id, "m1");
        assert_eq!(event.score, 900);
        assert_eq!(event.player_name, "Player B");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_one_machine_failure_does_not_block_others() {
        let mut api = FakeApi::default();
        api.push_machines(Ok(vec![machine("m1"), machine("m2")]));
        api.push_scores("m1", Err(ApiError::connection("timeout")));
        api.push_scores("m2", Ok(vec![score(1, "X", 10)]));

        let mut coordinator = UpdateCoordinator::new(api, EventBus::default());
        let report = coordinator.refresh().await.unwrap();

        assert_eq!(report.stale_machines, vec!["m1".to_string()]);
        let snapshot = coordinator.snapshot();
        assert!(snapshot["m1"].high_scores.is_empty());
        assert_eq!(snapshot["m2"].high_scores.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_machine_keeps_stale_scores_and_history() {
        let mut api = FakeApi::default();
        api.push_machines(Ok(vec![machine("m1")]));
        api.push_scores("m1", Ok(vec![score(1, "A", 500)]));
        api.push_machines(Ok(vec![machine("m1")]));
        api.push_scores("m1", Err(ApiError::api("boom")));
        api.push_machines(Ok(vec![machine("m1")]));
        api.push_scores("m1", Ok(vec![score(1, "B", 700)]));

        let bus = EventBus::new(8);
        let mut events = bus.subscribe();
        let mut coordinator = UpdateCoordinator::new(api, bus);

        coordinator.refresh().await.unwrap();
        coordinator.refresh().await.unwrap();
        assert_eq!(coordinator.snapshot()["m1"].high_scores[0].score_id, "A");
        assert!(events.try_recv().is_err());

        // history survived the failed cycle, so the change is still noticed
        let report = coordinator.refresh().await.unwrap();
        assert_eq!(report.new_high_scores, 1);
        assert_eq!(events.try_recv().unwrap().score, 700);
    }

    #[tokio::test]
    async fn test_auth_failure_maps_to_auth_required() {
        let mut api = FakeApi::default();
        api.push_machines(Err(ApiError::authentication("Invalid username or password")));

        let mut coordinator = UpdateCoordinator::new(api, EventBus::default());
        let err = coordinator.refresh().await.unwrap_err();

        assert!(matches!(err, UpdateError::AuthRequired(_)));
        assert!(!err.is_recoverable());
        assert_eq!(coordinator.stage(), CycleStage::Idle);
    }

    #[tokio::test]
    async fn test_connection_failure_keeps_previous_snapshot() {
        let mut api = FakeApi::default();
        api.push_machines(Ok(vec![machine("m1")]));
        api.push_scores("m1", Ok(vec![score(1, "A", 500)]));
        api.push_machines(Err(ApiError::connection("refused")));

        let mut coordinator = UpdateCoordinator::new(api, EventBus::default());
        let mut rx = coordinator.subscribe();

        coordinator.refresh().await.unwrap();
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        let err = coordinator.refresh().await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("Failed to connect"));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(coordinator.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_deadline_elapsed_publishes_nothing() {
        let mut api = FakeApi::default();
        api.push_machines(Ok(vec![machine("m1")]));
        api.push_scores("m1", Ok(vec![score(1, "A", 500)]));
        api.push_machines(Ok(vec![machine("m1")]));
        api.push_scores("m1", Ok(vec![score(1, "B", 900)]));

        let bus = EventBus::new(8);
        let mut events = bus.subscribe();
        let mut coordinator = UpdateCoordinator::new(api, bus);
        let mut rx = coordinator.subscribe();

        coordinator.refresh().await.unwrap();
        let _ = rx.borrow_and_update();
        let published_at = coordinator.last_success();

        coordinator.api_mut().score_delay = Some(Duration::from_millis(500));
        let err = coordinator
            .refresh_within(Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, UpdateError::UpdateFailed(_)));
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("timed out"));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(coordinator.stage(), CycleStage::Idle);
        assert_eq!(coordinator.snapshot()["m1"].high_scores[0].score_id, "A");
        assert_eq!(coordinator.last_success(), published_at);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_removed_machine_disappears() {
        let mut api = FakeApi::default();
        api.push_machines(Ok(vec![machine("m1"), machine("m2")]));
        api.push_scores("m1", Ok(vec![]));
        api.push_scores("m2", Ok(vec![]));
        api.push_machines(Ok(vec![machine("m2")]));
        api.push_scores("m2", Ok(vec![]));

        let mut coordinator = UpdateCoordinator::new(api, EventBus::default());
        coordinator.refresh().await.unwrap();
        coordinator.refresh().await.unwrap();

        let snapshot = coordinator.snapshot();
        assert!(!snapshot.contains_key("m1"));
        assert!(snapshot.contains_key("m2"));
    }

    #[tokio::test]
    async fn test_fetch_teams_passthrough() {
        let mut api = FakeApi::default();
        api.teams = vec![Team {
            team_id: "t1".to_string(),
            name: "Arcade".to_string(),
            members: vec![],
        }];

        let mut coordinator = UpdateCoordinator::new(api, EventBus::default());
        let teams = coordinator.fetch_teams().await.unwrap();
        assert_eq!(teams[0].name, "Arcade");
    }

    #[test]
    fn test_update_error_from_api_error() {
        assert!(matches!(
            UpdateError::from(ApiError::authentication("x")),
            UpdateError::AuthRequired(_)
        ));
        assert!(matches!(
            UpdateError::from(ApiError::api("x")),
            UpdateError::UpdateFailed(_)
        ));
    }
}
