//! Config entry lifecycle
//!
//! An [`InsiderEntry`] owns everything one account needs: the coordinator,
//! its sensors, the refresh scheduler and the notification manager. Setup
//! runs a first refresh before anything is spawned, so a bad password or an
//! unreachable API is reported to the caller instead of failing later in the
//! background.
//!
//! Rejected credentials stop the scheduler, whichever path hit them. The next
//! successful manual refresh starts it again.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::{InsiderApi, InsiderClient};
use crate::config::{Config, ConfigError};
use crate::coordinator::{CycleReport, Snapshot, UpdateCoordinator, UpdateError};
use crate::models::Team;
use crate::notifications::{EventBus, NewHighScoreEvent, NotificationManager};
use crate::scheduler::{EntryState, RefreshScheduler, RefreshStatus, SharedCoordinator};
use crate::sensor::{build_sensors, HighScoreSensor};

/// Why an entry could not be set up
#[derive(Error, Debug)]
pub enum SetupError {
    /// Credentials were rejected; the user has to re-authenticate
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The service could not be reached; setup may be retried later
    #[error("Not ready: {0}")]
    NotReady(String),

    /// The entry's configuration is unusable
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl SetupError {
    /// Check whether retrying setup later may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotReady(_))
    }
}

impl From<UpdateError> for SetupError {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::AuthRequired(msg) => Self::AuthFailed(msg),
            UpdateError::UpdateFailed(msg) => Self::NotReady(msg),
        }
    }
}

/// Scheduler task and the signal that stops it
struct Poller {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    fn is_running(&self) -> bool {
        !*self.stop.borrow() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    async fn halt(&mut self) {
        self.stop.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Scheduler task ended abnormally");
            }
        }
    }
}

/// A running config entry
pub struct InsiderEntry<A = InsiderClient> {
    entry_id: String,
    config: Config,
    coordinator: SharedCoordinator<A>,
    snapshot: watch::Receiver<Arc<Snapshot>>,
    events: EventBus,
    sensors: Vec<HighScoreSensor>,
    status: Arc<RwLock<RefreshStatus>>,
    poller: Mutex<Poller>,
    stop: watch::Sender<bool>,
    notifier: JoinHandle<()>,
}

impl InsiderEntry<InsiderClient> {
    /// Set up an entry against the real API
    pub async fn setup(config: Config) -> Result<Self, SetupError> {
        config.validate()?;
        let client = InsiderClient::new(config.credentials.clone(), &config.api)
            .map_err(|e| SetupError::NotReady(e.to_string()))?;
        Self::setup_with_api(config, client).await
    }

    /// Unload and set up again, e.g. after the poll interval changed
    pub async fn reload(self, config: Config) -> Result<Self, SetupError> {
        tracing::info!(entry_id = %self.entry_id, "Reloading entry");
        self.unload().await;
        Self::setup(config).await
    }
}

impl<A: InsiderApi + 'static> InsiderEntry<A> {
    /// Set up an entry on top of any API implementation
    ///
    /// # Errors
    ///
    /// - `SetupError::AuthFailed` if the first refresh is rejected
    /// - `SetupError::NotReady` if the first refresh fails for any other reason
    pub async fn setup_with_api(config: Config, api: A) -> Result<Self, SetupError> {
        config.validate()?;

        let notifications = NotificationManager::from_config(&config.notifications)
            .map_err(|e| ConfigError::InvalidValue {
                field: "notifications".to_string(),
                reason: e.to_string(),
            })?;

        let events = EventBus::default();
        let mut coordinator = UpdateCoordinator::new(api, events.clone());

        let report = coordinator
            .refresh_within(config.polling.cycle_timeout())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "First refresh failed");
                SetupError::from(e)
            })?;

        let snapshot = coordinator.subscribe();
        let sensors = build_sensors(&coordinator.snapshot(), &snapshot);

        let mut status = RefreshStatus::default();
        status.record_success(&report);
        let status = Arc::new(RwLock::new(status));

        let coordinator = Arc::new(Mutex::new(coordinator));
        let (stop, stop_rx) = watch::channel(false);
        let notifier = notifications.spawn(events.subscribe(), stop_rx);
        let poller = Self::spawn_poller(&coordinator, &status, &config);

        let entry_id = Uuid::new_v4().to_string();
        tracing::info!(
            entry_id = %entry_id,
            username = %config.credentials.username,
            machines = report.machines,
            sensors = sensors.len(),
            "Entry set up"
        );

        Ok(Self {
            entry_id,
            config,
            coordinator,
            snapshot,
            events,
            sensors,
            status,
            poller: Mutex::new(poller),
            stop,
            notifier,
        })
    }

    fn spawn_poller(
        coordinator: &SharedCoordinator<A>,
        status: &Arc<RwLock<RefreshStatus>>,
        config: &Config,
    ) -> Poller {
        let (stop, stop_rx) = watch::channel(false);
        let scheduler =
            RefreshScheduler::new(Arc::clone(coordinator), Arc::clone(status), &config.polling);
        Poller {
            stop,
            task: Some(scheduler.spawn(stop_rx)),
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    /// Account key, one entry per account
    pub fn unique_id(&self) -> String {
        self.config.credentials.unique_id()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sensors created at setup, five per machine
    pub fn sensors(&self) -> &[HighScoreSensor] {
        &self.sensors
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.borrow().clone()
    }

    /// Receiver woken on every published snapshot
    pub fn subscribe_snapshots(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot.clone()
    }

    /// Receiver for new high score events
    pub fn subscribe_events(&self) -> broadcast::Receiver<NewHighScoreEvent> {
        self.events.subscribe()
    }

    /// Copy of the current refresh status
    pub async fn status(&self) -> RefreshStatus {
        self.status.read().await.clone()
    }

    /// Whether the scheduler is still polling
    pub async fn is_polling(&self) -> bool {
        self.poller.lock().await.is_running()
    }

    /// Run a cycle now, outside the schedule
    ///
    /// Rejected credentials stop scheduled polling; a successful cycle
    /// restarts it if it had stopped.
    pub async fn refresh_now(&self) -> Result<CycleReport, UpdateError> {
        let result = {
            let mut coordinator = self.coordinator.lock().await;
            coordinator
                .refresh_within(self.config.polling.cycle_timeout())
                .await
        };

        let loaded = {
            let mut status = self.status.write().await;
            match &result {
                Ok(report) => status.record_success(report),
                Err(e) => status.record_failure(e),
            }
            status.state == EntryState::Loaded
        };

        let mut poller = self.poller.lock().await;
        match &result {
            Err(e) if !e.is_recoverable() => {
                if poller.is_running() {
                    tracing::warn!(
                        entry_id = %self.entry_id,
                        "Credentials rejected, stopping scheduled polling"
                    );
                }
                poller.halt().await;
            }
            Ok(_) if loaded && !poller.is_running() => {
                tracing::info!(
                    entry_id = %self.entry_id,
                    "Refresh succeeded, resuming scheduled polling"
                );
                poller.halt().await;
                *poller = Self::spawn_poller(&self.coordinator, &self.status, &self.config);
            }
            _ => {}
        }

        result
    }

    /// Teams of the account
    pub async fn fetch_teams(&self) -> Result<Vec<Team>, UpdateError> {
        self.coordinator.lock().await.fetch_teams().await
    }

    /// Stop background tasks and tear the entry down
    pub async fn unload(self) -> RefreshStatus {
        self.poller.lock().await.halt().await;

        self.stop.send_replace(true);
        if let Err(e) = self.notifier.await {
            tracing::warn!(error = %e, "Notification task ended abnormally");
        }

        let mut status = self.status.write().await;
        status.state = EntryState::NotLoaded;
        tracing::info!(entry_id = %self.entry_id, "Entry unloaded");
        status.clone()
    }
}
