//! Notification manager that forwards bus events to channels

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::channels::webhook::{WebhookChannel, WebhookConfig};
use super::channels::{Channel, ChannelResult, DeliveryStatus};
use super::channels::log::LogChannel;
use super::NewHighScoreEvent;
use crate::config::NotificationConfig;

/// Forwards every event to all registered channels
#[derive(Default)]
pub struct NotificationManager {
    channels: Vec<Box<dyn Channel>>,
}

impl NotificationManager {
    /// Create a manager with no channels
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Build the channel set described by the notification settings
    ///
    /// The log channel is always present; a webhook is added when a URL is
    /// configured.
    pub fn from_config(config: &NotificationConfig) -> ChannelResult<Self> {
        let mut manager = Self::new();
        manager.add_channel(Box::new(LogChannel::new()));

        if let Some(url) = &config.webhook_url {
            let mut webhook = WebhookConfig::new(url.clone());
            if let Some(token) = &config.webhook_auth_token {
                webhook = webhook.with_auth_token(token.clone());
            }
            manager.add_channel(Box::new(WebhookChannel::new(webhook)?));
        }

        Ok(manager)
    }

    /// Add a notification channel
    pub fn add_channel(&mut self, channel: Box<dyn Channel>) {
        self.channels.push(channel);
    }

    /// Names of the registered channels
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send one event to every channel
    ///
    /// A failing channel does not stop delivery to the others.
    pub async fn dispatch(&self, event: &NewHighScoreEvent) -> Vec<DeliveryStatus> {
        let mut statuses = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            match channel.send(event).await {
                Ok(status) => statuses.push(status),
                Err(e) => {
                    tracing::error!(channel = channel.name(), error = %e, "Failed to send event");
                    statuses.push(DeliveryStatus::failure(channel.name(), e.to_string()));
                }
            }
        }

        statuses
    }

    /// Consume events until the bus closes or `stop` flips to true
    pub async fn run(
        self,
        mut events: broadcast::Receiver<NewHighScoreEvent>,
        mut stop: watch::Receiver<bool>,
    ) {
        tracing::debug!(channels = ?self.channel_names(), "Notification manager started");

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        self.dispatch(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Notification manager lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Notification manager stopped");
    }

    /// Run the manager on its own task
    pub fn spawn(
        self,
        events: broadcast::Receiver<NewHighScoreEvent>,
        stop: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, stop))
    }
}
