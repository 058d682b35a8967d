//! Channel that writes events to the tracing log

use async_trait::async_trait;

use super::{Channel, ChannelResult, DeliveryStatus};
use crate::notifications::NewHighScoreEvent;

/// Logs every event at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogChannel;

impl LogChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Channel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, event: &NewHighScoreEvent) -> ChannelResult<DeliveryStatus> {
        tracing::info!(
            event_type = %event.event_type,
            machine_id = %event.machine_id,
            machine_name = %event.machine_name,
            rank = event.rank,
            score = event.score,
            player = %event.player_name,
            "New high score detected"
        );
        Ok(DeliveryStatus::success(self.name()))
    }
}
