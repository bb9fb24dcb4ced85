use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PowerToolsEvent {
    /// Single-line human-readable progress or result.
    Status { message: String, timestamp: i64 },
    /// Clicks credited for completed deletions.
    ClicksSaved { added: u64, total: u64, timestamp: i64 },
    /// The saved-clicks total crossed the review threshold.
    ReviewMilestone { name: String, total: u64, timestamp: i64 },
}

/// Fan-out channel for [`PowerToolsEvent`]s.
///
/// Emitting never fails: with no subscribers the event is only logged.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<PowerToolsEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PowerToolsEvent> {
        self.tx.subscribe()
    }

    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.emit(PowerToolsEvent::Status {
            message,
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
    }

    pub fn emit(&self, event: PowerToolsEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("No event subscribers: event={:?}", e.0);
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
