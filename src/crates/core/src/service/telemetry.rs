//! Clicks-saved telemetry
//!
//! Every completed deletion spares the user the menu and confirm clicks. The
//! running total is persisted and reported through the event channel.

use crate::infrastructure::events::{EventEmitter, PowerToolsEvent};
use crate::infrastructure::storage::KeyValueStore;
use crate::service::config::StorageConfig;
use crate::util::errors::PowerToolsResult;
use log::{debug, warn};
use std::sync::Arc;

pub const REVIEW_MILESTONE: &str = "milestone_100_clicks";

pub struct ClicksSavedTracker {
    store: Arc<dyn KeyValueStore>,
    events: EventEmitter,
    key: String,
    clicks_per_deletion: u64,
    review_threshold: u64,
}

impl ClicksSavedTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, events: EventEmitter, config: &StorageConfig) -> Self {
        Self {
            store,
            events,
            key: config.clicks_saved_key.clone(),
            clicks_per_deletion: config.clicks_per_deletion,
            review_threshold: config.review_threshold,
        }
    }

    /// Persisted total, zero when missing or unreadable.
    pub async fn total(&self) -> u64 {
        match self.store.get(&self.key).await {
            Ok(value) => value.and_then(|v| v.as_u64()).unwrap_or(0),
            Err(e) => {
                warn!("Failed to read clicks saved: key={}, error={}", self.key, e);
                0
            }
        }
    }

    /// Credits `deletions` completed deletions and returns the new total.
    pub async fn credit(&self, deletions: usize) -> u64 {
        if deletions == 0 {
            return self.total().await;
        }
        let added = deletions as u64 * self.clicks_per_deletion;
        let previous = self.total().await;
        let total = previous.saturating_add(added);

        if let Err(e) = self.persist(total).await {
            warn!("Failed to persist clicks saved: key={}, error={}", self.key, e);
        }
        debug!("Clicks saved credited: added={}, total={}", added, total);

        let timestamp = chrono::Utc::now().timestamp_millis();
        self.events.emit(PowerToolsEvent::ClicksSaved {
            added,
            total,
            timestamp,
        });
        if previous <= self.review_threshold && total > self.review_threshold {
            self.events.emit(PowerToolsEvent::ReviewMilestone {
                name: REVIEW_MILESTONE.to_string(),
                total,
                timestamp,
            });
        }
        total
    }

    async fn persist(&self, total: u64) -> PowerToolsResult<()> {
        self.store.set(&self.key, serde_json::Value::from(total)).await
    }
}
