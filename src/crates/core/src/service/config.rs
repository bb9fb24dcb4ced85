//! PowerTools configuration
//!
//! Host selector contracts, interaction timings, and storage keys. Every field
//! has a default so partial TOML files are accepted.

use crate::util::errors::{PowerToolsError, PowerToolsResult};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerToolsConfig {
    pub selectors: HostSelectors,
    pub timing: TimingConfig,
    pub storage: StorageConfig,
}

/// CSS selector contracts of the host chat application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSelectors {
    pub chat_turn: String,
    pub chat_session: String,
    pub scroll_area: String,
    pub options_wrapper: String,
    pub menu_button: String,
    pub menu: String,
    pub menu_item: String,
    pub dialog: String,
    pub dialog_button: String,
    pub user_role: String,
    pub image_chunk: String,
    pub file_chunk: String,
    pub stop_generating: String,
    pub turn_timestamp: String,
    /// Action bar candidates, tried in order.
    pub action_bars: Vec<String>,
    /// Text of the native delete menu item (substring match).
    pub delete_label: String,
    /// Text of the confirmation dialog button (exact match after trim).
    pub confirm_label: String,
    pub turn_id_attribute: String,
    pub timestamp_attribute: String,
    /// Marker set on turns that already carry injected controls.
    pub injected_marker: String,
}

impl Default for HostSelectors {
    fn default() -> Self {
        Self {
            chat_turn: "ms-chat-turn".to_string(),
            chat_session: "ms-chat-session".to_string(),
            scroll_area: "ms-autoscroll-container".to_string(),
            options_wrapper: "ms-chat-turn-options".to_string(),
            menu_button: r#"button[aria-label="Open options"]"#.to_string(),
            menu: r#"div[role="menu"]"#.to_string(),
            menu_item: "button.mat-mdc-menu-item, .mat-mdc-menu-item".to_string(),
            dialog: r#"mat-dialog-container, [role="dialog"], .cdk-overlay-pane"#.to_string(),
            dialog_button: "button".to_string(),
            user_role: r#"[data-turn-role="User"]"#.to_string(),
            image_chunk: "ms-image-chunk".to_string(),
            file_chunk: "ms-file-chunk, ms-media-preview".to_string(),
            stop_generating: r#"button[aria-label="Stop generating"], button[aria-label="Cancel"], button[aria-label="Stop"]"#
                .to_string(),
            turn_timestamp: "[data-turn-timestamp]".to_string(),
            action_bars: vec![
                ".actions-container .actions".to_string(),
                ".turn-actions".to_string(),
                r#"[class*="actions"]"#.to_string(),
                ".actions".to_string(),
            ],
            delete_label: "Delete".to_string(),
            confirm_label: "Delete".to_string(),
            turn_id_attribute: "data-turn-id".to_string(),
            timestamp_attribute: "data-turn-timestamp".to_string(),
            injected_marker: "data-boundary-injected".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wall-clock budget for one deletion run.
    pub max_delete_duration_ms: u64,
    pub poll_interval_ms: u64,
    pub menu_wait_ms: u64,
    pub menu_settle_ms: u64,
    pub confirm_settle_ms: u64,
    pub ranged_success_delay_ms: u64,
    pub ranged_failure_delay_ms: u64,
    pub bulk_success_delay_ms: u64,
    pub bulk_failure_delay_ms: u64,
    pub scroll_attempts: u32,
    pub scroll_settle_delay_ms: u64,
    pub scroll_poll_ms: u64,
    pub scroll_settle_timeout_ms: u64,
    pub scroll_stable_polls: u32,
    pub scroll_nudge_px: f64,
    pub max_locate_depth: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            max_delete_duration_ms: 300_000,
            poll_interval_ms: 100,
            menu_wait_ms: 2_000,
            menu_settle_ms: 400,
            confirm_settle_ms: 300,
            ranged_success_delay_ms: 500,
            ranged_failure_delay_ms: 1_000,
            bulk_success_delay_ms: 800,
            bulk_failure_delay_ms: 500,
            scroll_attempts: 3,
            scroll_settle_delay_ms: 300,
            scroll_poll_ms: 200,
            scroll_settle_timeout_ms: 5_000,
            scroll_stable_polls: 3,
            scroll_nudge_px: 100.0,
            max_locate_depth: 50,
        }
    }
}

impl TimingConfig {
    pub fn max_delete_duration(&self) -> Duration {
        Duration::from_millis(self.max_delete_duration_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn menu_wait(&self) -> Duration {
        Duration::from_millis(self.menu_wait_ms)
    }

    pub fn scroll_settle_timeout(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub boundaries_key: String,
    pub clicks_saved_key: String,
    pub clicks_per_deletion: u64,
    /// Saved-clicks total above which the review milestone fires.
    pub review_threshold: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            boundaries_key: "powertools_boundaries".to_string(),
            clicks_saved_key: "stats_clicks_saved".to_string(),
            clicks_per_deletion: 2,
            review_threshold: 100,
        }
    }
}

impl PowerToolsConfig {
    pub fn from_toml_str(raw: &str) -> PowerToolsResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| PowerToolsError::config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> PowerToolsResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Config file not found, using defaults: path={}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn to_toml_string(&self) -> PowerToolsResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PowerToolsError::config(format!("Failed to serialize config: {}", e)))
    }

    pub fn validate(&self) -> PowerToolsResult<()> {
        if self.timing.poll_interval_ms == 0 {
            return Err(PowerToolsError::config("timing.poll_interval_ms must be > 0"));
        }
        if self.timing.scroll_poll_ms == 0 {
            return Err(PowerToolsError::config("timing.scroll_poll_ms must be > 0"));
        }
        if self.timing.max_delete_duration_ms == 0 {
            return Err(PowerToolsError::config("timing.max_delete_duration_ms must be > 0"));
        }
        if self.timing.scroll_attempts == 0 {
            return Err(PowerToolsError::config("timing.scroll_attempts must be > 0"));
        }
        if self.selectors.chat_turn.trim().is_empty() {
            return Err(PowerToolsError::config("selectors.chat_turn must not be empty"));
        }
        Ok(())
    }
}
