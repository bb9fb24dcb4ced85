use crate::util::errors::PowerToolsError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which user-authored turns a filtered bulk deletion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkKind {
    /// No image and no file attachment.
    Text,
    Image,
    File,
}

impl BulkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
        }
    }

    /// Whether a user turn with the given attachment markers is a target.
    pub fn accepts(&self, has_image: bool, has_file: bool) -> bool {
        match self {
            Self::Text => !has_image && !has_file,
            Self::Image => has_image,
            Self::File => has_file,
        }
    }
}

impl fmt::Display for BulkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkKind {
    type Err = PowerToolsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "image" | "img" => Ok(Self::Image),
            "file" => Ok(Self::File),
            other => Err(PowerToolsError::config(format!("Unknown bulk kind: {}", other))),
        }
    }
}

/// What a deletion session was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Ranged,
    Bulk(BulkKind),
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ranged => f.write_str("ranged"),
            Self::Bulk(kind) => write!(f, "bulk:{}", kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
}

/// Terminal state of one deletion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionOutcome {
    Completed,
    /// The wall-clock budget ran out.
    TimedOut,
    /// Cancelled through `stop()`.
    Stopped,
    Failed(String),
    /// The user declined the confirmation prompt. Nothing ran.
    Declined,
}

impl DeletionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub outcome: DeletionOutcome,
    /// Turns removed through the native delete flow.
    pub deleted: usize,
    /// Turns the run set out to delete. For bulk runs this is the largest
    /// number of targets known at any point of the run.
    pub eligible: usize,
}

/// Yes/no confirmation shown before a ranged deletion.
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;
}

/// Answers every prompt the same way (CLI `--yes`, tests).
#[derive(Debug, Clone, Copy)]
pub struct StaticConfirm(pub bool);

#[async_trait]
impl ConfirmPrompt for StaticConfirm {
    async fn confirm(&self, message: &str) -> bool {
        log::debug!("Auto-answering prompt: message={}, answer={}", message, self.0);
        self.0
    }
}
