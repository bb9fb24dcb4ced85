use crate::infrastructure::dom::{HostDom, NodeId};
use crate::service::config::HostSelectors;
use crate::util::hash::{hash_code, hash_code_units};
use serde::{Deserialize, Serialize};
use std::fmt;

const HASHED_TEXT_UNITS: usize = 50;

/// Best-effort key for a conversation turn.
///
/// Stable across re-renders of the same turn in the common case; not
/// guaranteed unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnIdentity(String);

impl TurnIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TurnIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TurnIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Strategy for deriving a [`TurnIdentity`] from a rendered turn.
pub trait TurnIdentityResolver: Send + Sync {
    fn identity_of(&self, dom: &dyn HostDom, turn: NodeId) -> TurnIdentity;
}

/// Explicit identity attribute, then element id, then a composite of
/// text hash, layout offset and nested timestamp.
#[derive(Debug, Clone)]
pub struct TieredIdentity {
    id_attribute: String,
    timestamp_selector: String,
    timestamp_attribute: String,
}

impl TieredIdentity {
    pub fn new(selectors: &HostSelectors) -> Self {
        Self {
            id_attribute: selectors.turn_id_attribute.clone(),
            timestamp_selector: selectors.turn_timestamp.clone(),
            timestamp_attribute: selectors.timestamp_attribute.clone(),
        }
    }

    fn composite(&self, dom: &dyn HostDom, turn: NodeId) -> String {
        let text = dom.inner_text(turn);
        let prefix: Vec<u16> = text.encode_utf16().take(HASHED_TEXT_UNITS).collect();
        let hash = if prefix.is_empty() {
            hash_code("unknown")
        } else {
            hash_code_units(&prefix)
        };

        let timestamp = dom
            .query_selector(turn, &self.timestamp_selector)
            .ok()
            .flatten()
            .and_then(|node| dom.attribute(node, &self.timestamp_attribute))
            .unwrap_or_default();

        format!(
            "turn_{}_{}_{}",
            hash,
            format_offset(dom.offset_top(turn)),
            timestamp
        )
    }
}

impl Default for TieredIdentity {
    fn default() -> Self {
        Self::new(&HostSelectors::default())
    }
}

impl TurnIdentityResolver for TieredIdentity {
    fn identity_of(&self, dom: &dyn HostDom, turn: NodeId) -> TurnIdentity {
        if let Some(explicit) = dom.attribute(turn, &self.id_attribute).filter(|v| !v.is_empty()) {
            return TurnIdentity(explicit);
        }
        if let Some(id) = dom.attribute(turn, "id").filter(|v| !v.is_empty()) {
            return TurnIdentity(id);
        }
        TurnIdentity(self.composite(dom, turn))
    }
}

/// Integral offsets print without a fractional part.
fn format_offset(offset: f64) -> String {
    if !offset.is_finite() {
        return "0".to_string();
    }
    if offset.fract() == 0.0 {
        format!("{}", offset as i64)
    } else {
        format!("{}", offset)
    }
}
