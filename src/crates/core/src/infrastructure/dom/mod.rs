//! Host DOM contract
//!
//! The deletion engine never owns the page it operates on. Everything it needs
//! from the host is expressed by [`HostDom`]: selector queries, capability-checked
//! traversal (children / shadow content / slotted content), a handful of layout
//! reads, clicks, scrolling, and a subtree-insertion feed.
//!
//! Node handles are plain [`NodeId`] values. They may go stale at any suspension
//! point, so callers re-query instead of caching them across awaits.

pub mod memory;
pub mod selector;

pub use memory::{ClickHandler, MemoryDom};

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Opaque handle to a node owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

pub type DomResult<T> = Result<T, DomError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("{0} is detached from the document")]
    Detached(NodeId),

    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("{0} is not an element")]
    NotAnElement(NodeId),

    #[error("cannot insert {0} there")]
    HierarchyRequest(NodeId),
}

/// One "subtree inserted" notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Parent the nodes were inserted under.
    pub target: NodeId,
    pub added: Vec<NodeId>,
}

/// Unbounded stream of insertion records for one observed subtree.
///
/// Dropping the feed disconnects the observer. Subscribing again starts a fresh
/// feed; records emitted while nobody was subscribed are not replayed.
pub struct MutationFeed {
    inner: UnboundedReceiverStream<MutationRecord>,
}

impl MutationFeed {
    pub fn new(rx: mpsc::UnboundedReceiver<MutationRecord>) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(rx),
        }
    }

    /// An already-finished feed (for hosts without mutation observation).
    pub fn closed() -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        Self::new(rx)
    }
}

impl Stream for MutationFeed {
    type Item = MutationRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Live document of the host application.
///
/// Traversal is capability-checked: a node may or may not expose element
/// children, a shadow root, or slot-assigned content, and callers branch on the
/// `Option` rather than on node types.
pub trait HostDom: Send + Sync {
    fn document(&self) -> NodeId;

    /// Whether native selector queries can run against `node`.
    fn is_queryable(&self, node: NodeId) -> bool;

    /// First descendant of `scope` (document order, light tree only) matching `selector`.
    fn query_selector(&self, scope: NodeId, selector: &str) -> DomResult<Option<NodeId>>;

    fn query_selector_all(&self, scope: NodeId, selector: &str) -> DomResult<Vec<NodeId>>;

    fn matches(&self, node: NodeId, selector: &str) -> DomResult<bool>;

    /// Element children, if the node supports child enumeration.
    fn children(&self, node: NodeId) -> Option<Vec<NodeId>>;

    /// Attached shadow root, if any.
    fn shadow_root(&self, node: NodeId) -> Option<NodeId>;

    /// Slot-assigned elements, if the node is a slot.
    fn assigned_elements(&self, node: NodeId) -> Option<Vec<NodeId>>;

    /// Lower-case tag name for elements.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> DomResult<()>;

    fn text_content(&self, node: NodeId) -> String;

    /// Rendered text, one line per text block.
    fn inner_text(&self, node: NodeId) -> String;

    /// Layout offset from the top of the offset parent.
    fn offset_top(&self, node: NodeId) -> f64;

    fn next_element_sibling(&self, node: NodeId) -> Option<NodeId>;

    fn is_connected(&self, node: NodeId) -> bool;

    fn click(&self, node: NodeId) -> DomResult<()>;

    fn scroll_top(&self, node: NodeId) -> f64;

    /// Instant (non-animated) scroll-to-top request. The host may ignore it.
    fn scroll_to_top(&self, node: NodeId) -> DomResult<()>;

    fn scroll_by(&self, node: NodeId, dy: f64) -> DomResult<()>;

    /// Creates a detached element.
    fn create_element(&self, tag: &str) -> NodeId;

    fn append_child(&self, parent: NodeId, child: NodeId) -> DomResult<()>;

    /// Subtree-insertion feed rooted at `target`.
    fn subscribe(&self, target: NodeId) -> MutationFeed;

    fn body(&self) -> NodeId {
        let document = self.document();
        self.query_selector(document, "body")
            .ok()
            .flatten()
            .unwrap_or(document)
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    fn toggle_class(&self, node: NodeId, class: &str, on: bool) -> DomResult<()> {
        let current = self.attribute(node, "class").unwrap_or_default();
        let mut classes: Vec<&str> = current.split_whitespace().filter(|c| *c != class).collect();
        if on {
            classes.push(class);
        }
        self.set_attribute(node, "class", &classes.join(" "))
    }
}
