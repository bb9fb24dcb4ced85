//! Reactive turn injector
//!
//! Adds the boundary-flag and delete-below controls to every rendered turn,
//! including turns the host inserts later.

use crate::infrastructure::dom::{HostDom, MutationFeed, MutationRecord, NodeId};
use crate::service::boundary::{BoundaryStore, TieredIdentity, TurnIdentity, TurnIdentityResolver};
use crate::service::config::HostSelectors;
use crate::util::errors::PowerToolsResult;
use dashmap::DashMap;
use futures::StreamExt;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

pub const BOUNDARY_BUTTON_CLASS: &str = "delete-boundary-button";
pub const DELETE_BELOW_BUTTON_CLASS: &str = "delete-below-button";
pub const ACTIVE_CLASS: &str = "active";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnControl {
    ToggleBoundary,
    DeleteBelow,
}

/// What an injected button acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBinding {
    pub control: TurnControl,
    pub turn: NodeId,
    /// Identity captured when the control was injected.
    pub identity: TurnIdentity,
}

/// Injected buttons keyed by node.
#[derive(Debug, Default)]
pub struct ControlRegistry {
    bindings: DashMap<NodeId, ControlBinding>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, button: NodeId, binding: ControlBinding) {
        self.bindings.insert(button, binding);
    }

    pub fn get(&self, button: NodeId) -> Option<ControlBinding> {
        self.bindings.get(&button).map(|b| b.clone())
    }

    /// Buttons of one control type bound to `turn`.
    pub fn buttons_for(&self, turn: NodeId, control: TurnControl) -> Vec<NodeId> {
        self.bindings
            .iter()
            .filter(|entry| entry.turn == turn && entry.control == control)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn buttons_of(&self, control: TurnControl) -> Vec<NodeId> {
        self.bindings
            .iter()
            .filter(|entry| entry.control == control)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Drops bindings whose button or turn left the document.
    pub fn prune(&self, dom: &dyn HostDom) -> usize {
        let before = self.bindings.len();
        self.bindings
            .retain(|button, binding| dom.is_connected(*button) && dom.is_connected(binding.turn));
        before.saturating_sub(self.bindings.len())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Removes a turn from the in-flight set when injection ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<NodeId>>,
    turn: NodeId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.turn);
    }
}

pub struct TurnInjector {
    dom: Arc<dyn HostDom>,
    selectors: HostSelectors,
    boundaries: BoundaryStore,
    identity: Arc<dyn TurnIdentityResolver>,
    registry: Arc<ControlRegistry>,
    in_flight: Mutex<HashSet<NodeId>>,
}

impl TurnInjector {
    pub fn new(
        dom: Arc<dyn HostDom>,
        selectors: HostSelectors,
        boundaries: BoundaryStore,
        registry: Arc<ControlRegistry>,
    ) -> Self {
        let identity = Arc::new(TieredIdentity::new(&selectors));
        Self {
            dom,
            selectors,
            boundaries,
            identity,
            registry,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_identity_resolver(mut self, identity: Arc<dyn TurnIdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    pub fn registry(&self) -> &Arc<ControlRegistry> {
        &self.registry
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<NodeId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Injects both controls into `turn` unless it was already handled.
    /// Returns whether controls were added.
    pub async fn process_turn(&self, turn: NodeId) -> bool {
        let dom = self.dom.as_ref();
        let marker = &self.selectors.injected_marker;

        if dom.attribute(turn, marker).as_deref() == Some("true") {
            return false;
        }
        if !self.in_flight().insert(turn) {
            return false;
        }
        let _in_flight = InFlight {
            set: &self.in_flight,
            turn,
        };
        if let Err(e) = dom.set_attribute(turn, marker, "true") {
            debug!("Cannot mark turn: turn={}, error={}", turn, e);
            return false;
        }

        let Some(action_bar) = self.find_action_bar(turn) else {
            debug!("No action bar found for turn, skipping: turn={}", turn);
            return false;
        };

        let identity = self.identity.identity_of(dom, turn);
        let is_boundary = !identity.is_empty() && self.boundaries.load().await.contains(&identity);

        match self.inject(turn, action_bar, identity, is_boundary) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to inject turn controls: turn={}, error={}", turn, e);
                if let Err(e) = dom.set_attribute(turn, marker, "false") {
                    debug!("Cannot reset turn marker: turn={}, error={}", turn, e);
                }
                false
            }
        }
    }

    fn find_action_bar(&self, turn: NodeId) -> Option<NodeId> {
        self.selectors
            .action_bars
            .iter()
            .find_map(|selector| self.dom.query_selector(turn, selector).ok().flatten())
    }

    fn inject(
        &self,
        turn: NodeId,
        action_bar: NodeId,
        identity: TurnIdentity,
        is_boundary: bool,
    ) -> PowerToolsResult<()> {
        let dom = self.dom.as_ref();

        let boundary_button = dom.create_element("button");
        dom.set_attribute(boundary_button, "class", BOUNDARY_BUTTON_CLASS)?;
        dom.toggle_class(boundary_button, ACTIVE_CLASS, is_boundary)?;
        dom.set_attribute(boundary_button, "title", "Stop deletion here (Mark as end point)")?;
        dom.set_attribute(boundary_button, "aria-label", "Toggle boundary flag")?;

        let delete_button = dom.create_element("button");
        dom.set_attribute(delete_button, "class", DELETE_BELOW_BUTTON_CLASS)?;
        dom.set_attribute(delete_button, "title", "Delete from here down (Respects Stop flags)")?;
        dom.set_attribute(delete_button, "aria-label", "Delete below")?;

        self.registry.register(
            boundary_button,
            ControlBinding {
                control: TurnControl::ToggleBoundary,
                turn,
                identity: identity.clone(),
            },
        );
        self.registry.register(
            delete_button,
            ControlBinding {
                control: TurnControl::DeleteBelow,
                turn,
                identity,
            },
        );

        dom.append_child(action_bar, boundary_button)?;
        dom.append_child(action_bar, delete_button)?;
        debug!("Injected turn controls: turn={}, boundary={}", turn, is_boundary);
        Ok(())
    }

    /// Forgets controls of turns the host has removed.
    pub fn prune_detached(&self) -> usize {
        let pruned = self.registry.prune(self.dom.as_ref());
        if pruned > 0 {
            debug!("Pruned detached controls: count={}, remaining={}", pruned, self.registry.len());
        }
        pruned
    }

    /// Processes every turn already rendered. Returns how many received controls.
    pub async fn scan_existing(&self) -> usize {
        self.prune_detached();
        let turns = self
            .dom
            .query_selector_all(self.dom.document(), &self.selectors.chat_turn)
            .unwrap_or_default();
        debug!("Scanning existing turns: count={}", turns.len());

        let mut injected = 0;
        for turn in turns {
            if self.process_turn(turn).await {
                injected += 1;
            }
        }
        injected
    }

    async fn handle_record(&self, record: MutationRecord) {
        self.prune_detached();
        for node in record.added {
            let mut turns = Vec::new();
            if self.dom.matches(node, &self.selectors.chat_turn).unwrap_or(false) {
                turns.push(node);
            }
            if let Ok(nested) = self.dom.query_selector_all(node, &self.selectors.chat_turn) {
                turns.extend(nested);
            }
            for turn in turns {
                self.process_turn(turn).await;
            }
        }
    }

    /// Processes existing turns, then every turn arriving on `feed`, until the
    /// feed closes or `cancel` fires.
    pub async fn run(&self, mut feed: MutationFeed, cancel: CancellationToken) {
        self.scan_existing().await;
        debug!("Turn injector started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Turn injector cancelled");
                    break;
                }
                record = feed.next() => match record {
                    Some(record) => self.handle_record(record).await,
                    None => {
                        debug!("Turn injector feed closed");
                        break;
                    }
                },
            }
        }
    }

    /// Subtree the injector observes: the chat session, or the body when the
    /// session is not rendered yet.
    pub fn observe_target(&self) -> NodeId {
        self.dom
            .query_selector(self.dom.document(), &self.selectors.chat_session)
            .ok()
            .flatten()
            .unwrap_or_else(|| self.dom.body())
    }
}
