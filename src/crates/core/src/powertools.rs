//! PowerTools facade
//!
//! Wires the orchestrator, the injector and the boundary store onto one host
//! document and routes user actions to them.

use crate::deletion::injector::{ACTIVE_CLASS, BOUNDARY_BUTTON_CLASS};
use crate::deletion::{
    BulkKind, ConfirmPrompt, ControlRegistry, DeletionOrchestrator, DeletionReport, TurnControl,
    TurnInjector,
};
use crate::infrastructure::dom::{HostDom, NodeId};
use crate::infrastructure::events::EventEmitter;
use crate::infrastructure::storage::KeyValueStore;
use crate::service::boundary::{BoundaryStore, TieredIdentity, TurnIdentityResolver};
use crate::service::config::PowerToolsConfig;
use crate::service::telemetry::ClicksSavedTracker;
use crate::util::errors::PowerToolsResult;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Actions offered by the sidebar panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SidebarAction {
    BulkDelete(BulkKind),
    ClearBoundaries,
    Stop,
}

/// Result of a click routed through [`PowerTools::handle_click`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    /// New boundary state of the turn.
    BoundaryToggled(bool),
    Deletion(DeletionReport),
    /// The node is not an injected control.
    Ignored,
}

pub struct PowerTools {
    dom: Arc<dyn HostDom>,
    config: PowerToolsConfig,
    events: EventEmitter,
    boundaries: BoundaryStore,
    identity: Arc<dyn TurnIdentityResolver>,
    registry: Arc<ControlRegistry>,
    orchestrator: Arc<DeletionOrchestrator>,
    injector: Arc<TurnInjector>,
    injector_cancel: Mutex<Option<CancellationToken>>,
}

impl PowerTools {
    pub fn new(
        dom: Arc<dyn HostDom>,
        store: Arc<dyn KeyValueStore>,
        prompt: Arc<dyn ConfirmPrompt>,
        config: PowerToolsConfig,
    ) -> PowerToolsResult<Self> {
        config.validate()?;

        let events = EventEmitter::new();
        let boundaries = BoundaryStore::new(store.clone(), config.storage.boundaries_key.clone());
        let identity: Arc<dyn TurnIdentityResolver> = Arc::new(TieredIdentity::new(&config.selectors));
        let registry = Arc::new(ControlRegistry::new());
        let telemetry = Arc::new(ClicksSavedTracker::new(store, events.clone(), &config.storage));

        let orchestrator = DeletionOrchestrator::new(
            dom.clone(),
            &config,
            boundaries.clone(),
            prompt,
            events.clone(),
            telemetry,
        )
        .with_identity_resolver(identity.clone());
        let injector = TurnInjector::new(
            dom.clone(),
            config.selectors.clone(),
            boundaries.clone(),
            registry.clone(),
        )
        .with_identity_resolver(identity.clone());

        Ok(Self {
            dom,
            config,
            events,
            boundaries,
            identity,
            registry,
            orchestrator: Arc::new(orchestrator),
            injector: Arc::new(injector),
            injector_cancel: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PowerToolsConfig {
        &self.config
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn boundaries(&self) -> &BoundaryStore {
        &self.boundaries
    }

    pub fn registry(&self) -> &Arc<ControlRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Arc<DeletionOrchestrator> {
        &self.orchestrator
    }

    pub fn injector(&self) -> &Arc<TurnInjector> {
        &self.injector
    }

    /// Subscribes to turn insertions and spawns the injector. A previously
    /// started injector is shut down first.
    pub fn start_injector(&self) -> JoinHandle<()> {
        let cancel = CancellationToken::new();
        if let Some(previous) = self
            .injector_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(cancel.clone())
        {
            previous.cancel();
        }

        let target = self.injector.observe_target();
        let feed = self.dom.subscribe(target);
        debug!("Turn observer attached: target={}", target);

        let injector = self.injector.clone();
        tokio::spawn(async move {
            injector.run(feed, cancel).await;
        })
    }

    pub fn stop_injector(&self) {
        if let Some(cancel) = self
            .injector_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            cancel.cancel();
        }
    }

    /// Toggles the boundary flag of `turn` and syncs its rendered control.
    pub async fn toggle_boundary(&self, turn: NodeId) -> bool {
        let identity = self.identity.identity_of(self.dom.as_ref(), turn);
        let active = self.boundaries.toggle(&identity).await;
        for button in self.registry.buttons_for(turn, TurnControl::ToggleBoundary) {
            self.set_active(button, active);
        }
        active
    }

    /// Routes a click on an injected control.
    pub async fn handle_click(&self, node: NodeId) -> PowerToolsResult<ControlOutcome> {
        let Some(binding) = self.registry.get(node) else {
            return Ok(ControlOutcome::Ignored);
        };
        if !self.dom.is_connected(node) || !self.dom.is_connected(binding.turn) {
            debug!("Ignoring click on detached control: button={}, turn={}", node, binding.turn);
            self.injector.prune_detached();
            return Ok(ControlOutcome::Ignored);
        }

        match binding.control {
            TurnControl::ToggleBoundary => {
                let active = self.boundaries.toggle(&binding.identity).await;
                self.set_active(node, active);
                Ok(ControlOutcome::BoundaryToggled(active))
            }
            TurnControl::DeleteBelow => {
                let report = self.orchestrator.delete_from(binding.turn).await;
                self.injector.prune_detached();
                Ok(ControlOutcome::Deletion(report?))
            }
        }
    }

    pub async fn handle_action(&self, action: SidebarAction) -> PowerToolsResult<Option<DeletionReport>> {
        match action {
            SidebarAction::BulkDelete(kind) => {
                let report = self.orchestrator.bulk_delete(kind).await;
                self.injector.prune_detached();
                report.map(Some)
            }
            SidebarAction::ClearBoundaries => {
                self.clear_boundaries().await;
                Ok(None)
            }
            SidebarAction::Stop => {
                if !self.orchestrator.stop() {
                    debug!("Stop requested with no deletion running");
                }
                Ok(None)
            }
        }
    }

    /// Clears every flag and resets all rendered boundary controls.
    pub async fn clear_boundaries(&self) {
        self.boundaries.clear_all().await;
        self.injector.prune_detached();

        let selector = format!(".{}", BOUNDARY_BUTTON_CLASS);
        let rendered = self
            .dom
            .query_selector_all(self.dom.document(), &selector)
            .unwrap_or_default();
        let registered = self.registry.buttons_of(TurnControl::ToggleBoundary);
        for button in rendered.into_iter().chain(registered) {
            self.set_active(button, false);
        }
        self.events.status("All boundary flags cleared");
    }

    fn set_active(&self, button: NodeId, active: bool) {
        if let Err(e) = self.dom.toggle_class(button, ACTIVE_CLASS, active) {
            debug!("Failed to update control state: button={}, error={}", button, e);
        }
    }
}

impl Drop for PowerTools {
    fn drop(&mut self) {
        self.stop_injector();
    }
}
