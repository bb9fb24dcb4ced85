use super::native::trigger_native_delete;
use super::session::{SessionGuard, SessionSlot};
use super::types::{
    BulkKind, ConfirmPrompt, DeletionOutcome, DeletionReport, RunState, SessionKind,
};
use crate::infrastructure::dom::{HostDom, NodeId};
use crate::infrastructure::events::EventEmitter;
use crate::service::boundary::{BoundaryStore, TieredIdentity, TurnIdentityResolver};
use crate::service::config::{HostSelectors, PowerToolsConfig, TimingConfig};
use crate::service::locator::{await_settled, find_deep_with_depth, force_to_top, is_model_generating};
use crate::service::telemetry::ClicksSavedTracker;
use crate::util::errors::{PowerToolsError, PowerToolsResult};
use log::{debug, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

/// Runs ranged and filtered bulk deletions against the host transcript.
///
/// Deletions go through the host's own delete flow one turn at a time. Only
/// one run may be active; see [`SessionSlot`].
pub struct DeletionOrchestrator {
    dom: Arc<dyn HostDom>,
    selectors: HostSelectors,
    timing: TimingConfig,
    boundaries: BoundaryStore,
    identity: Arc<dyn TurnIdentityResolver>,
    prompt: Arc<dyn ConfirmPrompt>,
    events: EventEmitter,
    telemetry: Arc<ClicksSavedTracker>,
    slot: SessionSlot,
    last_outcome: Mutex<Option<DeletionOutcome>>,
}

impl DeletionOrchestrator {
    pub fn new(
        dom: Arc<dyn HostDom>,
        config: &PowerToolsConfig,
        boundaries: BoundaryStore,
        prompt: Arc<dyn ConfirmPrompt>,
        events: EventEmitter,
        telemetry: Arc<ClicksSavedTracker>,
    ) -> Self {
        Self {
            dom,
            selectors: config.selectors.clone(),
            timing: config.timing.clone(),
            boundaries,
            identity: Arc::new(TieredIdentity::new(&config.selectors)),
            prompt,
            events,
            telemetry,
            slot: SessionSlot::new(),
            last_outcome: Mutex::new(None),
        }
    }

    pub fn with_identity_resolver(mut self, identity: Arc<dyn TurnIdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    pub fn state(&self) -> RunState {
        self.slot.state()
    }

    /// Requests cancellation of the running session. Takes effect at the next
    /// turn; a native delete already in flight completes.
    pub fn stop(&self) -> bool {
        self.slot.stop()
    }

    pub fn last_outcome(&self) -> Option<DeletionOutcome> {
        self.last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn reject(&self, error: PowerToolsError, status: &str) -> PowerToolsError {
        self.events.status(status);
        error
    }

    /// Turns from `start` downward, stopping at (and including) the first boundary.
    async fn collect_range(&self, start: NodeId) -> (Vec<NodeId>, bool) {
        let flags = self.boundaries.load().await;
        let dom = self.dom.as_ref();
        let mut turns = Vec::new();
        let mut current = Some(start);

        while let Some(node) = current {
            if dom.matches(node, &self.selectors.chat_turn).unwrap_or(false) {
                turns.push(node);
                let id = self.identity.identity_of(dom, node);
                if !id.is_empty() && flags.contains(&id) {
                    debug!("Boundary reached: turn={}, id={}", node, id);
                    return (turns, true);
                }
            }
            current = dom.next_element_sibling(node);
        }
        (turns, false)
    }

    /// Deletes `start` and the turns below it, up to and including the first
    /// boundary-flagged turn. Asks for confirmation first.
    pub async fn delete_from(&self, start: NodeId) -> PowerToolsResult<DeletionReport> {
        if self.slot.state() == RunState::Running {
            return Err(self.reject(PowerToolsError::AlreadyRunning, "Deletion already in progress"));
        }
        if is_model_generating(self.dom.as_ref(), &self.selectors) {
            return Err(self.reject(PowerToolsError::ModelGenerating, "⚠️ Model is generating. Aborting."));
        }

        let (turns, boundary_found) = self.collect_range(start).await;
        if turns.is_empty() {
            return Err(self.reject(PowerToolsError::NoMatchingTurns, "No turns to delete"));
        }

        let message = if boundary_found {
            format!("Delete {} turns up to boundary flag?", turns.len())
        } else {
            format!("Delete {} turns to end of conversation?", turns.len())
        };
        if !self.prompt.confirm(&message).await {
            debug!("Ranged deletion declined: turns={}", turns.len());
            return Ok(DeletionReport {
                outcome: DeletionOutcome::Declined,
                deleted: 0,
                eligible: turns.len(),
            });
        }

        let mut guard = self
            .slot
            .try_acquire(SessionKind::Ranged)
            .map_err(|e| self.reject(e, "Deletion already in progress"))?;
        let outcome = self.run_ranged(&mut guard, &turns).await;
        let deleted = guard.deleted_count();
        drop(guard);

        self.events.status(format!("Complete. Deleted: {}", deleted));
        Ok(self.finish(outcome, deleted, turns.len()).await)
    }

    async fn run_ranged(&self, guard: &mut SessionGuard, turns: &[NodeId]) -> DeletionOutcome {
        let budget = self.timing.max_delete_duration();
        let dom = self.dom.as_ref();

        for turn in turns {
            if guard.elapsed() > budget {
                self.events.status("Emergency stop: Timeout");
                return DeletionOutcome::TimedOut;
            }
            if guard.is_cancelled() {
                self.events.status("Deletion stopped");
                return DeletionOutcome::Stopped;
            }
            if !dom.is_connected(*turn) {
                debug!("Skipping detached turn: turn={}", turn);
                continue;
            }

            self.events.status(format!(
                "Deleting {}/{}...",
                guard.deleted_count() + 1,
                turns.len()
            ));
            if trigger_native_delete(dom, *turn, &self.selectors, &self.timing).await {
                guard.record_deletion();
                sleep(Duration::from_millis(self.timing.ranged_success_delay_ms)).await;
            } else {
                sleep(Duration::from_millis(self.timing.ranged_failure_delay_ms)).await;
            }
        }
        DeletionOutcome::Completed
    }

    /// Repeatedly deletes the topmost rendered user turn of `kind` until none is left.
    pub async fn bulk_delete(&self, kind: BulkKind) -> PowerToolsResult<DeletionReport> {
        if self.slot.state() == RunState::Running {
            return Err(self.reject(PowerToolsError::AlreadyRunning, "Deletion already in progress"));
        }
        if is_model_generating(self.dom.as_ref(), &self.selectors) {
            return Err(self.reject(PowerToolsError::ModelGenerating, "Model busy. Aborting."));
        }

        self.events.status(format!("Starting Top-Down Delete: {}", kind));
        let container = self
            .dom
            .query_selector(self.dom.document(), &self.selectors.scroll_area)
            .ok()
            .flatten();
        let Some(container) = container else {
            return Err(self.reject(
                PowerToolsError::NotFound(format!("scroll container {}", self.selectors.scroll_area)),
                "Scroll container not found. Aborting.",
            ));
        };

        let mut guard = self
            .slot
            .try_acquire(SessionKind::Bulk(kind))
            .map_err(|e| self.reject(e, "Deletion already in progress"))?;
        let mut eligible = 0;
        let outcome = match self.run_bulk(&mut guard, container, kind, &mut eligible).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Bulk delete failed: kind={}, error={}", kind, e);
                DeletionOutcome::Failed(e.to_string())
            }
        };
        let deleted = guard.deleted_count();
        drop(guard);

        self.events.status(format!("Finished. Total: {}", deleted));
        Ok(self.finish(outcome, deleted, eligible).await)
    }

    async fn run_bulk(
        &self,
        guard: &mut SessionGuard,
        container: NodeId,
        kind: BulkKind,
        eligible: &mut usize,
    ) -> PowerToolsResult<DeletionOutcome> {
        let budget = self.timing.max_delete_duration();
        let dom = self.dom.as_ref();

        loop {
            if guard.is_cancelled() {
                self.events.status("Deletion stopped");
                return Ok(DeletionOutcome::Stopped);
            }
            if guard.elapsed() > budget {
                self.events.status("Emergency stop: Timeout");
                return Ok(DeletionOutcome::TimedOut);
            }

            if dom.scroll_top(container) > 0.0 {
                force_to_top(dom, container, &self.timing).await;
                let settled =
                    await_settled(dom, container, self.timing.scroll_settle_timeout(), &self.timing).await;
                if !settled {
                    return Ok(DeletionOutcome::Failed("scroller did not settle".to_string()));
                }
            }

            let targets = self.scan_targets(kind)?;
            *eligible = (*eligible).max(guard.deleted_count() + targets.len());

            let Some(first) = targets.first().copied() else {
                if dom.scroll_top(container) <= 0.0 {
                    return Ok(DeletionOutcome::Completed);
                }
                continue;
            };

            if trigger_native_delete(dom, first, &self.selectors, &self.timing).await {
                let deleted = guard.record_deletion();
                self.events.status(format!("Deleted: {}", deleted));
                sleep(Duration::from_millis(self.timing.bulk_success_delay_ms)).await;
            } else {
                dom.scroll_by(container, self.timing.scroll_nudge_px)?;
                sleep(Duration::from_millis(self.timing.bulk_failure_delay_ms)).await;
            }
        }
    }

    /// Rendered user turns matching `kind`, in document order.
    fn scan_targets(&self, kind: BulkKind) -> PowerToolsResult<Vec<NodeId>> {
        let dom = self.dom.as_ref();
        let depth = self.timing.max_locate_depth;
        let has = |turn: NodeId, selector: &str| find_deep_with_depth(dom, turn, selector, depth).is_some();

        let turns = dom.query_selector_all(dom.document(), &self.selectors.chat_turn)?;
        Ok(turns
            .into_iter()
            .filter(|turn| has(*turn, &self.selectors.user_role))
            .filter(|turn| {
                kind.accepts(
                    has(*turn, &self.selectors.image_chunk),
                    has(*turn, &self.selectors.file_chunk),
                )
            })
            .collect())
    }

    async fn finish(&self, outcome: DeletionOutcome, deleted: usize, eligible: usize) -> DeletionReport {
        self.telemetry.credit(deleted).await;
        *self.last_outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome.clone());
        debug!(
            "Deletion run finished: outcome={:?}, deleted={}, eligible={}",
            outcome, deleted, eligible
        );
        DeletionReport {
            outcome,
            deleted,
            eligible,
        }
    }
}
