//! Single-flight deletion session
//!
//! At most one deletion runs at a time. A [`SessionGuard`] owns the running
//! session and frees the slot when dropped, whatever path the run exits by.

use super::types::{RunState, SessionKind};
use crate::util::errors::{PowerToolsError, PowerToolsResult};
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct ActiveSession {
    id: u64,
    kind: SessionKind,
    cancel_token: CancellationToken,
}

#[derive(Debug, Default)]
struct SlotState {
    active: Option<ActiveSession>,
    next_id: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SessionSlot {
    state: Arc<Mutex<SlotState>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the slot. Requests made while a session runs are rejected, not queued.
    pub fn try_acquire(&self, kind: SessionKind) -> PowerToolsResult<SessionGuard> {
        let mut state = self.lock();
        if let Some(active) = &state.active {
            debug!("Session slot busy: running={}, requested={}", active.kind, kind);
            return Err(PowerToolsError::AlreadyRunning);
        }
        state.next_id += 1;
        let id = state.next_id;
        let cancel_token = CancellationToken::new();
        state.active = Some(ActiveSession {
            id,
            kind,
            cancel_token: cancel_token.clone(),
        });
        debug!("Deletion session started: id={}, kind={}", id, kind);

        Ok(SessionGuard {
            slot: self.clone(),
            id,
            kind,
            started_at: Instant::now(),
            deleted_count: 0,
            cancel_token,
        })
    }

    pub fn state(&self) -> RunState {
        if self.lock().active.is_some() {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    pub fn active_kind(&self) -> Option<SessionKind> {
        self.lock().active.as_ref().map(|a| a.kind)
    }

    /// Cancels the running session, if any. Returns whether one was running.
    pub fn stop(&self) -> bool {
        match &self.lock().active {
            Some(active) => {
                debug!("Stopping deletion session: id={}, kind={}", active.id, active.kind);
                active.cancel_token.cancel();
                true
            }
            None => false,
        }
    }

    fn release(&self, id: u64) {
        let mut state = self.lock();
        if state.active.as_ref().map(|a| a.id) == Some(id) {
            state.active = None;
        }
    }
}

/// The running deletion session.
#[derive(Debug)]
pub struct SessionGuard {
    slot: SessionSlot,
    id: u64,
    kind: SessionKind,
    started_at: Instant,
    deleted_count: usize,
    cancel_token: CancellationToken,
}

impl SessionGuard {
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted_count
    }

    pub fn record_deletion(&mut self) -> usize {
        self.deleted_count += 1;
        self.deleted_count
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        debug!(
            "Deletion session released: id={}, kind={}, deleted={}, elapsed_ms={}",
            self.id,
            self.kind,
            self.deleted_count,
            self.elapsed().as_millis()
        );
        self.slot.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deletion::types::BulkKind;

    #[test]
    fn second_acquire_is_rejected() {
        let slot = SessionSlot::new();
        let _guard = slot.try_acquire(SessionKind::Ranged).unwrap();

        let err = slot.try_acquire(SessionKind::Bulk(BulkKind::Text)).unwrap_err();
        assert!(matches!(err, PowerToolsError::AlreadyRunning));
        assert_eq!(slot.state(), RunState::Running);
        assert_eq!(slot.active_kind(), Some(SessionKind::Ranged));
    }

    #[test]
    fn dropping_guard_frees_slot() {
        let slot = SessionSlot::new();
        {
            let mut guard = slot.try_acquire(SessionKind::Ranged).unwrap();
            guard.record_deletion();
            assert_eq!(guard.deleted_count(), 1);
        }
        assert_eq!(slot.state(), RunState::Idle);
        assert!(slot.try_acquire(SessionKind::Ranged).is_ok());
    }

    #[test]
    fn guard_is_released_on_panic() {
        let slot = SessionSlot::new();
        let inner = slot.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.try_acquire(SessionKind::Ranged).unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(slot.state(), RunState::Idle);
    }

    #[test]
    fn stop_cancels_running_session() {
        let slot = SessionSlot::new();
        assert!(!slot.stop());

        let guard = slot.try_acquire(SessionKind::Bulk(BulkKind::Image)).unwrap();
        assert!(!guard.is_cancelled());
        assert!(slot.stop());
        assert!(guard.is_cancelled());

        drop(guard);
        let fresh = slot.try_acquire(SessionKind::Ranged).unwrap();
        assert!(!fresh.is_cancelled());
    }
}
