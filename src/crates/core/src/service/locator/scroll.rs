//! Scroll convergence
//!
//! The host scroller may ignore a single scroll request or animate towards the
//! target, so reaching the top is confirmed by re-reading the offset instead of
//! trusting the request.

use crate::infrastructure::dom::{HostDom, NodeId};
use crate::service::config::TimingConfig;
use log::debug;
use std::time::Duration;
use tokio::time::{sleep, Instant};

fn is_at_top(offset: f64) -> bool {
    offset <= 0.0
}

/// Issues instant scroll-to-top requests until the offset reads zero.
pub async fn force_to_top(dom: &dyn HostDom, container: NodeId, timing: &TimingConfig) -> bool {
    if !dom.is_connected(container) {
        return false;
    }
    let settle = Duration::from_millis(timing.scroll_settle_delay_ms);
    for attempt in 1..=timing.scroll_attempts {
        if let Err(e) = dom.scroll_to_top(container) {
            debug!("Scroll request failed: container={}, error={}", container, e);
            return false;
        }
        sleep(settle).await;
        if is_at_top(dom.scroll_top(container)) {
            return true;
        }
        debug!("Scroller not at top yet: attempt={}, offset={}", attempt, dom.scroll_top(container));
    }
    false
}

/// Waits until the offset reads zero on `scroll_stable_polls` consecutive polls.
/// A non-zero reading resets the streak and re-issues the scroll request.
pub async fn await_settled(
    dom: &dyn HostDom,
    container: NodeId,
    timeout: Duration,
    timing: &TimingConfig,
) -> bool {
    let poll = Duration::from_millis(timing.scroll_poll_ms);
    let start = Instant::now();
    let mut stable = 0;

    while start.elapsed() < timeout {
        if !dom.is_connected(container) {
            return false;
        }
        if is_at_top(dom.scroll_top(container)) {
            stable += 1;
            if stable >= timing.scroll_stable_polls {
                return true;
            }
        } else {
            stable = 0;
            if let Err(e) = dom.scroll_to_top(container) {
                debug!("Scroll-to-top failed: container={}, error={}", container, e);
            }
        }
        sleep(poll).await;
    }
    debug!("Scroller did not settle: container={}, timeout_ms={}", container, timeout.as_millis());
    false
}
