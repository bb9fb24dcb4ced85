use crate::infrastructure::dom::{HostDom, NodeId};
use log::debug;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Polls `probe` every `interval` until it yields a value or `timeout` elapses.
pub async fn wait_for<T, F>(mut probe: F, timeout: Duration, interval: Duration) -> Option<T>
where
    F: FnMut() -> Option<T>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = probe() {
            return Some(value);
        }
        if start.elapsed() >= timeout {
            return None;
        }
        sleep(interval).await;
    }
}

/// Waits for a descendant of `root` matching `selector`.
pub async fn wait_for_selector(
    dom: &dyn HostDom,
    selector: &str,
    root: NodeId,
    timeout: Duration,
    interval: Duration,
) -> Option<NodeId> {
    if let Err(e) = dom.query_selector(root, selector) {
        debug!("Wait aborted, selector rejected: selector={}, error={}", selector, e);
        return None;
    }
    let found = wait_for(
        || dom.query_selector(root, selector).ok().flatten(),
        timeout,
        interval,
    )
    .await;
    if found.is_none() {
        debug!("Wait timed out: selector={}, timeout_ms={}", selector, timeout.as_millis());
    }
    found
}
