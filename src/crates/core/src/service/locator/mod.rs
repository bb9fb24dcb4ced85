//! DOM location primitives
//!
//! - `find`: shadow-piercing element search
//! - `wait`: poll-until-found with timeout
//! - `scroll`: scroll-to-top convergence for the transcript scroller

pub mod find;
pub mod scroll;
pub mod wait;

pub use find::{find_deep, find_deep_with_depth, DEFAULT_MAX_DEPTH};
pub use scroll::{await_settled, force_to_top};
pub use wait::{wait_for, wait_for_selector};

use crate::infrastructure::dom::HostDom;
use crate::service::config::HostSelectors;

/// Whether the host is currently streaming a response (a stop/cancel control is visible).
pub fn is_model_generating(dom: &dyn HostDom, selectors: &HostSelectors) -> bool {
    matches!(
        dom.query_selector(dom.document(), &selectors.stop_generating),
        Ok(Some(_))
    )
}
