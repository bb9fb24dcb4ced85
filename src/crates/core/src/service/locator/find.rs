use crate::infrastructure::dom::{HostDom, NodeId};
use log::debug;
use std::collections::HashSet;

pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Finds the first element matching `selector` under `root`, looking through
/// shadow roots and slotted content as well as regular children.
pub fn find_deep(dom: &dyn HostDom, root: NodeId, selector: &str) -> Option<NodeId> {
    find_deep_with_depth(dom, root, selector, DEFAULT_MAX_DEPTH)
}

pub fn find_deep_with_depth(
    dom: &dyn HostDom,
    root: NodeId,
    selector: &str,
    max_depth: usize,
) -> Option<NodeId> {
    let mut seen = HashSet::new();
    search(dom, root, selector, 0, max_depth, &mut seen)
}

fn search(
    dom: &dyn HostDom,
    root: NodeId,
    selector: &str,
    depth: usize,
    max_depth: usize,
    seen: &mut HashSet<NodeId>,
) -> Option<NodeId> {
    if depth > max_depth || !seen.insert(root) {
        return None;
    }

    if dom.is_queryable(root) {
        match dom.query_selector(root, selector) {
            Ok(Some(found)) => return Some(found),
            Ok(None) => {}
            Err(e) => {
                debug!("Native query failed, skipping subtree: root={}, error={}", root, e);
                return None;
            }
        }
    }

    if let Some(shadow) = dom.shadow_root(root) {
        if let Some(found) = search(dom, shadow, selector, depth + 1, max_depth, seen) {
            return Some(found);
        }
    }

    if let Some(assigned) = dom.assigned_elements(root) {
        for node in assigned {
            if let Some(found) = search(dom, node, selector, depth + 1, max_depth, seen) {
                return Some(found);
            }
        }
    }

    for child in dom.children(root)? {
        if let Some(found) = search(dom, child, selector, depth + 1, max_depth, seen) {
            return Some(found);
        }
    }
    None
}
