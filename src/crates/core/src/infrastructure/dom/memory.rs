//! In-memory host DOM
//!
//! Arena-backed element tree with shadow roots, slots, layout/scroll offsets,
//! click behaviours and insertion feeds. Used to simulate the host chat page in
//! tests and in the CLI.

use super::selector::{SelectorContext, SelectorList};
use super::{DomError, DomResult, HostDom, MutationFeed, MutationRecord, NodeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;

/// Behaviour run when an element is clicked. Runs without any internal lock
/// held, so it may freely mutate the DOM.
pub type ClickHandler = Arc<dyn Fn(&MemoryDom, NodeId) + Send + Sync>;

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element(ElementData),
    ShadowRoot { host: NodeId },
    Text(String),
}

#[derive(Debug, Clone, Default)]
struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
    shadow_root: Option<NodeId>,
    /// `Some` only for `<slot>` elements.
    assigned: Option<Vec<NodeId>>,
    offset_top: f64,
    scroll_top: f64,
    /// Number of upcoming scroll-to-top requests the element will ignore.
    ignored_scrolls: usize,
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u64);
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.raw() as usize)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.raw() as usize)
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.get(id)?.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.get_mut(id)?.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    fn element_mut_or_err(&mut self, id: NodeId) -> DomResult<&mut ElementData> {
        if self.get(id).is_none() {
            return Err(DomError::UnknownNode(id));
        }
        self.element_mut(id).ok_or(DomError::NotAnElement(id))
    }

    fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    fn can_have_children(&self, id: NodeId) -> bool {
        matches!(
            self.get(id).map(|n| &n.kind),
            Some(NodeKind::Document | NodeKind::Element(_) | NodeKind::ShadowRoot { .. })
        )
    }

    fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id)
            .map(|n| {
                n.children
                    .iter()
                    .copied()
                    .filter(|c| self.is_element(*c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Element descendants of `scope` in document order, light tree only.
    fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.element_children(scope).into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.element_children(id).into_iter().rev());
        }
        out
    }

    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.get(child).and_then(|n| n.parent) else {
            return;
        };
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.get_mut(child) {
            c.parent = None;
        }
    }

    /// Walks up through parents and shadow hosts.
    fn composed_parent(&self, id: NodeId) -> Option<NodeId> {
        let node = self.get(id)?;
        match (&node.kind, node.parent) {
            (NodeKind::ShadowRoot { host }, _) => Some(*host),
            (_, parent) => parent,
        }
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.composed_parent(id);
        }
        false
    }

    fn is_connected(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            match self.get(node_id).map(|n| &n.kind) {
                Some(NodeKind::Document) => return true,
                None => return false,
                _ => current = self.composed_parent(node_id),
            }
        }
        false
    }

    fn collect_text(&self, id: NodeId, out: &mut Vec<String>) {
        let Some(node) = self.get(id) else {
            return;
        };
        if let NodeKind::Text(text) = &node.kind {
            out.push(text.clone());
            return;
        }
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }
}

impl SelectorContext for Tree {
    fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?
            .attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.get(node)?.parent.filter(|p| self.is_element(*p))
    }
}

struct Observer {
    target: NodeId,
    tx: mpsc::UnboundedSender<MutationRecord>,
}

pub struct MemoryDom {
    document: NodeId,
    tree: RwLock<Tree>,
    handlers: RwLock<HashMap<NodeId, ClickHandler>>,
    observers: Mutex<Vec<Observer>>,
    click_log: Mutex<Vec<NodeId>>,
}

impl MemoryDom {
    /// Creates a document with a single `<body>` element.
    pub fn new() -> Self {
        let mut tree = Tree::default();
        let document = tree.push(NodeKind::Document);
        let dom = Self {
            document,
            tree: RwLock::new(tree),
            handlers: RwLock::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
            click_log: Mutex::new(Vec::new()),
        };
        let body = dom.create_element("body");
        // Document accepts children and body is fresh, so this cannot fail.
        let _ = dom.append_child(document, body);
        dom
    }

    fn read(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, Vec<Observer>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an element with attributes and appends it to `parent`.
    pub fn element(&self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> DomResult<NodeId> {
        let node = self.create_element(tag);
        for (name, value) in attrs {
            self.set_attribute(node, name, value)?;
        }
        self.append_child(parent, node)?;
        Ok(node)
    }

    /// Replaces the children of `node` with a single text node.
    pub fn set_text(&self, node: NodeId, text: &str) -> DomResult<()> {
        let mut tree = self.write();
        if !tree.can_have_children(node) {
            return Err(DomError::NotAnElement(node));
        }
        let old = tree.get(node).map(|n| n.children.clone()).unwrap_or_default();
        for child in old {
            tree.detach(child);
        }
        let text_node = tree.push(NodeKind::Text(text.to_string()));
        if let Some(t) = tree.get_mut(text_node) {
            t.parent = Some(node);
        }
        if let Some(n) = tree.get_mut(node) {
            n.children.push(text_node);
        }
        Ok(())
    }

    pub fn attach_shadow(&self, host: NodeId) -> DomResult<NodeId> {
        let mut tree = self.write();
        if let Some(existing) = tree.element_mut_or_err(host)?.shadow_root {
            return Ok(existing);
        }
        let root = tree.push(NodeKind::ShadowRoot { host });
        tree.element_mut_or_err(host)?.shadow_root = Some(root);
        Ok(root)
    }

    /// Sets the elements distributed into a `<slot>`.
    pub fn assign_slot(&self, slot: NodeId, nodes: &[NodeId]) -> DomResult<()> {
        let mut tree = self.write();
        let data = tree.element_mut_or_err(slot)?;
        if data.tag != "slot" {
            return Err(DomError::NotAnElement(slot));
        }
        data.assigned = Some(nodes.to_vec());
        Ok(())
    }

    pub fn set_offset_top(&self, node: NodeId, offset: f64) -> DomResult<()> {
        self.write().element_mut_or_err(node)?.offset_top = offset;
        Ok(())
    }

    pub fn set_scroll_top(&self, node: NodeId, offset: f64) -> DomResult<()> {
        self.write().element_mut_or_err(node)?.scroll_top = offset.max(0.0);
        Ok(())
    }

    /// Makes `node` ignore its next `count` scroll-to-top requests.
    pub fn ignore_scroll_requests(&self, node: NodeId, count: usize) -> DomResult<()> {
        self.write().element_mut_or_err(node)?.ignored_scrolls = count;
        Ok(())
    }

    pub fn on_click<F>(&self, node: NodeId, handler: F)
    where
        F: Fn(&MemoryDom, NodeId) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node, Arc::new(handler));
    }

    /// Detaches `node` (and its subtree) from its parent.
    pub fn remove(&self, node: NodeId) -> DomResult<()> {
        let mut tree = self.write();
        if tree.get(node).is_none() {
            return Err(DomError::UnknownNode(node));
        }
        tree.detach(node);
        Ok(())
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.read().get(node)?.parent
    }

    /// Number of clicks `node` has received.
    pub fn clicks_on(&self, node: NodeId) -> usize {
        self.click_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|n| **n == node)
            .count()
    }

    fn notify_inserted(&self, parent: NodeId, child: NodeId) {
        let mut observers = self.observers();
        if observers.is_empty() {
            return;
        }
        // Observation is subtree-scoped and does not cross shadow boundaries.
        let ancestors = {
            let tree = self.read();
            let mut chain = Vec::new();
            let mut current = Some(parent);
            while let Some(id) = current {
                chain.push(id);
                current = tree.get(id).and_then(|n| n.parent);
            }
            chain
        };
        let record = MutationRecord {
            target: parent,
            added: vec![child],
        };
        observers.retain(|obs| {
            if !ancestors.contains(&obs.target) {
                return !obs.tx.is_closed();
            }
            obs.tx.send(record.clone()).is_ok()
        });
    }
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDom for MemoryDom {
    fn document(&self) -> NodeId {
        self.document
    }

    fn is_queryable(&self, node: NodeId) -> bool {
        self.read().can_have_children(node)
    }

    fn query_selector(&self, scope: NodeId, selector: &str) -> DomResult<Option<NodeId>> {
        let list = SelectorList::parse(selector)?;
        let tree = self.read();
        if !tree.can_have_children(scope) {
            return Ok(None);
        }
        Ok(tree
            .descendants(scope)
            .into_iter()
            .find(|id| list.matches(&*tree, *id)))
    }

    fn query_selector_all(&self, scope: NodeId, selector: &str) -> DomResult<Vec<NodeId>> {
        let list = SelectorList::parse(selector)?;
        let tree = self.read();
        if !tree.can_have_children(scope) {
            return Ok(Vec::new());
        }
        Ok(tree
            .descendants(scope)
            .into_iter()
            .filter(|id| list.matches(&*tree, *id))
            .collect())
    }

    fn matches(&self, node: NodeId, selector: &str) -> DomResult<bool> {
        let list = SelectorList::parse(selector)?;
        let tree = self.read();
        Ok(list.matches(&*tree, node))
    }

    fn children(&self, node: NodeId) -> Option<Vec<NodeId>> {
        let tree = self.read();
        if !tree.can_have_children(node) {
            return None;
        }
        Some(tree.element_children(node))
    }

    fn shadow_root(&self, node: NodeId) -> Option<NodeId> {
        self.read().element(node)?.shadow_root
    }

    fn assigned_elements(&self, node: NodeId) -> Option<Vec<NodeId>> {
        self.read().element(node)?.assigned.clone()
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.read().element(node).map(|e| e.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        SelectorContext::attribute(&*self.read(), node, name).map(str::to_string)
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> DomResult<()> {
        let mut tree = self.write();
        let data = tree.element_mut_or_err(node)?;
        let name = name.to_ascii_lowercase();
        match data.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => data.attrs.push((name, value.to_string())),
        }
        Ok(())
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut pieces = Vec::new();
        self.read().collect_text(node, &mut pieces);
        pieces.concat()
    }

    fn inner_text(&self, node: NodeId) -> String {
        let mut pieces = Vec::new();
        self.read().collect_text(node, &mut pieces);
        pieces
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn offset_top(&self, node: NodeId) -> f64 {
        self.read().element(node).map(|e| e.offset_top).unwrap_or(0.0)
    }

    fn next_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let tree = self.read();
        let parent = tree.get(node)?.parent?;
        let siblings = &tree.get(parent)?.children;
        let idx = siblings.iter().position(|s| *s == node)?;
        siblings[idx + 1..]
            .iter()
            .copied()
            .find(|s| tree.is_element(*s))
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.read().is_connected(node)
    }

    fn click(&self, node: NodeId) -> DomResult<()> {
        {
            let tree = self.read();
            let data = tree.element(node).ok_or(DomError::UnknownNode(node))?;
            if !tree.is_connected(node) {
                return Err(DomError::Detached(node));
            }
            if data.attrs.iter().any(|(k, _)| k == "disabled") {
                return Ok(());
            }
        }
        self.click_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(node);
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&node)
            .cloned();
        if let Some(handler) = handler {
            handler(self, node);
        }
        Ok(())
    }

    fn scroll_top(&self, node: NodeId) -> f64 {
        self.read().element(node).map(|e| e.scroll_top).unwrap_or(0.0)
    }

    fn scroll_to_top(&self, node: NodeId) -> DomResult<()> {
        let mut tree = self.write();
        let data = tree.element_mut_or_err(node)?;
        if data.ignored_scrolls > 0 {
            data.ignored_scrolls -= 1;
        } else {
            data.scroll_top = 0.0;
        }
        Ok(())
    }

    fn scroll_by(&self, node: NodeId, dy: f64) -> DomResult<()> {
        let mut tree = self.write();
        let data = tree.element_mut_or_err(node)?;
        data.scroll_top = (data.scroll_top + dy).max(0.0);
        Ok(())
    }

    fn create_element(&self, tag: &str) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        let assigned = (tag == "slot").then(Vec::new);
        self.write().push(NodeKind::Element(ElementData {
            tag,
            assigned,
            ..Default::default()
        }))
    }

    fn append_child(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        {
            let mut tree = self.write();
            if tree.get(parent).is_none() {
                return Err(DomError::UnknownNode(parent));
            }
            if tree.get(child).is_none() {
                return Err(DomError::UnknownNode(child));
            }
            let child_is_insertable = matches!(
                tree.get(child).map(|n| &n.kind),
                Some(NodeKind::Element(_) | NodeKind::Text(_))
            );
            if !tree.can_have_children(parent)
                || !child_is_insertable
                || tree.is_inclusive_ancestor(child, parent)
            {
                return Err(DomError::HierarchyRequest(child));
            }
            tree.detach(child);
            if let Some(c) = tree.get_mut(child) {
                c.parent = Some(parent);
            }
            if let Some(p) = tree.get_mut(parent) {
                p.children.push(child);
            }
        }
        self.notify_inserted(parent, child);
        Ok(())
    }

    fn subscribe(&self, target: NodeId) -> MutationFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers().push(Observer { target, tx });
        MutationFeed::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn query_selector_stays_in_light_tree() {
        let dom = MemoryDom::new();
        let body = dom.body();
        let host = dom.element(body, "ms-chat-turn-options", &[]).unwrap();
        let shadow = dom.attach_shadow(host).unwrap();
        let inner = dom.create_element("button");
        dom.append_child(shadow, inner).unwrap();

        assert_eq!(dom.query_selector(body, "button").unwrap(), None);
        assert_eq!(dom.query_selector(shadow, "button").unwrap(), Some(inner));
        assert!(dom.is_connected(inner));
    }

    #[test]
    fn removed_nodes_are_detached() {
        let dom = MemoryDom::new();
        let body = dom.body();
        let turn = dom.element(body, "ms-chat-turn", &[]).unwrap();
        let button = dom.element(turn, "button", &[]).unwrap();

        dom.remove(turn).unwrap();
        assert!(!dom.is_connected(button));
        assert_eq!(dom.click(button), Err(DomError::Detached(button)));
    }

    #[test]
    fn next_element_sibling_skips_text() {
        let dom = MemoryDom::new();
        let body = dom.body();
        let a = dom.element(body, "div", &[]).unwrap();
        let b = dom.element(body, "div", &[]).unwrap();
        assert_eq!(dom.next_element_sibling(a), Some(b));
        assert_eq!(dom.next_element_sibling(b), None);
    }

    #[test]
    fn append_rejects_cycles() {
        let dom = MemoryDom::new();
        let body = dom.body();
        let outer = dom.element(body, "div", &[]).unwrap();
        let inner = dom.element(outer, "div", &[]).unwrap();
        assert_eq!(
            dom.append_child(inner, outer),
            Err(DomError::HierarchyRequest(outer))
        );
    }

    #[test]
    fn ignored_scroll_requests_are_consumed() {
        let dom = MemoryDom::new();
        let scroller = dom.element(dom.body(), "ms-autoscroll-container", &[]).unwrap();
        dom.set_scroll_top(scroller, 500.0).unwrap();
        dom.ignore_scroll_requests(scroller, 1).unwrap();

        dom.scroll_to_top(scroller).unwrap();
        assert_eq!(dom.scroll_top(scroller), 500.0);
        dom.scroll_to_top(scroller).unwrap();
        assert_eq!(dom.scroll_top(scroller), 0.0);
    }

    #[tokio::test]
    async fn subscribers_see_subtree_insertions() {
        let dom = MemoryDom::new();
        let body = dom.body();
        let session = dom.element(body, "ms-chat-session", &[]).unwrap();
        let mut feed = dom.subscribe(session);

        let wrapper = dom.element(session, "div", &[]).unwrap();
        let turn = dom.element(wrapper, "ms-chat-turn", &[]).unwrap();
        dom.element(body, "aside", &[]).unwrap();

        let first = feed.next().await.unwrap();
        assert_eq!(first.added, vec![wrapper]);
        let second = feed.next().await.unwrap();
        assert_eq!(second, MutationRecord { target: wrapper, added: vec![turn] });
    }
}
