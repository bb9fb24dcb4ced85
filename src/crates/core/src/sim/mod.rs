//! Simulated chat host
//!
//! Builds the host chat application's transcript markup on a [`MemoryDom`] and
//! reproduces its per-turn options menu, confirm dialog and scroller quirks.
//! Used by the scenario tests and the CLI.

use crate::infrastructure::dom::{DomResult, HostDom, MemoryDom, NodeId};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

const TURN_HEIGHT: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimRole {
    User,
    Model,
}

impl SimRole {
    fn marker(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Model => "Model",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimAttachment {
    Image,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimTurn {
    pub role: SimRole,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachment: Option<SimAttachment>,
    /// Rendered as the explicit identity attribute.
    #[serde(default)]
    pub turn_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl SimTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: SimRole::User,
            text: text.into(),
            attachment: None,
            turn_id: None,
            timestamp: None,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: SimRole::Model,
            ..Self::user(text)
        }
    }

    pub fn with_attachment(mut self, attachment: SimAttachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.turn_id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// Host behaviours that the deletion engine has to cope with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    /// Whether clicking a turn's options trigger opens its menu.
    pub menu_opens: bool,
    pub has_delete_item: bool,
    /// Whether deleting asks for confirmation in a dialog.
    pub confirm_dialog: bool,
    /// Renders the options trigger inside a shadow root.
    pub options_in_shadow: bool,
    /// Scroll-to-top requests the scroller ignores before complying.
    pub scroll_ignores: usize,
    pub initial_scroll: f64,
    /// Shows a stop-generating control.
    pub generating: bool,
    /// Renders the per-turn action bar.
    pub action_bar: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            menu_opens: true,
            has_delete_item: true,
            confirm_dialog: true,
            options_in_shadow: false,
            scroll_ignores: 0,
            initial_scroll: 0.0,
            generating: false,
            action_bar: true,
        }
    }
}

/// Transcript fixture: host quirks plus turns, top to bottom.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimTranscript {
    #[serde(default)]
    pub options: SimOptions,
    #[serde(default)]
    pub turns: Vec<SimTurn>,
}

pub struct ChatHostSim {
    dom: Arc<MemoryDom>,
    options: SimOptions,
    scroller: NodeId,
    session: NodeId,
    overlay: NodeId,
    rendered: Mutex<usize>,
    stop_button: Mutex<Option<NodeId>>,
}

impl ChatHostSim {
    pub fn new(options: SimOptions) -> DomResult<Self> {
        let dom = Arc::new(MemoryDom::new());
        let body = dom.body();
        let scroller = dom.element(body, "ms-autoscroll-container", &[])?;
        let session = dom.element(scroller, "ms-chat-session", &[])?;
        let overlay = dom.element(body, "div", &[("class", "cdk-overlay-container")])?;
        dom.set_scroll_top(scroller, options.initial_scroll)?;
        dom.ignore_scroll_requests(scroller, options.scroll_ignores)?;

        let sim = Self {
            dom,
            scroller,
            session,
            overlay,
            rendered: Mutex::new(0),
            stop_button: Mutex::new(None),
            options,
        };
        sim.set_generating(sim.options.generating)?;
        Ok(sim)
    }

    pub fn with_turns(options: SimOptions, turns: &[SimTurn]) -> DomResult<Self> {
        let sim = Self::new(options)?;
        for turn in turns {
            sim.append_turn(turn)?;
        }
        Ok(sim)
    }

    pub fn from_transcript(transcript: &SimTranscript) -> DomResult<Self> {
        Self::with_turns(transcript.options.clone(), &transcript.turns)
    }

    pub fn dom(&self) -> &Arc<MemoryDom> {
        &self.dom
    }

    pub fn host(&self) -> Arc<dyn HostDom> {
        self.dom.clone()
    }

    pub fn scroller(&self) -> NodeId {
        self.scroller
    }

    pub fn session(&self) -> NodeId {
        self.session
    }

    /// Rendered turns, top to bottom.
    pub fn turns(&self) -> Vec<NodeId> {
        self.dom
            .query_selector_all(self.session, "ms-chat-turn")
            .unwrap_or_default()
    }

    pub fn turn_texts(&self) -> Vec<String> {
        self.turns()
            .into_iter()
            .map(|turn| {
                self.dom
                    .query_selector(turn, ".turn-content")
                    .ok()
                    .flatten()
                    .map(|content| self.dom.text_content(content))
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn open_menus(&self) -> usize {
        self.dom
            .query_selector_all(self.dom.document(), r#"div[role="menu"]"#)
            .map(|menus| menus.len())
            .unwrap_or(0)
    }

    pub fn open_dialogs(&self) -> usize {
        self.dom
            .query_selector_all(self.dom.document(), "mat-dialog-container")
            .map(|dialogs| dialogs.len())
            .unwrap_or(0)
    }

    pub fn set_generating(&self, generating: bool) -> DomResult<()> {
        let mut stop_button = self.stop_button.lock().unwrap_or_else(PoisonError::into_inner);
        match (generating, *stop_button) {
            (true, None) => {
                let button = self.dom.element(
                    self.dom.body(),
                    "button",
                    &[("aria-label", "Stop generating")],
                )?;
                *stop_button = Some(button);
            }
            (false, Some(button)) => {
                self.dom.remove(button)?;
                *stop_button = None;
            }
            _ => {}
        }
        Ok(())
    }

    /// Renders `turn` at the bottom of the transcript. The subtree is built
    /// detached and attached in one insertion, as the host does.
    pub fn append_turn(&self, turn: &SimTurn) -> DomResult<NodeId> {
        let dom = self.dom.as_ref();
        let index = {
            let mut rendered = self.rendered.lock().unwrap_or_else(PoisonError::into_inner);
            *rendered += 1;
            *rendered - 1
        };

        let node = dom.create_element("ms-chat-turn");
        if let Some(id) = &turn.turn_id {
            dom.set_attribute(node, "data-turn-id", id)?;
        }
        dom.set_offset_top(node, index as f64 * TURN_HEIGHT)?;

        let container = dom.element(
            node,
            "div",
            &[("class", "chat-turn-container"), ("data-turn-role", turn.role.marker())],
        )?;
        let content = dom.element(container, "div", &[("class", "turn-content")])?;
        dom.set_text(content, &turn.text)?;
        match turn.attachment {
            Some(SimAttachment::Image) => {
                dom.element(container, "ms-image-chunk", &[])?;
            }
            Some(SimAttachment::File) => {
                dom.element(container, "ms-file-chunk", &[])?;
            }
            None => {}
        }
        if let Some(timestamp) = &turn.timestamp {
            dom.element(container, "span", &[("data-turn-timestamp", timestamp)])?;
        }

        if self.options.action_bar {
            let bar = dom.element(node, "div", &[("class", "actions-container")])?;
            dom.element(bar, "div", &[("class", "actions")])?;
        }

        let wrapper = dom.element(node, "ms-chat-turn-options", &[])?;
        let trigger_parent = if self.options.options_in_shadow {
            dom.attach_shadow(wrapper)?
        } else {
            wrapper
        };
        let trigger = dom.element(trigger_parent, "button", &[("aria-label", "Open options")])?;
        self.wire_options_menu(trigger, node);

        dom.append_child(self.session, node)?;
        Ok(node)
    }

    fn wire_options_menu(&self, trigger: NodeId, turn: NodeId) {
        let overlay = self.overlay;
        let options = self.options.clone();

        self.dom.on_click(trigger, move |dom, _| {
            if !options.menu_opens {
                return;
            }
            // The trigger toggles its menu.
            if let Ok(Some(menu)) = dom.query_selector(overlay, r#"div[role="menu"]"#) {
                if let Some(pane) = dom.parent(menu) {
                    let _ = dom.remove(pane);
                }
                return;
            }
            if let Err(e) = open_menu(dom, overlay, turn, &options) {
                log::debug!("Simulated menu failed to open: turn={}, error={}", turn, e);
            }
        });
    }
}

fn open_menu(dom: &MemoryDom, overlay: NodeId, turn: NodeId, options: &SimOptions) -> DomResult<()> {
    let pane = dom.create_element("div");
    dom.set_attribute(pane, "class", "cdk-overlay-pane")?;
    let menu = dom.element(pane, "div", &[("role", "menu")])?;

    let copy = dom.element(menu, "button", &[("class", "mat-mdc-menu-item")])?;
    dom.set_text(copy, "content_copy Copy text")?;

    if options.has_delete_item {
        let delete = dom.element(menu, "button", &[("class", "mat-mdc-menu-item")])?;
        dom.set_text(delete, "delete Delete")?;
        let confirm_dialog = options.confirm_dialog;
        dom.on_click(delete, move |dom, _| {
            let _ = dom.remove(pane);
            let result = if confirm_dialog {
                open_confirm_dialog(dom, overlay, turn)
            } else {
                dom.remove(turn)
            };
            if let Err(e) = result {
                log::debug!("Simulated delete failed: turn={}, error={}", turn, e);
            }
        });
    }

    dom.append_child(overlay, pane)
}

fn open_confirm_dialog(dom: &MemoryDom, overlay: NodeId, turn: NodeId) -> DomResult<()> {
    let pane = dom.create_element("div");
    dom.set_attribute(pane, "class", "cdk-overlay-pane")?;
    let dialog = dom.element(pane, "mat-dialog-container", &[("role", "dialog")])?;

    let cancel = dom.element(dialog, "button", &[])?;
    dom.set_text(cancel, "Cancel")?;
    dom.on_click(cancel, move |dom, _| {
        let _ = dom.remove(pane);
    });

    let confirm = dom.element(dialog, "button", &[])?;
    dom.set_text(confirm, " Delete ")?;
    dom.on_click(confirm, move |dom, _| {
        let _ = dom.remove(pane);
        let _ = dom.remove(turn);
    });

    dom.append_child(overlay, pane)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_turns_with_markers() {
        let sim = ChatHostSim::with_turns(
            SimOptions::default(),
            &[
                SimTurn::user("hello").with_id("t1"),
                SimTurn::model("hi there"),
                SimTurn::user("see attached").with_attachment(SimAttachment::File),
            ],
        )
        .unwrap();

        let turns = sim.turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(sim.turn_texts(), vec!["hello", "hi there", "see attached"]);
        assert_eq!(sim.dom().attribute(turns[0], "data-turn-id").as_deref(), Some("t1"));
        assert_eq!(sim.dom().offset_top(turns[1]), 120.0);
        assert!(sim.dom().query_selector(turns[2], "ms-file-chunk").unwrap().is_some());
    }

    #[test]
    fn menu_toggles_and_delete_removes_turn() {
        let sim = ChatHostSim::with_turns(SimOptions::default(), &[SimTurn::user("bye")]).unwrap();
        let dom = sim.dom();
        let turn = sim.turns()[0];
        let trigger = dom.query_selector(turn, r#"button[aria-label="Open options"]"#).unwrap().unwrap();

        dom.click(trigger).unwrap();
        assert_eq!(sim.open_menus(), 1);
        dom.click(trigger).unwrap();
        assert_eq!(sim.open_menus(), 0);

        dom.click(trigger).unwrap();
        let item = dom
            .query_selector_all(dom.document(), ".mat-mdc-menu-item")
            .unwrap()
            .into_iter()
            .find(|i| dom.text_content(*i).contains("Delete"))
            .unwrap();
        dom.click(item).unwrap();
        assert_eq!(sim.open_menus(), 0);
        assert_eq!(sim.open_dialogs(), 1);

        let confirm = dom
            .query_selector_all(dom.document(), "mat-dialog-container button")
            .unwrap()
            .into_iter()
            .find(|b| dom.text_content(*b).trim() == "Delete")
            .unwrap();
        dom.click(confirm).unwrap();
        assert!(sim.turns().is_empty());
        assert_eq!(sim.open_dialogs(), 0);
    }

    #[test]
    fn generating_control_can_be_toggled() {
        let sim = ChatHostSim::new(SimOptions {
            generating: true,
            ..Default::default()
        })
        .unwrap();
        let stop = r#"button[aria-label="Stop generating"]"#;
        assert!(sim.dom().query_selector(sim.dom().document(), stop).unwrap().is_some());
        sim.set_generating(false).unwrap();
        assert!(sim.dom().query_selector(sim.dom().document(), stop).unwrap().is_none());
    }

    #[test]
    fn transcript_fixture_parses_with_defaults() {
        let raw = r#"{"turns": [{"role": "user", "text": "a"}, {"role": "model", "attachment": "image"}]}"#;
        let transcript: SimTranscript = serde_json::from_str(raw).unwrap();
        assert!(transcript.options.menu_opens);
        assert_eq!(transcript.turns[1].attachment, Some(SimAttachment::Image));
    }
}
