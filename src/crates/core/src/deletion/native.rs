//! Drives the host's own per-turn delete flow: options trigger, menu item, confirm dialog.

use crate::infrastructure::dom::{HostDom, NodeId};
use crate::service::config::{HostSelectors, TimingConfig};
use crate::service::locator::{find_deep_with_depth, wait_for_selector};
use crate::util::errors::PowerToolsResult;
use log::debug;
use std::time::Duration;
use tokio::time::sleep;

/// Deletes `turn` through the host UI. Returns whether the delete menu item was
/// reached and clicked; a missing confirm dialog still counts as success.
///
/// Once the trigger has been clicked, any later failure clicks it again so no
/// menu is left open.
pub async fn trigger_native_delete(
    dom: &dyn HostDom,
    turn: NodeId,
    selectors: &HostSelectors,
    timing: &TimingConfig,
) -> bool {
    let depth = timing.max_locate_depth;
    let scope = find_deep_with_depth(dom, turn, &selectors.options_wrapper, depth).unwrap_or(turn);
    let Some(trigger) = find_deep_with_depth(dom, scope, &selectors.menu_button, depth) else {
        debug!("Options trigger not found: turn={}", turn);
        return false;
    };

    if let Err(e) = dom.click(trigger) {
        debug!("Options trigger click failed: turn={}, error={}", turn, e);
        return false;
    }

    match drive_menu(dom, selectors, timing).await {
        Ok(true) => true,
        Ok(false) => {
            close_menu(dom, trigger);
            false
        }
        Err(e) => {
            debug!("Native delete interrupted: turn={}, error={}", turn, e);
            close_menu(dom, trigger);
            false
        }
    }
}

async fn drive_menu(
    dom: &dyn HostDom,
    selectors: &HostSelectors,
    timing: &TimingConfig,
) -> PowerToolsResult<bool> {
    let Some(menu) = wait_for_selector(
        dom,
        &selectors.menu,
        dom.body(),
        timing.menu_wait(),
        timing.poll_interval(),
    )
    .await
    else {
        debug!("Options menu did not open: timeout_ms={}", timing.menu_wait_ms);
        return Ok(false);
    };

    let item = dom
        .query_selector_all(menu, &selectors.menu_item)?
        .into_iter()
        .find(|item| dom.text_content(*item).contains(selectors.delete_label.as_str()));
    let Some(item) = item else {
        debug!("Delete item missing from options menu: menu={}", menu);
        return Ok(false);
    };

    dom.click(item)?;
    sleep(Duration::from_millis(timing.menu_settle_ms)).await;

    if let Some(confirm) = find_confirm_button(dom, selectors)? {
        dom.click(confirm)?;
        sleep(Duration::from_millis(timing.confirm_settle_ms)).await;
    } else {
        debug!("No confirm dialog shown, assuming immediate delete");
    }
    Ok(true)
}

/// First dialog button whose trimmed text is exactly the confirm label.
pub fn find_confirm_button(
    dom: &dyn HostDom,
    selectors: &HostSelectors,
) -> PowerToolsResult<Option<NodeId>> {
    for dialog in dom.query_selector_all(dom.document(), &selectors.dialog)? {
        let confirm = dom
            .query_selector_all(dialog, &selectors.dialog_button)?
            .into_iter()
            .find(|button| dom.text_content(*button).trim() == selectors.confirm_label);
        if confirm.is_some() {
            return Ok(confirm);
        }
    }
    Ok(None)
}

fn close_menu(dom: &dyn HostDom, trigger: NodeId) {
    if let Err(e) = dom.click(trigger) {
        debug!("Failed to close options menu: trigger={}, error={}", trigger, e);
    }
}
