//! Headless board: logs the tiles in display order whenever calls or the
//! connection badge change.

use call_store::{display_order, CallRecord};
use tokio::task::JoinHandle;
use tracing::info;

use crate::connection::ConnectionStatus;
use crate::session::SessionHandle;

/// One line per tile, e.g. `#1000 Unknown | In Progress | Normal | risk 0% | General`.
pub fn render_tile(call: &CallRecord) -> String {
    let mut line = format!(
        "#{} {} | {} | {} | risk {}% | {}",
        call.id,
        call.display_name,
        call.status.label(),
        call.priority.label(),
        call.risk_assessment.highest(),
        call.topic,
    );
    if call.is_new {
        line.push_str(" | NEW");
    }
    line
}

pub fn render_board(calls: &[CallRecord]) -> Vec<String> {
    display_order(calls).iter().map(render_tile).collect()
}

fn log_board(calls: &[CallRecord], status: ConnectionStatus) {
    let active = calls.iter().filter(|call| call.is_in_progress()).count();
    info!(
        target: "calldesk::board",
        badge = status.label(),
        active,
        total = calls.len(),
        "board refreshed"
    );
    for tile in render_board(calls) {
        info!(target: "calldesk::board", "{tile}");
    }
}

/// Logs the current board immediately, then again on every change. Ends
/// when the session shuts down.
pub fn spawn_feed(handle: SessionHandle) -> JoinHandle<()> {
    let mut calls = handle.calls();
    let mut status = handle.connection_status();
    tokio::spawn(async move {
        let snapshot = calls.borrow_and_update().clone();
        log_board(&snapshot, *status.borrow_and_update());
        loop {
            tokio::select! {
                changed = calls.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let snapshot = calls.borrow_and_update().clone();
            log_board(&snapshot, *status.borrow_and_update());
        }
    })
}
