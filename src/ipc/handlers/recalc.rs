use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::recalc;

fn handle_recalc_run(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if recalc::is_running(&state.progress) {
        return err(
            &req.id,
            "recalc_running",
            "a batch recalculation is already in flight",
            None,
        );
    }

    // Detached on purpose; completion lands in the shared progress record.
    let _ = recalc::spawn_batch(workspace, state.progress.clone());
    ok(&req.id, json!({ "started": true }))
}

fn handle_recalc_progress(state: &mut AppState, req: &Request) -> serde_json::Value {
    let snapshot = recalc::snapshot(&state.progress);
    ok(
        &req.id,
        json!({ "progress": serde_json::to_value(snapshot).unwrap_or_default() }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "recalc.run" => Some(handle_recalc_run(state, req)),
        "recalc.progress" => Some(handle_recalc_progress(state, req)),
        _ => None,
    }
}
