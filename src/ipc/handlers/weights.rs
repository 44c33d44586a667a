use serde_json::json;

use crate::ipc::error::{err, ok, score_err};
use crate::ipc::types::{AppState, Request};
use crate::recalc;
use crate::weights::{self, WeightRow};

fn handle_weights_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match weights::load(conn) {
        Ok(rows) => ok(
            &req.id,
            json!({ "weights": serde_json::to_value(rows).unwrap_or_default() }),
        ),
        Err(e) => score_err(&req.id, &e),
    }
}

/// The update payload must name every category exactly once; descriptions
/// fall back to whatever is configured today.
fn parse_weight_rows(
    params: &serde_json::Value,
    current: &[WeightRow],
) -> Result<Vec<WeightRow>, (&'static str, String)> {
    let Some(items) = params.get("weights").and_then(|v| v.as_array()) else {
        return Err(("bad_params", "missing params.weights".to_string()));
    };

    let mut rows: Vec<WeightRow> = Vec::with_capacity(items.len());
    for item in items {
        let Some(category) = item.get("category").and_then(|v| v.as_str()) else {
            return Err(("bad_params", "weight row missing category".to_string()));
        };
        if !weights::is_known_category(category) {
            return Err(("bad_params", format!("unknown category: {}", category)));
        }
        if rows.iter().any(|r| r.category == category) {
            return Err(("bad_params", format!("duplicate category: {}", category)));
        }
        let Some(weight) = item.get("weight").and_then(|v| v.as_f64()) else {
            return Err((
                "bad_params",
                format!("weight row for {} missing numeric weight", category),
            ));
        };
        let description = item
            .get("description")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or_else(|| {
                current
                    .iter()
                    .find(|r| r.category == category)
                    .map(|r| r.description.clone())
            })
            .unwrap_or_default();

        rows.push(WeightRow {
            category: category.to_string(),
            weight,
            description,
            sort_order: weights::canonical_sort_order(category),
        });
    }

    if rows.len() != weights::default_rows().len() {
        return Err((
            "bad_params",
            "weights must cover every category exactly once".to_string(),
        ));
    }

    rows.sort_by_key(|r| r.sort_order);
    Ok(rows)
}

fn handle_weights_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let progress = state.progress.clone();
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let current = match weights::load(conn) {
        Ok(rows) => rows,
        Err(e) => return score_err(&req.id, &e),
    };
    let rows = match parse_weight_rows(&req.params, &current) {
        Ok(rows) => rows,
        Err((code, message)) => return err(&req.id, code, message, None),
    };

    match recalc::update_weights(conn, &progress, &rows) {
        Ok(result) => ok(
            &req.id,
            serde_json::to_value(result).unwrap_or_default(),
        ),
        Err(e) => score_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "weights.get" => Some(handle_weights_get(state, req)),
        "weights.update" => Some(handle_weights_update(state, req)),
        _ => None,
    }
}
