use crate::deadline;
use crate::error::AppResult;
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_and_session, to_value};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_check(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let critical_days = state.config.critical_days;
    let (conn, _session) = db_and_session(state)?;
    let alerts = deadline::scan(conn, chrono::Utc::now(), critical_days)?;
    Ok(json!({ "criticalDays": critical_days, "alerts": to_value(&alerts)? }))
}

/// Last scan made by the background monitor; empty before its first pass.
fn handle_alerts(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let (_conn, _session) = db_and_session(state)?;
    let alerts = state
        .deadline_monitor
        .as_ref()
        .map(|m| m.latest())
        .unwrap_or_default();
    Ok(json!({ "alerts": to_value(&alerts)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "deadlines.check" => handle_check(state, req),
        "deadlines.alerts" => handle_alerts(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
