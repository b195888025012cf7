use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_and_session, params, to_value};
use crate::ipc::types::{AppState, Request};
use crate::model::Target;
use crate::workflow;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

/// Review calls name either `target` or the older `schoolId` shorthand.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewParams {
    #[serde(default)]
    target: Option<Target>,
    #[serde(default)]
    school_id: Option<String>,
    category_id: String,
    #[serde(default)]
    category_name: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl ReviewParams {
    fn target(&self) -> AppResult<Target> {
        match (&self.target, &self.school_id) {
            (Some(t), _) => Ok(t.clone()),
            (None, Some(id)) if !id.trim().is_empty() => Ok(Target::school(id.trim())),
            _ => Err(AppError::bad_params("missing target or schoolId")),
        }
    }
}

fn handle_pending(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let (conn, session) = db_and_session(state)?;
    let groups = workflow::pending_groups(conn, session)?;
    Ok(json!({ "groups": to_value(&groups)? }))
}

fn handle_approve(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ReviewParams = params(req)?;
    let target = p.target()?;
    let (conn, session) = db_and_session(state)?;
    let outcome = workflow::approve_target(
        conn,
        session,
        &target,
        &p.category_id,
        p.category_name.as_deref(),
    )?;
    to_value(&outcome)
}

fn handle_reject(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ReviewParams = params(req)?;
    workflow::validate_reason(p.reason.as_deref())?;
    let target = p.target()?;
    let (conn, session) = db_and_session(state)?;
    let outcome = workflow::reject_target(
        conn,
        session,
        &target,
        &p.category_id,
        p.category_name.as_deref(),
        p.reason.as_deref(),
    )?;
    to_value(&outcome)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkParams {
    entry_ids: Vec<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    expected_versions: HashMap<String, i64>,
}

fn handle_bulk_approve(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: BulkParams = params(req)?;
    let max = state.config.bulk_max;
    let (conn, session) = db_and_session(state)?;
    let outcome = workflow::bulk_approve(conn, session, &p.entry_ids, &p.expected_versions, max)?;
    to_value(&outcome)
}

fn handle_bulk_reject(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: BulkParams = params(req)?;
    workflow::validate_reason(p.reason.as_deref())?;
    let max = state.config.bulk_max;
    let (conn, session) = db_and_session(state)?;
    let outcome = workflow::bulk_reject(
        conn,
        session,
        &p.entry_ids,
        p.reason.as_deref(),
        &p.expected_versions,
        max,
    )?;
    to_value(&outcome)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "approval.pending" => handle_pending(state, req),
        "approval.approve" => handle_approve(state, req),
        "approval.reject" => handle_reject(state, req),
        "approval.bulkApprove" => handle_bulk_approve(state, req),
        "approval.bulkReject" => handle_bulk_reject(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
