use crate::access;
use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_and_session, params, to_value};
use crate::ipc::types::{AppState, Request};
use crate::model::Target;
use crate::workflow::{self, EntryValue};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    target: Target,
    #[serde(default)]
    category_id: Option<String>,
}

fn handle_list(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ListParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    if !access::covers_target(conn, session, &p.target)? {
        return Err(AppError::denied(format!(
            "{} is outside your scope",
            p.target.kind
        )));
    }
    let entries = workflow::list_entries(conn, &p.target, p.category_id.as_deref())?;
    Ok(json!({ "entries": to_value(&entries)? }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveParams {
    target: Target,
    category_id: String,
    values: Vec<EntryValue>,
}

fn handle_save(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: SaveParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let summary = workflow::save_entries(conn, session, &p.target, &p.category_id, &p.values)?;
    to_value(&summary)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitParams {
    target: Target,
    category_id: String,
}

fn handle_submit(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: SubmitParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let outcome = workflow::submit_entries(conn, session, &p.target, &p.category_id)?;
    to_value(&outcome)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "entries.list" => handle_list(state, req),
        "entries.save" => handle_save(state, req),
        "entries.submit" => handle_submit(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
