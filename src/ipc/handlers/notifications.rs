use crate::error::AppResult;
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_and_session, params, to_value};
use crate::ipc::types::{AppState, Request};
use crate::notify;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(default)]
    unread_only: bool,
    #[serde(default)]
    limit: Option<i64>,
}

fn handle_list(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ListParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let limit = p.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let items = notify::list(conn, &session.user_id, p.unread_only, limit)?;
    Ok(json!({ "notifications": to_value(&items)? }))
}

fn handle_unread_count(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let (conn, session) = db_and_session(state)?;
    Ok(json!({ "count": notify::unread_count(conn, &session.user_id)? }))
}

#[derive(Deserialize)]
struct MarkReadParams {
    ids: Vec<String>,
}

fn handle_mark_read(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: MarkReadParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let tx = conn.unchecked_transaction()?;
    let updated = notify::mark_read(&tx, &session.user_id, &p.ids)?;
    tx.commit()?;
    Ok(json!({ "updated": updated }))
}

fn handle_mark_all_read(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let (conn, session) = db_and_session(state)?;
    Ok(json!({ "updated": notify::mark_all_read(conn, &session.user_id)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "notifications.list" => handle_list(state, req),
        "notifications.unreadCount" => handle_unread_count(state, req),
        "notifications.markRead" => handle_mark_read(state, req),
        "notifications.markAllRead" => handle_mark_all_read(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
