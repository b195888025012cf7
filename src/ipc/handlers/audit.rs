use crate::access;
use crate::error::AppResult;
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_and_session, params, to_value};
use crate::ipc::types::{AppState, Request};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditRow {
    id: String,
    user_id: Option<String>,
    action: String,
    entity_type: String,
    entity_id: String,
    old_value: Option<serde_json::Value>,
    new_value: Option<serde_json::Value>,
    created_at: String,
}

fn json_column(raw: Option<String>) -> Option<serde_json::Value> {
    raw.map(|text| serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(default)]
    entity_id: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

fn handle_list(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ListParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    access::require_superadmin(session)?;
    let limit = p.limit.unwrap_or(100).clamp(1, 1000);

    let mut stmt = conn.prepare(
        "SELECT id, user_id, action, entity_type, entity_id, old_value, new_value, created_at
         FROM audit_logs
         WHERE (?1 IS NULL OR entity_id = ?1)
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![p.entity_id, limit], |r| {
            Ok(AuditRow {
                id: r.get(0)?,
                user_id: r.get(1)?,
                action: r.get(2)?,
                entity_type: r.get(3)?,
                entity_id: r.get(4)?,
                old_value: json_column(r.get(5)?),
                new_value: json_column(r.get(6)?),
                created_at: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "entries": to_value(&rows)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "audit.list" => handle_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
