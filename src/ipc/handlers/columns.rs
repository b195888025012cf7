use crate::access;
use crate::db::{new_id, now_rfc3339};
use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_and_session, non_empty, params, to_value};
use crate::ipc::types::{AppState, Request};
use crate::model::{parse_column_options, ColumnOption, ColumnStatus, ColumnType};
use crate::notify;
use crate::workflow;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRow {
    pub id: String,
    pub category_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub is_required: bool,
    pub options: Vec<ColumnOption>,
    pub placeholder: Option<String>,
    pub help_text: Option<String>,
    pub order_index: i64,
    pub status: ColumnStatus,
}

pub fn column_rows(
    conn: &Connection,
    category_id: &str,
    include_archived: bool,
) -> AppResult<Vec<ColumnRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, category_id, name, type, is_required, options, placeholder, help_text,
                order_index, status
         FROM columns
         WHERE category_id = ? AND (? OR status <> 'archived')
         ORDER BY order_index, name",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![category_id, include_archived], |r| {
            let options: Option<String> = r.get(5)?;
            Ok(ColumnRow {
                id: r.get(0)?,
                category_id: r.get(1)?,
                name: r.get(2)?,
                column_type: r.get(3)?,
                is_required: r.get::<_, i64>(4)? != 0,
                options: parse_column_options(options.as_deref()),
                placeholder: r.get(6)?,
                help_text: r.get(7)?,
                order_index: r.get(8)?,
                status: r.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Options arrive as a JSON list of `{label, value}` or bare strings and are
/// stored normalized.
fn options_text(raw: Option<&serde_json::Value>) -> AppResult<Option<String>> {
    let Some(value) = raw.filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    if !value.is_array() {
        return Err(AppError::bad_params("options must be a list"));
    }
    let options = parse_column_options(Some(&value.to_string()));
    let text = serde_json::to_string(&options).map_err(|e| AppError::Other(e.into()))?;
    Ok(Some(text))
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    category_id: String,
    #[serde(default)]
    include_archived: bool,
}

fn handle_list(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ListParams = params(req)?;
    let (conn, _session) = db_and_session(state)?;
    workflow::load_category(conn, &p.category_id)?;
    let columns = column_rows(conn, &p.category_id, p.include_archived)?;
    Ok(json!({ "columns": to_value(&columns)? }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    category_id: String,
    name: String,
    #[serde(rename = "type")]
    column_type: ColumnType,
    #[serde(default)]
    is_required: bool,
    #[serde(default)]
    options: Option<serde_json::Value>,
    #[serde(default)]
    placeholder: Option<String>,
    #[serde(default)]
    help_text: Option<String>,
    #[serde(default)]
    order_index: Option<i64>,
}

fn handle_create(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: CreateParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    access::require_category_manager(session)?;
    workflow::load_category(conn, &p.category_id)?;
    let name = non_empty(&p.name, "name")?;
    let options = options_text(p.options.as_ref())?;

    let order_index = match p.order_index {
        Some(i) => i,
        None => conn.query_row(
            "SELECT COALESCE(MAX(order_index), -1) + 1 FROM columns WHERE category_id = ?",
            [&p.category_id],
            |r| r.get(0),
        )?,
    };

    let id = new_id();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO columns(
            id, category_id, name, type, is_required, options, placeholder, help_text,
            order_index, status, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)",
        rusqlite::params![
            id,
            p.category_id,
            name,
            p.column_type,
            p.is_required,
            options,
            optional_text(p.placeholder),
            optional_text(p.help_text),
            order_index,
            now,
            now
        ],
    )?;
    notify::audit(
        conn,
        Some(&session.user_id),
        "create_column",
        "column",
        &id,
        None,
        Some(&json!({ "categoryId": p.category_id, "name": name, "type": p.column_type })),
    )?;
    Ok(json!({ "columnId": id, "orderIndex": order_index }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    column_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    column_type: Option<ColumnType>,
    #[serde(default)]
    is_required: Option<bool>,
    #[serde(default)]
    options: Option<serde_json::Value>,
    #[serde(default)]
    placeholder: Option<String>,
    #[serde(default)]
    help_text: Option<String>,
    #[serde(default)]
    order_index: Option<i64>,
    #[serde(default)]
    status: Option<ColumnStatus>,
}

fn handle_update(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: UpdateParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    access::require_category_manager(session)?;

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM columns WHERE id = ?", [&p.column_id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(AppError::NotFound("column".into()));
    }

    let tx = conn.unchecked_transaction()?;
    let now = now_rfc3339();
    if let Some(name) = &p.name {
        let name = non_empty(name, "name")?;
        tx.execute(
            "UPDATE columns SET name = ?, updated_at = ? WHERE id = ?",
            rusqlite::params![name, now, p.column_id],
        )?;
    }
    if let Some(t) = p.column_type {
        tx.execute(
            "UPDATE columns SET type = ?, updated_at = ? WHERE id = ?",
            rusqlite::params![t, now, p.column_id],
        )?;
    }
    if let Some(required) = p.is_required {
        tx.execute(
            "UPDATE columns SET is_required = ?, updated_at = ? WHERE id = ?",
            rusqlite::params![required, now, p.column_id],
        )?;
    }
    if p.options.is_some() {
        tx.execute(
            "UPDATE columns SET options = ?, updated_at = ? WHERE id = ?",
            rusqlite::params![options_text(p.options.as_ref())?, now, p.column_id],
        )?;
    }
    if let Some(placeholder) = p.placeholder {
        tx.execute(
            "UPDATE columns SET placeholder = ?, updated_at = ? WHERE id = ?",
            rusqlite::params![optional_text(Some(placeholder)), now, p.column_id],
        )?;
    }
    if let Some(help) = p.help_text {
        tx.execute(
            "UPDATE columns SET help_text = ?, updated_at = ? WHERE id = ?",
            rusqlite::params![optional_text(Some(help)), now, p.column_id],
        )?;
    }
    if let Some(order) = p.order_index {
        tx.execute(
            "UPDATE columns SET order_index = ?, updated_at = ? WHERE id = ?",
            rusqlite::params![order, now, p.column_id],
        )?;
    }
    if let Some(status) = p.status {
        tx.execute(
            "UPDATE columns SET status = ?, updated_at = ? WHERE id = ?",
            rusqlite::params![status, now, p.column_id],
        )?;
    }
    notify::audit(
        &tx,
        Some(&session.user_id),
        "update_column",
        "column",
        &p.column_id,
        None,
        Some(&req.params),
    )?;
    tx.commit()?;
    Ok(json!({ "ok": true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColumnIdParams {
    column_id: String,
}

fn handle_archive(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ColumnIdParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    access::require_category_manager(session)?;
    let changed = conn.execute(
        "UPDATE columns SET status = 'archived', updated_at = ? WHERE id = ?",
        rusqlite::params![now_rfc3339(), p.column_id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("column".into()));
    }
    notify::audit(conn, Some(&session.user_id), "archive_column", "column", &p.column_id, None, None)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "columns.list" => handle_list(state, req),
        "columns.create" => handle_create(state, req),
        "columns.update" => handle_update(state, req),
        "columns.archive" => handle_archive(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
