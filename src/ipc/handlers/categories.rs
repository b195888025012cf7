use super::columns::column_rows;
use crate::access;
use crate::db::{new_id, now_rfc3339};
use crate::deadline::parse_deadline;
use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_and_session, non_empty, params, to_value};
use crate::ipc::types::{AppState, Request};
use crate::model::{Assignment, CategoryStatus};
use crate::notify;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CategoryRow {
    id: String,
    name: String,
    description: Option<String>,
    status: CategoryStatus,
    assignment: Assignment,
    deadline: Option<String>,
    priority: i64,
    column_count: i64,
    created_at: String,
    updated_at: String,
}

const CATEGORY_SELECT: &str = "SELECT c.id, c.name, c.description, c.status, c.assignment,
        c.deadline, c.priority,
        (SELECT COUNT(*) FROM columns col WHERE col.category_id = c.id AND col.status = 'active'),
        c.created_at, c.updated_at
    FROM categories c";

fn category_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<CategoryRow> {
    Ok(CategoryRow {
        id: r.get(0)?,
        name: r.get(1)?,
        description: r.get(2)?,
        status: r.get(3)?,
        assignment: r.get(4)?,
        deadline: r.get(5)?,
        priority: r.get(6)?,
        column_count: r.get(7)?,
        created_at: r.get(8)?,
        updated_at: r.get(9)?,
    })
}

fn load_row(conn: &Connection, category_id: &str) -> AppResult<CategoryRow> {
    let sql = format!("{CATEGORY_SELECT} WHERE c.id = ?");
    conn.query_row(&sql, [category_id], category_from_row)
        .optional()?
        .ok_or_else(|| AppError::NotFound("category".into()))
}

fn checked_deadline(raw: Option<String>) -> AppResult<Option<String>> {
    match raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(d) if parse_deadline(&d).is_some() => Ok(Some(d)),
        Some(d) => Err(AppError::validation(format!(
            "deadline {d:?} is neither a YYYY-MM-DD date nor an RFC 3339 timestamp"
        ))),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(default)]
    status: Option<CategoryStatus>,
    #[serde(default)]
    assignment: Option<Assignment>,
}

fn handle_list(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ListParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    // Data entry roles only ever see categories that accept data.
    let status = if session.role.manages_categories() {
        p.status
    } else {
        Some(CategoryStatus::Active)
    };
    let sql = format!(
        "{CATEGORY_SELECT}
         WHERE (?1 IS NULL OR c.status = ?1) AND (?2 IS NULL OR c.assignment = ?2)
         ORDER BY c.priority DESC, c.name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let categories = stmt
        .query_map(rusqlite::params![status, p.assignment], category_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "categories": to_value(&categories)? }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryIdParams {
    category_id: String,
}

fn handle_get(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: CategoryIdParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let category = load_row(conn, &p.category_id)?;
    if !session.role.manages_categories() && category.status != CategoryStatus::Active {
        return Err(AppError::NotFound("category".into()));
    }
    let columns = column_rows(conn, &p.category_id, session.role.manages_categories())?;
    Ok(json!({
        "category": to_value(&category)?,
        "columns": to_value(&columns)?
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    assignment: Option<Assignment>,
    #[serde(default)]
    status: Option<CategoryStatus>,
    #[serde(default)]
    deadline: Option<String>,
    #[serde(default)]
    priority: Option<i64>,
}

fn handle_create(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: CreateParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    access::require_category_manager(session)?;
    let name = non_empty(&p.name, "name")?;
    let deadline = checked_deadline(p.deadline)?;
    let assignment = p.assignment.unwrap_or(Assignment::All);
    let status = p.status.unwrap_or(CategoryStatus::Active);
    let description = p.description.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let id = new_id();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO categories(id, name, description, status, assignment, deadline, priority, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            name,
            description,
            status,
            assignment,
            deadline,
            p.priority.unwrap_or(0),
            now,
            now
        ],
    )?;
    notify::audit(
        conn,
        Some(&session.user_id),
        "create_category",
        "category",
        &id,
        None,
        Some(&json!({ "name": name, "assignment": assignment, "status": status })),
    )?;
    log::info!("category created: {name} ({assignment})");
    Ok(json!({ "categoryId": id }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    category_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    assignment: Option<Assignment>,
    #[serde(default)]
    status: Option<CategoryStatus>,
    /// `""` clears the deadline.
    #[serde(default)]
    deadline: Option<String>,
    #[serde(default)]
    priority: Option<i64>,
}

fn handle_update(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: UpdateParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    access::require_category_manager(session)?;
    let old = load_row(conn, &p.category_id)?;

    if let Some(assignment) = p.assignment {
        if assignment != old.assignment {
            let entries: i64 = conn.query_row(
                "SELECT COUNT(*) FROM data_entries WHERE category_id = ?",
                [&p.category_id],
                |r| r.get(0),
            )?;
            if entries > 0 {
                return Err(AppError::validation(
                    "assignment cannot change once data has been entered",
                ));
            }
        }
    }

    let name = match &p.name {
        Some(n) => non_empty(n, "name")?,
        None => old.name.clone(),
    };
    let description = match p.description {
        Some(d) => Some(d.trim().to_string()).filter(|s| !s.is_empty()),
        None => old.description.clone(),
    };
    let deadline = match p.deadline {
        Some(d) => checked_deadline(Some(d))?,
        None => old.deadline.clone(),
    };
    let assignment = p.assignment.unwrap_or(old.assignment);
    let status = p.status.unwrap_or(old.status);
    let priority = p.priority.unwrap_or(old.priority);

    conn.execute(
        "UPDATE categories
         SET name = ?, description = ?, status = ?, assignment = ?, deadline = ?, priority = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            name,
            description,
            status,
            assignment,
            deadline,
            priority,
            now_rfc3339(),
            p.category_id
        ],
    )?;
    notify::audit(
        conn,
        Some(&session.user_id),
        "update_category",
        "category",
        &p.category_id,
        Some(&to_value(&old)?),
        Some(&json!({
            "name": name,
            "description": description,
            "status": status,
            "assignment": assignment,
            "deadline": deadline,
            "priority": priority
        })),
    )?;
    Ok(json!({ "ok": true }))
}

fn handle_archive(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: CategoryIdParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    access::require_category_manager(session)?;
    let changed = conn.execute(
        "UPDATE categories SET status = 'archived', updated_at = ? WHERE id = ?",
        rusqlite::params![now_rfc3339(), p.category_id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("category".into()));
    }
    notify::audit(
        conn,
        Some(&session.user_id),
        "archive_category",
        "category",
        &p.category_id,
        None,
        None,
    )?;
    log::info!("category archived: {}", p.category_id);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "categories.list" => handle_list(state, req),
        "categories.get" => handle_get(state, req),
        "categories.create" => handle_create(state, req),
        "categories.update" => handle_update(state, req),
        "categories.archive" => handle_archive(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
