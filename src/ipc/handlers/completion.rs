use crate::access::{self, Scope};
use crate::completion::completion_rate;
use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_and_session, params, to_value};
use crate::ipc::types::{AppState, Request};
use crate::progress::{self, CompletionScope};
use crate::workflow;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionParams {
    scope: CompletionScope,
    id: String,
    #[serde(default)]
    category_id: Option<String>,
}

fn handle_get(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: CompletionParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let visible = match p.scope {
        CompletionScope::School => access::covers_school(conn, session, &p.id)?,
        CompletionScope::Sector | CompletionScope::SectorOwn => {
            access::covers_sector(conn, session, &p.id)?
        }
        CompletionScope::Region => access::covers_region(session, &p.id),
    };
    if !visible {
        return Err(AppError::denied("completion requested outside your scope"));
    }
    let stats = progress::compute(conn, p.scope, &p.id, p.category_id.as_deref())?;
    to_value(&stats)
}

fn count(conn: &Connection, sql: &str, param: Option<String>) -> AppResult<i64> {
    Ok(conn.query_row(sql, rusqlite::params_from_iter(param.iter()), |r| r.get(0))?)
}

/// Entry counts by status over the school and sector targets in scope.
fn entries_by_status(conn: &Connection, scope: &Scope) -> AppResult<BTreeMap<String, i64>> {
    let (school_pred, school_param) = scope.school_predicate("sc");
    let (sector_pred, sector_param) = scope.sector_predicate("se");
    let queries = [
        (
            format!(
                "SELECT d.status, COUNT(*) FROM data_entries d
                 JOIN schools sc ON sc.id = d.target_id
                 WHERE d.target_kind = 'school' AND {school_pred}
                 GROUP BY d.status"
            ),
            school_param,
        ),
        (
            format!(
                "SELECT d.status, COUNT(*) FROM data_entries d
                 JOIN sectors se ON se.id = d.target_id
                 WHERE d.target_kind = 'sector' AND {sector_pred}
                 GROUP BY d.status"
            ),
            sector_param,
        ),
    ];

    let mut totals: BTreeMap<String, i64> = ["draft", "pending", "approved", "rejected"]
        .iter()
        .map(|s| (s.to_string(), 0))
        .collect();
    for (sql, param) in queries {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(param.iter()), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (status, n) in rows {
            *totals.entry(status).or_insert(0) += n;
        }
    }
    Ok(totals)
}

fn handle_dashboard(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let (conn, session) = db_and_session(state)?;
    let scope = Scope::of(session);

    let regions = match &scope {
        Scope::All => count(conn, "SELECT COUNT(*) FROM regions", None)?,
        Scope::School(id) if id.is_empty() => 0,
        _ => 1,
    };
    let (sector_pred, sector_param) = scope.sector_predicate("s");
    let sectors = count(
        conn,
        &format!("SELECT COUNT(*) FROM sectors s WHERE {sector_pred}"),
        sector_param,
    )?;
    let (school_pred, school_param) = scope.school_predicate("s");
    let schools = count(
        conn,
        &format!("SELECT COUNT(*) FROM schools s WHERE {school_pred}"),
        school_param,
    )?;

    let breakdown = progress::school_breakdown(conn, &scope, None)?;
    let (approved, possible) = breakdown
        .iter()
        .filter(|s| s.status == "active")
        .fold((0u64, 0u64), |(a, p), s| (a + s.approved, p + s.possible));

    let pending_groups = if session.role.can_approve() {
        workflow::pending_groups(conn, session)?.len()
    } else {
        0
    };

    let sector_own = match &scope {
        Scope::Sector(id) => Some(to_value(&progress::compute(
            conn,
            CompletionScope::SectorOwn,
            id,
            None,
        )?)?),
        _ => None,
    };

    Ok(json!({
        "role": session.role,
        "counts": { "regions": regions, "sectors": sectors, "schools": schools },
        "entries": entries_by_status(conn, &scope)?,
        "pendingApprovals": pending_groups,
        "completion": {
            "approved": approved,
            "possible": possible,
            "completionRate": completion_rate(approved, possible)
        },
        "sectorOwnCompletion": sector_own
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "completion.get" => handle_get(state, req),
        "dashboard.summary" => handle_dashboard(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
