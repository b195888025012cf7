use super::excel::{sheet_error, sheet_format};
use crate::access::{self, Scope};
use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_and_session, non_empty, params};
use crate::ipc::types::{AppState, Request};
use crate::progress;
use crate::sheet::{self, Cell};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

const REPORT_HEADERS: [&str; 7] = [
    "Region",
    "Sector",
    "School",
    "Status",
    "Approved",
    "Possible",
    "Completion %",
];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportParams {
    out_path: String,
    #[serde(default)]
    region_id: Option<String>,
}

/// Completion per school across the caller's scope.
fn handle_export(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ExportParams = params(req)?;
    let out = PathBuf::from(non_empty(&p.out_path, "outPath")?);
    sheet_format(&out)?;
    let (conn, session) = db_and_session(state)?;
    if let Some(region_id) = p.region_id.as_deref() {
        let scoped = matches!(Scope::of(session), Scope::All | Scope::Region(_));
        if !scoped || !access::covers_region(session, region_id) {
            return Err(AppError::denied("region is outside your scope"));
        }
    }

    let schools = progress::school_breakdown(conn, &Scope::of(session), p.region_id.as_deref())?;
    let mut rows: Vec<Vec<Cell>> = vec![REPORT_HEADERS.iter().map(|h| Cell::text(*h)).collect()];
    for s in &schools {
        rows.push(vec![
            Cell::text(s.region_name.as_str()),
            Cell::text(s.sector_name.as_str()),
            Cell::text(s.school_name.as_str()),
            Cell::text(s.status.as_str()),
            Cell::Number(s.approved as f64),
            Cell::Number(s.possible as f64),
            Cell::Number(f64::from(s.completion_rate)),
        ]);
    }
    sheet::write_table(&out, "Report", &rows).map_err(sheet_error)?;

    log::info!(
        "{} exported a report of {} school(s) to {}",
        session.email,
        schools.len(),
        out.to_string_lossy()
    );
    Ok(json!({ "path": out.to_string_lossy(), "rows": schools.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.export" => handle_export(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
