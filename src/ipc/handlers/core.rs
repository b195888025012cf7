use crate::db;
use crate::deadline::DeadlineMonitor;
use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{non_empty, params};
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Opens (creating if needed) the workspace database, drops any previous
/// session and restarts the deadline monitor against the new file.
pub fn open_workspace(state: &mut AppState, path: &Path) -> AppResult<()> {
    let conn = db::open_db(path, state.config.busy_timeout).map_err(AppError::Other)?;

    // Stop the old monitor before its database goes away.
    state.deadline_monitor = None;
    state.session = None;
    state.db = Some(conn);
    state.workspace = Some(path.to_path_buf());
    state.deadline_monitor = Some(DeadlineMonitor::start(
        db::db_path(path),
        state.config.deadline_poll,
        state.config.critical_days,
    ));
    log::info!("workspace opened: {}", path.to_string_lossy());
    Ok(())
}

fn handle_health(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "loggedIn": state.session.is_some()
    }))
}

#[derive(Deserialize)]
struct WorkspaceSelectParams {
    path: String,
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: WorkspaceSelectParams = params(req)?;
    let path = PathBuf::from(non_empty(&p.path, "path")?);
    open_workspace(state, &path)?;
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
