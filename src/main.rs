mod access;
mod auth;
mod completion;
mod config;
mod db;
mod deadline;
mod error;
mod ipc;
mod model;
mod notify;
mod progress;
mod sheet;
mod workflow;

use std::io::{self, BufRead, Write};

/// Recovers the request id from a line that is JSON but not a valid request.
fn salvage_id(line: &str) -> String {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(String::from))
        .unwrap_or_default()
}

fn main() {
    dotenv::dotenv().ok();
    // stdout carries the protocol; logs go to stderr.
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("INFOLINE_LOG", "info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = config::Config::from_env();
    log::debug!("config: {config:?}");
    let mut state = ipc::AppState::new(config);

    if let Some(path) = state.config.workspace.clone() {
        if let Err(e) = ipc::open_workspace(&mut state, &path) {
            log::error!("could not open workspace {}: {e}", path.to_string_lossy());
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                log::error!("stdin closed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                log::warn!("bad request line: {e}");
                ipc::err(&salvage_id(&line), "bad_json", e.to_string(), None)
            }
        };

        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    log::info!("stdin closed, shutting down");
}
