use std::path::PathBuf;

use crate::auth::Session;
use crate::config::Config;
use crate::deadline::DeadlineMonitor;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Option<Session>,
    pub deadline_monitor: Option<DeadlineMonitor>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            workspace: None,
            db: None,
            session: None,
            deadline_monitor: None,
        }
    }
}
