use crate::auth::Session;
use crate::error::{AppError, AppResult};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Decodes `params` into a typed struct; a missing params object counts as `{}`.
pub fn params<T: DeserializeOwned>(req: &Request) -> AppResult<T> {
    let raw = if req.params.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        req.params.clone()
    };
    serde_json::from_value(raw).map_err(|e| AppError::bad_params(format!("invalid params: {e}")))
}

pub fn db(state: &AppState) -> AppResult<&Connection> {
    state.db.as_ref().ok_or(AppError::NoWorkspace)
}

pub fn session(state: &AppState) -> AppResult<&Session> {
    state.session.as_ref().ok_or(AppError::NotAuthenticated)
}

/// Workspace connection plus logged-in session, the common preamble.
pub fn db_and_session(state: &AppState) -> AppResult<(&Connection, &Session)> {
    Ok((db(state)?, session(state)?))
}

pub fn non_empty(value: &str, field: &str) -> AppResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::bad_params(format!("{field} must not be empty")));
    }
    Ok(v.to_string())
}

pub fn to_value<T: Serialize>(v: &T) -> AppResult<serde_json::Value> {
    serde_json::to_value(v).map_err(|e| AppError::Other(e.into()))
}
