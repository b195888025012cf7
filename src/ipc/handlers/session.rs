use crate::auth;
use crate::error::AppResult;
use crate::ipc::error::respond;
use crate::ipc::helpers::{db, params, to_value};
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct LoginParams {
    email: String,
    password: String,
}

fn handle_login(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: LoginParams = params(req)?;
    let session = {
        let conn = db(state)?;
        match auth::login(conn, &p.email, &p.password) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("login failed for {:?}: {e}", p.email.trim());
                return Err(e);
            }
        }
    };
    log::info!("{} logged in as {}", session.email, session.role);
    let value = to_value(&session)?;
    state.session = Some(session);
    Ok(json!({ "session": value }))
}

fn handle_logout(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let was = state.session.take();
    if let Some(s) = &was {
        log::info!("{} logged out", s.email);
    }
    Ok(json!({ "ok": true, "wasLoggedIn": was.is_some() }))
}

fn handle_current(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let session = match &state.session {
        Some(s) => Some(to_value(s)?),
        None => None,
    };
    Ok(json!({ "session": session }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "session.login" => handle_login(state, req),
        "session.logout" => handle_logout(state, req),
        "session.current" => handle_current(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
