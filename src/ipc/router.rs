use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type Handler = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: &[Handler] = &[
    handlers::core::try_handle,
    handlers::session::try_handle,
    handlers::users::try_handle,
    handlers::hierarchy::try_handle,
    handlers::categories::try_handle,
    handlers::columns::try_handle,
    handlers::entries::try_handle,
    handlers::approval::try_handle,
    handlers::completion::try_handle,
    handlers::notifications::try_handle,
    handlers::deadlines::try_handle,
    handlers::excel::try_handle,
    handlers::reports::try_handle,
    handlers::audit::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    for handler in HANDLERS {
        if let Some(resp) = handler(state, &req) {
            return resp;
        }
    }
    log::debug!("unknown method {}", req.method);
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
