use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type TryHandle = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: [TryHandle; 15] = [
    handlers::core::try_handle,
    handlers::students::try_handle,
    handlers::teachers::try_handle,
    handlers::classrooms::try_handle,
    handlers::classes::try_handle,
    handlers::calendar::try_handle,
    handlers::lessons::try_handle,
    handlers::attendance::try_handle,
    handlers::homework::try_handle,
    handlers::insights::try_handle,
    handlers::finance::try_handle,
    handlers::payroll::try_handle,
    handlers::schedule::try_handle,
    handlers::navigation::try_handle,
    handlers::backup::try_handle,
];

/// Returns the response to write now, or `None` when the request was
/// accepted for a deferred answer through `AppState::outbox`.
pub fn handle_request(state: &mut AppState, req: Request) -> Option<serde_json::Value> {
    tracing::debug!(id = %req.id, method = %req.method, "request");
    if req.method == "schedule.checkConflictsDebounced" {
        return handlers::schedule::check_conflicts_debounced(state, &req);
    }
    for try_handle in HANDLERS {
        if let Some(resp) = try_handle(state, &req) {
            return Some(resp);
        }
    }

    Some(err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    ))
}
