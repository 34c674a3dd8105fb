use crate::config::{Config, StorageMode};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_optional_str, respond, to_json};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "storageMode": state.mode().map(StorageMode::as_str),
        }),
    )
}

fn workspace_select(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let path = params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .ok_or_else(|| HandlerErr::bad_params("missing params.path"))?;

    let workspace_config =
        if state.config_path.is_none() && std::env::var_os(crate::config::CONFIG_ENV).is_none() {
            Some(
                Config::load(None, Some(&path))
                    .map_err(|e| HandlerErr::bad_params(e.to_string()))?,
            )
        } else {
            None
        };

    let mode = match get_optional_str(params, "mode")? {
        Some(raw) => StorageMode::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params(format!("unknown storage mode: {}", raw)))?,
        None => workspace_config
            .as_ref()
            .map_or(state.config.storage.mode, |c| c.storage.mode),
    };

    state
        .open_workspace(&path, mode)
        .map_err(|e| HandlerErr::new("storage_failed", e.to_string()))?;
    if let Some(config) = workspace_config {
        state.apply_config(config);
    }
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "storageMode": mode.as_str(),
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, workspace_select(state, &req.params))
}

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, to_json(&state.config))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "config.get" => Some(handle_config_get(state, req)),
        _ => None,
    }
}
