use crate::backup;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_required_str, respond, store_ref};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::PathBuf;

fn backup_export(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let out_path = get_required_str(params, "outPath")?;
    let mode = store_ref(state)?.mode();
    let Some(workspace) = state.workspace.clone() else {
        return Err(HandlerErr::no_workspace());
    };

    let out = PathBuf::from(&out_path);
    let export = backup::export_workspace_bundle(&workspace, mode, &out).map_err(|e| {
        tracing::error!(error = %format!("{:#}", e), path = %out_path, "backup export failed");
        HandlerErr::new("backup_failed", format!("{:#}", e)).with_details(json!({ "path": out_path }))
    })?;
    tracing::info!(path = %out_path, mode = mode.as_str(), "workspace exported");
    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "storageMode": export.storage_mode,
        "entryCount": export.entry_count,
        "sha256": export.sha256,
    }))
}

/// Restores over the current workspace. The store is closed for the
/// duration and reopened in whichever mode the bundle carried; on failure
/// the previous store is reopened unchanged.
fn backup_import(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let in_path = get_required_str(params, "inPath")?;
    let previous_mode = store_ref(state)?.mode();
    let Some(workspace) = state.workspace.clone() else {
        return Err(HandlerErr::no_workspace());
    };
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    state.store = None;
    let import = match backup::import_workspace_bundle(&src, &workspace) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), path = %in_path, "backup import failed");
            state.open_workspace(&workspace, previous_mode)?;
            return Err(HandlerErr::new("backup_failed", format!("{:#}", e))
                .with_details(json!({ "path": in_path })));
        }
    };
    state.open_workspace(&workspace, import.storage_mode)?;
    tracing::info!(
        path = %in_path,
        mode = import.storage_mode.as_str(),
        "workspace restored"
    );
    Ok(json!({
        "path": in_path,
        "bundleFormatDetected": import.bundle_format_detected,
        "storageMode": import.storage_mode,
        "restoredPath": import.restored_path.to_string_lossy(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "backup.export" => backup_export(state, &req.params),
        "backup.import" => backup_import(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
