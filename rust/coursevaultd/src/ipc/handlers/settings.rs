use crate::cascade::RelocationReport;
use crate::ipc::helpers::{get_required_str, migration_failures_json, respond, vault, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn relocation_json(report: &RelocationReport) -> serde_json::Value {
    json!({
        "from": report.from.to_string_lossy(),
        "to": report.to.to_string_lossy(),
        "unchanged": report.unchanged,
        "moved": report.moved,
        "oldRootRemoved": report.old_root_removed,
        "migrationFailures": migration_failures_json(&report.migration_failures),
    })
}

fn settings_get(
    state: &mut AppState,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let cascade = vault(state)?;
    Ok(json!({
        "settingsPath": cascade.settings_path().to_string_lossy(),
        "settings": cascade.settings(),
    }))
}

fn settings_change_assignment_root(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let path = get_required_str(params, "path")?;
    if path.trim().is_empty() {
        return Err(HandlerErr::bad_params("path must not be empty"));
    }
    let report = vault(state)?.change_assignment_root(&PathBuf::from(path.trim()))?;
    Ok(relocation_json(&report))
}

fn settings_reset_assignment_root(
    state: &mut AppState,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let report = vault(state)?.reset_assignment_root()?;
    Ok(relocation_json(&report))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "settings.get" => settings_get(state, &req.params),
        "settings.changeAssignmentRoot" => settings_change_assignment_root(state, &req.params),
        "settings.resetAssignmentRoot" => settings_reset_assignment_root(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
