use crate::guard::EntityKind;
use crate::ipc::helpers::{get_required_str, respond, vault, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let sessions = state.vault.as_ref().map(|v| {
        json!({
            "semester": v.session_state(EntityKind::Semester),
            "course": v.session_state(EntityKind::Course),
        })
    });
    respond(
        &req.id,
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "settingsPath": state.settings_path.as_ref().map(|p| p.to_string_lossy().to_string()),
            "sessions": sessions,
        })),
    )
}

fn workspace_select(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(get_required_str(params, "settingsPath")?);
    state.select_workspace(&path)?;
    let settings = vault(state)?.settings().clone();
    info!(settings = %path.display(), "workspace selected");
    Ok(json!({
        "settingsPath": path.to_string_lossy(),
        "assignmentRootFolder": settings.assignment_root_folder.to_string_lossy(),
    }))
}

fn stats_summary(
    state: &mut AppState,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!(vault(state)?.summary()?))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => return Some(handle_health(state, req)),
        "workspace.select" => workspace_select(state, &req.params),
        "stats.summary" => stats_summary(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
