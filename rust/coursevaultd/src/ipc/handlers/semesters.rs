use crate::guard::EntityKind;
use crate::ipc::helpers::{
    get_required_i64, get_required_str, get_token, get_year, migration_failures_json, respond,
    vault, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn semesters_list(
    state: &mut AppState,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let rows = vault(state)?.list_semesters()?;
    Ok(json!({ "semesters": rows }))
}

fn semesters_create(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let season = get_required_str(params, "season")?;
    let year = get_year(params, "year")?;
    let saved = vault(state)?.add_or_update_semester(&season, &year, None)?;
    Ok(json!({ "semester": saved.record }))
}

fn semesters_begin_edit(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let (token, semester) = vault(state)?.begin_semester_edit(id)?;
    Ok(json!({
        "editToken": token.to_string(),
        "semester": semester,
    }))
}

fn semesters_update(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let token = get_token(params)?;
    let season = get_required_str(params, "season")?;
    let year = get_year(params, "year")?;
    let saved = vault(state)?.add_or_update_semester(&season, &year, Some(token))?;
    Ok(json!({
        "semester": saved.record,
        "migrationFailures": migration_failures_json(&saved.migration_failures),
    }))
}

fn semesters_cancel_edit(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let token = get_token(params)?;
    vault(state)?.cancel_edit(EntityKind::Semester, token)?;
    Ok(json!({ "cancelled": true }))
}

fn semesters_delete(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let removed = vault(state)?.delete_semester(id)?;
    Ok(json!({ "deleted": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "semesters.list" => semesters_list(state, &req.params),
        "semesters.create" => semesters_create(state, &req.params),
        "semesters.beginEdit" => semesters_begin_edit(state, &req.params),
        "semesters.update" => semesters_update(state, &req.params),
        "semesters.cancelEdit" => semesters_cancel_edit(state, &req.params),
        "semesters.delete" => semesters_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
