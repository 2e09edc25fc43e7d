use crate::cascade::CourseRef;
use crate::ipc::helpers::{
    get_optional_i64, get_optional_str, get_required_i64, get_required_str, respond, vault,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn course_ref(params: &serde_json::Value) -> Option<CourseRef> {
    get_optional_i64(params, "courseId")
        .map(CourseRef::Id)
        .or_else(|| get_optional_str(params, "courseCode").map(CourseRef::Code))
}

// Accepts a bool or the stored "Yes"/"No" spelling.
fn cloud_backup_flag(params: &serde_json::Value) -> Result<bool, HandlerErr> {
    match params.get("cloudBackup") {
        None | Some(serde_json::Value::Null) => Ok(false),
        Some(serde_json::Value::Bool(b)) => Ok(*b),
        Some(serde_json::Value::String(s)) if s.eq_ignore_ascii_case("yes") => Ok(true),
        Some(serde_json::Value::String(s)) if s.eq_ignore_ascii_case("no") => Ok(false),
        Some(_) => Err(HandlerErr::bad_params("cloudBackup must be true/false or Yes/No")),
    }
}

fn assignments_list(
    state: &mut AppState,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let assignments = vault(state)?.list_assignments()?;
    Ok(json!({ "assignments": assignments }))
}

fn assignments_upload(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course = course_ref(params);
    let name = get_optional_str(params, "name").unwrap_or_default();
    let source = get_optional_str(params, "sourcePath")
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);
    let cloud_backup = cloud_backup_flag(params)?;
    let assignment = vault(state)?.upload_assignment(
        course.as_ref(),
        &name,
        source.as_deref(),
        cloud_backup,
    )?;
    Ok(json!({ "assignment": assignment }))
}

fn assignments_open(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let file = vault(state)?.assignment_file(id)?;
    Ok(json!(file))
}

fn assignments_delete(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let removed = vault(state)?.delete_assignment(id)?;
    Ok(json!({ "deleted": removed }))
}

fn assignments_count(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let code = get_required_str(params, "courseCode")?;
    let count = vault(state)?.assignment_count(&code)?;
    Ok(json!({ "courseCode": code, "count": count }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assignments.list" => assignments_list(state, &req.params),
        "assignments.upload" => assignments_upload(state, &req.params),
        "assignments.open" => assignments_open(state, &req.params),
        "assignments.delete" => assignments_delete(state, &req.params),
        "assignments.count" => assignments_count(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
