use crate::cascade::SemesterRef;
use crate::guard::EntityKind;
use crate::ipc::helpers::{
    get_optional_i64, get_optional_str, get_required_i64, get_required_str, get_token,
    migration_failures_json, respond, vault, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

// `semesterId` wins over the display label when both are sent.
fn semester_ref(params: &serde_json::Value) -> Option<SemesterRef> {
    get_optional_i64(params, "semesterId")
        .map(SemesterRef::Id)
        .or_else(|| get_optional_str(params, "semester").map(SemesterRef::Label))
}

fn courses_list(
    state: &mut AppState,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let rows = vault(state)?.list_courses()?;
    Ok(json!({ "courses": rows }))
}

fn courses_create(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let semester = semester_ref(params);
    let code = get_required_str(params, "courseCode")?;
    let name = get_required_str(params, "courseName")?;
    let saved = vault(state)?.add_or_update_course(semester.as_ref(), &code, &name, None)?;
    Ok(json!({ "course": saved.record }))
}

fn courses_begin_edit(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let (token, course) = vault(state)?.begin_course_edit(id)?;
    Ok(json!({
        "editToken": token.to_string(),
        "course": course,
    }))
}

fn courses_update(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let token = get_token(params)?;
    let semester = semester_ref(params);
    let code = get_required_str(params, "courseCode")?;
    let name = get_required_str(params, "courseName")?;
    let saved =
        vault(state)?.add_or_update_course(semester.as_ref(), &code, &name, Some(token))?;
    Ok(json!({
        "course": saved.record,
        "migrationFailures": migration_failures_json(&saved.migration_failures),
    }))
}

fn courses_cancel_edit(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let token = get_token(params)?;
    vault(state)?.cancel_edit(EntityKind::Course, token)?;
    Ok(json!({ "cancelled": true }))
}

fn courses_delete(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_i64(params, "id")?;
    let removed = vault(state)?.delete_course(id)?;
    Ok(json!({ "deleted": removed }))
}

fn courses_count_for_semester(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let semester_id = get_required_i64(params, "semesterId")?;
    let count = vault(state)?.course_count_for_semester(semester_id)?;
    Ok(json!({ "semesterId": semester_id, "count": count }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "courses.list" => courses_list(state, &req.params),
        "courses.create" => courses_create(state, &req.params),
        "courses.beginEdit" => courses_begin_edit(state, &req.params),
        "courses.update" => courses_update(state, &req.params),
        "courses.cancelEdit" => courses_cancel_edit(state, &req.params),
        "courses.delete" => courses_delete(state, &req.params),
        "courses.countForSemester" => courses_count_for_semester(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
