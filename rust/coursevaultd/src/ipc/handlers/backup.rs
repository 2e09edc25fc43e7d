use crate::ipc::helpers::{get_required_str, respond, vault, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn required_path(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let raw = get_required_str(params, key)?;
    match raw.trim() {
        "" => Err(HandlerErr::bad_params(format!("missing {}", key))),
        v => Ok(v.to_string()),
    }
}

fn backup_export(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let out_path = required_path(params, "outPath")?;
    let report = vault(state)?.export_backup(&PathBuf::from(&out_path))?;
    Ok(json!({
        "path": out_path,
        "bundleFormat": report.bundle_format,
        "entryCount": report.entry_count,
        "skippedAssignments": report.skipped,
    }))
}

fn backup_import(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let in_path = required_path(params, "inPath")?;
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr {
            code: "not_found",
            message: "bundle file not found".to_string(),
            details: Some(json!({ "path": in_path })),
        });
    }
    let report = vault(state)?.import_backup(&src)?;
    Ok(json!({
        "path": in_path,
        "bundleFormatDetected": report.bundle_format,
        "entryCount": report.entry_count,
        "semesters": report.semesters,
        "courses": report.courses,
        "assignments": report.assignments,
        "missingFiles": report.missing_files,
        "removedFiles": report.removed_files,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.export" => backup_export(state, &req.params),
        "backup.import" => backup_import(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
