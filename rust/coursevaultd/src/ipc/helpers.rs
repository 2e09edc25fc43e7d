use serde_json::json;
use uuid::Uuid;

use crate::cascade::Cascade;
use crate::error::{CascadeError, MigrationError};
use crate::guard::EditToken;
use crate::ipc::error::{err, ok};
use crate::ipc::types::AppState;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<CascadeError> for HandlerErr {
    fn from(e: CascadeError) -> Self {
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

pub fn vault(state: &mut AppState) -> Result<&mut Cascade, HandlerErr> {
    state.vault.as_mut().ok_or_else(|| HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
        details: None,
    })
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    get_optional_str(params, key).ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    get_optional_i64(params, key).ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_i64(params: &serde_json::Value, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.as_i64())
}

/// Years arrive either as `"2024"` or `2024`.
pub fn get_year(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        _ => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

pub fn get_token(params: &serde_json::Value) -> Result<EditToken, HandlerErr> {
    let raw = get_required_str(params, "editToken")?;
    Uuid::parse_str(raw.trim()).map_err(|_| HandlerErr::bad_params("editToken is not a valid token"))
}

pub fn migration_failures_json(failures: &[MigrationError]) -> serde_json::Value {
    json!(failures.iter().map(MigrationError::report).collect::<Vec<_>>())
}
