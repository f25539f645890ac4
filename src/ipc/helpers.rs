use serde_json::json;

use crate::ipc::error::err;
use crate::seating::SeatingError;

/// Handler-internal failure carrying the stable error code the client
/// switches on. Converted to the wire envelope at the handler boundary.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn db(code: &'static str, e: rusqlite::Error) -> Self {
        HandlerErr {
            code,
            message: e.to_string(),
            details: None,
        }
    }
}

impl From<SeatingError> for HandlerErr {
    fn from(e: SeatingError) -> Self {
        let code = match &e {
            SeatingError::UnknownHall(_) | SeatingError::UnknownStudent(_) => "not_found",
            SeatingError::SeatOutOfBounds { .. } => "bad_params",
            SeatingError::DuplicateStudent(_) => "conflict",
        };
        HandlerErr {
            code,
            message: e.to_string(),
            details: None,
        }
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn get_required_dim(params: &serde_json::Value, key: &str) -> Result<usize, HandlerErr> {
    match params.get(key).and_then(|v| v.as_i64()) {
        Some(v) if v >= 1 => Ok(v as usize),
        _ => Err(HandlerErr::bad_params(format!(
            "{} must be a positive integer",
            key
        ))),
    }
}

pub fn get_required_index(params: &serde_json::Value, key: &str) -> Result<usize, HandlerErr> {
    match params.get(key).and_then(|v| v.as_i64()) {
        Some(v) if v >= 0 => Ok(v as usize),
        _ => Err(HandlerErr {
            code: "bad_params",
            message: format!("missing/invalid {}", key),
            details: Some(json!({ "key": key })),
        }),
    }
}
