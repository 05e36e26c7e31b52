//! Error normalizer (C3): maps the closed sum of failure shapes a handler can
//! raise onto a stable `{code, message, meta}` triple recorded on the event.

use serde_json::{Map, Value};

const MAX_MESSAGE_LEN: usize = 200;
const MAX_STACK_FRAMES: usize = 5;
const MAX_RESPONSE_BODY_LEN: usize = 2000;

/// The closed sum of failure shapes the interceptor can observe from a handler.
#[derive(Debug, Clone)]
pub enum ErrorSource {
    /// An error the HTTP framework itself produced or propagated, carrying a
    /// status code and an optional structured body.
    Http {
        status: u16,
        body: Option<Value>,
        exception_name: Option<String>,
        stack_trace: Option<Vec<String>>,
    },
    /// A generic language-level error/exception with a `code`/`status` and message.
    Generic {
        code: Option<String>,
        status: Option<String>,
        class_name: Option<String>,
        message: Option<String>,
    },
    /// Anything else — stringified and bounded.
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NormalizedError {
    pub code: String,
    pub message: String,
    pub meta: Map<String, Value>,
}

pub fn normalize_error(source: &ErrorSource, is_production: bool) -> NormalizedError {
    match source {
        ErrorSource::Http {
            status,
            body,
            exception_name,
            stack_trace,
        } => normalize_http(*status, body.as_ref(), exception_name.as_deref(), stack_trace.as_deref(), is_production),
        ErrorSource::Generic {
            code,
            status,
            class_name,
            message,
        } => normalize_generic(code.as_deref(), status.as_deref(), class_name.as_deref(), message.as_deref()),
        ErrorSource::Opaque(s) => NormalizedError {
            code: "UNKNOWN".to_string(),
            message: truncate(s, MAX_MESSAGE_LEN),
            meta: Map::new(),
        },
    }
}

fn normalize_http(
    status: u16,
    body: Option<&Value>,
    exception_name: Option<&str>,
    stack_trace: Option<&[String]>,
    is_production: bool,
) -> NormalizedError {
    let code = body
        .and_then(|b| b.as_object())
        .and_then(|obj| {
            ["errorCode", "code", "error", "statusCode"]
                .iter()
                .find_map(|k| obj.get(*k))
        })
        .and_then(value_as_code_string)
        .unwrap_or_else(|| map_status_to_code(status));

    let message = body
        .map(extract_message_from_body)
        .unwrap_or_else(|| "Unknown error".to_string());

    let mut meta = Map::new();
    meta.insert("httpStatus".to_string(), Value::from(status));
    if let Some(name) = exception_name {
        meta.insert("exceptionName".to_string(), Value::from(name));
    }
    if let Some(b) = body {
        meta.insert("response".to_string(), sanitize_response(b));
    }
    if !is_production {
        if let Some(frames) = stack_trace {
            let truncated: Vec<Value> = frames
                .iter()
                .take(MAX_STACK_FRAMES)
                .map(|f| Value::from(f.as_str()))
                .collect();
            meta.insert("stackTrace".to_string(), Value::Array(truncated));
        }
    }

    NormalizedError {
        code,
        message: truncate(&message, MAX_MESSAGE_LEN),
        meta,
    }
}

fn normalize_generic(
    code: Option<&str>,
    status: Option<&str>,
    class_name: Option<&str>,
    message: Option<&str>,
) -> NormalizedError {
    let code = code
        .or(status)
        .or(class_name)
        .map(str::to_string)
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let message = message.unwrap_or("Unknown error");
    NormalizedError {
        code,
        message: truncate(message, MAX_MESSAGE_LEN),
        meta: Map::new(),
    }
}

fn value_as_code_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn map_status_to_code(status: u16) -> String {
    match status {
        400 => "BAD_REQUEST".to_string(),
        401 => "UNAUTHORIZED".to_string(),
        403 => "FORBIDDEN".to_string(),
        404 => "NOT_FOUND".to_string(),
        422 => "VALIDATION_ERROR".to_string(),
        429 => "RATE_LIMITED".to_string(),
        500 => "INTERNAL_ERROR".to_string(),
        504 => "GATEWAY_TIMEOUT".to_string(),
        other => format!("HTTP_{other}"),
    }
}

fn extract_message_from_body(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "Unknown error".to_string()),
        Value::Array(items) => {
            let total = items.len();
            let head: Vec<String> = items
                .iter()
                .take(3)
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            let joined = head.join("; ");
            if total > 3 {
                format!("{joined} (+{} more)", total - 3)
            } else {
                joined
            }
        }
        other => other.to_string(),
    }
}

fn sanitize_response(body: &Value) -> Value {
    let serialized = serde_json::to_string(body).unwrap_or_default();
    if serialized.len() <= MAX_RESPONSE_BODY_LEN {
        body.clone()
    } else {
        Value::String(truncate(&serialized, MAX_RESPONSE_BODY_LEN))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
