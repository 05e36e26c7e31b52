//! Redaction and sanitization helpers used by the interceptor (C6 step 5, I6).
//!
//! Redaction always wins over sanitization: if a declared path matches the
//! redaction set, the stored value is the replacement token, never the
//! original, regardless of how deep or how well-formed the sanitizer would
//! otherwise consider it.

use std::collections::HashSet;

use serde_json::Value;

pub const REDACTION_TOKEN: &str = "[REDACTED]";

/// Paths redacted unconditionally, unioned with any handler-declared paths
/// (§4.5: "Redact paths are the union of a fixed default set ... and any
/// user-supplied paths").
pub fn default_redact_paths() -> Vec<String> {
    vec![
        "body.password".to_string(),
        "body.passwordConfirmation".to_string(),
        "body.token".to_string(),
        "body.secret".to_string(),
        "headers.authorization".to_string(),
        "headers.cookie".to_string(),
        "headers.x-api-key".to_string(),
    ]
}

pub fn build_redact_set(extra: impl IntoIterator<Item = String>) -> HashSet<String> {
    let mut set: HashSet<String> = default_redact_paths().into_iter().collect();
    set.extend(extra);
    set
}

#[derive(Debug, Clone, Copy)]
pub struct SanitizeLimits {
    pub max_depth: usize,
    pub max_string_length: usize,
    pub max_array_length: usize,
    pub max_object_keys: usize,
}

impl Default for SanitizeLimits {
    fn default() -> Self {
        SanitizeLimits {
            max_depth: 5,
            max_string_length: 500,
            max_array_length: 20,
            max_object_keys: 50,
        }
    }
}

/// Reads a dot-separated path (`body.password`) out of a JSON value tree.
pub fn extract_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Returns the final path segment, used as the allowlisted field's storage key.
pub fn path_field_name(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

pub fn sanitize_value(value: &Value, limits: &SanitizeLimits) -> Value {
    sanitize_at_depth(value, limits, 0)
}

fn sanitize_at_depth(value: &Value, limits: &SanitizeLimits, depth: usize) -> Value {
    if depth >= limits.max_depth {
        return Value::String("[TRUNCATED_DEPTH]".to_string());
    }
    match value {
        Value::String(s) => Value::String(truncate_chars(s, limits.max_string_length)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .take(limits.max_array_length)
                .map(|v| sanitize_at_depth(v, limits, depth + 1))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, val) in map.iter().take(limits.max_object_keys) {
                out.insert(key.clone(), sanitize_at_depth(val, limits, depth + 1));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
