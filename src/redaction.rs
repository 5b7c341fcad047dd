//! Secret redaction and error-string shaping for persisted records.
//!
//! Payloads are filtered before every persistence so credential material
//! never reaches the task store; error strings are truncated so a chatty
//! failure cannot bloat a record.

use serde_json::Value;

/// Replacement written over secret values.
pub const REDACTED: &str = "REDACTED";

/// Maximum length of the payload excerpt embedded in an error string.
pub const ERROR_PAYLOAD_EXCERPT_CHARS: usize = 500;

/// Maximum length of the error message embedded in a record; longer
/// messages are elided in the middle.
pub const ERROR_MESSAGE_CHARS: usize = 3000;

/// Key fragments that mark a payload field as secret, matched
/// case-insensitively against every object key.
const SECRET_KEY_MARKERS: &[&str] = &[
    "password",
    "passphrase",
    "secret",
    "token",
    "api_key",
    "apikey",
    "private_key",
    "credential",
];

/// Deep-copy a payload with every secret field replaced by [`REDACTED`].
pub fn redact_payload(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                if is_secret_key(key) {
                    out.insert(key.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(key.clone(), redact_payload(value));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_payload).collect()),
        other => other.clone(),
    }
}

fn is_secret_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SECRET_KEY_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Truncate `s` to at most `max` characters, marking the cut with an
/// ellipsis at the end.
pub fn abbreviate(s: &str, max: usize) -> String {
    let count = s.chars().count();
    if count <= max || max < 4 {
        return s.to_string();
    }
    let head: String = s.chars().take(max - 3).collect();
    format!("{head}...")
}

/// Truncate `s` to at most `max` characters by eliding the middle.
pub fn abbreviate_middle(s: &str, max: usize) -> String {
    let count = s.chars().count();
    if count <= max || max < 5 {
        return s.to_string();
    }
    let keep = max - 3;
    let head_len = keep.div_ceil(2);
    let tail_len = keep - head_len;
    let head: String = s.chars().take(head_len).collect();
    let tail: String = s.chars().skip(count - tail_len).collect();
    format!("{head}...{tail}")
}

/// Render the error string stored in a Failure or Aborted record: a bounded
/// payload excerpt followed by the middle-elided error message.
pub fn format_task_error(payload: &Value, error: &str) -> String {
    format!(
        "Failed to execute task {}, hit error:\n\n{}.",
        abbreviate(&payload.to_string(), ERROR_PAYLOAD_EXCERPT_CHARS),
        abbreviate_middle(error, ERROR_MESSAGE_CHARS)
    )
}
