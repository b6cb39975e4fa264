// crates/orderflow-core/src/core/redact.rs
// ============================================================================
// Module: Orderflow Redaction
// Description: Secret scrubbing shared by evidence packs and event payloads.
// Purpose: Keep credential-shaped values out of prompts, logs, and blobs.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Sample values and inline event payloads pass through this scrub before
//! persistence or prompt construction. Detection is deliberately coarse:
//! anything resembling a bearer token, an API key, a key=value credential
//! assignment, or a long high-entropy token is replaced wholesale. False
//! positives cost a sample value; false negatives leak a secret.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Replacement marker for redacted values.
pub const REDACTED: &str = "[redacted]";

/// Key substrings that mark a key=value pair as a credential assignment.
const SECRET_KEYS: [&str; 6] = ["password", "passwd", "secret", "token", "api_key", "apikey"];

/// Value prefixes that mark a bare value as a credential.
const SECRET_PREFIXES: [&str; 4] = ["sk-", "bearer ", "basic ", "akia"];

/// Minimum length at which an unbroken base64/hex-ish run is treated as a
/// credential.
const LONG_TOKEN_LENGTH: usize = 40;

// ============================================================================
// SECTION: Text Redaction
// ============================================================================

/// Scrubs one text value, returning the clean text and a redaction note.
///
/// The note names what was detected (not the value) so events can record that
/// redaction happened without reintroducing the secret.
#[must_use]
pub fn redact_text(text: &str) -> (String, Option<String>) {
    let lower = text.to_lowercase();

    for prefix in SECRET_PREFIXES {
        if lower.trim_start().starts_with(prefix) {
            return (REDACTED.to_string(), Some(format!("credential prefix `{}`", prefix.trim())));
        }
    }

    for key in SECRET_KEYS {
        if let Some(pos) = lower.find(key) {
            let rest = &lower[pos + key.len()..];
            if rest.trim_start().starts_with('=') || rest.trim_start().starts_with(':') {
                return (REDACTED.to_string(), Some(format!("credential assignment `{key}`")));
            }
        }
    }

    if looks_like_long_token(text) {
        return (REDACTED.to_string(), Some("high-entropy token".to_string()));
    }

    (text.to_string(), None)
}

/// Returns true for unbroken base64/hex-ish runs long enough to be keys.
///
/// Lowercase-hex SHA-256 digests are exempt: content digests appear all over
/// event payloads and pointers, and scrubbing them would break replay.
fn looks_like_long_token(text: &str) -> bool {
    let trimmed = text.trim();
    let is_sha256_hex =
        trimmed.len() == 64 && trimmed.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    !is_sha256_hex
        && trimmed.len() >= LONG_TOKEN_LENGTH
        && trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=' || c == '_' || c == '-')
        && trimmed.chars().any(|c| c.is_ascii_digit())
        && trimmed.chars().any(char::is_alphabetic)
}

// ============================================================================
// SECTION: Payload Redaction
// ============================================================================

/// Scrubs every string inside a JSON payload in place.
///
/// Returns the redaction notes that were applied, deduplicated in first-seen
/// order.
#[must_use]
pub fn redact_value(value: &mut Value) -> Vec<String> {
    let mut notes = Vec::new();
    walk(value, &mut notes);
    notes
}

/// Recursive scrub helper.
fn walk(value: &mut Value, notes: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            let (clean, note) = redact_text(text);
            if let Some(note) = note {
                *text = clean;
                if !notes.contains(&note) {
                    notes.push(note);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, notes);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                walk(item, notes);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
