//! Rehydration of constructor envelopes recovered from storage.
//!
//! Older persistence layers wrote domain values as self-describing
//! envelopes instead of plain JSON:
//!
//! ```json
//! {
//!   "marker": "constructor",
//!   "type_path": ["assistant", "models", "Message"],
//!   "construction_method": null,
//!   "kwargs": {"role": "user", "content": "hello"}
//! }
//! ```
//!
//! [`rehydrate_value`] walks a JSON tree and replaces every envelope whose
//! type is in the closed registry with the plain serialization of the typed
//! value. The registry is keyed by the final `type_path` segment and covers
//! exactly the domain types that ever appear in checkpoints. An envelope
//! with an unknown type, or whose kwargs do not decode, is kept verbatim
//! and logged as a warning; a read never fails because of a stale envelope.

use crate::message::Message;
use crate::models::{
    CollectedData, ExtractedInsights, TaskItem, TranscriptionAnalysis, TranscriptionData,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Marker value identifying a constructor envelope.
pub const ENVELOPE_MARKER: &str = "constructor";

/// Replaces every known constructor envelope in `value` with the plain JSON
/// of the corresponding typed value, recursively.
#[must_use]
pub fn rehydrate_value(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(rehydrate_value).collect()),
        Value::Object(map) => {
            if let Some(type_name) = envelope_type(&map) {
                let type_name = type_name.to_string();
                rehydrate_envelope(&type_name, map)
            } else {
                Value::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, rehydrate_value(v)))
                        .collect(),
                )
            }
        }
        other => other,
    }
}

/// Rehydrates a JSON tree and decodes the result into `T`.
pub fn rehydrate_as<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(rehydrate_value(value))
}

/// Encodes a typed value as a constructor envelope, as the legacy
/// persistence layer would have written it.
pub fn encode<T: Serialize>(
    type_path: &[&str],
    value: &T,
) -> Result<Value, serde_json::Error> {
    Ok(serde_json::json!({
        "marker": ENVELOPE_MARKER,
        "type_path": type_path,
        "construction_method": Value::Null,
        "kwargs": serde_json::to_value(value)?,
    }))
}

/// The final `type_path` segment, when this object is a well-formed
/// envelope.
fn envelope_type(map: &Map<String, Value>) -> Option<&str> {
    if map.get("marker").and_then(Value::as_str) != Some(ENVELOPE_MARKER) {
        return None;
    }
    if !map.get("kwargs").is_some_and(Value::is_object) {
        return None;
    }
    map.get("type_path")
        .and_then(Value::as_array)
        .and_then(|path| path.last())
        .and_then(Value::as_str)
}

fn rehydrate_envelope(type_name: &str, map: Map<String, Value>) -> Value {
    let decoded = match type_name {
        "Message" => decode_kwargs::<Message>(&map),
        "TaskItem" => decode_kwargs::<TaskItem>(&map),
        "CollectedData" => decode_kwargs::<CollectedData>(&map),
        "TranscriptionData" => decode_kwargs::<TranscriptionData>(&map),
        "TranscriptionAnalysis" => decode_kwargs::<TranscriptionAnalysis>(&map),
        "ExtractedInsights" => decode_kwargs::<ExtractedInsights>(&map),
        other => {
            tracing::warn!(
                target: "threadloom::memory",
                type_name = other,
                "unknown constructor envelope type, keeping raw value"
            );
            return Value::Object(map);
        }
    };
    match decoded {
        Ok(plain) => plain,
        Err(e) => {
            tracing::warn!(
                target: "threadloom::memory",
                type_name,
                error = %e,
                "constructor envelope kwargs did not decode, keeping raw value"
            );
            Value::Object(map)
        }
    }
}

fn decode_kwargs<T: DeserializeOwned + Serialize>(
    map: &Map<String, Value>,
) -> Result<Value, serde_json::Error> {
    // Kwargs may themselves contain nested envelopes.
    let kwargs = rehydrate_value(map.get("kwargs").cloned().unwrap_or(Value::Null));
    let typed: T = serde_json::from_value(kwargs)?;
    serde_json::to_value(&typed)
}
