use serde_json::{Map, Value};

use crate::config::StorageConfig;

pub const REDACTED: &str = "*****";

/// Applies storage policy to a raw payload: dropped when storage is off or
/// the serialized form exceeds the size cap, otherwise redacted.
pub fn prepare(payload: Option<&Value>, storage: &StorageConfig) -> Option<Value> {
    if !storage.store_payload {
        return None;
    }
    let payload = payload?;

    let size = serde_json::to_vec(payload).map(|b| b.len()).unwrap_or(usize::MAX);
    if size > storage.payload_max_bytes {
        tracing::debug!(size, max = storage.payload_max_bytes, "payload over size cap, not stored");
        return None;
    }

    Some(redact(payload, &storage.redact_keys))
}

/// Replaces values under any key containing one of `keys`
/// (case-insensitive), recursively.
pub fn redact(value: &Value, keys: &[String]) -> Value {
    if keys.is_empty() {
        return value.clone();
    }
    let needles: Vec<String> = keys.iter().map(|k| k.to_lowercase()).collect();
    redact_with(value, &needles)
}

fn redact_with(value: &Value, needles: &[String]) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                let lower = k.to_lowercase();
                if needles.iter().any(|n| lower.contains(n.as_str())) {
                    out.insert(k.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(k.clone(), redact_with(v, needles));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_with(v, needles)).collect()),
        other => other.clone(),
    }
}
