//! Configuration file merging
//!
//! Supports layered configuration:
//! - base.yaml (defaults)
//! - environment.yaml (env-specific)
//! - local.yaml (operator overrides)

use pulse_core::{Error, Result};
use serde_json::Value;

/// Merge configuration documents in order
///
/// Objects merge key by key, recursively. Any other value in a later
/// document replaces the earlier one, arrays included.
pub fn merge_values(values: Vec<Value>) -> Result<Value> {
    let mut iter = values.into_iter();
    let mut result = iter
        .next()
        .ok_or_else(|| Error::Config("No configurations to merge".to_string()))?;

    for overlay in iter {
        merge_into(&mut result, overlay);
    }

    Ok(result)
}

fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        // An empty overlay document keeps the base
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}
