//! Deep merge for partial configuration updates.
//!
//! Scalars and objects from the patch override the base; array fields are
//! replaced wholesale, with one exception. A `servers` array is merged by
//! the `name` key: a patch entry whose name matches an existing server
//! updates that descriptor in place, an unmatched entry is appended, and
//! base entries the patch does not mention are preserved in order.
//! Duplicate names in the patch update the first match only.

use serde_json::Value;

use crate::config::ConfigError;

pub fn deep_merge(base: &mut Value, patch: &Value) -> Result<(), ConfigError> {
    let Value::Object(patch_map) = patch else {
        return Err(ConfigError::Merge(
            "partial configuration must be a JSON object".to_owned(),
        ));
    };
    let Value::Object(base_map) = base else {
        return Err(ConfigError::Merge(
            "cannot merge into a non-object value".to_owned(),
        ));
    };
    for (key, patch_value) in patch_map {
        let merged_in_place = match base_map.get_mut(key) {
            Some(base_child) => merge_child(key, base_child, patch_value)?,
            None => false,
        };
        if !merged_in_place {
            base_map.insert(key.clone(), patch_value.clone());
        }
    }
    Ok(())
}

fn merge_child(key: &str, base_child: &mut Value, patch_value: &Value) -> Result<bool, ConfigError> {
    match (base_child, patch_value) {
        (Value::Array(base_items), Value::Array(patch_items)) if key == "servers" => {
            merge_servers(base_items, patch_items)?;
            Ok(true)
        }
        (base_child @ Value::Object(_), Value::Object(_)) => {
            deep_merge(base_child, patch_value)?;
            Ok(true)
        }
        // Scalar or non-servers array: caller replaces wholesale.
        _ => Ok(false),
    }
}

fn merge_servers(base_items: &mut Vec<Value>, patch_items: &[Value]) -> Result<(), ConfigError> {
    for patch_entry in patch_items {
        if !patch_entry.is_object() {
            return Err(ConfigError::Merge(
                "servers entries must be JSON objects".to_owned(),
            ));
        }
        let name = patch_entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ConfigError::Merge(
                    "servers entries in a partial update must carry a name".to_owned(),
                )
            })?;
        let position = base_items
            .iter()
            .position(|entry| entry.get("name").and_then(Value::as_str) == Some(name));
        match position {
            Some(i) => deep_merge(&mut base_items[i], patch_entry)?,
            None => base_items.push(patch_entry.clone()),
        }
    }
    Ok(())
}
