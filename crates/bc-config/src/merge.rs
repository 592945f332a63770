//! 覆盖树合并：把用户覆盖（override）深度合并进生成的 JSON（base）
//! 约定：
//! - 双方同为对象 → 递归合并
//! - 否则 override 的值直接替换 base（对象可被标量/数组替换）
//! - override 中不存在的键保持不变；空 override 为 no-op
use serde_json::{Map, Value};

/// Deep-merge `overlay` into `base` in place.
///
/// A non-object or empty overlay leaves `base` untouched. A non-object base is
/// replaced by an empty object before merging a non-empty overlay.
pub fn merge_json(base: &mut Value, overlay: &Value) {
    let Some(overlay) = overlay.as_object() else {
        return;
    };
    if overlay.is_empty() {
        return;
    }
    if !base.is_object() {
        *base = Value::Object(Map::new());
    }
    if let Value::Object(map) = base {
        merge_map(map, overlay);
    }
}

/// Map-level form of [`merge_json`].
pub fn merge_map(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(orig)), Value::Object(sub)) => merge_map(orig, sub),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Normalize a stored override tree.
///
/// Stores keep overrides either as inline objects or as JSON text; text that
/// does not parse to an object yields an empty tree.
pub fn override_tree(raw: &Value) -> Value {
    match raw {
        Value::Object(_) => raw.clone(),
        Value::String(text) if !text.trim().is_empty() => {
            match serde_json::from_str::<Value>(text) {
                Ok(v @ Value::Object(_)) => v,
                Ok(_) | Err(_) => {
                    tracing::debug!("override tree is not a JSON object, ignored");
                    Value::Object(Map::new())
                }
            }
        }
        _ => Value::Object(Map::new()),
    }
}
