use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Map};
use tracepipe::{KeyValue, Resource, Value};

pub(crate) fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(v) => json!(v),
        Value::I64(v) => json!(v),
        Value::F64(v) => json!(v),
        Value::String(v) => json!(v.as_ref()),
    }
}

pub(crate) fn attributes_json(attributes: &[KeyValue]) -> serde_json::Value {
    let mut map = Map::new();
    for kv in attributes {
        map.insert(kv.key.as_str().to_string(), value_json(&kv.value));
    }
    serde_json::Value::Object(map)
}

pub(crate) fn resource_json(resource: &Resource) -> serde_json::Value {
    let mut map = Map::new();
    for (key, value) in resource.iter() {
        map.insert(key.as_str().to_string(), value_json(value));
    }
    serde_json::Value::Object(map)
}

pub(crate) fn unix_nanos(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}
