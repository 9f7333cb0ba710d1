pub mod events;
pub mod executions;
pub mod scripts;
pub mod workflows;

use std::collections::HashMap;

use axum::Json;
use engine::Context;
use serde_json::Value;

/// A run context as posted by clients. Non-string values are accepted and
/// stringified, so `{"donation": 150}` works like `{"donation": "150"}`.
pub type ContextBody = HashMap<String, Value>;

/// A missing or unparsable body is an empty context.
pub fn context_from(body: Option<Json<ContextBody>>) -> Context {
    body.map(|Json(map)| {
        map.into_iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect()
    })
    .unwrap_or_default()
}
