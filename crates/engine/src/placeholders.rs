//! `{{key}}` substitution against a run's context.

use serde_json::Value;

use crate::models::Context;

/// Replace every `{{key}}` in `template` with `context[key]`.
///
/// Keys are trimmed, so `{{ user }}` works. A missing key becomes the empty
/// string. An unclosed `{{` is left as-is.
pub fn render(template: &str, context: &Context) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        let key = rest[start + 2..start + 2 + len].trim();
        if let Some(value) = context.get(key) {
            out.push_str(value);
        }
        rest = &rest[start + 2 + len + 2..];
    }

    out.push_str(rest);
    out
}

/// [`render`] applied to every string inside a JSON value.
pub fn render_value(value: &Value, context: &Context) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, context)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, context)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        [("username", "alice"), ("amount", "5")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_keys() {
        assert_eq!(render("Hi {{username}}", &ctx()), "Hi alice");
        assert_eq!(render("{{ username }} gave {{amount}}", &ctx()), "alice gave 5");
    }

    #[test]
    fn missing_keys_become_empty() {
        assert_eq!(render("Hi {{nobody}}!", &ctx()), "Hi !");
    }

    #[test]
    fn unclosed_braces_are_kept() {
        assert_eq!(render("Hi {{username", &ctx()), "Hi {{username");
        assert_eq!(render("no placeholders", &ctx()), "no placeholders");
    }

    #[test]
    fn renders_nested_json_strings_only() {
        let value = json!({ "text": "Thanks {{username}}", "volume": 80, "tags": ["{{amount}}"] });
        assert_eq!(
            render_value(&value, &ctx()),
            json!({ "text": "Thanks alice", "volume": 80, "tags": ["5"] })
        );
    }
}
