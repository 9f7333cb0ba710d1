//! The node template catalog.
//!
//! Built once at startup and shared read-only. Template ids double as keys
//! into the node behaviour table in the `nodes` crate.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::models::{NodeTemplate, Parameter, ParameterType, TemplateCategory};

#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, NodeTemplate>,
}

fn template(
    id: &str,
    category: TemplateCategory,
    name: &str,
    inputs: &[(&str, ParameterType)],
    outputs: &[(&str, ParameterType)],
    default_config: Value,
) -> NodeTemplate {
    let params = |list: &[(&str, ParameterType)]| {
        list.iter()
            .map(|(name, kind)| Parameter::new(*name, *kind))
            .collect::<Vec<_>>()
    };
    NodeTemplate {
        id: id.into(),
        category,
        name: name.into(),
        inputs: params(inputs),
        outputs: params(outputs),
        default_config,
    }
}

impl TemplateCatalog {
    /// An empty catalog (for testing).
    pub fn empty() -> Self {
        Self::default()
    }

    /// The templates every installation ships with.
    pub fn builtin() -> Self {
        use ParameterType::{Any, Number, String as Str};
        use TemplateCategory::{Action, Data, Logic, Trigger};

        let mut catalog = Self::empty();
        for t in [
            template("event-trigger", Trigger, "Event Trigger", &[("eventName", Str)], &[("payload", Any)], json!({ "eventName": "" })),
            template("schedule-trigger", Trigger, "Schedule Trigger", &[("scheduleExpr", Str)], &[], json!({ "scheduleExpr": "" })),
            template("manual-trigger", Trigger, "Manual Trigger", &[], &[], json!({})),
            template("switch-scene", Action, "Switch Scene", &[("sceneName", Str)], &[], json!({ "sceneName": "" })),
            template("play-sound", Action, "Play Sound", &[("sound", Str), ("volume", Number)], &[], json!({ "sound": "", "volume": 100 })),
            template("show-alert", Action, "Show Alert", &[("title", Str), ("message", Str), ("duration", Number)], &[], json!({ "title": "Alert", "message": "", "duration": 5 })),
            template("speak", Action, "Text to Speech", &[("text", Str)], &[], json!({ "text": "" })),
            template("delay", Logic, "Delay", &[("seconds", Number)], &[], json!({ "seconds": 1 })),
            template("random-number", Data, "Random Number", &[("min", Number), ("max", Number), ("variable", Str)], &[("value", Number)], json!({ "min": 1, "max": 100 })),
            template("set-variable", Data, "Set Variable", &[("name", Str), ("value", Any)], &[("value", Any)], json!({ "name": "", "value": null })),
            template("log", Data, "Log Message", &[("message", Str), ("level", Str)], &[], json!({ "message": "", "level": "info" })),
        ] {
            catalog.register(t);
        }
        catalog
    }

    /// Add or replace a template.
    pub fn register(&mut self, template: NodeTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, id: &str) -> Option<&NodeTemplate> {
        self.templates.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Every template, ordered by id.
    pub fn list(&self) -> Vec<&NodeTemplate> {
        self.templates.values().collect()
    }

    pub fn by_category(&self, category: TemplateCategory) -> Vec<&NodeTemplate> {
        self.templates
            .values()
            .filter(|t| t.category == category)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::BehaviorTable;

    #[test]
    fn builtin_action_templates_have_behaviours() {
        let catalog = TemplateCatalog::builtin();
        let behaviors = BehaviorTable::builtin();
        for category in [TemplateCategory::Action, TemplateCategory::Logic, TemplateCategory::Data] {
            for t in catalog.by_category(category) {
                assert!(behaviors.contains(&t.id), "no behaviour for '{}'", t.id);
            }
        }
    }

    #[test]
    fn defaults_cover_every_input() {
        for t in TemplateCatalog::builtin().list() {
            for input in &t.inputs {
                if input.name != "variable" {
                    assert!(
                        t.default_config.get(&input.name).is_some(),
                        "'{}' has no default for '{}'",
                        t.id,
                        input.name
                    );
                }
            }
        }
    }

    #[test]
    fn lookup_and_category_filter() {
        let catalog = TemplateCatalog::builtin();
        assert_eq!(catalog.get("delay").unwrap().category, TemplateCategory::Logic);
        assert!(!catalog.contains("teleport"));
        assert_eq!(catalog.by_category(TemplateCategory::Trigger).len(), 3);
    }
}
