//! Script → workflow conversion.
//!
//! One direction only, and a snapshot: the generated workflow is not kept in
//! sync with the script afterwards.
//!
//! Only the first rule is converted. Its trigger becomes the workflow trigger
//! and each action with a known template becomes one node, laid out left to
//! right and chained to the previous node. Actions without a mapping are
//! skipped. Rules after the first are dropped with a warning.

use dsl::{ActionCall, Trigger};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::{Position, Script, Workflow, WorkflowNode};
use crate::templates::TemplateCatalog;
use crate::EngineError;

/// Script command → node template id.
pub const COMMAND_TEMPLATES: &[(&str, &str)] = &[
    ("switchScene", "switch-scene"),
    ("playSound", "play-sound"),
    ("showAlert", "show-alert"),
    ("speak", "speak"),
    ("wait", "delay"),
    ("randomNumber", "random-number"),
    ("setVariable", "set-variable"),
    ("log", "log"),
];

/// Canvas position of the first generated node.
pub const ORIGIN: Position = Position { x: 100.0, y: 100.0 };
/// Horizontal gap between consecutive generated nodes.
pub const NODE_SPACING: f64 = 250.0;

pub fn template_for(command: &str) -> Option<&'static str> {
    COMMAND_TEMPLATES
        .iter()
        .find(|(c, _)| *c == command)
        .map(|(_, t)| *t)
}

/// Build a workflow equivalent to the script's first rule.
///
/// # Errors
/// [`EngineError::Syntax`] if the script does not parse.
pub fn convert_to_workflow(script: &Script, catalog: &TemplateCatalog) -> Result<Workflow, EngineError> {
    let program = script.program()?;

    let mut rules = program.rules.into_iter();
    let Some(rule) = rules.next() else {
        warn!("script '{}' has no rules; generating an empty manual workflow", script.name);
        return Ok(generated(script, Trigger::Manual));
    };
    let dropped = rules.count();
    if dropped > 0 {
        warn!("script '{}': {} rule(s) after the first are not converted", script.name, dropped);
    }

    let mut workflow = generated(script, rule.trigger);
    let mut previous: Option<String> = None;

    for action in &rule.actions {
        let Some(node) = node_for(action, catalog, workflow.nodes.len()) else {
            debug!("no template for command '{}', skipped", action.command);
            continue;
        };
        let id = node.id.clone();
        workflow.nodes.push(node);
        if let Some(prev) = previous.replace(id.clone()) {
            workflow.connect(&prev, &id, None, None)?;
        }
    }

    Ok(workflow)
}

fn generated(script: &Script, trigger: Trigger) -> Workflow {
    let mut workflow = Workflow::new(script.name.clone(), trigger);
    workflow.description = Some(format!("Generated from script '{}'", script.name));
    // The script itself still reacts to the same trigger.
    workflow.enabled = false;
    workflow
}

/// Instantiate the node for `action`, placing it at slot `slot`.
fn node_for(action: &ActionCall, catalog: &TemplateCatalog, slot: usize) -> Option<WorkflowNode> {
    let template = catalog.get(template_for(&action.command)?)?;
    let position = Position::new(ORIGIN.x + NODE_SPACING * slot as f64, ORIGIN.y);
    let mut node = WorkflowNode::from_template(template, position);

    // Positional arguments fill the template inputs in declaration order.
    let mut config = match node.config.take() {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (input, arg) in template.inputs.iter().zip(&action.args) {
        config.insert(input.name.clone(), Value::from(arg));
    }
    node.config = Value::Object(config);

    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn convert(code: &str) -> Workflow {
        convert_to_workflow(&Script::new("test", code), &TemplateCatalog::builtin()).unwrap()
    }

    #[test]
    fn mapped_actions_become_a_linear_chain() {
        let wf = convert(
            "on follower do
                speak('Welcome {{username}}')
                wait(2)
                showAlert('New follower', '{{username}}', 5)
            end",
        );

        let templates: Vec<_> = wf.nodes.iter().map(|n| n.template_id.as_str()).collect();
        assert_eq!(templates, vec!["speak", "delay", "show-alert"]);

        assert_eq!(wf.connections.len(), 2);
        for (i, c) in wf.connections.iter().enumerate() {
            assert_eq!(c.source_node_id, wf.nodes[i].id);
            assert_eq!(c.target_node_id, wf.nodes[i + 1].id);
        }
        assert_eq!(wf.trigger, Trigger::event("follower"));
    }

    #[test]
    fn arguments_fill_template_inputs_over_defaults() {
        let wf = convert("on raid do showAlert('Raid!') playSound('airhorn', 40) end");
        assert_eq!(
            wf.nodes[0].config,
            json!({ "title": "Raid!", "message": "", "duration": 5 })
        );
        assert_eq!(wf.nodes[1].config, json!({ "sound": "airhorn", "volume": 40 }));
    }

    #[test]
    fn unmapped_actions_are_skipped_without_breaking_the_chain() {
        let wf = convert("on raid do speak('a') startRecording() speak('b') end");
        assert_eq!(wf.nodes.len(), 2);
        assert_eq!(wf.connections.len(), 1);
        assert_eq!(wf.connections[0].source_node_id, wf.nodes[0].id);
        assert_eq!(wf.connections[0].target_node_id, wf.nodes[1].id);
    }

    #[test]
    fn nodes_are_laid_out_left_to_right() {
        let wf = convert("every 5 minutes do speak('a') speak('b') speak('c') end");
        let xs: Vec<f64> = wf.nodes.iter().map(|n| n.position.x).collect();
        assert_eq!(xs, vec![100.0, 350.0, 600.0]);
        assert!(wf.nodes.iter().all(|n| n.position.y == 100.0));
        assert_eq!(wf.trigger.schedule_expr(), Some("5 minutes"));
    }

    #[test]
    fn only_the_first_rule_is_converted() {
        let wf = convert("on a do speak('1') end on b do speak('2') speak('3') end");
        assert_eq!(wf.trigger.event_name(), Some("a"));
        assert_eq!(wf.nodes.len(), 1);
    }

    #[test]
    fn condition_is_carried_on_the_trigger() {
        let wf = convert("when donation > 100 then playSound('epic') end");
        match &wf.trigger {
            Trigger::Event { condition: Some(c), .. } => assert_eq!(c.right, "100"),
            other => panic!("unexpected trigger {other:?}"),
        }
    }

    #[test]
    fn empty_script_gives_empty_manual_workflow() {
        let wf = convert("# nothing yet");
        assert_eq!(wf.trigger, Trigger::Manual);
        assert!(wf.nodes.is_empty());
    }

    #[test]
    fn syntax_errors_are_reported() {
        let result = convert_to_workflow(
            &Script::new("broken", "on follower do speak('hi')"),
            &TemplateCatalog::builtin(),
        );
        assert!(matches!(result, Err(EngineError::Syntax(d)) if !d.is_empty()));
    }

    #[test]
    fn generated_workflow_is_disabled_and_described() {
        let wf = convert("on follower do speak('hi') end");
        assert!(!wf.enabled);
        assert_eq!(wf.name, "test");
        assert_eq!(wf.description.as_deref(), Some("Generated from script 'test'"));
    }
}
