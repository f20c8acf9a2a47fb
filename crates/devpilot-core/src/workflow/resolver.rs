//! Step input resolution.
//!
//! A step's final input is its static `input` object, overlaid with values
//! pulled from completed dependency outputs via `inputMapping`, plus the
//! injected `_context` and `_variables` keys.

use serde_json::{Map, Value};

use crate::models::{WorkflowContext, WorkflowStep};

pub const CONTEXT_KEY: &str = "_context";
pub const VARIABLES_KEY: &str = "_variables";

/// Build the resolved input for `step`.
///
/// Mappings whose source has not completed or whose path does not resolve are
/// omitted. A non-object static input is an internal error.
pub fn resolve_input(step: &WorkflowStep, ctx: &WorkflowContext) -> Result<Value, String> {
    let Value::Object(base) = &step.input else {
        return Err(format!("step '{}' input is not a JSON object", step.id));
    };
    let mut input = Value::Object(base.clone());

    for (target, mapping) in &step.input_mapping {
        let (source, path) = match mapping.split_once('.') {
            Some((source, path)) => (source, Some(path)),
            None => (mapping.as_str(), None),
        };
        let Some(output) = ctx.completed_output(source) else {
            tracing::debug!(
                step_id = %step.id,
                "[Resolver] Mapping '{}' skipped: step '{}' has no completed output",
                target,
                source
            );
            continue;
        };
        let value = match path {
            Some(path) => lookup_path(output, path),
            None => Some(output),
        };
        match value {
            Some(value) => set_path(&mut input, target, value.clone()),
            None => tracing::debug!(
                step_id = %step.id,
                "[Resolver] Mapping '{}' skipped: '{}' did not resolve",
                target,
                mapping
            ),
        }
    }

    if let Value::Object(obj) = &mut input {
        obj.insert(CONTEXT_KEY.to_string(), context_snapshot(ctx));
        obj.insert(VARIABLES_KEY.to_string(), Value::Object(ctx.variables.clone()));
    }
    Ok(input)
}

/// The run context without step results.
pub fn context_snapshot(ctx: &WorkflowContext) -> Value {
    serde_json::json!({
        "workflowId": ctx.workflow_id,
        "executionId": ctx.execution_id,
        "sessionId": ctx.session_id,
        "trigger": ctx.trigger,
        "startTime": ctx.start_time,
        "completedSteps": ctx.completed_steps,
        "failedSteps": ctx.failed_steps,
        "skippedSteps": ctx.skipped_steps,
    })
}

/// Dot-path traversal; numeric segments index into arrays.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write `value` at a dot-path, creating intermediate objects.
pub fn set_path(root: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.to_string(), value);
    }
}
