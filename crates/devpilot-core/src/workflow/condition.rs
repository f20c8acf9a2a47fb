//! Condition expressions for workflow preconditions and step guards.
//!
//! Grammar: `[!]operand [op operand]` where `op` is one of
//! `== != >= <= > < contains`. Operands are references into the run
//! (`steps.<id>.output.<path>`, `steps.<id>.status`, `variables.<path>`,
//! `trigger.<path>`) or literals (JSON, otherwise a bare string). A lone
//! operand is tested for truthiness.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::models::WorkflowContext;
use crate::workflow::resolver::lookup_path;

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s*(==|!=|>=|<=|>|<)\s*(.+)$").expect("comparison pattern")
});
static CONTAINS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+contains\s+(.+)$").expect("contains pattern"));

/// Evaluate `expr` against the current run state.
pub fn evaluate(expr: &str, ctx: &WorkflowContext) -> Result<bool, String> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err("empty condition".to_string());
    }

    if let Some(caps) = CONTAINS.captures(expr) {
        let haystack = operand(&caps[1], ctx);
        let needle = operand(&caps[2], ctx);
        return Ok(contains(&haystack, &needle));
    }

    if let Some(caps) = COMPARISON.captures(expr) {
        let left = operand(&caps[1], ctx);
        let right = operand(&caps[3], ctx);
        return Ok(match &caps[2] {
            "==" => loosely_equal(&left, &right),
            "!=" => !loosely_equal(&left, &right),
            op => compare(&left, &right, op),
        });
    }

    if let Some(rest) = expr.strip_prefix('!') {
        return Ok(!truthy(&operand(rest, ctx)));
    }
    Ok(truthy(&operand(expr, ctx)))
}

fn operand(raw: &str, ctx: &WorkflowContext) -> Value {
    let raw = raw.trim();

    if let Some(rest) = raw.strip_prefix("steps.") {
        let (step_id, path) = rest.split_once('.').unwrap_or((rest, ""));
        let Some(result) = ctx.step_results.get(step_id) else {
            return Value::Null;
        };
        return match path.split_once('.').unwrap_or((path, "")) {
            ("status", _) => Value::String(result.status.as_str().to_string()),
            ("output", sub) => result
                .output
                .as_ref()
                .and_then(|o| lookup_path(o, sub))
                .cloned()
                .unwrap_or(Value::Null),
            ("error", _) => result.error.clone().map(Value::String).unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    if let Some(path) = raw.strip_prefix("variables.") {
        return ctx
            .variables
            .get(path.split('.').next().unwrap_or_default())
            .and_then(|root| lookup_path(root, path.split_once('.').map_or("", |(_, p)| p)))
            .cloned()
            .unwrap_or(Value::Null);
    }
    if let Some(path) = raw.strip_prefix("trigger.") {
        let trigger = serde_json::to_value(&ctx.trigger).unwrap_or(Value::Null);
        return lookup_path(&trigger, path).cloned().unwrap_or(Value::Null);
    }

    serde_json::from_str(raw).unwrap_or_else(|_| {
        let unquoted = raw
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .unwrap_or(raw);
        Value::String(unquoted.to_string())
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => match (left, right) {
            (Value::String(l), r) | (r, Value::String(l)) if !r.is_string() => {
                // `status == completed` style comparisons against non-string values
                l == &r.to_string()
            }
            _ => left == right,
        },
    }
}

fn compare(left: &Value, right: &Value, op: &str) -> bool {
    let ordering = match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => match (left.as_str(), right.as_str()) {
            (Some(l), Some(r)) => Some(l.cmp(r)),
            _ => None,
        },
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        ">" => ordering.is_gt(),
        "<" => ordering.is_lt(),
        ">=" => ordering.is_ge(),
        "<=" => ordering.is_le(),
        _ => false,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => match needle {
            Value::String(n) => s.contains(n.as_str()),
            other => s.contains(&other.to_string()),
        },
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
        Value::Object(map) => needle.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StepResult, StepStatus, TriggerContext};
    use serde_json::json;

    fn context() -> WorkflowContext {
        let mut vars = serde_json::Map::new();
        vars.insert("env".into(), json!("staging"));
        vars.insert("limits".into(), json!({"max": 10}));
        let trigger = TriggerContext {
            source: "git-event".into(),
            payload: json!({"branch": "main"}),
        };
        let mut ctx = WorkflowContext::new("wf", "exec", "session", trigger, vars);
        let mut review = StepResult::started("review", "code-reviewer", json!({}));
        review.output = Some(json!({"approved": true, "issues": 3, "labels": ["bug", "perf"]}));
        ctx.record(review.finish(StepStatus::Completed));
        ctx
    }

    #[test]
    fn test_step_output_comparisons() {
        let ctx = context();
        assert!(evaluate("steps.review.output.approved == true", &ctx).unwrap());
        assert!(evaluate("steps.review.output.issues > 2", &ctx).unwrap());
        assert!(!evaluate("steps.review.output.issues >= 4", &ctx).unwrap());
        assert!(evaluate("steps.review.status == completed", &ctx).unwrap());
        assert!(evaluate("steps.review.output.labels contains 'perf'", &ctx).unwrap());
    }

    #[test]
    fn test_variables_and_trigger_references() {
        let ctx = context();
        assert!(evaluate("variables.env == 'staging'", &ctx).unwrap());
        assert!(evaluate("variables.limits.max <= 10", &ctx).unwrap());
        assert!(evaluate("trigger.payload.branch != develop", &ctx).unwrap());
        assert!(evaluate("trigger.source == \"git-event\"", &ctx).unwrap());
    }

    #[test]
    fn test_truthiness_and_negation() {
        let ctx = context();
        assert!(evaluate("steps.review.output.approved", &ctx).unwrap());
        assert!(!evaluate("!steps.review.output.approved", &ctx).unwrap());
        assert!(!evaluate("variables.missing", &ctx).unwrap());
        assert!(evaluate("!steps.unknown.output.x", &ctx).unwrap());
    }

    #[test]
    fn test_empty_condition_is_an_error() {
        assert!(evaluate("   ", &context()).is_err());
    }
}
