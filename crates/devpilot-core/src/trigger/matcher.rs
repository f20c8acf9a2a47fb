use crate::models::{AmbientSignal, WorkflowDefinition, WorkflowTrigger};

/// Does `signal` fire the trigger declared by `workflow_id`?
///
/// Empty pattern, event and branch lists match anything; an empty keyword
/// list never matches. Manual triggers never fire.
pub fn trigger_matches(trigger: &WorkflowTrigger, workflow_id: &str, signal: &AmbientSignal) -> bool {
    match (trigger, signal) {
        (WorkflowTrigger::FileChange { patterns }, AmbientSignal::FileChange { paths }) => {
            any_path_matches(patterns, paths)
        }
        (
            WorkflowTrigger::GitEvent { events, branches },
            AmbientSignal::GitEvent { event, branch },
        ) => git_event_matches(events, branches, event, branch.as_deref()),
        (WorkflowTrigger::Schedule { .. }, AmbientSignal::ScheduleTick { workflow_id: id }) => {
            id == workflow_id
        }
        (WorkflowTrigger::Conversation { keywords }, AmbientSignal::Conversation { text }) => {
            mentions_keyword(keywords, text)
        }
        (WorkflowTrigger::Error { patterns }, AmbientSignal::Error { message }) => {
            error_matches(patterns, message)
        }
        _ => false,
    }
}

pub fn matching_workflows<'a>(
    workflows: &'a [WorkflowDefinition],
    signal: &AmbientSignal,
) -> Vec<&'a WorkflowDefinition> {
    workflows
        .iter()
        .filter(|w| trigger_matches(&w.trigger, &w.id, signal))
        .collect()
}

pub(crate) fn any_path_matches(patterns: &[String], paths: &[String]) -> bool {
    if patterns.is_empty() {
        return !paths.is_empty();
    }
    let compiled: Vec<glob::Pattern> = patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!("[TriggerMatcher] Ignoring invalid glob '{}': {}", p, e);
                None
            }
        })
        .collect();
    paths
        .iter()
        .any(|path| compiled.iter().any(|pattern| pattern.matches(path)))
}

pub(crate) fn git_event_matches(
    events: &[String],
    branches: &[String],
    event: &str,
    branch: Option<&str>,
) -> bool {
    let event_ok = events.is_empty() || events.iter().any(|e| e == event);
    let branch_ok = branches.is_empty() || branch.is_some_and(|b| branches.iter().any(|x| x == b));
    event_ok && branch_ok
}

pub(crate) fn mentions_keyword(keywords: &[String], text: &str) -> bool {
    let text = text.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .any(|k| text.contains(&k.to_lowercase()))
}

fn error_matches(patterns: &[String], message: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|p| match regex::Regex::new(p) {
        Ok(re) => re.is_match(message),
        Err(_) => message.contains(p.as_str()),
    })
}
