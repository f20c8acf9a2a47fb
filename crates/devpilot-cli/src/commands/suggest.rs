//! `devpilot suggest` — Rank workflows against the caller's current activity.

use devpilot_core::models::{GitEventContext, SuggestionContext};
use devpilot_core::state::AppState;

pub async fn run(
    state: &AppState,
    files: Vec<String>,
    git_event: Option<String>,
    branch: Option<String>,
    conversation: Option<String>,
    patterns: Vec<String>,
) -> Result<(), String> {
    let ctx = build_context(files, git_event, branch, conversation, patterns)?;
    let suggestions = state.engine.suggest(&ctx).await;

    if suggestions.is_empty() {
        println!("No workflow matches the current activity.");
        return Ok(());
    }

    for (i, s) in suggestions.iter().enumerate() {
        println!(
            "{}. {} ({}) score {:.2} [{}]",
            i + 1,
            s.workflow_name,
            s.workflow_id,
            s.score,
            s.category
        );
        println!("   {}", s.reason);
    }
    Ok(())
}

fn build_context(
    files: Vec<String>,
    git_event: Option<String>,
    branch: Option<String>,
    conversation: Option<String>,
    patterns: Vec<String>,
) -> Result<SuggestionContext, String> {
    if branch.is_some() && git_event.is_none() {
        return Err("--branch requires --git-event".to_string());
    }
    Ok(SuggestionContext {
        changed_files: files,
        git_event: git_event.map(|event| GitEventContext { event, branch }),
        conversation: conversation.filter(|c| !c.trim().is_empty()),
        recent_patterns: patterns,
    })
}
