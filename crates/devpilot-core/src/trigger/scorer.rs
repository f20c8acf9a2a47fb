//! Context scorer — ranks workflows against the caller's current activity.
//!
//! | Term                                   | Weight |
//! |----------------------------------------|--------|
//! | file-change trigger matches changed files | +0.3 |
//! | git-event trigger matches the git event   | +0.4 |
//! | conversation trigger matches the text     | +0.2 |
//! | each tag shared with recent patterns      | +0.1 |
//! | historical success rate                   | rate/100 × 0.2 |
//!
//! The total is clamped to [0, 1].

use std::collections::HashSet;

use crate::models::{SuggestionContext, WorkflowDefinition, WorkflowSuggestion, WorkflowTrigger};
use crate::trigger::matcher::{any_path_matches, git_event_matches, mentions_keyword};

const FILE_CHANGE_WEIGHT: f64 = 0.3;
const GIT_EVENT_WEIGHT: f64 = 0.4;
const CONVERSATION_WEIGHT: f64 = 0.2;
const TAG_WEIGHT: f64 = 0.1;
const SUCCESS_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct ContextScorer {
    threshold: f64,
}

impl ContextScorer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Score one workflow and explain which terms fired.
    pub fn score(&self, def: &WorkflowDefinition, ctx: &SuggestionContext) -> (f64, Vec<String>) {
        let mut score: f64 = 0.0;
        let mut reasons = Vec::new();

        match &def.trigger {
            WorkflowTrigger::FileChange { patterns } if any_path_matches(patterns, &ctx.changed_files) => {
                score += FILE_CHANGE_WEIGHT;
                reasons.push("matches changed files".to_string());
            }
            WorkflowTrigger::GitEvent { events, branches } => {
                if let Some(git) = &ctx.git_event {
                    if git_event_matches(events, branches, &git.event, git.branch.as_deref()) {
                        score += GIT_EVENT_WEIGHT;
                        reasons.push(format!("matches git event '{}'", git.event));
                    }
                }
            }
            WorkflowTrigger::Conversation { keywords } => {
                if ctx
                    .conversation
                    .as_deref()
                    .is_some_and(|text| mentions_keyword(keywords, text))
                {
                    score += CONVERSATION_WEIGHT;
                    reasons.push("mentioned in conversation".to_string());
                }
            }
            _ => {}
        }

        let recent: HashSet<String> = ctx.recent_patterns.iter().map(|p| p.to_lowercase()).collect();
        let mut shared: Vec<&str> = def
            .tags
            .iter()
            .filter(|t| recent.contains(&t.to_lowercase()))
            .map(String::as_str)
            .collect();
        shared.sort_unstable();
        shared.dedup();
        if !shared.is_empty() {
            score += TAG_WEIGHT * shared.len() as f64;
            reasons.push(format!("shares tags: {}", shared.join(", ")));
        }

        let rate = def.success_rate.clamp(0.0, 100.0);
        if rate > 0.0 {
            score += rate / 100.0 * SUCCESS_WEIGHT;
            reasons.push(format!("success rate {:.0}%", rate));
        }

        (score.clamp(0.0, 1.0), reasons)
    }

    /// Suggestions at or above the threshold, best first (ties by id).
    pub fn suggest(&self, workflows: &[WorkflowDefinition], ctx: &SuggestionContext) -> Vec<WorkflowSuggestion> {
        let mut suggestions: Vec<WorkflowSuggestion> = workflows
            .iter()
            .filter_map(|def| {
                let (score, reasons) = self.score(def, ctx);
                (score >= self.threshold).then(|| WorkflowSuggestion {
                    workflow_id: def.id.clone(),
                    workflow_name: def.name.clone(),
                    category: def.category.clone(),
                    score,
                    reason: reasons.join("; "),
                })
            })
            .collect();
        suggestions.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.workflow_id.cmp(&b.workflow_id))
        });
        suggestions
    }
}
