//! Built-in workflow catalog, embedded at compile time.

use crate::models::{WorkflowDefinition, SYSTEM_AUTHOR};

const BUILTIN_SOURCES: &[(&str, &str)] = &[
    (
        "code-review-commit.yaml",
        include_str!("../../resources/workflows/code-review-commit.yaml"),
    ),
    (
        "pre-push-check.yaml",
        include_str!("../../resources/workflows/pre-push-check.yaml"),
    ),
    (
        "research-report.yaml",
        include_str!("../../resources/workflows/research-report.yaml"),
    ),
    (
        "content-pipeline.yaml",
        include_str!("../../resources/workflows/content-pipeline.yaml"),
    ),
    (
        "document-to-knowledge-base.yaml",
        include_str!("../../resources/workflows/document-to-knowledge-base.yaml"),
    ),
    (
        "batch-document-analysis.yaml",
        include_str!("../../resources/workflows/batch-document-analysis.yaml"),
    ),
    (
        "error-triage.yaml",
        include_str!("../../resources/workflows/error-triage.yaml"),
    ),
    (
        "data-analysis.yaml",
        include_str!("../../resources/workflows/data-analysis.yaml"),
    ),
];

/// Parse every built-in definition, marked as authored by the system.
pub fn builtin_workflows() -> Result<Vec<WorkflowDefinition>, String> {
    BUILTIN_SOURCES
        .iter()
        .map(|(file, yaml)| {
            let mut def =
                WorkflowDefinition::from_yaml(yaml).map_err(|e| format!("{}: {}", file, e))?;
            def.author = SYSTEM_AUTHOR.to_string();
            Ok(def)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorStrategy;
    use crate::workflow::scheduler::preview_waves;
    use crate::workflow::validate::validate_definition;

    #[test]
    fn test_builtins_parse_and_validate() {
        let builtins = builtin_workflows().unwrap();
        assert_eq!(builtins.len(), 8);
        for def in &builtins {
            assert!(def.is_system());
            validate_definition(def).unwrap_or_else(|e| panic!("{} invalid: {}", def.id, e));
        }
    }

    #[test]
    fn test_builtin_ids_are_unique() {
        let builtins = builtin_workflows().unwrap();
        let mut ids: Vec<&str> = builtins.iter().map(|d| d.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), builtins.len());
    }

    #[test]
    fn test_pre_push_check_runs_tests_and_review_together() {
        let builtins = builtin_workflows().unwrap();
        let def = builtins.iter().find(|d| d.id == "pre-push-check").unwrap();
        let waves = preview_waves(&def.steps, None).unwrap();
        assert_eq!(waves[0], vec!["tests".to_string(), "review".into()]);
        assert_eq!(waves[1], vec!["verdict".to_string()]);
    }

    #[test]
    fn test_knowledge_base_summary_is_optional() {
        let builtins = builtin_workflows().unwrap();
        let def = builtins.iter().find(|d| d.id == "document-to-knowledge-base").unwrap();
        let summarize = def.steps.iter().find(|s| s.id == "summarize").unwrap();
        assert_eq!(summarize.depends_on, vec!["parse".to_string()]);
        assert_eq!(
            summarize.condition.as_deref(),
            Some("variables.generateSummary != false")
        );

        let waves = preview_waves(&def.steps, None).unwrap();
        assert_eq!(waves[1], vec!["index".to_string(), "summarize".into()]);
    }

    #[test]
    fn test_batch_analysis_keeps_going_past_failures() {
        let builtins = builtin_workflows().unwrap();
        let def = builtins.iter().find(|d| d.id == "batch-document-analysis").unwrap();
        assert_eq!(def.error_handling.strategy, ErrorStrategy::Continue);
        assert_eq!(def.trigger.kind(), "manual");

        let waves = preview_waves(&def.steps, None).unwrap();
        assert_eq!(waves.len(), 3);
    }
}
