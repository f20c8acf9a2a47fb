//! Structural validation of workflow definitions.
//!
//! Runs on create and update only; a definition that reaches the store is
//! guaranteed to be an acyclic graph over known step ids.

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::models::{next_fire_time, ErrorStrategy, WorkflowDefinition, WorkflowTrigger};
use crate::workflow::scheduler::topological_order;

pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), ValidationError> {
    if def.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    if def.steps.is_empty() {
        return Err(ValidationError::NoSteps);
    }

    let mut ids = HashSet::new();
    for (i, step) in def.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            return Err(ValidationError::MissingStepId(i));
        }
        if !ids.insert(step.id.as_str()) {
            return Err(ValidationError::DuplicateStepId(step.id.clone()));
        }
    }

    for step in &def.steps {
        if !step.input.is_object() {
            return Err(ValidationError::InputNotObject(step.id.clone()));
        }
        for dep in &step.depends_on {
            if dep == &step.id {
                return Err(ValidationError::SelfDependency(step.id.clone()));
            }
            if !ids.contains(dep.as_str()) {
                return Err(ValidationError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
        for (target, mapping) in &step.input_mapping {
            let source = mapping.split('.').next().unwrap_or_default();
            if target.trim().is_empty() || source.is_empty() {
                return Err(ValidationError::MalformedMapping {
                    step: step.id.clone(),
                    target: target.clone(),
                    mapping: mapping.clone(),
                });
            }
            if !ids.contains(source) {
                return Err(ValidationError::UnknownMappingSource {
                    step: step.id.clone(),
                    target: target.clone(),
                    source_step: source.to_string(),
                });
            }
        }
    }

    topological_order(&def.steps)?;

    let handling = &def.error_handling;
    if handling.strategy == ErrorStrategy::Fallback && handling.fallback_step.is_none() {
        return Err(ValidationError::MissingFallbackStep);
    }
    if let Some(fallback) = &handling.fallback_step {
        if !ids.contains(fallback.as_str()) {
            return Err(ValidationError::UnknownFallbackStep(fallback.clone()));
        }
        if let Some(step) = def.steps.iter().find(|s| s.depends_on.contains(fallback)) {
            return Err(ValidationError::DependsOnFallback {
                step: step.id.clone(),
                fallback: fallback.clone(),
            });
        }
    }

    if let WorkflowTrigger::Schedule { cron, timezone } = &def.trigger {
        next_fire_time(cron, timezone, chrono::Utc::now())?;
    }

    Ok(())
}
