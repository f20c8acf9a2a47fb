//! `devpilot workflow` — Manage, validate and run workflows.

use std::path::Path;

use devpilot_core::models::{StepStatus, TriggerContext, WorkflowDefinition, WorkflowResult};
use devpilot_core::state::AppState;
use devpilot_core::workflow::ExecuteRequest;

use super::{print_json, truncate};

/// List stored workflows.
pub async fn list(state: &AppState, category: Option<&str>) -> Result<(), String> {
    let workflows = state.engine.list_workflows(category).await;
    if workflows.is_empty() {
        println!("No workflows found.");
        return Ok(());
    }

    println!(
        "{:<24} {:<28} {:<14} {:>5} {:>6} {:>8}",
        "ID", "NAME", "CATEGORY", "STEPS", "RUNS", "SUCCESS"
    );
    for wf in &workflows {
        println!(
            "{:<24} {:<28} {:<14} {:>5} {:>6} {:>7.0}%",
            truncate(&wf.id, 24),
            truncate(&wf.name, 28),
            truncate(&wf.category, 14),
            wf.steps.len(),
            wf.run_count,
            wf.success_rate
        );
    }
    Ok(())
}

/// Print one workflow as YAML.
pub async fn show(state: &AppState, id: &str) -> Result<(), String> {
    let def = state.engine.get_workflow(id).await.map_err(|e| e.to_string())?;
    let yaml = serde_yaml::to_string(&def).map_err(|e| format!("Failed to render workflow: {}", e))?;
    print!("{}", yaml);
    Ok(())
}

/// Store a workflow from a file.
pub async fn create(state: &AppState, file: &str) -> Result<(), String> {
    let def = WorkflowDefinition::from_file(file)?;
    let created = state
        .engine
        .create_workflow(def)
        .await
        .map_err(|e| e.to_string())?;
    println!("✅ Created workflow '{}' ({})", created.name, created.id);
    Ok(())
}

/// Validate a workflow file and print its execution waves.
pub fn validate(state: &AppState, file: &str) -> Result<(), String> {
    let def = WorkflowDefinition::from_file(file)?;
    let waves = state
        .engine
        .validate_workflow(&def)
        .map_err(|e| format!("Invalid workflow '{}': {}", file, e))?;

    println!("✅ '{}' is valid: {} step(s) in {} wave(s)", def.name, def.steps.len(), waves.len());
    for (i, wave) in waves.iter().enumerate() {
        println!("   wave {}: {}", i + 1, wave.join(", "));
    }
    Ok(())
}

/// Run a stored workflow or a workflow file and wait for it to finish.
pub async fn run(
    state: &AppState,
    target: &str,
    vars: &[String],
    trigger_payload: Option<&str>,
    verbose: bool,
) -> Result<(), String> {
    let request = ExecuteRequest {
        trigger: trigger_payload.map(parse_trigger_payload).transpose()?,
        variables: parse_vars(vars)?,
        session_id: None,
    };

    let result = if Path::new(target).is_file() {
        let mut def = WorkflowDefinition::from_file(target)?;
        if def.id.is_empty() {
            def.id = file_stem(target);
        }
        println!("📄 Loaded workflow: {} ({})", def.name, target);
        println!("   {} step(s), trigger: {}", def.steps.len(), def.trigger.kind());
        state
            .engine
            .run_definition(&def, request)
            .await
            .map_err(|e| e.to_string())?
    } else {
        let def = state.engine.get_workflow(target).await.map_err(|e| e.to_string())?;
        println!("▶️  Running workflow: {} ({})", def.name, def.id);
        state
            .engine
            .execute_and_wait(target, request)
            .await
            .map_err(|e| e.to_string())?
    };
    println!();

    report(&result, verbose);

    if result.success {
        println!("\n🎉 Workflow completed successfully!");
        Ok(())
    } else {
        Err(format!(
            "Workflow {} ({}): {}",
            result.status.as_str(),
            result.execution_id,
            failure_summary(&result)
        ))
    }
}

/// Delete a stored workflow.
pub async fn delete(state: &AppState, id: &str) -> Result<(), String> {
    state.engine.delete_workflow(id).await.map_err(|e| e.to_string())?;
    println!("🗑️  Deleted workflow '{}'", id);
    Ok(())
}

/// List the built-in workflow catalog.
pub fn builtins(state: &AppState) -> Result<(), String> {
    let catalog = state.engine.builtin_catalog().map_err(|e| e.to_string())?;
    for def in &catalog {
        println!(
            "{:<24} {:<14} {}",
            def.id,
            def.category,
            def.description.as_deref().unwrap_or(&def.name)
        );
    }
    Ok(())
}

/// List specialist definitions known to the engine.
pub fn specialists(state: &AppState) -> Result<(), String> {
    let catalog = state.engine.specialists();
    println!("{:<20} {:<24} {:<12}", "ID", "NAME", "ROLE");
    for id in catalog.ids() {
        if let Some(def) = catalog.get(&id) {
            println!(
                "{:<20} {:<24} {:<12}",
                truncate(&def.id, 20),
                truncate(&def.name, 24),
                def.role
            );
        }
    }
    println!("\n{} specialist(s)", catalog.len());
    Ok(())
}

fn report(result: &WorkflowResult, verbose: bool) {
    for (step_id, step) in &result.step_results {
        let icon = match step.status {
            StepStatus::Completed => "✅",
            StepStatus::Failed => "❌",
            StepStatus::Skipped => "⏭️ ",
            _ => "⏳",
        };
        let duration = step
            .duration_ms
            .map(|ms| format!(" ({} ms)", ms))
            .unwrap_or_default();
        println!("{} {} [{}]{}", icon, step_id, step.agent_id, duration);
        if let Some(err) = &step.error {
            println!("   error: {}", err);
        }
        if verbose {
            if let Some(output) = &step.output {
                print_json(output);
            }
        }
    }

    let m = &result.metrics;
    println!(
        "\n{} completed, {} failed, {} skipped of {} step(s) in {} wave(s); {} tokens, {} ms",
        m.completed_steps,
        m.failed_steps,
        m.skipped_steps,
        m.total_steps,
        m.waves,
        m.total_tokens,
        m.duration_ms
    );
    for warning in &result.warnings {
        println!("⚠️  {}", warning);
    }
    if let Some(fallback) = &result.fallback_step {
        println!("↩️  Fallback step: {}", fallback);
    }
}

fn failure_summary(result: &WorkflowResult) -> String {
    let failed: Vec<&str> = result
        .step_results
        .values()
        .filter(|s| s.status == StepStatus::Failed)
        .map(|s| s.step_id.as_str())
        .collect();
    match (&result.error, failed.is_empty()) {
        (Some(err), true) => err.clone(),
        (Some(err), false) => format!("{}; failed steps: {}", err, failed.join(", ")),
        (None, false) => format!("failed steps: {}", failed.join(", ")),
        (None, true) => "no step succeeded".to_string(),
    }
}

/// Parse `KEY=VALUE` pairs; values that parse as JSON keep their type.
fn parse_vars(vars: &[String]) -> Result<serde_json::Map<String, serde_json::Value>, String> {
    let mut map = serde_json::Map::new();
    for raw in vars {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| format!("Invalid --var '{}': expected KEY=VALUE", raw))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Invalid --var '{}': empty key", raw));
        }
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

fn parse_trigger_payload(raw: &str) -> Result<TriggerContext, String> {
    let payload: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("Invalid trigger payload JSON: {}", e))?;
    Ok(TriggerContext {
        source: "manual".to_string(),
        payload,
    })
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "adhoc".to_string())
}
