//! End-to-end runs through `WorkflowEngine` with a scripted agent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use devpilot_core::models::{
    AmbientSignal, CreateScheduleInput, ExecutionFeedback, ExecutionStatus, StepStatus,
    WorkflowDefinition, WorkflowResult, WorkflowTrigger,
};
use devpilot_core::workflow::{
    AgentCapability, AgentOutcome, ExecuteRequest, InstructionPayload, WorkflowEngine,
};
use devpilot_core::{EngineConfig, MemoryStorage, ValidationError, WorkflowError};
use serde_json::{json, Value};
use tokio::sync::Notify;

enum Behavior {
    Reply(Value),
    ReplyWithVars(Value, Value),
    Fail(&'static str),
    FailThenReply(u32, Value),
    Slow(u64, Value),
    Gate {
        started: Arc<Notify>,
        release: Arc<Notify>,
    },
}

#[derive(Debug, Clone)]
struct Call {
    step_id: String,
    input: Value,
    prior: Vec<String>,
}

/// Agent whose behaviour is scripted per step id. Unscripted steps reply `{"ok": true}`.
#[derive(Default)]
struct ScriptedAgent {
    script: HashMap<String, Behavior>,
    calls: Mutex<Vec<Call>>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl ScriptedAgent {
    fn with(mut self, step_id: &str, behavior: Behavior) -> Self {
        self.script.insert(step_id.to_string(), behavior);
        self
    }

    fn calls_for(&self, step_id: &str) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.step_id == step_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AgentCapability for ScriptedAgent {
    async fn invoke(
        &self,
        _capability_id: &str,
        payload: InstructionPayload,
    ) -> Result<AgentOutcome, String> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(payload.step_id.clone()).or_insert(0);
            *n += 1;
            *n
        };
        self.calls.lock().unwrap().push(Call {
            step_id: payload.step_id.clone(),
            input: payload.input.clone(),
            prior: payload.prior_steps.iter().map(|p| p.step_id.clone()).collect(),
        });

        match self.script.get(&payload.step_id) {
            None => Ok(AgentOutcome::ok(json!({"ok": true}))),
            Some(Behavior::Reply(output)) => Ok(AgentOutcome::ok(output.clone())),
            Some(Behavior::ReplyWithVars(output, vars)) => Ok(AgentOutcome {
                variables: vars.as_object().cloned().unwrap_or_default(),
                ..AgentOutcome::ok(output.clone())
            }),
            Some(Behavior::Fail(msg)) => Ok(AgentOutcome::failed(*msg)),
            Some(Behavior::FailThenReply(failures, output)) => {
                if attempt <= *failures {
                    Err(format!("transient failure {}", attempt))
                } else {
                    Ok(AgentOutcome::ok(output.clone()))
                }
            }
            Some(Behavior::Slow(ms, output)) => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(AgentOutcome::ok(output.clone()))
            }
            Some(Behavior::Gate { started, release }) => {
                started.notify_one();
                release.notified().await;
                Ok(AgentOutcome::ok(json!({"gated": true})))
            }
        }
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        default_retry_delay_ms: 1,
        ..Default::default()
    }
}

async fn engine_with(agent: Arc<ScriptedAgent>) -> WorkflowEngine {
    WorkflowEngine::new(agent, Arc::new(MemoryStorage::new()), config())
        .await
        .unwrap()
}

async fn create(engine: &WorkflowEngine, yaml: &str) -> WorkflowDefinition {
    engine
        .create_workflow(WorkflowDefinition::from_yaml(yaml).unwrap())
        .await
        .unwrap()
}

async fn run(engine: &WorkflowEngine, id: &str) -> WorkflowResult {
    engine
        .execute_and_wait(id, ExecuteRequest::default())
        .await
        .unwrap()
}

async fn wait_for(engine: &WorkflowEngine, execution_id: &str) -> WorkflowResult {
    for _ in 0..500 {
        let result = engine.get_execution(execution_id).await.unwrap();
        if result.status.is_terminal() {
            return result;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {} never finished", execution_id);
}

const TWO_STEP: &str = r#"
id: two-step
name: Two Step
errorHandling:
  strategy: STRATEGY
steps:
  - { id: s1, name: First, agent: researcher }
  - { id: s2, name: Second, agent: writer, dependsOn: [s1] }
"#;

#[tokio::test]
async fn test_stop_strategy_halts_after_failure() {
    let agent = Arc::new(ScriptedAgent::default().with("s1", Behavior::Fail("bad input")));
    let engine = engine_with(agent.clone()).await;
    create(&engine, &TWO_STEP.replace("STRATEGY", "stop")).await;

    let result = run(&engine, "two-step").await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(!result.success);
    assert_eq!(result.step_results["s1"].status, StepStatus::Failed);
    assert!(!result.step_results.contains_key("s2"));
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("step 's1' failed: agent invocation failed: bad input"));
    assert!(agent.calls_for("s2").is_empty());
}

#[tokio::test]
async fn test_continue_strategy_skips_dependents() {
    let agent = Arc::new(ScriptedAgent::default().with("s1", Behavior::Fail("bad input")));
    let engine = engine_with(agent).await;
    create(&engine, &TWO_STEP.replace("STRATEGY", "continue")).await;

    let result = run(&engine, "two-step").await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.step_results["s1"].status, StepStatus::Failed);
    let s2 = &result.step_results["s2"];
    assert_eq!(s2.status, StepStatus::Skipped);
    assert_eq!(s2.error.as_deref(), Some("dependency 's1' failed"));
    assert_eq!(result.metrics.skipped_steps, 1);
    assert_eq!(result.error.as_deref(), Some("steps failed: s1"));
}

#[tokio::test]
async fn test_input_mapping_reads_dependency_output() {
    let agent = Arc::new(
        ScriptedAgent::default().with("s1", Behavior::Reply(json!({"result": {"count": 5}}))),
    );
    let engine = engine_with(agent.clone()).await;
    create(
        &engine,
        r#"
id: mapped
name: Mapped
steps:
  - { id: s1, name: Count, agent: analyst }
  - id: s2
    name: Use
    agent: writer
    dependsOn: [s1]
    input: { style: brief }
    inputMapping:
      target.count: s1.result.count
"#,
    )
    .await;

    let result = run(&engine, "mapped").await;
    assert_eq!(result.status, ExecutionStatus::Completed);

    let calls = agent.calls_for("s2");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].input["target"]["count"], 5);
    assert_eq!(calls[0].input["style"], "brief");
    assert_eq!(calls[0].input["_context"]["workflowId"], "mapped");
    assert_eq!(calls[0].prior, vec!["s1".to_string()]);
    assert_eq!(result.step_results["s2"].input["target"]["count"], 5);
}

#[tokio::test]
async fn test_cancel_between_waves() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let agent = Arc::new(ScriptedAgent::default().with(
        "s1",
        Behavior::Gate {
            started: started.clone(),
            release: release.clone(),
        },
    ));
    let engine = engine_with(agent.clone()).await;
    create(
        &engine,
        r#"
id: three
name: Three
steps:
  - { id: s1, name: One, agent: researcher }
  - { id: s2, name: Two, agent: analyst, dependsOn: [s1] }
  - { id: s3, name: Three, agent: writer, dependsOn: [s2] }
"#,
    )
    .await;

    let execution_id = engine.execute("three", ExecuteRequest::default()).await.unwrap();
    started.notified().await;
    engine.cancel_execution(&execution_id).await.unwrap();
    release.notify_one();

    let result = wait_for(&engine, &execution_id).await;
    assert_eq!(result.status, ExecutionStatus::Cancelled);
    assert_eq!(result.step_results["s1"].status, StepStatus::Completed);
    for id in ["s2", "s3"] {
        assert!(result
            .step_results
            .get(id)
            .map_or(true, |r| r.status != StepStatus::Completed));
    }
    assert!(agent.calls_for("s2").is_empty());

    assert!(matches!(
        engine.cancel_execution(&execution_id).await,
        Err(WorkflowError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_step_retries_then_succeeds() {
    let agent = Arc::new(
        ScriptedAgent::default().with("flaky", Behavior::FailThenReply(2, json!({"done": true}))),
    );
    let engine = engine_with(agent.clone()).await;
    create(
        &engine,
        r#"
id: retrying
name: Retrying
steps:
  - { id: flaky, name: Flaky, agent: researcher, retries: 2, retryDelay: 1 }
"#,
    )
    .await;

    let result = run(&engine, "retrying").await;
    assert_eq!(result.status, ExecutionStatus::Completed);
    let step = &result.step_results["flaky"];
    assert_eq!(step.status, StepStatus::Completed);
    assert_eq!(step.retry_count, 2);
    assert_eq!(agent.calls_for("flaky").len(), 3);
}

#[tokio::test]
async fn test_step_timeout_fails_step() {
    let agent = Arc::new(ScriptedAgent::default().with("slow", Behavior::Slow(2_000, json!({}))));
    let engine = engine_with(agent.clone()).await;
    create(
        &engine,
        r#"
id: slow
name: Slow
steps:
  - { id: slow, name: Slow, agent: researcher, timeout: 50, retries: 3 }
"#,
    )
    .await;

    let result = run(&engine, "slow").await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    let step = &result.step_results["slow"];
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.error.as_deref(), Some("step timed out after 50 ms"));
    assert_eq!(agent.calls_for("slow").len(), 1);
}

#[tokio::test]
async fn test_diamond_runs_in_three_waves() {
    let agent = Arc::new(ScriptedAgent::default());
    let engine = engine_with(agent.clone()).await;
    let def = create(
        &engine,
        r#"
id: diamond
name: Diamond
steps:
  - { id: d, name: D, agent: synthesizer, dependsOn: [b, c] }
  - { id: b, name: B, agent: researcher, dependsOn: [a] }
  - { id: c, name: C, agent: analyst, dependsOn: [a] }
  - { id: a, name: A, agent: planner }
"#,
    )
    .await;

    let waves = engine.validate_workflow(&def).unwrap();
    assert_eq!(
        waves,
        vec![vec!["a".to_string()], vec!["b".into(), "c".into()], vec!["d".into()]]
    );

    let result = run(&engine, "diamond").await;
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.metrics.waves, 3);
    assert_eq!(result.metrics.completed_steps, 4);

    let mut d_prior = agent.calls_for("d")[0].prior.clone();
    d_prior.sort();
    assert_eq!(d_prior, vec!["b".to_string(), "c".into()]);
}

#[tokio::test]
async fn test_fallback_runs_single_reserved_step() {
    let agent = Arc::new(ScriptedAgent::default().with("draft", Behavior::Fail("no draft")));
    let engine = engine_with(agent.clone()).await;
    create(
        &engine,
        r#"
id: with-fallback
name: With Fallback
errorHandling:
  strategy: fallback
  fallbackStep: salvage
steps:
  - { id: draft, name: Draft, agent: writer }
  - { id: publish, name: Publish, agent: editor, dependsOn: [draft] }
  - { id: salvage, name: Salvage, agent: synthesizer }
"#,
    )
    .await;

    let result = run(&engine, "with-fallback").await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.fallback_step.as_deref(), Some("salvage"));
    assert_eq!(result.step_results["salvage"].status, StepStatus::Completed);
    assert!(!result.step_results.contains_key("publish"));
    assert_eq!(agent.calls_for("salvage").len(), 1);
}

#[tokio::test]
async fn test_fallback_step_not_run_when_nothing_fails() {
    let agent = Arc::new(ScriptedAgent::default());
    let engine = engine_with(agent.clone()).await;
    create(
        &engine,
        r#"
id: happy-fallback
name: Happy Fallback
errorHandling: { strategy: fallback, fallbackStep: salvage }
steps:
  - { id: draft, name: Draft, agent: writer }
  - { id: salvage, name: Salvage, agent: synthesizer }
"#,
    )
    .await;

    let result = run(&engine, "happy-fallback").await;
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert!(agent.calls_for("salvage").is_empty());
    assert!(result.fallback_step.is_none());
}

#[tokio::test]
async fn test_run_timeout_interrupts_wave() {
    let agent = Arc::new(ScriptedAgent::default().with("long", Behavior::Slow(5_000, json!({}))));
    let engine = engine_with(agent).await;
    create(
        &engine,
        r#"
id: bounded
name: Bounded
timeout: 50
steps:
  - { id: quick, name: Quick, agent: researcher }
  - { id: long, name: Long, agent: analyst }
"#,
    )
    .await;

    let result = run(&engine, "bounded").await;
    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert_eq!(result.step_results["quick"].status, StepStatus::Completed);
    let long = &result.step_results["long"];
    assert_eq!(long.status, StepStatus::Failed);
    assert_eq!(long.error.as_deref(), Some("run timed out while the step was running"));
    assert_eq!(result.error.as_deref(), Some("run exceeded its timeout of 50 ms"));
}

#[tokio::test]
async fn test_run_level_retry_accumulates_attempts() {
    let agent = Arc::new(ScriptedAgent::default().with("shaky", Behavior::Fail("still broken")));
    let engine = engine_with(agent.clone()).await;
    create(
        &engine,
        r#"
id: run-retry
name: Run Retry
errorHandling: { strategy: retry, maxRetries: 2, retryDelay: 1 }
steps:
  - { id: shaky, name: Shaky, agent: researcher }
"#,
    )
    .await;

    let result = run(&engine, "run-retry").await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(agent.calls_for("shaky").len(), 3);
    assert_eq!(result.step_results["shaky"].retry_count, 2);
}

#[tokio::test]
async fn test_retry_then_continue_skips_only_dependents() {
    let agent = Arc::new(ScriptedAgent::default().with("a", Behavior::Fail("still broken")));
    let engine = engine_with(agent.clone()).await;
    create(
        &engine,
        r#"
id: retry-continue
name: Retry Continue
errorHandling: { strategy: retry, maxRetries: 2, retryDelay: 1, afterRetries: continue }
steps:
  - { id: a, name: A, agent: researcher }
  - { id: b, name: B, agent: writer, dependsOn: [a] }
  - { id: c, name: C, agent: analyst }
"#,
    )
    .await;

    let result = run(&engine, "retry-continue").await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(!result.success);

    assert_eq!(agent.calls_for("a").len(), 3);
    let a = &result.step_results["a"];
    assert_eq!(a.status, StepStatus::Failed);
    assert_eq!(a.retry_count, 2);

    let b = &result.step_results["b"];
    assert_eq!(b.status, StepStatus::Skipped);
    assert_eq!(b.error.as_deref(), Some("dependency 'a' failed"));
    assert!(agent.calls_for("b").is_empty());

    assert_eq!(result.step_results["c"].status, StepStatus::Completed);
    assert_eq!(agent.calls_for("c").len(), 1);
}

#[tokio::test]
async fn test_same_wave_variable_conflict_is_flagged() {
    let agent = Arc::new(
        ScriptedAgent::default()
            .with(
                "a",
                Behavior::ReplyWithVars(json!({}), json!({"branch": "main", "solo": 1})),
            )
            .with("b", Behavior::ReplyWithVars(json!({}), json!({"branch": "dev"}))),
    );
    let engine = engine_with(agent.clone()).await;
    create(
        &engine,
        r#"
id: conflict
name: Conflict
steps:
  - { id: a, name: A, agent: researcher }
  - { id: b, name: B, agent: analyst }
  - { id: c, name: C, agent: writer, dependsOn: [a, b] }
"#,
    )
    .await;

    let mut request = ExecuteRequest::default();
    request.variables.insert("branch".into(), json!("release"));
    let result = engine.execute_and_wait("conflict", request).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(
        result.warnings,
        vec!["variable 'branch' written by steps a, b in the same wave; left unchanged".to_string()]
    );
    let c = &agent.calls_for("c")[0];
    assert_eq!(c.input["_variables"]["branch"], "release");
    assert_eq!(c.input["_variables"]["solo"], 1);
}

#[tokio::test]
async fn test_step_condition_skips_step() {
    let agent = Arc::new(
        ScriptedAgent::default().with("check", Behavior::Reply(json!({"issues": 0}))),
    );
    let engine = engine_with(agent.clone()).await;
    create(
        &engine,
        r#"
id: conditional
name: Conditional
steps:
  - { id: check, name: Check, agent: code-reviewer }
  - { id: fix, name: Fix, agent: debugger, dependsOn: [check], condition: "steps.check.output.issues > 0" }
  - { id: report, name: Report, agent: writer, dependsOn: [check], condition: "steps.check.status == 'completed'" }
"#,
    )
    .await;

    let result = run(&engine, "conditional").await;
    assert_eq!(result.status, ExecutionStatus::Completed);
    let fix = &result.step_results["fix"];
    assert_eq!(fix.status, StepStatus::Skipped);
    assert_eq!(
        fix.error.as_deref(),
        Some("condition not met: steps.check.output.issues > 0")
    );
    assert_eq!(result.step_results["report"].status, StepStatus::Completed);
    assert!(agent.calls_for("fix").is_empty());
}

#[tokio::test]
async fn test_success_rate_tracks_finished_runs() {
    let agent = Arc::new(ScriptedAgent::default().with("s1", Behavior::FailThenReply(1, json!({}))));
    let engine = engine_with(agent).await;
    create(&engine, &TWO_STEP.replace("STRATEGY", "stop")).await;

    assert_eq!(run(&engine, "two-step").await.status, ExecutionStatus::Failed);
    assert_eq!(run(&engine, "two-step").await.status, ExecutionStatus::Completed);

    let def = engine.get_workflow("two-step").await.unwrap();
    assert_eq!(def.run_count, 2);
    assert_eq!(def.success_count, 1);
    assert!((def.success_rate - 50.0).abs() < 1e-9);

    let history = engine.list_executions(Some("two-step")).await;
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_feedback_on_finished_run() {
    let engine = engine_with(Arc::new(ScriptedAgent::default())).await;
    create(&engine, &TWO_STEP.replace("STRATEGY", "stop")).await;
    let result = run(&engine, "two-step").await;

    let updated = engine
        .add_feedback(
            &result.execution_id,
            ExecutionFeedback {
                rating: 5,
                comment: Some("spot on".into()),
                submitted_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.feedback.len(), 1);

    let bad = engine
        .add_feedback(
            &result.execution_id,
            ExecutionFeedback {
                rating: 9,
                comment: None,
                submitted_at: chrono::Utc::now(),
            },
        )
        .await;
    assert!(matches!(bad, Err(WorkflowError::InvalidInput(_))));
}

#[tokio::test]
async fn test_invalid_definitions_are_never_stored() {
    let engine = engine_with(Arc::new(ScriptedAgent::default())).await;
    let cyclic = WorkflowDefinition::from_yaml(
        r#"
id: cyclic
name: Cyclic
steps:
  - { id: a, name: A, agent: researcher, dependsOn: [b] }
  - { id: b, name: B, agent: researcher, dependsOn: [a] }
"#,
    )
    .unwrap();
    assert!(matches!(
        engine.create_workflow(cyclic).await,
        Err(WorkflowError::Validation(ValidationError::Cycle(_)))
    ));
    assert!(matches!(
        engine.get_workflow("cyclic").await,
        Err(WorkflowError::NotFound(_))
    ));
    assert!(matches!(
        engine.execute("cyclic", ExecuteRequest::default()).await,
        Err(WorkflowError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_reseeding_keeps_user_edits() {
    let engine = engine_with(Arc::new(ScriptedAgent::default())).await;
    let first = engine.seed_builtins().await.unwrap();
    assert_eq!(first.inserted.len(), 8);

    let mut edited = engine.get_workflow("research-report").await.unwrap();
    edited.description = Some("my own research flow".into());
    let edited = engine.update_workflow("research-report", edited).await.unwrap();
    assert!(!edited.is_system());

    let second = engine.seed_builtins().await.unwrap();
    assert!(second.inserted.is_empty());
    assert!(second.kept.contains(&"research-report".to_string()));

    let stored = engine.get_workflow("research-report").await.unwrap();
    assert_eq!(stored.description.as_deref(), Some("my own research flow"));
}

#[tokio::test]
async fn test_signal_starts_matching_workflows() {
    let engine = engine_with(Arc::new(ScriptedAgent::default())).await;
    create(
        &engine,
        r#"
id: on-push
name: On Push
trigger: { type: git-event, events: [push], branches: [main] }
steps:
  - { id: check, name: Check, agent: test-runner }
"#,
    )
    .await;

    let started = engine
        .handle_signal(&AmbientSignal::GitEvent {
            event: "push".into(),
            branch: Some("main".into()),
        })
        .await
        .unwrap();
    assert_eq!(started.len(), 1);
    let result = wait_for(&engine, &started[0]).await;
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.workflow_id, "on-push");

    let none = engine
        .handle_signal(&AmbientSignal::GitEvent {
            event: "push".into(),
            branch: Some("feature".into()),
        })
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_tick_fires_due_schedules_once() {
    let engine = engine_with(Arc::new(ScriptedAgent::default())).await;
    create(&engine, &TWO_STEP.replace("STRATEGY", "stop")).await;

    assert!(matches!(
        engine
            .create_schedule(CreateScheduleInput {
                workflow_id: "missing".into(),
                cron_expr: "* * * * *".into(),
                timezone: "UTC".into(),
                active: true,
            })
            .await,
        Err(WorkflowError::NotFound(_))
    ));

    let schedule = engine
        .create_schedule(CreateScheduleInput {
            workflow_id: "two-step".into(),
            cron_expr: "* * * * *".into(),
            timezone: "UTC".into(),
            active: true,
        })
        .await
        .unwrap();

    let later = schedule.next_run.unwrap() + chrono::Duration::seconds(1);
    let firings = engine.tick(later).await.unwrap();
    assert_eq!(firings.len(), 1);
    assert_eq!(firings[0].schedule_id, schedule.id);
    let execution_id = firings[0].execution_id.clone().unwrap();
    assert_eq!(
        wait_for(&engine, &execution_id).await.status,
        ExecutionStatus::Completed
    );

    assert!(engine.tick(later).await.unwrap().is_empty());
    let stored = engine.get_schedule(&schedule.id).await.unwrap();
    assert_eq!(stored.last_execution_id, Some(execution_id));

    engine.delete_workflow("two-step").await.unwrap();
    assert!(engine.list_schedules(Some("two-step")).await.is_empty());
}

#[tokio::test]
async fn test_schedule_trigger_registers_its_own_schedule() {
    let engine = engine_with(Arc::new(ScriptedAgent::default())).await;
    let yaml = r#"
id: every-minute
name: Every Minute
trigger: { type: schedule, cron: "* * * * *" }
steps:
  - { id: ping, name: Ping, agent: researcher }
"#;
    let def = create(&engine, yaml).await;

    let schedules = engine.list_schedules(Some("every-minute")).await;
    assert_eq!(schedules.len(), 1);
    assert!(schedules[0].from_trigger);
    assert_eq!(schedules[0].cron_expr, "* * * * *");

    let firings = engine
        .tick(chrono::Utc::now() + chrono::Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(firings.len(), 1);
    let execution_id = firings[0].execution_id.clone().unwrap();
    assert_eq!(
        wait_for(&engine, &execution_id).await.status,
        ExecutionStatus::Completed
    );

    let mut hourly = def.clone();
    hourly.trigger = WorkflowTrigger::Schedule {
        cron: "0 * * * *".into(),
        timezone: "Asia/Tokyo".into(),
    };
    engine.update_workflow("every-minute", hourly).await.unwrap();
    let schedules = engine.list_schedules(Some("every-minute")).await;
    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].cron_expr, "0 * * * *");
    assert_eq!(schedules[0].timezone, "Asia/Tokyo");

    let mut manual = def;
    manual.trigger = WorkflowTrigger::Manual;
    engine.update_workflow("every-minute", manual).await.unwrap();
    assert!(engine.list_schedules(Some("every-minute")).await.is_empty());
}
