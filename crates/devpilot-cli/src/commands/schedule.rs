//! `devpilot schedule` — Manage cron schedules and fire due ones.

use std::time::Duration;

use devpilot_core::models::CreateScheduleInput;
use devpilot_core::state::AppState;

use super::truncate;

pub async fn list(state: &AppState, workflow_id: Option<&str>) -> Result<(), String> {
    let schedules = state.engine.list_schedules(workflow_id).await;
    if schedules.is_empty() {
        println!("No schedules found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<24} {:<16} {:<16} {:<7} {}",
        "ID", "WORKFLOW", "CRON", "TIMEZONE", "ACTIVE", "NEXT RUN"
    );
    for s in &schedules {
        println!(
            "{:<38} {:<24} {:<16} {:<16} {:<7} {}",
            s.id,
            truncate(&s.workflow_id, 24),
            truncate(&s.cron_expr, 16),
            truncate(&s.timezone, 16),
            if s.active { "yes" } else { "no" },
            s.next_run
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}

pub async fn create(
    state: &AppState,
    workflow_id: String,
    cron_expr: String,
    timezone: String,
) -> Result<(), String> {
    let schedule = state
        .engine
        .create_schedule(CreateScheduleInput {
            workflow_id,
            cron_expr,
            timezone,
            active: true,
        })
        .await
        .map_err(|e| e.to_string())?;

    println!("✅ Created schedule {}", schedule.id);
    if let Some(next) = schedule.next_run {
        println!("   next run: {}", next.to_rfc3339());
    }
    Ok(())
}

pub async fn delete(state: &AppState, id: &str) -> Result<(), String> {
    state.engine.delete_schedule(id).await.map_err(|e| e.to_string())?;
    println!("🗑️  Deleted schedule {}", id);
    Ok(())
}

/// Fire every due schedule and wait for the started runs to finish.
pub async fn tick(state: &AppState) -> Result<(), String> {
    let firings = state
        .engine
        .tick(chrono::Utc::now())
        .await
        .map_err(|e| e.to_string())?;

    if firings.is_empty() {
        println!("No schedules are due.");
        return Ok(());
    }

    let mut failures = 0usize;
    for firing in &firings {
        let Some(execution_id) = &firing.execution_id else {
            failures += 1;
            println!(
                "❌ {} → {}: {}",
                firing.schedule_id,
                firing.workflow_id,
                firing.error.as_deref().unwrap_or("not started")
            );
            continue;
        };

        let result = loop {
            let result = state
                .engine
                .get_execution(execution_id)
                .await
                .map_err(|e| e.to_string())?;
            if result.status.is_terminal() {
                break result;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        };

        if !result.success {
            failures += 1;
        }
        println!(
            "{} {} → {} [{}] {}",
            if result.success { "✅" } else { "❌" },
            firing.schedule_id,
            firing.workflow_id,
            execution_id,
            result.status.as_str()
        );
    }

    if failures == 0 {
        Ok(())
    } else {
        Err(format!("{} of {} scheduled run(s) failed", failures, firings.len()))
    }
}
