use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A cron-based registration that starts a workflow.
///
/// Firing is driven by an explicit tick; this type only knows how to compute
/// the next fire time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledWorkflow {
    pub id: String,
    pub workflow_id: String,
    pub cron_expr: String,
    pub timezone: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_execution_id: Option<String>,
    /// Owned by the workflow's own `schedule` trigger and kept in step with it
    #[serde(default)]
    pub from_trigger: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledWorkflow {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && self.next_run.is_some_and(|next| next <= now)
    }

    /// Recompute `next_run` strictly after `after`.
    pub fn refresh_next_run(&mut self, after: DateTime<Utc>) -> Result<(), ValidationError> {
        self.next_run = next_fire_time(&self.cron_expr, &self.timezone, after)?;
        Ok(())
    }
}

/// Input for creating a new scheduled workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleInput {
    pub workflow_id: String,
    pub cron_expr: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_true() -> bool {
    true
}

/// Partial update input for PATCH.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScheduleInput {
    pub cron_expr: Option<String>,
    pub timezone: Option<String>,
    pub active: Option<bool>,
}

/// Parse a 5-field (crontab) or 6/7-field (with seconds) cron expression.
pub fn parse_cron(expr: &str) -> Result<cron::Schedule, ValidationError> {
    let fields = expr.split_whitespace().count();
    let normalized = if fields == 5 {
        format!("0 {}", expr.trim())
    } else {
        expr.trim().to_string()
    };
    cron::Schedule::from_str(&normalized).map_err(|e| ValidationError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

pub fn parse_timezone(tz: &str) -> Result<chrono_tz::Tz, ValidationError> {
    tz.parse::<chrono_tz::Tz>()
        .map_err(|_| ValidationError::InvalidTimezone(tz.to_string()))
}

/// Next time the expression fires strictly after `after`, evaluated in `timezone`.
pub fn next_fire_time(
    expr: &str,
    timezone: &str,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    let schedule = parse_cron(expr)?;
    let tz = parse_timezone(timezone)?;
    Ok(schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|t| t.with_timezone(&Utc)))
}
