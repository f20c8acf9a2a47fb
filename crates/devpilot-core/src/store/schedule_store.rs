use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::models::schedule::{
    next_fire_time, CreateScheduleInput, ScheduledWorkflow, UpdateScheduleInput,
};
use crate::storage::{decode_collection, encode_collection, Collection, StoragePort};

/// Cron registrations for workflows. Firing is driven by an explicit tick.
pub struct ScheduleStore {
    storage: Arc<dyn StoragePort>,
    schedules: RwLock<BTreeMap<String, ScheduledWorkflow>>,
}

impl ScheduleStore {
    pub async fn open(storage: Arc<dyn StoragePort>) -> Result<Self, WorkflowError> {
        let records: Vec<ScheduledWorkflow> = decode_collection(
            Collection::ScheduledWorkflows,
            storage.load(Collection::ScheduledWorkflows).await?,
        )?;
        let schedules = records.into_iter().map(|s| (s.id.clone(), s)).collect();
        Ok(Self {
            storage,
            schedules: RwLock::new(schedules),
        })
    }

    async fn persist(&self, schedules: &BTreeMap<String, ScheduledWorkflow>) -> Result<(), WorkflowError> {
        let records: Vec<&ScheduledWorkflow> = schedules.values().collect();
        let value = encode_collection(Collection::ScheduledWorkflows, &records)?;
        self.storage.save(Collection::ScheduledWorkflows, value).await?;
        Ok(())
    }

    pub async fn create(&self, input: CreateScheduleInput) -> Result<ScheduledWorkflow, WorkflowError> {
        let schedule = new_schedule(input, false)?;

        let mut schedules = self.schedules.write().await;
        let mut next = schedules.clone();
        next.insert(schedule.id.clone(), schedule.clone());
        self.persist(&next).await?;
        *schedules = next;
        Ok(schedule)
    }

    pub async fn get(&self, id: &str) -> Option<ScheduledWorkflow> {
        self.schedules.read().await.get(id).cloned()
    }

    pub async fn list(&self, workflow_id: Option<&str>) -> Vec<ScheduledWorkflow> {
        let mut list: Vec<ScheduledWorkflow> = self
            .schedules
            .read()
            .await
            .values()
            .filter(|s| workflow_id.map_or(true, |id| s.workflow_id == id))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub async fn update(&self, id: &str, input: UpdateScheduleInput) -> Result<ScheduledWorkflow, WorkflowError> {
        let mut schedules = self.schedules.write().await;
        let mut schedule = schedules
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(format!("Schedule {} not found", id)))?;

        if let Some(v) = input.cron_expr {
            schedule.cron_expr = v;
        }
        if let Some(v) = input.timezone {
            schedule.timezone = v;
        }
        if let Some(v) = input.active {
            schedule.active = v;
        }
        let now = Utc::now();
        schedule.refresh_next_run(now)?;
        schedule.updated_at = now;

        let mut next = schedules.clone();
        next.insert(id.to_string(), schedule.clone());
        self.persist(&next).await?;
        *schedules = next;
        Ok(schedule)
    }

    pub async fn delete(&self, id: &str) -> Result<(), WorkflowError> {
        let mut schedules = self.schedules.write().await;
        if !schedules.contains_key(id) {
            return Err(WorkflowError::NotFound(format!("Schedule {} not found", id)));
        }
        let mut next = schedules.clone();
        next.remove(id);
        self.persist(&next).await?;
        *schedules = next;
        Ok(())
    }

    /// Active schedules whose next fire time is not after `now`.
    pub async fn due(&self, now: DateTime<Utc>) -> Vec<ScheduledWorkflow> {
        self.schedules
            .read()
            .await
            .values()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect()
    }

    /// Record a firing and move `nextRun` past `now`.
    pub async fn mark_fired(
        &self,
        id: &str,
        now: DateTime<Utc>,
        execution_id: Option<String>,
    ) -> Result<ScheduledWorkflow, WorkflowError> {
        let mut schedules = self.schedules.write().await;
        let mut schedule = schedules
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(format!("Schedule {} not found", id)))?;
        schedule.last_run = Some(now);
        schedule.last_execution_id = execution_id;
        schedule.refresh_next_run(now)?;
        schedule.updated_at = Utc::now();

        let mut next = schedules.clone();
        next.insert(id.to_string(), schedule.clone());
        self.persist(&next).await?;
        *schedules = next;
        Ok(schedule)
    }

    /// Keep the trigger-owned schedule of `workflow_id` in step with its
    /// declared `(cron, timezone)`. An unchanged trigger keeps its record
    /// (and its `active` flag); a changed one is replaced; `None` removes it.
    pub async fn sync_trigger(
        &self,
        workflow_id: &str,
        trigger: Option<(&str, &str)>,
    ) -> Result<Option<ScheduledWorkflow>, WorkflowError> {
        let mut schedules = self.schedules.write().await;
        let owned: Vec<&ScheduledWorkflow> = schedules
            .values()
            .filter(|s| s.from_trigger && s.workflow_id == workflow_id)
            .collect();

        if let Some((cron_expr, timezone)) = trigger {
            if let [current] = owned.as_slice() {
                if current.cron_expr == cron_expr && current.timezone == timezone {
                    return Ok(Some((*current).clone()));
                }
            }
        }

        let mut next = schedules.clone();
        next.retain(|_, s| !(s.from_trigger && s.workflow_id == workflow_id));
        let registered = match trigger {
            Some((cron_expr, timezone)) => {
                let schedule = new_schedule(
                    CreateScheduleInput {
                        workflow_id: workflow_id.to_string(),
                        cron_expr: cron_expr.to_string(),
                        timezone: timezone.to_string(),
                        active: true,
                    },
                    true,
                )?;
                next.insert(schedule.id.clone(), schedule.clone());
                Some(schedule)
            }
            None => None,
        };

        if next != *schedules {
            self.persist(&next).await?;
            *schedules = next;
            tracing::info!(
                workflow_id = %workflow_id,
                "[ScheduleStore] Trigger schedule {}",
                if registered.is_some() { "registered" } else { "removed" }
            );
        }
        Ok(registered)
    }

    /// Drop every schedule that points at `workflow_id`.
    pub async fn delete_for_workflow(&self, workflow_id: &str) -> Result<usize, WorkflowError> {
        let mut schedules = self.schedules.write().await;
        let mut next = schedules.clone();
        next.retain(|_, s| s.workflow_id != workflow_id);
        let removed = schedules.len() - next.len();
        if removed > 0 {
            self.persist(&next).await?;
            *schedules = next;
        }
        Ok(removed)
    }
}

fn new_schedule(input: CreateScheduleInput, from_trigger: bool) -> Result<ScheduledWorkflow, WorkflowError> {
    let now = Utc::now();
    let next_run = next_fire_time(&input.cron_expr, &input.timezone, now)?;
    Ok(ScheduledWorkflow {
        id: Uuid::new_v4().to_string(),
        workflow_id: input.workflow_id,
        cron_expr: input.cron_expr,
        timezone: input.timezone,
        active: input.active,
        next_run,
        last_run: None,
        last_execution_id: None,
        from_trigger,
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::storage::MemoryStorage;

    fn input(cron: &str, tz: &str) -> CreateScheduleInput {
        CreateScheduleInput {
            workflow_id: "daily-report".into(),
            cron_expr: cron.into(),
            timezone: tz.into(),
            active: true,
        }
    }

    async fn store() -> ScheduleStore {
        ScheduleStore::open(Arc::new(MemoryStorage::new())).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_computes_next_run() {
        let store = store().await;
        let s = store.create(input("0 9 * * *", "Europe/Berlin")).await.unwrap();
        assert!(s.next_run.unwrap() > s.created_at);
        assert_eq!(store.list(Some("daily-report")).await.len(), 1);
        assert!(store.list(Some("other")).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_cron_and_timezone_are_rejected() {
        let store = store().await;
        assert!(matches!(
            store.create(input("nope", "UTC")).await,
            Err(WorkflowError::Validation(ValidationError::InvalidCron { .. }))
        ));
        assert!(matches!(
            store.create(input("0 9 * * *", "Nowhere/City")).await,
            Err(WorkflowError::Validation(ValidationError::InvalidTimezone(_)))
        ));
        assert!(store.list(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_due_and_mark_fired() {
        let store = store().await;
        let s = store.create(input("* * * * *", "UTC")).await.unwrap();
        let later = s.next_run.unwrap() + chrono::Duration::seconds(1);

        let due = store.due(later).await;
        assert_eq!(due.len(), 1);

        let fired = store
            .mark_fired(&s.id, later, Some("exec-1".into()))
            .await
            .unwrap();
        assert_eq!(fired.last_run, Some(later));
        assert_eq!(fired.last_execution_id.as_deref(), Some("exec-1"));
        assert!(fired.next_run.unwrap() > later);
        assert!(store.due(later).await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_trigger_registers_replaces_and_removes() {
        let store = store().await;
        let manual = store.create(input("0 9 * * *", "UTC")).await.unwrap();

        let first = store
            .sync_trigger("daily-report", Some(("0 2 * * *", "UTC")))
            .await
            .unwrap()
            .unwrap();
        assert!(first.from_trigger);
        assert_eq!(store.list(Some("daily-report")).await.len(), 2);

        let same = store
            .sync_trigger("daily-report", Some(("0 2 * * *", "UTC")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(same.id, first.id);

        let changed = store
            .sync_trigger("daily-report", Some(("30 3 * * *", "Asia/Tokyo")))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(changed.id, first.id);
        assert!(store.get(&first.id).await.is_none());

        assert!(store.sync_trigger("daily-report", None).await.unwrap().is_none());
        let left = store.list(Some("daily-report")).await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, manual.id);
    }

    #[tokio::test]
    async fn test_update_deactivates_and_delete() {
        let store = store().await;
        let s = store.create(input("* * * * *", "UTC")).await.unwrap();
        let updated = store
            .update(
                &s.id,
                UpdateScheduleInput {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.active);
        assert!(store.due(Utc::now() + chrono::Duration::hours(1)).await.is_empty());

        store.delete(&s.id).await.unwrap();
        assert!(store.get(&s.id).await.is_none());
    }
}
