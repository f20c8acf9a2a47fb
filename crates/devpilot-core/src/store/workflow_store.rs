use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::models::{WorkflowDefinition, SYSTEM_AUTHOR, USER_AUTHOR};
use crate::storage::{decode_collection, encode_collection, Collection, StoragePort};
use crate::workflow::validate::validate_definition;

/// What happened to each built-in during seeding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: Vec<String>,
    pub upgraded: Vec<String>,
    /// Stored copies left alone (user-edited or same version)
    pub kept: Vec<String>,
    /// Built-ins the user deleted; they stay deleted
    pub deleted: Vec<String>,
}

/// Workflow definitions, cached in memory and written through the storage
/// port as one collection on every mutation.
pub struct WorkflowStore {
    storage: Arc<dyn StoragePort>,
    workflows: RwLock<BTreeMap<String, WorkflowDefinition>>,
    /// Tombstones for deleted built-ins, persisted so seeding skips them
    deleted_builtins: RwLock<BTreeSet<String>>,
    /// Ids of the catalog passed to the last `seed_builtins`
    builtin_ids: RwLock<BTreeSet<String>>,
}

impl WorkflowStore {
    pub async fn open(storage: Arc<dyn StoragePort>) -> Result<Self, WorkflowError> {
        let records: Vec<WorkflowDefinition> =
            decode_collection(Collection::Workflows, storage.load(Collection::Workflows).await?)?;
        let workflows = records.into_iter().map(|w| (w.id.clone(), w)).collect();
        let tombstones: Vec<String> = decode_collection(
            Collection::DeletedBuiltins,
            storage.load(Collection::DeletedBuiltins).await?,
        )?;
        Ok(Self {
            storage,
            workflows: RwLock::new(workflows),
            deleted_builtins: RwLock::new(tombstones.into_iter().collect()),
            builtin_ids: RwLock::new(BTreeSet::new()),
        })
    }

    async fn persist_tombstones(&self, ids: &BTreeSet<String>) -> Result<(), WorkflowError> {
        let records: Vec<&String> = ids.iter().collect();
        let value = encode_collection(Collection::DeletedBuiltins, &records)?;
        self.storage.save(Collection::DeletedBuiltins, value).await?;
        Ok(())
    }

    async fn persist(&self, workflows: &BTreeMap<String, WorkflowDefinition>) -> Result<(), WorkflowError> {
        let records: Vec<&WorkflowDefinition> = workflows.values().collect();
        let value = encode_collection(Collection::Workflows, &records)?;
        self.storage.save(Collection::Workflows, value).await?;
        Ok(())
    }

    /// Validate and store a new definition, returning it with its id filled in.
    pub async fn create(&self, mut def: WorkflowDefinition) -> Result<WorkflowDefinition, WorkflowError> {
        validate_definition(&def)?;
        if def.id.trim().is_empty() {
            def.id = Uuid::new_v4().to_string();
        }
        let now = Utc::now();
        def.created_at = now;
        def.updated_at = now;

        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(&def.id) {
            return Err(WorkflowError::Conflict(format!("Workflow {} already exists", def.id)));
        }
        let mut next = workflows.clone();
        next.insert(def.id.clone(), def.clone());
        self.persist(&next).await?;
        *workflows = next;

        // Recreating a deleted built-in id lifts its tombstone.
        let mut tombstones = self.deleted_builtins.write().await;
        if tombstones.contains(&def.id) {
            let mut remaining = tombstones.clone();
            remaining.remove(&def.id);
            self.persist_tombstones(&remaining).await?;
            *tombstones = remaining;
        }

        tracing::info!(workflow_id = %def.id, "[WorkflowStore] Created workflow '{}'", def.name);
        Ok(def)
    }

    pub async fn get(&self, id: &str) -> Option<WorkflowDefinition> {
        self.workflows.read().await.get(id).cloned()
    }

    pub async fn list(&self, category: Option<&str>) -> Vec<WorkflowDefinition> {
        self.workflows
            .read()
            .await
            .values()
            .filter(|w| category.map_or(true, |c| w.category == c))
            .cloned()
            .collect()
    }

    /// Replace a definition wholesale. Run statistics and `createdAt` carry
    /// over; the author becomes `"user"`.
    pub async fn update(&self, id: &str, mut def: WorkflowDefinition) -> Result<WorkflowDefinition, WorkflowError> {
        def.id = id.to_string();
        validate_definition(&def)?;

        let mut workflows = self.workflows.write().await;
        let existing = workflows
            .get(id)
            .ok_or_else(|| WorkflowError::NotFound(format!("Workflow {} not found", id)))?;
        def.author = USER_AUTHOR.to_string();
        def.created_at = existing.created_at;
        def.run_count = existing.run_count;
        def.success_count = existing.success_count;
        def.success_rate = existing.success_rate;
        def.updated_at = Utc::now();

        let mut next = workflows.clone();
        next.insert(id.to_string(), def.clone());
        self.persist(&next).await?;
        *workflows = next;
        Ok(def)
    }

    /// Remove a definition. Deleting a built-in (system or user-edited copy)
    /// leaves a tombstone so the next seeding does not bring it back.
    pub async fn delete(&self, id: &str) -> Result<(), WorkflowError> {
        let mut workflows = self.workflows.write().await;
        let Some(existing) = workflows.get(id) else {
            return Err(WorkflowError::NotFound(format!("Workflow {} not found", id)));
        };
        let is_builtin = existing.is_system() || self.builtin_ids.read().await.contains(id);

        let mut next = workflows.clone();
        next.remove(id);
        self.persist(&next).await?;
        *workflows = next;

        if is_builtin {
            let mut tombstones = self.deleted_builtins.write().await;
            let mut updated = tombstones.clone();
            if updated.insert(id.to_string()) {
                self.persist_tombstones(&updated).await?;
                *tombstones = updated;
            }
            tracing::info!(workflow_id = %id, "[WorkflowStore] Built-in workflow deleted; it will not be re-seeded");
        }
        Ok(())
    }

    /// Fold a finished run into the workflow's rolling success rate.
    pub async fn record_outcome(&self, id: &str, success: bool) -> Result<(), WorkflowError> {
        let mut workflows = self.workflows.write().await;
        let Some(existing) = workflows.get(id) else {
            // Deleted while the run was in flight.
            return Ok(());
        };
        let mut updated = existing.clone();
        updated.record_outcome(success);

        let mut next = workflows.clone();
        next.insert(id.to_string(), updated);
        self.persist(&next).await?;
        *workflows = next;
        Ok(())
    }

    /// Insert missing built-ins and upgrade untouched system copies whose
    /// version differs. User-edited copies are never overwritten.
    pub async fn seed_builtins(&self, builtins: Vec<WorkflowDefinition>) -> Result<SeedReport, WorkflowError> {
        let mut workflows = self.workflows.write().await;
        let tombstones = self.deleted_builtins.read().await;
        *self.builtin_ids.write().await = builtins.iter().map(|d| d.id.clone()).collect();
        let mut next = workflows.clone();
        let mut report = SeedReport::default();

        for mut def in builtins {
            validate_definition(&def)?;
            def.author = SYSTEM_AUTHOR.to_string();
            if tombstones.contains(&def.id) && !next.contains_key(&def.id) {
                report.deleted.push(def.id.clone());
                continue;
            }
            match next.get(&def.id) {
                None => {
                    report.inserted.push(def.id.clone());
                    next.insert(def.id.clone(), def);
                }
                Some(stored) if stored.is_system() && stored.version != def.version => {
                    def.created_at = stored.created_at;
                    def.run_count = stored.run_count;
                    def.success_count = stored.success_count;
                    def.success_rate = stored.success_rate;
                    def.updated_at = Utc::now();
                    report.upgraded.push(def.id.clone());
                    next.insert(def.id.clone(), def);
                }
                Some(_) => report.kept.push(def.id.clone()),
            }
        }

        if !report.inserted.is_empty() || !report.upgraded.is_empty() {
            self.persist(&next).await?;
            *workflows = next;
        }
        tracing::info!(
            "[WorkflowStore] Built-ins: {} inserted, {} upgraded, {} kept, {} deleted by the user",
            report.inserted.len(),
            report.upgraded.len(),
            report.kept.len(),
            report.deleted.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::storage::MemoryStorage;

    fn def(id: &str, version: &str) -> WorkflowDefinition {
        let mut wf = WorkflowDefinition::from_yaml(
            "name: Flow\ncategory: git\nsteps:\n  - { id: a, name: A, agent: researcher }\n",
        )
        .unwrap();
        wf.id = id.to_string();
        wf.version = version.to_string();
        wf
    }

    async fn store() -> (Arc<MemoryStorage>, WorkflowStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = WorkflowStore::open(storage.clone()).await.unwrap();
        (storage, store)
    }

    #[tokio::test]
    async fn test_create_generates_id_and_persists() {
        let (storage, store) = store().await;
        let created = store.create(def("", "1.0.0")).await.unwrap();
        assert!(!created.id.is_empty());

        let saved = storage.load(Collection::Workflows).await.unwrap().unwrap();
        assert_eq!(saved[0]["id"], created.id.as_str());

        let reopened = WorkflowStore::open(storage).await.unwrap();
        assert!(reopened.get(&created.id).await.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts_and_cycle_is_never_stored() {
        let (_, store) = store().await;
        store.create(def("flow", "1.0.0")).await.unwrap();
        assert!(matches!(
            store.create(def("flow", "1.0.0")).await,
            Err(WorkflowError::Conflict(_))
        ));

        let mut cyclic = def("cyclic", "1.0.0");
        cyclic.steps[0].depends_on = vec!["a".into()];
        assert!(matches!(
            store.create(cyclic).await,
            Err(WorkflowError::Validation(ValidationError::SelfDependency(_)))
        ));
        assert!(store.get("cyclic").await.is_none());
    }

    #[tokio::test]
    async fn test_update_preserves_stats_and_marks_user() {
        let (_, store) = store().await;
        let mut original = def("flow", "1.0.0");
        original.author = SYSTEM_AUTHOR.into();
        store.create(original).await.unwrap();
        store.record_outcome("flow", true).await.unwrap();
        store.record_outcome("flow", false).await.unwrap();

        let mut edited = def("ignored", "1.1.0");
        edited.name = "Edited".into();
        let updated = store.update("flow", edited).await.unwrap();
        assert_eq!(updated.id, "flow");
        assert_eq!(updated.author, USER_AUTHOR);
        assert_eq!(updated.run_count, 2);
        assert!((updated.success_rate - 50.0).abs() < f64::EPSILON);

        assert!(matches!(
            store.update("missing", def("x", "1.0.0")).await,
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_category_and_delete() {
        let (_, store) = store().await;
        store.create(def("one", "1.0.0")).await.unwrap();
        let mut other = def("two", "1.0.0");
        other.category = "research".into();
        store.create(other).await.unwrap();

        assert_eq!(store.list(None).await.len(), 2);
        assert_eq!(store.list(Some("research")).await.len(), 1);

        store.delete("one").await.unwrap();
        assert!(store.get("one").await.is_none());
        assert!(matches!(store.delete("one").await, Err(WorkflowError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_seeding_respects_user_edits() {
        let (_, store) = store().await;
        let report = store
            .seed_builtins(vec![def("a", "1.0.0"), def("b", "1.0.0")])
            .await
            .unwrap();
        assert_eq!(report.inserted, vec!["a".to_string(), "b".into()]);

        let mut edited = def("b", "1.0.0");
        edited.name = "Mine".into();
        store.update("b", edited).await.unwrap();

        let report = store
            .seed_builtins(vec![def("a", "2.0.0"), def("b", "2.0.0")])
            .await
            .unwrap();
        assert_eq!(report.upgraded, vec!["a".to_string()]);
        assert_eq!(report.kept, vec!["b".to_string()]);
        assert_eq!(store.get("a").await.unwrap().version, "2.0.0");
        let b = store.get("b").await.unwrap();
        assert_eq!(b.name, "Mine");
        assert_eq!(b.author, USER_AUTHOR);
    }

    #[tokio::test]
    async fn test_deleted_builtin_stays_deleted_across_restarts() {
        let (storage, store) = store().await;
        store
            .seed_builtins(vec![def("a", "1.0.0"), def("b", "1.0.0")])
            .await
            .unwrap();

        // A user-edited copy counts as a built-in too.
        store.update("b", def("b", "1.0.0")).await.unwrap();
        store.delete("a").await.unwrap();
        store.delete("b").await.unwrap();

        let reopened = WorkflowStore::open(storage).await.unwrap();
        let report = reopened
            .seed_builtins(vec![def("a", "2.0.0"), def("b", "1.0.0")])
            .await
            .unwrap();
        assert!(report.inserted.is_empty());
        assert_eq!(report.deleted, vec!["a".to_string(), "b".into()]);
        assert!(reopened.get("a").await.is_none());

        // Recreating the id by hand lifts the tombstone.
        reopened.create(def("a", "1.0.0")).await.unwrap();
        reopened.delete("a").await.unwrap();
        reopened.create(def("a", "1.0.0")).await.unwrap();
        let report = reopened.seed_builtins(vec![def("a", "1.0.0")]).await.unwrap();
        assert_eq!(report.kept, vec!["a".to_string()]);
    }
}
