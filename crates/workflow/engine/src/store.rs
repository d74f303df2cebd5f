//! Workflow instance storage
//!
//! The engine is the single writer of instance state, but it never holds
//! instances itself: every read and commit goes through the
//! [`WorkflowInstanceStore`] trait so a database-backed store can replace
//! the in-memory one.

use dashmap::DashMap;
use insureflow_types::{ProcessType, WorkflowInstance, WorkflowInstanceId, WorkflowResult};

/// Storage backend for workflow instances
///
/// Implementations must be safe to share across threads. The engine
/// serializes writes per instance id; different ids may be written
/// concurrently.
pub trait WorkflowInstanceStore: Send + Sync {
    /// Load an instance by id
    fn get(&self, id: &WorkflowInstanceId) -> WorkflowResult<Option<WorkflowInstance>>;

    /// Insert or replace an instance
    fn put(&self, instance: &WorkflowInstance) -> WorkflowResult<()>;

    /// Remove an instance; returns whether it existed
    fn delete(&self, id: &WorkflowInstanceId) -> WorkflowResult<bool>;

    /// All stored instances, in no particular order
    fn list(&self) -> WorkflowResult<Vec<WorkflowInstance>>;

    /// Instances of one process type
    fn list_by_process_type(
        &self,
        process_type: &ProcessType,
    ) -> WorkflowResult<Vec<WorkflowInstance>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|i| &i.process_type == process_type)
            .collect())
    }
}

/// In-memory instance store backed by a concurrent map
pub struct InMemoryInstanceStore {
    instances: DashMap<WorkflowInstanceId, WorkflowInstance>,
}

impl InMemoryInstanceStore {
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
        }
    }

    /// Number of stored instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Drop every stored instance
    pub fn clear(&self) {
        self.instances.clear();
    }
}

impl Default for InMemoryInstanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowInstanceStore for InMemoryInstanceStore {
    fn get(&self, id: &WorkflowInstanceId) -> WorkflowResult<Option<WorkflowInstance>> {
        Ok(self.instances.get(id).map(|i| i.clone()))
    }

    fn put(&self, instance: &WorkflowInstance) -> WorkflowResult<()> {
        self.instances.insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    fn delete(&self, id: &WorkflowInstanceId) -> WorkflowResult<bool> {
        Ok(self.instances.remove(id).is_some())
    }

    fn list(&self) -> WorkflowResult<Vec<WorkflowInstance>> {
        Ok(self.instances.iter().map(|i| i.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use insureflow_types::{ProcessDefinition, Step, UserId, WorkflowContext, WorkflowStatus};
    use std::sync::Arc;

    fn make_instance(process_type: &str) -> WorkflowInstance {
        let def = Arc::new(
            ProcessDefinition::new(process_type, "Test")
                .with_step(Step::automated("only", "Only Step")),
        );
        WorkflowInstance::new(def, UserId::new("tester"), WorkflowContext::new(), Utc::now())
            .unwrap()
    }

    #[test]
    fn test_put_get_delete() {
        let store = InMemoryInstanceStore::new();
        let inst = make_instance("CLAIM_PROCESSING");
        let id = inst.id.clone();

        store.put(&inst).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&id).unwrap(), Some(inst));

        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(store.get(&id).unwrap().is_none());
    }

    #[test]
    fn test_put_replaces() {
        let store = InMemoryInstanceStore::new();
        let mut inst = make_instance("CLAIM_PROCESSING");
        store.put(&inst).unwrap();

        inst.status = WorkflowStatus::Suspended;
        store.put(&inst).unwrap();

        assert_eq!(store.len(), 1);
        let loaded = store.get(&inst.id).unwrap().unwrap();
        assert_eq!(loaded.status, WorkflowStatus::Suspended);
    }

    #[test]
    fn test_list_by_process_type() {
        let store = InMemoryInstanceStore::new();
        store.put(&make_instance("CLAIM_PROCESSING")).unwrap();
        store.put(&make_instance("CLAIM_PROCESSING")).unwrap();
        store.put(&make_instance("SERVICE_REQUEST")).unwrap();

        assert_eq!(store.list().unwrap().len(), 3);
        let claims = store
            .list_by_process_type(&ProcessType::new("CLAIM_PROCESSING"))
            .unwrap();
        assert_eq!(claims.len(), 2);

        store.clear();
        assert!(store.is_empty());
    }
}
