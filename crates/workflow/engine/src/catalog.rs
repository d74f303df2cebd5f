//! Process catalog: stores and retrieves process definitions
//!
//! Definitions are registered once at startup and never mutated. The
//! engine owns the catalog behind an `Arc` after building, so lookups need
//! no locking.

use insureflow_types::{ProcessDefinition, ProcessType, WorkflowError, WorkflowResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of process definitions keyed by process type
#[derive(Clone, Debug)]
pub struct ProcessCatalog {
    definitions: HashMap<ProcessType, Arc<ProcessDefinition>>,
}

impl ProcessCatalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
        }
    }

    /// Register a process definition
    ///
    /// Validates the definition and rejects a type that is already
    /// registered. Returns the process type.
    pub fn register(&mut self, definition: ProcessDefinition) -> WorkflowResult<ProcessType> {
        definition.validate()?;

        let process_type = definition.process_type.clone();
        if self.definitions.contains_key(&process_type) {
            return Err(WorkflowError::DuplicateProcessType(process_type));
        }

        tracing::info!(
            process_type = %process_type,
            version = definition.version,
            steps = definition.step_count(),
            "Process definition registered"
        );
        self.definitions
            .insert(process_type.clone(), Arc::new(definition));
        Ok(process_type)
    }

    /// Get the definition for a process type
    pub fn lookup(&self, process_type: &ProcessType) -> WorkflowResult<Arc<ProcessDefinition>> {
        self.definitions
            .get(process_type)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownProcessType(process_type.clone()))
    }

    pub fn contains(&self, process_type: &ProcessType) -> bool {
        self.definitions.contains_key(process_type)
    }

    /// Registered process types, sorted
    pub fn process_types(&self) -> Vec<ProcessType> {
        let mut types: Vec<_> = self.definitions.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn count(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for ProcessCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insureflow_types::Step;

    fn make_definition(process_type: &str) -> ProcessDefinition {
        ProcessDefinition::new(process_type, "Service Request")
            .with_step(Step::human_task("handle", "Handle Request", "service_agent"))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut catalog = ProcessCatalog::new();
        let ty = catalog.register(make_definition("SERVICE_REQUEST")).unwrap();

        assert_eq!(ty, ProcessType::new("SERVICE_REQUEST"));
        assert_eq!(catalog.count(), 1);
        assert!(catalog.contains(&ty));
        assert_eq!(catalog.lookup(&ty).unwrap().step_count(), 1);
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut catalog = ProcessCatalog::new();
        catalog.register(make_definition("SERVICE_REQUEST")).unwrap();
        let err = catalog.register(make_definition("SERVICE_REQUEST")).unwrap_err();
        assert_eq!(
            err,
            WorkflowError::DuplicateProcessType(ProcessType::new("SERVICE_REQUEST"))
        );
        assert_eq!(catalog.count(), 1);
    }

    #[test]
    fn test_unknown_type() {
        let catalog = ProcessCatalog::new();
        let err = catalog.lookup(&ProcessType::new("MARINE")).unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownProcessType(_)));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_invalid_definition_rejected() {
        let mut catalog = ProcessCatalog::new();
        let result = catalog.register(ProcessDefinition::new("EMPTY", "Empty"));
        assert!(matches!(result, Err(WorkflowError::InvalidDefinition { .. })));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_oversized_timeout_rejected() {
        let mut catalog = ProcessCatalog::new();
        let def = ProcessDefinition::new("MARINE_CLAIM", "Marine Claim").with_step(
            Step::human_task("survey", "Hull Survey", "surveyor").with_timeout(u64::MAX),
        );
        let result = catalog.register(def);
        assert!(matches!(result, Err(WorkflowError::InvalidDefinition { .. })));
        assert!(!catalog.contains(&ProcessType::new("MARINE_CLAIM")));
    }

    #[test]
    fn test_lookup_shares_definition() {
        let mut catalog = ProcessCatalog::new();
        let ty = catalog.register(make_definition("SERVICE_REQUEST")).unwrap();
        let a = catalog.lookup(&ty).unwrap();
        let b = catalog.lookup(&ty).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_process_types_sorted() {
        let mut catalog = ProcessCatalog::new();
        catalog.register(make_definition("SERVICE_REQUEST")).unwrap();
        catalog.register(make_definition("CLAIM_PROCESSING")).unwrap();
        assert_eq!(
            catalog.process_types(),
            vec![
                ProcessType::new("CLAIM_PROCESSING"),
                ProcessType::new("SERVICE_REQUEST")
            ]
        );
    }
}
