//! Engine construction
//!
//! Everything the engine depends on is fixed at build time. The catalog
//! in particular becomes read-only once `build` returns.

use crate::assignment::{FnAssigner, NoAssigner, TaskAssigner};
use crate::audit::{AuditSink, TracingAuditSink};
use crate::catalog::ProcessCatalog;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::escalation::{EscalationPolicy, StaticEscalationPolicy};
use crate::handlers::{AutomatedStepHandler, DecisionRule, FnDecisionRule, FnStepHandler, StepHandlers};
use crate::orchestrator::WorkflowEngine;
use crate::store::{InMemoryInstanceStore, WorkflowInstanceStore};
use dashmap::DashMap;
use insureflow_types::{
    ContextUpdates, ContextValue, ProcessDefinition, ProcessType, RoleId, StepId, UserId,
    WorkflowContext, WorkflowResult,
};
use std::sync::Arc;

/// Builder for [`WorkflowEngine`]
///
/// Defaults: in-memory store, no automatic assignment, no escalation
/// targets, tracing audit sink, system clock, `"SYSTEM"` as actor.
pub struct WorkflowEngineBuilder {
    catalog: ProcessCatalog,
    store: Option<Arc<dyn WorkflowInstanceStore>>,
    handlers: StepHandlers,
    assigner: Option<Arc<dyn TaskAssigner>>,
    escalation: Option<Arc<dyn EscalationPolicy>>,
    audit: Option<Arc<dyn AuditSink>>,
    clock: Option<Arc<dyn Clock>>,
    system_actor: UserId,
}

impl WorkflowEngineBuilder {
    pub fn new() -> Self {
        Self {
            catalog: ProcessCatalog::new(),
            store: None,
            handlers: StepHandlers::new(),
            assigner: None,
            escalation: None,
            audit: None,
            clock: None,
            system_actor: UserId::new("SYSTEM"),
        }
    }

    /// Builder preloaded with the configured processes, assignment pools,
    /// escalation targets and system actor
    pub fn from_config(config: &EngineConfig) -> WorkflowResult<Self> {
        Ok(Self::new()
            .with_catalog(config.build_catalog()?)
            .with_assigner(config.build_assigner())
            .with_escalation_policy(Arc::new(config.build_escalation_policy()))
            .with_system_actor(config.system_actor.clone()))
    }

    // ── Definitions ──────────────────────────────────────────────────

    /// Register a process definition
    pub fn with_process(mut self, definition: ProcessDefinition) -> WorkflowResult<Self> {
        self.catalog.register(definition)?;
        Ok(self)
    }

    /// Register a process definition in place
    pub fn register_process(&mut self, definition: ProcessDefinition) -> WorkflowResult<ProcessType> {
        self.catalog.register(definition)
    }

    /// Replace the catalog wholesale
    pub fn with_catalog(mut self, catalog: ProcessCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    // ── Step computation ─────────────────────────────────────────────

    pub fn with_handler(mut self, step_id: impl Into<StepId>, handler: Arc<dyn AutomatedStepHandler>) -> Self {
        self.handlers.register_handler(step_id, handler);
        self
    }

    /// Handler for `step_id` in one process type only
    pub fn with_scoped_handler(
        mut self,
        process_type: impl Into<ProcessType>,
        step_id: impl Into<StepId>,
        handler: Arc<dyn AutomatedStepHandler>,
    ) -> Self {
        self.handlers
            .register_scoped_handler(process_type, step_id, handler);
        self
    }

    pub fn with_handler_fn<F>(self, step_id: impl Into<StepId>, f: F) -> Self
    where
        F: Fn(&StepId, &WorkflowContext) -> WorkflowResult<ContextUpdates> + Send + Sync + 'static,
    {
        self.with_handler(step_id, Arc::new(FnStepHandler::new(f)))
    }

    pub fn with_rule(mut self, step_id: impl Into<StepId>, rule: Arc<dyn DecisionRule>) -> Self {
        self.handlers.register_rule(step_id, rule);
        self
    }

    /// Rule for `step_id` in one process type only
    pub fn with_scoped_rule(
        mut self,
        process_type: impl Into<ProcessType>,
        step_id: impl Into<StepId>,
        rule: Arc<dyn DecisionRule>,
    ) -> Self {
        self.handlers.register_scoped_rule(process_type, step_id, rule);
        self
    }

    pub fn with_rule_fn<F>(self, step_id: impl Into<StepId>, f: F) -> Self
    where
        F: Fn(&WorkflowContext) -> WorkflowResult<ContextValue> + Send + Sync + 'static,
    {
        self.with_rule(step_id, Arc::new(FnDecisionRule::new(f)))
    }

    // ── Collaborators ────────────────────────────────────────────────

    pub fn with_store(mut self, store: Arc<dyn WorkflowInstanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_assigner(mut self, assigner: Arc<dyn TaskAssigner>) -> Self {
        self.assigner = Some(assigner);
        self
    }

    /// Assign through a fixed function; deterministic in tests
    pub fn with_assignment_fn<F>(self, f: F) -> Self
    where
        F: Fn(&RoleId) -> Option<UserId> + Send + Sync + 'static,
    {
        self.with_assigner(Arc::new(FnAssigner::new(f)))
    }

    pub fn with_escalation_policy(mut self, policy: Arc<dyn EscalationPolicy>) -> Self {
        self.escalation = Some(policy);
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_system_actor(mut self, actor: impl Into<UserId>) -> Self {
        self.system_actor = actor.into();
        self
    }

    pub fn build(self) -> WorkflowEngine {
        tracing::debug!(
            processes = self.catalog.count(),
            handlers = self.handlers.handler_count(),
            rules = self.handlers.rule_count(),
            "Workflow engine built"
        );

        WorkflowEngine {
            catalog: Arc::new(self.catalog),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryInstanceStore::new())),
            handlers: self.handlers,
            assigner: self.assigner.unwrap_or_else(|| Arc::new(NoAssigner)),
            escalation: self
                .escalation
                .unwrap_or_else(|| Arc::new(StaticEscalationPolicy::new())),
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            system_actor: self.system_actor,
            locks: DashMap::new(),
        }
    }
}

impl Default for WorkflowEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insureflow_types::{Step, WorkflowError};

    #[test]
    fn test_defaults() {
        let engine = WorkflowEngineBuilder::new().build();
        assert!(engine.catalog().is_empty());
        assert_eq!(engine.system_actor(), &UserId::new("SYSTEM"));
    }

    #[test]
    fn test_with_process_rejects_duplicates() {
        let def = ProcessDefinition::new("SERVICE_REQUEST", "Service Request")
            .with_step(Step::automated("close", "Close"));
        let result = WorkflowEngineBuilder::new()
            .with_process(def.clone())
            .and_then(|b| b.with_process(def));
        assert!(matches!(result, Err(WorkflowError::DuplicateProcessType(_))));
    }

    #[test]
    fn test_from_config() {
        let config = EngineConfig::from_toml_str(
            r#"
            system_actor = "ENGINE"

            [[processes]]
            type = "SERVICE_REQUEST"
            name = "Service Request"

            [[processes.steps]]
            id = "close"
            name = "Close"
            kind = "AUTOMATED"
            "#,
        )
        .unwrap();

        let engine = WorkflowEngineBuilder::from_config(&config).unwrap().build();
        assert_eq!(engine.system_actor(), &UserId::new("ENGINE"));
        assert!(engine
            .catalog()
            .contains(&ProcessType::new("SERVICE_REQUEST")));
    }
}
