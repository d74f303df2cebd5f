//! Pluggable computation for AUTOMATED and DECISION steps
//!
//! Real implementations live with the business collaborators (claims
//! intake validation, policy number generation, payment submission,
//! underwriting rules). The engine looks them up by step id, optionally
//! scoped to one process type, and only ever sees the traits below.

use insureflow_types::{ContextUpdates, ContextValue, ProcessType, StepId, WorkflowContext, WorkflowResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Computation behind an AUTOMATED step
pub trait AutomatedStepHandler: Send + Sync {
    /// Produce context updates for `step_id`; an error aborts the call
    fn execute(&self, step_id: &StepId, context: &WorkflowContext) -> WorkflowResult<ContextUpdates>;
}

/// Rule behind a DECISION step
pub trait DecisionRule: Send + Sync {
    /// Evaluate the accumulated context into an outcome
    fn evaluate(&self, context: &WorkflowContext) -> WorkflowResult<ContextValue>;
}

/// [`AutomatedStepHandler`] backed by a closure
pub struct FnStepHandler<F>(F);

impl<F> FnStepHandler<F>
where
    F: Fn(&StepId, &WorkflowContext) -> WorkflowResult<ContextUpdates> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> AutomatedStepHandler for FnStepHandler<F>
where
    F: Fn(&StepId, &WorkflowContext) -> WorkflowResult<ContextUpdates> + Send + Sync,
{
    fn execute(&self, step_id: &StepId, context: &WorkflowContext) -> WorkflowResult<ContextUpdates> {
        (self.0)(step_id, context)
    }
}

/// [`DecisionRule`] backed by a closure
pub struct FnDecisionRule<F>(F);

impl<F> FnDecisionRule<F>
where
    F: Fn(&WorkflowContext) -> WorkflowResult<ContextValue> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> DecisionRule for FnDecisionRule<F>
where
    F: Fn(&WorkflowContext) -> WorkflowResult<ContextValue> + Send + Sync,
{
    fn evaluate(&self, context: &WorkflowContext) -> WorkflowResult<ContextValue> {
        (self.0)(context)
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Step handlers and decision rules, keyed by step id
///
/// A registration scoped to a process type wins over an unscoped one for
/// the same step id.
#[derive(Clone, Default)]
pub struct StepHandlers {
    handlers: HashMap<StepId, Arc<dyn AutomatedStepHandler>>,
    scoped_handlers: HashMap<(ProcessType, StepId), Arc<dyn AutomatedStepHandler>>,
    rules: HashMap<StepId, Arc<dyn DecisionRule>>,
    scoped_rules: HashMap<(ProcessType, StepId), Arc<dyn DecisionRule>>,
}

impl StepHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler(&mut self, step_id: impl Into<StepId>, handler: Arc<dyn AutomatedStepHandler>) {
        self.handlers.insert(step_id.into(), handler);
    }

    pub fn register_scoped_handler(
        &mut self,
        process_type: impl Into<ProcessType>,
        step_id: impl Into<StepId>,
        handler: Arc<dyn AutomatedStepHandler>,
    ) {
        self.scoped_handlers
            .insert((process_type.into(), step_id.into()), handler);
    }

    pub fn register_rule(&mut self, step_id: impl Into<StepId>, rule: Arc<dyn DecisionRule>) {
        self.rules.insert(step_id.into(), rule);
    }

    pub fn register_scoped_rule(
        &mut self,
        process_type: impl Into<ProcessType>,
        step_id: impl Into<StepId>,
        rule: Arc<dyn DecisionRule>,
    ) {
        self.scoped_rules
            .insert((process_type.into(), step_id.into()), rule);
    }

    pub fn handler(&self, process_type: &ProcessType, step_id: &StepId) -> Option<&Arc<dyn AutomatedStepHandler>> {
        self.scoped_handlers
            .get(&(process_type.clone(), step_id.clone()))
            .or_else(|| self.handlers.get(step_id))
    }

    pub fn rule(&self, process_type: &ProcessType, step_id: &StepId) -> Option<&Arc<dyn DecisionRule>> {
        self.scoped_rules
            .get(&(process_type.clone(), step_id.clone()))
            .or_else(|| self.rules.get(step_id))
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len() + self.scoped_handlers.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len() + self.scoped_rules.len()
    }
}

impl std::fmt::Debug for StepHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepHandlers")
            .field("handlers", &self.handler_count())
            .field("rules", &self.rule_count())
            .finish()
    }
}
