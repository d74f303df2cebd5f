//! Workflow Engine for Insureflow
//!
//! Drives insurance back-office processes (policy applications, claims,
//! service requests) through their steps. Automated and decision steps run
//! inside the engine; human tasks are created, assigned, escalated and
//! completed through the engine's API.
//!
//! # Architecture
//!
//! The [`WorkflowEngine`] composes specialized components:
//!
//! - [`ProcessCatalog`]: Immutable process definitions keyed by type
//! - [`TaskAssigner`]: Resolves a role to an assignee
//! - [`EscalationPolicy`]: Resolves an assignee to an escalation target
//! - [`WorkflowInstanceStore`]: Holds instance state between calls
//! - [`StepHandlers`]: Automated step handlers and decision rules
//! - [`AuditSink`]: Receives every history event after commit
//!
//! # Example
//!
//! ```rust
//! use insureflow_engine::WorkflowEngine;
//! use insureflow_types::*;
//!
//! let definition = ProcessDefinition::new("SERVICE_REQUEST", "Service Request")
//!     .with_step(Step::human_task("handle", "Handle Request", "service_agent").with_auto_assign(true))
//!     .with_step(Step::automated("close", "Close Request"));
//!
//! let engine = WorkflowEngine::builder()
//!     .with_process(definition)
//!     .unwrap()
//!     .with_assignment_fn(|_role: &RoleId| Some(UserId::new("agent-1")))
//!     .build();
//!
//! let instance = engine
//!     .start_process(
//!         &ProcessType::new("SERVICE_REQUEST"),
//!         UserId::new("customer-42"),
//!         WorkflowContext::new().with("request", "address change"),
//!     )
//!     .unwrap();
//! let task_id = instance.tasks[0].id.clone();
//!
//! let instance = engine
//!     .complete_task(&instance.id, &task_id, &UserId::new("agent-1"), TaskResult::new())
//!     .unwrap();
//! assert_eq!(instance.status, WorkflowStatus::Completed);
//! ```

#![deny(unsafe_code)]

pub mod assignment;
pub mod audit;
pub mod builder;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod escalation;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
mod state_machine;
pub mod store;

// Re-export main types
pub use assignment::{
    AssignmentStrategy, FnAssigner, NoAssigner, RandomAssigner, RolePools, RoundRobinAssigner,
    TaskAssigner,
};
pub use audit::{AuditRecord, AuditSink, CompositeSink, MemoryAuditSink, NoopAuditSink, TracingAuditSink};
pub use builder::WorkflowEngineBuilder;
pub use catalog::ProcessCatalog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AssignmentConfig, EngineConfig, EscalationConfig};
pub use escalation::{EscalationPolicy, FnEscalationPolicy, OverdueTask, StaticEscalationPolicy};
pub use handlers::{AutomatedStepHandler, DecisionRule, FnDecisionRule, FnStepHandler, StepHandlers};
pub use metrics::{TaskMetrics, WorkflowMetrics};
pub use orchestrator::{AssignedTask, WorkflowEngine};
pub use state_machine::decision_outcome_key;
pub use store::{InMemoryInstanceStore, WorkflowInstanceStore};
