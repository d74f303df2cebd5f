//! Error types for workflow operations
//!
//! All errors are local and synchronous. None of them is retryable: the
//! same call with the same arguments fails the same way.

use crate::{ProcessType, StepId, TaskId, UserId, WorkflowInstanceId};
use thiserror::Error;

/// Errors raised by the catalog, the store, and the engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    /// Lookup of a process type that was never registered
    #[error("unknown process type: {0}")]
    UnknownProcessType(ProcessType),

    /// Registration of a process type that is already in the catalog
    #[error("process type already registered: {0}")]
    DuplicateProcessType(ProcessType),

    /// Structural problem in a process definition
    #[error("invalid definition for {process_type}: {reason}")]
    InvalidDefinition {
        process_type: ProcessType,
        reason: String,
    },

    /// Unknown workflow instance id
    #[error("workflow not found: {0}")]
    WorkflowNotFound(WorkflowInstanceId),

    /// Unknown task id, or a task that does not belong to the instance
    #[error("task {task_id} not found in workflow {instance_id}")]
    TaskNotFound {
        instance_id: WorkflowInstanceId,
        task_id: TaskId,
    },

    /// A step id that is not part of the instance's definition
    #[error("step {step_id} not found in process {process_type}")]
    StepNotFound {
        process_type: ProcessType,
        step_id: StepId,
    },

    /// Mutation of a terminal instance or a closed task
    #[error("invalid state transition for {subject}: {reason}")]
    InvalidStateTransition { subject: String, reason: String },

    /// The escalation policy has no target for the current assignee
    #[error("no escalation target for task {task_id} (assignee: {})", display_assignee(.assignee))]
    NoEscalationTarget {
        task_id: TaskId,
        assignee: Option<UserId>,
    },

    /// A DECISION step has no decision rule registered
    #[error("no decision rule registered for step {0}")]
    MissingDecisionRule(StepId),

    /// An automated step handler or decision rule reported a failure
    #[error("step {step_id} failed: {message}")]
    StepHandler { step_id: StepId, message: String },

    /// The instance store backend failed
    #[error("store error: {0}")]
    Store(String),

    /// Configuration could not be loaded or parsed
    #[error("configuration error: {0}")]
    Config(String),
}

fn display_assignee(assignee: &Option<UserId>) -> String {
    assignee
        .as_ref()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unassigned".to_string())
}

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl WorkflowError {
    /// Shorthand for an [`WorkflowError::InvalidStateTransition`]
    pub fn invalid_state(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidStateTransition {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`WorkflowError::StepHandler`] failure
    pub fn step_failed(step_id: StepId, message: impl Into<String>) -> Self {
        Self::StepHandler {
            step_id,
            message: message.into(),
        }
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownProcessType(_)
                | Self::WorkflowNotFound(_)
                | Self::TaskNotFound { .. }
                | Self::StepNotFound { .. }
        )
    }

    /// Check if this error rejects a mutation because of entity state
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidStateTransition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = WorkflowError::UnknownProcessType(ProcessType::new("MARINE_CLAIM"));
        assert_eq!(err.to_string(), "unknown process type: MARINE_CLAIM");

        let err = WorkflowError::TaskNotFound {
            instance_id: WorkflowInstanceId::new("wf-1"),
            task_id: TaskId::new("t-9"),
        };
        assert_eq!(err.to_string(), "task t-9 not found in workflow wf-1");

        let err = WorkflowError::NoEscalationTarget {
            task_id: TaskId::new("t-1"),
            assignee: None,
        };
        assert_eq!(
            err.to_string(),
            "no escalation target for task t-1 (assignee: unassigned)"
        );
    }

    #[test]
    fn test_classification() {
        assert!(WorkflowError::WorkflowNotFound(WorkflowInstanceId::new("x")).is_not_found());
        assert!(WorkflowError::invalid_state("task t-1", "already completed").is_invalid_state());
        assert!(!WorkflowError::Config("bad".into()).is_not_found());
    }
}
