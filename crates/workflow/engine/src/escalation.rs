//! Escalation: who takes over a stuck task, and which tasks are stuck
//!
//! The policy is a stateless lookup from the current assignee to a
//! higher-authority target. Detection of overdue tasks does NOT act on
//! them; it returns candidates for an external scheduler, which decides
//! whether to call `escalate_task`.

use chrono::{DateTime, Duration, Utc};
use insureflow_types::{
    ProcessType, StepId, TaskId, TaskPriority, UserId, WorkflowInstance, WorkflowInstanceId,
};
use std::collections::HashMap;

/// Resolves the escalation target for an assignee
pub trait EscalationPolicy: Send + Sync {
    fn escalation_target(&self, assignee: &UserId) -> Option<UserId>;
}

/// Fixed assignee → target table with an optional fallback
#[derive(Clone, Debug, Default)]
pub struct StaticEscalationPolicy {
    targets: HashMap<UserId, UserId>,
    default_target: Option<UserId>,
}

impl StaticEscalationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_targets(targets: HashMap<UserId, UserId>) -> Self {
        Self {
            targets,
            default_target: None,
        }
    }

    pub fn with_target(mut self, assignee: impl Into<UserId>, target: impl Into<UserId>) -> Self {
        self.targets.insert(assignee.into(), target.into());
        self
    }

    /// Target used for assignees without an explicit entry
    pub fn with_default(mut self, target: impl Into<UserId>) -> Self {
        self.default_target = Some(target.into());
        self
    }
}

impl EscalationPolicy for StaticEscalationPolicy {
    fn escalation_target(&self, assignee: &UserId) -> Option<UserId> {
        self.targets
            .get(assignee)
            .or(self.default_target.as_ref())
            .cloned()
    }
}

/// Delegates to a caller-supplied lookup (org chart service, test double)
pub struct FnEscalationPolicy<F>(F);

impl<F> FnEscalationPolicy<F>
where
    F: Fn(&UserId) -> Option<UserId> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EscalationPolicy for FnEscalationPolicy<F>
where
    F: Fn(&UserId) -> Option<UserId> + Send + Sync,
{
    fn escalation_target(&self, assignee: &UserId) -> Option<UserId> {
        (self.0)(assignee)
    }
}

// ── Overdue detection ────────────────────────────────────────────────

/// An open task past its due time
#[derive(Clone, Debug, PartialEq)]
pub struct OverdueTask {
    pub instance_id: WorkflowInstanceId,
    pub process_type: ProcessType,
    pub task_id: TaskId,
    pub step_id: StepId,
    pub assignee: Option<UserId>,
    pub priority: TaskPriority,
    pub due_at: DateTime<Utc>,
    pub overdue_by: Duration,
    pub escalation_level: u32,
}

/// Open tasks of a non-terminal instance whose due time is before `now`
pub fn find_overdue(instance: &WorkflowInstance, now: DateTime<Utc>) -> Vec<OverdueTask> {
    if instance.is_terminal() {
        return Vec::new();
    }

    instance
        .tasks
        .iter()
        .filter(|t| t.is_overdue(now))
        .map(|t| OverdueTask {
            instance_id: instance.id.clone(),
            process_type: instance.process_type.clone(),
            task_id: t.id.clone(),
            step_id: t.step_id.clone(),
            assignee: t.assignee.clone(),
            priority: t.priority,
            due_at: t.due_at,
            overdue_by: now - t.due_at,
            escalation_level: t.escalation_level,
        })
        .collect()
}
