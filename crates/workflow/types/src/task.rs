//! Tasks: units of human work created by HUMAN_TASK and PARALLEL steps
//!
//! A task belongs to exactly one workflow instance and references a step of
//! that instance's definition. COMPLETED and CANCELLED are final: a closed
//! task never transitions again.

use crate::{ContextUpdates, RoleId, Step, StepId, TaskId, UserId, WorkflowError, WorkflowResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A unit of human-assigned work
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// The step this task was created for
    pub step_id: StepId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Unset until assigned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserId>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// `created_at` plus the step timeout; informational only
    pub due_at: DateTime<Utc>,
    pub priority: TaskPriority,
    pub required_roles: Vec<RoleId>,
    /// Starts at 0 and increments per escalation
    pub escalation_level: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
}

impl Task {
    /// Create a pending task for `step`
    pub fn for_step(
        step: &Step,
        required_roles: Vec<RoleId>,
        assignee: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        // Far-future due times saturate at the latest representable instant
        let due_at = step
            .timeout()
            .and_then(|t| created_at.checked_add_signed(t))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id: TaskId::generate(),
            step_id: step.id.clone(),
            name: step.name.clone(),
            description: step.description.clone(),
            assignee,
            status: TaskStatus::Pending,
            created_at,
            due_at,
            priority: step.priority,
            required_roles,
            escalation_level: 0,
            completed_by: None,
            completed_at: None,
            escalated_at: None,
            result: None,
        }
    }

    /// Not yet COMPLETED or CANCELLED
    pub fn is_open(&self) -> bool {
        !self.status.is_closed()
    }

    /// Open and past its due time
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.due_at < now
    }

    /// Reject `action` on a COMPLETED or CANCELLED task
    pub fn ensure_open(&self, action: &str) -> WorkflowResult<()> {
        if !self.is_open() {
            return Err(self.transition_error(action));
        }
        Ok(())
    }

    pub fn is_assigned_to(&self, user: &UserId) -> bool {
        self.assignee.as_ref() == Some(user)
    }

    /// Claim the task: PENDING/ESCALATED → IN_PROGRESS
    pub fn start(&mut self, user: &UserId) -> WorkflowResult<()> {
        if !matches!(self.status, TaskStatus::Pending | TaskStatus::Escalated) {
            return Err(self.transition_error("start"));
        }
        if self.assignee.is_none() {
            self.assignee = Some(user.clone());
        }
        self.status = TaskStatus::InProgress;
        Ok(())
    }

    /// Close the task as COMPLETED with the given result
    pub fn complete(
        &mut self,
        user: &UserId,
        result: TaskResult,
        at: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        self.ensure_open("complete")?;
        self.status = TaskStatus::Completed;
        self.completed_by = Some(user.clone());
        self.completed_at = Some(at);
        self.result = Some(result);
        Ok(())
    }

    /// Close the task as CANCELLED
    pub fn cancel(&mut self, at: DateTime<Utc>) -> WorkflowResult<()> {
        self.ensure_open("cancel")?;
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(at);
        Ok(())
    }

    /// Hand the task to `target`; status is unchanged.
    ///
    /// Returns the previous assignee.
    pub fn escalate(&mut self, target: UserId, at: DateTime<Utc>) -> WorkflowResult<Option<UserId>> {
        self.ensure_open("escalate")?;
        let previous = self.assignee.replace(target);
        self.escalation_level += 1;
        self.escalated_at = Some(at);
        Ok(previous)
    }

    /// Overwrite the assignee. Returns the previous assignee.
    pub fn reassign(&mut self, assignee: UserId) -> WorkflowResult<Option<UserId>> {
        self.ensure_open("reassign")?;
        Ok(self.assignee.replace(assignee))
    }

    /// Time from creation to completion, for completed tasks
    pub fn completion_duration(&self) -> Option<Duration> {
        match (self.status, self.completed_at) {
            (TaskStatus::Completed, Some(done)) => Some(done - self.created_at),
            _ => None,
        }
    }

    fn transition_error(&self, action: &str) -> WorkflowError {
        WorkflowError::invalid_state(
            format!("task {}", self.id),
            format!("cannot {} a task in status {}", action, self.status),
        )
    }
}

/// Payload submitted when a task is completed
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Merged into the instance context
    #[serde(default)]
    pub data: ContextUpdates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TaskResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<crate::ContextValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Lifecycle status of a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Escalated,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
        Self::Escalated,
    ];

    /// COMPLETED and CANCELLED are final
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Escalated => "ESCALATED",
        };
        write!(f, "{}", s)
    }
}

/// Task priority
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_task(at: DateTime<Utc>) -> Task {
        let step = Step::human_task("review", "Underwriting Review", "underwriter")
            .with_timeout(7200)
            .with_priority(TaskPriority::High);
        Task::for_step(&step, step.required_roles.clone(), None, at)
    }

    #[test]
    fn test_due_time_saturates() {
        let now = Utc::now();
        for secs in [10_000_000_000_000, u64::MAX] {
            let step = Step::human_task("review", "Review", "underwriter").with_timeout(secs);
            let task = Task::for_step(&step, step.required_roles.clone(), None, now);
            assert_eq!(task.due_at, DateTime::<Utc>::MAX_UTC);
            assert!(!task.is_overdue(now));
        }
    }

    #[test]
    fn test_new_task_defaults() {
        let now = Utc::now();
        let task = make_task(now);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.due_at - task.created_at, Duration::seconds(7200));
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.escalation_level, 0);
        assert!(task.assignee.is_none());
        assert!(task.is_open());
    }

    #[test]
    fn test_complete_is_final() {
        let now = Utc::now();
        let mut task = make_task(now);
        let user = UserId::new("uw-1");

        task.complete(&user, TaskResult::new().with("approved", true), now)
            .unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.completed_by, Some(user.clone()));
        assert_eq!(task.completion_duration(), Some(Duration::zero()));

        let again = task.complete(&user, TaskResult::new(), now);
        assert!(matches!(again, Err(WorkflowError::InvalidStateTransition { .. })));
        assert!(task.cancel(now).is_err());
        assert!(task.reassign(UserId::new("other")).is_err());
    }

    #[test]
    fn test_escalate_keeps_status() {
        let now = Utc::now();
        let mut task = make_task(now);
        task.assignee = Some(UserId::new("uw-1"));

        let previous = task.escalate(UserId::new("uw-lead"), now).unwrap();
        assert_eq!(previous, Some(UserId::new("uw-1")));
        assert_eq!(task.assignee, Some(UserId::new("uw-lead")));
        assert_eq!(task.escalation_level, 1);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.escalated_at, Some(now));
    }

    #[test]
    fn test_start_claims_unassigned_task() {
        let now = Utc::now();
        let mut task = make_task(now);
        task.start(&UserId::new("uw-2")).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.is_assigned_to(&UserId::new("uw-2")));
        assert!(task.start(&UserId::new("uw-2")).is_err());
    }

    #[test]
    fn test_overdue() {
        let now = Utc::now();
        let task = make_task(now);
        assert!(!task.is_overdue(now));
        assert!(task.is_overdue(now + Duration::hours(3)));
    }

    #[test]
    fn test_status_display_matches_serde() {
        for status in TaskStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
        }
    }
}
