//! Workflow instances: running executions of process definitions
//!
//! A WorkflowInstance tracks which step is current, the tasks created so
//! far, the accumulated context, and the ordered history of everything
//! that happened to it. Status transitions live here; deciding *when* to
//! transition is the engine's job.

use crate::{
    Event, EventType, ProcessDefinition, ProcessType, Step, StepId, Task, TaskId, UserId,
    WorkflowContext, WorkflowError, WorkflowInstanceId, WorkflowResult,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── Workflow Instance ────────────────────────────────────────────────

/// One execution of a process definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Globally unique instance identifier
    pub id: WorkflowInstanceId,
    pub process_type: ProcessType,
    /// Shared with every other instance of the same type
    pub definition: Arc<ProcessDefinition>,
    pub status: WorkflowStatus,
    /// Who started the process
    pub initiator: UserId,
    pub context: WorkflowContext,
    /// Always a step of `definition`
    pub current_step: StepId,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Every task ever created, in creation order
    pub tasks: Vec<Task>,
    /// Append-only audit trail
    pub history: Vec<Event>,
}

impl WorkflowInstance {
    /// Create a RUNNING instance positioned on the definition's initial step
    pub fn new(
        definition: Arc<ProcessDefinition>,
        initiator: UserId,
        context: WorkflowContext,
        started_at: DateTime<Utc>,
    ) -> WorkflowResult<Self> {
        let initial = definition
            .initial_step()
            .ok_or_else(|| WorkflowError::InvalidDefinition {
                process_type: definition.process_type.clone(),
                reason: "process must have at least one step".into(),
            })?
            .id
            .clone();

        Ok(Self {
            id: WorkflowInstanceId::generate(),
            process_type: definition.process_type.clone(),
            definition,
            status: WorkflowStatus::Running,
            initiator,
            context,
            current_step: initial,
            started_at,
            ended_at: None,
            tasks: Vec::new(),
            history: Vec::new(),
        })
    }

    // ── History ──────────────────────────────────────────────────────

    /// Append an event and return it for attaching payload data
    pub fn record_event(
        &mut self,
        event_type: EventType,
        user_id: &UserId,
        description: impl Into<String>,
        at: DateTime<Utc>,
    ) -> &mut Event {
        let event = Event::new(
            self.history.len() as u64,
            event_type,
            user_id.clone(),
            description,
            at,
        );
        self.history.push(event);
        let last = self.history.len() - 1;
        &mut self.history[last]
    }

    /// Events of one type, in order
    pub fn events_of(&self, event_type: EventType) -> impl Iterator<Item = &Event> {
        self.history.iter().filter(move |e| e.event_type == event_type)
    }

    // ── Status guards and transitions ────────────────────────────────

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_running(&self) -> bool {
        self.status == WorkflowStatus::Running
    }

    /// Reject `action` on a terminal instance
    pub fn ensure_not_terminal(&self, action: &str) -> WorkflowResult<()> {
        if self.is_terminal() {
            return Err(self.transition_error(action));
        }
        Ok(())
    }

    /// Reject `action` unless the instance is RUNNING
    pub fn ensure_running(&self, action: &str) -> WorkflowResult<()> {
        if !self.is_running() {
            return Err(self.transition_error(action));
        }
        Ok(())
    }

    /// RUNNING → COMPLETED
    pub fn mark_completed(&mut self, at: DateTime<Utc>) -> WorkflowResult<()> {
        self.ensure_running("complete")?;
        self.status = WorkflowStatus::Completed;
        self.ended_at = Some(at);
        Ok(())
    }

    /// RUNNING/SUSPENDED → CANCELLED
    pub fn mark_cancelled(&mut self, at: DateTime<Utc>) -> WorkflowResult<()> {
        self.ensure_not_terminal("cancel")?;
        self.status = WorkflowStatus::Cancelled;
        self.ended_at = Some(at);
        Ok(())
    }

    /// RUNNING → SUSPENDED
    pub fn suspend(&mut self) -> WorkflowResult<()> {
        self.ensure_running("suspend")?;
        self.status = WorkflowStatus::Suspended;
        Ok(())
    }

    /// SUSPENDED → RUNNING
    pub fn resume(&mut self) -> WorkflowResult<()> {
        if self.status != WorkflowStatus::Suspended {
            return Err(self.transition_error("resume"));
        }
        self.status = WorkflowStatus::Running;
        Ok(())
    }

    // ── Tasks ────────────────────────────────────────────────────────

    pub fn task(&self, task_id: &TaskId) -> WorkflowResult<&Task> {
        self.tasks
            .iter()
            .find(|t| &t.id == task_id)
            .ok_or_else(|| self.task_not_found(task_id))
    }

    pub fn task_mut(&mut self, task_id: &TaskId) -> WorkflowResult<&mut Task> {
        match self.tasks.iter().position(|t| &t.id == task_id) {
            Some(index) => Ok(&mut self.tasks[index]),
            None => Err(self.task_not_found(task_id)),
        }
    }

    /// Tasks not yet COMPLETED or CANCELLED
    pub fn open_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.is_open())
    }

    /// Tasks belonging to `step_id`
    pub fn tasks_for_step<'a>(&'a self, step_id: &'a StepId) -> impl Iterator<Item = &'a Task> {
        self.tasks.iter().filter(move |t| &t.step_id == step_id)
    }

    /// Whether `step_id` still has open tasks
    pub fn step_has_open_tasks(&self, step_id: &StepId) -> bool {
        self.tasks_for_step(step_id).any(Task::is_open)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Definition entry for the current step
    pub fn current_step_definition(&self) -> WorkflowResult<&Step> {
        self.definition.require_step(&self.current_step)
    }

    /// End minus start, for COMPLETED instances
    pub fn completion_duration(&self) -> Option<Duration> {
        match (self.status, self.ended_at) {
            (WorkflowStatus::Completed, Some(end)) => Some(end - self.started_at),
            _ => None,
        }
    }

    fn transition_error(&self, action: &str) -> WorkflowError {
        WorkflowError::invalid_state(
            format!("workflow {}", self.id),
            format!("cannot {} a workflow in status {}", action, self.status),
        )
    }

    fn task_not_found(&self, task_id: &TaskId) -> WorkflowError {
        WorkflowError::TaskNotFound {
            instance_id: self.id.clone(),
            task_id: task_id.clone(),
        }
    }
}

// ── Workflow Status ──────────────────────────────────────────────────

/// Lifecycle status of a workflow instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// Executing steps or waiting on tasks
    #[default]
    Running,
    /// Paused by an operator; tasks cannot progress
    Suspended,
    Completed,
    Cancelled,
    /// Reserved; no engine path produces it
    Error,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 5] = [
        Self::Running,
        Self::Suspended,
        Self::Completed,
        Self::Cancelled,
        Self::Error,
    ];

    /// COMPLETED, CANCELLED and ERROR are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Suspended => "SUSPENDED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Step, TaskStatus};

    fn make_definition() -> Arc<ProcessDefinition> {
        Arc::new(
            ProcessDefinition::new("POLICY_APPLICATION", "Policy Application")
                .with_step(Step::human_task("underwriting", "Underwriting", "underwriter"))
                .with_step(Step::automated("issue", "Issue Policy")),
        )
    }

    fn make_instance() -> WorkflowInstance {
        WorkflowInstance::new(
            make_definition(),
            UserId::new("agent-7"),
            WorkflowContext::new().with("applicant", "J. Doe"),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_instance() {
        let inst = make_instance();
        assert_eq!(inst.status, WorkflowStatus::Running);
        assert_eq!(inst.current_step, StepId::new("underwriting"));
        assert_eq!(inst.process_type, ProcessType::new("POLICY_APPLICATION"));
        assert!(inst.ended_at.is_none());
        assert!(inst.history.is_empty());
    }

    #[test]
    fn test_new_instance_requires_steps() {
        let empty = Arc::new(ProcessDefinition::new("EMPTY", "Empty"));
        let result = WorkflowInstance::new(empty, UserId::new("u"), WorkflowContext::new(), Utc::now());
        assert!(matches!(result, Err(WorkflowError::InvalidDefinition { .. })));
    }

    #[test]
    fn test_record_event_sequences() {
        let mut inst = make_instance();
        let actor = UserId::new("SYSTEM");
        inst.record_event(EventType::WorkflowStarted, &actor, "started", Utc::now());
        inst.record_event(EventType::StepStarted, &actor, "step", Utc::now())
            .add_data("step_id", "underwriting");

        assert_eq!(inst.history.len(), 2);
        assert_eq!(inst.history[1].sequence, 1);
        assert_eq!(
            inst.history[1].data.get("step_id").and_then(|v| v.as_str()),
            Some("underwriting")
        );
        assert_eq!(inst.events_of(EventType::StepStarted).count(), 1);
    }

    #[test]
    fn test_terminal_rejects_transitions() {
        let mut inst = make_instance();
        let now = Utc::now();
        inst.mark_cancelled(now).unwrap();
        assert!(inst.is_terminal());
        assert_eq!(inst.ended_at, Some(now));
        assert!(inst.mark_completed(now).is_err());
        assert!(inst.mark_cancelled(now).is_err());
        assert!(inst.suspend().is_err());
        assert!(inst.ensure_not_terminal("complete a task in").is_err());
    }

    #[test]
    fn test_suspend_resume() {
        let mut inst = make_instance();
        inst.suspend().unwrap();
        assert_eq!(inst.status, WorkflowStatus::Suspended);
        assert!(inst.ensure_running("start a task in").is_err());
        assert!(inst.ensure_not_terminal("cancel").is_ok());
        inst.resume().unwrap();
        assert!(inst.is_running());
        assert!(inst.resume().is_err());
    }

    #[test]
    fn test_task_lookup() {
        let mut inst = make_instance();
        let step = inst.current_step_definition().unwrap().clone();
        let task = Task::for_step(&step, step.required_roles.clone(), None, Utc::now());
        let task_id = task.id.clone();
        inst.tasks.push(task);

        assert!(inst.step_has_open_tasks(&StepId::new("underwriting")));
        inst.task_mut(&task_id).unwrap().cancel(Utc::now()).unwrap();
        assert_eq!(inst.task(&task_id).unwrap().status, TaskStatus::Cancelled);
        assert!(!inst.step_has_open_tasks(&StepId::new("underwriting")));

        let missing = inst.task(&TaskId::new("nope"));
        assert!(matches!(missing, Err(WorkflowError::TaskNotFound { .. })));
    }

    #[test]
    fn test_completion_duration() {
        let mut inst = make_instance();
        assert!(inst.completion_duration().is_none());
        let end = inst.started_at + Duration::minutes(90);
        inst.mark_completed(end).unwrap();
        assert_eq!(inst.completion_duration(), Some(Duration::minutes(90)));
    }
}
