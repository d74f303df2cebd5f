//! Process definitions: the immutable template of a business process
//!
//! A ProcessDefinition is an ordered sequence of steps. The first step is
//! the initial state of every instance; completing a step advances to the
//! next entry in the sequence, and completing the last step completes the
//! instance.
//!
//! Definitions are validated once at catalog registration and never
//! mutated afterwards.

use crate::{ProcessType, RoleId, StepId, TaskPriority, WorkflowError, WorkflowResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Process Definition ───────────────────────────────────────────────

/// Template of ordered steps for one business process type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    /// Type identifier; keys the catalog
    #[serde(rename = "type")]
    pub process_type: ProcessType,
    /// Display name
    pub name: String,
    /// What the process accomplishes
    #[serde(default)]
    pub description: String,
    /// Informational version number
    #[serde(default = "default_version")]
    pub version: u32,
    /// Ordered steps; the first is the initial state
    pub steps: Vec<Step>,
}

fn default_version() -> u32 {
    1
}

impl ProcessDefinition {
    pub fn new(process_type: impl Into<ProcessType>, name: impl Into<String>) -> Self {
        Self {
            process_type: process_type.into(),
            name: name.into(),
            description: String::new(),
            version: 1,
            steps: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Append a step without checking; `validate` catches duplicates
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a step, rejecting a duplicate id
    pub fn add_step(&mut self, step: Step) -> WorkflowResult<()> {
        if self.steps.iter().any(|s| s.id == step.id) {
            return Err(self.invalid(format!("duplicate step id '{}'", step.id)));
        }
        self.steps.push(step);
        Ok(())
    }

    /// The step every instance starts in
    pub fn initial_step(&self) -> Option<&Step> {
        self.steps.first()
    }

    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Step lookup that reports the owning process on failure
    pub fn require_step(&self, id: &StepId) -> WorkflowResult<&Step> {
        self.step(id).ok_or_else(|| WorkflowError::StepNotFound {
            process_type: self.process_type.clone(),
            step_id: id.clone(),
        })
    }

    /// The step following `id` in the sequence, `None` after the last one
    pub fn next_step(&self, id: &StepId) -> Option<&Step> {
        let index = self.steps.iter().position(|s| &s.id == id)?;
        self.steps.get(index + 1)
    }

    pub fn is_last_step(&self, id: &StepId) -> bool {
        self.steps.last().map(|s| &s.id == id).unwrap_or(false)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Validate the definition for structural correctness
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.process_type.as_str().trim().is_empty() {
            return Err(self.invalid("process type must not be blank"));
        }

        if self.steps.is_empty() {
            return Err(self.invalid("process must have at least one step"));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.as_str().trim().is_empty() {
                return Err(self.invalid("step ids must not be blank"));
            }
            if !seen.insert(&step.id) {
                return Err(self.invalid(format!("duplicate step id '{}'", step.id)));
            }
            if !step.kind.takes_roles() && !step.required_roles.is_empty() {
                return Err(self.invalid(format!(
                    "{} step '{}' must not declare required roles",
                    step.kind, step.id
                )));
            }
            if step.timeout().is_none() {
                return Err(self.invalid(format!(
                    "timeout of step '{}' is out of range: {}s",
                    step.id, step.timeout_secs
                )));
            }
        }

        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> WorkflowError {
        WorkflowError::InvalidDefinition {
            process_type: self.process_type.clone(),
            reason: reason.into(),
        }
    }
}

// ── Step ─────────────────────────────────────────────────────────────

/// One unit of work within a process definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique within the definition
    pub id: StepId,
    /// Display name, copied to the tasks this step creates
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Execution semantics
    pub kind: StepKind,
    /// Roles that must act; empty for AUTOMATED and DECISION
    #[serde(default)]
    pub required_roles: Vec<RoleId>,
    /// Due time of created tasks is `created + timeout_secs`
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// HUMAN_TASK only: pick an assignee from the first role's pool
    #[serde(default)]
    pub auto_assign: bool,
    /// Priority of the tasks this step creates
    #[serde(default)]
    pub priority: TaskPriority,
}

fn default_timeout_secs() -> u64 {
    24 * 60 * 60
}

impl Step {
    pub fn new(id: impl Into<StepId>, name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            kind,
            required_roles: Vec::new(),
            timeout_secs: default_timeout_secs(),
            auto_assign: false,
            priority: TaskPriority::default(),
        }
    }

    /// An automated step
    pub fn automated(id: impl Into<StepId>, name: impl Into<String>) -> Self {
        Self::new(id, name, StepKind::Automated)
    }

    /// A decision step
    pub fn decision(id: impl Into<StepId>, name: impl Into<String>) -> Self {
        Self::new(id, name, StepKind::Decision)
    }

    /// A human task step requiring `role`
    pub fn human_task(id: impl Into<StepId>, name: impl Into<String>, role: impl Into<RoleId>) -> Self {
        let mut step = Self::new(id, name, StepKind::HumanTask);
        step.required_roles.push(role.into());
        step
    }

    /// A parallel fan-out step with one task per role
    pub fn parallel<R: Into<RoleId>>(
        id: impl Into<StepId>,
        name: impl Into<String>,
        roles: impl IntoIterator<Item = R>,
    ) -> Self {
        let mut step = Self::new(id, name, StepKind::Parallel);
        step.required_roles = roles.into_iter().map(Into::into).collect();
        step
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<RoleId>) -> Self {
        self.required_roles.push(role.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_auto_assign(mut self, auto_assign: bool) -> Self {
        self.auto_assign = auto_assign;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Whether executing this step suspends the instance on human work
    /// Task timeout, `None` when `timeout_secs` does not fit a duration
    pub fn timeout(&self) -> Option<Duration> {
        i64::try_from(self.timeout_secs)
            .ok()
            .and_then(Duration::try_seconds)
    }

    pub fn creates_tasks(&self) -> bool {
        matches!(self.kind, StepKind::HumanTask | StepKind::Parallel)
    }
}

/// Execution semantics of a step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    /// Engine-computed; merges handler output and advances immediately
    Automated,
    /// One task; the step waits for its completion
    HumanTask,
    /// Rule-evaluated; records the outcome and advances immediately
    Decision,
    /// One auto-assigned task per required role; waits for all of them
    Parallel,
}

impl StepKind {
    pub fn takes_roles(&self) -> bool {
        matches!(self, Self::HumanTask | Self::Parallel)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automated => "AUTOMATED",
            Self::HumanTask => "HUMAN_TASK",
            Self::Decision => "DECISION",
            Self::Parallel => "PARALLEL",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
