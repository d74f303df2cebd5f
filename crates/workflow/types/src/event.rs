//! History events: the append-only audit trail of a workflow instance

use crate::{ContextValue, EventId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured payload attached to an event
pub type EventData = BTreeMap<String, ContextValue>;

/// One immutable entry in an instance's history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// Position in the owning instance's history, starting at 0
    pub sequence: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    /// Acting user; the configured system actor for automated actions
    pub user_id: UserId,
    /// Human-readable description
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: EventData,
}

impl Event {
    pub fn new(
        sequence: u64,
        event_type: EventType,
        user_id: UserId,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::generate(),
            sequence,
            event_type,
            timestamp,
            user_id,
            description: description.into(),
            data: EventData::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// In-place variant of [`Event::with_data`] for recorded events
    pub fn add_data(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> &mut Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Kind of a history event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    WorkflowStarted,
    StepStarted,
    DecisionMade,
    TaskCreated,
    TaskStarted,
    TaskCompleted,
    TaskEscalated,
    TaskReassigned,
    CommentAdded,
    WorkflowSuspended,
    WorkflowResumed,
    WorkflowCancelled,
    WorkflowCompleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowStarted => "WORKFLOW_STARTED",
            Self::StepStarted => "STEP_STARTED",
            Self::DecisionMade => "DECISION_MADE",
            Self::TaskCreated => "TASK_CREATED",
            Self::TaskStarted => "TASK_STARTED",
            Self::TaskCompleted => "TASK_COMPLETED",
            Self::TaskEscalated => "TASK_ESCALATED",
            Self::TaskReassigned => "TASK_REASSIGNED",
            Self::CommentAdded => "COMMENT_ADDED",
            Self::WorkflowSuspended => "WORKFLOW_SUSPENDED",
            Self::WorkflowResumed => "WORKFLOW_RESUMED",
            Self::WorkflowCancelled => "WORKFLOW_CANCELLED",
            Self::WorkflowCompleted => "WORKFLOW_COMPLETED",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
