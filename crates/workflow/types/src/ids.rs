//! Identifier newtypes
//!
//! Every identifier is a thin wrapper over a `String`. Runtime entities
//! (instances, tasks, events) get UUID-backed ids from `generate()`;
//! definition-level names (process types, steps, roles) and user ids are
//! supplied by the caller.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

macro_rules! generated_id {
    ($name:ident) => {
        impl $name {
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }
    };
}

string_id!(
    /// Process type identifier, e.g. `"CLAIM_PROCESSING"`; keys the catalog
    ProcessType
);
string_id!(
    /// Step identifier, unique within one process definition
    StepId
);
string_id!(
    /// Role a step requires, e.g. `"underwriter"`
    RoleId
);
string_id!(
    /// Identity of a human or system actor
    UserId
);
string_id!(
    /// Unique identifier for a workflow instance
    WorkflowInstanceId
);
string_id!(
    /// Unique identifier for a task
    TaskId
);
string_id!(
    /// Unique identifier for a history event
    EventId
);

generated_id!(WorkflowInstanceId);
generated_id!(TaskId);
generated_id!(EventId);
