//! Workflow Domain Types for Insureflow
//!
//! The data model of the back-office workflow engine: process definitions
//! that describe a business process as an ordered list of steps, and the
//! runtime records (instances, tasks, history events) those definitions
//! produce.
//!
//! # Key Concepts
//!
//! - **ProcessDefinition**: An immutable template of ordered [`Step`]s,
//!   keyed by [`ProcessType`] (`POLICY_APPLICATION`, `CLAIM_PROCESSING`, ...).
//! - **Step**: AUTOMATED, HUMAN_TASK, DECISION or PARALLEL. Only HUMAN_TASK
//!   and PARALLEL steps create tasks and wait for people.
//! - **WorkflowInstance**: One execution of a definition: current step,
//!   tasks, typed context and an append-only history of [`Event`]s.
//! - **Task**: One unit of human work. COMPLETED and CANCELLED tasks never
//!   transition again.
//! - **WorkflowContext**: Typed key/value state accumulated from task
//!   results and automated step outputs.
//!
//! This crate holds entity-local state transitions only. Orchestration
//! lives in `insureflow-engine`.

#![deny(unsafe_code)]

mod context;
mod definition;
mod error;
mod event;
mod ids;
mod instance;
mod task;

pub use context::*;
pub use definition::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use instance::*;
pub use task::*;
