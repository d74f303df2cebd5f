//! Workflow engine: the main entry point for running business processes
//!
//! The engine:
//! 1. Starts instances from catalog definitions
//! 2. Executes steps and creates tasks
//! 3. Advances instances as tasks complete
//! 4. Handles escalation, reassignment, suspension and cancellation
//! 5. Forwards every history event to the audit sink
//!
//! Every mutating call takes the instance's lock, loads a working copy
//! from the store, applies all side effects to the copy and commits it
//! with a single `put`. A call that fails leaves the stored instance
//! exactly as it was. Calls on different instances never contend.

use crate::assignment::TaskAssigner;
use crate::audit::{AuditRecord, AuditSink};
use crate::catalog::ProcessCatalog;
use crate::clock::Clock;
use crate::escalation::{self, EscalationPolicy, OverdueTask};
use crate::handlers::StepHandlers;
use crate::metrics::WorkflowMetrics;
use crate::state_machine::StateMachine;
use crate::store::WorkflowInstanceStore;
use crate::WorkflowEngineBuilder;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use insureflow_types::*;
use parking_lot::Mutex;
use std::sync::Arc;

/// An open task together with the instance it belongs to
#[derive(Clone, Debug, PartialEq)]
pub struct AssignedTask {
    pub instance_id: WorkflowInstanceId,
    pub process_type: ProcessType,
    pub task: Task,
}

/// The workflow engine
///
/// Cheap to share: wrap it in an `Arc` and call it from any thread.
pub struct WorkflowEngine {
    pub(crate) catalog: Arc<ProcessCatalog>,
    pub(crate) store: Arc<dyn WorkflowInstanceStore>,
    pub(crate) handlers: StepHandlers,
    pub(crate) assigner: Arc<dyn TaskAssigner>,
    pub(crate) escalation: Arc<dyn EscalationPolicy>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) system_actor: UserId,
    /// Per-instance write locks
    pub(crate) locks: DashMap<WorkflowInstanceId, Arc<Mutex<()>>>,
}

impl WorkflowEngine {
    /// Start configuring an engine
    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::new()
    }

    pub fn catalog(&self) -> &ProcessCatalog {
        &self.catalog
    }

    /// User id recorded on automated events
    pub fn system_actor(&self) -> &UserId {
        &self.system_actor
    }

    // ── Instance Lifecycle ───────────────────────────────────────────

    /// Start a new instance of `process_type`.
    ///
    /// Executes the initial step and chains through every step that does
    /// not wait for people. Returns the committed instance.
    pub fn start_process(
        &self,
        process_type: &ProcessType,
        initiator: UserId,
        context: WorkflowContext,
    ) -> WorkflowResult<WorkflowInstance> {
        let definition = self.catalog.lookup(process_type)?;
        let now = self.clock.now();

        let mut instance = WorkflowInstance::new(definition, initiator, context, now)?;
        let initiator = instance.initiator.clone();
        instance
            .record_event(
                EventType::WorkflowStarted,
                &initiator,
                format!("Workflow '{}' started", instance.definition.name),
                now,
            )
            .add_data("process_type", process_type.as_str());

        let lock = self.lock_for(&instance.id);
        let guard = lock.lock();

        self.state_machine(now).run(&mut instance)?;
        self.store.put(&instance)?;
        drop(guard);

        tracing::info!(
            instance_id = %instance.id,
            process_type = %process_type,
            initiator = %initiator,
            current_step = %instance.current_step,
            "Workflow instance started"
        );
        self.forward_events(&instance, 0);
        Ok(instance)
    }

    /// Complete a task and advance the instance if it was the last open
    /// task of the current step.
    pub fn complete_task(
        &self,
        instance_id: &WorkflowInstanceId,
        task_id: &TaskId,
        user: &UserId,
        result: TaskResult,
    ) -> WorkflowResult<WorkflowInstance> {
        self.mutate(instance_id, |instance, now| {
            instance.task(task_id)?;
            instance.ensure_running("complete a task in")?;

            let task = instance.task_mut(task_id)?;
            task.complete(user, result.clone(), now)?;
            let step_id = task.step_id.clone();
            let name = task.name.clone();

            instance.context.merge(result.data.clone());
            let event = instance.record_event(
                EventType::TaskCompleted,
                user,
                format!("Task '{}' completed by {}", name, user),
                now,
            );
            event
                .add_data("task_id", task_id.as_str())
                .add_data("step_id", step_id.as_str());
            if let Some(comment) = &result.comment {
                event.add_data("comment", comment.as_str());
            }

            tracing::debug!(
                instance_id = %instance.id,
                task_id = %task_id,
                user = %user,
                "Task completed"
            );
            self.state_machine(now).on_task_resolved(instance, &step_id)
        })
    }

    /// Claim a task: PENDING or ESCALATED → IN_PROGRESS
    pub fn start_task(
        &self,
        instance_id: &WorkflowInstanceId,
        task_id: &TaskId,
        user: &UserId,
    ) -> WorkflowResult<WorkflowInstance> {
        self.mutate(instance_id, |instance, now| {
            instance.task(task_id)?;
            instance.ensure_running("start a task in")?;

            let task = instance.task_mut(task_id)?;
            task.start(user)?;
            let name = task.name.clone();

            instance
                .record_event(
                    EventType::TaskStarted,
                    user,
                    format!("Task '{}' started by {}", name, user),
                    now,
                )
                .add_data("task_id", task_id.as_str());
            Ok(())
        })
    }

    /// Hand a task to the escalation target of its current assignee.
    ///
    /// Increments the escalation level; never changes the task status.
    pub fn escalate_task(
        &self,
        instance_id: &WorkflowInstanceId,
        task_id: &TaskId,
        reason: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        self.mutate(instance_id, |instance, now| {
            let task = instance.task(task_id)?;
            instance.ensure_not_terminal("escalate a task in")?;
            task.ensure_open("escalate")?;

            let current = task.assignee.clone();
            let target = current
                .as_ref()
                .and_then(|a| self.escalation.escalation_target(a))
                .ok_or_else(|| WorkflowError::NoEscalationTarget {
                    task_id: task_id.clone(),
                    assignee: current.clone(),
                })?;

            let task = instance.task_mut(task_id)?;
            let previous = task.escalate(target.clone(), now)?;
            let level = task.escalation_level;
            let name = task.name.clone();

            let event = instance.record_event(
                EventType::TaskEscalated,
                &self.system_actor,
                format!("Task '{}' escalated to {}: {}", name, target, reason),
                now,
            );
            event
                .add_data("task_id", task_id.as_str())
                .add_data("to", target.as_str())
                .add_data("reason", reason)
                .add_data("escalation_level", i64::from(level));
            if let Some(previous) = &previous {
                event.add_data("from", previous.as_str());
            }

            tracing::info!(
                instance_id = %instance.id,
                task_id = %task_id,
                from = ?previous,
                to = %target,
                level,
                "Task escalated"
            );
            Ok(())
        })
    }

    /// Overwrite a task's assignee.
    ///
    /// No ownership check is made: any caller may move any open task.
    pub fn reassign_task(
        &self,
        instance_id: &WorkflowInstanceId,
        task_id: &TaskId,
        new_assignee: UserId,
        reassigned_by: &UserId,
    ) -> WorkflowResult<WorkflowInstance> {
        self.mutate(instance_id, |instance, now| {
            instance.task(task_id)?;
            instance.ensure_not_terminal("reassign a task in")?;

            let task = instance.task_mut(task_id)?;
            let previous = task.reassign(new_assignee.clone())?;
            let name = task.name.clone();

            let event = instance.record_event(
                EventType::TaskReassigned,
                reassigned_by,
                format!("Task '{}' reassigned to {}", name, new_assignee),
                now,
            );
            event
                .add_data("task_id", task_id.as_str())
                .add_data("to", new_assignee.as_str());
            if let Some(previous) = &previous {
                event.add_data("from", previous.as_str());
            }
            Ok(())
        })
    }

    /// Cancel the instance and every task still open.
    ///
    /// COMPLETED tasks are left untouched.
    pub fn cancel_workflow(
        &self,
        instance_id: &WorkflowInstanceId,
        user: &UserId,
        reason: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        self.mutate(instance_id, |instance, now| {
            instance.mark_cancelled(now)?;

            let mut cancelled = 0i64;
            for task in instance.tasks.iter_mut().filter(|t| t.is_open()) {
                task.cancel(now)?;
                cancelled += 1;
            }

            instance
                .record_event(
                    EventType::WorkflowCancelled,
                    user,
                    format!("Workflow cancelled: {}", reason),
                    now,
                )
                .add_data("reason", reason)
                .add_data("cancelled_tasks", cancelled);

            tracing::info!(
                instance_id = %instance.id,
                user = %user,
                cancelled_tasks = cancelled,
                "Workflow instance cancelled"
            );
            Ok(())
        })
    }

    /// RUNNING → SUSPENDED; tasks cannot be started or completed until resumed
    pub fn suspend_workflow(
        &self,
        instance_id: &WorkflowInstanceId,
        user: &UserId,
        reason: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        self.mutate(instance_id, |instance, now| {
            instance.suspend()?;
            instance
                .record_event(
                    EventType::WorkflowSuspended,
                    user,
                    format!("Workflow suspended: {}", reason),
                    now,
                )
                .add_data("reason", reason);
            tracing::info!(instance_id = %instance.id, user = %user, "Workflow instance suspended");
            Ok(())
        })
    }

    /// SUSPENDED → RUNNING
    pub fn resume_workflow(
        &self,
        instance_id: &WorkflowInstanceId,
        user: &UserId,
    ) -> WorkflowResult<WorkflowInstance> {
        self.mutate(instance_id, |instance, now| {
            instance.resume()?;
            instance.record_event(EventType::WorkflowResumed, user, "Workflow resumed", now);
            tracing::info!(instance_id = %instance.id, user = %user, "Workflow instance resumed");
            Ok(())
        })
    }

    /// Append a comment; allowed in every status
    pub fn add_comment(
        &self,
        instance_id: &WorkflowInstanceId,
        user: &UserId,
        text: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        self.mutate(instance_id, |instance, now| {
            instance
                .record_event(EventType::CommentAdded, user, text, now)
                .add_data("text", text);
            Ok(())
        })
    }

    /// Remove an instance from the store, whatever its status.
    ///
    /// Returns `false` when the instance was not stored.
    pub fn delete_instance(&self, instance_id: &WorkflowInstanceId) -> WorkflowResult<bool> {
        let lock = self.lock_for(instance_id);
        let guard = lock.lock();
        let deleted = self.store.delete(instance_id)?;
        drop(guard);
        drop(lock);
        self.release_lock(instance_id);

        if deleted {
            tracing::info!(instance_id = %instance_id, "Workflow instance deleted");
        }
        Ok(deleted)
    }

    // ── Query ────────────────────────────────────────────────────────

    pub fn get_instance(&self, instance_id: &WorkflowInstanceId) -> WorkflowResult<WorkflowInstance> {
        self.store
            .get(instance_id)?
            .ok_or_else(|| WorkflowError::WorkflowNotFound(instance_id.clone()))
    }

    /// All instances, oldest first
    pub fn list_instances(&self) -> WorkflowResult<Vec<WorkflowInstance>> {
        let mut instances = self.store.list()?;
        instances.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(instances)
    }

    /// Open tasks assigned to `user` across all instances, by due time
    pub fn tasks_for_user(&self, user: &UserId) -> WorkflowResult<Vec<AssignedTask>> {
        let mut tasks: Vec<AssignedTask> = self
            .store
            .list()?
            .into_iter()
            .flat_map(|instance| {
                let instance_id = instance.id;
                let process_type = instance.process_type;
                instance
                    .tasks
                    .into_iter()
                    .filter(|t| t.is_open() && t.is_assigned_to(user))
                    .map(move |task| AssignedTask {
                        instance_id: instance_id.clone(),
                        process_type: process_type.clone(),
                        task,
                    })
            })
            .collect();
        tasks.sort_by(|a, b| a.task.due_at.cmp(&b.task.due_at));
        Ok(tasks)
    }

    /// Open tasks past their due time as of `at`, most overdue first.
    ///
    /// Nothing in the engine acts on these; a scheduler decides whether to
    /// call [`WorkflowEngine::escalate_task`].
    pub fn overdue_tasks(&self, at: DateTime<Utc>) -> WorkflowResult<Vec<OverdueTask>> {
        let mut overdue: Vec<OverdueTask> = self
            .store
            .list()?
            .iter()
            .flat_map(|instance| escalation::find_overdue(instance, at))
            .collect();
        overdue.sort_by(|a, b| a.due_at.cmp(&b.due_at));
        Ok(overdue)
    }

    // ── Metrics ──────────────────────────────────────────────────────

    /// Aggregate metrics as of the engine clock's "now"
    pub fn compute_metrics(&self) -> WorkflowResult<WorkflowMetrics> {
        self.compute_metrics_at(self.clock.now())
    }

    /// Aggregate metrics with overdue checks evaluated at `now`
    pub fn compute_metrics_at(&self, now: DateTime<Utc>) -> WorkflowResult<WorkflowMetrics> {
        let instances = self.store.list()?;
        Ok(WorkflowMetrics::compute(&instances, now))
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn state_machine(&self, now: DateTime<Utc>) -> StateMachine<'_> {
        StateMachine {
            handlers: &self.handlers,
            assigner: self.assigner.as_ref(),
            system_actor: &self.system_actor,
            now,
        }
    }

    fn lock_for(&self, instance_id: &WorkflowInstanceId) -> Arc<Mutex<()>> {
        self.locks
            .entry(instance_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Drop the lock entry unless another call still holds it
    fn release_lock(&self, instance_id: &WorkflowInstanceId) {
        self.locks
            .remove_if(instance_id, |_, l| Arc::strong_count(l) == 1);
    }

    /// Serialized load → mutate → commit → forward on one instance
    fn mutate<F>(&self, instance_id: &WorkflowInstanceId, op: F) -> WorkflowResult<WorkflowInstance>
    where
        F: FnOnce(&mut WorkflowInstance, DateTime<Utc>) -> WorkflowResult<()>,
    {
        let lock = self.lock_for(instance_id);
        let guard = lock.lock();

        let Some(mut instance) = self.store.get(instance_id)? else {
            drop(guard);
            drop(lock);
            // Don't let lookups of unknown ids grow the lock table
            self.release_lock(instance_id);
            return Err(WorkflowError::WorkflowNotFound(instance_id.clone()));
        };

        let before = instance.history.len();
        op(&mut instance, self.clock.now())?;
        self.store.put(&instance)?;

        // Sinks may call back into the engine for this instance
        drop(guard);
        self.forward_events(&instance, before);
        Ok(instance)
    }

    /// Send history entries from `from` onwards to the audit sink
    fn forward_events(&self, instance: &WorkflowInstance, from: usize) {
        for event in &instance.history[from..] {
            let record = AuditRecord {
                instance_id: instance.id.clone(),
                process_type: instance.process_type.clone(),
                event: event.clone(),
            };
            if let Err(e) = self.audit.record(&record) {
                tracing::warn!(
                    instance_id = %instance.id,
                    sequence = event.sequence,
                    error = %e,
                    "Audit sink rejected event"
                );
            }
        }
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("process_types", &self.catalog.process_types())
            .field("handlers", &self.handlers)
            .field("system_actor", &self.system_actor)
            .finish()
    }
}
