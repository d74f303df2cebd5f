//! Step execution and advancement
//!
//! The state machine runs the current step of an instance and keeps
//! chaining through steps that finish on their own (AUTOMATED, DECISION,
//! PARALLEL without roles) until it reaches a step that waits for people
//! or runs off the end of the definition.
//!
//! It only ever touches the working copy handed to it. Committing that
//! copy is the engine's job, so any error here leaves the stored instance
//! untouched.

use crate::assignment::TaskAssigner;
use crate::handlers::StepHandlers;
use chrono::{DateTime, Utc};
use insureflow_types::{
    ContextValue, EventType, RoleId, Step, StepId, StepKind, Task, TaskId, UserId,
    WorkflowError, WorkflowInstance, WorkflowResult,
};

/// Context key a DECISION step's outcome is stored under
pub fn decision_outcome_key(step_id: &StepId) -> String {
    format!("{}.outcome", step_id)
}

/// Executes steps against one working copy at one instant
pub(crate) struct StateMachine<'a> {
    pub handlers: &'a StepHandlers,
    pub assigner: &'a dyn TaskAssigner,
    pub system_actor: &'a UserId,
    pub now: DateTime<Utc>,
}

impl<'a> StateMachine<'a> {
    /// Execute the current step and every step that follows without waiting
    pub fn run(&self, instance: &mut WorkflowInstance) -> WorkflowResult<()> {
        loop {
            let step = instance.current_step_definition()?.clone();
            if self.execute_step(instance, &step)? {
                return Ok(());
            }
            if !self.advance(instance)? {
                return Ok(());
            }
        }
    }

    /// Called after a task closes: advance if its step has nothing left open
    pub fn on_task_resolved(
        &self,
        instance: &mut WorkflowInstance,
        step_id: &StepId,
    ) -> WorkflowResult<()> {
        if &instance.current_step != step_id || instance.step_has_open_tasks(step_id) {
            return Ok(());
        }

        tracing::debug!(
            instance_id = %instance.id,
            step_id = %step_id,
            "Step resolved, advancing"
        );
        if self.advance(instance)? {
            self.run(instance)?;
        }
        Ok(())
    }

    /// Move past the current step. Returns `false` when the instance
    /// completed instead.
    fn advance(&self, instance: &mut WorkflowInstance) -> WorkflowResult<bool> {
        let next = instance
            .definition
            .next_step(&instance.current_step)
            .map(|s| s.id.clone());

        match next {
            Some(next) => {
                instance.current_step = next;
                Ok(true)
            }
            None => {
                instance.mark_completed(self.now)?;
                instance.record_event(
                    EventType::WorkflowCompleted,
                    self.system_actor,
                    "Workflow completed",
                    self.now,
                );
                tracing::info!(
                    instance_id = %instance.id,
                    process_type = %instance.process_type,
                    "Workflow instance completed"
                );
                Ok(false)
            }
        }
    }

    /// Execute one step. Returns `true` when the step waits for tasks.
    fn execute_step(&self, instance: &mut WorkflowInstance, step: &Step) -> WorkflowResult<bool> {
        instance
            .record_event(
                EventType::StepStarted,
                self.system_actor,
                format!("Step '{}' started", step.name),
                self.now,
            )
            .add_data("step_id", step.id.as_str())
            .add_data("kind", step.kind.as_str());

        tracing::debug!(
            instance_id = %instance.id,
            step_id = %step.id,
            kind = ?step.kind,
            "Executing step"
        );

        match step.kind {
            StepKind::Automated => {
                self.execute_automated(instance, step)?;
                Ok(false)
            }
            StepKind::Decision => {
                self.execute_decision(instance, step)?;
                Ok(false)
            }
            StepKind::HumanTask => {
                let assignee = if step.auto_assign {
                    self.pick_assignee(instance, step, step.required_roles.first())
                } else {
                    None
                };
                self.create_task(instance, step, step.required_roles.clone(), assignee);
                Ok(true)
            }
            StepKind::Parallel => {
                for role in &step.required_roles {
                    let assignee = self.pick_assignee(instance, step, Some(role));
                    self.create_task(instance, step, vec![role.clone()], assignee);
                }
                Ok(!step.required_roles.is_empty())
            }
        }
    }

    fn execute_automated(&self, instance: &mut WorkflowInstance, step: &Step) -> WorkflowResult<()> {
        let Some(handler) = self.handlers.handler(&instance.process_type, &step.id) else {
            tracing::debug!(
                instance_id = %instance.id,
                step_id = %step.id,
                "No handler registered, step is a no-op"
            );
            return Ok(());
        };

        let updates = handler.execute(&step.id, &instance.context)?;
        instance.context.merge(updates);
        Ok(())
    }

    fn execute_decision(&self, instance: &mut WorkflowInstance, step: &Step) -> WorkflowResult<()> {
        let rule = self
            .handlers
            .rule(&instance.process_type, &step.id)
            .ok_or_else(|| WorkflowError::MissingDecisionRule(step.id.clone()))?;

        let outcome = rule.evaluate(&instance.context)?;
        instance
            .context
            .insert(decision_outcome_key(&step.id), outcome.clone());

        tracing::debug!(
            instance_id = %instance.id,
            step_id = %step.id,
            outcome = %outcome,
            "Decision made"
        );
        instance
            .record_event(
                EventType::DecisionMade,
                self.system_actor,
                format!("Decision '{}' evaluated to {}", step.name, outcome),
                self.now,
            )
            .add_data("step_id", step.id.as_str())
            .add_data("outcome", outcome);
        Ok(())
    }

    fn pick_assignee(
        &self,
        instance: &WorkflowInstance,
        step: &Step,
        role: Option<&RoleId>,
    ) -> Option<UserId> {
        let assignee = role.and_then(|r| self.assigner.assign(r));
        if assignee.is_none() {
            tracing::warn!(
                instance_id = %instance.id,
                step_id = %step.id,
                role = role.map(|r| r.as_str()).unwrap_or("<none>"),
                "No assignee available, task left unassigned"
            );
        }
        assignee
    }

    fn create_task(
        &self,
        instance: &mut WorkflowInstance,
        step: &Step,
        roles: Vec<RoleId>,
        assignee: Option<UserId>,
    ) -> TaskId {
        let task = Task::for_step(step, roles, assignee, self.now);
        let task_id = task.id.clone();

        let event = instance.record_event(
            EventType::TaskCreated,
            self.system_actor,
            format!("Task '{}' created", task.name),
            self.now,
        );
        event
            .add_data("task_id", task.id.as_str())
            .add_data("step_id", step.id.as_str())
            .add_data("due_at", task.due_at.to_rfc3339());
        if let Some(assignee) = &task.assignee {
            event.add_data("assignee", assignee.as_str());
        }
        if !task.required_roles.is_empty() {
            event.add_data(
                "roles",
                ContextValue::List(
                    task.required_roles
                        .iter()
                        .map(|r| ContextValue::from(r.as_str()))
                        .collect(),
                ),
            );
        }

        tracing::debug!(
            instance_id = %instance.id,
            task_id = %task.id,
            step_id = %step.id,
            assignee = ?task.assignee,
            "Task created"
        );
        instance.tasks.push(task);
        task_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::FnAssigner;
    use crate::handlers::{FnDecisionRule, FnStepHandler};
    use insureflow_types::{
        ContextUpdates, ProcessDefinition, TaskStatus, WorkflowContext, WorkflowStatus,
    };
    use std::sync::Arc;

    fn make_instance(definition: ProcessDefinition) -> WorkflowInstance {
        WorkflowInstance::new(
            Arc::new(definition),
            UserId::new("agent-1"),
            WorkflowContext::new().with("sum_insured", 500_000i64),
            Utc::now(),
        )
        .unwrap()
    }

    fn make_handlers() -> StepHandlers {
        let mut handlers = StepHandlers::new();
        handlers.register_handler(
            "validate",
            Arc::new(FnStepHandler::new(|_: &StepId, _: &WorkflowContext| {
                let mut updates = ContextUpdates::new();
                updates.insert("validated".into(), true.into());
                Ok(updates)
            })),
        );
        handlers.register_rule(
            "risk",
            Arc::new(FnDecisionRule::new(|ctx: &WorkflowContext| {
                let outcome = if ctx.get_i64("sum_insured").unwrap_or(0) > 250_000 {
                    "MEDICAL_REQUIRED"
                } else {
                    "STANDARD"
                };
                Ok(outcome.into())
            })),
        );
        handlers
    }

    #[test]
    fn test_run_chains_until_human_task() {
        let mut inst = make_instance(
            ProcessDefinition::new("POLICY_APPLICATION", "Policy Application")
                .with_step(Step::automated("validate", "Validate"))
                .with_step(Step::decision("risk", "Risk Triage"))
                .with_step(Step::human_task("underwriting", "Underwriting", "underwriter").with_auto_assign(true))
                .with_step(Step::automated("issue", "Issue")),
        );
        let handlers = make_handlers();
        let assigner = FnAssigner::new(|_: &RoleId| Some(UserId::new("uw-1")));
        let system = UserId::new("SYSTEM");
        let sm = StateMachine {
            handlers: &handlers,
            assigner: &assigner,
            system_actor: &system,
            now: Utc::now(),
        };

        sm.run(&mut inst).unwrap();

        assert_eq!(inst.current_step, StepId::new("underwriting"));
        assert_eq!(inst.context.get_bool("validated"), Some(true));
        assert_eq!(inst.context.get_str("risk.outcome"), Some("MEDICAL_REQUIRED"));
        assert_eq!(inst.tasks.len(), 1);
        assert_eq!(inst.tasks[0].assignee, Some(UserId::new("uw-1")));
        assert_eq!(inst.events_of(EventType::StepStarted).count(), 3);
        assert_eq!(inst.events_of(EventType::DecisionMade).count(), 1);
        assert_eq!(inst.status, WorkflowStatus::Running);
    }

    #[test]
    fn test_missing_rule_fails() {
        let mut inst = make_instance(
            ProcessDefinition::new("SERVICE_REQUEST", "Service Request")
                .with_step(Step::decision("route", "Route")),
        );
        let handlers = StepHandlers::new();
        let assigner = crate::assignment::NoAssigner;
        let system = UserId::new("SYSTEM");
        let sm = StateMachine {
            handlers: &handlers,
            assigner: &assigner,
            system_actor: &system,
            now: Utc::now(),
        };

        let err = sm.run(&mut inst).unwrap_err();
        assert_eq!(err, WorkflowError::MissingDecisionRule(StepId::new("route")));
    }

    #[test]
    fn test_resolving_last_parallel_task_advances() {
        let mut inst = make_instance(
            ProcessDefinition::new("CLAIM_PROCESSING", "Claim Processing")
                .with_step(Step::parallel("sign_off", "Sign-off", ["adjuster", "supervisor"]))
                .with_step(Step::automated("pay", "Pay")),
        );
        let handlers = StepHandlers::new();
        let assigner = FnAssigner::new(|role: &RoleId| Some(UserId::new(format!("{}-1", role))));
        let system = UserId::new("SYSTEM");
        let sm = StateMachine {
            handlers: &handlers,
            assigner: &assigner,
            system_actor: &system,
            now: Utc::now(),
        };
        sm.run(&mut inst).unwrap();
        assert_eq!(inst.tasks.len(), 2);

        let step = StepId::new("sign_off");
        inst.tasks[0].status = TaskStatus::Completed;
        sm.on_task_resolved(&mut inst, &step).unwrap();
        assert_eq!(inst.current_step, step);

        inst.tasks[1].status = TaskStatus::Completed;
        sm.on_task_resolved(&mut inst, &step).unwrap();
        assert_eq!(inst.status, WorkflowStatus::Completed);
        assert_eq!(inst.events_of(EventType::WorkflowCompleted).count(), 1);
    }

    #[test]
    fn test_empty_parallel_completes_immediately() {
        let mut inst = make_instance(
            ProcessDefinition::new("CLAIM_PROCESSING", "Claim Processing")
                .with_step(Step::parallel("reviews", "Reviews", Vec::<RoleId>::new())),
        );
        let handlers = StepHandlers::new();
        let assigner = crate::assignment::NoAssigner;
        let system = UserId::new("SYSTEM");
        let sm = StateMachine {
            handlers: &handlers,
            assigner: &assigner,
            system_actor: &system,
            now: Utc::now(),
        };
        sm.run(&mut inst).unwrap();
        assert!(inst.tasks.is_empty());
        assert_eq!(inst.status, WorkflowStatus::Completed);
    }
}
