//! Metrics aggregation over workflow instances and their tasks
//!
//! A pure read-side computation: it never mutates what it scans. Every
//! status and priority appears in the count maps, zero when absent, and
//! averages over an empty set are reported as `0.0`.

use chrono::{DateTime, Duration, Utc};
use insureflow_types::{ProcessType, TaskPriority, TaskStatus, WorkflowInstance, WorkflowStatus};
use serde::Serialize;
use std::collections::BTreeMap;

/// Snapshot of instance and task aggregates
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkflowMetrics {
    /// Evaluation time used for overdue checks
    pub computed_at: DateTime<Utc>,
    pub total_instances: usize,
    pub instances_by_status: BTreeMap<WorkflowStatus, usize>,
    pub instances_by_process_type: BTreeMap<ProcessType, usize>,
    /// Mean `ended_at - started_at` over COMPLETED instances, in seconds
    pub average_completion_secs: f64,
    pub tasks: TaskMetrics,
}

/// Task-level aggregates
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskMetrics {
    pub total: usize,
    pub by_status: BTreeMap<TaskStatus, usize>,
    pub by_priority: BTreeMap<TaskPriority, usize>,
    /// PENDING tasks whose due time is before `computed_at`
    pub overdue: usize,
    /// Mean `completed_at - created_at` over COMPLETED tasks, in seconds
    pub average_completion_secs: f64,
}

impl WorkflowMetrics {
    /// Aggregate `instances` as of `now`
    pub fn compute<'a>(
        instances: impl IntoIterator<Item = &'a WorkflowInstance>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut instances_by_status: BTreeMap<_, _> =
            WorkflowStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut instances_by_process_type = BTreeMap::new();
        let mut task_by_status: BTreeMap<_, _> = TaskStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut task_by_priority: BTreeMap<_, _> =
            TaskPriority::ALL.iter().map(|p| (*p, 0)).collect();

        let mut total_instances = 0;
        let mut instance_durations = Mean::default();
        let mut total_tasks = 0;
        let mut overdue = 0;
        let mut task_durations = Mean::default();

        for instance in instances {
            total_instances += 1;
            *instances_by_status.entry(instance.status).or_insert(0) += 1;
            *instances_by_process_type
                .entry(instance.process_type.clone())
                .or_insert(0) += 1;
            if let Some(d) = instance.completion_duration() {
                instance_durations.add(d);
            }

            for task in &instance.tasks {
                total_tasks += 1;
                *task_by_status.entry(task.status).or_insert(0) += 1;
                *task_by_priority.entry(task.priority).or_insert(0) += 1;
                if task.status == TaskStatus::Pending && task.due_at < now {
                    overdue += 1;
                }
                if let Some(d) = task.completion_duration() {
                    task_durations.add(d);
                }
            }
        }

        Self {
            computed_at: now,
            total_instances,
            instances_by_status,
            instances_by_process_type,
            average_completion_secs: instance_durations.secs(),
            tasks: TaskMetrics {
                total: total_tasks,
                by_status: task_by_status,
                by_priority: task_by_priority,
                overdue,
                average_completion_secs: task_durations.secs(),
            },
        }
    }

    pub fn instances_with_status(&self, status: WorkflowStatus) -> usize {
        self.instances_by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn instances_of_type(&self, process_type: &ProcessType) -> usize {
        self.instances_by_process_type
            .get(process_type)
            .copied()
            .unwrap_or(0)
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> usize {
        self.tasks.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Running mean of durations; empty mean is 0
#[derive(Default)]
struct Mean {
    total_ms: i64,
    count: u32,
}

impl Mean {
    fn add(&mut self, d: Duration) {
        self.total_ms += d.num_milliseconds();
        self.count += 1;
    }

    fn secs(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms as f64 / 1000.0 / self.count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insureflow_types::{ProcessDefinition, Step, Task, TaskResult, UserId, WorkflowContext};
    use std::sync::Arc;

    fn make_instance(start: DateTime<Utc>) -> WorkflowInstance {
        let def = Arc::new(
            ProcessDefinition::new("CLAIM_PROCESSING", "Claim Processing").with_step(
                Step::human_task("assessment", "Assessment", "adjuster").with_timeout(3600),
            ),
        );
        let mut inst =
            WorkflowInstance::new(def.clone(), UserId::new("c-1"), WorkflowContext::new(), start)
                .unwrap();
        let step = def.steps[0].clone();
        inst.tasks
            .push(Task::for_step(&step, step.required_roles.clone(), None, start));
        inst
    }

    #[test]
    fn test_empty_metrics() {
        let none: Vec<WorkflowInstance> = Vec::new();
        let metrics = WorkflowMetrics::compute(&none, Utc::now());
        assert_eq!(metrics.total_instances, 0);
        assert_eq!(metrics.average_completion_secs, 0.0);
        assert_eq!(metrics.tasks.average_completion_secs, 0.0);
        assert_eq!(metrics.tasks.overdue, 0);
        assert!(metrics.instances_by_status.values().all(|c| *c == 0));
        assert_eq!(metrics.instances_by_status.len(), WorkflowStatus::ALL.len());
        assert_eq!(metrics.tasks.by_priority.len(), TaskPriority::ALL.len());
        assert!(metrics.instances_by_process_type.is_empty());
        assert!(!metrics.average_completion_secs.is_nan());
    }

    #[test]
    fn test_counts_and_averages() {
        let start = Utc::now();
        let mut done = make_instance(start);
        let task_id = done.tasks[0].id.clone();
        done.task_mut(&task_id)
            .unwrap()
            .complete(&UserId::new("adj-1"), TaskResult::new(), start + Duration::minutes(10))
            .unwrap();
        done.mark_completed(start + Duration::minutes(20)).unwrap();

        let running = make_instance(start);

        let metrics = WorkflowMetrics::compute([&done, &running], start + Duration::hours(2));
        assert_eq!(metrics.total_instances, 2);
        assert_eq!(metrics.instances_with_status(WorkflowStatus::Completed), 1);
        assert_eq!(metrics.instances_with_status(WorkflowStatus::Running), 1);
        assert_eq!(
            metrics.instances_of_type(&ProcessType::new("CLAIM_PROCESSING")),
            2
        );
        assert_eq!(metrics.average_completion_secs, 1200.0);
        assert_eq!(metrics.tasks.total, 2);
        assert_eq!(metrics.tasks_with_status(TaskStatus::Completed), 1);
        assert_eq!(metrics.tasks.average_completion_secs, 600.0);
        // Only the running instance's pending task is past due
        assert_eq!(metrics.tasks.overdue, 1);
        assert_eq!(metrics.tasks.by_priority[&TaskPriority::Medium], 2);
    }

    #[test]
    fn test_not_overdue_before_due() {
        let start = Utc::now();
        let inst = make_instance(start);
        let metrics = WorkflowMetrics::compute([&inst], start + Duration::minutes(59));
        assert_eq!(metrics.tasks.overdue, 0);
    }
}
