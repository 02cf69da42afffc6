//! Per-task execution records collected for the final report.

use serde::Serialize;

use crate::core::common::FailReason;
use crate::core::task::{Task, TaskStatus};

/// Outcome of a single task, built when the task reaches a terminal status.
#[derive(Clone, Debug, Serialize)]
pub struct TaskRecord {
    pub task_id: u32,
    pub status: TaskStatus,
    pub vm_id: u32,
    pub host_id: Option<u32>,
    pub fail_reason: Option<FailReason>,
    /// Wall-clock span between execution start and finish. Zero for tasks
    /// that never started.
    pub cpu_time: f64,
    pub start_time: f64,
    pub finish_time: f64,
}

impl TaskRecord {
    pub fn new(task: &Task, host_id: Option<u32>) -> Self {
        assert!(task.status().is_terminal(), "record built for unfinished task {}", task.id);
        Self {
            task_id: task.id,
            status: task.status().clone(),
            vm_id: task.vm_id,
            host_id,
            fail_reason: None,
            cpu_time: task.cpu_time(),
            start_time: task.start_time,
            finish_time: task.finish_time,
        }
    }

    pub fn failed(task: &Task, host_id: Option<u32>, reason: FailReason) -> Self {
        let mut record = Self::new(task, host_id);
        record.fail_reason = Some(reason);
        record
    }
}
