//! Representation of a computational task (cloudlet) and its status.

use std::fmt::{Display, Formatter};

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::core::utilization::UtilizationModel;

/// Status of a task.
///
/// The progression is monotonic: `Created -> Queued -> InExec -> {Success |
/// Failed | Canceled}`, with the `InExec -> Paused -> InExec` round trip
/// allowed for preemption. Every task ends in exactly one terminal status.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TaskStatus {
    Created,
    Queued,
    InExec,
    Paused,
    Success,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed | TaskStatus::Canceled)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            TaskStatus::Created => write!(f, "created"),
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::InExec => write!(f, "in_exec"),
            TaskStatus::Paused => write!(f, "paused"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Canceled => write!(f, "canceled"),
        }
    }
}

fn is_valid_transition(from: &TaskStatus, to: &TaskStatus) -> bool {
    use TaskStatus::*;
    matches!(
        (from, to),
        (Created, Queued)
            | (Queued, InExec)
            | (Queued, Failed)
            | (Queued, Canceled)
            | (InExec, Paused)
            | (InExec, Success)
            | (InExec, Failed)
            | (InExec, Canceled)
            | (Paused, InExec)
            | (Paused, Failed)
            | (Paused, Canceled)
    )
}

/// A unit of computational work with a fixed instruction length,
/// executed on the virtual CPUs of a single VM.
#[derive(Clone)]
pub struct Task {
    pub id: u32,
    pub owner_id: u32,
    pub vm_id: u32,
    /// Total work in instructions.
    pub length: f64,
    /// Number of processing units the task asks for.
    pub units: u32,
    pub input_size: u64,
    pub output_size: u64,
    pub utilization_model: Box<dyn UtilizationModel>,
    status: TaskStatus,
    pub submission_time: f64,
    pub start_time: f64,
    pub finish_time: f64,
    /// Instructions executed so far.
    pub accumulated: f64,
}

impl Serialize for Task {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Task", 3)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("vm_id", &self.vm_id)?;
        state.serialize_field("length", &self.length)?;
        state.end()
    }
}

impl Task {
    pub fn new(
        id: u32,
        owner_id: u32,
        vm_id: u32,
        length: f64,
        units: u32,
        input_size: u64,
        output_size: u64,
        utilization_model: Box<dyn UtilizationModel>,
    ) -> Self {
        assert!(length > 0., "task length must be positive");
        Self {
            id,
            owner_id,
            vm_id,
            length,
            units,
            input_size,
            output_size,
            utilization_model,
            status: TaskStatus::Created,
            submission_time: -1.,
            start_time: -1.,
            finish_time: -1.,
            accumulated: 0.,
        }
    }

    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    /// Moves the task to a new status.
    ///
    /// Panics on a transition violating the monotonic status progression,
    /// which would be an internal consistency error of the engine.
    pub fn set_status(&mut self, status: TaskStatus) {
        assert!(
            is_valid_transition(&self.status, &status),
            "invalid task status transition: {} -> {}",
            self.status,
            status
        );
        self.status = status;
    }

    /// Instructions left to execute.
    pub fn remaining(&self) -> f64 {
        (self.length - self.accumulated).max(0.)
    }

    /// Whether the accumulated work covers the task length
    /// (up to a relative tolerance absorbing floating-point drift).
    pub fn is_complete(&self) -> bool {
        self.remaining() <= 1e-9 * self.length
    }

    /// CPU time consumed by the task, defined as the span between its
    /// execution start and finish.
    pub fn cpu_time(&self) -> f64 {
        if self.start_time < 0. || self.finish_time < 0. {
            return 0.;
        }
        self.finish_time - self.start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utilization::FullUtilization;

    fn task() -> Task {
        Task::new(0, 0, 0, 100., 1, 0, 0, Box::new(FullUtilization))
    }

    #[test]
    fn status_progression_is_monotonic() {
        let mut t = task();
        t.set_status(TaskStatus::Queued);
        t.set_status(TaskStatus::InExec);
        t.set_status(TaskStatus::Paused);
        t.set_status(TaskStatus::InExec);
        t.set_status(TaskStatus::Success);
        assert!(t.status().is_terminal());
    }

    #[test]
    #[should_panic(expected = "invalid task status transition")]
    fn cannot_leave_terminal_status() {
        let mut t = task();
        t.set_status(TaskStatus::Queued);
        t.set_status(TaskStatus::Canceled);
        t.set_status(TaskStatus::InExec);
    }

    #[test]
    #[should_panic(expected = "invalid task status transition")]
    fn cannot_skip_queued() {
        let mut t = task();
        t.set_status(TaskStatus::InExec);
    }
}
