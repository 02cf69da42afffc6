//! Common types shared by the cloud model components.

use std::fmt::{Display, Formatter};

use serde::Serialize;

/// Resources reserved on a host for a single VM.
#[derive(Serialize, Clone, Debug)]
pub struct Allocation {
    pub vm_id: u32,
    pub units: u32,
    pub ram: u64,
    pub bw: u64,
}

/// Outcome of a host capacity check for a VM allocation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum AllocationVerdict {
    Success,
    NotEnoughUnits,
    NotEnoughRam,
    NotEnoughBandwidth,
    HostNotFound,
}

/// Reason for a failed VM placement, reported to the requester.
///
/// Placement failures are recoverable by the caller (retry or scenario
/// redesign); the core never retries automatically.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum AllocationFailure {
    InsufficientCapacity,
}

impl Display for AllocationFailure {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            AllocationFailure::InsufficientCapacity => write!(f, "insufficient capacity"),
        }
    }
}

/// Reason for a task ending in `Failed` status.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum FailReason {
    /// The VM (or its host) was removed while the task was still assigned to it.
    HostRevoked,
    /// The target VM was never placed or is already gone.
    VmUnavailable,
}

/// Terminal simulation errors surfaced to the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum SimulationError {
    /// The event queue is empty but some tasks never reached a terminal status.
    SchedulingDeadlock { unresolved_tasks: Vec<u32> },
}

impl Display for SimulationError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            SimulationError::SchedulingDeadlock { unresolved_tasks } => {
                write!(f, "scheduling deadlock, unresolved tasks: {:?}", unresolved_tasks)
            }
        }
    }
}

impl std::error::Error for SimulationError {}
