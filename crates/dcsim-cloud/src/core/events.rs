//! Event types exchanged by the cloud model components.

/// VM lifecycle events.
pub mod allocation {
    use serde::Serialize;

    use crate::core::common::AllocationFailure;
    use crate::core::vm::VirtualMachine;

    /// Asks the datacenter to place and start a VM.
    #[derive(Clone, Serialize)]
    pub struct VmCreateRequest {
        pub vm: VirtualMachine,
    }

    /// Hands a placed VM over to the selected host.
    #[derive(Clone, Serialize)]
    pub struct VmStartRequest {
        pub vm: VirtualMachine,
    }

    /// The VM was placed and is ready to accept tasks.
    #[derive(Clone, Serialize)]
    pub struct VmCreated {
        pub vm_id: u32,
        pub host_id: u32,
    }

    /// No host could accommodate the VM.
    #[derive(Clone, Serialize)]
    pub struct VmCreationFailed {
        pub vm_id: u32,
        pub reason: AllocationFailure,
    }

    /// Asks the datacenter to destroy a VM and release its capacity.
    #[derive(Clone, Serialize)]
    pub struct VmDestroyRequest {
        pub vm_id: u32,
    }

    /// The VM was destroyed, its capacity is free again.
    #[derive(Clone, Serialize)]
    pub struct VmDeleted {
        pub vm_id: u32,
    }
}

/// Task lifecycle events.
pub mod task {
    use serde::Serialize;

    use crate::core::record::TaskRecord;
    use crate::core::task::Task;

    /// Routes a task to the host running its target VM.
    #[derive(Clone, Serialize)]
    pub struct TaskSubmit {
        pub task: Task,
    }

    /// The task executed its full length.
    #[derive(Clone, Serialize)]
    pub struct TaskFinished {
        pub record: TaskRecord,
    }

    /// The task ended without executing its full length.
    #[derive(Clone, Serialize)]
    pub struct TaskFailed {
        pub record: TaskRecord,
    }

    /// The task was canceled before it could start executing.
    #[derive(Clone, Serialize)]
    pub struct TaskCanceled {
        pub record: TaskRecord,
    }

    /// Self-message a host uses to wake up at the projected completion
    /// instant of the earliest-finishing task on the given VM.
    ///
    /// The pending estimate is canceled and re-emitted every time the VM's
    /// running set changes, so at most one estimate per VM is in flight.
    #[derive(Clone, Serialize)]
    pub struct TaskCompletionEstimate {
        pub vm_id: u32,
    }

    /// Asks the host to suspend a running task.
    #[derive(Clone, Serialize)]
    pub struct TaskPauseRequest {
        pub vm_id: u32,
        pub task_id: u32,
    }

    /// Asks the host to resume a paused task.
    #[derive(Clone, Serialize)]
    pub struct TaskResumeRequest {
        pub vm_id: u32,
        pub task_id: u32,
    }
}
