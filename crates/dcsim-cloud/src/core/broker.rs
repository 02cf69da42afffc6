//! Broker component owning VMs and tasks on behalf of the user.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use dcsim_core::cast;
use dcsim_core::context::SimulationContext;
use dcsim_core::event::Event;
use dcsim_core::handler::EventHandler;
use dcsim_core::{log_debug, log_warn};

use crate::core::common::FailReason;
use crate::core::config::SimulationConfig;
use crate::core::events::allocation::{VmCreateRequest, VmCreated, VmCreationFailed, VmDeleted, VmDestroyRequest};
use crate::core::events::task::{TaskCanceled, TaskFailed, TaskFinished, TaskSubmit};
use crate::core::record::TaskRecord;
use crate::core::task::{Task, TaskStatus};
use crate::core::vm::VirtualMachine;

#[derive(Clone, Debug, PartialEq)]
enum BrokerVmStatus {
    Requested,
    Active,
    Failed,
    Destroyed,
}

/// Submits VMs and tasks to the datacenter and collects task outcomes.
///
/// Tasks submitted before their target VM is up are buffered and flushed on
/// the VM creation acknowledgement, so the user does not have to order
/// submissions manually. The broker also tracks which submitted tasks have
/// not reached a terminal status yet; a non-empty set after the event queue
/// runs dry means the scenario deadlocked.
pub struct Broker {
    pub id: u32,

    datacenter_id: u32,
    vm_status: HashMap<u32, BrokerVmStatus>,
    pending_tasks: HashMap<u32, Vec<Task>>,
    unresolved_tasks: BTreeSet<u32>,
    records: Vec<TaskRecord>,

    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl Broker {
    pub fn new(datacenter_id: u32, ctx: SimulationContext, sim_config: Rc<SimulationConfig>) -> Self {
        Self {
            id: ctx.id(),
            datacenter_id,
            vm_status: HashMap::new(),
            pending_tasks: HashMap::new(),
            unresolved_tasks: BTreeSet::new(),
            records: Vec::new(),
            ctx,
            sim_config,
        }
    }

    /// Requests placement of a VM.
    pub fn submit_vm(&mut self, vm: VirtualMachine) {
        assert!(
            !self.vm_status.contains_key(&vm.id),
            "vm #{} is already submitted",
            vm.id
        );
        self.vm_status.insert(vm.id, BrokerVmStatus::Requested);
        self.ctx
            .emit(VmCreateRequest { vm }, self.datacenter_id, self.sim_config.message_delay);
    }

    /// Submits a task for execution on its target VM. The task is held back
    /// until the VM creation is acknowledged; tasks bound to a VM that was
    /// never placed stay queued and are reported as unresolved.
    pub fn submit_task(&mut self, mut task: Task) {
        task.submission_time = self.ctx.time();
        task.set_status(TaskStatus::Queued);
        self.unresolved_tasks.insert(task.id);
        match self.vm_status.get(&task.vm_id).cloned() {
            Some(BrokerVmStatus::Active) => {
                self.ctx
                    .emit(TaskSubmit { task }, self.datacenter_id, self.sim_config.message_delay);
            }
            Some(BrokerVmStatus::Destroyed) => {
                log_warn!(self.ctx, "task #{} targets destroyed vm #{}", task.id, task.vm_id);
                self.fail_task(task);
            }
            _ => {
                self.pending_tasks.entry(task.vm_id).or_default().push(task);
            }
        }
    }

    /// Requests destruction of a VM.
    pub fn destroy_vm(&mut self, vm_id: u32) {
        self.ctx
            .emit(VmDestroyRequest { vm_id }, self.datacenter_id, self.sim_config.message_delay);
    }

    /// Requests destruction of every VM that is still up or being placed,
    /// in ascending id order.
    pub fn destroy_all_vms(&mut self) {
        let mut vm_ids: Vec<u32> = self
            .vm_status
            .iter()
            .filter(|(_, status)| matches!(status, BrokerVmStatus::Requested | BrokerVmStatus::Active))
            .map(|(vm_id, _)| *vm_id)
            .collect();
        vm_ids.sort_unstable();
        for vm_id in vm_ids {
            self.destroy_vm(vm_id);
        }
    }

    /// Cancels all tasks still buffered in the broker and reports their
    /// outcomes, in ascending target VM id order.
    pub fn cancel_pending_tasks(&mut self) {
        let now = self.ctx.time();
        let mut vm_ids: Vec<u32> = self.pending_tasks.keys().copied().collect();
        vm_ids.sort_unstable();
        for vm_id in vm_ids {
            for mut task in self.pending_tasks.remove(&vm_id).unwrap_or_default() {
                log_debug!(self.ctx, "task #{} canceled before reaching vm #{}", task.id, vm_id);
                task.set_status(TaskStatus::Canceled);
                task.finish_time = now;
                let record = TaskRecord::new(&task, None);
                self.unresolved_tasks.remove(&record.task_id);
                self.records.push(record);
            }
        }
    }

    /// Task ids submitted but not yet finished, failed or canceled.
    pub fn unresolved_tasks(&self) -> Vec<u32> {
        self.unresolved_tasks.iter().copied().collect()
    }

    /// Outcomes of all terminated tasks so far.
    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    fn fail_task(&mut self, mut task: Task) {
        task.set_status(TaskStatus::Failed);
        task.finish_time = self.ctx.time();
        let record = TaskRecord::failed(&task, None, FailReason::VmUnavailable);
        self.unresolved_tasks.remove(&record.task_id);
        self.records.push(record);
    }

    fn on_vm_created(&mut self, vm_id: u32, host_id: u32) {
        log_debug!(self.ctx, "vm #{} is up on host #{}", vm_id, host_id);
        self.vm_status.insert(vm_id, BrokerVmStatus::Active);
        for task in self.pending_tasks.remove(&vm_id).unwrap_or_default() {
            self.ctx
                .emit(TaskSubmit { task }, self.datacenter_id, self.sim_config.message_delay);
        }
    }

    fn on_vm_creation_failed(&mut self, vm_id: u32) {
        log_warn!(self.ctx, "vm #{} was not placed", vm_id);
        self.vm_status.insert(vm_id, BrokerVmStatus::Failed);
        // tasks waiting for this VM stay queued, the run reports them
        // as unresolved when the event queue runs dry
    }

    fn on_vm_deleted(&mut self, vm_id: u32) {
        self.vm_status.insert(vm_id, BrokerVmStatus::Destroyed);
        for task in self.pending_tasks.remove(&vm_id).unwrap_or_default() {
            self.fail_task(task);
        }
    }

    fn on_task_terminated(&mut self, record: TaskRecord) {
        self.unresolved_tasks.remove(&record.task_id);
        self.records.push(record);
    }
}

impl EventHandler for Broker {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            VmCreated { vm_id, host_id } => {
                self.on_vm_created(vm_id, host_id);
            }
            VmCreationFailed { vm_id, reason } => {
                log_warn!(self.ctx, "vm #{} creation failed: {}", vm_id, reason);
                self.on_vm_creation_failed(vm_id);
            }
            VmDeleted { vm_id } => {
                self.on_vm_deleted(vm_id);
            }
            TaskFinished { record } => {
                self.on_task_terminated(record);
            }
            TaskFailed { record } => {
                self.on_task_terminated(record);
            }
            TaskCanceled { record } => {
                self.on_task_terminated(record);
            }
        })
    }
}
