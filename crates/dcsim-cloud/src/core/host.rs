//! Host runtime executing VMs and their tasks.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use dcsim_core::cast;
use dcsim_core::context::SimulationContext;
use dcsim_core::event::{Event, EventId};
use dcsim_core::handler::EventHandler;
use dcsim_core::{log_debug, log_trace, log_warn};

use crate::core::common::FailReason;
use crate::core::config::SimulationConfig;
use crate::core::events::allocation::{VmCreated, VmDeleted, VmDestroyRequest, VmStartRequest};
use crate::core::events::task::{
    TaskCanceled, TaskCompletionEstimate, TaskFailed, TaskFinished, TaskPauseRequest, TaskResumeRequest, TaskSubmit,
};
use crate::core::record::TaskRecord;
use crate::core::resource::ResourceUnit;
use crate::core::task::{Task, TaskStatus};
use crate::core::vm::VirtualMachine;

/// Runs the VMs placed on a single host and drives their task schedulers.
///
/// The runtime keeps at most one pending completion estimate per VM. Every
/// change of a VM's running set cancels the stale estimate and emits a fresh
/// one at the recomputed earliest completion instant, so the simulation never
/// wakes up at times where nothing happens.
pub struct HostRuntime {
    pub id: u32,

    units: Vec<ResourceUnit>,
    vms: IndexMap<u32, VirtualMachine>,
    estimates: HashMap<u32, EventId>,
    datacenter_id: u32,

    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl HostRuntime {
    pub fn new(
        units: Vec<ResourceUnit>,
        datacenter_id: u32,
        ctx: SimulationContext,
        sim_config: Rc<SimulationConfig>,
    ) -> Self {
        Self {
            id: ctx.id(),
            units,
            vms: IndexMap::new(),
            estimates: HashMap::new(),
            datacenter_id,
            ctx,
            sim_config,
        }
    }

    /// Number of processing units of the host.
    pub fn unit_count(&self) -> u32 {
        self.units.len() as u32
    }

    /// Summary processing rate over all units of the host.
    pub fn aggregate_rate(&self) -> f64 {
        self.units.iter().map(|unit| unit.rate).sum()
    }

    /// Number of VMs currently hosted.
    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }

    /// Number of non-terminal tasks across all hosted VMs.
    pub fn active_task_count(&self) -> usize {
        self.vms.values().map(|vm| vm.scheduler().task_count()).sum()
    }

    fn refresh_estimate(&mut self, vm_id: u32) {
        if let Some(event_id) = self.estimates.remove(&vm_id) {
            self.ctx.cancel_event(event_id);
        }
        let now = self.ctx.time();
        if let Some((finish, task_id)) = self.vms[&vm_id].scheduler().next_completion() {
            log_trace!(
                self.ctx,
                "vm #{} next completion is task #{} at {:.3}",
                vm_id,
                task_id,
                finish
            );
            let event_id = self.ctx.emit_self(TaskCompletionEstimate { vm_id }, finish - now);
            self.estimates.insert(vm_id, event_id);
        }
    }

    fn on_vm_start(&mut self, mut vm: VirtualMachine) {
        vm.set_placed(self.id);
        vm.set_active();
        log_debug!(self.ctx, "vm #{} started on host #{}", vm.id, self.id);
        self.ctx.emit(
            VmCreated {
                vm_id: vm.id,
                host_id: self.id,
            },
            vm.owner_id,
            self.sim_config.message_delay,
        );
        self.vms.insert(vm.id, vm);
    }

    fn on_task_submit(&mut self, mut task: Task) {
        let now = self.ctx.time();
        let vm_id = task.vm_id;
        match self.vms.get_mut(&vm_id) {
            Some(vm) => {
                log_debug!(self.ctx, "task #{} submitted to vm #{} on host #{}", task.id, vm_id, self.id);
                vm.scheduler_mut().admit(task, now);
                self.refresh_estimate(vm_id);
            }
            None => {
                // the VM was destroyed while the task was in flight
                log_warn!(self.ctx, "task #{} submitted to missing vm #{} on host #{}", task.id, vm_id, self.id);
                task.set_status(TaskStatus::Failed);
                task.finish_time = now;
                self.ctx.emit(
                    TaskFailed {
                        record: TaskRecord::failed(&task, Some(self.id), FailReason::VmUnavailable),
                    },
                    task.owner_id,
                    self.sim_config.message_delay,
                );
            }
        }
    }

    fn on_completion_estimate(&mut self, vm_id: u32) {
        // this estimate has fired, forget it before emitting the next one
        self.estimates.remove(&vm_id);
        let now = self.ctx.time();
        let done = self.vms.get_mut(&vm_id).unwrap().scheduler_mut().take_completed(now);
        for task in done {
            log_debug!(self.ctx, "task #{} finished on vm #{}", task.id, vm_id);
            self.ctx.emit(
                TaskFinished {
                    record: TaskRecord::new(&task, Some(self.id)),
                },
                task.owner_id,
                self.sim_config.message_delay,
            );
        }
        self.refresh_estimate(vm_id);
    }

    fn on_task_pause(&mut self, vm_id: u32, task_id: u32) {
        let now = self.ctx.time();
        let paused = match self.vms.get_mut(&vm_id) {
            Some(vm) => vm.scheduler_mut().pause(task_id, now),
            None => false,
        };
        if paused {
            log_debug!(self.ctx, "task #{} paused on vm #{}", task_id, vm_id);
            self.refresh_estimate(vm_id);
        }
    }

    fn on_task_resume(&mut self, vm_id: u32, task_id: u32) {
        let now = self.ctx.time();
        let resumed = match self.vms.get_mut(&vm_id) {
            Some(vm) => vm.scheduler_mut().resume(task_id, now),
            None => false,
        };
        if resumed {
            log_debug!(self.ctx, "task #{} resumed on vm #{}", task_id, vm_id);
            self.refresh_estimate(vm_id);
        }
    }

    fn on_vm_destroy(&mut self, vm_id: u32) {
        let now = self.ctx.time();
        let mut vm = match self.vms.shift_remove(&vm_id) {
            Some(vm) => vm,
            None => {
                log_trace!(self.ctx, "vm #{} is not on host #{}, nothing to destroy", vm_id, self.id);
                return;
            }
        };
        if let Some(event_id) = self.estimates.remove(&vm_id) {
            self.ctx.cancel_event(event_id);
        }
        let failed = vm.scheduler_mut().fail_all(now);
        for task in failed {
            log_debug!(self.ctx, "task #{} failed, vm #{} revoked", task.id, vm_id);
            self.ctx.emit(
                TaskFailed {
                    record: TaskRecord::failed(&task, Some(self.id), FailReason::HostRevoked),
                },
                task.owner_id,
                self.sim_config.message_delay,
            );
        }
        vm.set_destroyed();
        log_debug!(self.ctx, "vm #{} destroyed on host #{}", vm_id, self.id);
        self.ctx
            .emit(VmDeleted { vm_id }, self.datacenter_id, self.sim_config.message_delay);
    }

    /// Cancels all tasks still waiting for capacity on the hosted VMs and
    /// reports them to their owners. Running tasks are left to finish.
    pub fn cancel_queued_tasks(&mut self) {
        let now = self.ctx.time();
        let host_id = self.id;
        let mut canceled = Vec::new();
        for vm in self.vms.values_mut() {
            canceled.extend(vm.scheduler_mut().cancel_queued(now));
        }
        for task in canceled {
            log_debug!(self.ctx, "task #{} canceled on host #{}", task.id, host_id);
            self.ctx.emit(
                TaskCanceled {
                    record: TaskRecord::new(&task, Some(host_id)),
                },
                task.owner_id,
                self.sim_config.message_delay,
            );
        }
    }
}

impl EventHandler for HostRuntime {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            VmStartRequest { vm } => {
                self.on_vm_start(vm);
            }
            TaskSubmit { task } => {
                self.on_task_submit(task);
            }
            TaskCompletionEstimate { vm_id } => {
                self.on_completion_estimate(vm_id);
            }
            TaskPauseRequest { vm_id, task_id } => {
                self.on_task_pause(vm_id, task_id);
            }
            TaskResumeRequest { vm_id, task_id } => {
                self.on_task_resume(vm_id, task_id);
            }
            VmDestroyRequest { vm_id } => {
                self.on_vm_destroy(vm_id);
            }
        })
    }
}
