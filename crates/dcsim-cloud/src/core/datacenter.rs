//! Datacenter component: VM placement and message routing.

use std::collections::HashMap;
use std::rc::Rc;

use dcsim_core::cast;
use dcsim_core::context::SimulationContext;
use dcsim_core::event::Event;
use dcsim_core::handler::EventHandler;
use dcsim_core::{log_debug, log_warn};

use crate::core::common::{AllocationFailure, FailReason};
use crate::core::config::SimulationConfig;
use crate::core::events::allocation::{VmCreateRequest, VmCreationFailed, VmDeleted, VmDestroyRequest, VmStartRequest};
use crate::core::events::task::{TaskFailed, TaskPauseRequest, TaskResumeRequest, TaskSubmit};
use crate::core::placement::AllocationPolicy;
use crate::core::record::TaskRecord;
use crate::core::resource_pool::ResourcePoolState;
use crate::core::task::{Task, TaskStatus};
use crate::core::vm::VirtualMachine;

/// Tracks the capacity of all hosts and decides where VMs are placed.
///
/// The datacenter is the single authority on allocations: it commits a VM to
/// the pool before handing it to a host and releases the capacity when the
/// host confirms destruction, so the pool never double-books.
pub struct Datacenter {
    pub id: u32,

    pool: ResourcePoolState,
    policy: Box<dyn AllocationPolicy>,
    vm_locations: HashMap<u32, u32>,
    vm_owners: HashMap<u32, u32>,

    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl Datacenter {
    pub fn new(policy: Box<dyn AllocationPolicy>, ctx: SimulationContext, sim_config: Rc<SimulationConfig>) -> Self {
        Self {
            id: ctx.id(),
            pool: ResourcePoolState::new(),
            policy,
            vm_locations: HashMap::new(),
            vm_owners: HashMap::new(),
            ctx,
            sim_config,
        }
    }

    /// Registers a host in the resource pool.
    pub fn add_host(&mut self, id: u32, units: u32, ram: u64, bw: u64) {
        self.pool.add_host(id, units, ram, bw);
    }

    /// Host the given VM is currently placed on.
    pub fn vm_location(&self, vm_id: u32) -> Option<u32> {
        self.vm_locations.get(&vm_id).copied()
    }

    pub fn pool(&self) -> &ResourcePoolState {
        &self.pool
    }

    fn on_vm_create_request(&mut self, vm: VirtualMachine) {
        let alloc = vm.allocation();
        match self.policy.select_host(&alloc, &self.pool) {
            Some(host_id) => {
                log_debug!(self.ctx, "vm #{} placed on host #{}", vm.id, host_id);
                self.pool.allocate(&alloc, host_id);
                self.vm_locations.insert(vm.id, host_id);
                self.vm_owners.insert(vm.id, vm.owner_id);
                self.ctx
                    .emit(VmStartRequest { vm }, host_id, self.sim_config.message_delay);
            }
            None => {
                log_warn!(self.ctx, "no host can accommodate vm #{}", vm.id);
                self.ctx.emit(
                    VmCreationFailed {
                        vm_id: vm.id,
                        reason: AllocationFailure::InsufficientCapacity,
                    },
                    vm.owner_id,
                    self.sim_config.message_delay,
                );
            }
        }
    }

    fn on_task_submit(&mut self, mut task: Task) {
        match self.vm_locations.get(&task.vm_id) {
            Some(host_id) => {
                self.ctx
                    .emit(TaskSubmit { task }, *host_id, self.sim_config.message_delay);
            }
            None => {
                // the target VM is gone or was never placed
                log_warn!(self.ctx, "task #{} targets unknown vm #{}", task.id, task.vm_id);
                task.set_status(TaskStatus::Failed);
                task.finish_time = self.ctx.time();
                self.ctx.emit(
                    TaskFailed {
                        record: TaskRecord::failed(&task, None, FailReason::VmUnavailable),
                    },
                    task.owner_id,
                    self.sim_config.message_delay,
                );
            }
        }
    }

    fn on_vm_destroy_request(&mut self, vm_id: u32) {
        if let Some(host_id) = self.vm_locations.get(&vm_id) {
            self.ctx
                .emit(VmDestroyRequest { vm_id }, *host_id, self.sim_config.message_delay);
        }
    }

    fn on_vm_deleted(&mut self, vm_id: u32) {
        if let Some(host_id) = self.vm_locations.remove(&vm_id) {
            self.pool.release(vm_id, host_id);
            log_debug!(self.ctx, "released capacity of vm #{} on host #{}", vm_id, host_id);
        }
        if let Some(owner_id) = self.vm_owners.remove(&vm_id) {
            self.ctx
                .emit(VmDeleted { vm_id }, owner_id, self.sim_config.message_delay);
        }
    }

    fn route_to_vm_host<T>(&mut self, vm_id: u32, data: T)
    where
        T: dcsim_core::EventData,
    {
        if let Some(host_id) = self.vm_locations.get(&vm_id) {
            self.ctx.emit(data, *host_id, self.sim_config.message_delay);
        }
    }
}

impl EventHandler for Datacenter {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            VmCreateRequest { vm } => {
                self.on_vm_create_request(vm);
            }
            TaskSubmit { task } => {
                self.on_task_submit(task);
            }
            VmDestroyRequest { vm_id } => {
                self.on_vm_destroy_request(vm_id);
            }
            VmDeleted { vm_id } => {
                self.on_vm_deleted(vm_id);
            }
            TaskPauseRequest { vm_id, task_id } => {
                self.route_to_vm_host(vm_id, TaskPauseRequest { vm_id, task_id });
            }
            TaskResumeRequest { vm_id, task_id } => {
                self.route_to_vm_host(vm_id, TaskResumeRequest { vm_id, task_id });
            }
        })
    }
}
