//! User-facing facade gluing the cloud components together.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use sugars::{rc, refcell};

use dcsim_core::context::SimulationContext;
use dcsim_core::simulation::Simulation;

use crate::core::broker::Broker;
use crate::core::common::SimulationError;
use crate::core::config::SimulationConfig;
use crate::core::datacenter::Datacenter;
use crate::core::events::task::{TaskPauseRequest, TaskResumeRequest};
use crate::core::host::HostRuntime;
use crate::core::placement::allocation_policy_resolver;
use crate::core::record::TaskRecord;
use crate::core::resource::uniform_units;
use crate::core::task::Task;
use crate::core::task_scheduler::task_scheduler_resolver;
use crate::core::utilization::{utilization_model_resolver, UtilizationModelKind};
use crate::core::vm::VirtualMachine;

/// Builds and drives a cloud simulation: hosts, a datacenter placing VMs on
/// them and a broker submitting the workload.
///
/// VM and task ids are assigned by the facade in submission order, so two
/// runs of the same scenario produce identical id assignments.
pub struct CloudSimulation {
    datacenter: Rc<RefCell<Datacenter>>,
    datacenter_id: u32,
    broker: Rc<RefCell<Broker>>,
    broker_id: u32,
    hosts: BTreeMap<u32, Rc<RefCell<HostRuntime>>>,
    vm_counter: u32,
    task_counter: u32,
    sim: Simulation,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl CloudSimulation {
    pub fn new(mut sim: Simulation, sim_config: SimulationConfig) -> Self {
        let sim_config = rc!(sim_config);
        let policy = allocation_policy_resolver(&sim_config.allocation_policy);
        let datacenter = rc!(refcell!(Datacenter::new(
            policy,
            sim.create_context("datacenter"),
            sim_config.clone(),
        )));
        let datacenter_id = sim.add_handler("datacenter", datacenter.clone());
        let broker = rc!(refcell!(Broker::new(
            datacenter_id,
            sim.create_context("broker"),
            sim_config.clone(),
        )));
        let broker_id = sim.add_handler("broker", broker.clone());
        let ctx = sim.create_context("simulation");
        let mut result = Self {
            datacenter,
            datacenter_id,
            broker,
            broker_id,
            hosts: BTreeMap::new(),
            vm_counter: 0,
            task_counter: 0,
            sim,
            ctx,
            sim_config: sim_config.clone(),
        };
        for host_config in sim_config.hosts.iter() {
            let count = host_config.count.unwrap_or(1);
            for _ in 0..count {
                let name = match &host_config.name {
                    Some(name) => name.clone(),
                    None => format!(
                        "{}{}",
                        host_config.name_prefix.as_deref().unwrap_or("host"),
                        result.hosts.len()
                    ),
                };
                result.add_host(&name, host_config.units, host_config.ram, host_config.bw);
            }
        }
        result
    }

    /// Creates a host with the given capacity and registers it in the
    /// datacenter's resource pool. Returns the host id.
    pub fn add_host(&mut self, name: &str, units: u32, ram: u64, bw: u64) -> u32 {
        let host = rc!(refcell!(HostRuntime::new(
            uniform_units(units, self.sim_config.unit_rate),
            self.datacenter_id,
            self.sim.create_context(name),
            self.sim_config.clone(),
        )));
        let id = self.sim.add_handler(name, host.clone());
        self.hosts.insert(id, host);
        self.datacenter.borrow_mut().add_host(id, units, ram, bw);
        id
    }

    /// Requests placement of a new VM with the configured task discipline.
    /// Returns the VM id.
    pub fn spawn_vm_now(&mut self, units: u32, ram: u64, bw: u64, image_size: u64) -> u32 {
        let id = self.vm_counter;
        self.vm_counter += 1;
        let scheduler = task_scheduler_resolver(&self.sim_config.task_discipline, units, self.sim_config.unit_rate);
        let vm = VirtualMachine::new(id, self.broker_id, units, ram, bw, image_size, scheduler);
        self.broker.borrow_mut().submit_vm(vm);
        id
    }

    /// Submits a task for execution on the given VM. Returns the task id.
    pub fn submit_task(
        &mut self,
        vm_id: u32,
        length: f64,
        units: u32,
        input_size: u64,
        output_size: u64,
        utilization: UtilizationModelKind,
    ) -> u32 {
        let id = self.task_counter;
        self.task_counter += 1;
        let model = utilization_model_resolver(&utilization);
        let task = Task::new(id, self.broker_id, vm_id, length, units, input_size, output_size, model);
        self.broker.borrow_mut().submit_task(task);
        id
    }

    /// Requests suspension of a running task after the given delay.
    pub fn pause_task(&mut self, vm_id: u32, task_id: u32, delay: f64) {
        self.ctx.emit(TaskPauseRequest { vm_id, task_id }, self.datacenter_id, delay);
    }

    /// Requests resumption of a paused task after the given delay.
    pub fn resume_task(&mut self, vm_id: u32, task_id: u32, delay: f64) {
        self.ctx.emit(TaskResumeRequest { vm_id, task_id }, self.datacenter_id, delay);
    }

    /// Requests destruction of a VM. Tasks still assigned to it fail.
    pub fn destroy_vm(&mut self, vm_id: u32) {
        self.broker.borrow_mut().destroy_vm(vm_id);
    }

    /// Runs the simulation until the event queue is empty and returns the
    /// outcomes of all tasks ordered by task id.
    ///
    /// Returns [`SimulationError::SchedulingDeadlock`] if some submitted
    /// tasks never reached a terminal status.
    pub fn run(&mut self) -> Result<Vec<TaskRecord>, SimulationError> {
        self.sim.step_until_no_events();
        self.finish()
    }

    /// Runs the simulation until the given time, then cancels all tasks
    /// still waiting for capacity, lets the running ones finish and
    /// releases the remaining VM allocations.
    pub fn run_until(&mut self, deadline: f64) -> Result<Vec<TaskRecord>, SimulationError> {
        self.sim.step_until_time(deadline);
        self.cancel_queued_tasks();
        self.sim.step_until_no_events();
        self.broker.borrow_mut().destroy_all_vms();
        self.sim.step_until_no_events();
        self.finish()
    }

    /// Cancels all tasks waiting for capacity, both on the hosts and still
    /// buffered in the broker. Running tasks are not interrupted.
    pub fn cancel_queued_tasks(&mut self) {
        for host in self.hosts.values() {
            host.borrow_mut().cancel_queued_tasks();
        }
        self.broker.borrow_mut().cancel_pending_tasks();
    }

    fn finish(&mut self) -> Result<Vec<TaskRecord>, SimulationError> {
        let unresolved_tasks = self.broker.borrow().unresolved_tasks();
        if !unresolved_tasks.is_empty() {
            return Err(SimulationError::SchedulingDeadlock { unresolved_tasks });
        }
        let mut records = self.broker.borrow().records().to_vec();
        records.sort_by_key(|record| record.task_id);
        Ok(records)
    }

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn steps(&mut self, step_count: u64) -> bool {
        self.sim.steps(step_count)
    }

    pub fn step_for_duration(&mut self, time: f64) {
        self.sim.step_for_duration(time);
    }

    pub fn step_until_time(&mut self, time: f64) -> bool {
        self.sim.step_until_time(time)
    }

    pub fn event_count(&self) -> u64 {
        self.sim.event_count()
    }

    pub fn current_time(&mut self) -> f64 {
        self.sim.time()
    }

    pub fn host(&self, host_id: u32) -> Rc<RefCell<HostRuntime>> {
        self.hosts.get(&host_id).unwrap().clone()
    }

    pub fn datacenter(&self) -> Rc<RefCell<Datacenter>> {
        self.datacenter.clone()
    }

    pub fn sim_config(&self) -> Rc<SimulationConfig> {
        self.sim_config.clone()
    }
}
