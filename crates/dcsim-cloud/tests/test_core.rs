use approx::assert_abs_diff_eq;

use dcsim_core::simulation::Simulation;

use dcsim_cloud::core::common::{FailReason, SimulationError};
use dcsim_cloud::core::config::SimulationConfig;
use dcsim_cloud::core::task::TaskStatus;
use dcsim_cloud::core::utilization::UtilizationModelKind;
use dcsim_cloud::simulation::CloudSimulation;

fn config(task_discipline: &str) -> SimulationConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    SimulationConfig {
        task_discipline: task_discipline.to_string(),
        ..SimulationConfig::new()
    }
}

#[test]
// First fit places the VM on the suitable host with the lowest id.
fn test_first_fit_placement() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("TimeShared"));

    let h1 = cloud_sim.add_host("h1", 2, 4096, 1000);
    let h2 = cloud_sim.add_host("h2", 4, 4096, 1000);

    let vm_small = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    let vm_large = cloud_sim.spawn_vm_now(4, 1024, 100, 0);
    cloud_sim.run().unwrap();

    let dc = cloud_sim.datacenter();
    assert_eq!(dc.borrow().vm_location(vm_small), Some(h1));
    assert_eq!(dc.borrow().vm_location(vm_large), Some(h2));
    assert_eq!(dc.borrow().pool().get_available_units(h1), 0);
    assert_eq!(dc.borrow().pool().get_available_units(h2), 0);
    assert_eq!(cloud_sim.host(h1).borrow().unit_count(), 2);
    assert_eq!(cloud_sim.host(h1).borrow().aggregate_rate(), 2000.);
}

#[test]
// A VM that fits no host is rejected, the pool stays untouched.
fn test_placement_failure() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("TimeShared"));

    let h = cloud_sim.add_host("h", 2, 4096, 1000);

    let vm1 = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    let vm2 = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    cloud_sim.run().unwrap();

    let dc = cloud_sim.datacenter();
    assert_eq!(dc.borrow().vm_location(vm1), Some(h));
    assert_eq!(dc.borrow().vm_location(vm2), None);
    assert_eq!(dc.borrow().pool().get_available_units(h), 0);
}

#[test]
// RAM and bandwidth are checked along with the units.
fn test_placement_checks_all_dimensions() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("TimeShared"));

    cloud_sim.add_host("h", 8, 4096, 1000);

    let vm = cloud_sim.spawn_vm_now(2, 8192, 100, 0);
    cloud_sim.run().unwrap();
    assert_eq!(cloud_sim.datacenter().borrow().vm_location(vm), None);
}

#[test]
// Two identical tasks time-share the VM capacity and finish together.
// 2 units at rate 1000 give 2000 aggregate, two tasks of 60000 run at
// 1000 each and finish at 60.
fn test_time_shared_fairness() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("TimeShared"));

    cloud_sim.add_host("h", 2, 4096, 1000);
    let vm = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    cloud_sim.submit_task(vm, 60000., 2, 0, 0, UtilizationModelKind::Full);
    cloud_sim.submit_task(vm, 60000., 2, 0, 0, UtilizationModelKind::Full);

    let records = cloud_sim.run().unwrap();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.status, TaskStatus::Success);
        assert_abs_diff_eq!(record.finish_time, 60., epsilon = 1e-9);
        assert_abs_diff_eq!(record.cpu_time, 60., epsilon = 1e-9);
    }
}

#[test]
// Rates are recomputed at every completion: three tasks of lengths
// 30000, 60000 and 90000 run at 2000/3 each until the first finishes
// at 45, the survivors then split the capacity and finish at 75 and 90.
fn test_time_shared_rate_recomputation() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("TimeShared"));

    cloud_sim.add_host("h", 2, 4096, 1000);
    let vm = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    cloud_sim.submit_task(vm, 30000., 2, 0, 0, UtilizationModelKind::Full);
    cloud_sim.submit_task(vm, 60000., 2, 0, 0, UtilizationModelKind::Full);
    cloud_sim.submit_task(vm, 90000., 2, 0, 0, UtilizationModelKind::Full);

    let records = cloud_sim.run().unwrap();
    assert_eq!(records.len(), 3);
    assert_abs_diff_eq!(records[0].finish_time, 45., epsilon = 1e-9);
    assert_abs_diff_eq!(records[1].finish_time, 75., epsilon = 1e-9);
    assert_abs_diff_eq!(records[2].finish_time, 90., epsilon = 1e-9);
}

#[test]
// A task capped by its utilization model frees capacity for the others.
// The capped task runs at 0.25 * 2000 = 500 and finishes 15000 at 30;
// the full task gets 1500 until then (45000 done) and the whole
// capacity afterwards, finishing the remaining 15000 at 37.5.
fn test_utilization_cap_redistribution() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("TimeShared"));

    cloud_sim.add_host("h", 2, 4096, 1000);
    let vm = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    cloud_sim.submit_task(vm, 15000., 2, 0, 0, UtilizationModelKind::Constant(0.25));
    cloud_sim.submit_task(vm, 60000., 2, 0, 0, UtilizationModelKind::Full);

    let records = cloud_sim.run().unwrap();
    assert_abs_diff_eq!(records[0].finish_time, 30., epsilon = 1e-9);
    assert_abs_diff_eq!(records[1].finish_time, 37.5, epsilon = 1e-9);
}

#[test]
// Space sharing runs tasks on dedicated units and queues the overflow.
fn test_space_shared_queueing() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("SpaceShared"));

    cloud_sim.add_host("h", 2, 4096, 1000);
    let vm = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    cloud_sim.submit_task(vm, 20000., 2, 0, 0, UtilizationModelKind::Full);
    cloud_sim.submit_task(vm, 20000., 2, 0, 0, UtilizationModelKind::Full);

    let records = cloud_sim.run().unwrap();
    assert_abs_diff_eq!(records[0].finish_time, 10., epsilon = 1e-9);
    assert_abs_diff_eq!(records[1].finish_time, 20., epsilon = 1e-9);
    assert_abs_diff_eq!(records[1].cpu_time, 10., epsilon = 1e-9);
}

#[test]
// A task asking for more units than its VM has can never start;
// the run reports a scheduling deadlock naming it.
fn test_scheduling_deadlock() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("SpaceShared"));

    cloud_sim.add_host("h", 8, 4096, 1000);
    let vm = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    let ok_task = cloud_sim.submit_task(vm, 20000., 2, 0, 0, UtilizationModelKind::Full);
    let stuck_task = cloud_sim.submit_task(vm, 20000., 4, 0, 0, UtilizationModelKind::Full);

    let result = cloud_sim.run();
    assert_eq!(
        result.unwrap_err(),
        SimulationError::SchedulingDeadlock {
            unresolved_tasks: vec![stuck_task],
        }
    );
    assert_ne!(ok_task, stuck_task);
}

#[test]
// run_until cancels the tasks still waiting for capacity and lets the
// running ones finish.
fn test_run_until_cancels_queued_tasks() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("SpaceShared"));

    cloud_sim.add_host("h", 2, 4096, 1000);
    let vm = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    cloud_sim.submit_task(vm, 20000., 2, 0, 0, UtilizationModelKind::Full);
    cloud_sim.submit_task(vm, 200000., 2, 0, 0, UtilizationModelKind::Full);

    let records = cloud_sim.run_until(5.).unwrap();
    assert_eq!(records[0].status, TaskStatus::Success);
    assert_abs_diff_eq!(records[0].finish_time, 10., epsilon = 1e-9);
    assert_eq!(records[1].status, TaskStatus::Canceled);
    assert_abs_diff_eq!(records[1].finish_time, 5., epsilon = 1e-9);
}

#[test]
// Destroying a VM fails its remaining tasks and frees the host capacity.
// Duplicate destroy requests do not inflate the pool.
fn test_vm_destroy_fails_tasks() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("TimeShared"));

    let h = cloud_sim.add_host("h", 2, 4096, 1000);
    let vm = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    cloud_sim.submit_task(vm, 60000., 2, 0, 0, UtilizationModelKind::Full);

    cloud_sim.step_until_time(5.);
    cloud_sim.destroy_vm(vm);
    cloud_sim.destroy_vm(vm);
    let records = cloud_sim.run().unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TaskStatus::Failed);
    assert_eq!(records[0].fail_reason, Some(FailReason::HostRevoked));
    assert_abs_diff_eq!(records[0].finish_time, 5., epsilon = 1e-9);
    let dc = cloud_sim.datacenter();
    assert_eq!(dc.borrow().vm_location(vm), None);
    assert_eq!(dc.borrow().pool().get_available_units(h), 2);
    assert_eq!(dc.borrow().pool().get_available_ram(h), 4096);
}

#[test]
// Pausing a task stops its progress; after resumption the finish time
// shifts by exactly the paused span. 10000 at rate 1000 would finish at
// 10; paused during [5, 8] it finishes at 13.
fn test_pause_and_resume() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("TimeShared"));

    cloud_sim.add_host("h", 1, 4096, 1000);
    let vm = cloud_sim.spawn_vm_now(1, 1024, 100, 0);
    let task = cloud_sim.submit_task(vm, 10000., 1, 0, 0, UtilizationModelKind::Full);
    cloud_sim.pause_task(vm, task, 5.);
    cloud_sim.resume_task(vm, task, 8.);

    let records = cloud_sim.run().unwrap();
    assert_eq!(records[0].status, TaskStatus::Success);
    assert_abs_diff_eq!(records[0].finish_time, 13., epsilon = 1e-9);
}

#[test]
// A paused task that is never resumed leaves the run unresolved.
fn test_paused_task_is_reported_as_unresolved() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("TimeShared"));

    cloud_sim.add_host("h", 1, 4096, 1000);
    let vm = cloud_sim.spawn_vm_now(1, 1024, 100, 0);
    let task = cloud_sim.submit_task(vm, 10000., 1, 0, 0, UtilizationModelKind::Full);
    cloud_sim.pause_task(vm, task, 5.);

    let result = cloud_sim.run();
    assert_eq!(
        result.unwrap_err(),
        SimulationError::SchedulingDeadlock {
            unresolved_tasks: vec![task],
        }
    );
}

#[test]
// Tasks bound to a VM that was never placed stay queued forever; the run
// reports them as a scheduling deadlock instead of dropping them.
fn test_unplaced_vm_tasks_stay_unresolved() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("TimeShared"));

    cloud_sim.add_host("h", 2, 4096, 1000);
    let vm1 = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    let vm2 = cloud_sim.spawn_vm_now(8, 1024, 100, 0);
    cloud_sim.submit_task(vm1, 10000., 2, 0, 0, UtilizationModelKind::Full);
    let stuck_task = cloud_sim.submit_task(vm2, 10000., 2, 0, 0, UtilizationModelKind::Full);

    let result = cloud_sim.run();
    assert_eq!(
        result.unwrap_err(),
        SimulationError::SchedulingDeadlock {
            unresolved_tasks: vec![stuck_task],
        }
    );
}

#[test]
// Tasks submitted after the VM destruction is acknowledged fail with the
// VM reported gone.
fn test_task_for_destroyed_vm_is_failed() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("TimeShared"));

    cloud_sim.add_host("h", 2, 4096, 1000);
    let vm = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    cloud_sim.step_until_time(0.);
    cloud_sim.destroy_vm(vm);
    cloud_sim.step_until_time(0.);
    cloud_sim.submit_task(vm, 10000., 2, 0, 0, UtilizationModelKind::Full);

    let records = cloud_sim.run().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TaskStatus::Failed);
    assert_eq!(records[0].fail_reason, Some(FailReason::VmUnavailable));
    assert_eq!(records[0].host_id, None);
}

#[test]
// Destroying a VM and submitting a task to it at the same instant must not
// crash the host: the destruction wins and the task fails.
fn test_submit_racing_vm_destroy() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config("TimeShared"));

    let h = cloud_sim.add_host("h", 2, 4096, 1000);
    let vm = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    cloud_sim.step_until_time(0.);
    cloud_sim.destroy_vm(vm);
    cloud_sim.submit_task(vm, 10000., 2, 0, 0, UtilizationModelKind::Full);

    let records = cloud_sim.run().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TaskStatus::Failed);
    assert_eq!(records[0].fail_reason, Some(FailReason::VmUnavailable));
    assert_eq!(records[0].host_id, Some(h));
}

#[test]
// With a non-zero message delay a deadline inside the placement window
// cancels the tasks still buffered in the broker and releases the VM
// capacity before returning.
fn test_run_until_cancels_pending_tasks() {
    let sim = Simulation::new(123);
    let mut cfg = config("TimeShared");
    cfg.message_delay = 0.5;
    let mut cloud_sim = CloudSimulation::new(sim, cfg);

    let h = cloud_sim.add_host("h", 2, 4096, 1000);
    let vm = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
    cloud_sim.submit_task(vm, 10000., 2, 0, 0, UtilizationModelKind::Full);

    let records = cloud_sim.run_until(0.2).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TaskStatus::Canceled);
    assert_abs_diff_eq!(records[0].finish_time, 0.2, epsilon = 1e-9);
    let dc = cloud_sim.datacenter();
    assert_eq!(dc.borrow().vm_location(vm), None);
    assert_eq!(dc.borrow().pool().get_available_units(h), 2);
}

#[test]
// Two runs of the same scenario with the same seed produce identical
// outcomes, including stochastic utilization draws.
fn test_determinism() {
    let run = || {
        let sim = Simulation::new(123);
        let mut cloud_sim = CloudSimulation::new(sim, config("TimeShared"));
        cloud_sim.add_host("h1", 4, 4096, 1000);
        cloud_sim.add_host("h2", 4, 4096, 1000);
        for _ in 0..3 {
            let vm = cloud_sim.spawn_vm_now(2, 1024, 100, 0);
            cloud_sim.submit_task(vm, 30000., 2, 0, 0, UtilizationModelKind::Stochastic { seed: 42 });
            cloud_sim.submit_task(vm, 60000., 2, 0, 0, UtilizationModelKind::Full);
        }
        let records = cloud_sim.run().unwrap();
        serde_json::to_string(&records).unwrap()
    };
    assert_eq!(run(), run());
}
