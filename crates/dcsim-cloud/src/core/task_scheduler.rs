//! Per-VM task scheduling disciplines.
//!
//! A scheduler owns the tasks assigned to its VM and divides the VM's
//! aggregate processing rate among them. Completion times are computed
//! analytically from the current rates, so the simulation can jump directly
//! to the next completion instant instead of polling at fixed intervals.
//! Rates stay constant between scheduler updates; every change of the
//! running set (admission, completion, pause, cancellation) triggers a
//! recomputation.

use dyn_clone::{clone_trait_object, DynClone};
use indexmap::IndexMap;

use crate::core::task::{Task, TaskStatus};

/// Discipline for sharing a VM's processing capacity among its tasks.
///
/// All operations take the current simulation time and internally accrue the
/// progress of running tasks since the previous update before mutating the
/// task set.
pub trait TaskScheduler: DynClone {
    /// Aggregate processing rate of the VM in instructions per second.
    fn capacity(&self) -> f64;

    /// Accepts a task in `Queued` status; the discipline decides whether it
    /// starts executing immediately or waits for capacity.
    fn admit(&mut self, task: Task, now: f64);

    /// Projected time and id of the earliest task completion, if any task
    /// is running at a non-zero rate.
    fn next_completion(&self) -> Option<(f64, u32)>;

    /// Removes and returns all tasks whose accumulated work covers their
    /// length at `now`, marking them `Success` and starting queued tasks
    /// that fit into the freed capacity.
    fn take_completed(&mut self, now: f64) -> Vec<Task>;

    /// Suspends a running task. Returns false if the task is not running.
    fn pause(&mut self, task_id: u32, now: f64) -> bool;

    /// Resumes a paused task. Returns false if the task is not paused.
    fn resume(&mut self, task_id: u32, now: f64) -> bool;

    /// Removes a queued or running task, marking it `Canceled`.
    fn cancel(&mut self, task_id: u32, now: f64) -> Option<Task>;

    /// Removes all tasks still waiting for capacity, marking them `Canceled`.
    fn cancel_queued(&mut self, now: f64) -> Vec<Task>;

    /// Removes all remaining tasks, marking them `Failed`. Used when the
    /// owning VM is destroyed.
    fn fail_all(&mut self, now: f64) -> Vec<Task>;

    /// Number of tasks owned by the scheduler, both running and queued.
    fn task_count(&self) -> usize;

    /// Current processing rate granted to a running task.
    fn rate_of(&self, task_id: u32) -> Option<f64>;
}

clone_trait_object!(TaskScheduler);

/// Instantiates the task scheduling discipline selected by configuration.
pub fn task_scheduler_resolver(discipline: &str, units: u32, unit_rate: f64) -> Box<dyn TaskScheduler> {
    match discipline {
        "TimeShared" => Box::new(TimeSharedScheduler::new(units, unit_rate)),
        "SpaceShared" => Box::new(SpaceSharedScheduler::new(units, unit_rate)),
        _ => panic!("Can't resolve task scheduler: {}", discipline),
    }
}

#[derive(Clone)]
struct Entry {
    task: Task,
    rate: f64,
}

// TIME-SHARED DISCIPLINE //////////////////////////////////////////////////////////////////////////

/// Proportional-share time-shared scheduling.
///
/// Every running task receives an equal fraction of the VM's aggregate rate.
/// A task whose utilization model caps its share below the equal split gets
/// its cap, and the unused capacity is redistributed among the remaining
/// tasks (water-filling, capped tasks served in ascending cap order).
#[derive(Clone)]
pub struct TimeSharedScheduler {
    capacity: f64,
    entries: IndexMap<u32, Entry>,
    last_update: f64,
}

impl TimeSharedScheduler {
    pub fn new(units: u32, unit_rate: f64) -> Self {
        Self {
            capacity: units as f64 * unit_rate,
            entries: IndexMap::new(),
            last_update: 0.,
        }
    }

    fn update_progress(&mut self, now: f64) {
        let dt = now - self.last_update;
        if dt > 0. {
            for entry in self.entries.values_mut() {
                if *entry.task.status() == TaskStatus::InExec {
                    entry.task.accumulated = (entry.task.accumulated + entry.rate * dt).min(entry.task.length);
                }
            }
        }
        self.last_update = now;
    }

    fn reschedule(&mut self, now: f64) {
        let mut caps: Vec<(u32, f64)> = Vec::new();
        for entry in self.entries.values_mut() {
            if *entry.task.status() == TaskStatus::InExec {
                let cap = entry.task.utilization_model.utilization(now) * self.capacity;
                caps.push((entry.task.id, cap));
            } else {
                entry.rate = 0.;
            }
        }
        // Serving capped tasks in ascending cap order lets the freed
        // capacity flow to the tasks that can still use it.
        caps.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        let mut remaining = self.capacity;
        let mut left = caps.len();
        for (task_id, cap) in caps {
            let fair = remaining / left as f64;
            let rate = cap.min(fair);
            self.entries.get_mut(&task_id).unwrap().rate = rate;
            remaining -= rate;
            left -= 1;
        }
    }
}

impl TaskScheduler for TimeSharedScheduler {
    fn capacity(&self) -> f64 {
        self.capacity
    }

    fn admit(&mut self, mut task: Task, now: f64) {
        self.update_progress(now);
        task.set_status(TaskStatus::InExec);
        task.start_time = now;
        self.entries.insert(task.id, Entry { task, rate: 0. });
        self.reschedule(now);
    }

    fn next_completion(&self) -> Option<(f64, u32)> {
        let mut next: Option<(f64, u32)> = None;
        for entry in self.entries.values() {
            if *entry.task.status() != TaskStatus::InExec || entry.rate <= 0. {
                continue;
            }
            let finish = self.last_update + entry.task.remaining() / entry.rate;
            if next.is_none() || finish < next.unwrap().0 {
                next = Some((finish, entry.task.id));
            }
        }
        next
    }

    fn take_completed(&mut self, now: f64) -> Vec<Task> {
        self.update_progress(now);
        let done_ids: Vec<u32> = self
            .entries
            .values()
            .filter(|e| *e.task.status() == TaskStatus::InExec && e.task.is_complete())
            .map(|e| e.task.id)
            .collect();
        let mut done = Vec::new();
        for id in done_ids {
            let mut entry = self.entries.shift_remove(&id).unwrap();
            entry.task.set_status(TaskStatus::Success);
            entry.task.finish_time = now;
            done.push(entry.task);
        }
        if !done.is_empty() {
            self.reschedule(now);
        }
        done
    }

    fn pause(&mut self, task_id: u32, now: f64) -> bool {
        self.update_progress(now);
        match self.entries.get_mut(&task_id) {
            Some(entry) if *entry.task.status() == TaskStatus::InExec => {
                entry.task.set_status(TaskStatus::Paused);
                entry.rate = 0.;
                self.reschedule(now);
                true
            }
            _ => false,
        }
    }

    fn resume(&mut self, task_id: u32, now: f64) -> bool {
        self.update_progress(now);
        match self.entries.get_mut(&task_id) {
            Some(entry) if *entry.task.status() == TaskStatus::Paused => {
                entry.task.set_status(TaskStatus::InExec);
                self.reschedule(now);
                true
            }
            _ => false,
        }
    }

    fn cancel(&mut self, task_id: u32, now: f64) -> Option<Task> {
        self.update_progress(now);
        let mut entry = self.entries.shift_remove(&task_id)?;
        entry.task.set_status(TaskStatus::Canceled);
        entry.task.finish_time = now;
        self.reschedule(now);
        Some(entry.task)
    }

    fn cancel_queued(&mut self, _now: f64) -> Vec<Task> {
        // time sharing admits every task immediately, there is no queue
        Vec::new()
    }

    fn fail_all(&mut self, now: f64) -> Vec<Task> {
        self.update_progress(now);
        let mut failed = Vec::new();
        for (_, mut entry) in std::mem::take(&mut self.entries) {
            entry.task.set_status(TaskStatus::Failed);
            entry.task.finish_time = now;
            failed.push(entry.task);
        }
        failed
    }

    fn task_count(&self) -> usize {
        self.entries.len()
    }

    fn rate_of(&self, task_id: u32) -> Option<f64> {
        self.entries.get(&task_id).map(|e| e.rate)
    }
}

// SPACE-SHARED DISCIPLINE /////////////////////////////////////////////////////////////////////////

/// Space-shared scheduling: a running task gets the requested units
/// exclusively, tasks that do not fit wait in a FIFO queue.
#[derive(Clone)]
pub struct SpaceSharedScheduler {
    unit_rate: f64,
    units_total: u32,
    units_free: u32,
    entries: IndexMap<u32, Entry>,
    queue: Vec<Task>,
    last_update: f64,
}

impl SpaceSharedScheduler {
    pub fn new(units: u32, unit_rate: f64) -> Self {
        Self {
            unit_rate,
            units_total: units,
            units_free: units,
            entries: IndexMap::new(),
            queue: Vec::new(),
            last_update: 0.,
        }
    }

    fn update_progress(&mut self, now: f64) {
        let dt = now - self.last_update;
        if dt > 0. {
            for entry in self.entries.values_mut() {
                if *entry.task.status() == TaskStatus::InExec {
                    entry.task.accumulated = (entry.task.accumulated + entry.rate * dt).min(entry.task.length);
                }
            }
        }
        self.last_update = now;
    }

    fn reschedule(&mut self, now: f64) {
        for entry in self.entries.values_mut() {
            if *entry.task.status() == TaskStatus::InExec {
                let units = entry.task.units as f64;
                entry.rate = entry.task.utilization_model.utilization(now) * units * self.unit_rate;
            } else {
                entry.rate = 0.;
            }
        }
    }

    fn start_task(&mut self, mut task: Task, now: f64) {
        self.units_free -= task.units;
        task.set_status(TaskStatus::InExec);
        task.start_time = now;
        self.entries.insert(task.id, Entry { task, rate: 0. });
    }

    fn start_queued(&mut self, now: f64) {
        let mut waiting = std::mem::take(&mut self.queue);
        waiting.retain(|task| {
            if task.units <= self.units_free {
                self.start_task(task.clone(), now);
                false
            } else {
                true
            }
        });
        self.queue = waiting;
    }
}

impl TaskScheduler for SpaceSharedScheduler {
    fn capacity(&self) -> f64 {
        self.units_total as f64 * self.unit_rate
    }

    fn admit(&mut self, task: Task, now: f64) {
        self.update_progress(now);
        if task.units <= self.units_free {
            self.start_task(task, now);
        } else {
            self.queue.push(task);
        }
        self.reschedule(now);
    }

    fn next_completion(&self) -> Option<(f64, u32)> {
        let mut next: Option<(f64, u32)> = None;
        for entry in self.entries.values() {
            if *entry.task.status() != TaskStatus::InExec || entry.rate <= 0. {
                continue;
            }
            let finish = self.last_update + entry.task.remaining() / entry.rate;
            if next.is_none() || finish < next.unwrap().0 {
                next = Some((finish, entry.task.id));
            }
        }
        next
    }

    fn take_completed(&mut self, now: f64) -> Vec<Task> {
        self.update_progress(now);
        let done_ids: Vec<u32> = self
            .entries
            .values()
            .filter(|e| *e.task.status() == TaskStatus::InExec && e.task.is_complete())
            .map(|e| e.task.id)
            .collect();
        let mut done = Vec::new();
        for id in done_ids {
            let mut entry = self.entries.shift_remove(&id).unwrap();
            self.units_free += entry.task.units;
            entry.task.set_status(TaskStatus::Success);
            entry.task.finish_time = now;
            done.push(entry.task);
        }
        if !done.is_empty() {
            self.start_queued(now);
            self.reschedule(now);
        }
        done
    }

    fn pause(&mut self, task_id: u32, now: f64) -> bool {
        self.update_progress(now);
        match self.entries.get_mut(&task_id) {
            Some(entry) if *entry.task.status() == TaskStatus::InExec => {
                // the units stay reserved while the task is paused
                entry.task.set_status(TaskStatus::Paused);
                entry.rate = 0.;
                self.reschedule(now);
                true
            }
            _ => false,
        }
    }

    fn resume(&mut self, task_id: u32, now: f64) -> bool {
        self.update_progress(now);
        match self.entries.get_mut(&task_id) {
            Some(entry) if *entry.task.status() == TaskStatus::Paused => {
                entry.task.set_status(TaskStatus::InExec);
                self.reschedule(now);
                true
            }
            _ => false,
        }
    }

    fn cancel(&mut self, task_id: u32, now: f64) -> Option<Task> {
        self.update_progress(now);
        if let Some(mut entry) = self.entries.shift_remove(&task_id) {
            self.units_free += entry.task.units;
            entry.task.set_status(TaskStatus::Canceled);
            entry.task.finish_time = now;
            self.start_queued(now);
            self.reschedule(now);
            return Some(entry.task);
        }
        if let Some(pos) = self.queue.iter().position(|t| t.id == task_id) {
            let mut task = self.queue.remove(pos);
            task.set_status(TaskStatus::Canceled);
            task.finish_time = now;
            return Some(task);
        }
        None
    }

    fn cancel_queued(&mut self, now: f64) -> Vec<Task> {
        let mut canceled = Vec::new();
        for mut task in std::mem::take(&mut self.queue) {
            task.set_status(TaskStatus::Canceled);
            task.finish_time = now;
            canceled.push(task);
        }
        canceled
    }

    fn fail_all(&mut self, now: f64) -> Vec<Task> {
        self.update_progress(now);
        let mut failed = Vec::new();
        for (_, mut entry) in std::mem::take(&mut self.entries) {
            entry.task.set_status(TaskStatus::Failed);
            entry.task.finish_time = now;
            failed.push(entry.task);
        }
        for mut task in std::mem::take(&mut self.queue) {
            task.set_status(TaskStatus::Failed);
            task.finish_time = now;
            failed.push(task);
        }
        self.units_free = self.units_total;
        failed
    }

    fn task_count(&self) -> usize {
        self.entries.len() + self.queue.len()
    }

    fn rate_of(&self, task_id: u32) -> Option<f64> {
        self.entries.get(&task_id).map(|e| e.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utilization::{ConstantUtilization, FullUtilization};

    fn task(id: u32, length: f64, units: u32) -> Task {
        let mut task = Task::new(id, 0, 0, length, units, 0, 0, Box::new(FullUtilization));
        task.set_status(TaskStatus::Queued);
        task
    }

    fn capped_task(id: u32, length: f64, units: u32, cap: f64) -> Task {
        let mut task = Task::new(id, 0, 0, length, units, 0, 0, Box::new(ConstantUtilization::new(cap)));
        task.set_status(TaskStatus::Queued);
        task
    }

    #[test]
    fn equal_tasks_share_capacity_equally() {
        // 2 units at rate 1000, two tasks of 60000 instructions
        let mut sched = TimeSharedScheduler::new(2, 1000.);
        sched.admit(task(0, 60000., 2), 0.);
        sched.admit(task(1, 60000., 2), 0.);
        assert_eq!(sched.rate_of(0), Some(1000.));
        assert_eq!(sched.rate_of(1), Some(1000.));
        let (finish, _) = sched.next_completion().unwrap();
        assert_eq!(finish, 60.);
        let done = sched.take_completed(finish);
        assert_eq!(done.len(), 2);
        assert!(done.iter().all(|t| *t.status() == TaskStatus::Success));
    }

    #[test]
    fn rates_are_recomputed_when_a_task_finishes() {
        // three tasks on 2 units: each runs at 2000/3 until the shortest
        // finishes, then the survivors split the full capacity
        let mut sched = TimeSharedScheduler::new(2, 1000.);
        sched.admit(task(0, 30000., 2), 0.);
        sched.admit(task(1, 60000., 2), 0.);
        sched.admit(task(2, 90000., 2), 0.);
        for id in 0..3 {
            assert!((sched.rate_of(id).unwrap() - 2000. / 3.).abs() < 1e-9);
        }
        let (t1, first) = sched.next_completion().unwrap();
        assert_eq!(first, 0);
        assert!((t1 - 45.).abs() < 1e-9);
        sched.take_completed(t1);
        assert_eq!(sched.rate_of(1), Some(1000.));
        assert_eq!(sched.rate_of(2), Some(1000.));
    }

    #[test]
    fn capped_share_is_redistributed() {
        // one task capped at 25% of the 2000 capacity, the other picks up
        // the slack
        let mut sched = TimeSharedScheduler::new(2, 1000.);
        sched.admit(capped_task(0, 15000., 2, 0.25), 0.);
        sched.admit(task(1, 60000., 2), 0.);
        assert_eq!(sched.rate_of(0), Some(500.));
        assert_eq!(sched.rate_of(1), Some(1500.));
    }

    #[test]
    fn paused_task_does_not_consume_capacity() {
        let mut sched = TimeSharedScheduler::new(1, 1000.);
        sched.admit(task(0, 10000., 1), 0.);
        sched.admit(task(1, 10000., 1), 0.);
        assert!(sched.pause(0, 5.));
        assert_eq!(sched.rate_of(0), Some(0.));
        assert_eq!(sched.rate_of(1), Some(1000.));
        assert!(sched.resume(0, 10.));
        assert_eq!(sched.rate_of(0), Some(500.));
    }

    #[test]
    fn space_shared_queues_tasks_beyond_capacity() {
        let mut sched = SpaceSharedScheduler::new(2, 1000.);
        sched.admit(task(0, 20000., 2), 0.);
        sched.admit(task(1, 20000., 2), 0.);
        assert_eq!(sched.rate_of(0), Some(2000.));
        assert_eq!(sched.rate_of(1), None);
        let (t1, _) = sched.next_completion().unwrap();
        assert_eq!(t1, 10.);
        let done = sched.take_completed(t1);
        assert_eq!(done.len(), 1);
        // the queued task starts once the units are freed
        assert_eq!(sched.rate_of(1), Some(2000.));
        let (t2, _) = sched.next_completion().unwrap();
        assert_eq!(t2, 20.);
    }

    #[test]
    fn fail_all_empties_the_scheduler() {
        let mut sched = SpaceSharedScheduler::new(2, 1000.);
        sched.admit(task(0, 20000., 2), 0.);
        sched.admit(task(1, 20000., 2), 0.);
        let failed = sched.fail_all(5.);
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|t| *t.status() == TaskStatus::Failed));
        assert_eq!(sched.task_count(), 0);
    }
}
