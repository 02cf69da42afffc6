use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use dcsim_core::{cast, Event, EventHandler, Simulation};

#[derive(Clone, Serialize)]
struct Ping {
    tag: u32,
}

fn new_sim(seed: u64) -> Simulation {
    let _ = env_logger::builder().is_test(true).try_init();
    Simulation::new(seed)
}

#[derive(Default)]
struct Recorder {
    delivered: Vec<(f64, u32)>,
}

impl EventHandler for Recorder {
    fn on(&mut self, event: Event) {
        let time = event.time;
        cast!(match event.data {
            Ping { tag } => {
                self.delivered.push((time, tag));
            }
        })
    }
}

#[test]
fn events_are_delivered_in_time_order() {
    let mut sim = new_sim(42);
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let dst = sim.add_handler("recorder", recorder.clone());
    let mut ctx = sim.create_context("source");

    ctx.emit(Ping { tag: 3 }, dst, 3.0);
    ctx.emit(Ping { tag: 1 }, dst, 1.0);
    ctx.emit(Ping { tag: 2 }, dst, 2.0);
    sim.step_until_no_events();

    assert_eq!(sim.time(), 3.0);
    assert_eq!(recorder.borrow().delivered, vec![(1.0, 1), (2.0, 2), (3.0, 3)]);
}

#[test]
fn equal_timestamps_are_broken_by_insertion_order() {
    let mut sim = new_sim(42);
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let dst = sim.add_handler("recorder", recorder.clone());
    let mut ctx = sim.create_context("source");

    for tag in 0..10 {
        ctx.emit(Ping { tag }, dst, 5.0);
    }
    sim.step_until_no_events();

    let tags: Vec<u32> = recorder.borrow().delivered.iter().map(|(_, tag)| *tag).collect();
    assert_eq!(tags, (0..10).collect::<Vec<u32>>());
}

#[test]
fn cancelled_events_are_not_delivered() {
    let mut sim = new_sim(42);
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let dst = sim.add_handler("recorder", recorder.clone());
    let mut ctx = sim.create_context("source");

    ctx.emit(Ping { tag: 1 }, dst, 1.0);
    let cancelled = ctx.emit(Ping { tag: 2 }, dst, 2.0);
    ctx.emit(Ping { tag: 3 }, dst, 3.0);
    ctx.cancel_event(cancelled);
    sim.step_until_no_events();

    let tags: Vec<u32> = recorder.borrow().delivered.iter().map(|(_, tag)| *tag).collect();
    assert_eq!(tags, vec![1, 3]);
}

#[test]
fn step_for_duration_stops_at_threshold() {
    let mut sim = new_sim(42);
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let dst = sim.add_handler("recorder", recorder.clone());
    let mut ctx = sim.create_context("source");

    ctx.emit(Ping { tag: 1 }, dst, 1.0);
    ctx.emit(Ping { tag: 2 }, dst, 2.0);
    ctx.emit(Ping { tag: 3 }, dst, 3.5);

    let more = sim.step_for_duration(2.0);
    assert!(more);
    assert_eq!(sim.time(), 2.0);
    assert_eq!(recorder.borrow().delivered.len(), 2);

    let more = sim.step_for_duration(10.0);
    assert!(!more);
    assert_eq!(sim.time(), 3.5);
}

#[test]
fn step_until_time_advances_the_clock() {
    let mut sim = new_sim(42);
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let dst = sim.add_handler("recorder", recorder.clone());
    let mut ctx = sim.create_context("source");

    ctx.emit(Ping { tag: 1 }, dst, 1.0);
    ctx.emit(Ping { tag: 2 }, dst, 7.0);

    let more = sim.step_until_time(5.0);
    assert!(more);
    assert_eq!(sim.time(), 5.0);
    assert_eq!(recorder.borrow().delivered, vec![(1.0, 1)]);

    let more = sim.step_until_time(10.0);
    assert!(!more);
    assert_eq!(sim.time(), 10.0);
}

#[test]
#[should_panic(expected = "negative")]
fn scheduling_event_in_the_past_panics() {
    let mut sim = new_sim(42);
    let mut ctx = sim.create_context("source");
    let dst = ctx.id();
    ctx.emit(Ping { tag: 1 }, dst, -1.0);
}
