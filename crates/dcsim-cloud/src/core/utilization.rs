//! Task CPU utilization models.

use dyn_clone::{clone_trait_object, DynClone};
use rand::prelude::*;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

/// Defines the fraction of the VM's aggregate processing rate a task is
/// willing to use at the given moment.
///
/// The returned value is in `[0, 1]` and caps the task's share below the
/// equal time-shared split; unused capacity is redistributed among the
/// remaining tasks. The model is queried each time the scheduler recomputes
/// task rates.
pub trait UtilizationModel: DynClone {
    fn utilization(&mut self, time: f64) -> f64;
}

clone_trait_object!(UtilizationModel);

/// Task always uses the full share it is given.
#[derive(Clone)]
pub struct FullUtilization;

impl UtilizationModel for FullUtilization {
    fn utilization(&mut self, _time: f64) -> f64 {
        1.
    }
}

/// Task never uses more than a fixed fraction of the VM capacity.
#[derive(Clone)]
pub struct ConstantUtilization {
    value: f64,
}

impl ConstantUtilization {
    pub fn new(value: f64) -> Self {
        assert!((0. ..=1.).contains(&value), "utilization must be in [0, 1]");
        Self { value }
    }
}

impl UtilizationModel for ConstantUtilization {
    fn utilization(&mut self, _time: f64) -> f64 {
        self.value
    }
}

/// Task utilization drawn uniformly from `[0, 1)` on every scheduler update.
///
/// The model owns a seeded generator, so simulation runs with the same seed
/// stay reproducible.
#[derive(Clone)]
pub struct StochasticUtilization {
    rand: Pcg64,
}

impl StochasticUtilization {
    pub fn new(seed: u64) -> Self {
        Self {
            rand: Pcg64::seed_from_u64(seed),
        }
    }
}

impl UtilizationModel for StochasticUtilization {
    fn utilization(&mut self, _time: f64) -> f64 {
        self.rand.gen_range(0.0..1.0)
    }
}

/// Serializable description of a utilization model, used in scenario configs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum UtilizationModelKind {
    Full,
    Constant(f64),
    Stochastic { seed: u64 },
}

/// Instantiates the utilization model described by `kind`.
pub fn utilization_model_resolver(kind: &UtilizationModelKind) -> Box<dyn UtilizationModel> {
    match kind {
        UtilizationModelKind::Full => Box::new(FullUtilization),
        UtilizationModelKind::Constant(value) => Box::new(ConstantUtilization::new(*value)),
        UtilizationModelKind::Stochastic { seed } => Box::new(StochasticUtilization::new(*seed)),
    }
}
