//! Processing elements of a host.

use serde::Serialize;

/// A single processing element with fixed computation rate
/// (instructions per second equivalent).
///
/// Units are immutable after host construction; a host exclusively owns
/// its units and time-shares them among the hosted VMs.
#[derive(Clone, Debug, Serialize)]
pub struct ResourceUnit {
    pub id: u32,
    pub rate: f64,
}

impl ResourceUnit {
    pub fn new(id: u32, rate: f64) -> Self {
        Self { id, rate }
    }
}

/// Builds a pool of identical units, numbered from zero.
pub fn uniform_units(count: u32, rate: f64) -> Vec<ResourceUnit> {
    (0..count).map(|id| ResourceUnit::new(id, rate)).collect()
}
