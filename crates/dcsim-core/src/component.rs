//! Simulation component identifiers.

/// Identifier of simulation component.
///
/// Identifiers are assigned sequentially upon the component registration.
pub type Id = u32;
