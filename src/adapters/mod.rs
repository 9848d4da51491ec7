//! Adapters implementing the domain ports.

pub mod memory;
pub mod simulated;

pub use simulated::SimulatedHandler;
