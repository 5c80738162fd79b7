//! Light switch.
//!
//! Mirrors the state the user asked for and delivers it to a light controller as
//! SetLogicalCircuitState commands over a [`Binding`](circuit_common::Binding).
//!
//! The switch never waits for the binding. A change requested while the binding is
//! not ready is held as the single pending change and sent once the binding reports
//! ready; a newer change replaces it.

mod config;
mod desired;
mod error;
mod switch;

#[cfg(test)]
mod test_support;

pub use config::*;
pub use desired::*;
pub use error::*;
pub use switch::*;
