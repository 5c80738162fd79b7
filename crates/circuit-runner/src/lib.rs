//! Loopback simulation of a light switch driving a light controller.
//!
//! This crate wires a [`LightSwitch`](circuit_switch::LightSwitch) and a
//! [`LightController`](circuit_controller::LightController) together in one process:
//!
//! - [`loopback`]: an in-process binding, exchanges and reply handles with a link
//!   that can be taken down
//! - [`notification`]: a notification engine that records dirty properties
//! - [`simulation`]: owns both nodes and pumps deliveries until nothing is left
//! - [`scenario`]: YAML-scripted runs with expectations
//!
//! The `circuit-sim` binary runs a scenario and prints a report.

pub mod error;
pub mod loopback;
pub mod notification;
pub mod scenario;
pub mod simulation;

pub use error::{RunnerError, RunnerResult};
pub use loopback::{
    ControllerDelivery, Direction, LoopbackBinding, LoopbackFactory, LoopbackNetwork,
    LoopbackResponder, SwitchDelivery, WireLog, WireRecord,
};
pub use notification::{Notification, NotificationEngine, DEFAULT_PUBLISHER_CAPACITY};
pub use scenario::{run_scenario, Expectation, Scenario, Step};
pub use simulation::{
    ControllerReport, SimClock, SimController, SimSwitch, Simulation, SimulationConfig,
    SimulationReport, SwitchReport, MAX_PUMP_ROUNDS,
};
