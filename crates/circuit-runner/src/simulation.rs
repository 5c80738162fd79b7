//! A switch and a light controller wired together over the loopback.

use chrono::{DateTime, Utc};
use circuit_common::{
    BindingState, Clock, ClockError, ManualClock, NodeId, SharedStack, SystemClock,
};
use circuit_controller::{
    create_light_controller, encode_snapshot, ControllerConfig, LightController, LightState,
};
use circuit_metrics::metric_defs;
use circuit_protocol::{CommandReply, StatusCode};
use circuit_switch::{create_light_switch, DesiredState, LightSwitch, SwitchConfig};
use parking_lot::MutexGuard;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RunnerError, RunnerResult};
use crate::loopback::{LoopbackBinding, LoopbackNetwork, SwitchDelivery, WireRecord};
use crate::notification::NotificationEngine;

/// Pump rounds before a simulation is considered stuck.
pub const MAX_PUMP_ROUNDS: usize = 64;

// ============================================================================
// Clock
// ============================================================================

/// Clock the controller checks expiry times against.
#[derive(Debug, Clone)]
pub enum SimClock {
    /// Simulated time, moved by the scenario.
    Manual(ManualClock),
    /// The host clock.
    System(SystemClock),
}

impl SimClock {
    /// Simulated clock synchronised to the current host time.
    pub fn manual_now() -> Self {
        let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        SimClock::Manual(ManualClock::synchronized_at(now_ms))
    }
}

impl Clock for SimClock {
    fn real_time_ms(&self) -> Result<u64, ClockError> {
        match self {
            SimClock::Manual(clock) => clock.real_time_ms(),
            SimClock::System(clock) => clock.real_time_ms(),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// The two nodes of a simulation.
///
/// The controller runs on `switch.controller_node_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Controller configuration.
    pub controller: ControllerConfig,
    /// Switch configuration.
    pub switch: SwitchConfig,
    /// Node the switch runs on.
    pub switch_node: NodeId,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            controller: ControllerConfig::default(),
            switch: SwitchConfig {
                controller_node_id: NodeId(0x18B4_3000_0000_0001),
                ..SwitchConfig::default()
            },
            switch_node: NodeId(0x18B4_3000_0000_0002),
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// Final state of the controller.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerReport {
    /// Light state.
    pub light: LightState,
    /// State trait version.
    pub version: u64,
    /// Commands applied.
    pub commands_applied: u32,
    /// Commands rejected.
    pub commands_rejected: u32,
    /// Replies that could not be sent.
    pub reply_failures: u32,
    /// Notifications delivered.
    pub notifications: usize,
    /// Encoded state trait, hex.
    pub snapshot_hex: String,
}

/// Final state of the switch.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchReport {
    /// Desired state.
    pub desired: DesiredState,
    /// Binding state.
    pub binding_state: BindingState,
    /// In-flight exchange.
    pub in_flight: Option<u32>,
    /// Commands sent.
    pub commands_sent: u32,
    /// Send failures.
    pub send_failures: u32,
    /// Acknowledged commands.
    pub acks_received: u32,
    /// Version from the last successful reply.
    pub last_confirmed_version: Option<u64>,
    /// Status of the last rejected command.
    pub last_rejection: Option<StatusCode>,
}

/// Summary of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// When the simulation was created.
    pub started_at: DateTime<Utc>,
    /// When the report was taken.
    pub finished_at: DateTime<Utc>,
    /// Loopback deliveries made.
    pub deliveries: u64,
    /// Controller state.
    pub controller: ControllerReport,
    /// Switch state.
    pub switch: SwitchReport,
    /// Every message that crossed the loopback.
    pub messages: Vec<WireRecord>,
}

// ============================================================================
// Simulation
// ============================================================================

/// Light switch type used by the simulation.
pub type SimSwitch = LightSwitch<LoopbackBinding>;

/// Light controller type used by the simulation.
pub type SimController = LightController<NotificationEngine, SimClock>;

/// A switch and a controller over one loopback network.
///
/// Nothing moves until [`Simulation::pump`] runs. The switch sits behind a
/// [`SharedStack`] so other threads can drive it.
pub struct Simulation {
    network: LoopbackNetwork,
    controller: SimController,
    switch: SharedStack<SimSwitch>,
    clock: SimClock,
    switch_node: NodeId,
    last_status: Option<StatusCode>,
    deliveries: u64,
    started_at: DateTime<Utc>,
}

impl Simulation {
    /// Create both nodes. Nothing is sent yet.
    pub fn new(config: SimulationConfig, clock: SimClock) -> RunnerResult<Self> {
        let network = LoopbackNetwork::new(config.switch.controller_node_id);
        let controller =
            create_light_controller(config.controller, NotificationEngine::default(), clock.clone())?;
        let switch = create_light_switch(config.switch, &mut network.factory(config.switch_node))?;

        info!(
            "Simulation: switch {} -> controller {}",
            config.switch_node,
            network.controller_node()
        );

        Ok(Simulation {
            network,
            controller,
            switch: SharedStack::new(switch),
            clock,
            switch_node: config.switch_node,
            last_status: None,
            deliveries: 0,
            started_at: Utc::now(),
        })
    }

    /// The loopback network.
    pub fn network(&self) -> &LoopbackNetwork {
        &self.network
    }

    /// The controller.
    pub fn controller(&self) -> &SimController {
        &self.controller
    }

    /// Mutable access to the controller.
    pub fn controller_mut(&mut self) -> &mut SimController {
        &mut self.controller
    }

    /// Lock the switch.
    pub fn switch(&self) -> MutexGuard<'_, SimSwitch> {
        self.switch.lock()
    }

    /// Shared handle to the switch for use from other threads.
    pub fn switch_handle(&self) -> SharedStack<SimSwitch> {
        self.switch.clone()
    }

    /// The controller's clock.
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Node the switch runs on.
    pub fn switch_node(&self) -> NodeId {
        self.switch_node
    }

    /// Status the controller answered the last command with.
    pub fn last_status(&self) -> Option<StatusCode> {
        self.last_status
    }

    /// Loopback deliveries made so far.
    pub fn deliveries(&self) -> u64 {
        self.deliveries
    }

    /// Deliver events and messages until nothing is left. Returns the number of
    /// deliveries made.
    pub fn pump(&mut self) -> RunnerResult<usize> {
        let mut total = 0;
        for _ in 0..MAX_PUMP_ROUNDS {
            let delivered = self.pump_once();
            if delivered == 0 {
                metrics::histogram!(metric_defs::SIM_MESSAGES_PER_PUMP.name).record(total as f64);
                return Ok(total);
            }
            total += delivered;
        }
        Err(RunnerError::NotQuiescent(MAX_PUMP_ROUNDS))
    }

    fn pump_once(&mut self) -> usize {
        let mut delivered = 0;

        while let Some(delivery) = self.network.next_switch_delivery() {
            delivered += 1;
            let mut switch = self.switch.lock();
            match delivery {
                SwitchDelivery::Binding(event) => {
                    if let Err(err) = switch.handle_binding_event(&event) {
                        debug!("Simulation: {} handling returned {}", event.name(), err);
                    }
                }
                SwitchDelivery::Exchange(event) => switch.handle_exchange_event(event),
            }
        }

        while let Some(delivery) = self.network.next_controller_delivery() {
            delivered += 1;
            let responder = self.network.responder(delivery.exchange);
            let outcome = self.controller.handle_command(delivery.command, responder);
            self.last_status = Some(match outcome.reply() {
                CommandReply::Response { .. } => StatusCode::SUCCESS,
                CommandReply::StatusReport(status) => status,
            });
        }

        if delivered > 0 {
            self.controller.run_notifications();
        }
        self.deliveries += delivered as u64;
        delivered
    }

    /// Take the loopback link down or bring it back.
    pub fn set_link(&self, up: bool) {
        self.network.set_link(up);
    }

    /// Summarise the current state.
    pub fn report(&self) -> RunnerResult<SimulationReport> {
        let light = self.controller.light();
        let snapshot = encode_snapshot(&light)?;
        let switch = self.switch.lock();

        Ok(SimulationReport {
            started_at: self.started_at,
            finished_at: Utc::now(),
            deliveries: self.deliveries,
            controller: ControllerReport {
                light,
                version: self.controller.version(),
                commands_applied: self.controller.commands_applied(),
                commands_rejected: self.controller.commands_rejected(),
                reply_failures: self.controller.reply_failures(),
                notifications: self.controller.publisher().delivered().len(),
                snapshot_hex: hex::encode(&snapshot),
            },
            switch: SwitchReport {
                desired: switch.desired(),
                binding_state: switch.binding_state(),
                in_flight: switch.in_flight().map(|e| e.0),
                commands_sent: switch.commands_sent(),
                send_failures: switch.send_failures(),
                acks_received: switch.acks_received(),
                last_confirmed_version: switch.last_confirmed_version(),
                last_rejection: switch.last_rejection(),
            },
            messages: self.network.log().records(),
        })
    }
}
