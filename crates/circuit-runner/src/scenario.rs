//! Scripted simulation runs.
//!
//! A scenario is a YAML document naming the two nodes and a list of steps:
//!
//! ```yaml
//! name: dim the light
//! switch:
//!   name: Hallway
//!   controller_node_id: 1
//! switch_node: 2
//! steps:
//!   - action: set
//!     state: ON
//!     level: 75
//!   - action: pump
//!   - action: expect
//!     controller_state: ON
//!     controller_level: 75
//! ```

use std::fmt::Debug;
use std::path::Path;
use std::thread;

use circuit_common::{BindingState, Clock};
use circuit_protocol::{
    CircuitState, CommandRequest, SetCircuitStateArgs, StatusCode, MSG_TYPE_ONE_WAY_COMMAND,
    PROFILE_WDM,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::simulation::{SimClock, Simulation, SimulationConfig, SimulationReport};

// ============================================================================
// Steps
// ============================================================================

/// Values an `expect` step checks. Unset fields are not checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Expectation {
    /// Controller circuit state.
    pub controller_state: Option<CircuitState>,
    /// Controller level.
    pub controller_level: Option<u8>,
    /// State trait version.
    pub version: Option<u64>,
    /// Switch pending flag.
    pub change_pending: Option<bool>,
    /// Switch binding state.
    pub binding_state: Option<BindingState>,
    /// Whether the switch has an exchange in flight.
    pub in_flight: Option<bool>,
    /// Status name of the controller's last reply, e.g. `version_mismatch`.
    pub last_status: Option<String>,
    /// Commands the controller applied.
    pub commands_applied: Option<u32>,
}

/// One scenario step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Set the switch.
    Set {
        /// Requested state.
        state: CircuitState,
        /// Requested level.
        level: u8,
    },
    /// Toggle the switch.
    Toggle,
    /// Toggle the switch from another thread.
    UiToggle,
    /// Set the light from on-device input.
    ControllerSet {
        /// New state.
        state: CircuitState,
        /// New level.
        level: u8,
    },
    /// Toggle the light from on-device input.
    ControllerToggle,
    /// Send a hand-built command straight to the controller.
    Command {
        /// Requested state, null when absent.
        #[serde(default)]
        state: Option<CircuitState>,
        /// Requested level, null when absent.
        #[serde(default)]
        level: Option<u8>,
        /// Expiry relative to the controller's clock.
        #[serde(default)]
        expires_in_ms: Option<i64>,
        /// Required state trait version.
        #[serde(default)]
        must_be_version: Option<u64>,
    },
    /// Deliver everything queued.
    Pump,
    /// Take the link down.
    FailLink,
    /// Bring the link back.
    RestoreLink,
    /// Move the simulated clock forward.
    AdvanceClock {
        /// Milliseconds to advance.
        ms: u64,
    },
    /// Check the current state.
    Expect(Expectation),
}

impl Step {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Set { .. } => "set",
            Step::Toggle => "toggle",
            Step::UiToggle => "ui_toggle",
            Step::ControllerSet { .. } => "controller_set",
            Step::ControllerToggle => "controller_toggle",
            Step::Command { .. } => "command",
            Step::Pump => "pump",
            Step::FailLink => "fail_link",
            Step::RestoreLink => "restore_link",
            Step::AdvanceClock { .. } => "advance_clock",
            Step::Expect(_) => "expect",
        }
    }
}

// ============================================================================
// Scenario
// ============================================================================

/// A named simulation setup and its steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Nodes.
    #[serde(flatten)]
    pub simulation: SimulationConfig,
    /// Steps, run in order.
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Parse a scenario from YAML.
    pub fn from_yaml_str(yaml: &str) -> RunnerResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a scenario file.
    pub fn load(path: &Path) -> RunnerResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Set the light ON at 75 while the binding is idle, then let it settle.
    pub fn builtin() -> Self {
        Scenario {
            name: "set while idle".to_string(),
            simulation: SimulationConfig::default(),
            steps: vec![
                Step::Set {
                    state: CircuitState::On,
                    level: 75,
                },
                Step::Expect(Expectation {
                    change_pending: Some(true),
                    binding_state: Some(BindingState::Preparing),
                    commands_applied: Some(0),
                    ..Expectation::default()
                }),
                Step::Pump,
                Step::Expect(Expectation {
                    controller_state: Some(CircuitState::On),
                    controller_level: Some(75),
                    version: Some(2),
                    change_pending: Some(false),
                    binding_state: Some(BindingState::Ready),
                    in_flight: Some(false),
                    last_status: Some("success".to_string()),
                    commands_applied: Some(1),
                }),
            ],
        }
    }
}

/// Run every step of `scenario`, let the simulation settle and report.
pub fn run_scenario(scenario: &Scenario, clock: SimClock) -> RunnerResult<SimulationReport> {
    info!("Running scenario '{}' ({} steps)", scenario.name, scenario.steps.len());
    let mut simulation = Simulation::new(scenario.simulation.clone(), clock)?;
    for (index, step) in scenario.steps.iter().enumerate() {
        simulation.run_step(index + 1, step)?;
    }
    simulation.pump()?;
    simulation.report()
}

// ============================================================================
// Step execution
// ============================================================================

impl Simulation {
    /// Run one step. `number` is only used in logs and errors.
    pub fn run_step(&mut self, number: usize, step: &Step) -> RunnerResult<()> {
        info!("Step {}: {}", number, step.name());
        match step {
            Step::Set { state, level } => {
                self.switch().set(*state, *level)?;
            }
            Step::Toggle => {
                self.switch().toggle();
            }
            Step::UiToggle => {
                let switch = self.switch_handle();
                thread::spawn(move || switch.with(|s| s.toggle()))
                    .join()
                    .map_err(|_| RunnerError::UiThreadPanicked)?;
            }
            Step::ControllerSet { state, level } => {
                self.controller_mut().set(*state, *level)?;
            }
            Step::ControllerToggle => {
                self.controller_mut().toggle();
            }
            Step::Command {
                state,
                level,
                expires_in_ms,
                must_be_version,
            } => {
                let mut request = CommandRequest::set_circuit_state(SetCircuitStateArgs {
                    state: *state,
                    level: *level,
                });
                if let Some(offset_ms) = *expires_in_ms {
                    let now_ms = i64::try_from(self.clock().real_time_ms().unwrap_or(0))
                        .unwrap_or(i64::MAX);
                    let expiry_us = now_ms
                        .checked_add(offset_ms)
                        .and_then(|ms| ms.checked_mul(1000))
                        .ok_or(RunnerError::ExpiryOutOfRange {
                            step: number,
                            offset_ms,
                        })?;
                    request = request.with_expiry(expiry_us);
                }
                if let Some(version) = must_be_version {
                    request = request.with_must_be_version(*version);
                }
                self.network().inject(
                    self.switch_node(),
                    PROFILE_WDM,
                    MSG_TYPE_ONE_WAY_COMMAND,
                    request.encode()?,
                )?;
            }
            Step::Pump => {
                self.pump()?;
            }
            Step::FailLink => self.set_link(false),
            Step::RestoreLink => self.set_link(true),
            Step::AdvanceClock { ms } => match self.clock() {
                SimClock::Manual(clock) => clock.advance(*ms),
                SimClock::System(_) => {
                    warn!("Step {}: cannot advance the host clock", number);
                }
            },
            Step::Expect(expectation) => self.check_expectation(number, expectation)?,
        }
        Ok(())
    }

    fn check_expectation(&self, number: usize, expected: &Expectation) -> RunnerResult<()> {
        let controller = self.controller();
        check(number, "controller state", &expected.controller_state, controller.state())?;
        check(number, "controller level", &expected.controller_level, controller.level())?;
        check(number, "version", &expected.version, controller.version())?;
        check(
            number,
            "commands applied",
            &expected.commands_applied,
            controller.commands_applied(),
        )?;
        check(
            number,
            "last status",
            &expected.last_status,
            self.last_status()
                .map(|s: StatusCode| s.name().to_string())
                .unwrap_or_default(),
        )?;

        let switch = self.switch();
        check(number, "change pending", &expected.change_pending, switch.change_pending())?;
        check(number, "binding state", &expected.binding_state, switch.binding_state())?;
        check(number, "in flight", &expected.in_flight, switch.in_flight().is_some())?;
        Ok(())
    }
}

fn check<T: PartialEq + Debug>(
    step: usize,
    field: &'static str,
    expected: &Option<T>,
    actual: T,
) -> RunnerResult<()> {
    match expected {
        Some(expected) if *expected != actual => Err(RunnerError::ExpectationFailed {
            step,
            field,
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }),
        _ => Ok(()),
    }
}
