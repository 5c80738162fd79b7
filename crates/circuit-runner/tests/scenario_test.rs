//! Integration tests driving a light switch and a light controller over the loopback.
//!
//! These tests verify that the switch, the controller and the command codec work
//! together: pending changes, replay after link loss and the controller's checks.

use std::path::Path;

use circuit_common::{BindingState, ManualClock};
use circuit_protocol::{CircuitState, PropertyHandle, StatusCode, TraitSource};
use circuit_runner::{
    run_scenario, Direction, Scenario, SimClock, Simulation, SimulationConfig, Step,
};
use circuit_switch::SendOutcome;

const NOW_MS: u64 = 1_700_000_000_000;

fn simulation() -> Simulation {
    let clock = SimClock::Manual(ManualClock::synchronized_at(NOW_MS));
    Simulation::new(SimulationConfig::default(), clock).expect("Failed to build simulation")
}

fn ready_simulation() -> Simulation {
    let mut sim = simulation();
    sim.set_link(true);
    sim.switch().set(CircuitState::On, 100).unwrap();
    sim.pump().unwrap();
    assert_eq!(sim.switch().binding_state(), BindingState::Ready);
    sim
}

// ============================================================================
// Scenario Tests
// ============================================================================

#[test]
fn test_builtin_scenario() {
    let report = run_scenario(&Scenario::builtin(), SimClock::manual_now())
        .expect("Built-in scenario failed");

    assert_eq!(report.controller.light.state(), CircuitState::On);
    assert_eq!(report.controller.light.level(), 75);
    assert_eq!(report.controller.version, 2);
    assert_eq!(report.controller.commands_applied, 1);
    assert_eq!(report.switch.commands_sent, 1);
    assert!(!report.switch.desired.change_pending());
    assert_eq!(report.switch.last_confirmed_version, Some(2));
    assert_eq!(report.controller.snapshot_hex, "1524010124024b18");

    // One command out, one response back.
    assert_eq!(report.messages.len(), 2);
    assert_eq!(report.messages[0].direction, Direction::ToController);
    assert_eq!(report.messages[1].direction, Direction::ToSwitch);
}

#[test]
fn test_link_loss_scenario_file() {
    // Integration tests run from the crate directory, so go up to the workspace
    let path = Path::new("../../scenarios/link_loss.yaml");
    let scenario = Scenario::load(path).expect("Failed to load scenario");
    assert_eq!(scenario.name, "link loss");
    assert_eq!(scenario.simulation.controller.name, "Porch");

    let report = run_scenario(&scenario, SimClock::manual_now()).expect("Scenario failed");
    assert_eq!(report.controller.commands_applied, 3);
    assert_eq!(report.controller.commands_rejected, 2);
    assert_eq!(report.switch.send_failures, 1);
    assert!(report.messages.iter().any(|m| m.dropped));
}

#[test]
fn test_scenario_report_serialises() {
    let report = run_scenario(&Scenario::builtin(), SimClock::manual_now()).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["controller"]["light"]["state"], "ON");
    assert_eq!(json["controller"]["light"]["level"], 75);
    assert_eq!(json["switch"]["binding_state"], "Ready");
    assert_eq!(json["messages"][0]["direction"], "to_controller");
}

// ============================================================================
// Switch / Controller Properties
// ============================================================================

#[test]
fn test_set_while_not_ready_sends_latest_once() {
    let mut sim = simulation();
    assert_eq!(sim.switch().set(CircuitState::On, 20).unwrap(), SendOutcome::Queued);
    assert_eq!(sim.switch().set(CircuitState::On, 60).unwrap(), SendOutcome::Queued);
    assert!(sim.switch().change_pending());
    assert_eq!(sim.network().log().count(Direction::ToController), 0);

    sim.pump().unwrap();

    assert_eq!(sim.network().log().count(Direction::ToController), 1);
    assert_eq!(sim.controller().commands_applied(), 1);
    assert_eq!(sim.controller().level(), 60);
    assert!(!sim.switch().change_pending());
}

#[test]
fn test_identical_set_transmits_once() {
    let mut sim = ready_simulation();
    let before = sim.network().log().count(Direction::ToController);

    sim.switch().set(CircuitState::Off, 40).unwrap();
    assert_eq!(
        sim.switch().set(CircuitState::Off, 40).unwrap(),
        SendOutcome::Suppressed
    );
    sim.pump().unwrap();

    assert_eq!(sim.network().log().count(Direction::ToController), before + 1);
    assert_eq!(sim.controller().state(), CircuitState::Off);
    assert_eq!(sim.controller().level(), 40);
}

#[test]
fn test_every_change_is_notified() {
    let mut sim = ready_simulation();
    sim.switch().toggle();
    sim.pump().unwrap();
    sim.controller_mut().toggle();
    sim.controller_mut().run_notifications();

    let engine = sim.controller().publisher();
    assert_eq!(
        engine.published(),
        &[(0, TraitSource::CircuitState), (0, TraitSource::CircuitControl)]
    );
    // Initial set, remote toggle and local toggle.
    assert_eq!(engine.dirty_marks(), 3);
    assert_eq!(engine.delivered().len(), 3);
    assert!(engine
        .delivered()
        .iter()
        .all(|n| n.property == PropertyHandle::Root && n.source == TraitSource::CircuitState));
    assert_eq!(sim.controller().version(), 4);
}

#[test]
fn test_link_loss_replays_latest_change() {
    let mut sim = ready_simulation();
    sim.set_link(false);

    // The binding still looks ready, so this goes out and times out.
    assert!(matches!(
        sim.switch().set(CircuitState::On, 30).unwrap(),
        SendOutcome::Sent(_)
    ));
    sim.pump().unwrap();
    assert!(sim.switch().change_pending());
    assert_eq!(sim.switch().binding_state(), BindingState::Failed);
    assert!(sim.switch().in_flight().is_none());

    // A newer change replaces the pending one; the prepare fails while the link is down.
    assert_eq!(sim.switch().set(CircuitState::On, 45).unwrap(), SendOutcome::Queued);
    sim.pump().unwrap();
    assert_eq!(sim.switch().binding_state(), BindingState::Failed);
    assert_eq!(sim.controller().level(), 100);

    sim.set_link(true);
    sim.pump().unwrap();
    assert_eq!(sim.switch().binding_state(), BindingState::Ready);
    assert!(!sim.switch().change_pending());
    assert_eq!(sim.controller().level(), 45);
    assert_eq!(sim.controller().commands_applied(), 2);
}

#[test]
fn test_rejections_leave_light_unchanged() {
    let mut sim = ready_simulation();
    let steps = [
        Step::Command {
            state: Some(CircuitState::Off),
            level: Some(10),
            expires_in_ms: Some(-1),
            must_be_version: None,
        },
        Step::Pump,
    ];
    for (i, step) in steps.iter().enumerate() {
        sim.run_step(i + 1, step).unwrap();
    }
    assert_eq!(sim.last_status(), Some(StatusCode::REQUEST_EXPIRED_IN_TIME));

    sim.run_step(
        3,
        &Step::Command {
            state: Some(CircuitState::Off),
            level: Some(10),
            expires_in_ms: None,
            must_be_version: Some(99),
        },
    )
    .unwrap();
    sim.pump().unwrap();
    assert_eq!(sim.last_status(), Some(StatusCode::VERSION_MISMATCH));

    sim.run_step(
        4,
        &Step::Command {
            state: None,
            level: Some(101),
            expires_in_ms: None,
            must_be_version: None,
        },
    )
    .unwrap();
    sim.pump().unwrap();
    assert_eq!(sim.last_status(), Some(StatusCode::BAD_REQUEST));

    assert_eq!(sim.controller().state(), CircuitState::On);
    assert_eq!(sim.controller().level(), 100);
    assert_eq!(sim.controller().version(), 2);
    assert_eq!(sim.controller().commands_rejected(), 3);
}

#[test]
fn test_expiry_follows_simulated_clock() {
    let mut sim = ready_simulation();
    sim.run_step(
        1,
        &Step::Command {
            state: Some(CircuitState::Off),
            level: None,
            expires_in_ms: Some(50),
            must_be_version: None,
        },
    )
    .unwrap();
    sim.run_step(2, &Step::AdvanceClock { ms: 50 }).unwrap();
    sim.pump().unwrap();
    assert_eq!(sim.last_status(), Some(StatusCode::REQUEST_EXPIRED_IN_TIME));
    assert_eq!(sim.controller().state(), CircuitState::On);
}

#[test]
fn test_ui_toggle_from_another_thread() {
    let mut sim = ready_simulation();
    sim.run_step(1, &Step::UiToggle).unwrap();
    sim.pump().unwrap();
    assert_eq!(sim.controller().state(), CircuitState::Off);
    assert_eq!(sim.switch().state(), CircuitState::Off);
}
