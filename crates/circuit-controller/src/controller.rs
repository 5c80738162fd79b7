//! The light controller.

use circuit_common::{Clock, Publisher};
use circuit_metrics::{metric_defs, MetricLabels};
use circuit_protocol::{CircuitState, PropertyHandle, TraitSource};
use tracing::{debug, info};

use crate::config::ControllerConfig;
use crate::error::{ControllerError, ControllerResult};
use crate::light::{CircuitOutput, LightModel, LightState};
use crate::publication::{ControlTraitSource, StateTraitSource};

/// Where a state change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A SetLogicalCircuitState command.
    Remote,
    /// On-device input.
    Local,
}

impl ChangeOrigin {
    fn as_str(self) -> &'static str {
        match self {
            ChangeOrigin::Remote => "remote",
            ChangeOrigin::Local => "local",
        }
    }
}

/// Owns the light state and publishes it.
///
/// Both traits are published when the controller is created. Every change to the
/// light goes through [`LightController::change_state`], which marks the state trait
/// dirty exactly once.
pub struct LightController<P: Publisher, C: Clock> {
    pub(crate) config: ControllerConfig,
    pub(crate) model: LightModel,
    pub(crate) state_source: StateTraitSource,
    control_source: ControlTraitSource,
    publisher: P,
    pub(crate) clock: C,
    pub(crate) labels: MetricLabels,

    // Statistics
    pub(crate) commands_applied: u32,
    pub(crate) commands_rejected: u32,
    pub(crate) reply_failures: u32,
}

impl<P: Publisher, C: Clock> LightController<P, C> {
    /// Create a controller and publish its traits.
    pub fn new(config: ControllerConfig, mut publisher: P, clock: C) -> ControllerResult<Self> {
        let initial = LightState::new(config.initial_state, config.initial_level)?;

        let state_handle = publisher.publish_trait(config.instance_id, TraitSource::CircuitState)?;
        let control_handle =
            publisher.publish_trait(config.instance_id, TraitSource::CircuitControl)?;

        debug!(
            "LightController[{}]: Published traits on instance {} ({}, version {})",
            config.name, config.instance_id, initial, config.initial_version
        );

        let labels = MetricLabels::new(config.name.clone(), "controller");
        Ok(LightController {
            model: LightModel::new(initial),
            state_source: StateTraitSource::new(state_handle, config.initial_version),
            control_source: ControlTraitSource::new(control_handle),
            publisher,
            clock,
            labels,
            config,
            commands_applied: 0,
            commands_rejected: 0,
            reply_failures: 0,
        })
    }

    /// Attach the output line the light is wired to.
    pub fn attach_output(&mut self, output: Box<dyn CircuitOutput>) {
        self.model.attach_output(output);
    }

    /// Get the configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Current light state.
    pub fn light(&self) -> LightState {
        self.model.current()
    }

    /// Current circuit state.
    pub fn state(&self) -> CircuitState {
        self.model.current().state()
    }

    /// Current level.
    pub fn level(&self) -> u8 {
        self.model.current().level()
    }

    /// Publication version of the state trait.
    pub fn version(&self) -> u64 {
        self.state_source.version()
    }

    /// Data source of the state trait.
    pub fn state_source(&self) -> &StateTraitSource {
        &self.state_source
    }

    /// Data source of the control trait.
    pub fn control_source(&self) -> &ControlTraitSource {
        &self.control_source
    }

    /// The publisher the traits are published on.
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Mutable access to the publisher.
    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }

    /// Commands applied so far.
    pub fn commands_applied(&self) -> u32 {
        self.commands_applied
    }

    /// Commands rejected so far.
    pub fn commands_rejected(&self) -> u32 {
        self.commands_rejected
    }

    /// Replies that could not be sent.
    pub fn reply_failures(&self) -> u32 {
        self.reply_failures
    }

    /// Set the light from on-device input. Only ON and OFF may be set.
    pub fn set(&mut self, state: CircuitState, level: u8) -> ControllerResult<LightState> {
        if !state.is_commandable() {
            return Err(ControllerError::InvalidState(state));
        }
        let next = LightState::new(state, level)?;
        Ok(self.change_state(next, ChangeOrigin::Local))
    }

    /// Flip between ON and OFF, keeping the level. Does nothing while INCONSISTENT.
    pub fn toggle(&mut self) -> Option<LightState> {
        match self.model.toggled() {
            Some(next) => Some(self.change_state(next, ChangeOrigin::Local)),
            None => {
                debug!(
                    "LightController[{}]: Toggle ignored while circuit is {}",
                    self.config.name,
                    self.state()
                );
                None
            }
        }
    }

    /// Apply `next` and mark the state trait dirty, even when nothing changed.
    pub(crate) fn change_state(&mut self, next: LightState, origin: ChangeOrigin) -> LightState {
        self.model.apply(next);
        self.state_source
            .set_dirty(&mut self.publisher, PropertyHandle::Root);

        info!(
            "LightController[{}]: Light state changed to {} ({})",
            self.config.name,
            next,
            origin.as_str()
        );
        metrics::counter!(
            metric_defs::CONTROLLER_STATE_CHANGES.name,
            &self.labels.with(&[("origin", origin.as_str().to_string())])
        )
        .increment(1);
        metrics::gauge!(metric_defs::CONTROLLER_LEVEL.name, &self.labels.to_labels())
            .set(next.level() as f64);

        next
    }

    /// Deliver pending notifications for the published traits.
    pub fn run_notifications(&mut self) {
        self.publisher.run_notification_engine();
    }
}

/// Create a light controller.
pub fn create_light_controller<P: Publisher, C: Clock>(
    config: ControllerConfig,
    publisher: P,
    clock: C,
) -> ControllerResult<LightController<P, C>> {
    LightController::new(config, publisher, clock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingPublisher;
    use circuit_common::{ManualClock, PublishError};

    fn controller() -> LightController<RecordingPublisher, ManualClock> {
        create_light_controller(
            ControllerConfig::default(),
            RecordingPublisher::default(),
            ManualClock::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_publishes_both_traits() {
        let controller = controller();
        assert_eq!(
            controller.publisher().published,
            vec![(0, TraitSource::CircuitState), (0, TraitSource::CircuitControl)]
        );
        assert_ne!(controller.state_source().handle(), controller.control_source().handle());
        assert_eq!(controller.light(), LightState::new(CircuitState::Off, 100).unwrap());
    }

    #[test]
    fn test_publish_failure() {
        let publisher = RecordingPublisher {
            refuse: true,
            ..RecordingPublisher::default()
        };
        let result = LightController::new(ControllerConfig::default(), publisher, ManualClock::new());
        assert!(matches!(
            result,
            Err(ControllerError::Publish(PublishError::TableFull { .. }))
        ));
    }

    #[test]
    fn test_invalid_initial_level() {
        let config = ControllerConfig {
            initial_level: 150,
            ..ControllerConfig::default()
        };
        let result = LightController::new(config, RecordingPublisher::default(), ManualClock::new());
        assert!(matches!(result, Err(ControllerError::InvalidLevel(150))));
    }

    #[test]
    fn test_local_set() {
        let mut controller = controller();
        let light = controller.set(CircuitState::On, 40).unwrap();
        assert_eq!(light.level(), 40);
        assert_eq!(controller.version(), 2);
        assert_eq!(controller.publisher().dirty.len(), 1);

        assert_eq!(
            controller.set(CircuitState::Inconsistent, 40),
            Err(ControllerError::InvalidState(CircuitState::Inconsistent))
        );
        assert_eq!(controller.set(CircuitState::On, 101), Err(ControllerError::InvalidLevel(101)));
        assert_eq!(controller.version(), 2);
    }

    #[test]
    fn test_local_toggle() {
        let mut controller = controller();
        controller.set(CircuitState::On, 60).unwrap();
        let light = controller.toggle().unwrap();
        assert_eq!(light.state(), CircuitState::Off);
        assert_eq!(light.level(), 60);
    }

    #[test]
    fn test_toggle_while_inconsistent() {
        let config = ControllerConfig {
            initial_state: CircuitState::Inconsistent,
            ..ControllerConfig::default()
        };
        let mut controller =
            LightController::new(config, RecordingPublisher::default(), ManualClock::new()).unwrap();
        assert!(controller.toggle().is_none());
        assert!(controller.publisher().dirty.is_empty());
        assert_eq!(controller.version(), 1);
    }

    #[test]
    fn test_run_notifications() {
        let mut controller = controller();
        controller.run_notifications();
        assert_eq!(controller.publisher().engine_runs, 1);
    }
}
