//! Processing of SetLogicalCircuitState commands.
//!
//! Checks run in a fixed order and the first failure decides the status report:
//!
//! 1. command type (and target trait) → Common `UnsupportedMessage`
//! 2. expiry time → WDM `RequestExpiredInTime`
//! 3. must-be version → WDM `VersionMismatch`
//! 4. argument decoding → Common `BadRequest`
//! 5. resulting state must be ON or OFF → Common `BadRequest`
//!
//! A command that passes is applied and answered with the new trait version.

use std::fmt;

use circuit_common::{Clock, ClockError, CommandResponder, InboundCommand, Publisher};
use circuit_metrics::metric_defs;
use circuit_protocol::{
    CircuitState, CommandEnvelope, CommandReply, ProtocolError, SetCircuitStateArgs, StatusCode,
    TraitPath, LOGICAL_CIRCUIT_CONTROL_TRAIT_ID, MSG_TYPE_CUSTOM_COMMAND_REQUEST,
    MSG_TYPE_ONE_WAY_COMMAND, SET_LOGICAL_CIRCUIT_STATE_REQUEST_ID,
};
use tracing::{debug, warn};

use crate::controller::{ChangeOrigin, LightController};
use crate::light::LightState;

// ============================================================================
// Outcomes
// ============================================================================

/// Why a command was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The message type does not carry a command.
    UnsupportedMessageType(u8),
    /// The command addresses a trait instance this controller does not serve.
    UnknownTarget(TraitPath),
    /// The command type is not SetLogicalCircuitState.
    UnsupportedCommand(u64),
    /// The expiry time has passed.
    Expired {
        /// Current time in milliseconds.
        now_ms: u64,
        /// Expiry time in microseconds.
        expiry_time_us: i64,
    },
    /// An expiry time was given but the clock is not synchronised.
    ClockNotSynchronized,
    /// The clock failed for another reason.
    ClockFailure(ClockError),
    /// The trait is not at the required version.
    VersionMismatch {
        /// Version the command required.
        required: u64,
        /// Current version.
        current: u64,
    },
    /// The command could not be decoded.
    Malformed(ProtocolError),
    /// The resulting circuit state cannot be applied.
    InvalidState(CircuitState),
}

impl RejectReason {
    /// Status code reported for this reason.
    pub fn status(&self) -> StatusCode {
        match self {
            RejectReason::UnsupportedMessageType(_)
            | RejectReason::UnknownTarget(_)
            | RejectReason::UnsupportedCommand(_) => StatusCode::UNSUPPORTED_MESSAGE,
            RejectReason::Expired { .. } | RejectReason::ClockNotSynchronized => {
                StatusCode::REQUEST_EXPIRED_IN_TIME
            }
            RejectReason::ClockFailure(_) => StatusCode::INTERNAL_ERROR,
            RejectReason::VersionMismatch { .. } => StatusCode::VERSION_MISMATCH,
            RejectReason::Malformed(_) | RejectReason::InvalidState(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnsupportedMessageType(t) => write!(f, "message type 0x{:02X} is not a command", t),
            RejectReason::UnknownTarget(path) => write!(
                f,
                "no trait 0x{:08X} instance {}",
                path.profile_id, path.instance_id
            ),
            RejectReason::UnsupportedCommand(t) => write!(f, "unsupported command type {}", t),
            RejectReason::Expired { now_ms, expiry_time_us } => {
                write!(f, "expired at {} us, now {} ms", expiry_time_us, now_ms)
            }
            RejectReason::ClockNotSynchronized => write!(f, "expiry given but clock not synchronised"),
            RejectReason::ClockFailure(err) => write!(f, "clock failure: {}", err),
            RejectReason::VersionMismatch { required, current } => {
                write!(f, "version {} required, at {}", required, current)
            }
            RejectReason::Malformed(err) => write!(f, "{}", err),
            RejectReason::InvalidState(state) => write!(f, "cannot set state {}", state),
        }
    }
}

/// A rejected command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Status reported to the originator.
    pub status: StatusCode,
    /// Local detail.
    pub reason: RejectReason,
}

impl From<RejectReason> for Rejection {
    fn from(reason: RejectReason) -> Self {
        Rejection {
            status: reason.status(),
            reason,
        }
    }
}

/// Result of processing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command was applied.
    Applied {
        /// State trait version after the change.
        version: u64,
        /// Light state after the change.
        light: LightState,
    },
    /// The command was rejected; the light is unchanged.
    Rejected(Rejection),
}

impl CommandOutcome {
    /// The reply that answers this outcome.
    pub fn reply(&self) -> CommandReply {
        match self {
            CommandOutcome::Applied { version, .. } => CommandReply::Response { version: *version },
            CommandOutcome::Rejected(rejection) => CommandReply::StatusReport(rejection.status),
        }
    }

    /// Whether the command was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, CommandOutcome::Applied { .. })
    }
}

// ============================================================================
// Processing
// ============================================================================

impl<P: Publisher, C: Clock> LightController<P, C> {
    /// Process one inbound command and answer it through `responder`.
    ///
    /// Exactly one reply is sent, consuming the responder. The command payload is
    /// released when this returns, whatever the outcome.
    pub fn handle_command<R: CommandResponder>(
        &mut self,
        command: InboundCommand,
        responder: R,
    ) -> CommandOutcome {
        debug!(
            "LightController[{}]: Command from {} ({} bytes)",
            self.config.name,
            command.source,
            command.payload.len()
        );

        let outcome = match self.evaluate(&command) {
            Ok(next) => {
                let light = self.change_state(next, ChangeOrigin::Remote);
                self.commands_applied += 1;
                metrics::counter!(
                    metric_defs::CONTROLLER_COMMANDS_APPLIED.name,
                    &self.labels.to_labels()
                )
                .increment(1);
                CommandOutcome::Applied {
                    version: self.state_source.version(),
                    light,
                }
            }
            Err(rejection) => {
                self.commands_rejected += 1;
                warn!(
                    "LightController[{}]: Rejected command from {}: {} -> {}",
                    self.config.name, command.source, rejection.reason, rejection.status
                );
                metrics::counter!(
                    metric_defs::CONTROLLER_COMMANDS_REJECTED.name,
                    &self.labels.with(&[("status", rejection.status.name().to_string())])
                )
                .increment(1);
                CommandOutcome::Rejected(rejection)
            }
        };

        if let Err(err) = responder.send_reply(outcome.reply()) {
            self.reply_failures += 1;
            warn!(
                "LightController[{}]: Failed to reply to {}: {}",
                self.config.name, command.source, err
            );
        }

        outcome
    }

    /// Run every check and return the state the command asks for.
    fn evaluate(&self, command: &InboundCommand) -> Result<LightState, Rejection> {
        if !matches!(
            command.msg_type,
            MSG_TYPE_ONE_WAY_COMMAND | MSG_TYPE_CUSTOM_COMMAND_REQUEST
        ) {
            return Err(RejectReason::UnsupportedMessageType(command.msg_type).into());
        }

        let envelope = CommandEnvelope::decode(&command.payload)
            .map_err(|err| Rejection::from(RejectReason::Malformed(err)))?;

        let served = TraitPath {
            profile_id: LOGICAL_CIRCUIT_CONTROL_TRAIT_ID,
            instance_id: self.config.instance_id,
        };
        if envelope.path != served {
            return Err(RejectReason::UnknownTarget(envelope.path).into());
        }
        if envelope.command_type != SET_LOGICAL_CIRCUIT_STATE_REQUEST_ID as u64 {
            return Err(RejectReason::UnsupportedCommand(envelope.command_type).into());
        }

        if let Some(expiry_time_us) = envelope.expiry_time_us {
            self.check_expiry(expiry_time_us)?;
        }

        if let Some(required) = envelope.must_be_version {
            let current = self.state_source.version();
            if required != current {
                return Err(RejectReason::VersionMismatch { required, current }.into());
            }
        }

        let args = envelope
            .argument
            .ok_or(ProtocolError::MissingField("argument"))
            .and_then(SetCircuitStateArgs::decode)
            .map_err(|err| Rejection::from(RejectReason::Malformed(err)))?;

        let current = self.model.current();
        let state = args.state.unwrap_or(current.state());
        let level = args.level.unwrap_or(current.level());
        if !state.is_commandable() {
            return Err(RejectReason::InvalidState(state).into());
        }
        LightState::new(state, level)
            .map_err(|_| Rejection::from(RejectReason::Malformed(ProtocolError::OutOfRange {
                field: "level",
                value: level as i128,
            })))
    }

    fn check_expiry(&self, expiry_time_us: i64) -> Result<(), Rejection> {
        match self.clock.real_time_ms() {
            Ok(now_ms) => {
                if now_ms as i128 * 1000 >= expiry_time_us as i128 {
                    Err(RejectReason::Expired { now_ms, expiry_time_us }.into())
                } else {
                    Ok(())
                }
            }
            Err(ClockError::NotSynchronized) => Err(RejectReason::ClockNotSynchronized.into()),
            Err(err) => {
                debug!(
                    "LightController[{}]: Clock unavailable while checking expiry: {}",
                    self.config.name, err
                );
                Err(RejectReason::ClockFailure(err).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::test_support::{RecordingPublisher, ReplySink};
    use bytes::Bytes;
    use circuit_common::{ManualClock, NodeId};
    use circuit_protocol::{CommandRequest, PropertyHandle};
    use circuit_tlv::{ContainerType, Tag, TlvWriter};

    const NOW_MS: u64 = 1_700_000_000_000;

    fn controller() -> LightController<RecordingPublisher, ManualClock> {
        LightController::new(
            ControllerConfig::default(),
            RecordingPublisher::default(),
            ManualClock::synchronized_at(NOW_MS),
        )
        .unwrap()
    }

    fn inbound(payload: Bytes) -> InboundCommand {
        InboundCommand {
            source: NodeId(0x51),
            msg_type: MSG_TYPE_ONE_WAY_COMMAND,
            payload,
        }
    }

    fn set_request(state: CircuitState, level: u8) -> CommandRequest {
        CommandRequest::set_circuit_state(SetCircuitStateArgs::new(state, level))
    }

    fn rejected_with(outcome: &CommandOutcome) -> StatusCode {
        match outcome {
            CommandOutcome::Rejected(rejection) => rejection.status,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_and_respond_with_version() {
        let mut controller = controller();
        let sink = ReplySink::default();
        let payload = set_request(CircuitState::On, 75).encode().unwrap();

        let outcome = controller.handle_command(inbound(payload), sink.responder());

        assert!(outcome.is_applied());
        assert_eq!(controller.state(), CircuitState::On);
        assert_eq!(controller.level(), 75);
        assert_eq!(controller.version(), 2);
        assert_eq!(sink.replies(), vec![CommandReply::Response { version: 2 }]);
        assert_eq!(
            controller.publisher().dirty,
            vec![(controller.state_source().handle(), PropertyHandle::Root)]
        );
        assert_eq!(controller.commands_applied(), 1);
    }

    #[test]
    fn test_identical_command_still_marks_dirty() {
        let mut controller = controller();
        let sink = ReplySink::default();
        for _ in 0..2 {
            let payload = set_request(CircuitState::Off, 100).encode().unwrap();
            controller.handle_command(inbound(payload), sink.responder());
        }
        assert_eq!(controller.publisher().dirty.len(), 2);
        assert_eq!(sink.replies().len(), 2);
    }

    #[test]
    fn test_unsupported_command_type() {
        let mut controller = controller();
        let sink = ReplySink::default();
        let mut request = set_request(CircuitState::On, 10);
        request.command_type = 2;

        let outcome = controller.handle_command(inbound(request.encode().unwrap()), sink.responder());

        assert_eq!(rejected_with(&outcome), StatusCode::UNSUPPORTED_MESSAGE);
        assert_eq!(sink.replies(), vec![CommandReply::StatusReport(StatusCode::UNSUPPORTED_MESSAGE)]);
        assert_eq!(controller.state(), CircuitState::Off);
        assert!(controller.publisher().dirty.is_empty());
    }

    #[test]
    fn test_wrong_message_type() {
        let mut controller = controller();
        let sink = ReplySink::default();
        let mut command = inbound(set_request(CircuitState::On, 10).encode().unwrap());
        command.msg_type = 0x01;

        let outcome = controller.handle_command(command, sink.responder());
        assert_eq!(rejected_with(&outcome), StatusCode::UNSUPPORTED_MESSAGE);
    }

    #[test]
    fn test_expired_command() {
        let mut controller = controller();
        let sink = ReplySink::default();
        let expiry_us = (NOW_MS as i64) * 1000;
        let payload = set_request(CircuitState::On, 10).with_expiry(expiry_us).encode().unwrap();

        let outcome = controller.handle_command(inbound(payload), sink.responder());

        assert_eq!(rejected_with(&outcome), StatusCode::REQUEST_EXPIRED_IN_TIME);
        assert_eq!(controller.state(), CircuitState::Off);
        assert_eq!(controller.version(), 1);
    }

    #[test]
    fn test_future_expiry_is_accepted() {
        let mut controller = controller();
        let sink = ReplySink::default();
        let expiry_us = (NOW_MS as i64 + 5_000) * 1000;
        let payload = set_request(CircuitState::On, 10).with_expiry(expiry_us).encode().unwrap();

        assert!(controller.handle_command(inbound(payload), sink.responder()).is_applied());
    }

    #[test]
    fn test_expiry_without_synchronised_clock() {
        let clock = ManualClock::new();
        let mut controller =
            LightController::new(ControllerConfig::default(), RecordingPublisher::default(), clock)
                .unwrap();
        let sink = ReplySink::default();
        let payload = set_request(CircuitState::On, 10).with_expiry(i64::MAX).encode().unwrap();

        let outcome = controller.handle_command(inbound(payload), sink.responder());
        assert_eq!(rejected_with(&outcome), StatusCode::REQUEST_EXPIRED_IN_TIME);
    }

    #[test]
    fn test_version_mismatch() {
        let mut controller = controller();
        let sink = ReplySink::default();
        let payload = set_request(CircuitState::On, 10)
            .with_must_be_version(7)
            .encode()
            .unwrap();

        let outcome = controller.handle_command(inbound(payload), sink.responder());

        assert_eq!(rejected_with(&outcome), StatusCode::VERSION_MISMATCH);
        assert_eq!(controller.state(), CircuitState::Off);
    }

    #[test]
    fn test_matching_version_is_accepted() {
        let mut controller = controller();
        let sink = ReplySink::default();
        let payload = set_request(CircuitState::On, 10)
            .with_must_be_version(1)
            .encode()
            .unwrap();
        assert!(controller.handle_command(inbound(payload), sink.responder()).is_applied());
    }

    #[test]
    fn test_expiry_checked_before_version() {
        let mut controller = controller();
        let sink = ReplySink::default();
        let payload = set_request(CircuitState::On, 10)
            .with_expiry(0)
            .with_must_be_version(99)
            .encode()
            .unwrap();
        let outcome = controller.handle_command(inbound(payload), sink.responder());
        assert_eq!(rejected_with(&outcome), StatusCode::REQUEST_EXPIRED_IN_TIME);
    }

    #[test]
    fn test_level_out_of_range() {
        let mut controller = controller();
        let sink = ReplySink::default();
        let payload = set_request(CircuitState::On, 101).encode().unwrap();

        let outcome = controller.handle_command(inbound(payload), sink.responder());

        match outcome {
            CommandOutcome::Rejected(Rejection {
                status,
                reason: RejectReason::Malformed(ProtocolError::OutOfRange { field, value }),
            }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(field, "level");
                assert_eq!(value, 101);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(controller.light(), LightState::new(CircuitState::Off, 100).unwrap());
    }

    #[test]
    fn test_null_fields_keep_current_values() {
        let mut controller = controller();
        let sink = ReplySink::default();
        let request = CommandRequest::set_circuit_state(SetCircuitStateArgs {
            state: Some(CircuitState::On),
            level: None,
        });

        controller.handle_command(inbound(request.encode().unwrap()), sink.responder());

        assert_eq!(controller.light(), LightState::new(CircuitState::On, 100).unwrap());
    }

    #[test]
    fn test_null_state_while_inconsistent() {
        let config = ControllerConfig {
            initial_state: CircuitState::Inconsistent,
            ..ControllerConfig::default()
        };
        let mut controller = LightController::new(
            config,
            RecordingPublisher::default(),
            ManualClock::synchronized_at(NOW_MS),
        )
        .unwrap();
        let sink = ReplySink::default();
        let request = CommandRequest::set_circuit_state(SetCircuitStateArgs {
            state: None,
            level: Some(20),
        });

        let outcome = controller.handle_command(inbound(request.encode().unwrap()), sink.responder());
        assert_eq!(rejected_with(&outcome), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_missing_argument() {
        let mut w = TlvWriter::default();
        w.start_container(Tag::Anonymous, ContainerType::Structure).unwrap();
        w.start_container(Tag::Context(1), ContainerType::Path).unwrap();
        w.start_container(Tag::Context(1), ContainerType::Structure).unwrap();
        w.put_unsigned(Tag::Context(1), LOGICAL_CIRCUIT_CONTROL_TRAIT_ID as u64).unwrap();
        w.end_container().unwrap();
        w.end_container().unwrap();
        w.put_unsigned(Tag::Context(2), 1).unwrap();
        w.end_container().unwrap();

        let mut controller = controller();
        let sink = ReplySink::default();
        let outcome = controller.handle_command(inbound(w.finish().unwrap()), sink.responder());
        assert_eq!(rejected_with(&outcome), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_garbage_payload() {
        let mut controller = controller();
        let sink = ReplySink::default();
        let outcome = controller.handle_command(
            inbound(Bytes::from_static(&[0x15, 0x24])),
            sink.responder(),
        );
        assert_eq!(rejected_with(&outcome), StatusCode::BAD_REQUEST);
        assert_eq!(sink.replies().len(), 1);
    }

    #[test]
    fn test_reply_failure_keeps_applied_state() {
        let mut controller = controller();
        let sink = ReplySink::default();
        let payload = set_request(CircuitState::On, 50).encode().unwrap();

        let outcome = controller.handle_command(inbound(payload), sink.failing_responder());

        assert!(outcome.is_applied());
        assert_eq!(controller.reply_failures(), 1);
        assert_eq!(controller.level(), 50);
    }
}
