//! The light switch: binding state machine and command sender.

use circuit_common::{
    Binding, BindingConfig, BindingEvent, BindingFactory, BindingState, ExchangeEvent,
    ExchangeId, SecurityMode, TransportError,
};
use circuit_metrics::{metric_defs, MetricLabels};
use circuit_protocol::{
    CircuitState, CommandReply, CommandRequest, StatusCode, MAX_LEVEL, MSG_TYPE_ONE_WAY_COMMAND,
    PROFILE_WDM,
};
use tracing::{debug, info, trace, warn};

use crate::config::SwitchConfig;
use crate::desired::DesiredState;
use crate::error::{SwitchError, SwitchResult};

// ============================================================================
// Send Outcome
// ============================================================================

/// What a set or toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing changed, nothing was sent.
    Suppressed,
    /// The binding is not ready; the change is pending.
    Queued,
    /// The command was handed to the binding on this exchange.
    Sent(ExchangeId),
    /// Sending failed. The failure is logged and counted.
    Failed,
}

// ============================================================================
// Light Switch
// ============================================================================

/// A switch bound to one light controller.
///
/// At most one exchange is in flight. Starting a new send aborts it. Binding events
/// and exchange completions are fed in through [`LightSwitch::handle_binding_event`] and
/// [`LightSwitch::handle_exchange_event`].
pub struct LightSwitch<B: Binding> {
    config: SwitchConfig,
    binding: B,
    binding_state: BindingState,
    desired: DesiredState,
    in_flight: Option<ExchangeId>,
    last_confirmed_version: Option<u64>,
    last_rejection: Option<StatusCode>,
    labels: MetricLabels,

    // Statistics
    commands_sent: u32,
    send_failures: u32,
    acks_received: u32,
}

impl<B: Binding> LightSwitch<B> {
    /// Create a switch and its binding to the configured controller.
    pub fn new<F>(config: SwitchConfig, factory: &mut F) -> SwitchResult<Self>
    where
        F: BindingFactory<Binding = B>,
    {
        let desired = DesiredState::new(config.initial_level)?;
        let binding = factory.new_binding(config.controller_node_id)?;

        debug!(
            "LightSwitch[{}]: Bound to controller {}",
            config.name, config.controller_node_id
        );

        let labels = MetricLabels::new(config.name.clone(), "switch");
        Ok(LightSwitch {
            config,
            binding,
            binding_state: BindingState::Idle,
            desired,
            in_flight: None,
            last_confirmed_version: None,
            last_rejection: None,
            labels,
            commands_sent: 0,
            send_failures: 0,
            acks_received: 0,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }

    /// Desired circuit state.
    pub fn state(&self) -> CircuitState {
        self.desired.state()
    }

    /// Desired level.
    pub fn level(&self) -> u8 {
        self.desired.level()
    }

    /// Desired state including the pending flag.
    pub fn desired(&self) -> DesiredState {
        self.desired
    }

    /// Whether a change is waiting for the binding.
    pub fn change_pending(&self) -> bool {
        self.desired.change_pending()
    }

    /// Current binding state.
    pub fn binding_state(&self) -> BindingState {
        self.binding_state
    }

    /// Exchange the last command was sent on, until it completes.
    pub fn in_flight(&self) -> Option<ExchangeId> {
        self.in_flight
    }

    /// Trait version reported by the last successful reply.
    pub fn last_confirmed_version(&self) -> Option<u64> {
        self.last_confirmed_version
    }

    /// Status of the last rejected command.
    pub fn last_rejection(&self) -> Option<StatusCode> {
        self.last_rejection
    }

    /// Commands handed to the binding.
    pub fn commands_sent(&self) -> u32 {
        self.commands_sent
    }

    /// Sends that failed, synchronously or later.
    pub fn send_failures(&self) -> u32 {
        self.send_failures
    }

    /// Commands acknowledged by the controller.
    pub fn acks_received(&self) -> u32 {
        self.acks_received
    }

    /// The binding.
    pub fn binding(&self) -> &B {
        &self.binding
    }

    /// Mutable access to the binding.
    pub fn binding_mut(&mut self) -> &mut B {
        &mut self.binding
    }

    // ========================================================================
    // Sender
    // ========================================================================

    /// Ask for `(state, level)`. Does nothing when both already match.
    pub fn set(&mut self, state: CircuitState, level: u8) -> SwitchResult<SendOutcome> {
        if !state.is_commandable() {
            return Err(SwitchError::InvalidState(state));
        }
        if level > MAX_LEVEL {
            return Err(SwitchError::InvalidLevel(level));
        }

        if self.desired.matches(state, level) {
            trace!(
                "LightSwitch[{}]: Set {} level {} unchanged, not sending",
                self.config.name,
                state,
                level
            );
            metrics::counter!(
                metric_defs::SWITCH_SETS_SUPPRESSED.name,
                &self.labels.to_labels()
            )
            .increment(1);
            return Ok(SendOutcome::Suppressed);
        }

        self.desired.update(state, level);
        Ok(self.send_command())
    }

    /// Flip between ON and OFF and send, keeping the level.
    pub fn toggle(&mut self) -> SendOutcome {
        self.desired.toggle();
        self.send_command()
    }

    /// Send the desired state, or leave it pending until the binding is ready.
    pub fn send_command(&mut self) -> SendOutcome {
        if let Some(exchange) = self.in_flight.take() {
            debug!(
                "LightSwitch[{}]: Aborting in-flight exchange {}",
                self.config.name, exchange
            );
            self.binding.abort_exchange(exchange);
        }

        if self.binding_state != BindingState::Ready {
            if self.desired.mark_pending() {
                metrics::counter!(
                    metric_defs::SWITCH_CHANGES_COALESCED.name,
                    &self.labels.to_labels()
                )
                .increment(1);
            }
            debug!(
                "LightSwitch[{}]: Binding {}, holding {} level {}",
                self.config.name,
                self.binding_state,
                self.desired.state(),
                self.desired.level()
            );
            if self.binding_state != BindingState::Preparing {
                self.request_prepare();
            }
            return SendOutcome::Queued;
        }

        self.desired.clear_pending();
        match self.transmit() {
            Ok(exchange) => SendOutcome::Sent(exchange),
            Err(err) => {
                self.send_failures += 1;
                if matches!(err, SwitchError::Transport(_)) {
                    self.desired.mark_pending();
                }
                warn!(
                    "LightSwitch[{}]: Failed to send command: {}",
                    self.config.name, err
                );
                metrics::counter!(
                    metric_defs::SWITCH_SEND_FAILURES.name,
                    &self.labels.with(&[("reason", err.kind().to_string())])
                )
                .increment(1);
                SendOutcome::Failed
            }
        }
    }

    /// Open an exchange and send the desired state on it.
    fn transmit(&mut self) -> SwitchResult<ExchangeId> {
        let exchange = self.binding.new_exchange()?;

        let request = CommandRequest::set_circuit_state(self.desired.args());
        let payload = match request.encode() {
            Ok(payload) => payload,
            Err(err) => {
                self.binding.abort_exchange(exchange);
                return Err(err.into());
            }
        };

        if let Err(err) =
            self.binding
                .send_message(exchange, PROFILE_WDM, MSG_TYPE_ONE_WAY_COMMAND, payload)
        {
            self.binding.abort_exchange(exchange);
            return Err(err.into());
        }

        self.in_flight = Some(exchange);
        self.commands_sent += 1;
        info!(
            "LightSwitch[{}]: Sent {} level {} to {} on {}",
            self.config.name,
            self.desired.state(),
            self.desired.level(),
            self.config.controller_node_id,
            exchange
        );
        metrics::counter!(metric_defs::SWITCH_COMMANDS_SENT.name, &self.labels.to_labels())
            .increment(1);

        Ok(exchange)
    }

    // ========================================================================
    // Binding state machine
    // ========================================================================

    fn request_prepare(&mut self) {
        match self.binding.request_prepare() {
            Ok(()) => self.transition(BindingState::Preparing),
            Err(err) => {
                warn!(
                    "LightSwitch[{}]: Prepare request refused: {}",
                    self.config.name, err
                );
                self.transition(BindingState::Failed);
            }
        }
    }

    fn transition(&mut self, next: BindingState) {
        if self.binding_state == next {
            return;
        }
        debug!(
            "LightSwitch[{}]: Binding {} -> {}",
            self.config.name, self.binding_state, next
        );
        self.binding_state = next;
        metrics::counter!(
            metric_defs::SWITCH_BINDING_TRANSITIONS.name,
            &self.labels.with(&[("to", next.to_string())])
        )
        .increment(1);
    }

    /// Configuration the binding is prepared with.
    pub fn binding_config(&self) -> BindingConfig {
        let config = BindingConfig::new()
            .target_node(self.config.controller_node_id)
            .transport_reliable_udp(self.config.retry);
        match self.config.security {
            SecurityMode::None => config.security_none(),
        }
    }

    /// Handle a lifecycle event from the binding.
    ///
    /// A prepare error is returned to the binding after the state has moved to
    /// Failed. Events the switch does not act on go to the binding's default handler.
    pub fn handle_binding_event(&mut self, event: &BindingEvent) -> Result<(), TransportError> {
        trace!("LightSwitch[{}]: Binding event {}", self.config.name, event.name());
        match event {
            BindingEvent::PrepareRequested => {
                self.transition(BindingState::Preparing);
                let config = self.binding_config();
                if let Err(err) = self.binding.prepare(&config) {
                    warn!(
                        "LightSwitch[{}]: Failed to prepare binding: {}",
                        self.config.name, err
                    );
                    self.transition(BindingState::Failed);
                    return Err(err);
                }
                Ok(())
            }
            BindingEvent::BindingReady => {
                self.transition(BindingState::Ready);
                if self.desired.change_pending() {
                    self.send_command();
                }
                Ok(())
            }
            BindingEvent::PrepareFailed { reason } | BindingEvent::BindingFailed { reason } => {
                warn!(
                    "LightSwitch[{}]: {}: {}",
                    self.config.name,
                    event.name(),
                    reason
                );
                self.transition(BindingState::Failed);
                if let Some(exchange) = self.in_flight.take() {
                    self.binding.abort_exchange(exchange);
                    self.desired.mark_pending();
                }
                self.binding.default_event_handler(event);
                Ok(())
            }
            BindingEvent::ConnectionEstablished => {
                self.binding.default_event_handler(event);
                Ok(())
            }
        }
    }

    // ========================================================================
    // Exchange completions
    // ========================================================================

    /// Handle a completion for an exchange. Events for any exchange other than the
    /// in-flight one are ignored.
    pub fn handle_exchange_event(&mut self, event: ExchangeEvent) {
        if self.in_flight != Some(event.exchange()) {
            trace!(
                "LightSwitch[{}]: Ignoring event for stale exchange {}",
                self.config.name,
                event.exchange()
            );
            return;
        }
        self.in_flight = None;

        match event {
            ExchangeEvent::AckReceived(exchange) => {
                self.acks_received += 1;
                debug!("LightSwitch[{}]: {} acknowledged", self.config.name, exchange);
            }
            ExchangeEvent::SendError { exchange, error } => {
                self.send_failures += 1;
                self.desired.mark_pending();
                warn!(
                    "LightSwitch[{}]: Send on {} failed: {}",
                    self.config.name, exchange, error
                );
                metrics::counter!(
                    metric_defs::SWITCH_SEND_FAILURES.name,
                    &self.labels.with(&[("reason", "delivery".to_string())])
                )
                .increment(1);
            }
            ExchangeEvent::ReplyReceived {
                exchange,
                profile_id,
                msg_type,
                payload,
            } => {
                // A reply acknowledges the command.
                self.acks_received += 1;
                self.handle_reply(exchange, profile_id, msg_type, &payload);
            }
        }
    }

    fn handle_reply(&mut self, exchange: ExchangeId, profile_id: u32, msg_type: u8, payload: &[u8]) {
        let status = match CommandReply::decode(profile_id, msg_type, payload) {
            Ok(CommandReply::Response { version }) => {
                debug!(
                    "LightSwitch[{}]: Command on {} applied, version {}",
                    self.config.name, exchange, version
                );
                self.last_confirmed_version = Some(version);
                StatusCode::SUCCESS
            }
            Ok(CommandReply::StatusReport(status)) => {
                warn!(
                    "LightSwitch[{}]: Command on {} rejected: {}",
                    self.config.name, exchange, status
                );
                self.last_rejection = Some(status);
                status
            }
            Err(err) => {
                warn!(
                    "LightSwitch[{}]: Undecodable reply on {}: {}",
                    self.config.name, exchange, err
                );
                return;
            }
        };
        metrics::counter!(
            metric_defs::SWITCH_REPLIES.name,
            &self.labels.with(&[("status", status.name().to_string())])
        )
        .increment(1);
    }
}

/// Create a light switch.
pub fn create_light_switch<F: BindingFactory>(
    config: SwitchConfig,
    factory: &mut F,
) -> SwitchResult<LightSwitch<F::Binding>> {
    LightSwitch::new(config, factory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeBinding, FakeFactory};
    use circuit_common::{NodeId, RetryPolicy, TransportClass};
    use circuit_protocol::{CommandEnvelope, SetCircuitStateArgs};

    const CONTROLLER: NodeId = NodeId(0x18B4_3000_0000_0042);

    fn switch() -> LightSwitch<FakeBinding> {
        let config = SwitchConfig {
            controller_node_id: CONTROLLER,
            ..SwitchConfig::default()
        };
        create_light_switch(config, &mut FakeFactory::default()).unwrap()
    }

    fn ready_switch() -> LightSwitch<FakeBinding> {
        let mut switch = switch();
        switch.handle_binding_event(&BindingEvent::PrepareRequested).unwrap();
        switch.handle_binding_event(&BindingEvent::BindingReady).unwrap();
        switch
    }

    fn sent_args(switch: &LightSwitch<FakeBinding>, index: usize) -> SetCircuitStateArgs {
        let message = &switch.binding().sent[index];
        assert_eq!(message.profile_id, PROFILE_WDM);
        assert_eq!(message.msg_type, MSG_TYPE_ONE_WAY_COMMAND);
        let envelope = CommandEnvelope::decode(&message.payload).unwrap();
        SetCircuitStateArgs::decode(envelope.argument.unwrap()).unwrap()
    }

    #[test]
    fn test_new_switch() {
        let switch = switch();
        assert_eq!(switch.binding().target, Some(CONTROLLER));
        assert_eq!(switch.binding_state(), BindingState::Idle);
        assert_eq!(switch.state(), CircuitState::Off);
        assert_eq!(switch.level(), 100);
        assert!(!switch.change_pending());
        assert!(switch.in_flight().is_none());
    }

    #[test]
    fn test_factory_failure() {
        let result = LightSwitch::new(SwitchConfig::default(), &mut FakeFactory { refuse: true });
        assert!(matches!(
            result,
            Err(SwitchError::Transport(TransportError::NoMemory))
        ));
    }

    #[test]
    fn test_set_while_idle_queues() {
        let mut switch = switch();
        let outcome = switch.set(CircuitState::On, 75).unwrap();

        assert_eq!(outcome, SendOutcome::Queued);
        assert!(switch.change_pending());
        assert_eq!(switch.binding_state(), BindingState::Preparing);
        assert_eq!(switch.binding().prepare_requests, 1);
        assert!(switch.binding().sent.is_empty());
    }

    #[test]
    fn test_ready_flushes_latest_change() {
        let mut switch = switch();
        switch.set(CircuitState::On, 75).unwrap();
        switch.set(CircuitState::On, 50).unwrap();
        assert_eq!(switch.binding().prepare_requests, 1);

        switch.handle_binding_event(&BindingEvent::PrepareRequested).unwrap();
        assert_eq!(
            switch.binding().prepared_with,
            vec![BindingConfig {
                target: Some(CONTROLLER),
                transport: Some(TransportClass::ReliableUdp(RetryPolicy::default())),
                security: SecurityMode::None,
            }]
        );
        assert!(switch.binding().sent.is_empty());

        switch.handle_binding_event(&BindingEvent::BindingReady).unwrap();
        assert_eq!(switch.binding_state(), BindingState::Ready);
        assert_eq!(switch.binding().sent.len(), 1);
        assert_eq!(sent_args(&switch, 0), SetCircuitStateArgs::new(CircuitState::On, 50));
        assert!(!switch.change_pending());
        assert_eq!(switch.in_flight(), Some(switch.binding().sent[0].exchange));
        assert_eq!(switch.commands_sent(), 1);
    }

    #[test]
    fn test_ready_without_pending_sends_nothing() {
        let switch = ready_switch();
        assert!(switch.binding().sent.is_empty());
        assert_eq!(switch.binding_state(), BindingState::Ready);
    }

    #[test]
    fn test_identical_set_sends_once() {
        let mut switch = ready_switch();
        assert!(matches!(
            switch.set(CircuitState::On, 75).unwrap(),
            SendOutcome::Sent(_)
        ));
        assert_eq!(switch.set(CircuitState::On, 75).unwrap(), SendOutcome::Suppressed);
        assert_eq!(switch.binding().sent.len(), 1);
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let mut switch = ready_switch();
        assert_eq!(
            switch.set(CircuitState::Inconsistent, 10),
            Err(SwitchError::InvalidState(CircuitState::Inconsistent))
        );
        assert_eq!(switch.set(CircuitState::On, 101), Err(SwitchError::InvalidLevel(101)));
        assert_eq!(switch.state(), CircuitState::Off);
        assert!(switch.binding().sent.is_empty());
    }

    #[test]
    fn test_toggle_always_sends_and_aborts_previous() {
        let mut switch = ready_switch();
        let first = match switch.toggle() {
            SendOutcome::Sent(exchange) => exchange,
            other => panic!("expected send, got {:?}", other),
        };
        switch.toggle();

        assert_eq!(switch.binding().sent.len(), 2);
        assert_eq!(switch.binding().aborted, vec![first]);
        assert_eq!(sent_args(&switch, 0).state, Some(CircuitState::On));
        assert_eq!(sent_args(&switch, 1).state, Some(CircuitState::Off));
        assert_eq!(sent_args(&switch, 1).level, Some(100));
    }

    #[test]
    fn test_ack_clears_current_exchange_only() {
        let mut switch = ready_switch();
        switch.toggle();
        let current = switch.in_flight().unwrap();

        switch.handle_exchange_event(ExchangeEvent::AckReceived(ExchangeId(current.0 + 7)));
        assert_eq!(switch.in_flight(), Some(current));
        assert_eq!(switch.acks_received(), 0);

        switch.handle_exchange_event(ExchangeEvent::AckReceived(current));
        assert!(switch.in_flight().is_none());
        assert_eq!(switch.acks_received(), 1);
    }

    #[test]
    fn test_send_error_replays_on_ready() {
        let mut switch = ready_switch();
        switch.set(CircuitState::On, 30).unwrap();
        let exchange = switch.in_flight().unwrap();

        switch.handle_exchange_event(ExchangeEvent::SendError {
            exchange,
            error: TransportError::Timeout { retransmissions: 4 },
        });
        assert!(switch.in_flight().is_none());
        assert!(switch.change_pending());
        assert_eq!(switch.send_failures(), 1);
        assert_eq!(switch.binding_state(), BindingState::Ready);

        switch.handle_binding_event(&BindingEvent::BindingReady).unwrap();
        assert_eq!(switch.binding().sent.len(), 2);
        assert_eq!(sent_args(&switch, 1), SetCircuitStateArgs::new(CircuitState::On, 30));
        assert!(!switch.change_pending());
    }

    #[test]
    fn test_synchronous_send_failure() {
        let mut switch = ready_switch();
        switch.binding_mut().fail_send = Some(TransportError::LinkDown);

        assert_eq!(switch.set(CircuitState::On, 60).unwrap(), SendOutcome::Failed);
        assert_eq!(switch.binding().aborted, vec![ExchangeId(1)]);
        assert!(switch.in_flight().is_none());
        assert_eq!(switch.send_failures(), 1);
        assert_eq!(switch.state(), CircuitState::On);
        assert_eq!(switch.level(), 60);
        assert!(switch.change_pending());

        // The change goes out once the binding is ready again.
        switch.binding_mut().fail_send = None;
        switch.handle_binding_event(&BindingEvent::BindingReady).unwrap();
        assert!(!switch.change_pending());
        assert_eq!(switch.binding().sent.len(), 1);
        assert_eq!(sent_args(&switch, 0), SetCircuitStateArgs::new(CircuitState::On, 60));
        assert_eq!(switch.in_flight(), Some(ExchangeId(2)));
    }

    #[test]
    fn test_exchange_allocation_failure() {
        let mut switch = ready_switch();
        switch.binding_mut().fail_new_exchange = Some(TransportError::NoMemory);

        assert_eq!(switch.toggle(), SendOutcome::Failed);
        assert!(switch.binding().aborted.is_empty());
        assert_eq!(switch.state(), CircuitState::On);
    }

    #[test]
    fn test_prepare_failure() {
        let mut switch = switch();
        switch.binding_mut().fail_prepare = Some(TransportError::LinkDown);
        switch.set(CircuitState::On, 75).unwrap();

        let result = switch.handle_binding_event(&BindingEvent::PrepareRequested);
        assert_eq!(result, Err(TransportError::LinkDown));
        assert_eq!(switch.binding_state(), BindingState::Failed);
        assert!(switch.change_pending());

        switch.binding_mut().fail_prepare = None;
        switch.set(CircuitState::On, 80).unwrap();
        assert_eq!(switch.binding_state(), BindingState::Preparing);
        assert_eq!(switch.binding().prepare_requests, 2);
    }

    #[test]
    fn test_request_prepare_refused() {
        let mut switch = switch();
        switch.binding_mut().fail_request_prepare = Some(TransportError::NotReady);
        assert_eq!(switch.toggle(), SendOutcome::Queued);
        assert_eq!(switch.binding_state(), BindingState::Failed);
        assert!(switch.change_pending());
    }

    #[test]
    fn test_binding_failure_clears_exchange() {
        let mut switch = ready_switch();
        switch.toggle();
        let exchange = switch.in_flight().unwrap();

        let event = BindingEvent::BindingFailed {
            reason: TransportError::LinkDown,
        };
        switch.handle_binding_event(&event).unwrap();

        assert_eq!(switch.binding_state(), BindingState::Failed);
        assert!(switch.in_flight().is_none());
        assert_eq!(switch.binding().aborted, vec![exchange]);
        assert!(switch.change_pending());
        assert_eq!(switch.binding().defaulted, vec![event]);
    }

    #[test]
    fn test_other_events_go_to_default_handler() {
        let mut switch = switch();
        switch
            .handle_binding_event(&BindingEvent::ConnectionEstablished)
            .unwrap();
        assert_eq!(switch.binding().defaulted, vec![BindingEvent::ConnectionEstablished]);
        assert_eq!(switch.binding_state(), BindingState::Idle);
    }

    #[test]
    fn test_reply_handling() {
        let mut switch = ready_switch();
        switch.toggle();
        let exchange = switch.in_flight().unwrap();
        let reply = CommandReply::Response { version: 2 };
        let (profile_id, msg_type) = reply.message_type();
        switch.handle_exchange_event(ExchangeEvent::ReplyReceived {
            exchange,
            profile_id,
            msg_type,
            payload: reply.encode().unwrap(),
        });
        assert_eq!(switch.last_confirmed_version(), Some(2));
        assert!(switch.in_flight().is_none());

        switch.set(CircuitState::On, 5).unwrap();
        let exchange = switch.in_flight().unwrap();
        let reply = CommandReply::StatusReport(StatusCode::VERSION_MISMATCH);
        let (profile_id, msg_type) = reply.message_type();
        switch.handle_exchange_event(ExchangeEvent::ReplyReceived {
            exchange,
            profile_id,
            msg_type,
            payload: reply.encode().unwrap(),
        });
        assert_eq!(switch.last_rejection(), Some(StatusCode::VERSION_MISMATCH));
        assert_eq!(switch.last_confirmed_version(), Some(2));
        assert_eq!(switch.acks_received(), 2);
    }
}
