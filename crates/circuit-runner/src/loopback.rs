//! In-process transport between one switch and one light controller.
//!
//! Messages and events travel over unbounded channels and are only delivered when
//! the simulation pumps them, so every call on a [`LoopbackBinding`] returns
//! immediately and its outcome arrives later as an event, as with a real binding.
//!
//! The link can be taken down. While it is down, prepares fail and a sent message
//! times out, which also tears down the session. Restoring the link asks the switch
//! to prepare again.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use circuit_common::{
    Binding, BindingConfig, BindingEvent, BindingFactory, CommandResponder, ExchangeEvent,
    ExchangeId, InboundCommand, NodeId, RetryPolicy, TransportClass, TransportError,
};
use circuit_protocol::CommandReply;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace, warn};

// ============================================================================
// Deliveries
// ============================================================================

/// Something waiting to be handed to the switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchDelivery {
    /// Binding lifecycle event.
    Binding(BindingEvent),
    /// Exchange completion.
    Exchange(ExchangeEvent),
}

/// A command waiting to be handed to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerDelivery {
    /// Exchange to answer on. `None` for injected commands nobody waits for.
    pub exchange: Option<ExchangeId>,
    /// Profile id the command was sent with.
    pub profile_id: u32,
    /// The command.
    pub command: InboundCommand,
}

// ============================================================================
// Wire Log
// ============================================================================

/// Direction of a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Switch to controller.
    ToController,
    /// Controller to switch.
    ToSwitch,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToController => write!(f, "switch -> controller"),
            Direction::ToSwitch => write!(f, "controller -> switch"),
        }
    }
}

/// One message that crossed the loopback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireRecord {
    /// Which way it went.
    pub direction: Direction,
    /// Exchange it belonged to.
    pub exchange: Option<u32>,
    /// Profile id.
    pub profile_id: u32,
    /// Message type.
    pub msg_type: u8,
    /// Payload, hex encoded.
    pub payload_hex: String,
    /// Whether the message was lost on a down link.
    pub dropped: bool,
}

/// Shared record of every message sent over the loopback.
#[derive(Debug, Clone, Default)]
pub struct WireLog {
    records: Arc<Mutex<Vec<WireRecord>>>,
}

impl WireLog {
    fn record(
        &self,
        direction: Direction,
        exchange: Option<ExchangeId>,
        profile_id: u32,
        msg_type: u8,
        payload: &[u8],
        dropped: bool,
    ) {
        let payload_hex = hex::encode(payload);
        trace!(
            "Loopback: {} profile 0x{:08X} type 0x{:02X}{}: {}",
            direction,
            profile_id,
            msg_type,
            if dropped { " (dropped)" } else { "" },
            payload_hex
        );
        self.records.lock().push(WireRecord {
            direction,
            exchange: exchange.map(|e| e.0),
            profile_id,
            msg_type,
            payload_hex,
            dropped,
        });
    }

    /// Copy of every record so far.
    pub fn records(&self) -> Vec<WireRecord> {
        self.records.lock().clone()
    }

    /// Messages sent in `direction`, dropped ones included.
    pub fn count(&self, direction: Direction) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| r.direction == direction)
            .count()
    }
}

// ============================================================================
// Network
// ============================================================================

/// State shared by the network, its bindings and its responders.
#[derive(Debug, Clone)]
struct Shared {
    controller_node: NodeId,
    to_switch: Sender<SwitchDelivery>,
    to_controller: Sender<ControllerDelivery>,
    link_up: Arc<AtomicBool>,
    session_up: Arc<AtomicBool>,
    binding_created: Arc<AtomicBool>,
    open_exchanges: Arc<Mutex<HashSet<ExchangeId>>>,
    log: WireLog,
}

impl Shared {
    fn notify_switch(&self, delivery: SwitchDelivery) -> Result<(), TransportError> {
        self.to_switch
            .send(delivery)
            .map_err(|_| TransportError::LinkDown)
    }
}

/// Loopback connecting a switch to the controller on `controller_node`.
#[derive(Debug)]
pub struct LoopbackNetwork {
    shared: Shared,
    switch_rx: Receiver<SwitchDelivery>,
    controller_rx: Receiver<ControllerDelivery>,
}

impl LoopbackNetwork {
    /// Create a network with the link up.
    pub fn new(controller_node: NodeId) -> Self {
        let (to_switch, switch_rx) = unbounded();
        let (to_controller, controller_rx) = unbounded();
        LoopbackNetwork {
            shared: Shared {
                controller_node,
                to_switch,
                to_controller,
                link_up: Arc::new(AtomicBool::new(true)),
                session_up: Arc::new(AtomicBool::new(false)),
                binding_created: Arc::new(AtomicBool::new(false)),
                open_exchanges: Arc::new(Mutex::new(HashSet::new())),
                log: WireLog::default(),
            },
            switch_rx,
            controller_rx,
        }
    }

    /// Node the controller runs on.
    pub fn controller_node(&self) -> NodeId {
        self.shared.controller_node
    }

    /// Factory for bindings originating at `local`.
    pub fn factory(&self, local: NodeId) -> LoopbackFactory {
        LoopbackFactory {
            local,
            shared: self.shared.clone(),
        }
    }

    /// Whether the link is up.
    pub fn link_up(&self) -> bool {
        self.shared.link_up.load(Ordering::SeqCst)
    }

    /// Whether a binding is prepared.
    pub fn session_up(&self) -> bool {
        self.shared.session_up.load(Ordering::SeqCst)
    }

    /// Take the link down or bring it back.
    ///
    /// Bringing it back while no session is up asks the switch to prepare again.
    pub fn set_link(&self, up: bool) {
        let was_up = self.shared.link_up.swap(up, Ordering::SeqCst);
        if was_up == up {
            return;
        }
        debug!("Loopback: Link {}", if up { "restored" } else { "down" });

        if up && !self.session_up() && self.shared.binding_created.load(Ordering::SeqCst) {
            if let Err(err) = self
                .shared
                .notify_switch(SwitchDelivery::Binding(BindingEvent::PrepareRequested))
            {
                warn!("Loopback: Could not request prepare: {}", err);
            }
        }
    }

    /// Exchanges open on the binding.
    pub fn open_exchanges(&self) -> usize {
        self.shared.open_exchanges.lock().len()
    }

    /// The wire log.
    pub fn log(&self) -> &WireLog {
        &self.shared.log
    }

    /// Next delivery for the switch, if any.
    pub fn next_switch_delivery(&self) -> Option<SwitchDelivery> {
        self.switch_rx.try_recv().ok()
    }

    /// Next delivery for the controller, if any.
    pub fn next_controller_delivery(&self) -> Option<ControllerDelivery> {
        self.controller_rx.try_recv().ok()
    }

    /// Reply handle for a command received on `exchange`.
    pub fn responder(&self, exchange: Option<ExchangeId>) -> LoopbackResponder {
        LoopbackResponder {
            exchange,
            shared: self.shared.clone(),
        }
    }

    /// Queue a command for the controller outside any exchange. Its reply is logged
    /// and dropped.
    pub fn inject(
        &self,
        source: NodeId,
        profile_id: u32,
        msg_type: u8,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        self.shared
            .log
            .record(Direction::ToController, None, profile_id, msg_type, &payload, false);
        self.shared
            .to_controller
            .send(ControllerDelivery {
                exchange: None,
                profile_id,
                command: InboundCommand {
                    source,
                    msg_type,
                    payload,
                },
            })
            .map_err(|_| TransportError::LinkDown)
    }
}

// ============================================================================
// Binding
// ============================================================================

/// Binding from a switch node to the controller over the loopback.
#[derive(Debug)]
pub struct LoopbackBinding {
    local: NodeId,
    target: NodeId,
    retry: Option<RetryPolicy>,
    next_exchange: u32,
    shared: Shared,
}

impl LoopbackBinding {
    /// Node the binding was created for.
    pub fn target(&self) -> NodeId {
        self.target
    }

    /// Retry policy the binding was prepared with.
    pub fn retry(&self) -> Option<RetryPolicy> {
        self.retry
    }

    fn link_up(&self) -> bool {
        self.shared.link_up.load(Ordering::SeqCst)
    }
}

impl Binding for LoopbackBinding {
    fn request_prepare(&mut self) -> Result<(), TransportError> {
        self.shared
            .notify_switch(SwitchDelivery::Binding(BindingEvent::PrepareRequested))
    }

    fn prepare(&mut self, config: &BindingConfig) -> Result<(), TransportError> {
        config.validate()?;
        if config.target != Some(self.shared.controller_node) {
            return Err(TransportError::InvalidConfiguration("no route to target node"));
        }
        if let Some(TransportClass::ReliableUdp(retry)) = config.transport {
            self.retry = Some(retry);
        }

        if !self.link_up() {
            return self.shared.notify_switch(SwitchDelivery::Binding(
                BindingEvent::PrepareFailed {
                    reason: TransportError::LinkDown,
                },
            ));
        }

        self.shared.session_up.store(true, Ordering::SeqCst);
        debug!("Loopback[{}]: Session to {} up", self.local, self.target);
        self.shared
            .notify_switch(SwitchDelivery::Binding(BindingEvent::ConnectionEstablished))?;
        self.shared
            .notify_switch(SwitchDelivery::Binding(BindingEvent::BindingReady))
    }

    fn new_exchange(&mut self) -> Result<ExchangeId, TransportError> {
        if !self.shared.session_up.load(Ordering::SeqCst) {
            return Err(TransportError::NotReady);
        }
        self.next_exchange = self.next_exchange.wrapping_add(1);
        let exchange = ExchangeId(self.next_exchange);
        self.shared.open_exchanges.lock().insert(exchange);
        Ok(exchange)
    }

    fn send_message(
        &mut self,
        exchange: ExchangeId,
        profile_id: u32,
        msg_type: u8,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        if !self.shared.open_exchanges.lock().contains(&exchange) {
            return Err(TransportError::UnknownExchange(exchange));
        }

        if !self.link_up() {
            self.shared.log.record(
                Direction::ToController,
                Some(exchange),
                profile_id,
                msg_type,
                &payload,
                true,
            );
            self.shared.open_exchanges.lock().remove(&exchange);
            let retransmissions = self.retry.map(|r| r.max_retransmissions).unwrap_or(0);
            let error = TransportError::Timeout { retransmissions };
            self.shared
                .notify_switch(SwitchDelivery::Exchange(ExchangeEvent::SendError {
                    exchange,
                    error: error.clone(),
                }))?;
            if self.shared.session_up.swap(false, Ordering::SeqCst) {
                self.shared
                    .notify_switch(SwitchDelivery::Binding(BindingEvent::BindingFailed {
                        reason: error,
                    }))?;
            }
            return Ok(());
        }

        self.shared.log.record(
            Direction::ToController,
            Some(exchange),
            profile_id,
            msg_type,
            &payload,
            false,
        );
        self.shared
            .to_controller
            .send(ControllerDelivery {
                exchange: Some(exchange),
                profile_id,
                command: InboundCommand {
                    source: self.local,
                    msg_type,
                    payload,
                },
            })
            .map_err(|_| TransportError::LinkDown)
    }

    fn abort_exchange(&mut self, exchange: ExchangeId) {
        if self.shared.open_exchanges.lock().remove(&exchange) {
            trace!("Loopback[{}]: Aborted {}", self.local, exchange);
        }
    }

    fn default_event_handler(&mut self, event: &BindingEvent) {
        if event.is_failure() {
            self.shared.session_up.store(false, Ordering::SeqCst);
        }
        trace!("Loopback[{}]: Default handling of {}", self.local, event.name());
    }
}

/// Creates [`LoopbackBinding`]s.
#[derive(Debug, Clone)]
pub struct LoopbackFactory {
    local: NodeId,
    shared: Shared,
}

impl BindingFactory for LoopbackFactory {
    type Binding = LoopbackBinding;

    fn new_binding(&mut self, target: NodeId) -> Result<LoopbackBinding, TransportError> {
        self.shared.binding_created.store(true, Ordering::SeqCst);
        Ok(LoopbackBinding {
            local: self.local,
            target,
            retry: None,
            next_exchange: 0,
            shared: self.shared.clone(),
        })
    }
}

// ============================================================================
// Responder
// ============================================================================

/// Reply handle for one command received over the loopback.
#[derive(Debug)]
pub struct LoopbackResponder {
    exchange: Option<ExchangeId>,
    shared: Shared,
}

impl CommandResponder for LoopbackResponder {
    fn send_reply(self, reply: CommandReply) -> Result<(), TransportError> {
        let payload = reply
            .encode()
            .map_err(|err| TransportError::SendFailed(err.to_string()))?;
        let (profile_id, msg_type) = reply.message_type();
        let link_up = self.shared.link_up.load(Ordering::SeqCst);
        self.shared.log.record(
            Direction::ToSwitch,
            self.exchange,
            profile_id,
            msg_type,
            &payload,
            !link_up,
        );
        if !link_up {
            return Err(TransportError::LinkDown);
        }

        let Some(exchange) = self.exchange else {
            return Ok(());
        };
        if !self.shared.open_exchanges.lock().remove(&exchange) {
            trace!("Loopback: Reply on closed exchange {} dropped", exchange);
            return Ok(());
        }
        self.shared
            .notify_switch(SwitchDelivery::Exchange(ExchangeEvent::ReplyReceived {
                exchange,
                profile_id,
                msg_type,
                payload,
            }))
    }
}
