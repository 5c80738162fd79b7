//! Bindings: sessions from a local node to one peer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{ExchangeId, NodeId};

// ============================================================================
// Errors
// ============================================================================

/// Errors reported by a binding or its exchanges.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No buffer or exchange slot could be allocated.
    #[error("out of memory")]
    NoMemory,

    /// The binding is not ready to carry messages.
    #[error("binding not ready")]
    NotReady,

    /// The configuration handed to `prepare` is incomplete.
    #[error("invalid binding configuration: {0}")]
    InvalidConfiguration(&'static str),

    /// The exchange is unknown or was aborted.
    #[error("unknown exchange {0}")]
    UnknownExchange(ExchangeId),

    /// The peer could not be reached.
    #[error("link down")]
    LinkDown,

    /// Retransmissions were exhausted without an acknowledgement.
    #[error("timed out after {retransmissions} retransmissions")]
    Timeout {
        /// Retransmissions attempted.
        retransmissions: u8,
    },

    /// Any other send failure.
    #[error("send failed: {0}")]
    SendFailed(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Retransmission parameters of the reliable UDP transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retransmit timeout for the first message of an idle exchange.
    pub initial_retransmit_timeout_ms: u32,
    /// Retransmit timeout once the exchange is active.
    pub active_retransmit_timeout_ms: u32,
    /// How long an acknowledgement may wait for a message to piggyback on.
    pub ack_piggyback_timeout_ms: u32,
    /// Retransmissions before the send is reported as failed.
    pub max_retransmissions: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_retransmit_timeout_ms: 100,
            active_retransmit_timeout_ms: 100,
            ack_piggyback_timeout_ms: 100,
            max_retransmissions: 4,
        }
    }
}

/// Transport a binding runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportClass {
    /// UDP with acknowledgements and retransmission.
    ReliableUdp(RetryPolicy),
}

/// Message security applied by a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Messages are sent unencrypted.
    #[default]
    None,
}

/// Configuration a binding is prepared with. Built fluently:
///
/// ```rust
/// use circuit_common::{BindingConfig, NodeId, RetryPolicy};
///
/// let config = BindingConfig::new()
///     .target_node(NodeId::new(0x42))
///     .transport_reliable_udp(RetryPolicy::default())
///     .security_none();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingConfig {
    /// Peer node.
    pub target: Option<NodeId>,
    /// Transport class.
    pub transport: Option<TransportClass>,
    /// Security mode.
    pub security: SecurityMode,
}

impl BindingConfig {
    /// Start an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the peer node.
    pub fn target_node(mut self, node: NodeId) -> Self {
        self.target = Some(node);
        self
    }

    /// Use reliable UDP with the given retry policy.
    pub fn transport_reliable_udp(mut self, retry: RetryPolicy) -> Self {
        self.transport = Some(TransportClass::ReliableUdp(retry));
        self
    }

    /// Send without message security.
    pub fn security_none(mut self) -> Self {
        self.security = SecurityMode::None;
        self
    }

    /// Check that every mandatory field is set.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.target.is_none() {
            return Err(TransportError::InvalidConfiguration("missing target node"));
        }
        if self.transport.is_none() {
            return Err(TransportError::InvalidConfiguration("missing transport"));
        }
        Ok(())
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle state of a binding as seen by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BindingState {
    /// Not prepared.
    #[default]
    Idle,
    /// Preparation in progress.
    Preparing,
    /// Messages can be sent.
    Ready,
    /// Preparation or the session failed.
    Failed,
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingState::Idle => write!(f, "Idle"),
            BindingState::Preparing => write!(f, "Preparing"),
            BindingState::Ready => write!(f, "Ready"),
            BindingState::Failed => write!(f, "Failed"),
        }
    }
}

/// Events a binding delivers to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingEvent {
    /// The owner must configure and prepare the binding.
    PrepareRequested,
    /// Preparation finished; messages can be sent.
    BindingReady,
    /// Preparation failed.
    PrepareFailed {
        /// Cause of the failure.
        reason: TransportError,
    },
    /// A ready binding lost its session.
    BindingFailed {
        /// Cause of the failure.
        reason: TransportError,
    },
    /// The underlying connection came up. Informational.
    ConnectionEstablished,
}

impl BindingEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            BindingEvent::PrepareRequested => "PrepareRequested",
            BindingEvent::BindingReady => "BindingReady",
            BindingEvent::PrepareFailed { .. } => "PrepareFailed",
            BindingEvent::BindingFailed { .. } => "BindingFailed",
            BindingEvent::ConnectionEstablished => "ConnectionEstablished",
        }
    }

    /// Whether the event reports a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            BindingEvent::PrepareFailed { .. } | BindingEvent::BindingFailed { .. }
        )
    }
}

/// Completions delivered for exchanges opened on a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// The peer acknowledged the message.
    AckReceived(ExchangeId),
    /// The message could not be delivered.
    SendError {
        /// Exchange the message was sent on.
        exchange: ExchangeId,
        /// Cause of the failure.
        error: TransportError,
    },
    /// The peer replied on the exchange.
    ReplyReceived {
        /// Exchange the reply arrived on.
        exchange: ExchangeId,
        /// Profile id of the reply.
        profile_id: u32,
        /// Message type of the reply.
        msg_type: u8,
        /// Reply payload.
        payload: Bytes,
    },
}

impl ExchangeEvent {
    /// Exchange the event belongs to.
    pub fn exchange(&self) -> ExchangeId {
        match self {
            ExchangeEvent::AckReceived(exchange) => *exchange,
            ExchangeEvent::SendError { exchange, .. } => *exchange,
            ExchangeEvent::ReplyReceived { exchange, .. } => *exchange,
        }
    }
}

// ============================================================================
// Interfaces
// ============================================================================

/// A session to one peer node.
///
/// Calls never block. Outcomes of `request_prepare`, `prepare` and `send_message`
/// arrive later as [`BindingEvent`]s and [`ExchangeEvent`]s.
pub trait Binding {
    /// Ask the binding to emit [`BindingEvent::PrepareRequested`].
    fn request_prepare(&mut self) -> Result<(), TransportError>;

    /// Configure the binding and start preparing it.
    fn prepare(&mut self, config: &BindingConfig) -> Result<(), TransportError>;

    /// Open a new exchange. Fails unless the binding is ready.
    fn new_exchange(&mut self) -> Result<ExchangeId, TransportError>;

    /// Send one message on an exchange. The payload is consumed on every path.
    fn send_message(
        &mut self,
        exchange: ExchangeId,
        profile_id: u32,
        msg_type: u8,
        payload: Bytes,
    ) -> Result<(), TransportError>;

    /// Abort an exchange. No further events are delivered for it.
    fn abort_exchange(&mut self, exchange: ExchangeId);

    /// Library handling for events the owner does not act on.
    fn default_event_handler(&mut self, event: &BindingEvent);
}

/// Creates bindings.
pub trait BindingFactory {
    /// Binding type produced.
    type Binding: Binding;

    /// Create an unprepared binding to `target`.
    fn new_binding(&mut self, target: NodeId) -> Result<Self::Binding, TransportError>;
}
