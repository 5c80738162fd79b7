//! Inbound commands and their reply handles.

use bytes::Bytes;
use circuit_protocol::CommandReply;

use crate::{NodeId, TransportError};

/// A command message received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    /// Sender of the command.
    pub source: NodeId,
    /// Message type the command arrived with.
    pub msg_type: u8,
    /// Encoded command request.
    pub payload: Bytes,
}

/// One-shot handle for answering an inbound command.
///
/// Sending consumes the handle, so every command is answered at most once. Dropping
/// it without sending closes the exchange silently.
pub trait CommandResponder {
    /// Send `reply` to the command's originator.
    fn send_reply(self, reply: CommandReply) -> Result<(), TransportError>;
}
