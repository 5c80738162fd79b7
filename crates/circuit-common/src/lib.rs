//! Common types and collaborator interfaces.
//!
//! The switch and the light controller never talk to a transport, a clock or a
//! publication engine directly. They are handed implementations of the traits in
//! this crate:
//!
//! - [`Binding`] / [`BindingFactory`]: session to a peer node, exchanges and messages
//! - [`Publisher`]: trait publication and dirty-property notification
//! - [`Clock`]: synchronised real time
//! - [`CommandResponder`]: the one-shot reply handle for an inbound command
//!
//! [`SharedStack`] guards state that is touched from more than one thread.

mod binding;
mod clock;
mod publisher;
mod responder;
mod shared;

pub use binding::*;
pub use clock::*;
pub use publisher::*;
pub use responder::*;
pub use shared::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node on the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Create a new node id.
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    /// Get the raw id value.
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// Identifier of an exchange opened on a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(pub u32);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ec#{}", self.0)
    }
}
