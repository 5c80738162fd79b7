//! Trait publication.

use circuit_protocol::{PropertyHandle, TraitSource};
use thiserror::Error;

/// Handle to a published trait instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraitHandle(pub u16);

/// Errors publishing a trait.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The publisher cannot hold more traits.
    #[error("publisher full ({capacity} traits)")]
    TableFull {
        /// Maximum number of published traits.
        capacity: usize,
    },

    /// The trait instance is already published.
    #[error("{trait_source} instance {instance_id} already published")]
    AlreadyPublished {
        /// The trait.
        trait_source: TraitSource,
        /// Its instance id.
        instance_id: u32,
    },
}

/// Publication and notification engine.
pub trait Publisher {
    /// Publish a trait instance.
    fn publish_trait(
        &mut self,
        instance_id: u32,
        source: TraitSource,
    ) -> Result<TraitHandle, PublishError>;

    /// Record that a property of a published trait changed.
    fn set_dirty(&mut self, handle: TraitHandle, property: PropertyHandle);

    /// Deliver pending notifications.
    fn run_notification_engine(&mut self);
}
