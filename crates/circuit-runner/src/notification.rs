//! A recording notification engine.

use circuit_common::{PublishError, Publisher, TraitHandle};
use circuit_protocol::{PropertyHandle, TraitSource};
use tracing::{debug, trace, warn};

/// Traits a [`NotificationEngine`] holds by default.
pub const DEFAULT_PUBLISHER_CAPACITY: usize = 4;

/// A notification the engine delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    /// Published trait.
    pub handle: TraitHandle,
    /// Its data source.
    pub source: TraitSource,
    /// Its instance id.
    pub instance_id: u32,
    /// Property that changed.
    pub property: PropertyHandle,
}

/// Publisher that records dirty marks and delivers them as notifications.
///
/// Marks of the same property between two runs coalesce into one notification.
#[derive(Debug)]
pub struct NotificationEngine {
    capacity: usize,
    published: Vec<(u32, TraitSource)>,
    dirty: Vec<(TraitHandle, PropertyHandle)>,
    delivered: Vec<Notification>,
    dirty_marks: u64,
    runs: u32,
}

impl Default for NotificationEngine {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PUBLISHER_CAPACITY)
    }
}

impl NotificationEngine {
    /// Engine holding at most `capacity` traits.
    pub fn with_capacity(capacity: usize) -> Self {
        NotificationEngine {
            capacity,
            published: Vec::new(),
            dirty: Vec::new(),
            delivered: Vec::new(),
            dirty_marks: 0,
            runs: 0,
        }
    }

    /// Published traits, by handle.
    pub fn published(&self) -> &[(u32, TraitSource)] {
        &self.published
    }

    /// Dirty properties not yet delivered.
    pub fn pending(&self) -> &[(TraitHandle, PropertyHandle)] {
        &self.dirty
    }

    /// Every notification delivered so far.
    pub fn delivered(&self) -> &[Notification] {
        &self.delivered
    }

    /// Dirty marks received, before coalescing.
    pub fn dirty_marks(&self) -> u64 {
        self.dirty_marks
    }

    /// Times the engine ran.
    pub fn runs(&self) -> u32 {
        self.runs
    }
}

impl Publisher for NotificationEngine {
    fn publish_trait(
        &mut self,
        instance_id: u32,
        source: TraitSource,
    ) -> Result<TraitHandle, PublishError> {
        if self.published.contains(&(instance_id, source)) {
            return Err(PublishError::AlreadyPublished {
                trait_source: source,
                instance_id,
            });
        }
        if self.published.len() >= self.capacity {
            return Err(PublishError::TableFull {
                capacity: self.capacity,
            });
        }

        let handle = TraitHandle(self.published.len() as u16);
        self.published.push((instance_id, source));
        debug!(
            "NotificationEngine: Published {} instance {} as handle {}",
            source, instance_id, handle.0
        );
        Ok(handle)
    }

    fn set_dirty(&mut self, handle: TraitHandle, property: PropertyHandle) {
        if handle.0 as usize >= self.published.len() {
            warn!("NotificationEngine: Dirty mark for unknown handle {}", handle.0);
            return;
        }
        self.dirty_marks += 1;
        trace!("NotificationEngine: Handle {} {:?} dirty", handle.0, property);
        if !self.dirty.contains(&(handle, property)) {
            self.dirty.push((handle, property));
        }
    }

    fn run_notification_engine(&mut self) {
        self.runs += 1;
        for (handle, property) in self.dirty.drain(..) {
            let (instance_id, source) = self.published[handle.0 as usize];
            debug!(
                "NotificationEngine: Notify {} instance {} {:?}",
                source, instance_id, property
            );
            self.delivered.push(Notification {
                handle,
                source,
                instance_id,
                property,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_limits() {
        let mut engine = NotificationEngine::with_capacity(2);
        assert_eq!(engine.publish_trait(0, TraitSource::CircuitState), Ok(TraitHandle(0)));
        assert_eq!(
            engine.publish_trait(0, TraitSource::CircuitState),
            Err(PublishError::AlreadyPublished {
                trait_source: TraitSource::CircuitState,
                instance_id: 0
            })
        );
        assert_eq!(engine.publish_trait(0, TraitSource::CircuitControl), Ok(TraitHandle(1)));
        assert_eq!(
            engine.publish_trait(1, TraitSource::CircuitState),
            Err(PublishError::TableFull { capacity: 2 })
        );
    }

    #[test]
    fn test_dirty_marks_coalesce() {
        let mut engine = NotificationEngine::default();
        let handle = engine.publish_trait(0, TraitSource::CircuitState).unwrap();

        engine.set_dirty(handle, PropertyHandle::Root);
        engine.set_dirty(handle, PropertyHandle::Root);
        engine.set_dirty(TraitHandle(7), PropertyHandle::Root);
        assert_eq!(engine.pending().len(), 1);
        assert_eq!(engine.dirty_marks(), 2);

        engine.run_notification_engine();
        assert!(engine.pending().is_empty());
        assert_eq!(
            engine.delivered(),
            &[Notification {
                handle,
                source: TraitSource::CircuitState,
                instance_id: 0,
                property: PropertyHandle::Root,
            }]
        );

        engine.run_notification_engine();
        assert_eq!(engine.delivered().len(), 1);
        assert_eq!(engine.runs(), 2);
    }
}
