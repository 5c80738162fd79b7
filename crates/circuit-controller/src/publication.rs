//! Data sources for the published traits.

use bytes::Bytes;
use circuit_common::{Publisher, TraitHandle};
use circuit_protocol::{
    PropertyHandle, ProtocolError, ProtocolResult, TraitSource, CIRCUIT_STATE_PROPERTIES,
};
use circuit_tlv::{ContainerType, Tag, TlvWriter};
use tracing::trace;

use crate::light::LightState;

/// Publication state of the LogicalCircuitStateTrait.
///
/// The version advances with every dirty mark, so any externally visible change is
/// observable through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTraitSource {
    handle: TraitHandle,
    version: u64,
}

impl StateTraitSource {
    /// Source for a published trait at `version`.
    pub fn new(handle: TraitHandle, version: u64) -> Self {
        StateTraitSource { handle, version }
    }

    /// Publisher handle.
    pub fn handle(&self) -> TraitHandle {
        self.handle
    }

    /// Current publication version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Mark `property` dirty and bump the version.
    pub fn set_dirty<P: Publisher>(&mut self, publisher: &mut P, property: PropertyHandle) {
        self.version = self.version.wrapping_add(1);
        trace!(
            "{}: {:?} dirty, version {}",
            TraitSource::CircuitState,
            property,
            self.version
        );
        publisher.set_dirty(self.handle, property);
    }
}

/// Publication state of the LogicalCircuitControlTrait. It has no properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlTraitSource {
    handle: TraitHandle,
}

impl ControlTraitSource {
    /// Source for a published trait.
    pub fn new(handle: TraitHandle) -> Self {
        ControlTraitSource { handle }
    }

    /// Publisher handle.
    pub fn handle(&self) -> TraitHandle {
        self.handle
    }
}

/// Write the value of `property` under `tag`.
///
/// The root handle writes the whole trait as a structure.
pub fn write_leaf_data(
    light: &LightState,
    property: PropertyHandle,
    tag: Tag,
    writer: &mut TlvWriter,
) -> ProtocolResult<()> {
    let enc = ProtocolError::EncodingFailed;
    match property {
        PropertyHandle::Root => {
            writer.start_container(tag, ContainerType::Structure).map_err(enc)?;
            for info in CIRCUIT_STATE_PROPERTIES {
                write_leaf_data(light, info.handle, Tag::Context(info.context_tag), writer)?;
            }
            writer.end_container().map_err(enc)
        }
        PropertyHandle::State => writer
            .put_unsigned(tag, light.state().as_u8() as u64)
            .map_err(enc),
        PropertyHandle::Brightness => writer.put_unsigned(tag, light.level() as u64).map_err(enc),
    }
}

/// Encode the whole LogicalCircuitStateTrait as an anonymous structure.
pub fn encode_snapshot(light: &LightState) -> ProtocolResult<Bytes> {
    let mut writer = TlvWriter::default();
    write_leaf_data(light, PropertyHandle::Root, Tag::Anonymous, &mut writer)?;
    writer.finish().map_err(ProtocolError::EncodingFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use circuit_protocol::CircuitState;

    #[test]
    fn test_leaf_data() {
        let light = LightState::new(CircuitState::On, 75).unwrap();
        let mut writer = TlvWriter::default();
        write_leaf_data(&light, PropertyHandle::Brightness, Tag::Context(9), &mut writer).unwrap();
        write_leaf_data(&light, PropertyHandle::State, Tag::Context(8), &mut writer).unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(&bytes[..], &[0x24, 0x09, 75, 0x24, 0x08, 0x01]);
    }

    #[test]
    fn test_snapshot_layout() {
        let light = LightState::new(CircuitState::Off, 100).unwrap();
        let bytes = encode_snapshot(&light).unwrap();
        assert_eq!(&bytes[..], &[0x15, 0x24, 0x01, 0x02, 0x24, 0x02, 100, 0x18]);
    }

    #[derive(Default)]
    struct DirtyLog(Vec<(TraitHandle, PropertyHandle)>);

    impl Publisher for DirtyLog {
        fn publish_trait(
            &mut self,
            _instance_id: u32,
            _source: TraitSource,
        ) -> Result<TraitHandle, circuit_common::PublishError> {
            Ok(TraitHandle(0))
        }

        fn set_dirty(&mut self, handle: TraitHandle, property: PropertyHandle) {
            self.0.push((handle, property));
        }

        fn run_notification_engine(&mut self) {}
    }

    #[test]
    fn test_set_dirty_bumps_version() {
        let mut log = DirtyLog::default();
        let mut source = StateTraitSource::new(TraitHandle(4), 1);
        source.set_dirty(&mut log, PropertyHandle::Root);
        source.set_dirty(&mut log, PropertyHandle::Root);
        assert_eq!(source.version(), 3);
        assert_eq!(log.0, vec![(TraitHandle(4), PropertyHandle::Root); 2]);
    }
}
