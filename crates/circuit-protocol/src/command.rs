//! Custom command requests.
//!
//! A request is an anonymous structure:
//!
//! ```text
//! {
//!   1: path { 1: instance locator { 1: trait profile id, 2: trait instance id } }
//!   2: command type
//!   5: expiry time (µs, optional)
//!   6: must-be version (optional)
//!   7: argument { 1: state | null, 2: level | null }
//! }
//! ```

use bytes::Bytes;
use circuit_tlv::{
    ContainerType, Element, Tag, TlvReader, TlvType, TlvWriter, Value, DEFAULT_MAX_MESSAGE_SIZE,
};

use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{CircuitState, TraitPath};

// ============================================================================
// Arguments
// ============================================================================

/// Arguments of a SetLogicalCircuitState command. `None` means "leave unchanged".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetCircuitStateArgs {
    /// Requested circuit state.
    pub state: Option<CircuitState>,
    /// Requested level, 0-100.
    pub level: Option<u8>,
}

impl SetCircuitStateArgs {
    /// Arguments requesting both a state and a level.
    pub fn new(state: CircuitState, level: u8) -> Self {
        SetCircuitStateArgs {
            state: Some(state),
            level: Some(level),
        }
    }

    /// Write the argument structure under `tag`.
    pub fn write(&self, tag: Tag, writer: &mut TlvWriter) -> ProtocolResult<()> {
        let enc = ProtocolError::EncodingFailed;
        writer
            .start_container(tag, ContainerType::Structure)
            .map_err(enc)?;
        writer
            .put_optional_unsigned(
                Tag::Context(SET_STATE_PARAM_STATE),
                self.state.map(|s| s.as_u8() as u64),
            )
            .map_err(enc)?;
        writer
            .put_optional_unsigned(Tag::Context(SET_STATE_PARAM_LEVEL), self.level.map(u64::from))
            .map_err(enc)?;
        writer.end_container().map_err(enc)
    }

    /// Decode the argument structure from its raw element encoding.
    ///
    /// Exactly two fields are read, `state` then `level`. Either may be null. Nothing is
    /// returned unless both fields decode and the structure ends after them.
    pub fn decode(raw: &[u8]) -> ProtocolResult<Self> {
        let mal = ProtocolError::MalformedField;
        let mut reader = TlvReader::new(raw);

        let head = reader
            .next()
            .map_err(mal)?
            .ok_or(ProtocolError::MissingField("argument"))?;
        if head.value != Value::Container(ContainerType::Structure) {
            return Err(ProtocolError::WrongType {
                field: "argument",
                expected: TlvType::Container(ContainerType::Structure),
                found: head.tlv_type(),
            });
        }
        reader.enter_container().map_err(mal)?;

        let state = read_nullable_field(&mut reader, SET_STATE_PARAM_STATE, "state")?
            .map(|raw| {
                let state = u8::try_from(raw)
                    .ok()
                    .and_then(|v| CircuitState::try_from(v).ok())
                    .filter(|s| s.is_commandable());
                state.ok_or(ProtocolError::OutOfRange {
                    field: "state",
                    value: raw,
                })
            })
            .transpose()?;

        let level = read_nullable_field(&mut reader, SET_STATE_PARAM_LEVEL, "level")?
            .map(|raw| match u8::try_from(raw) {
                Ok(level) if level <= MAX_LEVEL => Ok(level),
                _ => Err(ProtocolError::OutOfRange {
                    field: "level",
                    value: raw,
                }),
            })
            .transpose()?;

        if let Some(extra) = reader.next().map_err(mal)? {
            return Err(ProtocolError::ExtraElement(extra.tag));
        }
        reader.exit_container().map_err(mal)?;

        Ok(SetCircuitStateArgs { state, level })
    }
}

/// Read the next member, which must carry `tag` and be an integer or null.
fn read_nullable_field(
    reader: &mut TlvReader<'_>,
    tag: u8,
    field: &'static str,
) -> ProtocolResult<Option<i128>> {
    let expected = Tag::Context(tag);
    let element = reader.next().map_err(ProtocolError::MalformedField)?;
    let Some(Element { tag: found, value }) = element else {
        return Err(ProtocolError::UnexpectedElement {
            expected,
            found: None,
        });
    };
    if found != expected {
        return Err(ProtocolError::UnexpectedElement {
            expected,
            found: Some(found),
        });
    }
    match value {
        Value::Null => Ok(None),
        other => other.as_integer().map(Some).ok_or(ProtocolError::WrongType {
            field,
            expected: TlvType::UnsignedInteger,
            found: other.tlv_type(),
        }),
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A SetLogicalCircuitState request ready to be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRequest {
    /// Target trait instance.
    pub path: TraitPath,
    /// Command type identifier.
    pub command_type: u32,
    /// Expiry time in microseconds since the epoch.
    pub expiry_time_us: Option<i64>,
    /// Version the target trait must be at for the command to apply.
    pub must_be_version: Option<u64>,
    /// Command arguments.
    pub args: SetCircuitStateArgs,
}

impl CommandRequest {
    /// Request setting the light on instance 0 of the control trait.
    pub fn set_circuit_state(args: SetCircuitStateArgs) -> Self {
        CommandRequest {
            path: TraitPath::circuit_control(),
            command_type: SET_LOGICAL_CIRCUIT_STATE_REQUEST_ID,
            expiry_time_us: None,
            must_be_version: None,
            args,
        }
    }

    /// Reject the command if it arrives at or after `expiry_time_us`.
    pub fn with_expiry(mut self, expiry_time_us: i64) -> Self {
        self.expiry_time_us = Some(expiry_time_us);
        self
    }

    /// Reject the command unless the target trait is at `version`.
    pub fn with_must_be_version(mut self, version: u64) -> Self {
        self.must_be_version = Some(version);
        self
    }

    /// Encode into a buffer of the default message size.
    pub fn encode(&self) -> ProtocolResult<Bytes> {
        self.encode_with_limit(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Encode into a buffer of at most `max_len` bytes.
    pub fn encode_with_limit(&self, max_len: usize) -> ProtocolResult<Bytes> {
        let enc = ProtocolError::EncodingFailed;
        let mut w = TlvWriter::new(max_len);

        w.start_container(Tag::Anonymous, ContainerType::Structure).map_err(enc)?;

        w.start_container(Tag::Context(CMD_TAG_PATH), ContainerType::Path).map_err(enc)?;
        w.start_container(Tag::Context(PATH_TAG_INSTANCE_LOCATOR), ContainerType::Structure)
            .map_err(enc)?;
        w.put_unsigned(Tag::Context(PATH_TAG_TRAIT_PROFILE_ID), self.path.profile_id as u64)
            .map_err(enc)?;
        w.put_unsigned(Tag::Context(PATH_TAG_TRAIT_INSTANCE_ID), self.path.instance_id as u64)
            .map_err(enc)?;
        w.end_container().map_err(enc)?;
        w.end_container().map_err(enc)?;

        w.put_unsigned(Tag::Context(CMD_TAG_COMMAND_TYPE), self.command_type as u64)
            .map_err(enc)?;
        if let Some(expiry) = self.expiry_time_us {
            w.put_signed(Tag::Context(CMD_TAG_EXPIRY_TIME), expiry).map_err(enc)?;
        }
        if let Some(version) = self.must_be_version {
            w.put_unsigned(Tag::Context(CMD_TAG_MUST_BE_VERSION), version).map_err(enc)?;
        }
        self.args.write(Tag::Context(CMD_TAG_ARGUMENT), &mut w)?;

        w.end_container().map_err(enc)?;
        w.finish().map_err(enc)
    }
}

/// Envelope fields of a received command. The argument stays encoded until the
/// command type is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEnvelope<'a> {
    /// Target trait instance.
    pub path: TraitPath,
    /// Command type identifier.
    pub command_type: u64,
    /// Expiry time in microseconds since the epoch.
    pub expiry_time_us: Option<i64>,
    /// Required trait version.
    pub must_be_version: Option<u64>,
    /// Raw encoding of the argument element, tag included.
    pub argument: Option<&'a [u8]>,
}

impl<'a> CommandEnvelope<'a> {
    /// Decode the envelope of a command request. Unknown members are skipped.
    pub fn decode(payload: &'a [u8]) -> ProtocolResult<Self> {
        let mal = ProtocolError::MalformedField;
        let mut reader = TlvReader::new(payload);

        let head = reader
            .next()
            .map_err(mal)?
            .ok_or(ProtocolError::MissingField("command"))?;
        expect_structure(&head, "command")?;
        reader.enter_container().map_err(mal)?;

        let mut path = None;
        let mut command_type = None;
        let mut expiry_time_us = None;
        let mut must_be_version = None;
        let mut argument = None;

        while let Some(element) = reader.next().map_err(mal)? {
            match element.tag {
                Tag::Context(CMD_TAG_PATH) => {
                    path = Some(read_path(&mut reader, &element)?);
                }
                Tag::Context(CMD_TAG_COMMAND_TYPE) => {
                    command_type = Some(unsigned_field(&element, "command type")?);
                }
                Tag::Context(CMD_TAG_EXPIRY_TIME) => {
                    let value = integer_field(&element, "expiry time")?;
                    let expiry = i64::try_from(value).map_err(|_| ProtocolError::OutOfRange {
                        field: "expiry time",
                        value,
                    })?;
                    expiry_time_us = Some(expiry);
                }
                Tag::Context(CMD_TAG_MUST_BE_VERSION) => {
                    must_be_version = Some(unsigned_field(&element, "must-be version")?);
                }
                Tag::Context(CMD_TAG_ARGUMENT) => {
                    argument = Some(reader.current_element_bytes().map_err(mal)?);
                }
                _ => {}
            }
        }
        reader.exit_container().map_err(mal)?;

        Ok(CommandEnvelope {
            path: path.ok_or(ProtocolError::MissingField("path"))?,
            command_type: command_type.ok_or(ProtocolError::MissingField("command type"))?,
            expiry_time_us,
            must_be_version,
            argument,
        })
    }
}

fn expect_structure(element: &Element<'_>, field: &'static str) -> ProtocolResult<()> {
    expect_container(element, ContainerType::Structure, field)
}

fn expect_container(
    element: &Element<'_>,
    kind: ContainerType,
    field: &'static str,
) -> ProtocolResult<()> {
    if element.value == Value::Container(kind) {
        Ok(())
    } else {
        Err(ProtocolError::WrongType {
            field,
            expected: TlvType::Container(kind),
            found: element.tlv_type(),
        })
    }
}

fn integer_field(element: &Element<'_>, field: &'static str) -> ProtocolResult<i128> {
    element.value.as_integer().ok_or(ProtocolError::WrongType {
        field,
        expected: TlvType::UnsignedInteger,
        found: element.tlv_type(),
    })
}

fn unsigned_field(element: &Element<'_>, field: &'static str) -> ProtocolResult<u64> {
    let value = integer_field(element, field)?;
    u64::try_from(value).map_err(|_| ProtocolError::OutOfRange { field, value })
}

fn read_path(reader: &mut TlvReader<'_>, element: &Element<'_>) -> ProtocolResult<TraitPath> {
    let mal = ProtocolError::MalformedField;
    expect_container(element, ContainerType::Path, "path")?;
    reader.enter_container().map_err(mal)?;

    let locator = reader.next().map_err(mal)?.ok_or(ProtocolError::UnexpectedElement {
        expected: Tag::Context(PATH_TAG_INSTANCE_LOCATOR),
        found: None,
    })?;
    if locator.tag != Tag::Context(PATH_TAG_INSTANCE_LOCATOR) {
        return Err(ProtocolError::UnexpectedElement {
            expected: Tag::Context(PATH_TAG_INSTANCE_LOCATOR),
            found: Some(locator.tag),
        });
    }
    expect_structure(&locator, "instance locator")?;
    reader.enter_container().map_err(mal)?;

    let mut profile_id = None;
    let mut instance_id = 0u32;
    while let Some(member) = reader.next().map_err(mal)? {
        match member.tag {
            Tag::Context(PATH_TAG_TRAIT_PROFILE_ID) => {
                profile_id = Some(u32_field(&member, "trait profile id")?);
            }
            Tag::Context(PATH_TAG_TRAIT_INSTANCE_ID) => {
                instance_id = u32_field(&member, "trait instance id")?;
            }
            _ => {}
        }
    }
    reader.exit_container().map_err(mal)?;
    reader.exit_container().map_err(mal)?;

    Ok(TraitPath {
        profile_id: profile_id.ok_or(ProtocolError::MissingField("trait profile id"))?,
        instance_id,
    })
}

fn u32_field(element: &Element<'_>, field: &'static str) -> ProtocolResult<u32> {
    let value = integer_field(element, field)?;
    u32::try_from(value).map_err(|_| ProtocolError::OutOfRange { field, value })
}
