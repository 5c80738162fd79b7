//! Replies to custom commands.

use bytes::{BufMut, Bytes, BytesMut};
use circuit_tlv::{ContainerType, Tag, TlvReader, TlvType, TlvWriter, Value};

use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::StatusCode;

/// Length of a status report payload: profile id (u32) and status code (u16).
pub const STATUS_REPORT_LEN: usize = 6;

/// The single reply a controller sends for each command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandReply {
    /// Command applied. Carries the state trait's publication version.
    Response {
        /// Trait version after the command.
        version: u64,
    },
    /// Command rejected.
    StatusReport(StatusCode),
}

impl CommandReply {
    /// Profile id and message type this reply is sent with.
    pub fn message_type(&self) -> (u32, u8) {
        match self {
            CommandReply::Response { .. } => (PROFILE_WDM, MSG_TYPE_CUSTOM_COMMAND_RESPONSE),
            CommandReply::StatusReport(_) => (PROFILE_COMMON, MSG_TYPE_STATUS_REPORT),
        }
    }

    /// Encode the reply payload.
    pub fn encode(&self) -> ProtocolResult<Bytes> {
        match self {
            CommandReply::Response { version } => {
                let enc = ProtocolError::EncodingFailed;
                let mut w = TlvWriter::default();
                w.start_container(Tag::Anonymous, ContainerType::Structure).map_err(enc)?;
                w.put_unsigned(Tag::Context(RESPONSE_TAG_VERSION), *version).map_err(enc)?;
                w.end_container().map_err(enc)?;
                w.finish().map_err(enc)
            }
            CommandReply::StatusReport(status) => {
                let mut buf = BytesMut::with_capacity(STATUS_REPORT_LEN);
                buf.put_u32_le(status.profile_id);
                buf.put_u16_le(status.code);
                Ok(buf.freeze())
            }
        }
    }

    /// Decode a reply received with the given profile id and message type.
    pub fn decode(profile_id: u32, msg_type: u8, payload: &[u8]) -> ProtocolResult<Self> {
        match (profile_id, msg_type) {
            (PROFILE_WDM, MSG_TYPE_CUSTOM_COMMAND_RESPONSE) => decode_response(payload),
            (PROFILE_COMMON, MSG_TYPE_STATUS_REPORT) => {
                if payload.len() < STATUS_REPORT_LEN {
                    return Err(ProtocolError::StatusReportTooShort {
                        expected: STATUS_REPORT_LEN,
                        actual: payload.len(),
                    });
                }
                Ok(CommandReply::StatusReport(StatusCode {
                    profile_id: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
                    code: u16::from_le_bytes([payload[4], payload[5]]),
                }))
            }
            _ => Err(ProtocolError::UnknownMessageType {
                profile_id,
                msg_type,
            }),
        }
    }
}

fn decode_response(payload: &[u8]) -> ProtocolResult<CommandReply> {
    let mal = ProtocolError::MalformedField;
    let mut reader = TlvReader::new(payload);
    let head = reader
        .next()
        .map_err(mal)?
        .ok_or(ProtocolError::MissingField("response"))?;
    if head.value != Value::Container(ContainerType::Structure) {
        return Err(ProtocolError::WrongType {
            field: "response",
            expected: TlvType::Container(ContainerType::Structure),
            found: head.tlv_type(),
        });
    }
    reader.enter_container().map_err(mal)?;

    let mut version = None;
    while let Some(element) = reader.next().map_err(mal)? {
        if element.tag == Tag::Context(RESPONSE_TAG_VERSION) {
            match element.value {
                Value::Unsigned(v) => version = Some(v),
                other => {
                    return Err(ProtocolError::WrongType {
                        field: "version",
                        expected: TlvType::UnsignedInteger,
                        found: other.tlv_type(),
                    })
                }
            }
        }
    }
    reader.exit_container().map_err(mal)?;

    Ok(CommandReply::Response {
        version: version.ok_or(ProtocolError::MissingField("version"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_round_trip() {
        let reply = CommandReply::Response { version: 7 };
        let (profile, msg_type) = reply.message_type();
        let payload = reply.encode().unwrap();
        assert_eq!(&payload[..], &[0x15, 0x24, 0x01, 0x07, 0x18]);
        assert_eq!(CommandReply::decode(profile, msg_type, &payload).unwrap(), reply);
    }

    #[test]
    fn test_status_report_layout() {
        let reply = CommandReply::StatusReport(StatusCode::VERSION_MISMATCH);
        let (profile, msg_type) = reply.message_type();
        assert_eq!((profile, msg_type), (PROFILE_COMMON, MSG_TYPE_STATUS_REPORT));

        let payload = reply.encode().unwrap();
        assert_eq!(&payload[..], &[0x0B, 0x00, 0x00, 0x00, 0x25, 0x00]);
        assert_eq!(CommandReply::decode(profile, msg_type, &payload).unwrap(), reply);
    }

    #[test]
    fn test_short_status_report() {
        assert_eq!(
            CommandReply::decode(PROFILE_COMMON, MSG_TYPE_STATUS_REPORT, &[0, 0, 0]),
            Err(ProtocolError::StatusReportTooShort { expected: 6, actual: 3 })
        );
    }

    #[test]
    fn test_unknown_message_type() {
        assert!(matches!(
            CommandReply::decode(PROFILE_WDM, MSG_TYPE_ONE_WAY_COMMAND, &[]),
            Err(ProtocolError::UnknownMessageType { .. })
        ));
    }
}
