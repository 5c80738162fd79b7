//! Protocol error types.

use circuit_tlv::{Tag, TlvError, TlvType};
use thiserror::Error;

/// Errors that can occur when encoding or decoding command messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The TLV encoding itself is truncated or invalid.
    #[error("malformed field: {0}")]
    MalformedField(TlvError),

    /// An element appeared where a different one was expected, or an expected one is missing.
    #[error("unexpected element: expected {expected}, found {}", describe_found(.found))]
    UnexpectedElement {
        /// Tag that should have come next.
        expected: Tag,
        /// Tag that was found. `None` when the container ended early.
        found: Option<Tag>,
    },

    /// Trailing element after the last expected field.
    #[error("extra element {0} after last expected field")]
    ExtraElement(Tag),

    /// Field has the wrong element type.
    #[error("{field}: expected {expected}, found {found}")]
    WrongType {
        /// Field name.
        field: &'static str,
        /// Type the field must have.
        expected: TlvType,
        /// Type that was found.
        found: TlvType,
    },

    /// Numeric field outside its permitted range.
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: i128,
    },

    /// A mandatory envelope field is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// The message buffer cannot hold the encoded message.
    #[error("encoding failed: {0}")]
    EncodingFailed(TlvError),

    /// Reply with a profile/message type pair this codec does not know.
    #[error("unknown message type 0x{msg_type:02X} in profile 0x{profile_id:08X}")]
    UnknownMessageType {
        /// Profile of the message.
        profile_id: u32,
        /// Message type within the profile.
        msg_type: u8,
    },

    /// Status report payload has the wrong length.
    #[error("status report too short: expected {expected} bytes, got {actual}")]
    StatusReportTooShort {
        /// Required length.
        expected: usize,
        /// Received length.
        actual: usize,
    },
}

impl ProtocolError {
    /// Short name for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::MalformedField(_) => "malformed_field",
            ProtocolError::UnexpectedElement { .. } | ProtocolError::ExtraElement(_) => {
                "unexpected_element"
            }
            ProtocolError::WrongType { .. } => "wrong_type",
            ProtocolError::OutOfRange { .. } => "out_of_range",
            ProtocolError::MissingField(_) => "missing_field",
            ProtocolError::EncodingFailed(_) => "encoding_failed",
            ProtocolError::UnknownMessageType { .. } => "unknown_message_type",
            ProtocolError::StatusReportTooShort { .. } => "status_report_too_short",
        }
    }
}

fn describe_found(found: &Option<Tag>) -> String {
    match found {
        Some(tag) => tag.to_string(),
        None => "end of container".to_string(),
    }
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
