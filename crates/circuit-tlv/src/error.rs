//! Error types for circuit-tlv.

use thiserror::Error;

/// Errors that can occur while writing or reading TLV data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlvError {
    /// The output buffer cannot hold the element.
    #[error("buffer full: element needs {needed} bytes, {remaining} remaining (max {max})")]
    BufferFull {
        /// Bytes required by the element being written.
        needed: usize,
        /// Bytes still available.
        remaining: usize,
        /// Configured buffer limit.
        max: usize,
    },

    /// `end_container` was called with no open container.
    #[error("no open container to end")]
    NoOpenContainer,

    /// `finish` was called while containers were still open.
    #[error("{0} container(s) left open")]
    UnclosedContainer(usize),

    /// Input ended in the middle of an element.
    #[error("truncated element at offset {offset}: needed {needed} more bytes")]
    Truncated {
        /// Offset of the element being decoded.
        offset: usize,
        /// Missing byte count.
        needed: usize,
    },

    /// Control byte carries an element type this decoder does not know.
    #[error("invalid element type 0x{element_type:02X} at offset {offset}")]
    InvalidElementType {
        /// Offset of the control byte.
        offset: usize,
        /// The unknown type code.
        element_type: u8,
    },

    /// Control byte carries a tag form this decoder does not support.
    #[error("unsupported tag control 0x{tag_control:02X} at offset {offset}")]
    UnsupportedTagControl {
        /// Offset of the control byte.
        offset: usize,
        /// The tag control bits.
        tag_control: u8,
    },

    /// End-of-container marker outside of any container.
    #[error("unexpected end of container at offset {0}")]
    UnexpectedEndOfContainer(usize),

    /// Input ended with containers still open.
    #[error("input ended inside a container at offset {0}")]
    UnterminatedContainer(usize),

    /// `enter_container` called on an element that is not a container.
    #[error("current element is not a container")]
    NotAContainer,

    /// `exit_container` called at top level.
    #[error("not inside a container")]
    NotInContainer,

    /// String element does not hold valid UTF-8.
    #[error("invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// No element has been read yet.
    #[error("no current element")]
    NoCurrentElement,
}

impl TlvError {
    /// Create a truncation error.
    pub fn truncated(offset: usize, needed: usize) -> Self {
        TlvError::Truncated { offset, needed }
    }
}

/// Result type alias for TLV operations.
pub type TlvResult<T> = Result<T, TlvError>;
