//! Tag-length-value (TLV) encoding.
//!
//! Command messages exchanged between a switch and a light controller are encoded
//! as a tree of TLV elements. Every element starts with a single control byte:
//!
//! ```text
//! +-----------------+------------------+
//! | tag control (3) | element type (5) |
//! +-----------------+------------------+
//! ```
//!
//! followed by the tag bytes (if any), a length field (strings only) and the value.
//! All multi-byte quantities are little-endian. Structures, arrays and paths are
//! closed by an end-of-container element.
//!
//! # Example
//!
//! ```rust
//! use circuit_tlv::{ContainerType, Tag, TlvReader, TlvWriter, Value};
//!
//! let mut writer = TlvWriter::new(64);
//! writer.start_container(Tag::Anonymous, ContainerType::Structure).unwrap();
//! writer.put_unsigned(Tag::Context(1), 42).unwrap();
//! writer.end_container().unwrap();
//! let bytes = writer.finish().unwrap();
//!
//! let mut reader = TlvReader::new(&bytes);
//! reader.next().unwrap();
//! reader.enter_container().unwrap();
//! let element = reader.next().unwrap().unwrap();
//! assert_eq!(element.tag, Tag::Context(1));
//! assert_eq!(element.value, Value::Unsigned(42));
//! ```

mod error;
mod reader;
mod types;
mod writer;

pub use error::*;
pub use reader::*;
pub use types::*;
pub use writer::*;
