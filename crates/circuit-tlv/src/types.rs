//! Element types, tags and decoded values.

use std::fmt;

// ============================================================================
// Control Byte Layout
// ============================================================================

/// Mask selecting the tag control bits of a control byte.
pub const TAG_CONTROL_MASK: u8 = 0xE0;
/// Mask selecting the element type bits of a control byte.
pub const ELEMENT_TYPE_MASK: u8 = 0x1F;

/// Tag control: no tag.
pub const TAG_CONTROL_ANONYMOUS: u8 = 0x00;
/// Tag control: 1-byte context-specific tag.
pub const TAG_CONTROL_CONTEXT: u8 = 0x20;
/// Tag control: fully-qualified tag with a 32-bit profile id and 16-bit tag number.
pub const TAG_CONTROL_FULLY_QUALIFIED_6: u8 = 0xC0;
/// Tag control: fully-qualified tag with a 32-bit profile id and 32-bit tag number.
pub const TAG_CONTROL_FULLY_QUALIFIED_8: u8 = 0xE0;

/// Signed integer, 1 byte.
pub const TYPE_INT8: u8 = 0x00;
/// Signed integer, 2 bytes.
pub const TYPE_INT16: u8 = 0x01;
/// Signed integer, 4 bytes.
pub const TYPE_INT32: u8 = 0x02;
/// Signed integer, 8 bytes.
pub const TYPE_INT64: u8 = 0x03;
/// Unsigned integer, 1 byte.
pub const TYPE_UINT8: u8 = 0x04;
/// Unsigned integer, 2 bytes.
pub const TYPE_UINT16: u8 = 0x05;
/// Unsigned integer, 4 bytes.
pub const TYPE_UINT32: u8 = 0x06;
/// Unsigned integer, 8 bytes.
pub const TYPE_UINT64: u8 = 0x07;
/// Boolean false.
pub const TYPE_BOOL_FALSE: u8 = 0x08;
/// Boolean true.
pub const TYPE_BOOL_TRUE: u8 = 0x09;
/// 32-bit float.
pub const TYPE_FLOAT32: u8 = 0x0A;
/// 64-bit float.
pub const TYPE_FLOAT64: u8 = 0x0B;
/// UTF-8 string with a 1-byte length (2/4/8-byte lengths follow at +1/+2/+3).
pub const TYPE_UTF8_1: u8 = 0x0C;
/// Byte string with a 1-byte length (2/4/8-byte lengths follow at +1/+2/+3).
pub const TYPE_BYTES_1: u8 = 0x10;
/// Null.
pub const TYPE_NULL: u8 = 0x14;
/// Structure container.
pub const TYPE_STRUCTURE: u8 = 0x15;
/// Array container.
pub const TYPE_ARRAY: u8 = 0x16;
/// Path container.
pub const TYPE_PATH: u8 = 0x17;
/// End of the innermost open container.
pub const TYPE_END_OF_CONTAINER: u8 = 0x18;

// ============================================================================
// Tags
// ============================================================================

/// The tag attached to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// No tag. Used for top-level elements and array members.
    Anonymous,
    /// Context-specific tag, meaningful only inside its enclosing container.
    Context(u8),
    /// Tag qualified by a profile id.
    Profile {
        /// Profile that defines the tag.
        profile_id: u32,
        /// Tag number within the profile.
        tag: u32,
    },
}

impl Tag {
    /// Tag control bits for this tag.
    pub fn control(&self) -> u8 {
        match self {
            Tag::Anonymous => TAG_CONTROL_ANONYMOUS,
            Tag::Context(_) => TAG_CONTROL_CONTEXT,
            Tag::Profile { tag, .. } if *tag <= u16::MAX as u32 => TAG_CONTROL_FULLY_QUALIFIED_6,
            Tag::Profile { .. } => TAG_CONTROL_FULLY_QUALIFIED_8,
        }
    }

    /// Number of bytes the tag occupies after the control byte.
    pub fn encoded_len(&self) -> usize {
        match self.control() {
            TAG_CONTROL_CONTEXT => 1,
            TAG_CONTROL_FULLY_QUALIFIED_6 => 6,
            TAG_CONTROL_FULLY_QUALIFIED_8 => 8,
            _ => 0,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Anonymous => write!(f, "anonymous"),
            Tag::Context(n) => write!(f, "context({})", n),
            Tag::Profile { profile_id, tag } => write!(f, "profile(0x{:08X}:{})", profile_id, tag),
        }
    }
}

// ============================================================================
// Logical Types
// ============================================================================

/// The kind of container element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerType {
    /// Members are tagged and unordered.
    Structure,
    /// Members are anonymous and ordered.
    Array,
    /// Members are tagged and ordered.
    Path,
}

impl ContainerType {
    /// Element type code for this container.
    pub fn element_type(&self) -> u8 {
        match self {
            ContainerType::Structure => TYPE_STRUCTURE,
            ContainerType::Array => TYPE_ARRAY,
            ContainerType::Path => TYPE_PATH,
        }
    }
}

/// The logical type of an element, independent of its encoded width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlvType {
    /// Signed integer of any width.
    SignedInteger,
    /// Unsigned integer of any width.
    UnsignedInteger,
    /// Boolean.
    Boolean,
    /// Floating point number.
    FloatingPoint,
    /// UTF-8 string.
    Utf8String,
    /// Byte string.
    ByteString,
    /// Null.
    Null,
    /// Structure, array or path.
    Container(ContainerType),
}

impl fmt::Display for TlvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlvType::SignedInteger => write!(f, "signed integer"),
            TlvType::UnsignedInteger => write!(f, "unsigned integer"),
            TlvType::Boolean => write!(f, "boolean"),
            TlvType::FloatingPoint => write!(f, "floating point"),
            TlvType::Utf8String => write!(f, "utf-8 string"),
            TlvType::ByteString => write!(f, "byte string"),
            TlvType::Null => write!(f, "null"),
            TlvType::Container(ContainerType::Structure) => write!(f, "structure"),
            TlvType::Container(ContainerType::Array) => write!(f, "array"),
            TlvType::Container(ContainerType::Path) => write!(f, "path"),
        }
    }
}

// ============================================================================
// Decoded Elements
// ============================================================================

/// A decoded element value. Strings borrow from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// Signed integer.
    Signed(i64),
    /// Unsigned integer.
    Unsigned(u64),
    /// Boolean.
    Bool(bool),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    Utf8(&'a str),
    /// Byte string.
    Bytes(&'a [u8]),
    /// Null.
    Null,
    /// Start of a container; members follow.
    Container(ContainerType),
}

impl Value<'_> {
    /// Logical type of this value.
    pub fn tlv_type(&self) -> TlvType {
        match self {
            Value::Signed(_) => TlvType::SignedInteger,
            Value::Unsigned(_) => TlvType::UnsignedInteger,
            Value::Bool(_) => TlvType::Boolean,
            Value::Float(_) => TlvType::FloatingPoint,
            Value::Utf8(_) => TlvType::Utf8String,
            Value::Bytes(_) => TlvType::ByteString,
            Value::Null => TlvType::Null,
            Value::Container(kind) => TlvType::Container(*kind),
        }
    }

    /// Integer value widened to `i128`, for range checks across signed and unsigned forms.
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Signed(v) => Some(*v as i128),
            Value::Unsigned(v) => Some(*v as i128),
            _ => None,
        }
    }
}

/// One element read from a TLV buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element<'a> {
    /// Element tag.
    pub tag: Tag,
    /// Element value.
    pub value: Value<'a>,
}

impl<'a> Element<'a> {
    /// Logical type of this element.
    pub fn tlv_type(&self) -> TlvType {
        self.value.tlv_type()
    }

    /// Whether this element opens a container.
    pub fn is_container(&self) -> bool {
        matches!(self.value, Value::Container(_))
    }
}
