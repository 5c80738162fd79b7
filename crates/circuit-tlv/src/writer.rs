//! TLV encoding.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    ContainerType, Tag, TlvError, TlvResult, TYPE_BOOL_FALSE, TYPE_BOOL_TRUE, TYPE_BYTES_1,
    TYPE_END_OF_CONTAINER, TYPE_INT16, TYPE_INT32, TYPE_INT64, TYPE_INT8, TYPE_NULL,
    TYPE_UINT16, TYPE_UINT32, TYPE_UINT64, TYPE_UINT8, TYPE_UTF8_1,
};

/// Default upper bound on an encoded message, matching one transport packet buffer.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1280;

/// Writes TLV elements into a bounded buffer.
///
/// Integers are written in the narrowest encoding that holds the value. Writing past
/// the configured limit fails with [`TlvError::BufferFull`] and leaves the buffer
/// unchanged.
#[derive(Debug)]
pub struct TlvWriter {
    buf: BytesMut,
    max_len: usize,
    open: Vec<ContainerType>,
}

impl Default for TlvWriter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl TlvWriter {
    /// Create a writer that refuses to grow beyond `max_len` bytes.
    pub fn new(max_len: usize) -> Self {
        TlvWriter {
            buf: BytesMut::with_capacity(max_len.min(DEFAULT_MAX_MESSAGE_SIZE)),
            max_len,
            open: Vec::new(),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Number of containers currently open.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Write an unsigned integer.
    pub fn put_unsigned(&mut self, tag: Tag, value: u64) -> TlvResult<()> {
        if value <= u8::MAX as u64 {
            self.put_head(tag, TYPE_UINT8, 1)?;
            self.buf.put_u8(value as u8);
        } else if value <= u16::MAX as u64 {
            self.put_head(tag, TYPE_UINT16, 2)?;
            self.buf.put_u16_le(value as u16);
        } else if value <= u32::MAX as u64 {
            self.put_head(tag, TYPE_UINT32, 4)?;
            self.buf.put_u32_le(value as u32);
        } else {
            self.put_head(tag, TYPE_UINT64, 8)?;
            self.buf.put_u64_le(value);
        }
        Ok(())
    }

    /// Write a signed integer.
    pub fn put_signed(&mut self, tag: Tag, value: i64) -> TlvResult<()> {
        if i8::try_from(value).is_ok() {
            self.put_head(tag, TYPE_INT8, 1)?;
            self.buf.put_i8(value as i8);
        } else if i16::try_from(value).is_ok() {
            self.put_head(tag, TYPE_INT16, 2)?;
            self.buf.put_i16_le(value as i16);
        } else if i32::try_from(value).is_ok() {
            self.put_head(tag, TYPE_INT32, 4)?;
            self.buf.put_i32_le(value as i32);
        } else {
            self.put_head(tag, TYPE_INT64, 8)?;
            self.buf.put_i64_le(value);
        }
        Ok(())
    }

    /// Write a boolean.
    pub fn put_bool(&mut self, tag: Tag, value: bool) -> TlvResult<()> {
        let element_type = if value { TYPE_BOOL_TRUE } else { TYPE_BOOL_FALSE };
        self.put_head(tag, element_type, 0)
    }

    /// Write a null.
    pub fn put_null(&mut self, tag: Tag) -> TlvResult<()> {
        self.put_head(tag, TYPE_NULL, 0)
    }

    /// Write an unsigned integer, or null when `value` is `None`.
    pub fn put_optional_unsigned(&mut self, tag: Tag, value: Option<u64>) -> TlvResult<()> {
        match value {
            Some(v) => self.put_unsigned(tag, v),
            None => self.put_null(tag),
        }
    }

    /// Write a UTF-8 string.
    pub fn put_string(&mut self, tag: Tag, value: &str) -> TlvResult<()> {
        self.put_length_prefixed(tag, TYPE_UTF8_1, value.as_bytes())
    }

    /// Write a byte string.
    pub fn put_bytes(&mut self, tag: Tag, value: &[u8]) -> TlvResult<()> {
        self.put_length_prefixed(tag, TYPE_BYTES_1, value)
    }

    /// Open a container. Every call must be matched by [`TlvWriter::end_container`].
    pub fn start_container(&mut self, tag: Tag, kind: ContainerType) -> TlvResult<()> {
        // Reserve room for the closing marker so a started container can always be ended.
        self.ensure_room(1 + tag.encoded_len() + 1 + self.open.len())?;
        self.put_head(tag, kind.element_type(), 0)?;
        self.open.push(kind);
        Ok(())
    }

    /// Close the innermost open container.
    pub fn end_container(&mut self) -> TlvResult<()> {
        if self.open.pop().is_none() {
            return Err(TlvError::NoOpenContainer);
        }
        self.buf.put_u8(TYPE_END_OF_CONTAINER);
        Ok(())
    }

    /// Finish writing and return the encoded bytes.
    pub fn finish(self) -> TlvResult<Bytes> {
        if !self.open.is_empty() {
            return Err(TlvError::UnclosedContainer(self.open.len()));
        }
        Ok(self.buf.freeze())
    }

    fn put_length_prefixed(&mut self, tag: Tag, base_type: u8, data: &[u8]) -> TlvResult<()> {
        let len = data.len();
        if len <= u8::MAX as usize {
            self.put_head(tag, base_type, 1 + len)?;
            self.buf.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.put_head(tag, base_type + 1, 2 + len)?;
            self.buf.put_u16_le(len as u16);
        } else if len <= u32::MAX as usize {
            self.put_head(tag, base_type + 2, 4 + len)?;
            self.buf.put_u32_le(len as u32);
        } else {
            self.put_head(tag, base_type + 3, 8 + len)?;
            self.buf.put_u64_le(len as u64);
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Write control byte and tag, after checking that `value_len` more bytes fit too.
    fn put_head(&mut self, tag: Tag, element_type: u8, value_len: usize) -> TlvResult<()> {
        // Space for every open container's end marker stays reserved.
        self.ensure_room(1 + tag.encoded_len() + value_len + self.open.len())?;

        self.buf.put_u8(tag.control() | element_type);
        match tag {
            Tag::Anonymous => {}
            Tag::Context(n) => self.buf.put_u8(n),
            Tag::Profile { profile_id, tag: number } => {
                self.buf.put_u32_le(profile_id);
                if number <= u16::MAX as u32 {
                    self.buf.put_u16_le(number as u16);
                } else {
                    self.buf.put_u32_le(number);
                }
            }
        }
        Ok(())
    }

    fn ensure_room(&self, needed: usize) -> TlvResult<()> {
        let remaining = self.max_len.saturating_sub(self.buf.len());
        if needed > remaining {
            return Err(TlvError::BufferFull {
                needed,
                remaining,
                max: self.max_len,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_uses_narrowest_width() {
        let mut writer = TlvWriter::default();
        writer.put_unsigned(Tag::Context(1), 75).unwrap();
        writer.put_unsigned(Tag::Context(2), 0x1234).unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(&bytes[..], &[0x24, 0x01, 75, 0x25, 0x02, 0x34, 0x12]);
    }

    #[test]
    fn test_signed_negative() {
        let mut writer = TlvWriter::default();
        writer.put_signed(Tag::Anonymous, -1).unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(&bytes[..], &[TYPE_INT8, 0xFF]);
    }

    #[test]
    fn test_structure_with_null() {
        let mut writer = TlvWriter::default();
        writer.start_container(Tag::Anonymous, ContainerType::Structure).unwrap();
        writer.put_null(Tag::Context(1)).unwrap();
        writer.end_container().unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(&bytes[..], &[0x15, 0x34, 0x01, 0x18]);
    }

    #[test]
    fn test_profile_tag_encoding() {
        let mut writer = TlvWriter::default();
        writer
            .put_bool(Tag::Profile { profile_id: 0x0000_000B, tag: 2 }, true)
            .unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(&bytes[..], &[0xC9, 0x0B, 0x00, 0x00, 0x00, 0x02, 0x00]);
    }

    #[test]
    fn test_buffer_full_leaves_buffer_unchanged() {
        let mut writer = TlvWriter::new(4);
        writer.put_unsigned(Tag::Context(1), 1).unwrap();
        let err = writer.put_unsigned(Tag::Context(2), 0xFFFF).unwrap_err();
        assert!(matches!(err, TlvError::BufferFull { max: 4, .. }));
        assert_eq!(writer.len(), 3);
    }

    #[test]
    fn test_end_marker_space_is_reserved() {
        // Structure header (1) + end marker (1) leaves 1 byte; a 3-byte element must not fit.
        let mut writer = TlvWriter::new(3);
        writer.start_container(Tag::Anonymous, ContainerType::Structure).unwrap();
        assert!(writer.put_unsigned(Tag::Context(1), 1).is_err());
        writer.end_container().unwrap();
        assert!(writer.finish().is_ok());
    }

    #[test]
    fn test_unbalanced_containers() {
        let mut writer = TlvWriter::default();
        assert_eq!(writer.end_container(), Err(TlvError::NoOpenContainer));

        writer.start_container(Tag::Anonymous, ContainerType::Array).unwrap();
        assert_eq!(writer.finish().unwrap_err(), TlvError::UnclosedContainer(1));
    }
}
