//! TLV decoding.

use crate::{
    ContainerType, Element, Tag, TlvError, TlvResult, Value, ELEMENT_TYPE_MASK,
    TAG_CONTROL_ANONYMOUS, TAG_CONTROL_CONTEXT, TAG_CONTROL_FULLY_QUALIFIED_6,
    TAG_CONTROL_FULLY_QUALIFIED_8, TAG_CONTROL_MASK, TYPE_ARRAY, TYPE_BOOL_FALSE, TYPE_BOOL_TRUE,
    TYPE_BYTES_1, TYPE_END_OF_CONTAINER, TYPE_FLOAT32, TYPE_FLOAT64, TYPE_INT64, TYPE_INT8,
    TYPE_NULL, TYPE_PATH, TYPE_STRUCTURE, TYPE_UINT64, TYPE_UINT8, TYPE_UTF8_1,
};

/// Result of parsing the bytes at one offset.
enum Parsed<'a> {
    Element(Element<'a>, usize),
    EndOfContainer,
}

/// Pull-style reader over a TLV buffer.
///
/// [`TlvReader::next`] yields the elements of the current nesting level in order and
/// returns `None` at the end of the enclosing container (or of the input, at top level).
/// Containers are skipped as a whole unless [`TlvReader::enter_container`] is called
/// right after they were returned.
#[derive(Debug)]
pub struct TlvReader<'a> {
    data: &'a [u8],
    pos: usize,
    current: Option<Element<'a>>,
    current_start: usize,
    /// The current element is a container whose members have not been consumed.
    unentered_container: bool,
    /// The end marker of the innermost container has already been consumed.
    container_ended: bool,
    open: Vec<ContainerType>,
}

impl<'a> TlvReader<'a> {
    /// Create a reader positioned before the first element of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        TlvReader {
            data,
            pos: 0,
            current: None,
            current_start: 0,
            unentered_container: false,
            container_ended: false,
            open: Vec::new(),
        }
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of containers entered and not yet exited.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// The element most recently returned by [`TlvReader::next`].
    pub fn current(&self) -> Option<&Element<'a>> {
        self.current.as_ref()
    }

    /// Advance to the next element at the current nesting level.
    pub fn next(&mut self) -> TlvResult<Option<Element<'a>>> {
        if self.unentered_container {
            self.pos = self.skip_container_body(self.pos)?;
            self.unentered_container = false;
        }
        self.current = None;

        if self.container_ended {
            return Ok(None);
        }
        if self.pos >= self.data.len() {
            if self.open.is_empty() {
                return Ok(None);
            }
            return Err(TlvError::UnterminatedContainer(self.pos));
        }

        let start = self.pos;
        match self.parse_at(start)? {
            Parsed::EndOfContainer => {
                if self.open.is_empty() {
                    return Err(TlvError::UnexpectedEndOfContainer(start));
                }
                self.pos = start + 1;
                self.container_ended = true;
                Ok(None)
            }
            Parsed::Element(element, next) => {
                self.pos = next;
                self.current = Some(element);
                self.current_start = start;
                self.unentered_container = element.is_container();
                Ok(Some(element))
            }
        }
    }

    /// Descend into the container element just returned by [`TlvReader::next`].
    pub fn enter_container(&mut self) -> TlvResult<ContainerType> {
        let kind = match (self.current, self.unentered_container) {
            (Some(Element { value: Value::Container(kind), .. }), true) => kind,
            _ => return Err(TlvError::NotAContainer),
        };
        self.open.push(kind);
        self.unentered_container = false;
        self.container_ended = false;
        self.current = None;
        Ok(kind)
    }

    /// Leave the innermost container, skipping any members that were not read.
    pub fn exit_container(&mut self) -> TlvResult<()> {
        if self.open.is_empty() {
            return Err(TlvError::NotInContainer);
        }
        if self.unentered_container {
            self.pos = self.skip_container_body(self.pos)?;
            self.unentered_container = false;
        }
        if !self.container_ended {
            // Walking the remaining members is the same as skipping a body we are inside of.
            self.pos = self.skip_container_body(self.pos)?;
        }
        self.open.pop();
        self.container_ended = false;
        self.current = None;
        Ok(())
    }

    /// Raw encoding of the current element, including its control byte and tag.
    ///
    /// For a container that was not entered, the whole container is consumed and the
    /// returned slice runs through its end marker.
    pub fn current_element_bytes(&mut self) -> TlvResult<&'a [u8]> {
        if self.current.is_none() {
            return Err(TlvError::NoCurrentElement);
        }
        if self.unentered_container {
            self.pos = self.skip_container_body(self.pos)?;
            self.unentered_container = false;
        }
        let data: &'a [u8] = self.data;
        Ok(&data[self.current_start..self.pos])
    }

    /// Skip members starting at `pos` up to and including the matching end marker.
    fn skip_container_body(&self, mut pos: usize) -> TlvResult<usize> {
        let mut depth = 1usize;
        while depth > 0 {
            if pos >= self.data.len() {
                return Err(TlvError::UnterminatedContainer(pos));
            }
            match self.parse_at(pos)? {
                Parsed::EndOfContainer => {
                    pos += 1;
                    depth -= 1;
                }
                Parsed::Element(element, next) => {
                    pos = next;
                    if element.is_container() {
                        depth += 1;
                    }
                }
            }
        }
        Ok(pos)
    }

    fn parse_at(&self, offset: usize) -> TlvResult<Parsed<'a>> {
        let data: &'a [u8] = self.data;
        let control = data[offset];
        let element_type = control & ELEMENT_TYPE_MASK;
        let tag_control = control & TAG_CONTROL_MASK;

        if element_type == TYPE_END_OF_CONTAINER {
            return Ok(Parsed::EndOfContainer);
        }

        let mut cursor = offset + 1;
        let tag = match tag_control {
            TAG_CONTROL_ANONYMOUS => Tag::Anonymous,
            TAG_CONTROL_CONTEXT => Tag::Context(take(data, offset, &mut cursor, 1)?[0]),
            TAG_CONTROL_FULLY_QUALIFIED_6 => {
                let b = take(data, offset, &mut cursor, 6)?;
                Tag::Profile {
                    profile_id: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                    tag: u16::from_le_bytes([b[4], b[5]]) as u32,
                }
            }
            TAG_CONTROL_FULLY_QUALIFIED_8 => {
                let b = take(data, offset, &mut cursor, 8)?;
                Tag::Profile {
                    profile_id: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                    tag: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
                }
            }
            other => {
                return Err(TlvError::UnsupportedTagControl {
                    offset,
                    tag_control: other,
                })
            }
        };

        let value = match element_type {
            TYPE_INT8..=TYPE_INT64 => {
                let b = take(data, offset, &mut cursor, 1 << (element_type - TYPE_INT8))?;
                Value::Signed(read_signed(b))
            }
            TYPE_UINT8..=TYPE_UINT64 => {
                let b = take(data, offset, &mut cursor, 1 << (element_type - TYPE_UINT8))?;
                Value::Unsigned(read_unsigned(b))
            }
            TYPE_BOOL_FALSE => Value::Bool(false),
            TYPE_BOOL_TRUE => Value::Bool(true),
            TYPE_FLOAT32 => {
                let b = take(data, offset, &mut cursor, 4)?;
                Value::Float(f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            }
            TYPE_FLOAT64 => {
                let b = take(data, offset, &mut cursor, 8)?;
                Value::Float(f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            }
            t if (TYPE_UTF8_1..TYPE_UTF8_1 + 4).contains(&t) => {
                let body = take_length_prefixed(data, offset, &mut cursor, t - TYPE_UTF8_1)?;
                let text = std::str::from_utf8(body).map_err(|_| TlvError::InvalidUtf8(offset))?;
                Value::Utf8(text)
            }
            t if (TYPE_BYTES_1..TYPE_BYTES_1 + 4).contains(&t) => {
                Value::Bytes(take_length_prefixed(data, offset, &mut cursor, t - TYPE_BYTES_1)?)
            }
            TYPE_NULL => Value::Null,
            TYPE_STRUCTURE => Value::Container(ContainerType::Structure),
            TYPE_ARRAY => Value::Container(ContainerType::Array),
            TYPE_PATH => Value::Container(ContainerType::Path),
            other => {
                return Err(TlvError::InvalidElementType {
                    offset,
                    element_type: other,
                })
            }
        };

        Ok(Parsed::Element(Element { tag, value }, cursor))
    }
}

fn take<'a>(data: &'a [u8], offset: usize, cursor: &mut usize, n: usize) -> TlvResult<&'a [u8]> {
    let end = cursor.checked_add(n).ok_or(TlvError::truncated(offset, n))?;
    if end > data.len() {
        return Err(TlvError::truncated(offset, end - data.len()));
    }
    let slice = &data[*cursor..end];
    *cursor = end;
    Ok(slice)
}

fn take_length_prefixed<'a>(
    data: &'a [u8],
    offset: usize,
    cursor: &mut usize,
    width_code: u8,
) -> TlvResult<&'a [u8]> {
    let len_bytes = take(data, offset, cursor, 1 << width_code)?;
    let len = usize::try_from(read_unsigned(len_bytes))
        .map_err(|_| TlvError::truncated(offset, usize::MAX))?;
    take(data, offset, cursor, len)
}

fn read_unsigned(b: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw[..b.len()].copy_from_slice(b);
    u64::from_le_bytes(raw)
}

fn read_signed(b: &[u8]) -> i64 {
    match b.len() {
        1 => i8::from_le_bytes([b[0]]) as i64,
        2 => i16::from_le_bytes([b[0], b[1]]) as i64,
        4 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
        _ => read_unsigned(b) as i64,
    }
}
