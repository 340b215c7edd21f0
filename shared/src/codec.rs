//! Positional wire codec for the game protocol
//!
//! Every message on the wire is a tagged, length-prefixed record:
//! `u16 length | u8 tag | body[length]`. Bodies are read strictly in order;
//! a short read or a malformed packed integer fails the whole message but
//! leaves the surrounding buffer usable, so one bad record never poisons the
//! connection it arrived on.
//!
//! Readers borrow the datagram they were created from. Child readers returned
//! by [`MessageReader::read_message`] share that borrow, which makes "copying"
//! a message for verbatim rebroadcast free: [`MessageReader::raw`] hands back
//! the exact header and body bytes as they were received.

use crate::{FloatRange, Vector2};
use thiserror::Error;

/// Errors raised while decoding a message
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of message: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("packed integer exceeds 5 bytes")]
    MalformedPackedInt,

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("sub-message declares {declared} bytes but only {remaining} remain")]
    UnterminatedMessage { declared: usize, remaining: usize },
}

/// Size of the `u16 length | u8 tag` header in front of every message
pub const HEADER_LEN: usize = 3;

/// Cursor over one message body
#[derive(Debug, Clone)]
pub struct MessageReader<'a> {
    tag: u8,
    raw: &'a [u8],
    body: &'a [u8],
    position: usize,
}

impl<'a> MessageReader<'a> {
    /// Creates a reader over a bare body that has no header of its own,
    /// such as a handshake payload or a whole datagram.
    pub fn new(tag: u8, body: &'a [u8]) -> Self {
        Self {
            tag,
            raw: body,
            body,
            position: 0,
        }
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn length(&self) -> usize {
        self.body.len()
    }

    pub fn remaining(&self) -> usize {
        self.body.len() - self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.body.len()
    }

    /// Header plus body exactly as received
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Body bytes that have not been read yet
    pub fn rest(&self) -> &'a [u8] {
        &self.body[self.position..]
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < count {
            return Err(CodecError::UnexpectedEnd {
                needed: count,
                remaining: self.remaining(),
            });
        }

        let slice = &self.body[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    /// Reads a 7-bit packed unsigned integer (at most 5 bytes)
    pub fn read_packed_u32(&mut self) -> Result<u32, CodecError> {
        let mut value: u32 = 0;

        for index in 0..5 {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << (7 * index);

            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }

        Err(CodecError::MalformedPackedInt)
    }

    pub fn read_packed_i32(&mut self) -> Result<i32, CodecError> {
        Ok(self.read_packed_u32()? as i32)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        self.take(count)
    }

    pub fn read_bytes_and_size(&mut self) -> Result<&'a [u8], CodecError> {
        let length = self.read_packed_u32()? as usize;
        self.take(length)
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let bytes = self.read_bytes_and_size()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    /// Reads a quantized 2D vector mapped from `range` onto two `u16`s
    pub fn read_vector2(&mut self, range: FloatRange) -> Result<Vector2, CodecError> {
        let x = self.read_u16()?;
        let y = self.read_u16()?;
        Ok(Vector2::dequantize(x, y, range))
    }

    /// Reads a nested length-prefixed message and advances past it
    pub fn read_message(&mut self) -> Result<MessageReader<'a>, CodecError> {
        let start = self.position;
        let length = self.read_u16()? as usize;
        let tag = self.read_u8()?;

        if self.remaining() < length {
            let remaining = self.remaining();
            self.position = start;
            return Err(CodecError::UnterminatedMessage {
                declared: length,
                remaining,
            });
        }

        let body_start = self.position;
        self.position += length;

        Ok(MessageReader {
            tag,
            raw: &self.body[start..self.position],
            body: &self.body[body_start..self.position],
            position: 0,
        })
    }
}

/// Iterator over consecutive top-level messages in a buffer
pub struct Messages<'a> {
    reader: MessageReader<'a>,
    failed: bool,
}

impl<'a> Iterator for Messages<'a> {
    type Item = Result<MessageReader<'a>, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.is_exhausted() {
            return None;
        }

        let next = self.reader.read_message();
        if next.is_err() {
            self.failed = true;
        }
        Some(next)
    }
}

/// Splits a payload into the messages it contains. Iteration stops after the
/// first framing error since the remaining boundaries can no longer be trusted.
pub fn read_messages(buffer: &[u8]) -> Messages<'_> {
    Messages {
        reader: MessageReader::new(u8::MAX, buffer),
        failed: false,
    }
}

/// Accumulates a payload of (possibly nested) messages
#[derive(Debug, Default, Clone)]
pub struct MessageWriter {
    buffer: Vec<u8>,
    open: Vec<usize>,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a message; the length is back-patched by [`end_message`](Self::end_message)
    pub fn start_message(&mut self, tag: u8) {
        self.open.push(self.buffer.len());
        self.buffer.extend_from_slice(&[0, 0, tag]);
    }

    pub fn end_message(&mut self) {
        if let Some(start) = self.open.pop() {
            let length = (self.buffer.len() - start - HEADER_LEN) as u16;
            self.buffer[start..start + 2].copy_from_slice(&length.to_le_bytes());
        }
    }

    /// Discards the innermost open message and everything written into it
    pub fn cancel_message(&mut self) {
        if let Some(start) = self.open.pop() {
            self.buffer.truncate(start);
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_packed_u32(&mut self, mut value: u32) {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.buffer.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    pub fn write_packed_i32(&mut self, value: i32) {
        self.write_packed_u32(value as u32);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_bytes_and_size(&mut self, bytes: &[u8]) {
        self.write_packed_u32(bytes.len() as u32);
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_bytes_and_size(value.as_bytes());
    }

    pub fn write_vector2(&mut self, vector: Vector2, range: FloatRange) {
        let (x, y) = vector.quantize(range);
        self.write_u16(x);
        self.write_u16(y);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Closes any message left open and returns the finished payload
    pub fn into_bytes(mut self) -> Vec<u8> {
        while !self.open.is_empty() {
            self.end_message();
        }
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NET_RANGE;

    #[test]
    fn test_packed_int_encoding() {
        let cases: [(u32, &[u8]); 5] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (300, &[0xAC, 0x02]),
            (u32::MAX, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];

        for (value, expected) in cases {
            let mut writer = MessageWriter::new();
            writer.write_packed_u32(value);
            assert_eq!(writer.as_bytes(), expected, "encoding {}", value);

            let mut reader = MessageReader::new(0, expected);
            assert_eq!(reader.read_packed_u32().unwrap(), value);
            assert!(reader.is_exhausted());
        }
    }

    #[test]
    fn test_negative_packed_int() {
        let mut writer = MessageWriter::new();
        writer.write_packed_i32(-1);
        assert_eq!(writer.len(), 5);

        let bytes = writer.into_bytes();
        let mut reader = MessageReader::new(0, &bytes);
        assert_eq!(reader.read_packed_i32().unwrap(), -1);
    }

    #[test]
    fn test_malformed_packed_int() {
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let mut reader = MessageReader::new(0, &bytes);
        assert_eq!(reader.read_packed_u32(), Err(CodecError::MalformedPackedInt));
    }

    #[test]
    fn test_short_read() {
        let bytes = [0x01, 0x02];
        let mut reader = MessageReader::new(0, &bytes);
        assert_eq!(
            reader.read_i32(),
            Err(CodecError::UnexpectedEnd {
                needed: 4,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_string_fields() {
        let mut writer = MessageWriter::new();
        writer.write_string("Red");
        writer.write_string("");
        let bytes = writer.into_bytes();

        let mut reader = MessageReader::new(0, &bytes);
        assert_eq!(reader.read_string().unwrap(), "Red");
        assert_eq!(reader.read_string().unwrap(), "");
    }

    #[test]
    fn test_invalid_utf8_string() {
        let bytes = [0x02, 0xC3, 0x28];
        let mut reader = MessageReader::new(0, &bytes);
        assert_eq!(reader.read_string(), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn test_nested_messages() {
        let mut writer = MessageWriter::new();
        writer.start_message(5);
        writer.write_i32(42);
        writer.start_message(2);
        writer.write_packed_u32(7);
        writer.write_u8(13);
        writer.end_message();
        writer.end_message();
        let bytes = writer.into_bytes();

        let mut outer_reader = MessageReader::new(u8::MAX, &bytes);
        let mut outer = outer_reader.read_message().unwrap();
        assert_eq!(outer.tag(), 5);
        assert_eq!(outer.raw(), &bytes[..]);
        assert_eq!(outer.read_i32().unwrap(), 42);

        let mut inner = outer.read_message().unwrap();
        assert_eq!(inner.tag(), 2);
        assert_eq!(inner.read_packed_u32().unwrap(), 7);
        assert_eq!(inner.read_u8().unwrap(), 13);
        assert!(outer.is_exhausted());
    }

    #[test]
    fn test_unterminated_message() {
        // Declares 10 body bytes but carries 2
        let bytes = [0x0A, 0x00, 0x01, 0xAA, 0xBB];
        let mut reader = MessageReader::new(u8::MAX, &bytes);
        assert_eq!(
            reader.read_message().unwrap_err(),
            CodecError::UnterminatedMessage {
                declared: 10,
                remaining: 2
            }
        );
    }

    #[test]
    fn test_read_messages_stops_after_error() {
        let mut writer = MessageWriter::new();
        writer.start_message(1);
        writer.write_u8(9);
        writer.end_message();
        let mut bytes = writer.into_bytes();
        bytes.extend_from_slice(&[0xFF, 0x00, 0x02]);

        let results: Vec<_> = read_messages(&bytes).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_cancel_message() {
        let mut writer = MessageWriter::new();
        writer.write_u8(1);
        writer.start_message(3);
        writer.write_i32(5);
        writer.cancel_message();
        assert_eq!(writer.as_bytes(), &[1]);
    }

    #[test]
    fn test_vector_field() {
        let mut writer = MessageWriter::new();
        writer.write_vector2(Vector2::new(0.0, 0.0), NET_RANGE);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), 4);

        let mut reader = MessageReader::new(0, &bytes);
        let vector = reader.read_vector2(NET_RANGE).unwrap();
        assert!(vector.x.abs() < NET_RANGE.step());
        assert!(vector.y.abs() < NET_RANGE.step());
    }
}
