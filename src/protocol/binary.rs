//! Binary encode/decode of envelopes, field streams, and primitive values.
//!
//! Wire grammar (all multi-byte integers are Big Endian):
//!
//! ```text
//! message  := [nameLen:i32][name:bytes][kind:byte][seqId:i32] fields
//! fields   := { [tag:byte][fieldId:i16][value] }* [stopTag:byte]
//! string   := [len:i32][bytes]
//! list     := [elemTag:byte][count:i32][elements...]
//! float    := IEEE-754 bit pattern through the i32 path
//! ```
//!
//! [`BinaryReader`] consumes a fully captured datagram payload; it never
//! performs network reads. [`BinaryWriter`] accumulates into a buffer that
//! the datagram socket sends on flush.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{AppErrorKind, AppException, ProtocolErrorKind, Result, RpcError};

use super::types::{MessageKind, WireType};

/// Block size for chunked string/binary reads. A corrupt or hostile length
/// field never forces an allocation larger than this up front.
pub const READ_CHUNK_LIMIT: usize = 32 * 1024;

/// Recursion bound for skipping nested struct/list values.
const MAX_SKIP_DEPTH: usize = 32;

/// The fixed header preceding a field stream: method name, message kind,
/// and the caller-chosen sequence ID (echoed back verbatim in replies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub name: String,
    pub kind: MessageKind,
    pub seq_id: i32,
}

impl Envelope {
    pub fn call(name: impl Into<String>, seq_id: i32) -> Self {
        Self {
            name: name.into(),
            kind: MessageKind::Call,
            seq_id,
        }
    }

    pub fn reply(name: impl Into<String>, seq_id: i32) -> Self {
        Self {
            name: name.into(),
            kind: MessageKind::Reply,
            seq_id,
        }
    }

    pub fn exception(name: impl Into<String>, seq_id: i32) -> Self {
        Self {
            name: name.into(),
            kind: MessageKind::Exception,
            seq_id,
        }
    }
}

/// Decoder over one datagram payload.
#[derive(Debug)]
pub struct BinaryReader {
    buf: Bytes,
}

impl BinaryReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Bytes left in the captured payload.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    #[inline]
    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            Err(RpcError::eof())
        } else {
            Ok(())
        }
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    /// Any nonzero byte decodes as true; some encoders write 0xFF.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    /// Reconstructs the exact IEEE-754 bit pattern sent by the writer.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_i32()? as u32))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let raw = self.read_binary()?;
        String::from_utf8(raw)
            .map_err(|e| RpcError::invalid_data(format!("invalid UTF-8 in string: {e}")))
    }

    pub fn read_binary(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len("string")?;
        self.read_chunked(len)
    }

    pub fn read_field_begin(&mut self) -> Result<(WireType, i16)> {
        let tag = WireType::try_from(self.read_byte()?)?;
        if tag == WireType::Stop {
            // No field ID follows a stop tag.
            return Ok((WireType::Stop, 0));
        }
        let id = self.read_i16()?;
        Ok((tag, id))
    }

    pub fn read_list_begin(&mut self) -> Result<(WireType, usize)> {
        let elem = WireType::try_from(self.read_byte()?)?;
        let count = self.read_i32()?;
        if count < 0 {
            return Err(RpcError::negative_size("list"));
        }
        Ok((elem, count as usize))
    }

    pub fn read_message_begin(&mut self) -> Result<Envelope> {
        let name = self.read_string()?;
        let kind = MessageKind::try_from(self.read_byte()?)?;
        let seq_id = self.read_i32()?;
        Ok(Envelope { name, kind, seq_id })
    }

    /// Consume one value of the given type without interpreting it, so an
    /// unknown field ID can be skipped without corrupting later reads.
    pub fn skip(&mut self, wire_type: WireType) -> Result<()> {
        self.skip_inner(wire_type, 0)
    }

    fn skip_inner(&mut self, wire_type: WireType, depth: usize) -> Result<()> {
        if depth > MAX_SKIP_DEPTH {
            return Err(RpcError::protocol(
                ProtocolErrorKind::DepthLimit,
                "nested value exceeds skip depth limit",
            ));
        }
        match wire_type {
            WireType::Void => Ok(()),
            WireType::Bool | WireType::Byte => self.read_byte().map(|_| ()),
            WireType::I16 => self.read_i16().map(|_| ()),
            WireType::I32 | WireType::Float => self.read_i32().map(|_| ()),
            WireType::String => {
                let len = self.read_len("string")?;
                self.discard(len)
            }
            WireType::Struct => loop {
                let (field_type, _) = self.read_field_begin()?;
                if field_type == WireType::Stop {
                    return Ok(());
                }
                self.skip_inner(field_type, depth + 1)?;
            },
            WireType::List => {
                let (elem, count) = self.read_list_begin()?;
                for _ in 0..count {
                    self.skip_inner(elem, depth + 1)?;
                }
                Ok(())
            }
            WireType::Stop => Err(RpcError::invalid_data("cannot skip a stop tag")),
        }
    }

    fn read_len(&mut self, what: &str) -> Result<usize> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(RpcError::negative_size(what));
        }
        Ok(len as usize)
    }

    /// Copy out `len` bytes in blocks of at most [`READ_CHUNK_LIMIT`].
    fn read_chunked(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len.min(READ_CHUNK_LIMIT));
        let mut block = vec![0u8; len.min(READ_CHUNK_LIMIT)];
        let mut left = len;
        while left > 0 {
            let take = left.min(block.len());
            self.need(take)?;
            self.buf.copy_to_slice(&mut block[..take]);
            out.extend_from_slice(&block[..take]);
            left -= take;
        }
        Ok(out)
    }

    fn discard(&mut self, len: usize) -> Result<()> {
        self.need(len)?;
        self.buf.advance(len);
        Ok(())
    }
}

/// Encoder accumulating the outbound side of one datagram.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Detach the accumulated bytes, leaving the writer empty.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn write_byte(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_byte(u8::from(value));
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    /// Transmit the raw bit pattern through the i32 path.
    pub fn write_f32(&mut self, value: f32) {
        self.write_i32(value.to_bits() as i32);
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_binary(value.as_bytes())
    }

    pub fn write_binary(&mut self, value: &[u8]) -> Result<()> {
        let len = i32::try_from(value.len()).map_err(|_| {
            RpcError::protocol(ProtocolErrorKind::SizeLimit, "binary value exceeds i32 length")
        })?;
        self.write_i32(len);
        self.buf.put_slice(value);
        Ok(())
    }

    pub fn write_field_begin(&mut self, wire_type: WireType, id: i16) {
        self.write_byte(wire_type.as_u8());
        self.write_i16(id);
    }

    pub fn write_field_stop(&mut self) {
        self.write_byte(WireType::Stop.as_u8());
    }

    pub fn write_list_begin(&mut self, elem: WireType, count: usize) -> Result<()> {
        let count = i32::try_from(count).map_err(|_| {
            RpcError::protocol(ProtocolErrorKind::SizeLimit, "list count exceeds i32")
        })?;
        self.write_byte(elem.as_u8());
        self.write_i32(count);
        Ok(())
    }

    pub fn write_message_begin(&mut self, envelope: &Envelope) -> Result<()> {
        self.write_string(&envelope.name)?;
        self.write_byte(envelope.kind.as_u8());
        self.write_i32(envelope.seq_id);
        Ok(())
    }
}

impl AppException {
    /// Encode as a field stream: message @1 (string), kind @2 (i32), stop.
    pub fn write_fields(&self, w: &mut BinaryWriter) -> Result<()> {
        w.write_field_begin(WireType::String, 1);
        w.write_string(self.display_message())?;
        w.write_field_begin(WireType::I32, 2);
        w.write_i32(self.kind.code());
        w.write_field_stop();
        Ok(())
    }

    /// Decode a field stream written by [`AppException::write_fields`].
    /// Unknown fields are skipped; missing fields fall back to defaults.
    pub fn read_fields(r: &mut BinaryReader) -> Result<AppException> {
        let mut message = String::new();
        let mut kind = AppErrorKind::Unknown;
        loop {
            let (field_type, field_id) = r.read_field_begin()?;
            if field_type == WireType::Stop {
                break;
            }
            match (field_id, field_type) {
                (1, WireType::String) => message = r.read_string()?,
                (2, WireType::I32) => kind = AppErrorKind::from_code(r.read_i32()?),
                _ => r.skip(field_type)?,
            }
        }
        Ok(AppException::new(kind, message))
    }
}
