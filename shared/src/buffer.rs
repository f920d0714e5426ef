//! Bit- and byte-level packet buffers.
//!
//! Bits are packed most-significant first into whole bytes. A byte-aligned
//! write flushes any partially filled bit byte first, and a byte-aligned read
//! abandons whatever bits remain unread in the current bit byte, so the two
//! sides always agree on where the byte stream resumes. Multi-byte integers
//! are little-endian.

use crate::error::CodecError;
use crate::guid::ObjectGuid;

#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    buf: Vec<u8>,
    bit_pos: u8,
    cur: u8,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            bit_pos: 0,
            cur: 0,
        }
    }

    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.cur |= 1 << (7 - self.bit_pos);
        }
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.buf.push(self.cur);
            self.bit_pos = 0;
            self.cur = 0;
        }
    }

    /// Writes the low `count` bits of `value`, highest bit first.
    pub fn write_bits(&mut self, value: u64, count: u8) {
        for i in (0..count).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    pub fn flush_bits(&mut self) {
        if self.bit_pos == 0 {
            return;
        }
        self.buf.push(self.cur);
        self.bit_pos = 0;
        self.cur = 0;
    }

    pub fn write_u8(&mut self, value: u8) {
        self.flush_bits();
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.flush_bits();
        self.buf.extend_from_slice(bytes);
    }

    /// Null-terminated string.
    pub fn write_cstring(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
        self.write_u8(0);
    }

    /// Writes GUID byte `index` if present, XOR 1 as the protocol expects.
    pub fn write_guid_byte(&mut self, guid: ObjectGuid, index: u8) {
        let byte = guid.byte(index);
        if byte != 0 {
            self.write_u8(byte ^ 1);
        }
    }

    /// Mask byte followed by the non-zero bytes, low to high.
    pub fn write_packed_guid(&mut self, guid: ObjectGuid) {
        self.write_u8(guid.pack_mask());
        for i in 0..8 {
            let byte = guid.byte(i);
            if byte != 0 {
                self.buf.push(byte);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len() + usize::from(self.bit_pos > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.flush_bits();
        self.buf
    }
}

#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
    bits_left: u8,
    cur: u8,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bits_left: 0,
            cur: 0,
        }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.data.len() - self.pos;
        if remaining < count {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: count - remaining,
            });
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        self.reset_bits();
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_bit(&mut self) -> Result<bool, CodecError> {
        if self.bits_left == 0 {
            self.cur = self.take(1)?[0];
            self.bits_left = 8;
        }
        self.bits_left -= 1;
        Ok((self.cur >> self.bits_left) & 1 == 1)
    }

    pub fn read_bits(&mut self, count: u8) -> Result<u64, CodecError> {
        let mut value = 0u64;
        for _ in 0..count {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Drops the unread remainder of the current bit byte.
    pub fn reset_bits(&mut self) {
        self.bits_left = 0;
        self.cur = 0;
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    pub fn read_string(&mut self, len: usize) -> Result<String, CodecError> {
        if len == 0 {
            return Ok(String::new());
        }
        self.reset_bits();
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidString)
    }

    pub fn read_cstring(&mut self) -> Result<String, CodecError> {
        self.reset_bits();
        let rest = &self.data[self.pos..];
        let Some(end) = rest.iter().position(|b| *b == 0) else {
            return Err(CodecError::Truncated {
                offset: self.data.len(),
                needed: 1,
            });
        };
        let value = String::from_utf8(rest[..end].to_vec()).map_err(|_| CodecError::InvalidString)?;
        self.pos += end + 1;
        Ok(value)
    }

    /// Reads GUID byte `index` if its presence bit was set earlier.
    pub fn read_guid_byte(&mut self, guid: &mut ObjectGuid, index: u8) -> Result<(), CodecError> {
        if guid.byte(index) != 0 {
            let value = self.read_u8()?;
            guid.set_byte(index, value ^ 1);
        }
        Ok(())
    }

    pub fn read_packed_guid(&mut self) -> Result<ObjectGuid, CodecError> {
        let mask = self.read_u8()?;
        let mut guid = ObjectGuid::EMPTY;
        for i in 0..8u8 {
            if mask & (1 << i) != 0 {
                guid.set_byte(i, self.read_u8()?);
            }
        }
        Ok(guid)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fails unless the whole payload has been consumed.
    pub fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}
