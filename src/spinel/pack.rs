//! Spinel data packing primitives.
//!
//! Spinel describes property values with a small format language
//! (`C` = u8, `c` = i8, `S` = u16 LE, `i` = packed uint, `E` = EUI-64,
//! `6` = IPv6 address, `U` = zero-terminated UTF-8, `d` = u16-length data,
//! `t(...)` = u16-length struct). [`Reader`] walks an inbound buffer with the
//! same vocabulary; [`Writer`] builds outbound values.

use crate::ncp::error::{NcpError, NcpResult};

/// Largest value a packed unsigned integer may carry (21 bits, 3 bytes).
pub const PACKED_UINT_MAX: u32 = (1 << 21) - 1;
const PACKED_UINT_MAX_LEN: usize = 3;

/// Append `value` as a Spinel packed unsigned integer.
pub fn encode_packed_uint(value: u32, out: &mut Vec<u8>) -> NcpResult<()> {
    if value > PACKED_UINT_MAX {
        return Err(NcpError::codec(format!(
            "packed uint {} exceeds {}",
            value, PACKED_UINT_MAX
        )));
    }
    let mut v = value;
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return Ok(());
        }
        out.push(byte | 0x80);
    }
}

/// Decode a packed unsigned integer, returning the value and the bytes consumed.
pub fn decode_packed_uint(data: &[u8]) -> NcpResult<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &b) in data.iter().enumerate() {
        if i >= PACKED_UINT_MAX_LEN {
            break;
        }
        value |= ((b & 0x7F) as u32) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(NcpError::codec("truncated or oversized packed uint"))
}

/// Cursor over an inbound property value.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> NcpResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(NcpError::codec(format!(
                "need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> NcpResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> NcpResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&mut self) -> NcpResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> NcpResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_packed_uint(&mut self) -> NcpResult<u32> {
        let (value, used) = decode_packed_uint(&self.data[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    pub fn read_eui64(&mut self) -> NcpResult<[u8; 8]> {
        let mut out = [0u8; 8];
        out.copy_from_slice(self.take(8)?);
        Ok(out)
    }

    pub fn read_ipv6(&mut self) -> NcpResult<[u8; 16]> {
        let mut out = [0u8; 16];
        out.copy_from_slice(self.take(16)?);
        Ok(out)
    }

    /// `U`: zero-terminated UTF-8 (a missing terminator at end of buffer is tolerated).
    pub fn read_utf8(&mut self) -> NcpResult<String> {
        let rest = &self.data[self.pos..];
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let s = std::str::from_utf8(&rest[..end])
            .map_err(|e| NcpError::codec(format!("bad utf-8 string: {}", e)))?
            .to_string();
        self.pos += (end + 1).min(rest.len());
        Ok(s)
    }

    /// `d`: data prefixed with a u16 length.
    pub fn read_data_with_len(&mut self) -> NcpResult<&'a [u8]> {
        let len = self.read_u16()? as usize;
        self.take(len)
    }

    /// `t(...)`: a u16-length struct; returns a reader scoped to its body.
    pub fn read_struct(&mut self) -> NcpResult<Reader<'a>> {
        Ok(Reader::new(self.read_data_with_len()?))
    }

    /// `D`: everything that is left.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }
}

/// Builder for outbound property values.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bytes(mut self, v: &[u8]) -> Self {
        self.buf.extend_from_slice(v);
        self
    }

    pub fn packed_uint(mut self, v: u32) -> NcpResult<Self> {
        encode_packed_uint(v, &mut self.buf)?;
        Ok(self)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
