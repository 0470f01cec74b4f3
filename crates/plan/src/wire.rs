//! Low-level framing for the portable plan encoding.
//!
//! Layout conventions, shared by every node kind:
//! - all multi-byte integers are little-endian
//! - variable-length payloads (strings, binary, child lists) carry a `u32`
//!   length/count prefix
//! - the document itself opens with a 4-byte magic and a `u32` format version
//!
//! Encoding is append-only into one buffer, so identical input trees always
//! produce identical output bytes.

use nvq_common::{NvqError, Result};

/// Magic prefix of a serialized plan document.
pub const PLAN_MAGIC: &[u8; 4] = b"NVQP";
/// Current plan wire-format version.
pub const PLAN_VERSION: u32 = 1;

/// Append-only encoder for the plan wire format.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Fresh writer with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the writer and returns the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_magic(&mut self) {
        self.buf.extend_from_slice(PLAN_MAGIC);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn put_i8(&mut self, v: i8) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i128(&mut self, v: i128) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a `u32` length prefix followed by the raw bytes.
    pub fn put_bytes(&mut self, v: &[u8]) {
        self.put_u32(v.len() as u32);
        self.buf.extend_from_slice(v);
    }

    /// Writes a UTF-8 string as a length-prefixed byte payload.
    pub fn put_str(&mut self, v: &str) {
        self.put_bytes(v.as_bytes());
    }
}

/// Cursor-based decoder over a serialized plan payload.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

fn truncated(what: &str) -> NvqError {
    NvqError::InvalidConfig(format!("plan decode: truncated payload reading {what}"))
}

impl<'a> WireReader<'a> {
    /// Reader positioned at the start of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes remaining past the cursor.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(truncated(what));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Consumes and checks the document magic and version.
    pub fn expect_header(&mut self) -> Result<u32> {
        let magic = self.take(4, "magic")?;
        if magic != PLAN_MAGIC {
            return Err(NvqError::InvalidConfig(
                "plan decode: bad magic, not a plan document".to_string(),
            ));
        }
        let version = self.get_u32()?;
        if version != PLAN_VERSION {
            return Err(NvqError::InvalidConfig(format!(
                "plan decode: unsupported format version {version}"
            )));
        }
        Ok(version)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(NvqError::InvalidConfig(format!(
                "plan decode: invalid bool byte {other}"
            ))),
        }
    }

    pub fn get_i8(&mut self) -> Result<i8> {
        Ok(i8::from_le_bytes(self.take(1, "i8")?.try_into().unwrap()))
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.take(2, "i16")?.try_into().unwrap()))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4, "i32")?.try_into().unwrap()))
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8, "i64")?.try_into().unwrap()))
    }

    pub fn get_i128(&mut self) -> Result<i128> {
        Ok(i128::from_le_bytes(
            self.take(16, "i128")?.try_into().unwrap(),
        ))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4, "u32")?.try_into().unwrap()))
    }

    /// Reads a `u32` element count for a child list.
    ///
    /// Every element occupies at least one byte, so a count larger than the
    /// remaining payload cannot be satisfied; rejecting it here keeps a
    /// malformed count from driving a huge preallocation downstream.
    pub fn get_count(&mut self, what: &str) -> Result<usize> {
        let count = self.get_u32()? as usize;
        if count > self.remaining() {
            return Err(NvqError::InvalidConfig(format!(
                "plan decode: {what} count {count} exceeds {} remaining bytes",
                self.remaining()
            )));
        }
        Ok(count)
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8, "u64")?.try_into().unwrap()))
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4, "f32")?.try_into().unwrap()))
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8, "f64")?.try_into().unwrap()))
    }

    /// Reads a `u32` length prefix then that many raw bytes.
    pub fn get_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.get_u32()? as usize;
        Ok(self.take(len, "byte payload")?.to_vec())
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn get_str(&mut self) -> Result<String> {
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| NvqError::InvalidConfig(format!("plan decode: invalid utf-8: {e}")))
    }
}
