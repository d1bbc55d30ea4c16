//! NDR string types
//!
//! `[string]` data is a conformant varying array whose counts include the
//! terminating zero:
//!
//! ```text
//! max_count: u32    # hoisted ahead of the enclosing structure if embedded
//! offset: u32       # always 0 when written
//! actual_count: u32 # characters including the terminator
//! chars[actual_count]
//! ```
//!
//! The terminator is appended on write and stripped on read.

use std::fmt;

use crate::arrays::check_variance;
use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};

impl<'a> NdrWriter<'a> {
    /// Write a `[string] wchar_t*` value.
    pub fn write_utf16_string(&mut self, value: &str) -> Result<()> {
        let units: Vec<u16> = value.encode_utf16().chain(std::iter::once(0)).collect();
        self.write_string_header(units.len())?;
        for unit in units {
            self.write_u16(unit);
        }
        Ok(())
    }

    /// Write a `[string] char*` value. Bytes are written as-is.
    pub fn write_ansi_string(&mut self, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        self.write_string_header(bytes.len() + 1)?;
        self.write_bytes(bytes);
        self.write_u8(0);
        Ok(())
    }

    fn write_string_header(&mut self, len: usize) -> Result<()> {
        let len = u64::try_from(len).map_err(|_| NdrError::IntegerOverflow)?;
        let max_count = self.conformance_or_write(len)?;
        check_variance(max_count, 0, len)?;
        self.write_size(0)?;
        self.write_size(len)
    }
}

impl<'a> NdrReader<'a> {
    /// Read a `[string] wchar_t*` value, without its terminator.
    pub fn read_utf16_string(&mut self) -> Result<String> {
        let count = self.read_string_header::<u16>()?;
        self.read_align(2);
        let raw = self.read_bytes(count * 2)?;
        let ctx = self.ctx();
        let mut units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|mut pair| ctx.get_u16(&mut pair))
            .collect();
        if units.last() == Some(&0) {
            units.pop();
        }
        Ok(String::from_utf16(&units)?)
    }

    /// Read a `[string] char*` value, without its terminator.
    pub fn read_ansi_string(&mut self) -> Result<String> {
        let count = self.read_string_header::<u8>()?;
        let mut bytes = self.read_bytes(count)?.to_vec();
        if bytes.last() == Some(&0) {
            bytes.pop();
        }
        Ok(String::from_utf8(bytes)?)
    }

    fn read_string_header<T: NdrDecode>(&mut self) -> Result<usize> {
        let max_count = self.conformance_or_read()?;
        let offset = self.read_size()?;
        let count = self.read_size()?;
        check_variance(max_count, offset, count)?;
        self.check_declared::<T>(count)
    }
}

/// Unicode string (`[string] wchar_t*`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NdrWString(pub String);

impl NdrWString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for NdrWString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NdrWString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for NdrWString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NdrWString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl NdrEncode for NdrWString {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_utf16_string(&self.0)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for NdrWString {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.read_utf16_string().map(Self)
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        8
    }
}

/// 8-bit string (`[string] char*`), expected to hold UTF-8 on read
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NdrString(pub String);

impl NdrString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NdrString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl NdrEncode for NdrString {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_ansi_string(&self.0)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for NdrString {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.read_ansi_string().map(Self)
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        8
    }
}
