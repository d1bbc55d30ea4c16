//! NDR decoding trait

use crate::{NdrContext, NdrError, NdrReader, Result};

/// Trait for types that can be decoded from NDR format
pub trait NdrDecode: Sized {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self>;

    /// Get the NDR alignment requirement for this type
    fn ndr_align() -> usize {
        1
    }

    /// Smallest number of wire bytes one value can occupy.
    ///
    /// Used to reject a declared element count before allocating for it.
    fn ndr_min_size() -> usize {
        1
    }
}

/// Decode a complete top-level value and drain its deferred data.
///
/// Bytes left over after the value are ignored.
pub fn from_bytes<T: NdrDecode>(ctx: NdrContext, data: &[u8]) -> Result<T> {
    let mut r = NdrReader::new(ctx, data);
    let value = T::ndr_decode(&mut r)?;
    r.read_deferred()?;
    Ok(value)
}

/// Like [`from_bytes`], but fails if anything beyond alignment padding
/// follows the value.
pub fn from_bytes_exact<T: NdrDecode>(ctx: NdrContext, data: &[u8]) -> Result<T> {
    let mut r = NdrReader::new(ctx, data);
    let value = T::ndr_decode(&mut r)?;
    r.read_deferred()?;
    let trailing = r.remaining();
    if trailing >= 8 || r.rest().iter().any(|&b| b != 0) {
        return Err(NdrError::TrailingData(trailing));
    }
    Ok(value)
}
