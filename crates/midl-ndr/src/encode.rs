//! NDR encoding trait

use bytes::Bytes;

use crate::{NdrContext, NdrWriter, Result};

/// Trait for types that can be encoded to NDR format
///
/// Implementations write their fixed part to the writer and hand any
/// pointed-to data to [`NdrWriter::write_pointer`], which queues it until the
/// next [`NdrWriter::write_deferred`]. The borrow of `self` lives as long as
/// the writer so queued referents can be written later without copying.
pub trait NdrEncode {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()>;

    /// Get the NDR alignment requirement for this type
    fn ndr_align() -> usize
    where
        Self: Sized,
    {
        1
    }
}

/// Types whose outermost conformance is hoisted ahead of the value
/// (conformant structures and arrays).
pub trait NdrConformant {
    /// One max count per conformant dimension, outermost first.
    fn ndr_size_info(&self) -> Vec<u64>;
}

/// Encode a complete top-level value: fixed part followed by all deferred data.
pub fn to_bytes<T: NdrEncode + ?Sized>(ctx: NdrContext, value: &T) -> Result<Bytes> {
    let mut w = NdrWriter::new(ctx);
    value.ndr_encode(&mut w)?;
    w.write_deferred()?;
    Ok(w.into_bytes())
}
