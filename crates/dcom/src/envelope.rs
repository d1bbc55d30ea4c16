//! ORPC call envelope
//!
//! Every object call carries a header ahead of its parameters and every
//! reply carries one ahead of its out-parameters, followed by the HRESULT:
//!
//! ```text
//! request:  ORPCTHIS  <deferred>  [in] params  <deferred>
//! response: ORPCTHAT  <deferred>  [out] params <deferred>  u32 status
//! ```
//!
//! All blocks share one referent id space, as they belong to one stub call.

use bytes::Bytes;
use midl_ndr::{NdrContext, NdrDecode, NdrEncode, NdrReader, NdrWriter};
use tracing::trace;

use crate::types::{hresult, DcomError, OrpcThat, OrpcThis, Result};

/// Binds an ORPC opnum to its parameter blocks.
///
/// Opnums 0 to 2 belong to IUnknown; interface methods start at 3.
pub trait OrpcOperation: Send + Sync + 'static {
    const OPNUM: u16;
    const NAME: &'static str;

    /// `[in]` parameters, after ORPCTHIS
    type In: NdrEncode + NdrDecode + Send + Sync + 'static;

    /// `[out]` parameters, before the status. Failed calls carry the default.
    type Out: NdrEncode + NdrDecode + Default + Send + Sync + 'static;
}

/// A decoded request body
#[derive(Debug, Clone, PartialEq)]
pub struct OrpcRequest<T> {
    pub this: OrpcThis,
    pub params: T,
}

/// A decoded response body
#[derive(Debug, Clone, PartialEq)]
pub struct OrpcResponse<T> {
    pub that: OrpcThat,
    pub params: T,
    /// HRESULT returned by the method, as its unsigned bit pattern
    pub status: u32,
}

impl<T> OrpcResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status == hresult::S_OK
    }

    /// The status as the signed 32-bit HRESULT. Failures are negative.
    pub fn signed_status(&self) -> i32 {
        self.status as i32
    }

    /// The out-parameters, or [`DcomError::CallFailed`] for a non-zero status.
    pub fn into_result(self, opnum: u16) -> Result<T> {
        if self.status != hresult::S_OK {
            return Err(DcomError::CallFailed {
                opnum,
                status: self.status,
            });
        }
        Ok(self.params)
    }
}

/// Encode a request body: ORPCTHIS then the in-parameters.
pub fn encode_request<T: NdrEncode>(
    ctx: NdrContext,
    this: &OrpcThis,
    params: &T,
) -> midl_ndr::Result<Bytes> {
    let mut w = NdrWriter::new(ctx);
    w.write_data(this)?;
    w.write_deferred()?;
    w.write_data(params)?;
    w.write_deferred()?;
    trace!("Encoded ORPC request body: {} bytes", w.position());
    Ok(w.into_bytes())
}

pub fn decode_request<T: NdrDecode>(ctx: NdrContext, data: &[u8]) -> midl_ndr::Result<OrpcRequest<T>> {
    let mut r = NdrReader::new(ctx, data);
    let this = r.read_data()?;
    r.read_deferred()?;
    let params = r.read_data()?;
    r.read_deferred()?;
    Ok(OrpcRequest { this, params })
}

/// Encode a response body: ORPCTHAT, the out-parameters and the status.
pub fn encode_response<T: NdrEncode>(
    ctx: NdrContext,
    that: &OrpcThat,
    params: &T,
    status: u32,
) -> midl_ndr::Result<Bytes> {
    let mut w = NdrWriter::new(ctx);
    w.write_data(that)?;
    w.write_deferred()?;
    w.write_data(params)?;
    w.write_deferred()?;
    w.write_u32(status);
    trace!(
        "Encoded ORPC response body: {} bytes, status 0x{:08x}",
        w.position(),
        status
    );
    Ok(w.into_bytes())
}

pub fn decode_response<T: NdrDecode>(ctx: NdrContext, data: &[u8]) -> midl_ndr::Result<OrpcResponse<T>> {
    let mut r = NdrReader::new(ctx, data);
    let that = r.read_data()?;
    r.read_deferred()?;
    let params = r.read_data()?;
    r.read_deferred()?;
    let status = r.read_u32()?;
    Ok(OrpcResponse {
        that,
        params,
        status,
    })
}
