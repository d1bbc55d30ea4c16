//! Typed RPC operations
//!
//! An [`Operation`] binds an opnum to the NDR types of its `[in]` and
//! `[out]` parameter blocks. Stub code implements it once per procedure;
//! the dispatcher and the client channel use it to marshal calls without
//! knowing the parameter layout.

use bytes::Bytes;
use midl_ndr::{from_bytes, to_bytes, NdrContext, NdrDecode, NdrEncode, NdrReader, NdrUuid};

use crate::error::Result;

/// One procedure of an RPC interface.
pub trait Operation: Send + Sync + 'static {
    /// Operation number within the interface
    const OPNUM: u16;

    /// Procedure name, used in logs
    const NAME: &'static str;

    /// `[in]` parameters
    type Request: NdrEncode + NdrDecode + Send + Sync + 'static;

    /// `[out]` parameters and return value
    type Response: NdrEncode + NdrDecode + Send + Sync + 'static;

    fn encode_request(ctx: NdrContext, request: &Self::Request) -> Result<Bytes> {
        Ok(to_bytes(ctx, request)?)
    }

    fn decode_request(ctx: NdrContext, data: &[u8]) -> Result<Self::Request> {
        Ok(from_bytes(ctx, data)?)
    }

    fn encode_response(ctx: NdrContext, response: &Self::Response) -> Result<Bytes> {
        Ok(to_bytes(ctx, response)?)
    }

    fn decode_response(ctx: NdrContext, data: &[u8]) -> Result<Self::Response> {
        Ok(from_bytes(ctx, data)?)
    }
}

/// An inbound call as seen by an operation handler.
#[derive(Debug, Clone)]
pub struct RpcCall {
    pub call_id: u32,
    pub opnum: u16,
    /// Byte order of the stub data
    pub ctx: NdrContext,
    /// Object UUID from the request PDU, if any
    pub object: Option<NdrUuid>,
    pub stub_data: Bytes,
}

impl RpcCall {
    /// A call with little-endian stub data and no object.
    pub fn new(opnum: u16, stub_data: Bytes) -> Self {
        Self {
            call_id: 0,
            opnum,
            ctx: NdrContext::new(),
            object: None,
            stub_data,
        }
    }

    /// Reader positioned at the start of the stub data.
    pub fn reader(&self) -> NdrReader<'_> {
        NdrReader::new(self.ctx, &self.stub_data)
    }
}
