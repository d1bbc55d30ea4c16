//! Server side of ORPC calls
//!
//! [`orpc_handler`] adapts an async method implementation to a raw
//! [`dcerpc::OperationHandler`]: it unwraps ORPCTHIS, checks the COM
//! version, runs the method and wraps the [`Reply`] in ORPCTHAT plus the
//! HRESULT. Stub data that does not decode is a wire error and becomes a
//! fault; a method failure is an HRESULT and travels in a normal response.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use dcerpc::{InterfaceBuilder, OperationHandler, RpcCall, RpcError};
use futures::future::{self, BoxFuture, FutureExt};
use midl_ndr::NdrContext;
use tracing::{debug, warn};

use crate::envelope::{decode_request, encode_response, OrpcOperation, OrpcRequest};
use crate::types::{hresult, Ipid, OrpcThat, OrpcThis};

/// What a method returns: the reply header, its HRESULT and out-parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub that: OrpcThat,
    pub status: u32,
    pub out: T,
}

impl<T> Reply<T> {
    /// Successful reply
    pub fn ok(out: T) -> Self {
        Self {
            that: OrpcThat::new(),
            status: hresult::S_OK,
            out,
        }
    }

    pub fn with_that(mut self, that: OrpcThat) -> Self {
        self.that = that;
        self
    }
}

impl<T: Default> Reply<T> {
    /// Failed reply: `status` with default out-parameters
    pub fn failed(status: u32) -> Self {
        Self {
            that: OrpcThat::new(),
            status,
            out: T::default(),
        }
    }
}

/// Per-call information handed to a method
#[derive(Debug, Clone)]
pub struct OrpcCall {
    pub this: OrpcThis,
    /// Interface pointer the call was addressed to
    pub ipid: Option<Ipid>,
}

fn encode_reply<T: midl_ndr::NdrEncode>(ctx: NdrContext, reply: &Reply<T>) -> dcerpc::Result<Bytes> {
    Ok(encode_response(ctx, &reply.that, &reply.out, reply.status)?)
}

/// Wrap an ORPC method as a dispatcher handler for `O::OPNUM`.
pub fn orpc_handler<O, F, Fut>(handler: F) -> OperationHandler
where
    O: OrpcOperation,
    F: Fn(OrpcCall, O::In) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply<O::Out>> + Send + 'static,
{
    Arc::new(move |call: RpcCall| -> BoxFuture<'static, dcerpc::Result<Bytes>> {
        let ctx = call.ctx;
        let OrpcRequest { this, params } = match decode_request::<O::In>(ctx, &call.stub_data) {
            Ok(request) => request,
            Err(e) => {
                debug!("{} (opnum {}): bad stub data: {}", O::NAME, O::OPNUM, e);
                return future::ready(Err(RpcError::from(e))).boxed();
            }
        };

        if !this.version.is_supported() {
            warn!(
                "{}: rejecting COM version {}.{}",
                O::NAME,
                this.version.major,
                this.version.minor
            );
            let reply = Reply::<O::Out>::failed(hresult::RPC_E_VERSION_MISMATCH);
            return future::ready(encode_reply(ctx, &reply)).boxed();
        }

        let orpc_call = OrpcCall {
            this,
            ipid: call.object.map(Ipid),
        };
        let pending = handler(orpc_call, params);
        async move {
            let reply = pending.await;
            if reply.status != hresult::S_OK {
                debug!("{} returned HRESULT 0x{:08x}", O::NAME, reply.status);
            }
            encode_reply(ctx, &reply)
        }
        .boxed()
    })
}

/// Register ORPC methods on an [`InterfaceBuilder`].
pub trait OrpcInterfaceExt {
    fn orpc<O, F, Fut>(self, handler: F) -> Self
    where
        O: OrpcOperation,
        F: Fn(OrpcCall, O::In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply<O::Out>> + Send + 'static;
}

impl OrpcInterfaceExt for InterfaceBuilder {
    fn orpc<O, F, Fut>(self, handler: F) -> Self
    where
        O: OrpcOperation,
        F: Fn(OrpcCall, O::In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply<O::Out>> + Send + 'static,
    {
        self.handler(O::OPNUM, Some(O::NAME), orpc_handler::<O, F, Fut>(handler))
    }
}
