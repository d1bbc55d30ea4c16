//! DCE RPC client channels
//!
//! An [`RpcChannel`] is a connected, bound channel to one interface: it
//! takes the stub data of a call and returns the stub data of the reply.
//! [`RpcChannelExt::call`] adds typed marshalling on top for any channel.
//!
//! [`LocalChannel`] is the in-process channel. It frames each call as a
//! request PDU and feeds it to a [`Dispatcher`], so the full wire path is
//! exercised without a socket.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use midl_ndr::NdrContext;
use tracing::{debug, trace};

use crate::dcerpc::{DataRepresentation, Pdu, RequestPdu, SyntaxId, Uuid};
use crate::dcerpc_server::Dispatcher;
use crate::error::{Result, RpcError};
use crate::operation::Operation;

/// A bound channel to one RPC interface.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Byte order the channel marshals stub data in
    fn ndr_context(&self) -> NdrContext;

    /// Send one call and wait for its reply.
    ///
    /// A fault from the server is returned as [`RpcError::Fault`] with the
    /// server's status code. Nothing is retried.
    async fn invoke(&self, opnum: u16, object: Option<Uuid>, stub_data: Bytes) -> Result<Bytes>;
}

/// Typed calls over any [`RpcChannel`].
pub trait RpcChannelExt: RpcChannel {
    /// Marshal `request`, invoke `O::OPNUM` and unmarshal the response.
    fn call<'a, O: Operation>(&'a self, request: &'a O::Request) -> BoxFuture<'a, Result<O::Response>> {
        self.call_object::<O>(None, request)
    }

    /// Like [`call`](Self::call), addressed to an object.
    fn call_object<'a, O: Operation>(
        &'a self,
        object: Option<Uuid>,
        request: &'a O::Request,
    ) -> BoxFuture<'a, Result<O::Response>> {
        async move {
            let ctx = self.ndr_context();
            let stub_data = O::encode_request(ctx, request)?;
            trace!("Calling {} (opnum {})", O::NAME, O::OPNUM);
            let reply = self.invoke(O::OPNUM, object, stub_data).await?;
            O::decode_response(ctx, &reply)
        }
        .boxed()
    }
}

impl<C: RpcChannel + ?Sized> RpcChannelExt for C {}

/// Client channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Requests larger than this fail locally with `PduTooLarge`
    pub max_pdu_size: usize,
    /// Presentation context the channel is bound on
    pub context_id: u16,
    /// Byte order label of outgoing requests
    pub data_rep: DataRepresentation,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_pdu_size: u16::MAX as usize,
            context_id: 0,
            data_rep: DataRepresentation::ndr(),
        }
    }
}

/// In-process channel driving a [`Dispatcher`] directly.
pub struct LocalChannel {
    dispatcher: Arc<Dispatcher>,
    interface: SyntaxId,
    config: ChannelConfig,
    call_id_counter: AtomicU32,
}

impl LocalChannel {
    /// Bind to `interface` on the dispatcher with the default configuration.
    pub fn connect(dispatcher: Arc<Dispatcher>, interface: SyntaxId) -> Result<Self> {
        Self::with_config(dispatcher, interface, ChannelConfig::default())
    }

    pub fn with_config(
        dispatcher: Arc<Dispatcher>,
        interface: SyntaxId,
        config: ChannelConfig,
    ) -> Result<Self> {
        dispatcher.bind(config.context_id, &interface)?;
        debug!(
            "Local channel bound to {} on context {}",
            interface, config.context_id
        );
        Ok(Self {
            dispatcher,
            interface,
            config,
            call_id_counter: AtomicU32::new(1),
        })
    }

    pub fn interface(&self) -> &SyntaxId {
        &self.interface
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

#[async_trait]
impl RpcChannel for LocalChannel {
    fn ndr_context(&self) -> NdrContext {
        self.config.data_rep.ndr_context()
    }

    async fn invoke(&self, opnum: u16, object: Option<Uuid>, stub_data: Bytes) -> Result<Bytes> {
        let call_id = self.call_id_counter.fetch_add(1, Ordering::Relaxed);

        let mut request = RequestPdu::new(call_id, opnum, stub_data);
        request.context_id = self.config.context_id;
        request.header.data_rep = self.config.data_rep;
        request.object_uuid = object;
        let encoded = request.encode()?;
        if encoded.len() > self.config.max_pdu_size {
            return Err(RpcError::PduTooLarge {
                size: encoded.len(),
                max: self.config.max_pdu_size,
            });
        }

        debug!(
            "Sending request: call_id={}, opnum={}, stub_len={}",
            call_id,
            opnum,
            request.stub_data.len()
        );
        let reply = self.dispatcher.handle_pdu(&encoded).await;

        match Pdu::decode(&reply)? {
            Pdu::Response(response) if response.header.call_id == call_id => {
                Ok(response.stub_data)
            }
            Pdu::Fault(fault) if fault.header.call_id == call_id => {
                debug!("Call {} faulted: 0x{:08x}", call_id, fault.status);
                Err(RpcError::Fault(fault.status))
            }
            other => Err(RpcError::CallIdMismatch {
                expected: call_id,
                got: other.call_id(),
            }),
        }
    }
}
