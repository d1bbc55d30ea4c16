//! Server-side operation dispatch
//!
//! A [`Dispatcher`] owns the interfaces registered with a server and turns
//! one inbound request PDU into exactly one response or fault PDU. It does
//! no I/O: a transport hands it the bytes of each request and writes back
//! what it returns, and may do so from many tasks at once.
//!
//! Failures are contained per call. An unknown opnum, undecodable stub
//! data, a handler error or a handler panic each become a fault PDU for
//! that call alone; the dispatcher keeps serving.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, error, info, trace, warn};

use crate::dcerpc::{
    DataRepresentation, FaultPdu, FaultStatus, PduHeader, RequestPdu, ResponsePdu, SyntaxId, Uuid,
};
use crate::error::{Result, RpcError};
use crate::operation::{Operation, RpcCall};

/// Operation handler function type
pub type OperationHandler = Arc<dyn Fn(RpcCall) -> BoxFuture<'static, Result<Bytes>> + Send + Sync>;

#[derive(Clone)]
struct RegisteredOperation {
    name: Option<&'static str>,
    handler: OperationHandler,
}

/// Interface definition - contains operations for a specific interface version
pub struct Interface {
    pub syntax: SyntaxId,
    operations: HashMap<u16, RegisteredOperation>,
}

impl Interface {
    pub fn new(uuid: Uuid, major_version: u16, minor_version: u16) -> Self {
        Self::from_syntax(SyntaxId::new(uuid, major_version, minor_version))
    }

    pub fn from_syntax(syntax: SyntaxId) -> Self {
        Self {
            syntax,
            operations: HashMap::new(),
        }
    }

    /// Register a handler working on raw stub data.
    pub fn register_operation<F, Fut>(&mut self, opnum: u16, handler: F)
    where
        F: Fn(RpcCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes>> + Send + 'static,
    {
        self.insert(opnum, None, Arc::new(move |call: RpcCall| handler(call).boxed()));
    }

    /// Register a typed handler for `O`. Stub data is decoded into
    /// `O::Request` and the returned `O::Response` encoded in the byte
    /// order of the request.
    pub fn register<O, F, Fut>(&mut self, handler: F)
    where
        O: Operation,
        F: Fn(O::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O::Response>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.insert(
            O::OPNUM,
            Some(O::NAME),
            Arc::new(move |call: RpcCall| {
                let handler = Arc::clone(&handler);
                async move {
                    let request = O::decode_request(call.ctx, &call.stub_data)?;
                    let response = handler(request).await?;
                    O::encode_response(call.ctx, &response)
                }
                .boxed()
            }),
        );
    }

    /// Register a prepared handler under `opnum`, optionally named for logs.
    pub fn register_handler(
        &mut self,
        opnum: u16,
        name: Option<&'static str>,
        handler: OperationHandler,
    ) {
        self.insert(opnum, name, handler);
    }

    fn insert(&mut self, opnum: u16, name: Option<&'static str>, handler: OperationHandler) {
        if self
            .operations
            .insert(opnum, RegisteredOperation { name, handler })
            .is_some()
        {
            warn!("Replacing handler for opnum {} on {}", opnum, self.syntax);
        }
    }

    /// Get an operation handler
    pub fn get_operation(&self, opnum: u16) -> Option<&OperationHandler> {
        self.operations.get(&opnum).map(|op| &op.handler)
    }

    pub fn operation_name(&self, opnum: u16) -> Option<&'static str> {
        self.operations.get(&opnum).and_then(|op| op.name)
    }

    /// Registered opnums in ascending order
    pub fn opnums(&self) -> Vec<u16> {
        let mut opnums: Vec<u16> = self.operations.keys().copied().collect();
        opnums.sort_unstable();
        opnums
    }
}

/// Builder for creating DCE RPC interfaces with a fluent API
pub struct InterfaceBuilder {
    interface: Interface,
}

impl InterfaceBuilder {
    pub fn new(uuid: &str, major_version: u16, minor_version: u16) -> Option<Self> {
        let uuid = Uuid::parse(uuid)?;
        Some(Self {
            interface: Interface::new(uuid, major_version, minor_version),
        })
    }

    pub fn from_syntax(syntax: SyntaxId) -> Self {
        Self {
            interface: Interface::from_syntax(syntax),
        }
    }

    pub fn operation<F, Fut>(mut self, opnum: u16, handler: F) -> Self
    where
        F: Fn(RpcCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes>> + Send + 'static,
    {
        self.interface.register_operation(opnum, handler);
        self
    }

    pub fn typed<O, F, Fut>(mut self, handler: F) -> Self
    where
        O: Operation,
        F: Fn(O::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O::Response>> + Send + 'static,
    {
        self.interface.register::<O, F, Fut>(handler);
        self
    }

    pub fn handler(mut self, opnum: u16, name: Option<&'static str>, handler: OperationHandler) -> Self {
        self.interface.register_handler(opnum, name, handler);
        self
    }

    pub fn build(self) -> Interface {
        self.interface
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Request PDUs larger than this are refused with a fault
    pub max_pdu_size: usize,
    /// Turn a panicking handler into a fault instead of unwinding into
    /// the transport
    pub catch_panics: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_pdu_size: u16::MAX as usize,
            catch_panics: true,
        }
    }
}

/// Dispatcher statistics
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub requests_received: AtomicU64,
    pub requests_processed: AtomicU64,
    pub requests_failed: AtomicU64,
    pub unknown_operations: AtomicU64,
    pub handler_panics: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            requests_received: self.requests_received.load(Ordering::Relaxed),
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            unknown_operations: self.unknown_operations.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherStatsSnapshot {
    pub requests_received: u64,
    pub requests_processed: u64,
    pub requests_failed: u64,
    pub unknown_operations: u64,
    pub handler_panics: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Operation dispatcher
///
/// Interfaces are keyed by UUID. Presentation contexts bound with
/// [`Dispatcher::bind`] map the `context_id` of a request PDU to one of
/// them. Lookups take a read lock that is released before the handler
/// runs, so handlers of concurrent calls never contend.
pub struct Dispatcher {
    interfaces: RwLock<HashMap<Uuid, Arc<Interface>>>,
    contexts: RwLock<HashMap<u16, Uuid>>,
    config: DispatcherConfig,
    stats: Arc<DispatcherStats>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            interfaces: RwLock::new(HashMap::new()),
            contexts: RwLock::new(HashMap::new()),
            config,
            stats: Arc::new(DispatcherStats::default()),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> &Arc<DispatcherStats> {
        &self.stats
    }

    /// Register an interface, replacing any earlier registration of the
    /// same UUID.
    pub fn register(&self, interface: Interface) {
        info!(
            "Registering interface {} with {} operations",
            interface.syntax,
            interface.operations.len()
        );
        self.interfaces
            .write()
            .insert(interface.syntax.uuid, Arc::new(interface));
    }

    /// Bind a presentation context to a registered interface. The major
    /// version must match; a lower minor version on the server is refused.
    pub fn bind(&self, context_id: u16, syntax: &SyntaxId) -> Result<()> {
        let interfaces = self.interfaces.read();
        let interface = interfaces
            .get(&syntax.uuid)
            .ok_or_else(|| RpcError::InterfaceNotFound(syntax.to_string()))?;
        if interface.syntax.major_version() != syntax.major_version()
            || interface.syntax.minor_version() < syntax.minor_version()
        {
            return Err(RpcError::InterfaceNotFound(syntax.to_string()));
        }
        drop(interfaces);

        debug!("Bound context {} to {}", context_id, syntax);
        self.contexts.write().insert(context_id, syntax.uuid);
        Ok(())
    }

    /// Dispatch little-endian stub data for `opnum` to `interface`.
    pub async fn dispatch(&self, interface: &Uuid, opnum: u16, stub_data: Bytes) -> Result<Bytes> {
        self.dispatch_call(interface, RpcCall::new(opnum, stub_data))
            .await
    }

    /// Run the handler registered for `call.opnum` on `interface`.
    ///
    /// Fails with `UnknownOperation` if the interface has no such opnum and
    /// with `HandlerPanicked` if the handler panics while `catch_panics`
    /// is set.
    pub async fn dispatch_call(&self, interface: &Uuid, call: RpcCall) -> Result<Bytes> {
        let opnum = call.opnum;
        let (handler, name) = {
            let interfaces = self.interfaces.read();
            let iface = interfaces
                .get(interface)
                .ok_or_else(|| RpcError::InterfaceNotFound(interface.to_string()))?;
            match iface.operations.get(&opnum) {
                Some(op) => (Arc::clone(&op.handler), op.name.unwrap_or("<raw>")),
                None => {
                    self.stats.unknown_operations.fetch_add(1, Ordering::Relaxed);
                    warn!("Unknown opnum {} on interface {}", opnum, interface);
                    return Err(RpcError::UnknownOperation(opnum));
                }
            }
        };

        trace!(
            "Invoking {} (opnum {}), call_id={}, stub_len={}",
            name,
            opnum,
            call.call_id,
            call.stub_data.len()
        );

        if !self.config.catch_panics {
            return handler(call).await;
        }

        let invocation = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(call))) {
            Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
            Err(panic) => Err(panic),
        };
        invocation.unwrap_or_else(|_| {
            self.stats.handler_panics.fetch_add(1, Ordering::Relaxed);
            error!("Handler {} (opnum {}) panicked", name, opnum);
            Err(RpcError::HandlerPanicked(opnum))
        })
    }

    /// Process one request PDU and return the encoded response or fault.
    ///
    /// Never fails: every error, including an undecodable PDU, is reported
    /// to the peer as a fault carrying [`RpcError::fault_status`].
    pub async fn handle_pdu(&self, data: &[u8]) -> Bytes {
        self.stats.requests_received.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_received
            .fetch_add(data.len() as u64, Ordering::Relaxed);

        let encoded = match self.process_request(data).await {
            Ok(encoded) => {
                self.stats.requests_processed.fetch_add(1, Ordering::Relaxed);
                encoded
            }
            Err((header, e)) => {
                self.stats.requests_failed.fetch_add(1, Ordering::Relaxed);
                let call_id = header.as_ref().map_or(0, |h| h.call_id);
                debug!("Call {} failed: {}", call_id, e);

                let mut fault = FaultPdu::new(call_id, e.fault_status());
                if let Some(header) = header {
                    fault.header.data_rep = header.data_rep;
                }
                fault.encode()
            }
        };

        self.stats
            .bytes_sent
            .fetch_add(encoded.len() as u64, Ordering::Relaxed);
        encoded
    }

    async fn process_request(
        &self,
        data: &[u8],
    ) -> std::result::Result<Bytes, (Option<PduHeader>, RpcError)> {
        let header = PduHeader::decode(data).ok();
        let fail = |e: RpcError| (header.clone(), e);

        if data.len() > self.config.max_pdu_size {
            return Err(fail(RpcError::PduTooLarge {
                size: data.len(),
                max: self.config.max_pdu_size,
            }));
        }

        let request = RequestPdu::decode(data).map_err(fail)?;
        let call_id = request.header.call_id;
        debug!(
            "Received request: call_id={}, context_id={}, opnum={}, stub_len={}",
            call_id,
            request.context_id,
            request.opnum,
            request.stub_data.len()
        );

        let interface = self
            .contexts
            .read()
            .get(&request.context_id)
            .copied()
            .ok_or_else(|| fail(RpcError::Fault(FaultStatus::ContextMismatch as u32)))?;

        let data_rep = request.header.data_rep;
        let call = RpcCall {
            call_id,
            opnum: request.opnum,
            ctx: data_rep.ndr_context(),
            object: request.object_uuid,
            stub_data: request.stub_data,
        };
        let result = self.dispatch_call(&interface, call).await.map_err(fail)?;

        response_pdu(call_id, request.context_id, data_rep, result).map_err(fail)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn response_pdu(
    call_id: u32,
    context_id: u16,
    data_rep: DataRepresentation,
    stub_data: Bytes,
) -> Result<Bytes> {
    let mut response = ResponsePdu::new(call_id, stub_data);
    response.context_id = context_id;
    response.header.data_rep = data_rep;
    response.encode()
}
