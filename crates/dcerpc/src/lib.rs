//! DCE RPC (MS-RPC) call layer
//!
//! This crate sits between the NDR codec in `midl-ndr` and a transport. It
//! frames calls as connection-oriented request, response and fault PDUs,
//! binds opnums to typed parameter blocks through [`Operation`], dispatches
//! inbound calls to registered handlers and offers a client channel
//! abstraction.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use dcerpc::{Dispatcher, InterfaceBuilder, LocalChannel, RpcCall, RpcChannel};
//!
//! #[tokio::main]
//! async fn main() {
//!     let interface = InterfaceBuilder::new("12345678-1234-1234-1234-123456789012", 1, 0)
//!         .unwrap()
//!         // Operation 0: echo
//!         .operation(0, |call: RpcCall| async move { Ok(call.stub_data) })
//!         .build();
//!     let syntax = interface.syntax;
//!
//!     let dispatcher = Arc::new(Dispatcher::new());
//!     dispatcher.register(interface);
//!
//!     let channel = LocalChannel::connect(dispatcher, syntax).unwrap();
//!     let reply = channel.invoke(0, None, Bytes::from("hello")).await.unwrap();
//!     assert_eq!(reply.as_ref(), b"hello");
//! }
//! ```

pub mod dcerpc;
pub mod dcerpc_client;
pub mod dcerpc_server;
pub mod error;
pub mod operation;

pub use dcerpc::{
    DataRepresentation, FaultPdu, FaultStatus, PacketFlags, PacketType, Pdu, PduHeader,
    RequestPdu, ResponsePdu, SyntaxId, Uuid, NDR_SYNTAX_UUID, NDR_SYNTAX_VERSION,
};
pub use dcerpc_client::{ChannelConfig, LocalChannel, RpcChannel, RpcChannelExt};
pub use dcerpc_server::{
    Dispatcher, DispatcherConfig, DispatcherStats, DispatcherStatsSnapshot, Interface,
    InterfaceBuilder, OperationHandler,
};
pub use error::{Result, RpcError};
pub use operation::{Operation, RpcCall};
