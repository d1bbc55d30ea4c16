//! DCOM object calls on top of DCE RPC
//!
//! This crate provides the ORPC layer of MS-DCOM: the headers that precede
//! every object call and reply, the call envelope that frames parameter
//! blocks between them, and typed client and server adapters.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ObjectProxy::call::<O>()        orpc_handler::<O>()        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Call envelope: ORPCTHIS/ORPCTHAT + params + HRESULT        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  DCE RPC layer (dcerpc crate): PDUs, dispatcher, channels   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  NDR codec (midl-ndr crate)                                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! - **IPID**: Interface Pointer ID - identifies an interface on an object,
//!   sent as the object UUID of the request
//! - **CID**: Causality ID - ties nested calls into one logical chain
//! - **HRESULT**: 32-bit method status; zero is success, anything else is
//!   reported to the caller as [`DcomError::CallFailed`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dcerpc::{Dispatcher, InterfaceBuilder, LocalChannel, RpcChannel};
//! use dcom::{Ipid, ObjectProxy, OrpcCall, OrpcInterfaceExt, OrpcOperation, Reply};
//!
//! struct Double;
//!
//! impl OrpcOperation for Double {
//!     const OPNUM: u16 = 3;
//!     const NAME: &'static str = "Double";
//!     type In = u32;
//!     type Out = u32;
//! }
//!
//! #[tokio::main]
//! async fn main() -> dcom::Result<()> {
//!     let interface = InterfaceBuilder::new("0d5a7b6e-1f32-4c8e-9a0b-2e4d6f8a1c3b", 0, 0)
//!         .unwrap()
//!         .orpc::<Double, _, _>(|_call: OrpcCall, value: u32| async move {
//!             Reply::ok(value * 2)
//!         })
//!         .build();
//!     let syntax = interface.syntax;
//!     let dispatcher = Arc::new(Dispatcher::new());
//!     dispatcher.register(interface);
//!
//!     let channel: Arc<dyn RpcChannel> = Arc::new(LocalChannel::connect(dispatcher, syntax)?);
//!     let proxy = ObjectProxy::new(channel, Ipid::generate());
//!     assert_eq!(proxy.call::<Double>(&21).await?, 42);
//!     Ok(())
//! }
//! ```

pub mod envelope;
pub mod types;

mod client;
mod server;

// Re-export main types and client/server APIs
pub use client::ObjectProxy;
pub use envelope::{
    decode_request, decode_response, encode_request, encode_response, OrpcOperation,
    OrpcRequest, OrpcResponse,
};
pub use server::{orpc_handler, OrpcCall, OrpcInterfaceExt, Reply};
pub use types::{
    hresult, Cid, ComVersion, DcomError, Ipid, OrpcExtent, OrpcExtentArray, OrpcThat,
    OrpcThis, Result,
};

/// DCOM version supported by this implementation
pub const DCOM_VERSION: ComVersion = ComVersion::DCOM_5_7;
