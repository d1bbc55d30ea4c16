//! Error types for DCE RPC

use midl_ndr::NdrError;
use thiserror::Error;

/// RPC error types
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NDR error: {0}")]
    Ndr(#[from] NdrError),

    #[error("DCE RPC version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u8, got: u8 },

    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("unknown operation: opnum {0}")]
    UnknownOperation(u16),

    #[error("invalid PDU: {0}")]
    InvalidPdu(String),

    #[error("invalid PDU data: {0}")]
    InvalidPduData(String),

    #[error("invalid message type: {0}")]
    InvalidMessageType(i32),

    #[error("fault: status 0x{0:08x}")]
    Fault(u32),

    #[error("call ID mismatch: expected {expected}, got {got}")]
    CallIdMismatch { expected: u32, got: u32 },

    #[error("PDU too large: {size} bytes exceeds maximum {max}")]
    PduTooLarge { size: usize, max: usize },

    #[error("handler for opnum {0} panicked")]
    HandlerPanicked(u16),

    #[error("handler failed: {0}")]
    Handler(String),
}

impl RpcError {
    /// Fault status reported to the peer when this error ends a call.
    pub fn fault_status(&self) -> u32 {
        use crate::dcerpc::FaultStatus;

        match self {
            RpcError::UnknownOperation(_) => FaultStatus::OpRngError as u32,
            RpcError::InterfaceNotFound(_) => FaultStatus::UnkIf as u32,
            RpcError::Ndr(_) | RpcError::InvalidPduData(_) => FaultStatus::BadStubData as u32,
            RpcError::InvalidPdu(_)
            | RpcError::VersionMismatch { .. }
            | RpcError::InvalidMessageType(_) => FaultStatus::ProtoError as u32,
            RpcError::Fault(status) => *status,
            _ => FaultStatus::RpcError as u32,
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
