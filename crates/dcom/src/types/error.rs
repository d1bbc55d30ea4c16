//! DCOM error types

use midl_ndr::NdrError;
use thiserror::Error;

/// Result type for DCOM operations
pub type Result<T> = std::result::Result<T, DcomError>;

/// DCOM-specific errors
#[derive(Error, Debug)]
pub enum DcomError {
    /// Underlying DCE RPC error, including faults returned by the server
    #[error("DCE RPC error: {0}")]
    Rpc(#[from] dcerpc::RpcError),

    /// Marshaling error
    #[error("NDR error: {0}")]
    Ndr(#[from] NdrError),

    /// The call completed but the server reported a failure HRESULT
    #[error("opnum {opnum} failed: HRESULT 0x{status:08x}")]
    CallFailed { opnum: u16, status: u32 },

    /// Invalid data
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl DcomError {
    /// HRESULT carried by a failed call, if this error is one.
    pub fn hresult(&self) -> Option<u32> {
        match self {
            DcomError::CallFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// HRESULT codes commonly used in DCOM
pub mod hresult {
    /// Operation successful
    pub const S_OK: u32 = 0x00000000;
    /// Operation successful, returning false
    pub const S_FALSE: u32 = 0x00000001;
    /// Not implemented
    pub const E_NOTIMPL: u32 = 0x80004001;
    /// No such interface supported
    pub const E_NOINTERFACE: u32 = 0x80004002;
    /// Invalid pointer
    pub const E_POINTER: u32 = 0x80004003;
    /// Unspecified error
    pub const E_FAIL: u32 = 0x80004005;
    /// Catastrophic failure
    pub const E_UNEXPECTED: u32 = 0x8000FFFF;
    /// Access denied
    pub const E_ACCESSDENIED: u32 = 0x80070005;
    /// Out of memory
    pub const E_OUTOFMEMORY: u32 = 0x8007000E;
    /// Invalid argument
    pub const E_INVALIDARG: u32 = 0x80070057;
    /// ORPCTHIS carried an unsupported COM version
    pub const RPC_E_VERSION_MISMATCH: u32 = 0x80010110;
    /// ORPC header could not be processed
    pub const RPC_E_INVALID_HEADER: u32 = 0x80010111;
}
