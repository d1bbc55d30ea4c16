//! Core DCOM types (MS-DCOM 2.2)
//!
//! This module contains the fundamental data structures used throughout DCOM:
//! - Identifiers: CID, IPID
//! - ORPC headers: ORPCTHIS, ORPCTHAT and their extent arrays
//! - Errors and HRESULT codes

mod error;
mod identifiers;
mod orpc;

// Re-export all types
pub use error::*;
pub use identifiers::{from_uuid, generate_uuid, Cid, Ipid};
pub use orpc::*;
