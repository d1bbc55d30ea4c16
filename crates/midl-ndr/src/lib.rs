//! NDR (Network Data Representation) runtime library
//!
//! This crate is the runtime that RPC stubs call into: it implements the NDR20
//! transfer syntax used by DCE/RPC and MS-RPCE.
//!
//! # NDR Wire Format
//!
//! - Primitives align to their natural size (1, 2, 4, or 8 bytes), padding is
//!   zero on write and skipped on read
//! - Structures align to their largest member
//! - Conformance of an embedded array is hoisted ahead of the structure
//! - Strings are conformant varying arrays with a counted null terminator
//! - Pointer content is deferred until the enclosing top-level value is done
//!
//! # Stub vocabulary
//!
//! Stubs use a small set of cursor operations on [`NdrWriter`] and
//! [`NdrReader`]: `write_data`/`read_data`, `write_pointer`/`read_pointer`,
//! `write_deferred`/`read_deferred`, `write_size`/`read_size`,
//! `write_switch`/`read_switch` and `write_union_align`/`read_union_align`.
//! All per-call state (referent table, deferred queue, size info stack) lives
//! in the cursor, so concurrent calls never share anything.

mod arrays;
mod context;
mod decode;
mod encode;
mod error;
mod pointers;
mod primitives;
mod reader;
mod strings;
mod union;
mod writer;

pub use arrays::{ConformantArray, ConformantVaryingArray, FixedArray, VaryingArray};
pub use context::NdrContext;
pub use decode::{from_bytes, from_bytes_exact, NdrDecode};
pub use encode::{to_bytes, NdrConformant, NdrEncode};
pub use error::{NdrError, Result, MAX_NDR_ALLOCATION_SIZE, MAX_NDR_ARRAY_ELEMENTS};
pub use pointers::{FullPtr, NdrPtr, RefPtr, Referent, UniquePtr};
pub use primitives::{NdrContextHandle, NdrUuid};
pub use reader::{NdrReader, PointerKind};
pub use strings::{NdrString, NdrWString};
pub use union::{NdrUnion, UnionArm};
pub use writer::{NdrWriter, ReferentKey, FIRST_REFERENT_ID, REFERENT_ID_STEP};

/// Re-export bytes for convenience
pub use bytes::{Buf, BufMut, Bytes, BytesMut};
