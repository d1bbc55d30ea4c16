//! DCOM identifier types (MS-DCOM 2.2.18)
//!
//! - CID: Causality Identifier, shared by all calls of one logical call chain
//! - IPID: Interface Pointer Identifier, the object UUID of an ORPC request

use std::fmt;

use dcerpc::Uuid;
use midl_ndr::{NdrDecode, NdrEncode, NdrReader, NdrWriter};

/// Generate a new random v4 UUID
pub fn generate_uuid() -> Uuid {
    from_uuid(uuid::Uuid::new_v4())
}

/// Convert from the `uuid` crate's byte layout (RFC 4122, big-endian fields).
pub fn from_uuid(value: uuid::Uuid) -> Uuid {
    let (data1, data2, data3, data4) = value.as_fields();
    Uuid {
        data1,
        data2,
        data3,
        data4: *data4,
    }
}

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub Uuid);

        impl $name {
            pub const NIL: Self = Self(Uuid::NIL);

            pub fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Fresh random identifier
            pub fn generate() -> Self {
                Self(generate_uuid())
            }

            pub fn parse(s: &str) -> Option<Self> {
                Uuid::parse(s).map(Self)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl NdrEncode for $name {
            fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> midl_ndr::Result<()> {
                self.0.ndr_encode(w)
            }

            fn ndr_align() -> usize {
                4
            }
        }

        impl NdrDecode for $name {
            fn ndr_decode(r: &mut NdrReader<'_>) -> midl_ndr::Result<Self> {
                Uuid::ndr_decode(r).map(Self)
            }

            fn ndr_align() -> usize {
                4
            }

            fn ndr_min_size() -> usize {
                16
            }
        }
    };
}

uuid_identifier!(
    /// Causality Identifier (16 bytes)
    ///
    /// Identifies a chain of nested calls so a server can recognize
    /// reentrant calls that belong to the same logical operation.
    Cid,
    "CID"
);

uuid_identifier!(
    /// Interface Pointer Identifier (16 bytes)
    ///
    /// Names one interface on one object. It travels as the object UUID of
    /// the request PDU.
    Ipid,
    "IPID"
);
