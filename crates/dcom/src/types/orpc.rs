//! ORPC (Object RPC) header types (MS-DCOM 2.2.13, 2.2.14)
//!
//! These structures are prepended to all ORPC calls and responses.
//!
//! Wire layout (NDR, 4-byte aligned):
//! ```text
//! ORPCTHIS  { COMVERSION version; u32 flags; u32 reserved1; CID cid;
//!             [unique] ORPC_EXTENT_ARRAY *extensions; }
//! ORPCTHAT  { u32 flags; [unique] ORPC_EXTENT_ARRAY *extensions; }
//! ORPC_EXTENT_ARRAY { u32 size; u32 reserved;
//!             [unique, size_is((size+1)&~1)] ORPC_EXTENT **extent; }
//! ORPC_EXTENT { GUID id; u32 size; [size_is((size+7)&~7)] byte data[]; }
//! ```

use midl_ndr::{
    ConformantArray, NdrConformant, NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter,
    UniquePtr,
};

use super::identifiers::Cid;

/// COM version structure (MS-DCOM 2.2.11)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ComVersion {
    /// Major version number
    pub major: u16,
    /// Minor version number
    pub minor: u16,
}

impl ComVersion {
    /// Size in bytes
    pub const SIZE: usize = 4;

    /// The only major version a server accepts
    pub const MAJOR: u16 = 5;

    /// DCOM version 5.1 (Windows 2000)
    pub const DCOM_5_1: Self = Self { major: 5, minor: 1 };
    /// DCOM version 5.4 (Windows XP/2003)
    pub const DCOM_5_4: Self = Self { major: 5, minor: 4 };
    /// DCOM version 5.6 (Windows Vista)
    pub const DCOM_5_6: Self = Self { major: 5, minor: 6 };
    /// DCOM version 5.7 (Windows 7)
    pub const DCOM_5_7: Self = Self { major: 5, minor: 7 };

    /// Create a new COM version
    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_supported(&self) -> bool {
        self.major == Self::MAJOR
    }
}

impl NdrEncode for ComVersion {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> midl_ndr::Result<()> {
        w.write_u16(self.major);
        w.write_u16(self.minor);
        Ok(())
    }

    fn ndr_align() -> usize {
        2
    }
}

impl NdrDecode for ComVersion {
    fn ndr_decode(r: &mut NdrReader<'_>) -> midl_ndr::Result<Self> {
        Ok(Self {
            major: r.read_u16()?,
            minor: r.read_u16()?,
        })
    }

    fn ndr_align() -> usize {
        2
    }

    fn ndr_min_size() -> usize {
        Self::SIZE
    }
}

/// ORPC extension array entry
///
/// A conformant structure: the padded length of `data` is hoisted ahead of
/// `id`. `data` is padded with zeros up to a multiple of 8 on the wire and
/// trimmed back to `size` on decode.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct OrpcExtent {
    /// Extension UUID identifier
    pub id: dcerpc::Uuid,
    /// Extension data size
    pub size: u32,
    /// Extension data
    pub data: Vec<u8>,
}

impl OrpcExtent {
    pub fn new(id: dcerpc::Uuid, data: Vec<u8>) -> Self {
        Self {
            id,
            size: data.len() as u32,
            data,
        }
    }

    /// Length of `data` on the wire: `size` rounded up to 8
    pub fn padded_len(&self) -> u64 {
        (u64::from(self.size) + 7) & !7
    }
}

impl NdrConformant for OrpcExtent {
    fn ndr_size_info(&self) -> Vec<u64> {
        vec![self.padded_len()]
    }
}

impl NdrEncode for OrpcExtent {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> midl_ndr::Result<()> {
        w.with_conformance(self.ndr_size_info(), |w| {
            let max_count = w
                .take_size_info()
                .and_then(|sizes| sizes.first().copied())
                .unwrap_or_else(|| self.padded_len());
            w.write_align(4);
            w.write_data(&self.id)?;
            w.write_u32(self.size);
            w.write_array_elements(max_count, self.data.as_slice())
        })
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for OrpcExtent {
    fn ndr_decode(r: &mut NdrReader<'_>) -> midl_ndr::Result<Self> {
        r.with_conformance(1, |r| {
            let max_count = match r.take_size_info().and_then(|sizes| sizes.first().copied()) {
                Some(count) => count,
                None => r.read_size()?,
            };
            r.read_align(4);
            let id = r.read_data()?;
            let size = r.read_u32()?;
            if u64::from(size) > max_count {
                return Err(NdrError::ConformanceMismatch {
                    max_count,
                    offset: 0,
                    actual_count: u64::from(size),
                });
            }
            let mut data: Vec<u8> = r.read_array_elements(max_count)?;
            data.truncate(size as usize);
            Ok(Self { id, size, data })
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        4 + 16 + 4
    }
}

/// ORPC extent array
///
/// `size` counts the extents; the pointed-to array always holds an even
/// number of slots, the missing ones being null.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct OrpcExtentArray {
    /// Number of extents
    pub size: u32,
    /// Reserved (must be 0)
    pub reserved: u32,
    /// Extent slots
    pub extents: UniquePtr<ConformantArray<UniquePtr<OrpcExtent>>>,
}

impl OrpcExtentArray {
    pub fn new(extents: Vec<OrpcExtent>) -> Self {
        let size = extents.len() as u32;
        let slots = extents.into_iter().map(UniquePtr::new).collect();
        Self {
            size,
            reserved: 0,
            extents: UniquePtr::new(ConformantArray::new(slots)),
        }
    }

    /// Slot count on the wire: `size` rounded up to even
    pub fn slot_count(&self) -> u64 {
        (u64::from(self.size) + 1) & !1
    }

    /// Non-null extents in order
    pub fn extents(&self) -> impl Iterator<Item = &OrpcExtent> {
        self.extents
            .get()
            .into_iter()
            .flat_map(|array| array.elements.iter())
            .filter_map(|slot| slot.get())
    }

    /// First extent carrying `id`
    pub fn find(&self, id: &dcerpc::Uuid) -> Option<&OrpcExtent> {
        self.extents().find(|extent| &extent.id == id)
    }
}

impl NdrEncode for OrpcExtentArray {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> midl_ndr::Result<()> {
        w.write_align(4);
        w.write_u32(self.size);
        w.write_u32(self.reserved);

        let slot_count = self.slot_count();
        let slots = self.extents.get().map(|array| array.elements.as_slice());
        if slots.is_none() && slot_count == 0 {
            w.write_null_pointer();
            return Ok(());
        }
        let slots = slots.unwrap_or(&[]);
        w.write_pointer_with(None, move |w| {
            w.write_size(slot_count)?;
            w.write_array_elements(slot_count, slots)
        })?;
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for OrpcExtentArray {
    fn ndr_decode(r: &mut NdrReader<'_>) -> midl_ndr::Result<Self> {
        r.read_align(4);
        Ok(Self {
            size: r.read_u32()?,
            reserved: r.read_u32()?,
            extents: r.read_data()?,
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        12
    }
}

/// ORPCTHIS flags (MS-DCOM 2.2.13.1)
pub mod orpc_flags {
    /// No flags
    pub const ORPCF_NULL: u32 = 0x00;
    /// Local call
    pub const ORPCF_LOCAL: u32 = 0x01;
    pub const ORPCF_RESERVED1: u32 = 0x02;
    pub const ORPCF_RESERVED2: u32 = 0x04;
    pub const ORPCF_RESERVED3: u32 = 0x08;
    pub const ORPCF_RESERVED4: u32 = 0x10;
}

/// ORPCTHIS structure (MS-DCOM 2.2.13)
///
/// Sent with every ORPC request from client to server.
#[derive(Clone, Debug, PartialEq)]
pub struct OrpcThis {
    /// COM version
    pub version: ComVersion,
    /// Flags (see [`orpc_flags`])
    pub flags: u32,
    /// Reserved (must be 0)
    pub reserved1: u32,
    /// Causality ID (UUID identifying the call chain)
    pub cid: Cid,
    /// Optional extension array
    pub extensions: UniquePtr<OrpcExtentArray>,
}

impl OrpcThis {
    /// Minimum size without extensions
    pub const MIN_SIZE: usize = 4 + 4 + 4 + 16 + 4;

    /// Version 5.7 with a fresh causality ID
    pub fn new() -> Self {
        Self::with_causality(Cid::generate())
    }

    /// Create with a specific causality ID, to continue an existing chain
    pub fn with_causality(cid: Cid) -> Self {
        Self {
            version: ComVersion::DCOM_5_7,
            flags: orpc_flags::ORPCF_NULL,
            reserved1: 0,
            cid,
            extensions: UniquePtr::null(),
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<OrpcExtent>) -> Self {
        self.extensions = UniquePtr::new(OrpcExtentArray::new(extensions));
        self
    }
}

impl Default for OrpcThis {
    fn default() -> Self {
        Self::new()
    }
}

impl NdrEncode for OrpcThis {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> midl_ndr::Result<()> {
        w.write_align(4);
        w.write_data(&self.version)?;
        w.write_u32(self.flags);
        w.write_u32(self.reserved1);
        w.write_data(&self.cid)?;
        w.write_data(&self.extensions)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for OrpcThis {
    fn ndr_decode(r: &mut NdrReader<'_>) -> midl_ndr::Result<Self> {
        r.read_align(4);
        Ok(Self {
            version: r.read_data()?,
            flags: r.read_u32()?,
            reserved1: r.read_u32()?,
            cid: r.read_data()?,
            extensions: r.read_data()?,
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        Self::MIN_SIZE
    }
}

/// ORPCTHAT structure (MS-DCOM 2.2.14)
///
/// Sent with every ORPC response from server to client.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct OrpcThat {
    /// Flags (must be 0)
    pub flags: u32,
    /// Optional extension array
    pub extensions: UniquePtr<OrpcExtentArray>,
}

impl OrpcThat {
    /// Minimum size without extensions
    pub const MIN_SIZE: usize = 4 + 4;

    /// Create a new empty ORPCTHAT
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extensions(mut self, extensions: Vec<OrpcExtent>) -> Self {
        self.extensions = UniquePtr::new(OrpcExtentArray::new(extensions));
        self
    }
}

impl NdrEncode for OrpcThat {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> midl_ndr::Result<()> {
        w.write_align(4);
        w.write_u32(self.flags);
        w.write_data(&self.extensions)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for OrpcThat {
    fn ndr_decode(r: &mut NdrReader<'_>) -> midl_ndr::Result<Self> {
        r.read_align(4);
        Ok(Self {
            flags: r.read_u32()?,
            extensions: r.read_data()?,
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        Self::MIN_SIZE
    }
}

/// Well-known extension UUIDs
pub mod extent_ids {
    /// Error info extension
    pub const ERROR_INFO: &str = "0000031c-0000-0000-c000-000000000046";
    /// Call context extension
    pub const CONTEXT: &str = "00000334-0000-0000-c000-000000000046";
}
