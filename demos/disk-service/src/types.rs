//! Wire types and operations of the disk service
//!
//! Hand-written stubs in the shape a MIDL compiler emits: each structure
//! writes its fixed part in declaration order and leaves pointees to the
//! deferred pass.

use bytes::Bytes;
use dcerpc::Uuid;
use dcom::OrpcOperation;
use midl_ndr::{
    ConformantArray, FullPtr, NdrDecode, NdrEncode, NdrReader, NdrUnion, NdrWString, NdrWriter,
    Result, UnionArm, UniquePtr,
};

/// Interface UUID of the disk service
pub const DISK_SERVICE_UUID: &str = "e0393303-90d4-4a97-ab71-e9b671ee2729";
pub const DISK_SERVICE_VERSION: u16 = 0;

/// Identifier of a disk or pack
pub type ObjectId = Uuid;

/// Per-disk status codes
pub mod status {
    /// The object was not found
    pub const VDS_E_OBJECT_NOT_FOUND: u32 = 0x8004_2405;
    /// The disk belongs to a pack that is in use
    pub const VDS_E_PACK_ONLINE: u32 = 0x8004_2447;
}

/// Partitioning scheme, the discriminant of [`DiskSignature`]
pub mod partition_style {
    pub const MBR: i64 = 1;
    pub const GPT: i64 = 2;
}

/// Disk signature, by partition style
#[derive(Debug, Clone, PartialEq)]
pub enum DiskSignature {
    Mbr(u32),
    Gpt(Uuid),
    /// A partition style this build does not know
    Unknown { style: i64, raw: Bytes },
}

impl Default for DiskSignature {
    fn default() -> Self {
        DiskSignature::Mbr(0)
    }
}

fn decode_mbr(r: &mut NdrReader<'_>) -> Result<DiskSignature> {
    r.read_u32().map(DiskSignature::Mbr)
}

fn decode_gpt(r: &mut NdrReader<'_>) -> Result<DiskSignature> {
    r.read_data().map(DiskSignature::Gpt)
}

impl NdrUnion for DiskSignature {
    const SWITCH_WIDTH: usize = 4;
    const ALIGN: usize = 4;
    const ARMS: &'static [UnionArm<Self>] = &[
        UnionArm {
            tag: partition_style::MBR,
            decode: decode_mbr,
        },
        UnionArm {
            tag: partition_style::GPT,
            decode: decode_gpt,
        },
    ];
    // the GUID arm
    const UNKNOWN_ARM_SIZE: Option<usize> = Some(16);

    fn discriminant(&self) -> i64 {
        match self {
            DiskSignature::Mbr(_) => partition_style::MBR,
            DiskSignature::Gpt(_) => partition_style::GPT,
            DiskSignature::Unknown { style, .. } => *style,
        }
    }

    fn encode_arm<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        match self {
            DiskSignature::Mbr(signature) => w.write_u32(*signature),
            DiskSignature::Gpt(guid) => w.write_data(guid)?,
            DiskSignature::Unknown { raw, .. } => w.write_bytes(raw),
        }
        Ok(())
    }

    fn unknown(style: i64, raw: Bytes) -> Self {
        DiskSignature::Unknown { style, raw }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, DiskSignature::Unknown { .. })
    }
}

impl NdrEncode for DiskSignature {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_union(self)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for DiskSignature {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.read_union()
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        8
    }
}

/// A group of disks managed together
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackInfo {
    pub id: ObjectId,
    pub online: bool,
    pub name: UniquePtr<NdrWString>,
}

impl PackInfo {
    pub fn new(id: ObjectId, name: &str, online: bool) -> Self {
        Self {
            id,
            online,
            name: UniquePtr::new(NdrWString::new(name)),
        }
    }
}

impl NdrEncode for PackInfo {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_struct_align(4);
        w.write_data(&self.id)?;
        w.write_bool(self.online);
        w.write_data(&self.name)?;
        w.write_trailing_gap(4);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for PackInfo {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.read_struct_align(4);
        let id = r.read_data()?;
        let online = r.read_bool()?;
        let name = r.read_data()?;
        r.read_trailing_gap(4);
        Ok(Self { id, online, name })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        24
    }
}

/// Disk properties
///
/// `pack` is a full pointer: disks of one pack share a single [`PackInfo`]
/// instance, on the wire and after decoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiskInfo {
    pub id: ObjectId,
    /// Size in bytes
    pub size: u64,
    pub signature: DiskSignature,
    pub friendly_name: UniquePtr<NdrWString>,
    pub pack: FullPtr<PackInfo>,
}

impl DiskInfo {
    pub fn name(&self) -> Option<&str> {
        self.friendly_name.get().map(NdrWString::as_str)
    }
}

impl NdrEncode for DiskInfo {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_struct_align(8);
        w.write_data(&self.id)?;
        w.write_u64(self.size);
        w.write_data(&self.signature)?;
        w.write_data(&self.friendly_name)?;
        w.write_data(&self.pack)?;
        w.write_trailing_gap(8);
        Ok(())
    }

    fn ndr_align() -> usize {
        8
    }
}

impl NdrDecode for DiskInfo {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.read_struct_align(8);
        let id = r.read_data()?;
        let size = r.read_u64()?;
        let signature = r.read_data()?;
        let friendly_name = r.read_data()?;
        let pack = r.read_data()?;
        r.read_trailing_gap(8);
        Ok(Self {
            id,
            size,
            signature,
            friendly_name,
            pack,
        })
    }

    fn ndr_align() -> usize {
        8
    }

    fn ndr_min_size() -> usize {
        40
    }
}

/// `[out] ULONG *pulCount, [out, size_is(,*pulCount)] VDS_DISK_PROP **ppDiskProp`
///
/// The array is written with `count` elements: missing ones are filled with
/// defaults and extra ones dropped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiskList {
    pub count: u32,
    pub disks: UniquePtr<ConformantArray<DiskInfo>>,
}

impl DiskList {
    pub fn new(disks: Vec<DiskInfo>) -> Self {
        Self {
            count: disks.len() as u32,
            disks: UniquePtr::new(ConformantArray::new(disks)),
        }
    }

    pub fn disks(&self) -> &[DiskInfo] {
        self.disks
            .get()
            .map(|array| array.elements.as_slice())
            .unwrap_or(&[])
    }
}

impl NdrEncode for DiskList {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_u32(self.count);
        let count = u64::from(self.count);
        let disks = self.disks.get().map(|array| array.elements.as_slice());
        if disks.is_none() && count == 0 {
            w.write_null_pointer();
            return Ok(());
        }
        let disks = disks.unwrap_or(&[]);
        w.write_pointer_with(None, move |w| w.write_conformant_array(count, disks))?;
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for DiskList {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        Ok(Self {
            count: r.read_u32()?,
            disks: r.read_data()?,
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        8
    }
}

/// `[in, size_is(ulCount)] VDS_OBJECT_ID *pDiskIdArray, [in] ULONG ulCount, [in] BOOL bForce`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UninstallDisksIn {
    pub disk_ids: Vec<ObjectId>,
    pub count: u32,
    pub force: bool,
}

impl UninstallDisksIn {
    pub fn new(disk_ids: Vec<ObjectId>, force: bool) -> Self {
        Self {
            count: disk_ids.len() as u32,
            disk_ids,
            force,
        }
    }
}

impl NdrEncode for UninstallDisksIn {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_conformant_array(u64::from(self.count), self.disk_ids.as_slice())?;
        w.write_u32(self.count);
        w.write_i32(i32::from(self.force));
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for UninstallDisksIn {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        Ok(Self {
            disk_ids: r.read_conformant_array()?,
            count: r.read_u32()?,
            force: r.read_i32()? != 0,
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        12
    }
}

/// `[out] BOOL *pbReboot, [out, size_is(ulCount)] HRESULT *pResults`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UninstallDisksOut {
    pub reboot: bool,
    pub results: Vec<u32>,
}

impl NdrEncode for UninstallDisksOut {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_i32(i32::from(self.reboot));
        w.write_conformant_array(self.results.len() as u64, self.results.as_slice())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for UninstallDisksOut {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        Ok(Self {
            reboot: r.read_i32()? != 0,
            results: r.read_conformant_array()?,
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        8
    }
}

/// List disks, at most `max` of them (0 for all)
pub struct QueryDisks;

impl OrpcOperation for QueryDisks {
    const OPNUM: u16 = 3;
    const NAME: &'static str = "QueryDisks";
    type In = u32;
    type Out = DiskList;
}

/// Remove disks from the service; one HRESULT per requested disk
pub struct UninstallDisks;

impl OrpcOperation for UninstallDisks {
    const OPNUM: u16 = 4;
    const NAME: &'static str = "UninstallDisks";
    type In = UninstallDisksIn;
    type Out = UninstallDisksOut;
}

/// Look a disk up by friendly name
pub struct GetDiskIdFromName;

impl OrpcOperation for GetDiskIdFromName {
    const OPNUM: u16 = 5;
    const NAME: &'static str = "GetDiskIdFromName";
    type In = NdrWString;
    type Out = ObjectId;
}
