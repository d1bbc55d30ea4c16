//! DCE RPC PDU (Protocol Data Unit) types
//!
//! Connection-oriented request, response and fault PDUs as defined in
//! DCE 1.1 (C706) and MS-RPCE. Bind negotiation and authentication happen
//! below this layer; a PDU arriving here already belongs to a bound
//! presentation context.
//!
//! ```text
//! +--------+--------+--------+--------+
//! |  vers  |vers_min| ptype  | pflags |
//! +--------+--------+--------+--------+
//! |        data representation        |
//! +--------+--------+--------+--------+
//! |   frag_len      |   auth_len      |
//! +--------+--------+--------+--------+
//! |             call_id               |
//! +--------+--------+--------+--------+
//! ```
//!
//! Integer fields after the data representation label follow its byte
//! order, and so does the NDR stub data carried in the body.

use crate::error::{Result, RpcError};
use bytes::{BufMut, Bytes, BytesMut};
use midl_ndr::{NdrContext, NdrDecode, NdrEncode, NdrReader, NdrUuid, NdrWriter};

/// Interface, object and causality identifiers share the NDR GUID layout.
pub type Uuid = NdrUuid;

/// DCE RPC protocol version
pub const DCE_RPC_VERSION: u8 = 5;
/// DCE RPC protocol minor version
pub const DCE_RPC_VERSION_MINOR: u8 = 0;

/// NDR Transfer Syntax UUID
pub const NDR_SYNTAX_UUID: &str = "8a885d04-1ceb-11c9-9fe8-08002b104860";
pub const NDR_SYNTAX_VERSION: u32 = 2;

/// Connection-oriented packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Request = 0,
    Response = 2,
    Fault = 3,
    Bind = 11,
    BindAck = 12,
    BindNak = 13,
    AlterContext = 14,
    AlterContextResp = 15,
    Auth3 = 16,
    Shutdown = 17,
    CoCancel = 18,
    Orphaned = 19,
}

impl TryFrom<u8> for PacketType {
    type Error = RpcError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::Request,
            2 => Self::Response,
            3 => Self::Fault,
            11 => Self::Bind,
            12 => Self::BindAck,
            13 => Self::BindNak,
            14 => Self::AlterContext,
            15 => Self::AlterContextResp,
            16 => Self::Auth3,
            17 => Self::Shutdown,
            18 => Self::CoCancel,
            19 => Self::Orphaned,
            other => return Err(RpcError::InvalidMessageType(other as i32)),
        })
    }
}

/// Packet flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags(u8);

impl PacketFlags {
    pub const FIRST_FRAG: u8 = 0x01;
    pub const LAST_FRAG: u8 = 0x02;
    pub const PENDING_CANCEL: u8 = 0x04;
    pub const CONC_MPX: u8 = 0x10;
    pub const DID_NOT_EXECUTE: u8 = 0x20;
    pub const MAYBE: u8 = 0x40;
    /// Object UUID follows the request body header
    pub const OBJECT_UUID: u8 = 0x80;

    /// Flags for a complete (non-fragmented) PDU
    pub fn complete() -> Self {
        Self(Self::FIRST_FRAG | Self::LAST_FRAG)
    }

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn with(self, flag: u8) -> Self {
        Self(self.0 | flag)
    }

    pub fn without(self, flag: u8) -> Self {
        Self(self.0 & !flag)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn from_u8(value: u8) -> Self {
        Self(value)
    }
}

/// Integer representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntRep {
    BigEndian = 0,
    LittleEndian = 1,
}

/// Character representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharRep {
    Ascii = 0,
    Ebcdic = 1,
}

/// Floating point representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatRep {
    Ieee = 0,
    Vax = 1,
    Cray = 2,
    Ibm = 3,
}

/// Data Representation Format Label
///
/// Byte 0 holds the integer representation in its upper nibble and the
/// character set in its lower nibble, byte 1 the floating point format.
/// Bytes 2 and 3 are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRepresentation {
    pub int_rep: IntRep,
    pub char_rep: CharRep,
    pub float_rep: FloatRep,
}

impl DataRepresentation {
    /// Little-endian, ASCII, IEEE: `[0x10, 0x00, 0x00, 0x00]`
    pub fn ndr() -> Self {
        Self::from_context(NdrContext::new())
    }

    pub fn big_endian() -> Self {
        Self::from_context(NdrContext::big_endian())
    }

    /// Label for the byte order of an NDR context.
    pub fn from_context(ctx: NdrContext) -> Self {
        Self {
            int_rep: if ctx.little_endian {
                IntRep::LittleEndian
            } else {
                IntRep::BigEndian
            },
            char_rep: CharRep::Ascii,
            float_rep: FloatRep::Ieee,
        }
    }

    /// NDR context that stub data under this label is encoded with.
    pub fn ndr_context(&self) -> NdrContext {
        NdrContext::with_byte_order(self.is_little_endian())
    }

    pub fn encode(&self) -> [u8; 4] {
        let byte0 = (self.char_rep as u8) | ((self.int_rep as u8) << 4);
        [byte0, self.float_rep as u8, 0, 0]
    }

    pub fn decode(data: [u8; 4]) -> Self {
        let int_rep = if NdrContext::from_drep(data[0]).little_endian {
            IntRep::LittleEndian
        } else {
            IntRep::BigEndian
        };
        let char_rep = if data[0] & 0x0F == 0 {
            CharRep::Ascii
        } else {
            CharRep::Ebcdic
        };
        let float_rep = match data[1] {
            0 => FloatRep::Ieee,
            1 => FloatRep::Vax,
            2 => FloatRep::Cray,
            _ => FloatRep::Ibm,
        };
        Self {
            int_rep,
            char_rep,
            float_rep,
        }
    }

    pub fn is_little_endian(&self) -> bool {
        self.int_rep == IntRep::LittleEndian
    }
}

impl Default for DataRepresentation {
    fn default() -> Self {
        Self::ndr()
    }
}

/// Syntax ID - interface UUID with version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyntaxId {
    pub uuid: Uuid,
    /// Major version in the lower 16 bits, minor in the upper 16 bits
    pub version: u32,
}

impl SyntaxId {
    pub fn new(uuid: Uuid, major: u16, minor: u16) -> Self {
        Self {
            uuid,
            version: (major as u32) | ((minor as u32) << 16),
        }
    }

    pub fn major_version(&self) -> u16 {
        self.version as u16
    }

    pub fn minor_version(&self) -> u16 {
        (self.version >> 16) as u16
    }
}

impl NdrEncode for SyntaxId {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> midl_ndr::Result<()> {
        self.uuid.ndr_encode(w)?;
        w.write_u32(self.version);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for SyntaxId {
    fn ndr_decode(r: &mut NdrReader<'_>) -> midl_ndr::Result<Self> {
        Ok(Self {
            uuid: r.read_data()?,
            version: r.read_u32()?,
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        20
    }
}

impl std::fmt::Display for SyntaxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} v{}.{}",
            self.uuid,
            self.major_version(),
            self.minor_version()
        )
    }
}

/// Common PDU header (16 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduHeader {
    pub version: u8,
    pub version_minor: u8,
    pub packet_type: PacketType,
    pub packet_flags: PacketFlags,
    pub data_rep: DataRepresentation,
    /// Total length of the PDU fragment, set on encode
    pub frag_length: u16,
    pub auth_length: u16,
    pub call_id: u32,
}

impl PduHeader {
    pub const SIZE: usize = 16;

    pub fn new(packet_type: PacketType, call_id: u32) -> Self {
        Self {
            version: DCE_RPC_VERSION,
            version_minor: DCE_RPC_VERSION_MINOR,
            packet_type,
            packet_flags: PacketFlags::complete(),
            data_rep: DataRepresentation::ndr(),
            frag_length: 0,
            auth_length: 0,
            call_id,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let ctx = self.data_rep.ndr_context();
        buf.put_u8(self.version);
        buf.put_u8(self.version_minor);
        buf.put_u8(self.packet_type as u8);
        buf.put_u8(self.packet_flags.as_u8());
        buf.put_slice(&self.data_rep.encode());
        ctx.put_u16(buf, self.frag_length);
        ctx.put_u16(buf, self.auth_length);
        ctx.put_u32(buf, self.call_id);
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(RpcError::InvalidPdu(format!(
                "header needs {} bytes, got {}",
                Self::SIZE,
                data.len()
            )));
        }

        if data[0] != DCE_RPC_VERSION {
            return Err(RpcError::VersionMismatch {
                expected: DCE_RPC_VERSION,
                got: data[0],
            });
        }

        let data_rep = DataRepresentation::decode([data[4], data[5], data[6], data[7]]);
        let ctx = data_rep.ndr_context();
        let mut rest = &data[8..Self::SIZE];

        Ok(Self {
            version: data[0],
            version_minor: data[1],
            packet_type: PacketType::try_from(data[2])?,
            packet_flags: PacketFlags::from_u8(data[3]),
            data_rep,
            frag_length: ctx.get_u16(&mut rest),
            auth_length: ctx.get_u16(&mut rest),
            call_id: ctx.get_u32(&mut rest),
        })
    }

    /// Decode the header of `data`, check its packet type and return the
    /// header with a reader over the fragment body.
    fn open(data: &[u8], expected: PacketType) -> Result<(Self, NdrReader<'_>)> {
        let header = Self::decode(data)?;
        if header.packet_type != expected {
            return Err(RpcError::InvalidMessageType(header.packet_type as i32));
        }

        let frag_length = header.frag_length as usize;
        if frag_length < Self::SIZE || frag_length > data.len() {
            return Err(RpcError::InvalidPdu(format!(
                "fragment length {} does not fit {} received bytes",
                frag_length,
                data.len()
            )));
        }

        let ctx = header.data_rep.ndr_context();
        Ok((header, NdrReader::new(ctx, &data[Self::SIZE..frag_length])))
    }

    /// Prefix `body` with this header, filling in the fragment length.
    fn frame(&self, body: &[u8]) -> Result<Bytes> {
        let size = Self::SIZE + body.len();
        let frag_length = u16::try_from(size).map_err(|_| RpcError::PduTooLarge {
            size,
            max: u16::MAX as usize,
        })?;

        let mut header = self.clone();
        header.frag_length = frag_length;

        let mut buf = BytesMut::with_capacity(size);
        header.encode(&mut buf);
        buf.put_slice(body);
        Ok(buf.freeze())
    }
}

fn stub_length(stub_data: &Bytes) -> u32 {
    u32::try_from(stub_data.len()).unwrap_or(u32::MAX)
}

/// Request PDU
#[derive(Debug, Clone)]
pub struct RequestPdu {
    pub header: PduHeader,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub opnum: u16,
    /// Object addressed by the call, flagged with `OBJECT_UUID`
    pub object_uuid: Option<Uuid>,
    pub stub_data: Bytes,
}

impl RequestPdu {
    /// alloc_hint(4) + context_id(2) + opnum(2)
    pub const BODY_HEADER_SIZE: usize = 8;

    pub fn new(call_id: u32, opnum: u16, stub_data: Bytes) -> Self {
        Self {
            header: PduHeader::new(PacketType::Request, call_id),
            alloc_hint: stub_length(&stub_data),
            context_id: 0,
            opnum,
            object_uuid: None,
            stub_data,
        }
    }

    pub fn with_object(mut self, object: Uuid) -> Self {
        self.object_uuid = Some(object);
        self
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut w = NdrWriter::with_capacity(
            self.header.data_rep.ndr_context(),
            Self::BODY_HEADER_SIZE + 16 + self.stub_data.len(),
        );
        w.write_u32(self.alloc_hint);
        w.write_u16(self.context_id);
        w.write_u16(self.opnum);
        if let Some(object) = &self.object_uuid {
            object.ndr_encode(&mut w)?;
        }
        w.write_bytes(&self.stub_data);

        let mut header = self.header.clone();
        header.packet_flags = if self.object_uuid.is_some() {
            header.packet_flags.with(PacketFlags::OBJECT_UUID)
        } else {
            header.packet_flags.without(PacketFlags::OBJECT_UUID)
        };
        header.frame(w.as_bytes())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let (header, mut r) = PduHeader::open(data, PacketType::Request)?;

        let alloc_hint = r.read_u32()?;
        let context_id = r.read_u16()?;
        let opnum = r.read_u16()?;
        let object_uuid = if header.packet_flags.contains(PacketFlags::OBJECT_UUID) {
            Some(r.read_data::<Uuid>()?)
        } else {
            None
        };
        let stub_len = r.remaining().saturating_sub(header.auth_length as usize);
        let stub_data = Bytes::copy_from_slice(r.read_bytes(stub_len)?);

        Ok(Self {
            header,
            alloc_hint,
            context_id,
            opnum,
            object_uuid,
            stub_data,
        })
    }
}

/// Response PDU
#[derive(Debug, Clone)]
pub struct ResponsePdu {
    pub header: PduHeader,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub cancel_count: u8,
    pub stub_data: Bytes,
}

impl ResponsePdu {
    /// alloc_hint(4) + context_id(2) + cancel_count(1) + reserved(1)
    pub const BODY_HEADER_SIZE: usize = 8;

    pub fn new(call_id: u32, stub_data: Bytes) -> Self {
        Self {
            header: PduHeader::new(PacketType::Response, call_id),
            alloc_hint: stub_length(&stub_data),
            context_id: 0,
            cancel_count: 0,
            stub_data,
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut w = NdrWriter::with_capacity(
            self.header.data_rep.ndr_context(),
            Self::BODY_HEADER_SIZE + self.stub_data.len(),
        );
        w.write_u32(self.alloc_hint);
        w.write_u16(self.context_id);
        w.write_u8(self.cancel_count);
        w.write_u8(0);
        w.write_bytes(&self.stub_data);
        self.header.frame(w.as_bytes())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let (header, mut r) = PduHeader::open(data, PacketType::Response)?;

        let alloc_hint = r.read_u32()?;
        let context_id = r.read_u16()?;
        let cancel_count = r.read_u8()?;
        let _reserved = r.read_u8()?;
        let stub_len = r.remaining().saturating_sub(header.auth_length as usize);
        let stub_data = Bytes::copy_from_slice(r.read_bytes(stub_len)?);

        Ok(Self {
            header,
            alloc_hint,
            context_id,
            cancel_count,
            stub_data,
        })
    }
}

/// Fault status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FaultStatus {
    AccessDenied = 0x0000_0005,
    /// Stub data could not be unmarshalled
    BadStubData = 0x0000_06f7,
    RpcError = 0x1c00_0000,
    NdrVersion = 0x1c00_0008,
    ContextMismatch = 0x1c00_001a,
    /// Operation number out of range for the interface
    OpRngError = 0x1c01_0002,
    /// Unknown interface
    UnkIf = 0x1c01_0003,
    ProtoError = 0x1c01_000b,
}

impl FaultStatus {
    pub fn from_u32(status: u32) -> Option<Self> {
        Some(match status {
            0x0000_0005 => Self::AccessDenied,
            0x0000_06f7 => Self::BadStubData,
            0x1c00_0000 => Self::RpcError,
            0x1c00_0008 => Self::NdrVersion,
            0x1c00_001a => Self::ContextMismatch,
            0x1c01_0002 => Self::OpRngError,
            0x1c01_0003 => Self::UnkIf,
            0x1c01_000b => Self::ProtoError,
            _ => return None,
        })
    }
}

/// Fault PDU
#[derive(Debug, Clone)]
pub struct FaultPdu {
    pub header: PduHeader,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub cancel_count: u8,
    pub status: u32,
}

impl FaultPdu {
    pub fn new(call_id: u32, status: u32) -> Self {
        let mut header = PduHeader::new(PacketType::Fault, call_id);
        header.packet_flags = header.packet_flags.with(PacketFlags::DID_NOT_EXECUTE);
        Self {
            header,
            alloc_hint: 0,
            context_id: 0,
            cancel_count: 0,
            status,
        }
    }

    /// Encoded size of a fault PDU
    pub const SIZE: usize = PduHeader::SIZE + 16;

    /// Faults have a fixed size, so unlike the other PDUs encoding cannot fail.
    pub fn encode(&self) -> Bytes {
        let ctx = self.header.data_rep.ndr_context();
        let mut header = self.header.clone();
        header.frag_length = Self::SIZE as u16;

        let mut buf = BytesMut::with_capacity(Self::SIZE);
        header.encode(&mut buf);
        ctx.put_u32(&mut buf, self.alloc_hint);
        ctx.put_u16(&mut buf, self.context_id);
        buf.put_u8(self.cancel_count);
        buf.put_u8(0);
        ctx.put_u32(&mut buf, self.status);
        buf.put_u32(0);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let (header, mut r) = PduHeader::open(data, PacketType::Fault)?;

        let alloc_hint = r.read_u32()?;
        let context_id = r.read_u16()?;
        let cancel_count = r.read_u8()?;
        let _reserved = r.read_u8()?;
        let status = r.read_u32()?;

        Ok(Self {
            header,
            alloc_hint,
            context_id,
            cancel_count,
            status,
        })
    }
}

/// Any PDU handled at the call layer
#[derive(Debug, Clone)]
pub enum Pdu {
    Request(RequestPdu),
    Response(ResponsePdu),
    Fault(FaultPdu),
}

impl Pdu {
    pub fn decode(data: &[u8]) -> Result<Self> {
        match PduHeader::decode(data)?.packet_type {
            PacketType::Request => Ok(Pdu::Request(RequestPdu::decode(data)?)),
            PacketType::Response => Ok(Pdu::Response(ResponsePdu::decode(data)?)),
            PacketType::Fault => Ok(Pdu::Fault(FaultPdu::decode(data)?)),
            other => Err(RpcError::InvalidMessageType(other as i32)),
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        match self {
            Pdu::Request(pdu) => pdu.encode(),
            Pdu::Response(pdu) => pdu.encode(),
            Pdu::Fault(pdu) => Ok(pdu.encode()),
        }
    }

    pub fn header(&self) -> &PduHeader {
        match self {
            Pdu::Request(pdu) => &pdu.header,
            Pdu::Response(pdu) => &pdu.header,
            Pdu::Fault(pdu) => &pdu.header,
        }
    }

    pub fn call_id(&self) -> u32 {
        self.header().call_id
    }
}
