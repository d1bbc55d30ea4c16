//! NDR primitive type implementations
//!
//! | MIDL Type      | Rust Type | Size | Alignment |
//! |----------------|-----------|------|-----------|
//! | boolean        | bool      | 1    | 1         |
//! | byte/char      | u8        | 1    | 1         |
//! | small          | i8        | 1    | 1         |
//! | short          | i16       | 2    | 2         |
//! | long/int       | i32       | 4    | 4         |
//! | hyper          | i64       | 8    | 8         |
//! | unsigned short | u16       | 2    | 2         |
//! | unsigned long  | u32       | 4    | 4         |
//! | unsigned hyper | u64       | 8    | 8         |
//! | float          | f32       | 4    | 4         |
//! | double         | f64       | 8    | 8         |
//! | wchar_t        | u16       | 2    | 2         |
//! | GUID           | NdrUuid   | 16   | 4         |
//! | context handle | NdrContextHandle | 20 | 4   |

use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};

macro_rules! impl_ndr_primitive {
    ($($ty:ty => $size:expr, $write:ident, $read:ident;)*) => {
        $(
            impl NdrEncode for $ty {
                fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
                    w.$write(*self);
                    Ok(())
                }

                fn ndr_align() -> usize {
                    $size
                }
            }

            impl NdrDecode for $ty {
                fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
                    r.$read()
                }

                fn ndr_align() -> usize {
                    $size
                }

                fn ndr_min_size() -> usize {
                    $size
                }
            }
        )*
    };
}

impl_ndr_primitive! {
    u8 => 1, write_u8, read_u8;
    i8 => 1, write_i8, read_i8;
    bool => 1, write_bool, read_bool;
    u16 => 2, write_u16, read_u16;
    i16 => 2, write_i16, read_i16;
    u32 => 4, write_u32, read_u32;
    i32 => 4, write_i32, read_i32;
    u64 => 8, write_u64, read_u64;
    i64 => 8, write_i64, read_i64;
    f32 => 4, write_f32, read_f32;
    f64 => 8, write_f64, read_f64;
}

/// Wire bits for `value` as an integer of `width` bytes.
///
/// Accepts anything representable either signed or unsigned at that width.
pub(crate) fn enum_bits(width: usize, value: i64) -> Result<u64> {
    match width {
        1 | 2 | 4 => {
            let bits = width as u32 * 8;
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << bits) - 1;
            if value < min || value > max {
                return Err(NdrError::InvalidEnumValue { width, value });
            }
            Ok(value as u64 & ((1u64 << bits) - 1))
        }
        8 => Ok(value as u64),
        _ => Err(NdrError::InvalidEnumValue { width, value }),
    }
}

/// Compare a registered tag with a tag read from the wire at `width` bytes.
pub(crate) fn same_tag(width: usize, registered: i64, wire: i64) -> bool {
    match (enum_bits(width, registered), enum_bits(width, wire)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// GUID/UUID in NDR layout (`data1` to `data3` follow the byte order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NdrUuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl NdrUuid {
    /// Nil UUID
    pub const NIL: Self = Self {
        data1: 0,
        data2: 0,
        data3: 0,
        data4: [0; 8],
    };

    /// Parse from string "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx"
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let parts: Vec<&str> = s.split('-').collect();
        let [p1, p2, p3, p4, p5] = parts.as_slice() else {
            return None;
        };
        if p1.len() != 8 || p2.len() != 4 || p3.len() != 4 || p4.len() != 4 || p5.len() != 12 {
            return None;
        }

        let clock = u16::from_str_radix(p4, 16).ok()?;
        let node = u64::from_str_radix(p5, 16).ok()?;
        let mut data4 = [0u8; 8];
        data4[..2].copy_from_slice(&clock.to_be_bytes());
        data4[2..].copy_from_slice(&node.to_be_bytes()[2..]);

        Some(Self {
            data1: u32::from_str_radix(p1, 16).ok()?,
            data2: u16::from_str_radix(p2, 16).ok()?,
            data3: u16::from_str_radix(p3, 16).ok()?,
            data4,
        })
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }
}

impl std::fmt::Display for NdrUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7],
        )
    }
}

impl NdrEncode for NdrUuid {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_u32(self.data1);
        w.write_u16(self.data2);
        w.write_u16(self.data3);
        w.write_bytes(&self.data4);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for NdrUuid {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let data1 = r.read_u32()?;
        let data2 = r.read_u16()?;
        let data3 = r.read_u16()?;
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(r.read_bytes(8)?);
        Ok(Self {
            data1,
            data2,
            data3,
            data4,
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        16
    }
}

/// RPC context handle (`ndr_context_handle`): attributes plus a UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NdrContextHandle {
    pub attributes: u32,
    pub uuid: NdrUuid,
}

impl NdrContextHandle {
    pub fn new(uuid: NdrUuid) -> Self {
        Self { attributes: 0, uuid }
    }

    /// A null handle closes or has never been opened.
    pub fn is_null(&self) -> bool {
        self.attributes == 0 && self.uuid.is_nil()
    }
}

impl NdrEncode for NdrContextHandle {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_u32(self.attributes);
        self.uuid.ndr_encode(w)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for NdrContextHandle {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        Ok(Self {
            attributes: r.read_u32()?,
            uuid: NdrUuid::ndr_decode(r)?,
        })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        20
    }
}
