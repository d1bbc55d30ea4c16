//! Byte order and alignment rules shared by the NDR writer and reader.

use bytes::{Buf, BufMut};

/// Integer representation bit in the first byte of a DCE/RPC data
/// representation label. Set means little-endian.
const DREP_LITTLE_ENDIAN: u8 = 0x10;

/// NDR transfer context
///
/// Carries the negotiated integer byte order. Every writer and reader owns a
/// copy; there is no process-wide state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdrContext {
    /// Whether to use little-endian byte order
    pub little_endian: bool,
}

macro_rules! byte_order_accessors {
    ($($ty:ty => $put:ident, $put_le:ident, $put_be:ident, $get:ident, $get_le:ident, $get_be:ident;)*) => {
        $(
            #[inline]
            pub fn $put<B: BufMut>(&self, buf: &mut B, value: $ty) {
                if self.little_endian {
                    buf.$put_le(value)
                } else {
                    buf.$put_be(value)
                }
            }

            /// Caller guarantees enough bytes remain.
            #[inline]
            pub fn $get<B: Buf>(&self, buf: &mut B) -> $ty {
                if self.little_endian {
                    buf.$get_le()
                } else {
                    buf.$get_be()
                }
            }
        )*
    };
}

impl NdrContext {
    /// Little-endian context, the common case on the wire
    pub const fn new() -> Self {
        Self { little_endian: true }
    }

    pub const fn big_endian() -> Self {
        Self { little_endian: false }
    }

    pub const fn with_byte_order(little_endian: bool) -> Self {
        Self { little_endian }
    }

    /// Derive the context from the first byte of a data representation label.
    pub const fn from_drep(drep0: u8) -> Self {
        Self {
            little_endian: drep0 & DREP_LITTLE_ENDIAN != 0,
        }
    }

    /// First byte of the data representation label for this context
    /// (ASCII characters, IEEE floats).
    pub const fn drep0(&self) -> u8 {
        if self.little_endian {
            DREP_LITTLE_ENDIAN
        } else {
            0
        }
    }

    /// Padding needed to move `position` to the next multiple of `alignment`.
    #[inline]
    pub fn align_padding(position: usize, alignment: usize) -> usize {
        if alignment <= 1 {
            return 0;
        }
        match position % alignment {
            0 => 0,
            rem => alignment - rem,
        }
    }

    byte_order_accessors! {
        u16 => put_u16, put_u16_le, put_u16, get_u16, get_u16_le, get_u16;
        i16 => put_i16, put_i16_le, put_i16, get_i16, get_i16_le, get_i16;
        u32 => put_u32, put_u32_le, put_u32, get_u32, get_u32_le, get_u32;
        i32 => put_i32, put_i32_le, put_i32, get_i32, get_i32_le, get_i32;
        u64 => put_u64, put_u64_le, put_u64, get_u64, get_u64_le, get_u64;
        i64 => put_i64, put_i64_le, put_i64, get_i64, get_i64_le, get_i64;
        f32 => put_f32, put_f32_le, put_f32, get_f32, get_f32_le, get_f32;
        f64 => put_f64, put_f64_le, put_f64, get_f64, get_f64_le, get_f64;
    }
}

impl Default for NdrContext {
    fn default() -> Self {
        Self::new()
    }
}
