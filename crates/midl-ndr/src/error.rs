//! NDR error types

use thiserror::Error;

/// Hard ceiling on the element count of any decoded array or string.
///
/// Applied in addition to the remaining-input check so that even a large,
/// well-formed buffer cannot request an unreasonable allocation.
pub const MAX_NDR_ARRAY_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Hard ceiling on the number of bytes reserved for a single decoded array.
pub const MAX_NDR_ALLOCATION_SIZE: u64 = 256 * 1024 * 1024;

/// NDR encoding/decoding errors
#[derive(Debug, Error)]
pub enum NdrError {
    /// A read would consume more bytes than remain in the input
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },

    /// A declared array or string length exceeds the remaining input
    #[error("declared length {declared} exceeds remaining input of {remaining} bytes")]
    BufferOverflow { declared: u64, remaining: usize },

    /// Structurally invalid union discriminant (width, alignment or arm table)
    #[error("malformed union: {0}")]
    MalformedUnion(String),

    /// Referent id that cannot be resolved to a value of the expected type
    #[error("invalid pointer: referent id {0:#x}")]
    InvalidPointer(u32),

    /// Invalid string - not null terminated or invalid encoding
    #[error("invalid string: {0}")]
    InvalidString(String),

    /// Offset and actual count do not fit inside max count
    #[error("conformance mismatch: max_count={max_count}, offset={offset}, actual_count={actual_count}")]
    ConformanceMismatch {
        max_count: u64,
        offset: u64,
        actual_count: u64,
    },

    /// Enum or switch value that does not fit the wire width
    #[error("invalid enum value {value} for width {width}")]
    InvalidEnumValue { width: usize, value: i64 },

    /// Declared size passes the input check but exceeds the hard limits
    #[error("allocation limit exceeded: requested {requested}, limit {limit}")]
    AllocationLimitExceeded { requested: u64, limit: u64 },

    /// Array padding element whose default value holds a non-null pointer
    #[error("default element used as array padding holds a non-null pointer")]
    PointerInPadding,

    /// Non-padding bytes follow a value that should end the input
    #[error("{0} trailing bytes after value")]
    TrailingData(usize),

    /// Size arithmetic overflowed
    #[error("integer overflow in size computation")]
    IntegerOverflow,

    /// UTF-8 decoding error
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// UTF-16 decoding error
    #[error("UTF-16 error: {0}")]
    Utf16(#[from] std::string::FromUtf16Error),
}

/// Result type for NDR operations
pub type Result<T> = std::result::Result<T, NdrError>;
