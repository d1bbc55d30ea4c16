//! NDR array types
//!
//! NDR supports several array types:
//!
//! - Fixed arrays: size known at compile time, elements only
//! - Conformant arrays: `max_count` prefix, hoisted ahead of the enclosing
//!   structure when embedded
//! - Varying arrays: `offset` and `actual_count` prefix
//! - Conformant varying arrays: both, `max_count` hoisted like above
//!
//! Declared counts are validated against the remaining input before any
//! element storage is reserved.

use std::marker::PhantomData;

use crate::{NdrConformant, NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};

impl<'a> NdrWriter<'a> {
    /// Conformant array of `count` elements.
    ///
    /// `count` usually comes from a separate counter field and may exceed
    /// `elements.len()`; missing elements are written as `T::default()`.
    pub fn write_conformant_array<T>(&mut self, count: u64, elements: &'a [T]) -> Result<()>
    where
        T: NdrEncode + Default,
    {
        let max_count = self.conformance_or_write(count)?;
        self.write_array_elements(max_count, elements)
    }

    /// Varying array: `offset`, `count`, then `count` elements.
    pub fn write_varying_array<T>(&mut self, offset: u64, count: u64, elements: &'a [T]) -> Result<()>
    where
        T: NdrEncode + Default,
    {
        self.write_size(offset)?;
        self.write_size(count)?;
        self.write_array_elements(count, elements)
    }

    /// Conformant varying array: `max_count` (unless hoisted), `offset`,
    /// `count`, then `count` elements.
    pub fn write_conformant_varying_array<T>(
        &mut self,
        max_count: u64,
        offset: u64,
        count: u64,
        elements: &'a [T],
    ) -> Result<()>
    where
        T: NdrEncode + Default,
    {
        let max_count = self.conformance_or_write(max_count)?;
        check_variance(max_count, offset, count)?;
        self.write_varying_array(offset, count, elements)
    }
}

impl<'a> NdrReader<'a> {
    /// Read a conformant array, taking `max_count` from the hoisted sizes
    /// when an enclosing structure provided them.
    pub fn read_conformant_array<T: NdrDecode>(&mut self) -> Result<Vec<T>> {
        let max_count = self.conformance_or_read()?;
        self.read_array_elements(max_count)
    }

    /// Read a varying array whose bound is `max_count`. Returns the offset
    /// and the transmitted elements.
    pub fn read_varying_array<T: NdrDecode>(&mut self, max_count: u64) -> Result<(u64, Vec<T>)> {
        let offset = self.read_size()?;
        let count = self.read_size()?;
        check_variance(max_count, offset, count)?;
        Ok((offset, self.read_array_elements(count)?))
    }

    /// Read a conformant varying array. Returns `max_count`, the offset and
    /// the transmitted elements.
    ///
    /// Only the transmitted elements are allocated; `max_count` is checked
    /// for consistency but never used as an allocation size.
    pub fn read_conformant_varying_array<T: NdrDecode>(&mut self) -> Result<(u64, u64, Vec<T>)> {
        let max_count = self.conformance_or_read()?;
        let (offset, elements) = self.read_varying_array(max_count)?;
        Ok((max_count, offset, elements))
    }
}

pub(crate) fn check_variance(max_count: u64, offset: u64, count: u64) -> Result<()> {
    let end = offset.checked_add(count).ok_or(NdrError::IntegerOverflow)?;
    if end > max_count {
        return Err(NdrError::ConformanceMismatch {
            max_count,
            offset,
            actual_count: count,
        });
    }
    Ok(())
}

fn len_u64(len: usize) -> Result<u64> {
    u64::try_from(len).map_err(|_| NdrError::IntegerOverflow)
}

/// Write exactly `count` of `elements`; the wrapper types own their data, so
/// a count larger than the data is a caller error rather than padding.
fn write_owned<'a, T: NdrEncode>(w: &mut NdrWriter<'a>, count: u64, elements: &'a [T]) -> Result<()> {
    let count = usize::try_from(count).map_err(|_| NdrError::IntegerOverflow)?;
    if count > elements.len() {
        return Err(NdrError::ConformanceMismatch {
            max_count: len_u64(count)?,
            offset: 0,
            actual_count: len_u64(elements.len())?,
        });
    }
    for element in elements.iter().take(count) {
        element.ndr_encode(w)?;
    }
    Ok(())
}

/// Fixed-size array
///
/// Wire format: just the elements (no size prefix)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedArray<T, const N: usize> {
    pub elements: [T; N],
}

impl<T: Default, const N: usize> Default for FixedArray<T, N> {
    fn default() -> Self {
        Self {
            elements: std::array::from_fn(|_| T::default()),
        }
    }
}

impl<T, const N: usize> FixedArray<T, N> {
    pub fn new(elements: [T; N]) -> Self {
        Self { elements }
    }
}

impl<T: NdrEncode, const N: usize> NdrEncode for FixedArray<T, N> {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        for element in &self.elements {
            element.ndr_encode(w)?;
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        T::ndr_align()
    }
}

impl<T: NdrDecode, const N: usize> NdrDecode for FixedArray<T, N> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let elements: Vec<T> = r.read_array_elements(len_u64(N)?)?;
        let elements = elements
            .try_into()
            .map_err(|_: Vec<T>| NdrError::IntegerOverflow)?;
        Ok(Self { elements })
    }

    fn ndr_align() -> usize {
        <T as NdrDecode>::ndr_align()
    }

    fn ndr_min_size() -> usize {
        N.saturating_mul(T::ndr_min_size())
    }
}

/// Conformant array - runtime-sized
///
/// Wire format:
/// ```text
/// max_count: u32    # hoisted ahead of the enclosing structure if embedded
/// elements[max_count]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConformantArray<T> {
    pub elements: Vec<T>,
}

impl<T> ConformantArray<T> {
    pub fn new(elements: Vec<T>) -> Self {
        Self { elements }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<T> From<Vec<T>> for ConformantArray<T> {
    fn from(elements: Vec<T>) -> Self {
        Self::new(elements)
    }
}

impl<T> NdrConformant for ConformantArray<T> {
    fn ndr_size_info(&self) -> Vec<u64> {
        vec![self.elements.len() as u64]
    }
}

impl<T: NdrEncode> NdrEncode for ConformantArray<T> {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        let max_count = w.conformance_or_write(len_u64(self.elements.len())?)?;
        write_owned(w, max_count, &self.elements)
    }

    fn ndr_align() -> usize {
        T::ndr_align().max(4)
    }
}

impl<T: NdrDecode> NdrDecode for ConformantArray<T> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        Ok(Self {
            elements: r.read_conformant_array()?,
        })
    }

    fn ndr_align() -> usize {
        <T as NdrDecode>::ndr_align().max(4)
    }

    fn ndr_min_size() -> usize {
        4
    }
}

/// Varying array - subset of a fixed bound of `N` transmitted
///
/// Wire format:
/// ```text
/// offset: u32       # First transmitted element
/// actual_count: u32 # Number of transmitted elements
/// elements[actual_count]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaryingArray<T, const N: usize> {
    pub offset: u64,
    pub elements: Vec<T>,
    _bound: PhantomData<[(); N]>,
}

impl<T, const N: usize> Default for VaryingArray<T, N> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T, const N: usize> VaryingArray<T, N> {
    pub fn new(elements: Vec<T>) -> Self {
        Self::with_offset(0, elements)
    }

    pub fn with_offset(offset: u64, elements: Vec<T>) -> Self {
        Self {
            offset,
            elements,
            _bound: PhantomData,
        }
    }
}

impl<T: NdrEncode, const N: usize> NdrEncode for VaryingArray<T, N> {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        let count = len_u64(self.elements.len())?;
        check_variance(len_u64(N)?, self.offset, count)?;
        w.write_size(self.offset)?;
        w.write_size(count)?;
        write_owned(w, count, &self.elements)
    }

    fn ndr_align() -> usize {
        T::ndr_align().max(4)
    }
}

impl<T: NdrDecode, const N: usize> NdrDecode for VaryingArray<T, N> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let (offset, elements) = r.read_varying_array(len_u64(N)?)?;
        Ok(Self::with_offset(offset, elements))
    }

    fn ndr_align() -> usize {
        <T as NdrDecode>::ndr_align().max(4)
    }

    fn ndr_min_size() -> usize {
        8
    }
}

/// Conformant varying array
///
/// Wire format:
/// ```text
/// max_count: u32    # hoisted ahead of the enclosing structure if embedded
/// offset: u32       # First transmitted element
/// actual_count: u32 # Number of transmitted elements
/// elements[actual_count]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConformantVaryingArray<T> {
    pub max_count: u64,
    pub offset: u64,
    pub elements: Vec<T>,
}

impl<T> ConformantVaryingArray<T> {
    pub fn new(elements: Vec<T>) -> Self {
        Self {
            max_count: elements.len() as u64,
            offset: 0,
            elements,
        }
    }

    pub fn with_max(max_count: u64, elements: Vec<T>) -> Self {
        Self {
            max_count,
            offset: 0,
            elements,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<T> NdrConformant for ConformantVaryingArray<T> {
    fn ndr_size_info(&self) -> Vec<u64> {
        vec![self.max_count]
    }
}

impl<T: NdrEncode> NdrEncode for ConformantVaryingArray<T> {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        let max_count = w.conformance_or_write(self.max_count)?;
        let count = len_u64(self.elements.len())?;
        check_variance(max_count, self.offset, count)?;
        w.write_size(self.offset)?;
        w.write_size(count)?;
        write_owned(w, count, &self.elements)
    }

    fn ndr_align() -> usize {
        T::ndr_align().max(4)
    }
}

impl<T: NdrDecode> NdrDecode for ConformantVaryingArray<T> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let (max_count, offset, elements) = r.read_conformant_varying_array()?;
        Ok(Self {
            max_count,
            offset,
            elements,
        })
    }

    fn ndr_align() -> usize {
        <T as NdrDecode>::ndr_align().max(4)
    }

    fn ndr_min_size() -> usize {
        8
    }
}
