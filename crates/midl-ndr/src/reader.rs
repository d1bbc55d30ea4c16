//! Read side of the wire cursor

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::trace;

use crate::error::{MAX_NDR_ALLOCATION_SIZE, MAX_NDR_ARRAY_ELEMENTS};
use crate::{NdrContext, NdrDecode, NdrError, Referent, Result};

type PendingRead = Box<dyn FnOnce(&mut NdrReader<'_>) -> Result<()>>;

/// How a pointer read from the wire is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    /// `[unique]`: every non-null id is a new referent.
    Unique,
    /// `[ptr]`: an id seen before resolves to the same shared referent.
    Full,
}

/// NDR input cursor over a borrowed buffer.
///
/// Position never passes the end of the buffer; every read validates the
/// length before advancing.
pub struct NdrReader<'a> {
    ctx: NdrContext,
    data: &'a [u8],
    pos: usize,
    referents: HashMap<u32, Box<dyn Any>>,
    pending: VecDeque<PendingRead>,
    size_info: Vec<Vec<u64>>,
}

macro_rules! read_scalar {
    ($($name:ident: $ty:ty, $size:expr, $get:ident;)*) => {
        $(
            pub fn $name(&mut self) -> Result<$ty> {
                self.read_align($size);
                let mut bytes = self.read_bytes($size)?;
                Ok(self.ctx.$get(&mut bytes))
            }
        )*
    };
}

impl<'a> NdrReader<'a> {
    pub fn new(ctx: NdrContext, data: &'a [u8]) -> Self {
        Self {
            ctx,
            data,
            pos: 0,
            referents: HashMap::new(),
            pending: VecDeque::new(),
            size_info: Vec::new(),
        }
    }

    pub fn ctx(&self) -> NdrContext {
        self.ctx
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Unread part of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        let data = self.data;
        &data[self.pos..]
    }

    /// Skip padding up to the next multiple of `alignment`.
    ///
    /// Padding content is not inspected. Padding that runs past the end of
    /// the input stops at the end; the next read reports the truncation.
    pub fn read_align(&mut self, alignment: usize) {
        let padding = NdrContext::align_padding(self.pos, alignment);
        self.pos += padding.min(self.remaining());
    }

    pub fn read_struct_align(&mut self, alignment: usize) {
        self.read_align(alignment);
    }

    /// Skip the padding after a structure's last member.
    pub fn read_trailing_gap(&mut self, alignment: usize) {
        self.read_align(alignment);
    }

    /// Take `len` raw bytes, no alignment.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(NdrError::TruncatedInput {
                needed: len,
                remaining,
            });
        }
        let data = self.data;
        let bytes = &data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Any non-zero byte is true.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    read_scalar! {
        read_u16: u16, 2, get_u16;
        read_i16: i16, 2, get_i16;
        read_u32: u32, 4, get_u32;
        read_i32: i32, 4, get_i32;
        read_u64: u64, 8, get_u64;
        read_i64: i64, 8, get_i64;
        read_f32: f32, 4, get_f32;
        read_f64: f64, 8, get_f64;
    }

    /// Read an integer of `width` bytes (1, 2, 4 or 8), zero-extended.
    pub fn read_enum(&mut self, width: usize) -> Result<i64> {
        match width {
            1 => Ok(i64::from(self.read_u8()?)),
            2 => Ok(i64::from(self.read_u16()?)),
            4 => Ok(i64::from(self.read_u32()?)),
            8 => Ok(self.read_u64()? as i64),
            _ => Err(NdrError::InvalidEnumValue { width, value: 0 }),
        }
    }

    /// Decode any NDR value at the current position.
    pub fn read_data<T: NdrDecode>(&mut self) -> Result<T> {
        T::ndr_decode(self)
    }

    /// Read a conformance or variance count.
    pub fn read_size(&mut self) -> Result<u64> {
        Ok(u64::from(self.read_u32()?))
    }

    /// Read a pointer whose pointee decodes as `T`.
    ///
    /// Returns `None` for referent id 0. The returned referent is filled at
    /// the next [`read_deferred`](Self::read_deferred).
    pub fn read_pointer<T>(&mut self, kind: PointerKind) -> Result<Option<Arc<Referent<T>>>>
    where
        T: NdrDecode + 'static,
    {
        self.read_pointer_with(kind, T::ndr_decode)
    }

    /// Like [`read_pointer`](Self::read_pointer) with a custom pointee decoder,
    /// for pointees whose layout depends on sibling fields.
    pub fn read_pointer_with<T, F>(
        &mut self,
        kind: PointerKind,
        decode: F,
    ) -> Result<Option<Arc<Referent<T>>>>
    where
        T: 'static,
        F: FnOnce(&mut NdrReader<'_>) -> Result<T> + 'static,
    {
        let id = self.read_u32()?;
        if id == 0 {
            return Ok(None);
        }

        if kind == PointerKind::Full {
            if let Some(seen) = self.referents.get(&id) {
                trace!(referent_id = id, "resolved aliased referent");
                return seen
                    .downcast_ref::<Arc<Referent<T>>>()
                    .cloned()
                    .map(Some)
                    .ok_or(NdrError::InvalidPointer(id));
            }
        }

        let referent = Arc::new(Referent::pending());
        if kind == PointerKind::Full {
            self.referents.insert(id, Box::new(Arc::clone(&referent)));
        }
        let slot = Arc::clone(&referent);
        self.pending.push_back(Box::new(move |r: &mut NdrReader<'_>| {
            let value = decode(r)?;
            slot.resolve(value);
            Ok(())
        }));
        Ok(Some(referent))
    }

    /// Flush point: decode every queued pointee, in wire order.
    pub fn read_deferred(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let saved = std::mem::take(&mut self.size_info);
        let result = self.drain_pending();
        self.size_info = saved;
        result
    }

    fn drain_pending(&mut self) -> Result<()> {
        let mut levels = vec![std::mem::take(&mut self.pending)];
        while let Some(level) = levels.last_mut() {
            let Some(read) = level.pop_front() else {
                levels.pop();
                continue;
            };
            read(self)?;
            self.size_info.clear();
            if !self.pending.is_empty() {
                levels.push(std::mem::take(&mut self.pending));
            }
        }
        Ok(())
    }

    /// Run `read` with conformance in effect, reading `dims` sizes here
    /// unless an enclosing structure already did.
    pub fn with_conformance<T, F>(&mut self, dims: usize, read: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if !self.size_info.is_empty() {
            return read(self);
        }
        let sizes = (0..dims)
            .map(|_| self.read_size())
            .collect::<Result<Vec<_>>>()?;
        let depth = self.size_info.len();
        self.size_info.push(sizes);
        let result = read(self);
        self.size_info.truncate(depth);
        result
    }

    /// Consume the innermost hoisted sizes, if any.
    pub fn take_size_info(&mut self) -> Option<Vec<u64>> {
        self.size_info.pop()
    }

    pub(crate) fn conformance_or_read(&mut self) -> Result<u64> {
        match self.take_size_info() {
            Some(sizes) => match sizes.first() {
                Some(&size) => Ok(size),
                None => self.read_size(),
            },
            None => self.read_size(),
        }
    }

    /// Validate a declared element count before anything is allocated for it.
    ///
    /// Each element needs at least `T::ndr_min_size()` bytes, so a count the
    /// remaining input cannot hold is rejected outright.
    pub fn check_declared<T: NdrDecode>(&self, count: u64) -> Result<usize> {
        let remaining = self.remaining();
        // a product past u64::MAX is still more than the input holds
        let needed = count.saturating_mul(T::ndr_min_size() as u64);
        if needed > remaining as u64 {
            return Err(NdrError::BufferOverflow {
                declared: count,
                remaining,
            });
        }
        if count > MAX_NDR_ARRAY_ELEMENTS {
            return Err(NdrError::AllocationLimitExceeded {
                requested: count,
                limit: MAX_NDR_ARRAY_ELEMENTS,
            });
        }
        let bytes = count
            .checked_mul(std::mem::size_of::<T>() as u64)
            .ok_or(NdrError::IntegerOverflow)?;
        if bytes > MAX_NDR_ALLOCATION_SIZE {
            return Err(NdrError::AllocationLimitExceeded {
                requested: bytes,
                limit: MAX_NDR_ALLOCATION_SIZE,
            });
        }
        usize::try_from(count).map_err(|_| NdrError::IntegerOverflow)
    }

    /// Read exactly `count` elements after validating the count.
    pub fn read_array_elements<T: NdrDecode>(&mut self, count: u64) -> Result<Vec<T>> {
        let count = self.check_declared::<T>(count)?;
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(T::ndr_decode(self)?);
        }
        Ok(elements)
    }
}
