//! Write side of the wire cursor
//!
//! [`NdrWriter`] owns everything one top-level marshal call needs: the output
//! buffer, the referent table used to detect aliased full pointers, the queue
//! of deferred pointee writes and the size info stack for hoisted conformance.
//! None of it is shared, so independent calls never need a lock.

use std::collections::{HashMap, VecDeque};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::primitives::enum_bits;
use crate::{NdrContext, NdrEncode, NdrError, Result};

/// First referent id handed out in a message.
pub const FIRST_REFERENT_ID: u32 = 0x0002_0000;

/// Distance between consecutive referent ids.
pub const REFERENT_ID_STEP: u32 = 4;

/// Identity of a pointer target, taken from its storage address.
///
/// Two pointers with the same key within one marshal call refer to the same
/// referent and are serialized once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferentKey(usize);

impl ReferentKey {
    pub fn of<T: ?Sized>(target: &T) -> Self {
        Self(target as *const T as *const () as usize)
    }
}

type WriteThunk<'a> = Box<dyn FnOnce(&mut NdrWriter<'a>) -> Result<()> + 'a>;

/// A pointee waiting for the next flush point.
enum PendingWrite<'a> {
    Value(&'a dyn NdrEncode),
    Thunk(WriteThunk<'a>),
}

/// Growable NDR output cursor.
pub struct NdrWriter<'a> {
    ctx: NdrContext,
    buf: BytesMut,
    /// Absolute stream offset of `buf[0]`; alignment is computed against it.
    base: usize,
    next_referent: u32,
    referents: HashMap<ReferentKey, u32>,
    pending: VecDeque<PendingWrite<'a>>,
    size_info: Vec<Vec<u64>>,
}

impl<'a> NdrWriter<'a> {
    pub fn new(ctx: NdrContext) -> Self {
        Self::with_capacity(ctx, 0)
    }

    pub fn with_capacity(ctx: NdrContext, capacity: usize) -> Self {
        Self {
            ctx,
            buf: BytesMut::with_capacity(capacity),
            base: 0,
            next_referent: FIRST_REFERENT_ID,
            referents: HashMap::new(),
            pending: VecDeque::new(),
            size_info: Vec::new(),
        }
    }

    /// Scratch writer whose output will be appended at `base`.
    fn detached<'b>(&self) -> NdrWriter<'b> {
        NdrWriter {
            ctx: self.ctx,
            buf: BytesMut::new(),
            base: self.position(),
            next_referent: self.next_referent,
            referents: HashMap::new(),
            pending: VecDeque::new(),
            size_info: Vec::new(),
        }
    }

    pub fn ctx(&self) -> NdrContext {
        self.ctx
    }

    /// Absolute offset of the next byte to be written.
    pub fn position(&self) -> usize {
        self.base + self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Whether pointees are queued and waiting for [`write_deferred`](Self::write_deferred).
    pub fn has_deferred(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    /// Pad with zero bytes up to the next multiple of `alignment`.
    pub fn write_align(&mut self, alignment: usize) {
        let padding = NdrContext::align_padding(self.position(), alignment);
        self.buf.put_bytes(0, padding);
    }

    /// Align ahead of a structure's first member.
    pub fn write_struct_align(&mut self, alignment: usize) {
        self.write_align(alignment);
    }

    /// Pad after a structure's last member so its size is a multiple of
    /// its alignment.
    pub fn write_trailing_gap(&mut self, alignment: usize) {
        self.write_align(alignment);
    }

    /// Raw bytes, no alignment.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_align(2);
        self.ctx.put_u16(&mut self.buf, value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_align(2);
        self.ctx.put_i16(&mut self.buf, value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_align(4);
        self.ctx.put_u32(&mut self.buf, value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_align(4);
        self.ctx.put_i32(&mut self.buf, value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_align(8);
        self.ctx.put_u64(&mut self.buf, value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_align(8);
        self.ctx.put_i64(&mut self.buf, value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_align(4);
        self.ctx.put_f32(&mut self.buf, value);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_align(8);
        self.ctx.put_f64(&mut self.buf, value);
    }

    /// Write an enumeration or other integer of `width` bytes (1, 2, 4 or 8).
    ///
    /// Negative values are accepted down to the signed minimum of the width
    /// and written in two's complement.
    pub fn write_enum(&mut self, width: usize, value: i64) -> Result<()> {
        let bits = enum_bits(width, value)?;
        match width {
            1 => self.write_u8(bits as u8),
            2 => self.write_u16(bits as u16),
            4 => self.write_u32(bits as u32),
            _ => self.write_u64(bits),
        }
        Ok(())
    }

    /// Encode any NDR value at the current position.
    pub fn write_data<T: NdrEncode + ?Sized>(&mut self, value: &'a T) -> Result<()> {
        value.ndr_encode(self)
    }

    /// Write a conformance or variance count (unsigned long on the wire).
    pub fn write_size(&mut self, size: u64) -> Result<()> {
        let size = u32::try_from(size).map_err(|_| NdrError::IntegerOverflow)?;
        self.write_u32(size);
        Ok(())
    }

    /// Null pointer: referent id 0, nothing deferred.
    pub fn write_null_pointer(&mut self) {
        self.write_u32(0);
    }

    /// Write a pointer to `referent` and queue its content for the next flush.
    ///
    /// With a key, a referent that was already written in this call produces
    /// only a back-reference to its id. Without a key every call allocates a
    /// fresh id (unique pointer semantics). Returns the id on the wire.
    pub fn write_pointer(
        &mut self,
        key: Option<ReferentKey>,
        referent: &'a dyn NdrEncode,
    ) -> Result<u32> {
        let (id, fresh) = self.assign_referent(key)?;
        if fresh {
            self.pending.push_back(PendingWrite::Value(referent));
        }
        Ok(id)
    }

    /// Like [`write_pointer`](Self::write_pointer) with the pointee produced by
    /// a closure, for pointees whose layout depends on sibling fields.
    pub fn write_pointer_with<F>(&mut self, key: Option<ReferentKey>, write: F) -> Result<u32>
    where
        F: FnOnce(&mut NdrWriter<'a>) -> Result<()> + 'a,
    {
        let (id, fresh) = self.assign_referent(key)?;
        if fresh {
            self.pending.push_back(PendingWrite::Thunk(Box::new(write)));
        }
        Ok(id)
    }

    fn assign_referent(&mut self, key: Option<ReferentKey>) -> Result<(u32, bool)> {
        if let Some(id) = key.and_then(|key| self.referents.get(&key).copied()) {
            trace!(referent_id = id, "back-reference to written referent");
            self.write_u32(id);
            return Ok((id, false));
        }

        let id = self.next_referent;
        self.next_referent = id
            .checked_add(REFERENT_ID_STEP)
            .ok_or(NdrError::IntegerOverflow)?;
        if let Some(key) = key {
            self.referents.insert(key, id);
        }
        self.write_u32(id);
        Ok((id, true))
    }

    /// Flush point: write every queued pointee.
    ///
    /// Pointees run in the order their pointers were written. Pointers found
    /// inside a pointee are written right after it, before its next sibling,
    /// which matches the NDR rule for embedded pointers. The loop keeps its own
    /// stack of queues so deep pointer chains do not grow the call stack.
    pub fn write_deferred(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        // Conformance hoisted by the enclosing value does not apply to pointees.
        let saved = std::mem::take(&mut self.size_info);
        let result = self.drain_pending();
        self.size_info = saved;
        result
    }

    fn drain_pending(&mut self) -> Result<()> {
        let mut levels = vec![std::mem::take(&mut self.pending)];
        trace!(count = levels[0].len(), "flushing deferred referents");
        while let Some(level) = levels.last_mut() {
            let Some(entry) = level.pop_front() else {
                levels.pop();
                continue;
            };
            match entry {
                PendingWrite::Value(value) => value.ndr_encode(self)?,
                PendingWrite::Thunk(write) => write(self)?,
            }
            self.size_info.clear();
            if !self.pending.is_empty() {
                levels.push(std::mem::take(&mut self.pending));
            }
        }
        Ok(())
    }

    /// Run `write` with conformance `sizes` in effect.
    ///
    /// If an enclosing structure already hoisted its sizes, they are inherited
    /// and nothing is written. Otherwise `sizes` are written here, ahead of the
    /// value. The stack depth on return equals the depth on entry.
    pub fn with_conformance<F>(&mut self, sizes: Vec<u64>, write: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if !self.size_info.is_empty() {
            return write(self);
        }
        for &size in &sizes {
            self.write_size(size)?;
        }
        let depth = self.size_info.len();
        self.size_info.push(sizes);
        let result = write(self);
        self.size_info.truncate(depth);
        result
    }

    /// Consume the innermost hoisted sizes, if any.
    pub fn take_size_info(&mut self) -> Option<Vec<u64>> {
        self.size_info.pop()
    }

    /// Max count for a conformant construct: inherited, or written here.
    pub(crate) fn conformance_or_write(&mut self, count: u64) -> Result<u64> {
        match self.take_size_info() {
            Some(sizes) => Ok(sizes.first().copied().unwrap_or(count)),
            None => {
                self.write_size(count)?;
                Ok(count)
            }
        }
    }

    /// Write exactly `count` elements.
    ///
    /// Extra elements beyond `count` are not written; missing ones are filled
    /// with `T::default()`, so a counter field larger than the collection
    /// never fails. The default must not hold a non-null pointer: a filler
    /// has no place in the enclosing deferred region, so one that would
    /// queue pointee data is rejected.
    pub fn write_array_elements<T>(&mut self, count: u64, elements: &'a [T]) -> Result<()>
    where
        T: NdrEncode + Default,
    {
        let count = usize::try_from(count).map_err(|_| NdrError::IntegerOverflow)?;
        let present = elements.len().min(count);
        for element in elements.iter().take(present) {
            element.ndr_encode(self)?;
        }
        if present < count {
            trace!(present, count, "padding array with default elements");
            let filler = T::default();
            for _ in present..count {
                let bytes = {
                    let mut scratch = self.detached();
                    filler.ndr_encode(&mut scratch)?;
                    if scratch.has_deferred() {
                        trace!(present, count, "default element carries pointer data");
                        return Err(NdrError::PointerInPadding);
                    }
                    scratch.buf
                };
                self.buf.extend_from_slice(&bytes);
            }
        }
        Ok(())
    }
}
