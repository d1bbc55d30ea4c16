//! NDR pointer types
//!
//! NDR supports three pointer semantics:
//!
//! - Reference (`[ref]`): Non-null, content inline, no referent id on the wire
//! - Unique (`[unique]`): Nullable, 4-byte referent id, content deferred
//! - Full (`[ptr]`): Nullable, 4-byte referent id, content deferred, aliasing
//!   preserved in both directions
//!
//! Pointees are held in a shared [`Referent`] slot. On the write side the
//! slot's address is the referent identity. On the read side the slot is
//! created when the pointer is read and filled when the deferred content is
//! reached, so every full pointer carrying the same id ends up holding the
//! same slot.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, OnceLock};

use crate::{
    NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, PointerKind, ReferentKey, Result,
};

/// Trait for NDR pointer types
pub trait NdrPtr {
    type Target;

    /// Check if the pointer is null
    fn is_null(&self) -> bool;

    /// Get the pointee, if present and decoded
    fn get(&self) -> Option<&Self::Target>;
}

/// Storage for one pointee.
pub struct Referent<T> {
    value: OnceLock<T>,
}

impl<T> Referent<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: OnceLock::from(value),
        }
    }

    /// Slot whose content has not been read yet.
    pub(crate) fn pending() -> Self {
        Self {
            value: OnceLock::new(),
        }
    }

    pub(crate) fn resolve(&self, value: T) {
        // Each pending slot is queued exactly once.
        let _ = self.value.set(value);
    }

    /// The pointee, or `None` before the deferred content has been read.
    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T: fmt::Debug> fmt::Debug for Referent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("Referent").field(value).finish(),
            None => f.write_str("Referent(<pending>)"),
        }
    }
}

fn resolved<T>(referent: &Option<Arc<Referent<T>>>) -> Result<Option<&T>> {
    match referent {
        None => Ok(None),
        Some(r) => r.get().map(Some).ok_or(NdrError::InvalidPointer(0)),
    }
}

/// Reference pointer - non-null, data follows inline
///
/// The `[ref]` attribute in MIDL. The pointer itself is not transmitted;
/// the pointee data is always present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefPtr<T>(pub T);

impl<T> RefPtr<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for RefPtr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for RefPtr<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> NdrPtr for RefPtr<T> {
    type Target = T;

    fn is_null(&self) -> bool {
        false
    }

    fn get(&self) -> Option<&T> {
        Some(&self.0)
    }
}

impl<T: NdrEncode> NdrEncode for RefPtr<T> {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        self.0.ndr_encode(w)
    }

    fn ndr_align() -> usize {
        T::ndr_align()
    }
}

impl<T: NdrDecode> NdrDecode for RefPtr<T> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        T::ndr_decode(r).map(Self)
    }

    fn ndr_align() -> usize {
        <T as NdrDecode>::ndr_align()
    }

    fn ndr_min_size() -> usize {
        T::ndr_min_size()
    }
}

/// Unique pointer - nullable, no aliasing
///
/// Every non-null occurrence gets its own referent id, even when two
/// pointers share a slot.
pub struct UniquePtr<T>(Option<Arc<Referent<T>>>);

impl<T> UniquePtr<T> {
    pub fn new(value: T) -> Self {
        Self(Some(Arc::new(Referent::new(value))))
    }

    pub fn null() -> Self {
        Self(None)
    }

    pub fn from_option(value: Option<T>) -> Self {
        value.map_or_else(Self::null, Self::new)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref().and_then(|r| r.get())
    }
}

impl<T: Clone> UniquePtr<T> {
    pub fn cloned(&self) -> Option<T> {
        self.get().cloned()
    }
}

impl<T> NdrPtr for UniquePtr<T> {
    type Target = T;

    fn is_null(&self) -> bool {
        UniquePtr::is_null(self)
    }

    fn get(&self) -> Option<&T> {
        UniquePtr::get(self)
    }
}

impl<T> Clone for UniquePtr<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for UniquePtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> From<Option<T>> for UniquePtr<T> {
    fn from(value: Option<T>) -> Self {
        Self::from_option(value)
    }
}

impl<T: PartialEq> PartialEq for UniquePtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.is_null() == other.is_null() && self.get() == other.get()
    }
}

impl<T: fmt::Debug> fmt::Debug for UniquePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("UniquePtr(null)"),
            Some(r) => f.debug_tuple("UniquePtr").field(r).finish(),
        }
    }
}

impl<T: NdrEncode> NdrEncode for UniquePtr<T> {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        match resolved(&self.0)? {
            None => w.write_null_pointer(),
            Some(value) => {
                w.write_pointer(None, value)?;
            }
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl<T: NdrDecode + 'static> NdrDecode for UniquePtr<T> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.read_pointer(PointerKind::Unique).map(Self)
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        4
    }
}

/// Full pointer - nullable, aliasing preserved
///
/// Clones share one referent. Writing two clones in one call emits the
/// content once; reading them back yields pointers for which
/// [`FullPtr::ptr_eq`] holds.
pub struct FullPtr<T>(Option<Arc<Referent<T>>>);

impl<T> FullPtr<T> {
    pub fn new(value: T) -> Self {
        Self(Some(Arc::new(Referent::new(value))))
    }

    pub fn null() -> Self {
        Self(None)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref().and_then(|r| r.get())
    }

    /// Whether both pointers refer to the same referent instance.
    /// Two null pointers compare equal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<T> NdrPtr for FullPtr<T> {
    type Target = T;

    fn is_null(&self) -> bool {
        FullPtr::is_null(self)
    }

    fn get(&self) -> Option<&T> {
        FullPtr::get(self)
    }
}

impl<T> Clone for FullPtr<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for FullPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: PartialEq> PartialEq for FullPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.is_null() == other.is_null() && self.get() == other.get()
    }
}

impl<T: fmt::Debug> fmt::Debug for FullPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("FullPtr(null)"),
            Some(r) => f.debug_tuple("FullPtr").field(r).finish(),
        }
    }
}

impl<T: NdrEncode> NdrEncode for FullPtr<T> {
    fn ndr_encode<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        match (&self.0, resolved(&self.0)?) {
            (Some(slot), Some(value)) => {
                w.write_pointer(Some(ReferentKey::of(&**slot)), value)?;
            }
            _ => w.write_null_pointer(),
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl<T: NdrDecode + 'static> NdrDecode for FullPtr<T> {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        r.read_pointer(PointerKind::Full).map(Self)
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        4
    }
}
