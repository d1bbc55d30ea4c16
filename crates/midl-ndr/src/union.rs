//! Discriminated unions
//!
//! A union is a closed sum type plus one catch-all variant. On the wire:
//!
//! ```text
//! align(union alignment)
//! discriminant (switch type width)
//! align(union alignment)
//! arm
//! ```
//!
//! Decoding dispatches through the type's arm table. A discriminant with no
//! entry does not fail: the arm's bytes are captured into the unknown variant
//! so a peer built against an older interface can still accept the message.
//! How many bytes that is comes from [`NdrUnion::UNKNOWN_ARM_SIZE`]; a union
//! embedded in a struct must set it, or the capture runs into the fields and
//! deferred data that follow.

use bytes::Bytes;
use tracing::debug;

use crate::primitives::same_tag;
use crate::{NdrError, NdrReader, NdrWriter, Result};

/// One entry of a union's arm table.
pub struct UnionArm<U> {
    pub tag: i64,
    pub decode: fn(&mut NdrReader<'_>) -> Result<U>,
}

/// Encoding rules for a discriminated union.
pub trait NdrUnion: Sized + 'static {
    /// Width of the discriminant in bytes (1, 2, 4 or 8).
    const SWITCH_WIDTH: usize;

    /// Alignment applied before the discriminant and again before the arm.
    const ALIGN: usize;

    /// Known arms. Tags must be distinct.
    const ARMS: &'static [UnionArm<Self>];

    /// Wire size of an arm this build does not know, usually the largest
    /// fixed arm. `None` captures the rest of the input, which only works
    /// for a union that ends the message.
    const UNKNOWN_ARM_SIZE: Option<usize> = None;

    /// Discriminant of the current variant.
    fn discriminant(&self) -> i64;

    /// Write the arm's content, without discriminant or alignment.
    fn encode_arm<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()>;

    /// Build the catch-all variant from an unrecognized discriminant.
    fn unknown(tag: i64, raw: Bytes) -> Self;

    /// Whether this value is the catch-all variant.
    fn is_unknown(&self) -> bool;
}

fn check_layout(switch_width: usize, align: usize) -> Result<()> {
    if !matches!(switch_width, 1 | 2 | 4 | 8) {
        return Err(NdrError::MalformedUnion(format!(
            "switch width {} is not 1, 2, 4 or 8",
            switch_width
        )));
    }
    if !align.is_power_of_two() || align > 8 || align < switch_width {
        return Err(NdrError::MalformedUnion(format!(
            "alignment {} is invalid for a {}-byte switch",
            align, switch_width
        )));
    }
    Ok(())
}

impl<'a> NdrWriter<'a> {
    /// Align for a union. Alignment must be 1, 2, 4 or 8.
    pub fn write_union_align(&mut self, align: usize) -> Result<()> {
        if !align.is_power_of_two() || align > 8 {
            return Err(NdrError::MalformedUnion(format!("alignment {}", align)));
        }
        self.write_align(align);
        Ok(())
    }

    /// Write a union discriminant.
    pub fn write_switch(&mut self, width: usize, value: i64) -> Result<()> {
        check_layout(width, width)?;
        self.write_enum(width, value)
    }

    /// Write a union with an explicit discriminant and arm writer.
    pub fn write_union_with<F>(&mut self, switch_width: usize, align: usize, tag: i64, arm: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        check_layout(switch_width, align)?;
        self.write_union_align(align)?;
        self.write_switch(switch_width, tag)?;
        self.write_union_align(align)?;
        arm(self)
    }

    /// Write a union value.
    ///
    /// Fails with `MalformedUnion` if a known variant carries a tag absent
    /// from the arm table or the catch-all variant carries a registered tag.
    pub fn write_union<U: NdrUnion>(&mut self, value: &'a U) -> Result<()> {
        let tag = value.discriminant();
        let registered = U::ARMS
            .iter()
            .any(|arm| same_tag(U::SWITCH_WIDTH, arm.tag, tag));
        if registered == value.is_unknown() {
            return Err(NdrError::MalformedUnion(if registered {
                format!("unknown arm carries registered discriminant {}", tag)
            } else {
                format!("discriminant {} has no registered arm", tag)
            }));
        }
        let arm_size = if value.is_unknown() {
            U::UNKNOWN_ARM_SIZE
        } else {
            None
        };
        self.write_union_with(U::SWITCH_WIDTH, U::ALIGN, tag, |w| {
            let start = w.position();
            value.encode_arm(w)?;
            if let Some(size) = arm_size {
                let written = w.position() - start;
                if written > size {
                    return Err(NdrError::MalformedUnion(format!(
                        "unknown arm of {} bytes exceeds its {}-byte slot",
                        written, size
                    )));
                }
                w.write_bytes(&vec![0; size - written]);
            }
            Ok(())
        })
    }
}

impl<'a> NdrReader<'a> {
    pub fn read_union_align(&mut self, align: usize) -> Result<()> {
        if !align.is_power_of_two() || align > 8 {
            return Err(NdrError::MalformedUnion(format!("alignment {}", align)));
        }
        self.read_align(align);
        Ok(())
    }

    /// Read a union discriminant of `width` bytes.
    pub fn read_switch(&mut self, width: usize) -> Result<i64> {
        check_layout(width, width)?;
        self.read_enum(width)
    }

    /// Read a union value, falling back to its catch-all variant for an
    /// unrecognized discriminant. The catch-all takes `U::UNKNOWN_ARM_SIZE`
    /// bytes, or everything left when that is `None`.
    pub fn read_union<U: NdrUnion>(&mut self) -> Result<U> {
        check_layout(U::SWITCH_WIDTH, U::ALIGN)?;
        self.read_union_align(U::ALIGN)?;
        let tag = self.read_switch(U::SWITCH_WIDTH)?;
        self.read_union_align(U::ALIGN)?;

        match U::ARMS
            .iter()
            .find(|arm| same_tag(U::SWITCH_WIDTH, arm.tag, tag))
        {
            Some(arm) => (arm.decode)(self),
            None => {
                let len = U::UNKNOWN_ARM_SIZE.unwrap_or(self.remaining());
                let raw = Bytes::copy_from_slice(self.read_bytes(len)?);
                debug!(tag, captured = raw.len(), "unrecognized union discriminant");
                Ok(U::unknown(tag, raw))
            }
        }
    }
}
