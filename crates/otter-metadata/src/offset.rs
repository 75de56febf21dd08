//! Relative offset codec
//!
//! A reference is stored as a signed delta from the address of the cell that
//! holds it, so emitted metadata stays valid wherever the loader maps it.
//!
//! ```text
//!   cell @ 0x1000: [ +0x0234 ]  ──decode──▶  0x1234
//! ```
//!
//! All address/integer conversions in the crate go through this module.
//! Cells are position dependent: moving one after encoding changes the
//! address it decodes to, so they are neither `Clone` nor `Copy`.

use crate::error::{MetadataError, Result};

/// Address of a value, as an integer
#[inline]
pub fn address_of<T: ?Sized>(value: &T) -> usize {
    value as *const T as *const u8 as usize
}

/// Address carried by a raw pointer, as an integer
#[inline]
pub fn pointer_address<T>(ptr: *const T) -> usize {
    ptr as usize
}

/// `cell + offset` with two's-complement wraparound
#[inline]
pub const fn decode_relative(cell: usize, offset: isize) -> usize {
    cell.wrapping_add_signed(offset)
}

/// `target - cell`, truncated to 32 bits and verified to round-trip
pub fn checked_offset32(target: usize, cell: usize) -> Result<i32> {
    let offset = target.wrapping_sub(cell) as isize as i32;
    if decode_relative(cell, offset as isize) != target {
        return Err(MetadataError::OffsetOverflow {
            target,
            cell,
            width_bits: 32,
        });
    }
    Ok(offset)
}

/// `target - cell` at pointer width; always representable
#[inline]
pub fn offset_ptr(target: usize, cell: usize) -> isize {
    target.wrapping_sub(cell) as isize
}

/// Read the pointer-sized word stored at `cell`.
///
/// # Safety
///
/// `cell` must be the address of a readable, aligned `usize`.
#[inline]
pub(crate) unsafe fn read_indirect_cell(cell: usize) -> usize {
    // SAFETY: guaranteed by the caller
    unsafe { (cell as *const usize).read() }
}

/// Terminates the process after a failed encoding.
///
/// A failed round-trip means the code generator tried to embed a reference
/// the offset cannot reach; the emitted metadata would be corrupt.
#[cold]
#[inline(never)]
pub(crate) fn abort_on_overflow(target: usize, cell: usize, width_bits: u32) -> ! {
    #[cfg(feature = "meta_logging")]
    tracing::error!(
        referent = target,
        cell,
        width_bits,
        "relative offset does not round-trip, aborting"
    );
    #[cfg(not(feature = "meta_logging"))]
    let _ = (target, cell, width_bits);
    std::process::abort()
}

/// 32-bit relative offset cell
#[repr(transparent)]
#[derive(Debug, Default)]
pub struct RelOffset32 {
    offset: i32,
}

impl RelOffset32 {
    /// Zero offset (decodes to the cell itself)
    pub const fn new() -> Self {
        Self { offset: 0 }
    }

    /// Cell holding an already-computed offset
    pub const fn from_raw(offset: i32) -> Self {
        Self { offset }
    }

    /// Stored offset
    #[inline]
    pub const fn raw(&self) -> i32 {
        self.offset
    }

    /// Decode to the referenced address
    #[inline]
    pub fn get(&self) -> usize {
        decode_relative(address_of(self), self.offset as isize)
    }

    /// Encode `target`, aborting the process if it is out of reach
    pub fn set(&mut self, target: usize) {
        let cell = address_of(self);
        self.offset = target.wrapping_sub(cell) as isize as i32;
        if self.get() != target {
            abort_on_overflow(target, cell, 32);
        }
    }

    /// Encode `target`, leaving the cell untouched if it is out of reach
    pub fn try_set(&mut self, target: usize) -> Result<()> {
        self.offset = checked_offset32(target, address_of(self))?;
        Ok(())
    }
}

/// Pointer-width relative offset cell
#[repr(transparent)]
#[derive(Debug, Default)]
pub struct RelOffset {
    offset: isize,
}

impl RelOffset {
    /// Zero offset (decodes to the cell itself)
    pub const fn new() -> Self {
        Self { offset: 0 }
    }

    /// Cell holding an already-computed offset
    pub const fn from_raw(offset: isize) -> Self {
        Self { offset }
    }

    /// Stored offset
    #[inline]
    pub const fn raw(&self) -> isize {
        self.offset
    }

    /// Decode to the referenced address
    #[inline]
    pub fn get(&self) -> usize {
        decode_relative(address_of(self), self.offset)
    }

    /// Encode `target`, aborting the process if it does not round-trip
    pub fn set(&mut self, target: usize) {
        let cell = address_of(self);
        self.offset = offset_ptr(target, cell);
        if self.get() != target {
            abort_on_overflow(target, cell, isize::BITS);
        }
    }
}
