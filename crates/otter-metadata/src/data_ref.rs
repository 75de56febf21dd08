//! Tagged data references
//!
//! A reference field whose two low bits select how the rest is read:
//!
//! | tag | format   | payload                                   |
//! |-----|----------|-------------------------------------------|
//! | 0   | direct   | absolute address                          |
//! | 1   | compact  | offset from the field (legacy, read-only) |
//! | 2   | offset   | offset from the field                     |
//! | 3   | indirect | offset to a pointer-sized cell (read-only)|
//!
//! Only direct and offset are ever produced here. Compact and indirect come
//! from upstream tooling and are decode-only.

use serde::{Deserialize, Serialize};

use crate::error::{MetadataError, Result};
use crate::offset::{
    abort_on_overflow, address_of, checked_offset32, decode_relative, offset_ptr,
    read_indirect_cell,
};

/// Mask selecting the format tag
pub const DATA_REF_BIT_MASK: usize = 3;

/// Addressing format held in the low bits of a data reference
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataRefFormat {
    /// Absolute address
    Direct = 0,
    /// Legacy compact-metadata offset
    Compact = 1,
    /// Offset from the field
    Offset = 2,
    /// Offset to an indirection cell
    Indirect = 3,
}

impl DataRefFormat {
    /// Format selected by the low bits of `raw`
    #[inline]
    pub const fn from_bits(raw: usize) -> Self {
        match raw & DATA_REF_BIT_MASK {
            0 => DataRefFormat::Direct,
            1 => DataRefFormat::Compact,
            2 => DataRefFormat::Offset,
            _ => DataRefFormat::Indirect,
        }
    }

    /// Decode-only formats
    #[inline]
    pub const fn is_read_only(self) -> bool {
        matches!(self, DataRefFormat::Compact | DataRefFormat::Indirect)
    }
}

/// A decoded reference, before any indirection is followed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRefTarget {
    /// Absolute address
    Direct(usize),
    /// Address of compact-format metadata
    Compact(usize),
    /// Address resolved from an offset
    Offset(usize),
    /// Address of the cell holding the real address
    Indirect {
        /// Indirection cell
        cell: usize,
    },
}

fn check_encodable(target: usize, format: DataRefFormat) -> Result<()> {
    if format.is_read_only() {
        return Err(MetadataError::ReadOnlyFormat(format));
    }
    if target & DATA_REF_BIT_MASK != 0 {
        return Err(MetadataError::MisalignedTarget { target });
    }
    Ok(())
}

fn assert_encodable(format: DataRefFormat) {
    assert!(
        !format.is_read_only(),
        "data ref format {format:?} is decode-only"
    );
}

fn classify(format: DataRefFormat, payload: usize, field: usize, offset: isize) -> DataRefTarget {
    match format {
        DataRefFormat::Direct => DataRefTarget::Direct(payload),
        DataRefFormat::Compact => DataRefTarget::Compact(decode_relative(field, offset)),
        DataRefFormat::Offset => DataRefTarget::Offset(decode_relative(field, offset)),
        DataRefFormat::Indirect => DataRefTarget::Indirect {
            cell: decode_relative(field, offset),
        },
    }
}

/// Pointer-sized tagged reference
#[repr(transparent)]
#[derive(Debug, Default)]
pub struct DataRef {
    ref_val: usize,
}

impl DataRef {
    /// Direct null reference
    pub const fn null() -> Self {
        Self { ref_val: 0 }
    }

    /// Wrap a raw field value as emitted by the toolchain.
    ///
    /// # Safety
    ///
    /// If the value carries the indirect tag, the cell it points at (relative
    /// to the final address of this field) must stay a readable `usize` for
    /// as long as the reference is decoded.
    pub const unsafe fn from_raw(ref_val: usize) -> Self {
        Self { ref_val }
    }

    /// Raw field value including the tag
    #[inline]
    pub const fn raw(&self) -> usize {
        self.ref_val
    }

    /// Format tag
    #[inline]
    pub const fn format(&self) -> DataRefFormat {
        DataRefFormat::from_bits(self.ref_val)
    }

    /// Decode without following indirection
    pub fn target(&self) -> DataRefTarget {
        let payload = self.ref_val & !DATA_REF_BIT_MASK;
        classify(self.format(), payload, address_of(self), payload as isize)
    }

    /// Referenced address
    pub fn get_data_ref(&self) -> usize {
        match self.target() {
            DataRefTarget::Direct(addr)
            | DataRefTarget::Compact(addr)
            | DataRefTarget::Offset(addr) => addr,
            // SAFETY: indirect values only enter through `from_raw`
            DataRefTarget::Indirect { cell } => unsafe { read_indirect_cell(cell) },
        }
    }

    /// Store `target` in `format`.
    ///
    /// Panics on a decode-only format or a target with tag bits set.
    pub fn set_data_ref(&mut self, target: usize, format: DataRefFormat) {
        assert_encodable(format);
        assert!(
            target & DATA_REF_BIT_MASK == 0,
            "data ref target {target:#x} is not 4-byte aligned"
        );
        match format {
            DataRefFormat::Offset => {
                let field = address_of(self);
                self.ref_val = offset_ptr(target, field) as usize | DataRefFormat::Offset as usize;
                if self.get_data_ref() != target {
                    abort_on_overflow(target, field, usize::BITS);
                }
            }
            _ => self.ref_val = target,
        }
    }

    /// Checked form of [`DataRef::set_data_ref`]
    pub fn try_set_data_ref(&mut self, target: usize, format: DataRefFormat) -> Result<()> {
        check_encodable(target, format)?;
        self.ref_val = match format {
            DataRefFormat::Offset => {
                offset_ptr(target, address_of(self)) as usize | DataRefFormat::Offset as usize
            }
            _ => target,
        };
        Ok(())
    }
}

/// 32-bit tagged reference.
///
/// Offsets are signed; the indirect cell is still pointer-sized.
#[repr(transparent)]
#[derive(Debug, Default)]
pub struct DataRef32 {
    ref_val: u32,
}

impl DataRef32 {
    /// Direct null reference
    pub const fn null() -> Self {
        Self { ref_val: 0 }
    }

    /// Wrap a raw field value as emitted by the toolchain.
    ///
    /// # Safety
    ///
    /// Same contract as [`DataRef::from_raw`].
    pub const unsafe fn from_raw(ref_val: u32) -> Self {
        Self { ref_val }
    }

    /// Raw field value including the tag
    #[inline]
    pub const fn raw(&self) -> u32 {
        self.ref_val
    }

    /// Format tag
    #[inline]
    pub const fn format(&self) -> DataRefFormat {
        DataRefFormat::from_bits(self.ref_val as usize)
    }

    /// Decode without following indirection
    pub fn target(&self) -> DataRefTarget {
        let payload = self.ref_val & !(DATA_REF_BIT_MASK as u32);
        classify(
            self.format(),
            payload as usize,
            address_of(self),
            payload as i32 as isize,
        )
    }

    /// Referenced address
    pub fn get_data_ref(&self) -> usize {
        match self.target() {
            DataRefTarget::Direct(addr)
            | DataRefTarget::Compact(addr)
            | DataRefTarget::Offset(addr) => addr,
            // SAFETY: indirect values only enter through `from_raw`
            DataRefTarget::Indirect { cell } => unsafe { read_indirect_cell(cell) },
        }
    }

    /// Store `target` in `format`.
    ///
    /// Panics on a decode-only format, a misaligned target or a direct
    /// target above 4GiB. Aborts if an offset does not fit 32 bits.
    pub fn set_data_ref(&mut self, target: usize, format: DataRefFormat) {
        assert_encodable(format);
        match self.try_set_data_ref(target, format) {
            Ok(()) => {}
            Err(MetadataError::OffsetOverflow {
                target,
                cell,
                width_bits,
            }) => abort_on_overflow(target, cell, width_bits),
            Err(err) => panic!("{err}"),
        }
    }

    /// Checked form of [`DataRef32::set_data_ref`]
    pub fn try_set_data_ref(&mut self, target: usize, format: DataRefFormat) -> Result<()> {
        check_encodable(target, format)?;
        self.ref_val = match format {
            DataRefFormat::Offset => {
                let offset = checked_offset32(target, address_of(self))?;
                offset as u32 | DataRefFormat::Offset as u32
            }
            _ => u32::try_from(target).map_err(|_| MetadataError::DirectOutOfRange { target })?,
        };
        Ok(())
    }
}
