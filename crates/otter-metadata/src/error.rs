//! Metadata errors

use thiserror::Error;

use crate::data_ref::DataRefFormat;
use crate::init_state::ClassInitState;

/// Errors produced by the checked metadata operations.
///
/// The unchecked entry points (`encode`, `set_data_ref`, `set_init_state`)
/// never return these: they abort or panic instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// Target is not reachable from the cell within the offset width
    #[error("target {target:#x} not representable as {width_bits}-bit offset from cell {cell:#x}")]
    OffsetOverflow {
        /// Address being referenced
        target: usize,
        /// Address of the storage cell
        cell: usize,
        /// Width of the offset field
        width_bits: u32,
    },

    /// Format can be decoded but never produced here
    #[error("data ref format {0:?} is read-only")]
    ReadOnlyFormat(DataRefFormat),

    /// Low tag bits of the target are not zero
    #[error("target {target:#x} is not 4-byte aligned")]
    MisalignedTarget {
        /// Address being referenced
        target: usize,
    },

    /// Direct 32-bit reference above 4GiB
    #[error("target {target:#x} does not fit a 32-bit direct reference")]
    DirectOutOfRange {
        /// Address being referenced
        target: usize,
    },

    /// Address falls in the never-mapped class-init page
    #[error("address {0:#x} lies inside the reserved class-init page")]
    ReservedAddress(usize),

    /// Class-init state would move backwards or skip a step
    #[error("invalid class init transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// State observed in the field
        from: ClassInitState,
        /// Requested state
        to: ClassInitState,
    },
}

/// Result type for metadata operations
pub type Result<T> = std::result::Result<T, MetadataError>;
