//! Reference width configuration and the numeric aliases the IR consumes.

use serde::{Deserialize, Serialize};

/// Width of reference fields inside metadata.
///
/// Selected once per binary by the `ref32` feature; every structure in this
/// crate is laid out for the same width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefWidth {
    /// Pointer-sized references
    Wide,
    /// 32-bit references
    Narrow,
}

impl RefWidth {
    /// Width this crate was built for
    #[cfg(not(feature = "ref32"))]
    pub const ACTIVE: RefWidth = RefWidth::Wide;

    /// Width this crate was built for
    #[cfg(feature = "ref32")]
    pub const ACTIVE: RefWidth = RefWidth::Narrow;

    /// Size of a `MetaRef` in bytes
    #[inline]
    pub const fn meta_ref_size(self) -> usize {
        match self {
            RefWidth::Wide => std::mem::size_of::<usize>(),
            RefWidth::Narrow => 4,
        }
    }
}

/// Signed address delta
#[cfg(not(feature = "ref32"))]
pub type AddrOffset = isize;

/// Signed address delta
#[cfg(feature = "ref32")]
pub type AddrOffset = i32;

/// Reference field inside metadata; may hold a negative relative offset
#[cfg(not(feature = "ref32"))]
pub type MetaRef = usize;

/// Reference field inside metadata; may hold a negative relative offset
#[cfg(feature = "ref32")]
pub type MetaRef = u32;

const _: () = assert!(std::mem::size_of::<MetaRef>() == RefWidth::ACTIVE.meta_ref_size());
const _: () = assert!(std::mem::size_of::<AddrOffset>() == std::mem::size_of::<MetaRef>());
