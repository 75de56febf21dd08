//! Class metadata layout
//!
//! Generated code indexes these structures by constant offset, so their
//! layout is ABI. Each reference width has its own pair of structures:
//!
//! - [`wide`]: pointer-sized references
//! - [`narrow`]: 32-bit references
//!
//! The crate re-exports the pair selected by the `ref32` feature.

pub mod narrow;
pub mod wide;

use crate::error::Result;
use crate::init_state::{ClassInitState, InitSlot, InitStateCell};
use crate::offset::{abort_on_overflow, address_of, checked_offset32, decode_relative, pointer_address};

/// Modifier bits of `ClassMetadataRO::modifier`
pub const MODIFIER_MASK: u32 = 0x00FF_FFFF;
/// Override flag of `ClassMetadataRO::modifier`
pub const MODIFIER_OVERRIDE: u32 = 0x8000_0000;

/// Superclass/component union of the read-only metadata.
///
/// Non-array classes store their superclass, array classes the mutable
/// metadata of their component type. Whether the class is an array is
/// known to the caller, not stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRef {
    /// Superclass metadata address
    Superclass(usize),
    /// Component class metadata address
    Component(usize),
}

/// Init-state protocol shared by both `ClassMetadata` layouts
pub trait ClassInit {
    /// The init-state / positive-cache slot
    fn init_cell(&self) -> &InitStateCell;

    /// Address of the class's read-only metadata
    fn class_info_ro(&self) -> usize;

    /// Whether the class is ready
    #[inline]
    fn is_initialized(&self) -> bool {
        self.init_cell().is_initialized()
    }

    /// Current state, acquire
    #[inline]
    fn get_init_state(&self) -> ClassInitState {
        self.init_cell().state()
    }

    /// Raw slot value, acquire
    #[inline]
    fn init_state_raw_value(&self) -> usize {
        self.init_cell().raw()
    }

    /// Store a raw slot value, release. No validation.
    #[inline]
    fn set_init_state_raw_value(&self, raw: usize) {
        self.init_cell().set_raw(raw)
    }

    /// Release-store `state`.
    ///
    /// `Initialized` publishes the read-only metadata address. Panics on a
    /// backward move, a move out of `Failed`, or a missing read-only
    /// reference.
    fn set_init_state(&self, state: ClassInitState) {
        match state {
            ClassInitState::Initialized => self.init_cell().publish(self.class_info_ro()),
            state => self.init_cell().store_state(state),
        }
    }

    /// Forward-only compare-and-swap of the state
    fn try_set_init_state(&self, state: ClassInitState) -> Result<()> {
        match state {
            ClassInitState::Initialized => self.init_cell().try_publish(self.class_info_ro()),
            state => self.init_cell().try_store_state(state),
        }
    }

    /// Which interpretation of the slot is live
    #[inline]
    fn init_slot(&self) -> InitSlot {
        self.init_cell().slot()
    }

    /// Replace the positive-match cache of an initialized class
    fn set_cache_true_class(&self, addr: usize) -> Result<()> {
        self.init_cell().set_positive_cache(addr)
    }
}

/// Metadata whose first word is the identity (shadow) reference
pub trait MetadataShadow {
    /// Store the raw shadow value
    fn set_shadow_raw(&mut self, raw: usize);

    /// Raw shadow value
    fn shadow_raw(&self) -> usize;
}

/// Point `meta`'s shadow at `cls`.
///
/// No null or type check: `cls` must be a class metadata handle. Narrow
/// layouts keep the low 32 bits.
#[inline]
pub fn set_metadata_shadow<M, C>(meta: &mut M, cls: *const C)
where
    M: MetadataShadow + ?Sized,
{
    meta.set_shadow_raw(pointer_address(cls));
}

/// Per-method descriptor: metadata reference plus local-ref area
#[repr(C)]
#[derive(Debug, Default)]
pub struct MethodDesc {
    /// Offset of the method metadata from this descriptor; odd = compact
    pub(crate) metadata_offset: u32,
    /// Start of the local reference area
    pub local_ref_offset: u16,
    /// Number of local reference slots
    pub local_ref_number: u16,
}

const _: () = assert!(std::mem::size_of::<MethodDesc>() == 8);

impl MethodDesc {
    /// Descriptor with no metadata yet
    pub const fn new(local_ref_offset: u16, local_ref_number: u16) -> Self {
        Self {
            metadata_offset: 0,
            local_ref_offset,
            local_ref_number,
        }
    }

    /// Stored offset including the compact bit
    #[inline]
    pub const fn raw_metadata_offset(&self) -> u32 {
        self.metadata_offset
    }

    /// Metadata is in compact format
    #[inline]
    pub const fn has_compact_metadata(&self) -> bool {
        self.metadata_offset & 1 == 1
    }

    /// Address of the method metadata
    pub fn metadata_address(&self) -> usize {
        let offset = (self.metadata_offset & !1) as i32 as isize;
        decode_relative(address_of(self), offset)
    }

    /// Encode the metadata reference; aborts if out of 32-bit reach.
    ///
    /// `target` must be 2-byte aligned.
    pub fn set_metadata(&mut self, target: usize, compact: bool) {
        assert!(
            target & 1 == 0,
            "method metadata {target:#x} is not 2-byte aligned"
        );
        let cell = address_of(self);
        match checked_offset32(target, cell) {
            Ok(offset) => self.metadata_offset = offset as u32 | u32::from(compact),
            Err(_) => abort_on_overflow(target, cell, 32),
        }
    }
}

/// Fields and methods shared by both read-only layouts
macro_rules! impl_class_metadata_ro {
    ($ty:ty) => {
        impl $ty {
            /// Class name (NUL-terminated, external)
            #[inline]
            pub fn class_name(&self) -> usize {
                self.class_name.get_data_ref()
            }

            /// Field table
            #[inline]
            pub fn fields(&self) -> usize {
                self.fields.get_data_ref()
            }

            /// Method table
            #[inline]
            pub fn methods(&self) -> usize {
                self.methods.get_data_ref()
            }

            /// Set the class name reference
            pub fn set_class_name(&mut self, addr: usize, format: $crate::data_ref::DataRefFormat) {
                self.class_name.set_data_ref(addr, format);
            }

            /// Set the field table reference and count
            pub fn set_fields(&mut self, addr: usize, count: u16, format: $crate::data_ref::DataRefFormat) {
                self.fields.set_data_ref(addr, format);
                self.num_of_fields = count;
            }

            /// Set the method table reference and count
            pub fn set_methods(&mut self, addr: usize, count: u16, format: $crate::data_ref::DataRefFormat) {
                self.methods.set_data_ref(addr, format);
                self.num_of_methods = count;
            }

            /// Superclass or component reference; `is_array` selects which
            pub fn parent(&self, is_array: bool) -> $crate::layout::ParentRef {
                let addr = self.parent.get_data_ref();
                if is_array {
                    $crate::layout::ParentRef::Component(addr)
                } else {
                    $crate::layout::ParentRef::Superclass(addr)
                }
            }

            /// Store the superclass (or component metadata) reference
            pub fn set_parent(&mut self, parent: $crate::layout::ParentRef, format: $crate::data_ref::DataRefFormat) {
                let addr = match parent {
                    $crate::layout::ParentRef::Superclass(addr)
                    | $crate::layout::ParentRef::Component(addr) => addr,
                };
                self.parent.set_data_ref(addr, format);
            }

            /// Access modifiers without the override flag
            #[inline]
            pub const fn modifiers(&self) -> u32 {
                self.modifier & $crate::layout::MODIFIER_MASK
            }

            /// Override flag
            #[inline]
            pub const fn has_override(&self) -> bool {
                self.modifier & $crate::layout::MODIFIER_OVERRIDE != 0
            }

            /// Annotation data, if any
            pub fn annotation(&self) -> Option<usize> {
                (self.annotation.raw() != 0).then(|| self.annotation.get())
            }

            /// Class initializer entry point, if any
            pub fn clinit_address(&self) -> Option<usize> {
                (self.clinit_addr.raw() != 0).then(|| self.clinit_addr.get())
            }

            /// Encode the annotation reference
            pub fn set_annotation(&mut self, addr: usize) {
                self.annotation.set(addr);
            }

            /// Encode the class initializer entry point
            pub fn set_clinit_address(&mut self, addr: usize) {
                self.clinit_addr.set(addr);
            }
        }
    };
}

pub(crate) use impl_class_metadata_ro;
