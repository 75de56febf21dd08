//! 32-bit reference layout
//!
//! ```text
//! ClassMetadataRO (48 bytes)          ClassMetadata (56 bytes)
//!  0 class_name      DataRef           0 shadow             u32
//!  8 fields          DataRef           4 monitor            i32
//! 16 methods         DataRef           8 cl_index           u16
//! 24 parent          DataRef          10 size_info          u16
//! 32 num_of_fields   u16              12 flag               u16
//! 34 num_of_methods  u16              14 num_of_supers      u16
//! 36 modifier        u32              16 itable             usize
//! 40 annotation      RelOffset32      24 vtable             usize
//! 44 clinit_addr     RelOffset32      32 gctib              usize
//!                                     40 class_info_ro      DataRef32
//!                                     44 cache_false_class  u32
//!                                     48 init_state         InitStateCell
//! ```
//!
//! The superclass flag and count move from the read-only part into the
//! header hole left by the 32-bit shadow.

use std::mem::{offset_of, size_of};

use crate::data_ref::{DataRef, DataRef32, DataRefFormat};
use crate::init_state::{ClassInitState, InitStateCell};
use crate::layout::{ClassInit, MetadataShadow, impl_class_metadata_ro};
use crate::offset::RelOffset32;

/// Immutable class metadata, emitted once at build time
#[repr(C)]
#[derive(Debug, Default)]
pub struct ClassMetadataRO {
    pub(crate) class_name: DataRef,
    pub(crate) fields: DataRef,
    pub(crate) methods: DataRef,
    pub(crate) parent: DataRef,
    /// Number of declared fields
    pub num_of_fields: u16,
    /// Number of declared methods
    pub num_of_methods: u16,
    /// Modifiers (low 24 bits) and override flag (bit 31)
    pub modifier: u32,
    pub(crate) annotation: RelOffset32,
    pub(crate) clinit_addr: RelOffset32,
}

impl_class_metadata_ro!(ClassMetadataRO);

impl ClassMetadataRO {
    /// Empty read-only metadata with the given modifier word
    pub fn new(modifier: u32) -> Self {
        Self {
            modifier,
            ..Self::default()
        }
    }
}

/// Mutable class metadata; starts with the common object header
#[repr(C)]
#[derive(Debug)]
pub struct ClassMetadata {
    pub(crate) shadow: u32,
    /// Object monitor word
    pub monitor: i32,
    /// Class loader index
    pub cl_index: u16,
    pub(crate) size_info: u16,
    /// Class flags
    pub flag: u16,
    /// Length of the superclass list
    pub num_of_superclasses: u16,
    /// Interface dispatch table (opaque)
    pub itable: usize,
    /// Virtual dispatch table (opaque)
    pub vtable: usize,
    /// GC type info block (opaque)
    pub gctib: usize,
    pub(crate) class_info_ro: DataRef32,
    pub(crate) cache_false_class: u32,
    pub(crate) init_state: InitStateCell,
}

impl ClassMetadata {
    /// Offset of the init-state slot, as used by generated code
    pub const OFFSET_OF_INIT_STATE: usize = offset_of!(ClassMetadata, init_state);

    /// Uninitialized metadata with `size_info` as instance/element size
    pub const fn new(cl_index: u16, size_info: u16) -> Self {
        Self {
            shadow: 0,
            monitor: 0,
            cl_index,
            size_info,
            flag: 0,
            num_of_superclasses: 0,
            itable: 0,
            vtable: 0,
            gctib: 0,
            class_info_ro: DataRef32::null(),
            cache_false_class: 0,
            init_state: InitStateCell::new(ClassInitState::Uninitialized),
        }
    }

    /// Offset of the init-state slot
    #[inline]
    pub const fn offset_of_init_state() -> usize {
        Self::OFFSET_OF_INIT_STATE
    }

    /// Instance size of an ordinary class
    #[inline]
    pub const fn object_size(&self) -> u16 {
        self.size_info
    }

    /// Element size of an array class
    #[inline]
    pub const fn component_size(&self) -> u16 {
        self.size_info
    }

    /// Set the instance/element size
    pub fn set_size_info(&mut self, size: u16) {
        self.size_info = size;
    }

    /// Encode the read-only metadata reference
    pub fn set_class_info_ro(&mut self, addr: usize, format: DataRefFormat) {
        self.class_info_ro.set_data_ref(addr, format);
    }

    /// Negative-match cache (last class known not to match)
    #[inline]
    pub const fn cache_false_class(&self) -> u32 {
        self.cache_false_class
    }

    /// Replace the negative-match cache
    pub fn set_cache_false_class(&mut self, cls: u32) {
        self.cache_false_class = cls;
    }
}

impl ClassInit for ClassMetadata {
    #[inline]
    fn init_cell(&self) -> &InitStateCell {
        &self.init_state
    }

    #[inline]
    fn class_info_ro(&self) -> usize {
        self.class_info_ro.get_data_ref()
    }
}

impl MetadataShadow for ClassMetadata {
    #[inline]
    fn set_shadow_raw(&mut self, raw: usize) {
        self.shadow = raw as u32;
    }

    #[inline]
    fn shadow_raw(&self) -> usize {
        self.shadow as usize
    }
}

#[cfg(target_pointer_width = "64")]
const _: () = {
    assert!(size_of::<ClassMetadataRO>() == 48);
    assert!(offset_of!(ClassMetadataRO, modifier) == 36);
    assert!(offset_of!(ClassMetadataRO, clinit_addr) == 44);
    assert!(size_of::<ClassMetadata>() == 56);
    assert!(offset_of!(ClassMetadata, flag) == 12);
    assert!(offset_of!(ClassMetadata, itable) == 16);
    assert!(offset_of!(ClassMetadata, class_info_ro) == 40);
    assert!(offset_of!(ClassMetadata, cache_false_class) == 44);
    assert!(offset_of!(ClassMetadata, init_state) == 48);
};
