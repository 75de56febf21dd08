//! Pointer-width reference layout
//!
//! ```text
//! ClassMetadataRO (56 bytes)          ClassMetadata (56 bytes)
//!  0 class_name      DataRef           0 shadow          usize
//!  8 fields          DataRef           8 monitor         i32
//! 16 methods         DataRef          12 cl_index        u16
//! 24 parent          DataRef          14 size_info       u16
//! 32 num_of_fields   u16              16 itable          usize
//! 34 num_of_methods  u16              24 vtable          usize
//! 36 flag            u16              32 gctib           usize
//! 38 num_of_supers   u16              40 class_info_ro   DataRef
//! 40 padding         u32              48 init_state      InitStateCell
//! 44 modifier        u32
//! 48 annotation      RelOffset32
//! 52 clinit_addr     RelOffset32
//! ```

use std::mem::{offset_of, size_of};

use crate::data_ref::{DataRef, DataRefFormat};
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
    /// Class flags
    pub flag: u16,
    /// Length of the superclass list
    pub num_of_superclasses: u16,
    pub(crate) _padding: u32,
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
    pub(crate) shadow: usize,
    /// Object monitor word
    pub monitor: i32,
    /// Class loader index
    pub cl_index: u16,
    pub(crate) size_info: u16,
    /// Interface dispatch table (opaque)
    pub itable: usize,
    /// Virtual dispatch table (opaque)
    pub vtable: usize,
    /// GC type info block (opaque)
    pub gctib: usize,
    pub(crate) class_info_ro: DataRef,
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
            itable: 0,
            vtable: 0,
            gctib: 0,
            class_info_ro: DataRef::null(),
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
        self.shadow = raw;
    }

    #[inline]
    fn shadow_raw(&self) -> usize {
        self.shadow
    }
}

#[cfg(target_pointer_width = "64")]
const _: () = {
    assert!(size_of::<ClassMetadataRO>() == 56);
    assert!(offset_of!(ClassMetadataRO, num_of_fields) == 32);
    assert!(offset_of!(ClassMetadataRO, modifier) == 44);
    assert!(offset_of!(ClassMetadataRO, clinit_addr) == 52);
    assert!(size_of::<ClassMetadata>() == 56);
    assert!(offset_of!(ClassMetadata, itable) == 16);
    assert!(offset_of!(ClassMetadata, class_info_ro) == 40);
    assert!(offset_of!(ClassMetadata, init_state) == 48);
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_state::InitSlot;
    use crate::layout::ParentRef;
    use crate::offset::address_of;

    #[test]
    fn test_ro_references_round_trip() {
        let mut ro = Box::new(ClassMetadataRO::new(0x8000_0001));
        let base = address_of(&*ro);

        ro.set_class_name(base + 0x100, DataRefFormat::Offset);
        ro.set_fields(base + 0x200, 3, DataRefFormat::Offset);
        ro.set_methods(0x7000_0000, 5, DataRefFormat::Direct);
        ro.set_parent(ParentRef::Superclass(base - 0x40), DataRefFormat::Offset);
        ro.set_clinit_address(base + 0x1000);

        assert_eq!(ro.class_name(), base + 0x100);
        assert_eq!((ro.fields(), ro.num_of_fields), (base + 0x200, 3));
        assert_eq!((ro.methods(), ro.num_of_methods), (0x7000_0000, 5));
        assert_eq!(ro.parent(false), ParentRef::Superclass(base - 0x40));
        assert_eq!(ro.parent(true), ParentRef::Component(base - 0x40));
        assert_eq!(ro.clinit_address(), Some(base + 0x1000));
        assert_eq!(ro.annotation(), None);
        assert_eq!(ro.modifiers(), 1);
        assert!(ro.has_override());
    }

    #[test]
    fn test_class_lifecycle() {
        let ro = Box::new(ClassMetadataRO::new(1));
        let mut meta = Box::new(ClassMetadata::new(0, 24));
        meta.set_class_info_ro(address_of(&*ro), DataRefFormat::Offset);

        assert_eq!(meta.get_init_state(), ClassInitState::Uninitialized);
        meta.set_init_state(ClassInitState::Initializing);
        assert!(!meta.is_initialized());

        meta.set_init_state(ClassInitState::Initialized);
        assert!(meta.is_initialized());
        assert_eq!(meta.init_state_raw_value(), address_of(&*ro));
        assert_eq!(meta.init_slot(), InitSlot::PositiveCache(address_of(&*ro)));
        assert_eq!(meta.object_size(), 24);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_init_state_offset() {
        assert_eq!(ClassMetadata::offset_of_init_state(), 48);
    }
}
