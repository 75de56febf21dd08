//! Metadata encoding and class-init tests
//!
//! Covers the wire-level contracts generated code relies on:
//! - relative offsets round-trip and refuse unreachable targets
//! - tagged references keep the format in the low two bits
//! - raw init-state values map to states, anything else is initialized
//! - the full uninitialized -> initialized lifecycle of a class

use std::process::Command;

use otter_metadata::init_state::{
    SEGV_ADDR_CLASS_INIT_STATE_MAX, SEGV_ADDR_CLASS_INIT_STATE_MIN, SEGV_ADDR_CLASS_UNINITIALIZED,
};
use otter_metadata::layout::{narrow, wide};
use otter_metadata::offset::address_of;
use otter_metadata::{
    ClassInit, ClassInitState, ClassMetadata, ClassMetadataRO, DATA_REF_BIT_MASK, DataRef,
    DataRef32, DataRefFormat, InitCheck, InitSlot, MetadataError, MetadataShadow, RelOffset,
    RelOffset32, set_metadata_shadow,
};

const ABORT_CHILD_ENV: &str = "OTTER_METADATA_ABORT_CHILD";

// ============================================================================
// Offset codec
// ============================================================================

#[test]
fn test_offset_round_trip_across_range() {
    let mut cell32 = Box::new(RelOffset32::new());
    let mut cell = Box::new(RelOffset::new());
    let base32 = address_of(&*cell32);
    let base = address_of(&*cell);

    for delta in (-1_000_000isize..1_000_000).step_by(9_973) {
        let target = base32.wrapping_add_signed(delta);
        cell32.set(target);
        assert_eq!(cell32.get(), target);

        let target = base.wrapping_add_signed(delta * 4096);
        cell.set(target);
        assert_eq!(cell.get(), target);
    }
}

#[test]
#[cfg(target_pointer_width = "64")]
fn test_offset_overflow_aborts_process() {
    if std::env::var_os(ABORT_CHILD_ENV).is_some() {
        let mut cell = Box::new(RelOffset32::new());
        let target = address_of(&*cell).wrapping_add(1 << 40);
        cell.set(target);
        // unreachable: set() aborts
        std::process::exit(0);
    }
    assert_child_aborts("test_offset_overflow_aborts_process");
}

#[test]
#[cfg(target_pointer_width = "64")]
fn test_offset_overflow_checked() {
    let mut cell = Box::new(RelOffset32::new());
    let target = address_of(&*cell).wrapping_sub(1 << 32);
    assert!(matches!(
        cell.try_set(target),
        Err(MetadataError::OffsetOverflow { width_bits: 32, .. })
    ));
}

// ============================================================================
// Tagged data references
// ============================================================================

#[test]
fn test_tag_isolation() {
    let mut r = Box::new(DataRef::null());
    let mut r32 = Box::new(DataRef32::null());
    let field = address_of(&*r);
    let field32 = address_of(&*r32);

    for format in [DataRefFormat::Direct, DataRefFormat::Offset] {
        for delta in [0isize, 8, -8, 0x10_0000, -0x10_0000] {
            let target = field.wrapping_add_signed(delta);
            r.set_data_ref(target, format);
            assert_eq!(r.get_data_ref(), target);
            assert_eq!(r.raw() & DATA_REF_BIT_MASK, format as usize);
            assert_eq!(r.format(), format);
        }

        let target = if format == DataRefFormat::Direct {
            0x0040_1000
        } else {
            field32.wrapping_add_signed(-0x2000)
        };
        r32.set_data_ref(target, format);
        assert_eq!(r32.get_data_ref(), target);
        assert_eq!(r32.raw() as usize & DATA_REF_BIT_MASK, format as usize);
    }
}

#[test]
#[cfg(target_pointer_width = "64")]
fn test_narrow_offset_ref_overflow_aborts_process() {
    if std::env::var_os(ABORT_CHILD_ENV).is_some() {
        let mut r = Box::new(DataRef32::null());
        let field = address_of(&*r);
        r.set_data_ref(field.wrapping_sub(1 << 40), DataRefFormat::Offset);
        std::process::exit(0);
    }
    assert_child_aborts("test_narrow_offset_ref_overflow_aborts_process");
}

#[test]
#[should_panic(expected = "decode-only")]
fn test_compact_cannot_be_encoded() {
    let mut r = DataRef32::null();
    r.set_data_ref(0x1000, DataRefFormat::Compact);
}

// ============================================================================
// Init state
// ============================================================================

#[test]
fn test_state_ordering() {
    let cases = [
        (4097, ClassInitState::Uninitialized),
        (4098, ClassInitState::Initializing),
        (4099, ClassInitState::Failed),
    ];
    for (raw, state) in cases {
        assert_eq!(ClassInitState::from_raw(raw), state);
        assert_eq!(state.raw_address(), Some(raw));
    }
    assert_eq!(SEGV_ADDR_CLASS_INIT_STATE_MIN, 4096);
    assert_eq!(SEGV_ADDR_CLASS_INIT_STATE_MAX, 4100);

    for raw in [0usize, 4095, 4101, 8192, 0x5555_0000, usize::MAX] {
        assert_eq!(ClassInitState::from_raw(raw), ClassInitState::Initialized);
    }
    assert!(ClassInitState::Uninitialized < ClassInitState::Initializing);
    assert!(ClassInitState::Initializing < ClassInitState::Failed);
}

#[test]
fn test_monotonicity_is_enforced() {
    let ro = Box::new(ClassMetadataRO::new(0));
    let mut meta = Box::new(ClassMetadata::new(0, 16));
    meta.set_class_info_ro(address_of(&*ro), DataRefFormat::Offset);

    assert!(meta.try_set_init_state(ClassInitState::Initialized).is_err());
    meta.try_set_init_state(ClassInitState::Initializing).unwrap();
    meta.try_set_init_state(ClassInitState::Initialized).unwrap();

    for earlier in [
        ClassInitState::Uninitialized,
        ClassInitState::Initializing,
        ClassInitState::Failed,
    ] {
        assert_eq!(
            meta.try_set_init_state(earlier),
            Err(MetadataError::InvalidTransition {
                from: ClassInitState::Initialized,
                to: earlier,
            })
        );
    }
    assert!(meta.is_initialized());
}

#[test]
fn test_end_to_end_class_initialization() {
    let ro = Box::new(ClassMetadataRO::new(0x1));
    let mut meta = Box::new(ClassMetadata::new(1, 32));
    meta.set_class_info_ro(address_of(&*ro), DataRefFormat::Offset);

    meta.set_init_state_raw_value(SEGV_ADDR_CLASS_UNINITIALIZED);
    assert!(!meta.is_initialized());
    assert_eq!(meta.get_init_state(), ClassInitState::Uninitialized);
    assert_eq!(meta.check_initialized(), Err(ClassInitState::Uninitialized));

    meta.set_init_state_raw_value(address_of(&*ro));
    assert!(meta.is_initialized());
    assert_eq!(meta.get_init_state(), ClassInitState::Initialized);
    assert_eq!(meta.init_slot(), InitSlot::PositiveCache(address_of(&*ro)));
    assert_eq!(meta.check_initialized(), Ok(address_of(&*ro)));
}

#[test]
#[should_panic(expected = "invalid class init transition Failed -> Initialized")]
fn test_failed_class_cannot_be_initialized() {
    let ro = Box::new(ClassMetadataRO::new(0));
    let mut meta = Box::new(ClassMetadata::new(0, 16));
    meta.set_class_info_ro(address_of(&*ro), DataRefFormat::Offset);

    meta.set_init_state(ClassInitState::Initializing);
    meta.set_init_state(ClassInitState::Failed);
    meta.set_init_state(ClassInitState::Initialized);
}

#[test]
#[should_panic(expected = "invalid class init transition Initialized -> Uninitialized")]
fn test_initialized_class_cannot_be_reset() {
    let ro = Box::new(ClassMetadataRO::new(0));
    let mut meta = Box::new(ClassMetadata::new(0, 16));
    meta.set_class_info_ro(address_of(&*ro), DataRefFormat::Offset);

    meta.set_init_state(ClassInitState::Initializing);
    meta.set_init_state(ClassInitState::Initialized);
    meta.set_init_state(ClassInitState::Uninitialized);
}

#[test]
#[should_panic(expected = "lies in the reserved page")]
fn test_initialized_without_ro_reference_panics() {
    let meta = Box::new(ClassMetadata::new(0, 16));
    meta.set_init_state(ClassInitState::Initializing);
    meta.set_init_state(ClassInitState::Initialized);
}

#[test]
fn test_positive_cache_requires_initialized() {
    let meta = ClassMetadata::new(0, 0);
    assert!(meta.set_cache_true_class(0x10_0000).is_err());
    assert_eq!(meta.get_init_state(), ClassInitState::Uninitialized);
}

// ============================================================================
// Both layouts
// ============================================================================

#[test]
#[cfg(target_pointer_width = "64")]
fn test_wide_and_narrow_share_init_offset() {
    assert_eq!(
        wide::ClassMetadata::offset_of_init_state(),
        narrow::ClassMetadata::offset_of_init_state()
    );
    assert_eq!(
        std::mem::size_of::<wide::ClassMetadata>(),
        std::mem::size_of::<narrow::ClassMetadata>()
    );
}

#[test]
fn test_narrow_lifecycle() {
    let ro = Box::new(narrow::ClassMetadataRO::new(0));
    let mut meta = Box::new(narrow::ClassMetadata::new(0, 8));
    meta.set_class_info_ro(address_of(&*ro), DataRefFormat::Offset);

    meta.set_init_state(ClassInitState::Initializing);
    meta.set_init_state(ClassInitState::Failed);
    assert_eq!(meta.get_init_state(), ClassInitState::Failed);
    assert!(!meta.is_initialized());
    assert!(meta.try_set_init_state(ClassInitState::Initialized).is_err());
}

#[test]
fn test_shadow_helper() {
    let metaclass = Box::new(ClassMetadata::new(0, 0));
    let mut meta = ClassMetadata::new(0, 0);
    set_metadata_shadow(&mut meta, &*metaclass as *const ClassMetadata);
    assert_eq!(meta.shadow_raw() as u64, address_of(&*metaclass) as u64 & shadow_mask());
}

fn shadow_mask() -> u64 {
    if cfg!(feature = "ref32") {
        u32::MAX as u64
    } else {
        u64::MAX
    }
}

/// Re-run `test_name` alone in a child process and expect it to abort
fn assert_child_aborts(test_name: &str) {
    let exe = std::env::current_exe().unwrap();
    let status = Command::new(exe)
        .args([test_name, "--exact", "--nocapture"])
        .env(ABORT_CHILD_ENV, "1")
        .status()
        .unwrap();
    assert!(!status.success(), "{test_name}: encode of unreachable target must abort");
}
