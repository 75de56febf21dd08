//! Fault-address classification and the explicit-branch fallback
//!
//! Generated code never tests the init-state field: it loads through it. When
//! the class is not ready the load hits the reserved page and the runtime's
//! fault handler asks [`classify_fault_address`] what happened. Platforms
//! without usable fault handling use [`InitCheck`] instead, which performs the
//! same decision with an ordinary branch.

use crate::init_state::{
    ClassInitState, PAGE_SIZE, SEGV_ADDR_CLASS_INIT_FAILED, SEGV_ADDR_CLASS_UNINITIALIZED,
    SEGV_ADDR_RANGE_START,
};
use crate::layout::ClassInit;

/// What a faulting address means to the class-init protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitFault {
    /// A load through a non-ready init-state field
    ClassNotReady(ClassInitState),
    /// Inside the reserved page but not a live state (corrupt field)
    ReservedPage,
    /// Not ours; the handler should chain to the next one
    Unrelated,
}

/// Classify the address reported by a memory-access fault
pub fn classify_fault_address(addr: usize) -> InitFault {
    if (SEGV_ADDR_CLASS_UNINITIALIZED..=SEGV_ADDR_CLASS_INIT_FAILED).contains(&addr) {
        InitFault::ClassNotReady(ClassInitState::from_raw(addr))
    } else if (SEGV_ADDR_RANGE_START..SEGV_ADDR_RANGE_START + PAGE_SIZE).contains(&addr) {
        InitFault::ReservedPage
    } else {
        InitFault::Unrelated
    }
}

/// Explicit-branch replacement for the faulting load
pub trait InitCheck {
    /// The positive cache of a ready class, or the state that blocks it
    fn check_initialized(&self) -> Result<usize, ClassInitState>;
}

impl<T: ClassInit + ?Sized> InitCheck for T {
    #[inline]
    fn check_initialized(&self) -> Result<usize, ClassInitState> {
        let raw = self.init_state_raw_value();
        match ClassInitState::from_raw(raw) {
            ClassInitState::Initialized => Ok(raw),
            state => Err(state),
        }
    }
}
