//! Class initialization state
//!
//! The state lives in one pointer-sized field. A class that is not ready
//! holds a small address inside a page that is never mapped; a ready class
//! holds a real, readable address. Generated code simply loads through the
//! field: a ready class costs nothing, a non-ready one faults and the fault
//! handler routes the thread to the slow path.
//!
//! ```text
//!   0x1000  Min (sentinel)
//!   0x1001  Uninitialized
//!   0x1002  Initializing
//!   0x1003  Failed
//!   0x1004  Max (sentinel)
//!   other   Initialized (holds a real metadata address)
//! ```
//!
//! Every read is an acquire load and every write a release store. Arbitrating
//! concurrent initializers is left to the class-init lock.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{MetadataError, Result};

/// Virtual memory page size the reserved range is built on
pub const PAGE_SIZE: usize = 4096;

/// First address of the reserved class-init range
pub const SEGV_ADDR_RANGE_START: usize = PAGE_SIZE;
/// Sentinel below the live states
pub const SEGV_ADDR_CLASS_INIT_STATE_MIN: usize = SEGV_ADDR_RANGE_START + ClassInitState::MIN as usize;
/// Raw value of an uninitialized class
pub const SEGV_ADDR_CLASS_UNINITIALIZED: usize =
    SEGV_ADDR_CLASS_INIT_STATE_MIN + ClassInitState::Uninitialized as usize;
/// Raw value of a class whose initializer is running
pub const SEGV_ADDR_CLASS_INITIALIZING: usize =
    SEGV_ADDR_CLASS_INIT_STATE_MIN + ClassInitState::Initializing as usize;
/// Raw value of a class whose initializer failed
pub const SEGV_ADDR_CLASS_INIT_FAILED: usize =
    SEGV_ADDR_CLASS_INIT_STATE_MIN + ClassInitState::Failed as usize;
/// Sentinel above the live states
pub const SEGV_ADDR_CLASS_INIT_STATE_MAX: usize = SEGV_ADDR_CLASS_INIT_STATE_MIN + ClassInitState::MAX as usize;
/// One past the reserved range
pub const SEGV_ADDR_RANGE_END: usize = SEGV_ADDR_CLASS_INIT_STATE_MAX + 1;

const _: () = assert!(SEGV_ADDR_RANGE_END <= SEGV_ADDR_RANGE_START + PAGE_SIZE);

/// Whether `addr` can never be a real metadata address.
///
/// Covers the null page and the reserved class-init page.
#[inline]
pub const fn is_reserved_address(addr: usize) -> bool {
    addr < SEGV_ADDR_RANGE_START + PAGE_SIZE
}

/// Class initialization progress
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClassInitState {
    /// Initializer not started
    Uninitialized = 1,
    /// Initializer running
    Initializing = 2,
    /// Initializer failed; permanent
    Failed = 3,
    /// Ready to use; permanent
    Initialized = 4,
}

impl ClassInitState {
    /// Numeric sentinel below every state
    pub const MIN: u8 = 0;
    /// Numeric sentinel at the top of the order
    pub const MAX: u8 = 4;

    /// State encoded by a raw field value
    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        match raw {
            SEGV_ADDR_CLASS_UNINITIALIZED => ClassInitState::Uninitialized,
            SEGV_ADDR_CLASS_INITIALIZING => ClassInitState::Initializing,
            SEGV_ADDR_CLASS_INIT_FAILED => ClassInitState::Failed,
            _ => ClassInitState::Initialized,
        }
    }

    /// Reserved address for this state; `None` for `Initialized`
    #[inline]
    pub const fn raw_address(self) -> Option<usize> {
        match self {
            ClassInitState::Initialized => None,
            state => Some(SEGV_ADDR_CLASS_INIT_STATE_MIN + state as usize),
        }
    }

    /// No transition leaves this state
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, ClassInitState::Failed | ClassInitState::Initialized)
    }

    /// `Uninitialized -> Initializing -> {Initialized | Failed}`
    #[inline]
    pub const fn can_transition_to(self, next: ClassInitState) -> bool {
        matches!(
            (self, next),
            (ClassInitState::Uninitialized, ClassInitState::Initializing)
                | (ClassInitState::Initializing, ClassInitState::Initialized)
                | (ClassInitState::Initializing, ClassInitState::Failed)
        )
    }
}

/// Interpretation of the init-state slot.
///
/// The same storage holds the positive-match class cache once the class is
/// initialized; `is_initialized()` picks the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSlot {
    /// Class not ready
    State(ClassInitState),
    /// Class ready; the slot caches a class address
    PositiveCache(usize),
}

/// The init-state field of class metadata
#[repr(transparent)]
#[derive(Debug)]
pub struct InitStateCell {
    raw: AtomicUsize,
}

impl InitStateCell {
    /// Cell holding a non-ready state.
    ///
    /// Panics for `Initialized`, which has no reserved address.
    pub const fn new(state: ClassInitState) -> Self {
        match state.raw_address() {
            Some(raw) => Self {
                raw: AtomicUsize::new(raw),
            },
            None => panic!("an initialized cell needs a metadata address"),
        }
    }

    /// Raw value, acquire
    #[inline]
    pub fn raw(&self) -> usize {
        self.raw.load(Ordering::Acquire)
    }

    /// Store a raw value, release. No validation.
    #[inline]
    pub fn set_raw(&self, raw: usize) {
        self.raw.store(raw, Ordering::Release);
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> ClassInitState {
        ClassInitState::from_raw(self.raw())
    }

    /// Whether the field holds a real address
    #[inline]
    pub fn is_initialized(&self) -> bool {
        !(SEGV_ADDR_CLASS_UNINITIALIZED..=SEGV_ADDR_CLASS_INIT_FAILED).contains(&self.raw())
    }

    /// Current interpretation of the slot
    pub fn slot(&self) -> InitSlot {
        let raw = self.raw();
        match ClassInitState::from_raw(raw) {
            ClassInitState::Initialized => InitSlot::PositiveCache(raw),
            state => InitSlot::State(state),
        }
    }

    /// Release-store a non-ready state.
    ///
    /// Panics on a backward move or a move out of a terminal state.
    pub fn store_state(&self, state: ClassInitState) {
        let Some(raw) = state.raw_address() else {
            panic!("Initialized is published with a metadata address");
        };
        let current = self.state();
        assert!(
            current == state || current.can_transition_to(state),
            "invalid class init transition {current:?} -> {state:?}"
        );
        #[cfg(feature = "meta_logging")]
        tracing::debug!(?state, "class init state stored");
        self.set_raw(raw);
    }

    /// Release-store a real address, marking the class initialized.
    ///
    /// Panics on an address in the null or reserved page, and when the
    /// class has not passed through `Initializing`.
    pub fn publish(&self, addr: usize) {
        assert!(
            !is_reserved_address(addr),
            "metadata address {addr:#x} lies in the reserved page"
        );
        let current = self.state();
        assert!(
            current == ClassInitState::Initialized
                || current.can_transition_to(ClassInitState::Initialized),
            "invalid class init transition {current:?} -> Initialized"
        );
        #[cfg(feature = "meta_logging")]
        tracing::debug!(addr, "class init state published");
        self.set_raw(addr);
    }

    /// Compare-and-swap forward to a non-ready state
    pub fn try_store_state(&self, state: ClassInitState) -> Result<()> {
        let Some(raw) = state.raw_address() else {
            return Err(MetadataError::InvalidTransition {
                from: self.state(),
                to: state,
            });
        };
        self.advance(state, raw)
    }

    /// Compare-and-swap `Initializing` to a real address
    pub fn try_publish(&self, addr: usize) -> Result<()> {
        if is_reserved_address(addr) {
            return Err(MetadataError::ReservedAddress(addr));
        }
        self.advance(ClassInitState::Initialized, addr)
    }

    /// Update the positive-match cache of an initialized class
    pub fn set_positive_cache(&self, addr: usize) -> Result<()> {
        if is_reserved_address(addr) {
            return Err(MetadataError::ReservedAddress(addr));
        }
        match self.state() {
            ClassInitState::Initialized => {
                self.set_raw(addr);
                Ok(())
            }
            from => Err(MetadataError::InvalidTransition {
                from,
                to: ClassInitState::Initialized,
            }),
        }
    }

    fn advance(&self, to: ClassInitState, new_raw: usize) -> Result<()> {
        let mut current = self.raw();
        loop {
            let from = ClassInitState::from_raw(current);
            if !from.can_transition_to(to) {
                #[cfg(feature = "meta_logging")]
                tracing::warn!(?from, ?to, "rejected class init transition");
                return Err(MetadataError::InvalidTransition { from, to });
            }
            match self
                .raw
                .compare_exchange_weak(current, new_raw, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    #[cfg(feature = "meta_logging")]
                    tracing::debug!(?from, ?to, "class init transition");
                    return Ok(());
                }
                Err(observed) => current = observed,
            }
        }
    }
}
