//! # Otter Metadata
//!
//! Binary metadata contract between the AOT compiler and the runtime.
//!
//! ## Design
//!
//! - **Relative offsets**: references are signed deltas from their own cell,
//!   verified on encode, so emitted metadata is position independent
//! - **Tagged references**: two low bits select direct, compact, offset or
//!   indirect addressing
//! - **Fixed layouts**: `ClassMetadataRO` / `ClassMetadata` in a wide and a
//!   narrow variant, offsets checked at compile time
//! - **Fault-based init check**: a non-ready class stores an address in a
//!   never-mapped page, so loading through its init-state field faults

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod data_ref;
pub mod error;
pub mod fault;
pub mod init_state;
pub mod layout;
pub mod manifest;
pub mod offset;
pub mod types;

pub use data_ref::{DATA_REF_BIT_MASK, DataRef, DataRef32, DataRefFormat, DataRefTarget};
pub use error::{MetadataError, Result};
pub use fault::{InitCheck, InitFault, classify_fault_address};
pub use init_state::{ClassInitState, InitSlot, InitStateCell, PAGE_SIZE};
pub use layout::{ClassInit, MetadataShadow, MethodDesc, ParentRef, set_metadata_shadow};
pub use manifest::LayoutManifest;
pub use offset::{RelOffset, RelOffset32};
pub use types::{AddrOffset, MetaRef, RefWidth};

#[cfg(not(feature = "ref32"))]
pub use layout::wide::{ClassMetadata, ClassMetadataRO};

#[cfg(feature = "ref32")]
pub use layout::narrow::{ClassMetadata, ClassMetadataRO};
