//! Layout manifest
//!
//! A serializable description of every metadata structure for one reference
//! width. The code generator reads it instead of hard-coding offsets, and
//! [`LayoutManifest::assembler_constants`] renders the subset the hand-written
//! runtime stubs include.

use std::mem::{align_of, offset_of, size_of};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::data_ref::{DataRef, DataRef32};
use crate::init_state::{
    ClassInitState, InitStateCell, PAGE_SIZE, SEGV_ADDR_CLASS_INIT_FAILED,
    SEGV_ADDR_CLASS_INIT_STATE_MAX, SEGV_ADDR_CLASS_INIT_STATE_MIN, SEGV_ADDR_CLASS_INITIALIZING,
    SEGV_ADDR_CLASS_UNINITIALIZED,
};
use crate::layout::{MethodDesc, narrow, wide};
use crate::offset::RelOffset32;
use crate::types::RefWidth;

/// One field of a structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    /// Field name
    pub name: String,
    /// Byte offset from the start of the structure
    pub offset: usize,
    /// Size in bytes
    pub size: usize,
}

/// One structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructLayout {
    /// Structure name
    pub name: String,
    /// Total size in bytes
    pub size: usize,
    /// Required alignment
    pub align: usize,
    /// Fields in declaration order
    pub fields: Vec<FieldLayout>,
}

impl StructLayout {
    /// Field by name
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

macro_rules! struct_layout {
    ($ty:ty, $name:literal, { $($field:ident: $fty:ty),* $(,)? }) => {
        StructLayout {
            name: $name.to_string(),
            size: size_of::<$ty>(),
            align: align_of::<$ty>(),
            fields: vec![$(
                FieldLayout {
                    name: stringify!($field).trim_start_matches('_').to_string(),
                    offset: offset_of!($ty, $field),
                    size: size_of::<$fty>(),
                }
            ),*],
        }
    };
}

/// Every metadata structure for one reference width
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutManifest {
    /// Reference width the layouts belong to
    pub ref_width: RefWidth,
    /// Size of the reserved page
    pub page_size: usize,
    /// Raw init-state values, `Min` through `Max`
    pub init_state_addresses: [usize; 5],
    /// Structures
    pub structs: Vec<StructLayout>,
    #[serde(skip)]
    index: FxHashMap<String, usize>,
}

impl LayoutManifest {
    /// Manifest for the width this crate was built with
    pub fn active() -> Self {
        Self::for_width(RefWidth::ACTIVE)
    }

    /// Manifest for `width`
    pub fn for_width(width: RefWidth) -> Self {
        let (ro, meta) = match width {
            RefWidth::Wide => (
                struct_layout!(wide::ClassMetadataRO, "class_metadata_ro", {
                    class_name: DataRef,
                    fields: DataRef,
                    methods: DataRef,
                    parent: DataRef,
                    num_of_fields: u16,
                    num_of_methods: u16,
                    flag: u16,
                    num_of_superclasses: u16,
                    _padding: u32,
                    modifier: u32,
                    annotation: RelOffset32,
                    clinit_addr: RelOffset32,
                }),
                struct_layout!(wide::ClassMetadata, "class_metadata", {
                    shadow: usize,
                    monitor: i32,
                    cl_index: u16,
                    size_info: u16,
                    itable: usize,
                    vtable: usize,
                    gctib: usize,
                    class_info_ro: DataRef,
                    init_state: InitStateCell,
                }),
            ),
            RefWidth::Narrow => (
                struct_layout!(narrow::ClassMetadataRO, "class_metadata_ro", {
                    class_name: DataRef,
                    fields: DataRef,
                    methods: DataRef,
                    parent: DataRef,
                    num_of_fields: u16,
                    num_of_methods: u16,
                    modifier: u32,
                    annotation: RelOffset32,
                    clinit_addr: RelOffset32,
                }),
                struct_layout!(narrow::ClassMetadata, "class_metadata", {
                    shadow: u32,
                    monitor: i32,
                    cl_index: u16,
                    size_info: u16,
                    flag: u16,
                    num_of_superclasses: u16,
                    itable: usize,
                    vtable: usize,
                    gctib: usize,
                    class_info_ro: DataRef32,
                    cache_false_class: u32,
                    init_state: InitStateCell,
                }),
            ),
        };
        let desc = struct_layout!(MethodDesc, "method_desc", {
            metadata_offset: u32,
            local_ref_offset: u16,
            local_ref_number: u16,
        });

        let mut manifest = Self {
            ref_width: width,
            page_size: PAGE_SIZE,
            init_state_addresses: [
                SEGV_ADDR_CLASS_INIT_STATE_MIN,
                SEGV_ADDR_CLASS_UNINITIALIZED,
                SEGV_ADDR_CLASS_INITIALIZING,
                SEGV_ADDR_CLASS_INIT_FAILED,
                SEGV_ADDR_CLASS_INIT_STATE_MAX,
            ],
            structs: vec![ro, meta, desc],
            index: FxHashMap::default(),
        };
        manifest.rebuild_index();
        manifest
    }

    /// Parse a manifest previously produced by [`LayoutManifest::to_json`]
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let mut manifest: Self = serde_json::from_str(json)?;
        manifest.rebuild_index();
        Ok(manifest)
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .structs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
    }

    /// Structure by name
    pub fn get(&self, name: &str) -> Option<&StructLayout> {
        self.index.get(name).map(|&i| &self.structs[i])
    }

    /// Offset of `structure.field`
    pub fn field_offset(&self, structure: &str, field: &str) -> Option<usize> {
        self.get(structure)?.field(field).map(|f| f.offset)
    }

    /// `.equ` lines for runtime assembly stubs
    pub fn assembler_constants(&self) -> String {
        let mut out = String::new();
        for s in &self.structs {
            let prefix = s.name.to_uppercase();
            out.push_str(&format!(".equ {prefix}_SIZE, {}\n", s.size));
            for f in &s.fields {
                out.push_str(&format!(
                    ".equ {prefix}_{}_OFFSET, {}\n",
                    f.name.to_uppercase(),
                    f.offset
                ));
            }
        }
        for (state, raw) in [
            (ClassInitState::Uninitialized, SEGV_ADDR_CLASS_UNINITIALIZED),
            (ClassInitState::Initializing, SEGV_ADDR_CLASS_INITIALIZING),
            (ClassInitState::Failed, SEGV_ADDR_CLASS_INIT_FAILED),
        ] {
            let name = format!("{state:?}").to_uppercase();
            out.push_str(&format!(".equ CLASS_INIT_STATE_{name}, {raw}\n"));
        }
        out
    }
}
