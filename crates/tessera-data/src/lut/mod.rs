// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-frame lookup tables built from indexed-buffer slots.
//!
//! A lookup table is an array of small fixed-layout records, one per requested
//! [`RecordId`](tessera_core::RecordId). Each record kind ([`LutRecord`]) gathers
//! its fields from several writers, each tied to one indexed buffer: the writer
//! receives the id's slot in that buffer and fills in its part of the record.
//!
//! Finished tables are carved out of one growable device arena per kind and
//! are only valid for the frame they were built in.

mod allocator;
mod arena;

pub use allocator::{LutAllocator, LutStats};
pub use arena::LutArenaStats;

use crate::indexed::IndexedBufferHandle;
use bytemuck::Pod;
use tessera_core::utils::fnv1a_64;
use tessera_core::RecordId;

/// The stable tag of a lookup-table record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LutKind(u64);

impl LutKind {
    /// Derives the tag of a kind from its name.
    pub const fn of(name: &str) -> Self {
        Self(fnv1a_64(name))
    }

    /// The raw tag value.
    pub fn tag(self) -> u64 {
        self.0
    }
}

/// A lookup-table record kind.
///
/// The zeroed value is the record's default; writers only touch the fields
/// they own.
///
/// ```
/// use bytemuck::{Pod, Zeroable};
/// use tessera_data::LutRecord;
///
/// #[repr(C)]
/// #[derive(Clone, Copy, Pod, Zeroable)]
/// struct DrawLut {
///     transform: u32,
///     material: u32,
/// }
///
/// impl LutRecord for DrawLut {
///     const NAME: &'static str = "DrawLut";
/// }
///
/// assert_ne!(DrawLut::KIND.tag(), 0);
/// ```
pub trait LutRecord: Pod + Send + Sync {
    /// Human-readable kind name, also used as the arena's device label.
    const NAME: &'static str;
    /// Tag identifying the kind in registries.
    const KIND: LutKind = LutKind::of(Self::NAME);
}

/// Resolves the slot of a record inside one of the manager's indexed buffers.
pub trait SlotResolver {
    /// Slot of `id` in `buffer`, or [`INVALID_INDEX`](tessera_core::INVALID_INDEX).
    fn slot_of(&self, buffer: IndexedBufferHandle, id: RecordId) -> u32;
}
