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

//! # Tessera Data
//!
//! Packs changing sets of source records into dense device arrays and builds
//! per-frame lookup tables from them.
//!
//! - [`indexed`]: the [`TypedIndexedBuffer`], one per record type, with stable,
//!   recycled slots and a grow/shrink rebuild policy.
//! - [`lut`]: the [`LutAllocator`], which composes lookup-table records from many
//!   writers and carves them out of one growable arena per kind.
//! - [`manager`]: the [`IndexedBufferManager`] that owns both and drives the
//!   per-frame update.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod indexed;
pub mod lut;
pub mod manager;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{ConfigError, IndexedBufferConfig, LutConfig, ManagerConfig};
pub use error::IndexedBufferError;
pub use indexed::{
    IndexedBufferHandle, IndexedBufferStats, ManagedBuffer, RecordFilter, SlotAllocator,
    TypedIndexedBuffer, UpdateOutcome,
};
pub use lut::{LutAllocator, LutArenaStats, LutKind, LutRecord, LutStats, SlotResolver};
pub use manager::{BufferOutcome, BufferSummary, FrameReport, IndexedBufferManager, ManagerStats};
