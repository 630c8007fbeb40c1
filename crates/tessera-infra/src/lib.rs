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

//! # Tessera Infra
//!
//! Concrete implementations of the contracts in `tessera-core`:
//!
//! - [`HostDevice`]: a device that keeps arrays in host memory and destroys
//!   retired arrays once the in-flight frames are over. Used by tests and demos.
//! - `WgpuBufferDevice` (feature `wgpu`): arrays as `wgpu` storage buffers.
//! - [`ThreadWorkerPool`]: a fixed set of worker threads fed by a channel.
//! - [`ObjectStore`] / [`TransformStore`]: in-memory record registries that
//!   track the per-frame diff, plus [`impl_record_source!`] to expose several
//!   stores through one scene type.

#![warn(missing_docs)]

pub mod device;
pub mod store;
pub mod workers;

pub use device::{HostDevice, HostDeviceStats};
#[cfg(feature = "wgpu")]
pub use device::WgpuBufferDevice;
pub use store::{ObjectStore, TransformStore};
pub use workers::ThreadWorkerPool;

#[doc(hidden)]
pub use tessera_core as __core;
