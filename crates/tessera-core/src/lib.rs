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

//! # Tessera Core
//!
//! Foundational crate containing the traits, core types, and interface contracts
//! shared by the indexed-buffer and lookup-table subsystem.
//!
//! The contracts defined here describe the 'what': an opaque device buffer
//! capability ([`DeviceBufferFactory`]), the authoritative per-type record diff
//! ([`RecordSource`]), and a job queue ([`WorkerPool`]). The 'how' lives in
//! `tessera-infra` (concrete backends) and `tessera-data` (the allocators).

#![warn(missing_docs)]

pub mod buffer;
pub mod device;
pub mod error;
pub mod record;
pub mod utils;
pub mod worker;

pub use buffer::{ArrayBufferDescriptor, BufferId, BufferInput, BufferUsage, MemoryPool};
pub use device::{DeviceBufferFactory, MAX_FRAMES_IN_FLIGHT};
pub use error::ResourceError;
pub use record::{Namespace, RecordId, RecordKey, RecordSource, TransformId, INVALID_INDEX};
pub use worker::{run_job, InlineWorkerPool, Job, JobHandle, JobPanic, WorkerPool};

#[doc(hidden)]
pub use log as __log;
