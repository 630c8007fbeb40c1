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

//! Defines the error type reported by the device layer.

use crate::buffer::BufferId;
use thiserror::Error;

/// An error related to the creation or use of a device buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The buffer handle does not refer to a live (or retired but not yet destroyed) buffer.
    #[error("Buffer not found: {0:?}")]
    NotFound(BufferId),
    /// A commit would have written past the end of the buffer.
    #[error("Commit out of bounds on {buffer:?}: {offset}+{len} bytes exceeds {size} bytes")]
    OutOfBounds {
        /// The buffer that was written to.
        buffer: BufferId,
        /// Byte offset of the write.
        offset: u64,
        /// Length of the write in bytes.
        len: u64,
        /// Size of the buffer in bytes.
        size: u64,
    },
    /// The descriptor asked for something the device cannot create, such as a zero stride.
    #[error("Invalid buffer descriptor '{label}': {reason}")]
    InvalidDescriptor {
        /// The label of the rejected buffer.
        label: String,
        /// Why the descriptor was rejected.
        reason: String,
    },
    /// An error originating from the specific graphics backend implementation.
    #[error("Backend-specific resource error: {0}")]
    Backend(String),
}
