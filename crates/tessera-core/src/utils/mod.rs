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

//! Shared helpers: rounding, tag hashing, ownership checks, and contract assertions.

mod align;
mod contract;
mod hash;
mod ownership;

pub use self::align::{align_up, align_up_u64};
pub use self::hash::fnv1a_64;
pub use self::ownership::{OwnershipGuard, ThreadOwnership};
