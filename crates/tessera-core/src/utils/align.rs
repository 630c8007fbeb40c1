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

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` does not have to be a power of two. Zero stays zero.
///
/// # Panics
/// Panics if `alignment` is zero.
pub const fn align_up(value: u32, alignment: u32) -> u32 {
    assert!(alignment > 0, "alignment must be non-zero");
    value.div_ceil(alignment) * alignment
}

/// [`align_up`] for 64-bit sizes.
///
/// # Panics
/// Panics if `alignment` is zero.
pub const fn align_up_u64(value: u64, alignment: u64) -> u64 {
    assert!(alignment > 0, "alignment must be non-zero");
    value.div_ceil(alignment) * alignment
}
