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

/// Checks a caller contract.
///
/// A violated contract is a bug in the caller or in the diff-producing source. In
/// debug builds it panics with the given message; in release builds it is logged
/// at `error` level and execution continues. Evaluates to `true` when the
/// condition held, so callers can skip work that would be meaningless otherwise.
///
/// ```
/// # use tessera_core::contract;
/// let free_slots: Vec<u32> = vec![0, 1];
/// if contract!(!free_slots.is_empty(), "free-slot exhaustion") {
///     // safe to pop
/// }
/// ```
#[macro_export]
macro_rules! contract {
    ($cond:expr, $($arg:tt)+) => {{
        let held: bool = $cond;
        if !held {
            if cfg!(debug_assertions) {
                panic!($($arg)+);
            } else {
                $crate::__log::error!($($arg)+);
            }
        }
        held
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn held_contract_evaluates_true() {
        assert!(crate::contract!(1 + 1 == 2, "arithmetic"));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "id RecordId(4) was never registered")]
    fn violated_contract_panics_in_debug() {
        let id = crate::RecordId(4);
        let _ = crate::contract!(false, "id {id:?} was never registered");
    }
}
