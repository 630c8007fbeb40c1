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

//! Debug-only single-owner checks.
//!
//! A [`ThreadOwnership`] records which thread currently operates on a value.
//! Claiming it from a second thread while the first still holds it is a
//! contract violation. In release builds both types are empty and every call
//! compiles to nothing.

#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(debug_assertions)]
const UNOWNED: u64 = 0;

#[cfg(debug_assertions)]
fn current_thread_token() -> u64 {
    static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TOKEN: u64 = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    }
    TOKEN.with(|token| *token)
}

/// Tracks the thread currently operating on a value.
#[derive(Debug, Default)]
pub struct ThreadOwnership {
    #[cfg(debug_assertions)]
    owner: AtomicU64,
}

impl ThreadOwnership {
    /// Creates an unowned tracker.
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            owner: AtomicU64::new(UNOWNED),
        }
    }

    /// Claims the value for the current thread until the guard is dropped.
    ///
    /// Re-claiming from the owning thread is allowed and nests.
    ///
    /// # Panics
    /// In debug builds, panics if another thread holds the claim.
    #[inline]
    pub fn claim<'a>(&'a self, what: &str) -> OwnershipGuard<'a> {
        #[cfg(debug_assertions)]
        {
            let me = current_thread_token();
            match self
                .owner
                .compare_exchange(UNOWNED, me, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => OwnershipGuard {
                    tracker: self,
                    release: true,
                },
                Err(owner) if owner == me => OwnershipGuard {
                    tracker: self,
                    release: false,
                },
                Err(_) => panic!("{what} is already being operated on by another thread"),
            }
        }
        #[cfg(not(debug_assertions))]
        {
            let _ = what;
            OwnershipGuard {
                _tracker: std::marker::PhantomData,
            }
        }
    }

    /// Returns `true` if some thread currently holds a claim.
    ///
    /// Always `false` in release builds.
    pub fn is_claimed(&self) -> bool {
        #[cfg(debug_assertions)]
        {
            self.owner.load(Ordering::Relaxed) != UNOWNED
        }
        #[cfg(not(debug_assertions))]
        {
            false
        }
    }
}

/// Releases a [`ThreadOwnership`] claim when dropped.
#[derive(Debug)]
#[must_use = "the claim is released as soon as the guard is dropped"]
pub struct OwnershipGuard<'a> {
    #[cfg(debug_assertions)]
    tracker: &'a ThreadOwnership,
    #[cfg(debug_assertions)]
    release: bool,
    #[cfg(not(debug_assertions))]
    _tracker: std::marker::PhantomData<&'a ThreadOwnership>,
}

impl Drop for OwnershipGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            if self.release {
                self.tracker.owner.store(UNOWNED, Ordering::Release);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn claim_is_released_on_drop() {
        let tracker = ThreadOwnership::new();
        {
            let _guard = tracker.claim("buffer");
            assert_eq!(tracker.is_claimed(), cfg!(debug_assertions));
        }
        assert!(!tracker.is_claimed());
    }

    #[test]
    fn nested_claim_on_same_thread_is_allowed() {
        let tracker = ThreadOwnership::new();
        let _outer = tracker.claim("buffer");
        {
            let _inner = tracker.claim("buffer");
        }
        assert_eq!(tracker.is_claimed(), cfg!(debug_assertions));
    }

    #[test]
    fn sequential_claims_from_different_threads_are_allowed() {
        let tracker = Arc::new(ThreadOwnership::new());
        drop(tracker.claim("buffer"));
        let t = Arc::clone(&tracker);
        thread::spawn(move || {
            let _guard = t.claim("buffer");
        })
        .join()
        .expect("second thread should be able to claim after release");
    }

    #[test]
    #[cfg(debug_assertions)]
    fn concurrent_claim_from_other_thread_panics() {
        let tracker = Arc::new(ThreadOwnership::new());
        let _guard = tracker.claim("buffer");
        let t = Arc::clone(&tracker);
        let result = thread::spawn(move || {
            let _guard = t.claim("buffer");
        })
        .join();
        assert!(result.is_err(), "claim from a second thread must panic");
    }
}
