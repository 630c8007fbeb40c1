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

//! Tuning constants for the indexed buffers and lookup-table arenas.
//!
//! None of these values are invariants; they trade memory against how often
//! buffers are rebuilt and can be loaded from any serde format.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A tuning constant was outside its accepted range.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An alignment or minimum capacity was zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// The offending field.
        field: &'static str,
    },
    /// A growth or shrink factor below 2 would rebuild on every size change.
    #[error("{field} must be at least 2, got {value}")]
    FactorTooSmall {
        /// The offending field.
        field: &'static str,
        /// The rejected value.
        value: u32,
    },
}

/// Capacity policy of a [`TypedIndexedBuffer`](crate::TypedIndexedBuffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexedBufferConfig {
    /// Capacities are rounded up to a multiple of this many elements.
    pub alignment: u32,
    /// A full rebuild shrinks the buffer once capacity exceeds `live * shrink_factor`.
    pub shrink_factor: u32,
}

impl Default for IndexedBufferConfig {
    fn default() -> Self {
        Self {
            alignment: 64,
            shrink_factor: 4,
        }
    }
}

impl IndexedBufferConfig {
    /// Checks every field against its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alignment == 0 {
            return Err(ConfigError::Zero { field: "alignment" });
        }
        if self.shrink_factor < 2 {
            return Err(ConfigError::FactorTooSmall {
                field: "shrink_factor",
                value: self.shrink_factor,
            });
        }
        Ok(())
    }
}

/// Arena policy of the [`LutAllocator`](crate::LutAllocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LutConfig {
    /// Arena capacities are rounded up to a multiple of this many records.
    pub alignment: u64,
    /// Arenas never shrink below this many records.
    pub min_capacity: u64,
    /// An overflowing arena is rebuilt at least this many times larger.
    pub growth_factor: u32,
    /// A frame is under-utilized when `demand * shrink_factor <= capacity`.
    pub shrink_factor: u32,
    /// Consecutive under-utilized frames before the arena shrinks.
    pub shrink_after_frames: u32,
}

impl Default for LutConfig {
    fn default() -> Self {
        Self {
            alignment: 64,
            min_capacity: 64,
            growth_factor: 2,
            shrink_factor: 4,
            shrink_after_frames: 8,
        }
    }
}

impl LutConfig {
    /// Checks every field against its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alignment == 0 {
            return Err(ConfigError::Zero { field: "alignment" });
        }
        if self.min_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "min_capacity",
            });
        }
        if self.shrink_after_frames == 0 {
            return Err(ConfigError::Zero {
                field: "shrink_after_frames",
            });
        }
        if self.growth_factor < 2 {
            return Err(ConfigError::FactorTooSmall {
                field: "growth_factor",
                value: self.growth_factor,
            });
        }
        if self.shrink_factor < 2 {
            return Err(ConfigError::FactorTooSmall {
                field: "shrink_factor",
                value: self.shrink_factor,
            });
        }
        Ok(())
    }
}

/// Settings of an [`IndexedBufferManager`](crate::IndexedBufferManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Policy shared by every indexed buffer the manager creates.
    pub indexed: IndexedBufferConfig,
    /// Policy shared by every lookup-table arena.
    pub lut: LutConfig,
    /// Fan buffer updates out to the worker pool when it has more than one worker.
    pub parallel_update: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            indexed: IndexedBufferConfig::default(),
            lut: LutConfig::default(),
            parallel_update: true,
        }
    }
}

impl ManagerConfig {
    /// Validates both nested policies.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.indexed.validate()?;
        self.lut.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(ManagerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_alignment_is_rejected() {
        let config = IndexedBufferConfig {
            alignment: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero { field: "alignment" })
        );
    }

    #[test]
    fn unit_growth_factor_is_rejected() {
        let config = LutConfig {
            growth_factor: 1,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(format!("{err}"), "growth_factor must be at least 2, got 1");
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: ManagerConfig =
            serde_json::from_str(r#"{ "lut": { "shrink_after_frames": 3 }, "parallel_update": false }"#)
                .unwrap();
        assert_eq!(config.lut.shrink_after_frames, 3);
        assert_eq!(config.lut.growth_factor, 2);
        assert_eq!(config.indexed, IndexedBufferConfig::default());
        assert!(!config.parallel_update);
    }
}
