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

//! The governor-wide rendering quality hint.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A rendering fidelity hint in `[0.5, 1.0]`.
///
/// Every constructor clamps, so a `QualityLevel` can never hold a value
/// outside the range.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct QualityLevel(f32);

impl QualityLevel {
    /// Lowest quality the controller will ever request.
    pub const MIN: f32 = 0.5;
    /// Full quality.
    pub const MAX: f32 = 1.0;

    /// Creates a level, clamping into `[MIN, MAX]`. NaN maps to `MAX`.
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self(Self::MAX);
        }
        // Rounded to three decimals so repeated small steps do not drift.
        let rounded = (value * 1000.0).round() / 1000.0;
        Self(rounded.clamp(Self::MIN, Self::MAX))
    }

    /// Returns the raw value.
    pub fn value(self) -> f32 {
        self.0
    }

    /// Returns the level lowered by `step`, floored at [`Self::MIN`].
    pub fn lowered(self, step: f32) -> Self {
        Self::new(self.0 - step.abs())
    }

    /// Returns the level raised by `step`, capped at [`Self::MAX`].
    pub fn raised(self, step: f32) -> Self {
        Self::new(self.0 + step.abs())
    }

    /// Returns `true` at full quality.
    pub fn is_max(self) -> bool {
        self.0 >= Self::MAX
    }

    /// Returns `true` at the quality floor.
    pub fn is_min(self) -> bool {
        self.0 <= Self::MIN
    }
}

impl Default for QualityLevel {
    fn default() -> Self {
        Self(Self::MAX)
    }
}

impl From<f32> for QualityLevel {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

impl From<QualityLevel> for f32 {
    fn from(level: QualityLevel) -> Self {
        level.0
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_into_range() {
        assert_eq!(QualityLevel::new(3.0).value(), 1.0);
        assert_eq!(QualityLevel::new(-1.0).value(), 0.5);
        assert_eq!(QualityLevel::new(f32::NAN).value(), 1.0);
        assert_eq!(QualityLevel::new(0.75).value(), 0.75);
    }

    #[test]
    fn test_steps_stop_at_bounds() {
        let mut level = QualityLevel::default();
        for _ in 0..20 {
            level = level.lowered(0.1);
        }
        assert!(level.is_min());
        for _ in 0..40 {
            level = level.raised(0.05);
        }
        assert!(level.is_max());
        assert_eq!(level.value(), 1.0);
    }

    #[test]
    fn test_repeated_steps_do_not_drift() {
        let level = QualityLevel::new(0.5).raised(0.05).raised(0.05).raised(0.05);
        assert_eq!(level.value(), 0.65);
    }
}
