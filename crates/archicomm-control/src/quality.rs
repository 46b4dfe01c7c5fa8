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

//! Adaptive quality control.

use crate::analysis::TargetReading;
use archicomm_core::quality::QualityLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of the [`QualityController`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Frame rate the controller steers toward.
    pub target_fps: f64,
    /// Period of the monitoring tick, in milliseconds.
    pub tick_interval_ms: u64,
    /// Below `target_fps * lower_band` the level is lowered.
    pub lower_band: f64,
    /// Above `target_fps * upper_band` the level is raised.
    pub upper_band: f64,
    /// Decrement applied per tick when under the lower band.
    pub step_down: f32,
    /// Increment applied per tick when over the upper band.
    pub step_up: f32,
    /// Floor of the level, within [`QualityLevel::MIN`]..=[`QualityLevel::MAX`].
    pub min_level: f32,
    /// Ceiling of the level, within [`QualityLevel::MIN`]..=[`QualityLevel::MAX`].
    pub max_level: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            tick_interval_ms: 500,
            lower_band: 0.8,
            upper_band: 0.95,
            step_down: 0.1,
            step_up: 0.05,
            min_level: QualityLevel::MIN,
            max_level: QualityLevel::MAX,
        }
    }
}

impl QualityConfig {
    /// The monitoring tick period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Steers the global quality level toward the target frame rate.
///
/// Moves one small step per tick at most and holds the level while the
/// aggregate frame rate sits between the two bands.
#[derive(Debug, Clone)]
pub struct QualityController {
    config: QualityConfig,
    level: QualityLevel,
}

impl QualityController {
    /// Creates a controller at the configured ceiling.
    pub fn new(config: QualityConfig) -> Self {
        let level = QualityLevel::new(config.max_level);
        Self { config, level }
    }

    /// The active configuration.
    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// The current level.
    pub fn level(&self) -> QualityLevel {
        self.level
    }

    /// Mean frame rate of the targets that completed at least one frame.
    ///
    /// With none reporting the target frame rate is returned, which keeps the
    /// level where it is (or lets it recover).
    pub fn aggregate_fps(&self, readings: &[TargetReading]) -> f64 {
        let (sum, count) = readings
            .iter()
            .filter(|r| r.metrics.has_frames())
            .fold((0.0, 0usize), |(sum, count), r| (sum + r.metrics.fps, count + 1));
        if count == 0 {
            self.config.target_fps
        } else {
            sum / count as f64
        }
    }

    /// Runs one control step. Returns the new level if it changed.
    pub fn tick(&mut self, aggregate_fps: f64) -> Option<QualityLevel> {
        let target = self.config.target_fps;
        let next = if aggregate_fps < target * self.config.lower_band {
            self.clamped(self.level.lowered(self.config.step_down))
        } else if aggregate_fps > target * self.config.upper_band && !self.at_ceiling() {
            self.clamped(self.level.raised(self.config.step_up))
        } else {
            self.level
        };

        if next == self.level {
            return None;
        }
        log::info!(
            "Quality: {} -> {} (aggregate {:.1} fps, target {:.1})",
            self.level,
            next,
            aggregate_fps,
            target
        );
        self.level = next;
        Some(next)
    }

    fn at_ceiling(&self) -> bool {
        self.level.value() >= self.config.max_level || self.level.is_max()
    }

    fn clamped(&self, level: QualityLevel) -> QualityLevel {
        QualityLevel::new(level.value().clamp(self.config.min_level, self.config.max_level))
    }
}

impl Default for QualityController {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_fps_lowers_in_steps_down_to_floor() {
        let mut controller = QualityController::default();
        assert_eq!(controller.tick(20.0).map(QualityLevel::value), Some(0.9));
        assert_eq!(controller.tick(20.0).map(QualityLevel::value), Some(0.8));
        for _ in 0..20 {
            controller.tick(0.0);
        }
        assert_eq!(controller.level().value(), 0.5);
        assert_eq!(controller.tick(0.0), None);
    }

    #[test]
    fn test_high_fps_recovers_to_ceiling() {
        let mut controller = QualityController::default();
        for _ in 0..5 {
            controller.tick(10.0);
        }
        assert_eq!(controller.level().value(), 0.5);
        assert_eq!(controller.tick(60.0).map(QualityLevel::value), Some(0.55));
        for _ in 0..50 {
            controller.tick(60.0);
        }
        assert_eq!(controller.level().value(), 1.0);
        assert_eq!(controller.tick(60.0), None);
    }

    #[test]
    fn test_between_bands_holds_for_100_ticks() {
        let mut controller = QualityController::default();
        controller.tick(0.0);
        let before = controller.level();
        for _ in 0..100 {
            assert_eq!(controller.tick(60.0 * 0.85), None);
        }
        assert_eq!(controller.level(), before);
    }

    #[test]
    fn test_level_stays_in_range_for_extreme_inputs() {
        let mut controller = QualityController::default();
        for fps in [f64::MAX, -1.0, 0.0, f64::INFINITY, 1e-9, 1e12, f64::NAN] {
            for _ in 0..30 {
                controller.tick(fps);
                let v = controller.level().value();
                assert!((0.5..=1.0).contains(&v));
            }
        }
    }

    #[test]
    fn test_narrowed_levels_are_respected() {
        let mut controller = QualityController::new(QualityConfig {
            min_level: 0.7,
            max_level: 0.9,
            ..Default::default()
        });
        assert_eq!(controller.level().value(), 0.9);
        for _ in 0..10 {
            controller.tick(0.0);
        }
        assert_eq!(controller.level().value(), 0.7);
        for _ in 0..10 {
            controller.tick(100.0);
        }
        assert_eq!(controller.level().value(), 0.9);
    }

    #[test]
    fn test_config_tick_interval() {
        let config: QualityConfig = serde_json::from_str(r#"{"tick_interval_ms": 250}"#).unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(250));
        assert_eq!(config.target_fps, 60.0);
    }
}
