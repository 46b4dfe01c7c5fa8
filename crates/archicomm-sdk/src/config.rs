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

//! Governor configuration.
//!
//! Every section is optional in JSON; missing fields take their defaults.
//! Durations are expressed in milliseconds (`*_ms` fields).

use archicomm_control::QualityConfig;
use archicomm_core::budget::PerformanceBudget;
use archicomm_core::error::GovernorResult;
use archicomm_core::quality::QualityLevel;
use archicomm_core::render::TargetKind;
use archicomm_guard::{BreakerConfig, UpdateDepthConfig};
use archicomm_telemetry::MonitorConfig;
use archicomm_workers::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Complete configuration of a [`Governor`](crate::Governor).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Metrics history.
    pub monitor: MonitorConfig,
    /// Worker pool.
    pub scheduler: SchedulerConfig,
    /// Adaptive quality and tick period.
    pub quality: QualityConfig,
    /// Per-source update-rate breaker.
    pub breaker: BreakerConfig,
    /// Global update-depth monitor.
    pub depth: UpdateDepthConfig,
    /// Replacements for the built-in per-kind default budgets.
    pub kind_budgets: BTreeMap<TargetKind, PerformanceBudget>,
}

impl GovernorConfig {
    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> GovernorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> GovernorResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn to_file(&self, path: impl AsRef<Path>) -> GovernorResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Returns a copy with unusable values replaced by usable ones.
    ///
    /// Every correction is logged as a warning.
    pub fn validated(mut self) -> Self {
        let defaults = GovernorConfig::default();

        if self.monitor.history_size == 0 {
            log::warn!("Config: monitor.history_size must be >= 1, using 1.");
            self.monitor.history_size = 1;
        }
        if self.scheduler.init_timeout_ms == 0 {
            log::warn!("Config: scheduler.init_timeout_ms must be > 0, using the default.");
            self.scheduler.init_timeout_ms = defaults.scheduler.init_timeout_ms;
        }

        let q = &mut self.quality;
        if !(q.target_fps.is_finite() && q.target_fps > 0.0) {
            log::warn!("Config: quality.target_fps must be positive, using the default.");
            q.target_fps = defaults.quality.target_fps;
        }
        if q.tick_interval_ms == 0 {
            log::warn!("Config: quality.tick_interval_ms must be > 0, using the default.");
            q.tick_interval_ms = defaults.quality.tick_interval_ms;
        }
        if !(q.lower_band > 0.0 && q.upper_band > 0.0) {
            log::warn!("Config: quality bands must be positive, using the defaults.");
            q.lower_band = defaults.quality.lower_band;
            q.upper_band = defaults.quality.upper_band;
        }
        if q.lower_band > q.upper_band {
            log::warn!("Config: quality bands out of order, swapping them.");
            std::mem::swap(&mut q.lower_band, &mut q.upper_band);
        }
        if !(q.step_down.is_finite() && q.step_down > 0.0) {
            q.step_down = defaults.quality.step_down;
        }
        if !(q.step_up.is_finite() && q.step_up > 0.0) {
            q.step_up = defaults.quality.step_up;
        }
        q.min_level = QualityLevel::new(q.min_level).value();
        q.max_level = QualityLevel::new(q.max_level).value();
        if q.min_level > q.max_level {
            log::warn!("Config: quality.min_level above max_level, swapping them.");
            std::mem::swap(&mut q.min_level, &mut q.max_level);
        }

        let b = &mut self.breaker;
        if b.window_ms == 0 {
            b.window_ms = defaults.breaker.window_ms;
        }
        if b.error_threshold == 0 {
            log::warn!("Config: breaker.error_threshold must be >= 1, using 1.");
            b.error_threshold = 1;
        }
        if b.warning_threshold == 0 || b.warning_threshold > b.error_threshold {
            log::warn!("Config: breaker.warning_threshold clamped to [1, error_threshold].");
            b.warning_threshold = b.warning_threshold.clamp(1, b.error_threshold);
        }

        let d = &mut self.depth;
        if d.window_ms == 0 {
            d.window_ms = defaults.depth.window_ms;
        }
        d.max_updates_per_component = d.max_updates_per_component.max(1);
        d.max_updates_per_second = d.max_updates_per_second.max(1);

        self
    }
}
