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

//! Serializable snapshot of the governor state.

use archicomm_control::AggregatedMetrics;
use archicomm_core::budget::PerformanceBudget;
use archicomm_core::error::GovernorResult;
use archicomm_core::quality::QualityLevel;
use archicomm_core::recommendation::Recommendation;
use archicomm_core::render::RenderTargetId;
use archicomm_guard::BreakerSnapshot;
use archicomm_telemetry::MetricSummary;
use archicomm_workers::{SchedulerStats, TargetSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Everything a diagnostics panel or a bug report needs.
///
/// Re-applying `budgets` through
/// [`Governor::set_budget`](crate::Governor::set_budget) reproduces the
/// exported budget state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceExport {
    /// Wall-clock time of the export, in milliseconds since the Unix epoch.
    pub generated_at_unix_ms: u64,
    /// Current quality level.
    pub quality_level: QualityLevel,
    /// Governor-wide rollup.
    pub aggregated: AggregatedMetrics,
    /// Resolved budget of every registered target.
    pub budgets: BTreeMap<RenderTargetId, PerformanceBudget>,
    /// Every registered target.
    pub targets: Vec<TargetSnapshot>,
    /// Summary statistics of every recorded metric.
    pub metrics: Vec<MetricSummary>,
    /// Active recommendations, most relevant first.
    pub recommendations: Vec<Recommendation>,
    /// Status of every known update source.
    pub breakers: Vec<BreakerSnapshot>,
    /// Whether the update-depth monitor is in emergency mode.
    pub emergency_active: bool,
    /// Worker pool counters.
    pub scheduler: SchedulerStats,
}

impl PerformanceExport {
    /// Serializes as pretty-printed JSON.
    pub fn to_json(&self) -> GovernorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses an export.
    pub fn from_json(json: &str) -> GovernorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the export to a JSON file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> GovernorResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
