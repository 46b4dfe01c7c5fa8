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

//! Budget evaluation.
//!
//! The `BudgetEvaluator` compares the latest metrics snapshot of every target
//! against its resolved [`PerformanceBudget`] and turns violations into
//! [`Recommendation`]s. It is stateless: deduplication across ticks relies on
//! messages never embedding live values.

use archicomm_core::budget::PerformanceBudget;
use archicomm_core::recommendation::Recommendation;
use archicomm_core::render::{RenderTargetId, TargetKind, TargetMetrics};
use serde::{Deserialize, Serialize};

/// Weight of the frame rate in the health score.
const SCORE_FPS_WEIGHT: f64 = 60.0;
/// Weight of render-time compliance in the health score.
const SCORE_RENDER_TIME_WEIGHT: f64 = 20.0;
/// Weight of memory compliance in the health score.
const SCORE_MEMORY_WEIGHT: f64 = 20.0;

/// A target's metrics paired with the budget it resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetReading {
    /// Target identity.
    pub id: RenderTargetId,
    /// Backend kind.
    pub kind: TargetKind,
    /// Latest metrics snapshot.
    pub metrics: TargetMetrics,
    /// Resolved budget.
    pub budget: PerformanceBudget,
}

impl TargetReading {
    fn within_render_time(&self) -> bool {
        self.metrics.render_time_ms <= self.budget.max_render_time_ms
    }

    fn within_memory(&self) -> bool {
        self.metrics.memory_mb <= self.budget.max_memory_mb
    }
}

/// Governor-wide rollup of the target metrics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    /// Mean frame rate of the targets that completed a frame (`0.0` if none).
    pub avg_fps: f64,
    /// Sum of the last render times, in milliseconds.
    pub total_render_time_ms: f64,
    /// Sum of the reported memory, in megabytes.
    pub total_memory_mb: f64,
    /// Workers currently rendering.
    pub active_workers: usize,
    /// Health score in `0..=100`.
    pub score: f64,
}

/// Checks targets against their budgets.
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetEvaluator;

impl BudgetEvaluator {
    /// Raises one recommendation per violated budget field.
    ///
    /// A target that has not completed a frame yet is not checked for frame
    /// rate. The result is deduplicated, critical first, capped.
    pub fn check_budgets(&self, readings: &[TargetReading]) -> Vec<Recommendation> {
        let mut raised = Vec::new();

        for reading in readings {
            let TargetReading {
                id,
                kind,
                metrics,
                budget,
            } = reading;

            if metrics.has_frames() && metrics.fps < budget.min_fps {
                log::debug!("Budget: '{id}' below frame rate budget ({:.1} fps).", metrics.fps);
                raised.push(Recommendation::warning(
                    "Frame rate below budget",
                    "Lower the rendering quality or reduce the number of visible elements",
                    format!("{id} ({kind}): {:.1} fps < {:.1} fps", metrics.fps, budget.min_fps),
                ));
            }

            if !reading.within_render_time() {
                log::debug!(
                    "Budget: '{id}' over render time budget ({:.2} ms).",
                    metrics.render_time_ms
                );
                raised.push(Recommendation::warning(
                    "Render time exceeds budget",
                    "Enable level-of-detail culling or simplify the diagram",
                    format!(
                        "{id} ({kind}): {:.2} ms > {:.2} ms",
                        metrics.render_time_ms, budget.max_render_time_ms
                    ),
                ));
            }

            if !reading.within_memory() {
                log::warn!(
                    "Budget: '{id}' over memory budget ({:.1} MB).",
                    metrics.memory_mb
                );
                raised.push(Recommendation::critical(
                    "Memory usage exceeds budget",
                    "Release cached resources or split the diagram",
                    format!(
                        "{id} ({kind}): {:.1} MB > {:.1} MB",
                        metrics.memory_mb, budget.max_memory_mb
                    ),
                ));
            }

            if metrics.complexity > budget.max_complexity {
                raised.push(Recommendation::warning(
                    "Scene complexity exceeds budget",
                    "Collapse groups or paginate the diagram",
                    format!(
                        "{id} ({kind}): {} elements > {}",
                        metrics.complexity, budget.max_complexity
                    ),
                ));
            }
        }

        Recommendation::prioritize(raised)
    }

    /// Rolls the readings up into governor-wide figures.
    ///
    /// The score gives [`SCORE_FPS_WEIGHT`] points to the mean frame rate
    /// relative to `target_fps` and splits the rest between the share of
    /// targets within their render-time and memory budgets. With no target
    /// reporting yet the score is 100.
    pub fn aggregate(
        &self,
        readings: &[TargetReading],
        active_workers: usize,
        target_fps: f64,
    ) -> AggregatedMetrics {
        let reporting: Vec<&TargetReading> =
            readings.iter().filter(|r| r.metrics.has_frames()).collect();

        let avg_fps = if reporting.is_empty() {
            0.0
        } else {
            reporting.iter().map(|r| r.metrics.fps).sum::<f64>() / reporting.len() as f64
        };

        let score = if reporting.is_empty() {
            100.0
        } else {
            let count = reporting.len() as f64;
            let fps_ratio = if target_fps > 0.0 {
                (avg_fps / target_fps).clamp(0.0, 1.0)
            } else {
                1.0
            };
            let render_ok = reporting.iter().filter(|r| r.within_render_time()).count() as f64;
            let memory_ok = reporting.iter().filter(|r| r.within_memory()).count() as f64;
            fps_ratio * SCORE_FPS_WEIGHT
                + render_ok / count * SCORE_RENDER_TIME_WEIGHT
                + memory_ok / count * SCORE_MEMORY_WEIGHT
        };

        AggregatedMetrics {
            avg_fps,
            total_render_time_ms: readings.iter().map(|r| r.metrics.render_time_ms).sum(),
            total_memory_mb: readings.iter().map(|r| r.metrics.memory_mb).sum(),
            active_workers,
            score: (score * 10.0).round() / 10.0,
        }
    }
}
