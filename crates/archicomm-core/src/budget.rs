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

//! Performance budgets and their per-target overrides.

use crate::render::{RenderTargetId, TargetKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declared thresholds a render target should not exceed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBudget {
    /// Maximum time a single frame may take, in milliseconds.
    pub max_render_time_ms: f64,
    /// Maximum memory the target may hold, in megabytes.
    pub max_memory_mb: f64,
    /// Minimum sustained frame rate.
    pub min_fps: f64,
    /// Maximum number of drawn elements per frame.
    pub max_complexity: u32,
}

impl PerformanceBudget {
    /// Returns the built-in default budget for a backend kind.
    ///
    /// | Kind | render ms | memory MB | min FPS | complexity |
    /// |---|---|---|---|---|
    /// | Canvas2d | 16 | 100 | 30 | 1000 |
    /// | WebGl | 16 | 200 | 45 | 5000 |
    /// | Svg | 33 | 50 | 24 | 500 |
    pub fn for_kind(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Canvas2d => Self {
                max_render_time_ms: 16.0,
                max_memory_mb: 100.0,
                min_fps: 30.0,
                max_complexity: 1000,
            },
            TargetKind::WebGl => Self {
                max_render_time_ms: 16.0,
                max_memory_mb: 200.0,
                min_fps: 45.0,
                max_complexity: 5000,
            },
            TargetKind::Svg => Self {
                max_render_time_ms: 33.0,
                max_memory_mb: 50.0,
                min_fps: 24.0,
                max_complexity: 500,
            },
        }
    }

    /// Returns this budget with every field set in `patch` replaced.
    pub fn patched(mut self, patch: &BudgetOverride) -> Self {
        if let Some(v) = patch.max_render_time_ms {
            self.max_render_time_ms = v;
        }
        if let Some(v) = patch.max_memory_mb {
            self.max_memory_mb = v;
        }
        if let Some(v) = patch.min_fps {
            self.min_fps = v;
        }
        if let Some(v) = patch.max_complexity {
            self.max_complexity = v;
        }
        self
    }
}

/// A partial budget: any field left as `None` falls back to the kind default.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetOverride {
    /// See [`PerformanceBudget::max_render_time_ms`].
    pub max_render_time_ms: Option<f64>,
    /// See [`PerformanceBudget::max_memory_mb`].
    pub max_memory_mb: Option<f64>,
    /// See [`PerformanceBudget::min_fps`].
    pub min_fps: Option<f64>,
    /// See [`PerformanceBudget::max_complexity`].
    pub max_complexity: Option<u32>,
}

impl BudgetOverride {
    /// Sets the render time ceiling.
    pub fn max_render_time_ms(mut self, value: f64) -> Self {
        self.max_render_time_ms = Some(value);
        self
    }

    /// Sets the memory ceiling.
    pub fn max_memory_mb(mut self, value: f64) -> Self {
        self.max_memory_mb = Some(value);
        self
    }

    /// Sets the frame rate floor.
    pub fn min_fps(mut self, value: f64) -> Self {
        self.min_fps = Some(value);
        self
    }

    /// Sets the complexity ceiling.
    pub fn max_complexity(mut self, value: u32) -> Self {
        self.max_complexity = Some(value);
        self
    }

    /// Folds `later` on top of `self`; fields set in `later` win.
    pub fn merge(&mut self, later: &BudgetOverride) {
        self.max_render_time_ms = later.max_render_time_ms.or(self.max_render_time_ms);
        self.max_memory_mb = later.max_memory_mb.or(self.max_memory_mb);
        self.min_fps = later.min_fps.or(self.min_fps);
        self.max_complexity = later.max_complexity.or(self.max_complexity);
    }

    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.max_render_time_ms.is_none()
            && self.max_memory_mb.is_none()
            && self.min_fps.is_none()
            && self.max_complexity.is_none()
    }
}

impl From<PerformanceBudget> for BudgetOverride {
    fn from(budget: PerformanceBudget) -> Self {
        Self {
            max_render_time_ms: Some(budget.max_render_time_ms),
            max_memory_mb: Some(budget.max_memory_mb),
            min_fps: Some(budget.min_fps),
            max_complexity: Some(budget.max_complexity),
        }
    }
}

/// Kind defaults plus per-target overrides.
///
/// A target always resolves to some budget: its override patched over the
/// default of its kind.
#[derive(Debug, Clone)]
pub struct BudgetRegistry {
    defaults: HashMap<TargetKind, PerformanceBudget>,
    overrides: HashMap<RenderTargetId, BudgetOverride>,
}

impl BudgetRegistry {
    /// Creates a registry holding the built-in kind defaults.
    pub fn new() -> Self {
        Self {
            defaults: TargetKind::ALL
                .iter()
                .map(|kind| (*kind, PerformanceBudget::for_kind(*kind)))
                .collect(),
            overrides: HashMap::new(),
        }
    }

    /// Replaces the default budget of a kind.
    pub fn set_kind_default(&mut self, kind: TargetKind, budget: PerformanceBudget) {
        self.defaults.insert(kind, budget);
    }

    /// Returns the default budget of a kind.
    pub fn kind_default(&self, kind: TargetKind) -> PerformanceBudget {
        self.defaults
            .get(&kind)
            .copied()
            .unwrap_or_else(|| PerformanceBudget::for_kind(kind))
    }

    /// Merges a partial override into the target's existing override.
    pub fn apply(&mut self, id: RenderTargetId, patch: BudgetOverride) {
        if patch.is_empty() {
            return;
        }
        self.overrides.entry(id).or_default().merge(&patch);
    }

    /// Drops any override held for the target.
    pub fn remove(&mut self, id: &RenderTargetId) {
        self.overrides.remove(id);
    }

    /// Returns the explicit override of a target, if any.
    pub fn override_for(&self, id: &RenderTargetId) -> Option<&BudgetOverride> {
        self.overrides.get(id)
    }

    /// Resolves the effective budget of a target of the given kind.
    pub fn resolve(&self, id: &RenderTargetId, kind: TargetKind) -> PerformanceBudget {
        let base = self.kind_default(kind);
        match self.overrides.get(id) {
            Some(patch) => base.patched(patch),
            None => base,
        }
    }
}

impl Default for BudgetRegistry {
    fn default() -> Self {
        Self::new()
    }
}
