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

//! Render target identities and the contract with external render surfaces.
//!
//! The governor never draws anything itself. A collaborator hands it a
//! [`RenderSurface`] at registration time; the surface is then driven either
//! on a worker thread or on the coordinating thread.

use crate::error::SurfaceError;
use crate::quality::QualityLevel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Caller-chosen identity of a render target (e.g. `"canvas-main"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderTargetId(String);

impl RenderTargetId {
    /// Creates a new identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RenderTargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RenderTargetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RenderTargetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The closed set of rendering backends a target can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Immediate-mode 2D canvas region.
    Canvas2d,
    /// GPU-accelerated canvas.
    WebGl,
    /// Retained vector scene.
    Svg,
}

impl TargetKind {
    /// Every kind, in declaration order.
    pub const ALL: [TargetKind; 3] = [TargetKind::Canvas2d, TargetKind::WebGl, TargetKind::Svg];

    /// Stable lowercase name used in logs and metric names.
    pub fn name(self) -> &'static str {
        match self {
            TargetKind::Canvas2d => "canvas2d",
            TargetKind::WebGl => "webgl",
            TargetKind::Svg => "svg",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A request to draw one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRequest {
    /// Monotonic frame number chosen by the caller.
    pub frame_id: u64,
    /// Number of scene elements the caller expects to draw.
    pub complexity: u32,
}

impl FrameRequest {
    /// Creates a request for the given frame.
    pub fn new(frame_id: u64, complexity: u32) -> Self {
        Self {
            frame_id,
            complexity,
        }
    }
}

/// What a surface reports back after drawing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameOutput {
    /// Memory held by the surface after the frame, in megabytes.
    pub memory_mb: f64,
    /// Number of elements actually drawn (after level-of-detail culling).
    pub complexity: u32,
}

/// A completed frame, as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameReport {
    /// The frame number from the originating [`FrameRequest`].
    pub frame_id: u64,
    /// Wall time spent inside [`RenderSurface::render`].
    pub render_time: Duration,
    /// Memory held by the surface after the frame, in megabytes.
    pub memory_mb: f64,
    /// Number of elements drawn.
    pub complexity: u32,
}

impl FrameReport {
    /// Builds a report from the surface output and the measured render time.
    pub fn from_output(frame_id: u64, render_time: Duration, output: FrameOutput) -> Self {
        Self {
            frame_id,
            render_time,
            memory_mb: output.memory_mb,
            complexity: output.complexity,
        }
    }
}

/// The latest metrics snapshot of one render target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetMetrics {
    /// Most recent frame rate, computed from consecutive completions.
    pub fps: f64,
    /// Render time of the last completed frame, in milliseconds.
    pub render_time_ms: f64,
    /// Memory reported with the last completed frame, in megabytes.
    pub memory_mb: f64,
    /// Element count of the last completed frame.
    pub complexity: u32,
    /// Number of frames completed since registration.
    pub frames_completed: u64,
}

impl TargetMetrics {
    /// Returns `true` once at least one frame has completed.
    pub fn has_frames(&self) -> bool {
        self.frames_completed > 0
    }
}

/// A drawable surface provided by the render layer.
///
/// The surface is moved onto a worker thread when one is available, so it
/// must be `Send`. All methods are called from a single thread at a time.
pub trait RenderSurface: Send + 'static {
    /// Prepares the surface on the thread that will drive it.
    ///
    /// Called once per binding, before any [`render`](Self::render).
    fn initialize(&mut self) -> Result<(), SurfaceError> {
        Ok(())
    }

    /// Draws one frame at the given quality level.
    ///
    /// The quality level is a level-of-detail hint, not a hard contract.
    fn render(
        &mut self,
        request: &FrameRequest,
        quality: QualityLevel,
    ) -> Result<FrameOutput, SurfaceError>;

    /// Releases any resources before the surface is dropped or handed back.
    fn release(&mut self) {}
}
