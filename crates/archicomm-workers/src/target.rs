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

//! Registered render targets as tracked by the scheduler.

use crate::worker::{guarded, release_surface};
use archicomm_core::quality::QualityLevel;
use archicomm_core::render::{
    FrameOutput, FrameReport, FrameRequest, RenderSurface, RenderTargetId, TargetKind,
    TargetMetrics,
};
use archicomm_core::worker::WorkerId;
use archicomm_telemetry::FrameRateTracker;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Where a target's frames are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Bound to a worker thread.
    Worker(WorkerId),
    /// Waiting for a worker; frames render on the coordinating thread.
    Queued,
    /// Rendering on the coordinating thread for good (no worker could be
    /// used).
    Coordinator,
    /// The surface was lost together with its failed worker. The target must
    /// be re-registered to render again.
    Lost,
}

/// A render target registered with the scheduler.
pub struct RenderTarget {
    pub(crate) id: RenderTargetId,
    pub(crate) kind: TargetKind,
    pub(crate) metrics: TargetMetrics,
    pub(crate) frames: FrameRateTracker,
    pub(crate) placement: Placement,
    /// The surface when it is driven by the coordinator.
    pub(crate) local: Option<LocalSurface>,
}

impl RenderTarget {
    pub(crate) fn new(id: RenderTargetId, kind: TargetKind) -> Self {
        Self {
            id,
            kind,
            metrics: TargetMetrics::default(),
            frames: FrameRateTracker::new(),
            placement: Placement::Coordinator,
            local: None,
        }
    }

    /// The target identity.
    pub fn id(&self) -> &RenderTargetId {
        &self.id
    }

    /// The rendering backend kind.
    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// The latest metrics snapshot.
    pub fn metrics(&self) -> &TargetMetrics {
        &self.metrics
    }

    /// Where frames are currently produced.
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// `true` while the target is bound to a worker.
    pub fn worker_active(&self) -> bool {
        matches!(self.placement, Placement::Worker(_))
    }

    /// `true` while the target waits in the queue.
    pub fn queued(&self) -> bool {
        self.placement == Placement::Queued
    }

    /// Folds a completed frame into the metrics snapshot.
    pub(crate) fn record_frame(&mut self, report: &FrameReport, completed_at: Instant) -> Option<f64> {
        let fps = self.frames.record(completed_at);
        if let Some(fps) = fps {
            self.metrics.fps = fps;
        }
        self.metrics.render_time_ms = report.render_time.as_secs_f64() * 1000.0;
        self.metrics.memory_mb = report.memory_mb;
        self.metrics.complexity = report.complexity;
        self.metrics.frames_completed += 1;
        fps
    }

    /// A serializable view for reporting.
    pub fn snapshot(&self) -> TargetSnapshot {
        TargetSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            metrics: self.metrics,
            worker: match self.placement {
                Placement::Worker(worker) => Some(worker),
                _ => None,
            },
            worker_active: self.worker_active(),
            queued: self.queued(),
        }
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("placement", &self.placement)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// A point-in-time view of a render target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    /// Target identity.
    pub id: RenderTargetId,
    /// Backend kind.
    pub kind: TargetKind,
    /// Latest metrics.
    pub metrics: TargetMetrics,
    /// The bound worker, if any.
    pub worker: Option<WorkerId>,
    /// Whether a worker is bound.
    pub worker_active: bool,
    /// Whether the target waits for a worker.
    pub queued: bool,
}

/// A surface driven on the coordinating thread.
///
/// Initialized lazily on its first frame and released before it is handed to
/// a worker.
pub(crate) struct LocalSurface {
    surface: Box<dyn RenderSurface>,
    initialized: bool,
}

impl LocalSurface {
    pub(crate) fn new(surface: Box<dyn RenderSurface>) -> Self {
        Self {
            surface,
            initialized: false,
        }
    }

    pub(crate) fn render(
        &mut self,
        request: &FrameRequest,
        quality: QualityLevel,
    ) -> Result<FrameOutput, String> {
        if !self.initialized {
            guarded(|| self.surface.initialize())?;
            self.initialized = true;
        }
        guarded(|| self.surface.render(request, quality))
    }

    /// Gives the surface back, released if it was ever initialized here.
    pub(crate) fn into_surface(self) -> Box<dyn RenderSurface> {
        let Self {
            mut surface,
            initialized,
        } = self;
        if initialized {
            if let Err(message) = guarded(|| {
                surface.release();
                Ok(())
            }) {
                log::warn!("Scheduler: surface release failed: {message}");
            }
        }
        surface
    }

    pub(crate) fn close(self) {
        if self.initialized {
            release_surface(self.surface);
        }
    }
}

/// A target waiting for a free worker slot.
pub(crate) struct QueuedTarget {
    pub(crate) target_id: RenderTargetId,
    pub(crate) local: LocalSurface,
}
