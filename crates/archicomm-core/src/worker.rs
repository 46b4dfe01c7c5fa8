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

//! The coordinator/worker message protocol and the worker lifecycle.
//!
//! Workers never share memory with the coordinator. Every interaction is one
//! of the tagged messages below; the coordinator handles [`WorkerEvent`]
//! exhaustively.

use crate::quality::QualityLevel;
use crate::render::{FrameReport, FrameRequest, RenderSurface};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a render worker, unique for the lifetime of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Wraps a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Lifecycle of a render worker.
///
/// ```text
/// Idle ──► Initializing ──► Active ──► Failed ──► Terminated
///   ▲            │             │                      ▲
///   └────────────┴─────────────┘ (release)            │
///   └─────────────────────────────────────────────────┘ (pool full / shutdown)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Pooled, not bound to any target.
    Idle,
    /// Bound; waiting for the surface initialization acknowledgement.
    Initializing,
    /// Bound and rendering.
    Active,
    /// Reported an error; about to be terminated.
    Failed,
    /// Asked to exit. Never reused.
    Terminated,
}

impl WorkerState {
    /// Returns `true` if `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Idle, Terminated)
                | (Initializing, Active)
                | (Initializing, Failed)
                | (Initializing, Idle)
                | (Initializing, Terminated)
                | (Active, Idle)
                | (Active, Failed)
                | (Active, Terminated)
                | (Failed, Terminated)
        )
    }

    /// Returns `true` for the states that occupy a pool slot with a target.
    pub fn is_bound(self) -> bool {
        matches!(self, WorkerState::Initializing | WorkerState::Active)
    }
}

/// A message from the coordinator to one worker.
pub enum WorkerCommand {
    /// Binds the worker to a surface. The surface is moved to the worker.
    Init {
        /// Generation stamped on every event of this binding.
        binding: u64,
        /// The surface to drive.
        surface: Box<dyn RenderSurface>,
        /// Quality level at bind time.
        quality: QualityLevel,
    },
    /// Draws one frame.
    Render(FrameRequest),
    /// Updates the level-of-detail hint.
    SetQuality(QualityLevel),
    /// Drops the bound surface and returns to the idle pool.
    Release,
    /// Exits the worker thread.
    Terminate,
}

impl WorkerCommand {
    /// Takes the surface back out of an undelivered `Init`.
    pub fn into_surface(self) -> Option<Box<dyn RenderSurface>> {
        match self {
            WorkerCommand::Init { surface, .. } => Some(surface),
            _ => None,
        }
    }
}

impl fmt::Debug for WorkerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerCommand::Init {
                binding, quality, ..
            } => f
                .debug_struct("Init")
                .field("binding", binding)
                .field("quality", quality)
                .finish_non_exhaustive(),
            WorkerCommand::Render(request) => f.debug_tuple("Render").field(request).finish(),
            WorkerCommand::SetQuality(level) => f.debug_tuple("SetQuality").field(level).finish(),
            WorkerCommand::Release => f.write_str("Release"),
            WorkerCommand::Terminate => f.write_str("Terminate"),
        }
    }
}

/// A message from a worker to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// The surface initialized; the worker is ready to render.
    Ready,
    /// A frame finished.
    RenderComplete(FrameReport),
    /// The surface failed (initialization, rendering or a panic).
    Error(String),
    /// The bound surface was released.
    Released,
    /// The worker thread is exiting.
    Terminated,
}

/// A [`WorkerEvent`] tagged with its sender and binding generation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerEnvelope {
    /// Sending worker.
    pub worker: WorkerId,
    /// Binding generation the event belongs to (`0` when unbound).
    pub binding: u64,
    /// Payload.
    pub event: WorkerEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use WorkerState::*;
        assert!(Idle.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Active));
        assert!(Active.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Terminated));
        assert!(Active.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Active));
        assert!(!Failed.can_transition_to(Idle));
        assert!(!Terminated.can_transition_to(Idle));
        assert!(!Terminated.can_transition_to(Initializing));
        assert!(!Active.can_transition_to(Initializing));
    }

    #[test]
    fn test_only_initializing_and_active_are_bound() {
        assert!(WorkerState::Initializing.is_bound());
        assert!(WorkerState::Active.is_bound());
        assert!(!WorkerState::Idle.is_bound());
        assert!(!WorkerState::Failed.is_bound());
        assert!(!WorkerState::Terminated.is_bound());
    }

    #[test]
    fn test_undelivered_init_hands_surface_back() {
        use crate::error::SurfaceError;
        use crate::render::FrameOutput;

        struct Blank;
        impl RenderSurface for Blank {
            fn render(
                &mut self,
                request: &FrameRequest,
                _quality: QualityLevel,
            ) -> Result<FrameOutput, SurfaceError> {
                Ok(FrameOutput {
                    memory_mb: 0.0,
                    complexity: request.complexity,
                })
            }
        }

        let init = WorkerCommand::Init {
            binding: 3,
            surface: Box::new(Blank),
            quality: QualityLevel::default(),
        };
        assert!(init.into_surface().is_some());
        assert!(WorkerCommand::Release.into_surface().is_none());
    }

    #[test]
    fn test_worker_id_display() {
        assert_eq!(WorkerId::new(12).to_string(), "worker-12");
    }
}
