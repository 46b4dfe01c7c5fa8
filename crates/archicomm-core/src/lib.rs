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

//! # ArchiComm Core
//!
//! Foundational crate containing the types and interface contracts shared by
//! every part of the render governor: render target identities and kinds,
//! performance budgets, recommendations, the quality level, the
//! coordinator/worker message protocol and the platform capabilities.
//!
//! Nothing in here owns state across calls; the stateful services live in
//! `archicomm-telemetry`, `archicomm-workers`, `archicomm-control` and
//! `archicomm-guard`.

#![warn(missing_docs)]

pub mod budget;
pub mod error;
pub mod listener;
pub mod platform;
pub mod quality;
pub mod recommendation;
pub mod render;
pub mod worker;

pub use budget::{BudgetOverride, BudgetRegistry, PerformanceBudget};
pub use error::{GovernorError, GovernorResult, SurfaceError};
pub use listener::{ListenerId, ListenerSet};
pub use platform::{Capabilities, Clock, ManualClock, SystemClock};
pub use quality::QualityLevel;
pub use recommendation::{Recommendation, RecommendationLog, Severity, MAX_RECOMMENDATIONS};
pub use render::{
    FrameOutput, FrameReport, FrameRequest, RenderSurface, RenderTargetId, TargetKind,
    TargetMetrics,
};
pub use worker::{WorkerCommand, WorkerEnvelope, WorkerEvent, WorkerId, WorkerState};
