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

//! # ArchiComm SDK
//!
//! The runtime performance-and-stability governor of the ArchiComm diagram
//! editor, as one facade.
//!
//! A [`Governor`] keeps render targets on worker threads, checks them against
//! their budgets every monitoring tick, adapts a global quality level toward
//! the frame-rate target and refuses state updates that arrive faster than
//! the editor can absorb them.
//!
//! ```no_run
//! use archicomm_sdk::prelude::*;
//!
//! struct Blank;
//!
//! impl RenderSurface for Blank {
//!     fn render(
//!         &mut self,
//!         request: &FrameRequest,
//!         _quality: QualityLevel,
//!     ) -> Result<FrameOutput, SurfaceError> {
//!         Ok(FrameOutput { memory_mb: 4.0, complexity: request.complexity })
//!     }
//! }
//!
//! let mut governor = Governor::new(GovernorConfig::default());
//! governor.register_target("main-canvas", Blank, TargetKind::Canvas2d);
//! governor.render(&"main-canvas".into(), FrameRequest::new(1, 120));
//! governor.pump();
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod export;
pub mod governor;

pub use config::GovernorConfig;
pub use export::PerformanceExport;
pub use governor::{Governor, GovernorBuilder};

pub use archicomm_control;
pub use archicomm_core;
pub use archicomm_guard;
pub use archicomm_telemetry;
pub use archicomm_workers;

/// The types most hosts need.
pub mod prelude {
    pub use crate::{Governor, GovernorBuilder, GovernorConfig, PerformanceExport};
    pub use archicomm_control::AggregatedMetrics;
    pub use archicomm_core::budget::{BudgetOverride, PerformanceBudget};
    pub use archicomm_core::error::{GovernorError, GovernorResult, SurfaceError};
    pub use archicomm_core::listener::ListenerId;
    pub use archicomm_core::platform::{Capabilities, Clock, ManualClock, SystemClock};
    pub use archicomm_core::quality::QualityLevel;
    pub use archicomm_core::recommendation::{Recommendation, Severity};
    pub use archicomm_core::render::{
        FrameOutput, FrameReport, FrameRequest, RenderSurface, RenderTargetId, TargetKind,
        TargetMetrics,
    };
    pub use archicomm_guard::{BreakerEvent, BreakerEventKind, BreakerState, UpdateMeta};
    pub use archicomm_workers::{Placement, RegistrationHandle};
}
