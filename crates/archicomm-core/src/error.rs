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

//! Error types of the governor.
//!
//! None of these cross the runtime API: registration, rendering and update
//! gating degrade instead of failing. They surface from configuration and
//! export helpers, and internally before being turned into recommendations.

use crate::worker::WorkerId;
use thiserror::Error;

/// An error reported by a render surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// The surface could not be prepared on its rendering thread.
    #[error("surface initialization failed: {0}")]
    Initialization(String),
    /// Drawing a frame failed.
    #[error("frame rendering failed: {0}")]
    Render(String),
    /// The underlying context was lost and cannot be recovered.
    #[error("surface context lost")]
    ContextLost,
}

/// Errors raised inside the governor.
#[derive(Debug, Error)]
pub enum GovernorError {
    /// The platform refused to create a worker thread.
    #[error("failed to spawn render worker {worker}: {source}")]
    WorkerSpawn {
        /// Identifier the worker would have had.
        worker: WorkerId,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// The worker's command channel is disconnected.
    #[error("render worker {0} is no longer reachable")]
    WorkerDisconnected(WorkerId),
    /// A surface reported an error.
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    /// A configuration value is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Reading or writing a file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization failed.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result alias.
pub type GovernorResult<T> = Result<T, GovernorError>;
