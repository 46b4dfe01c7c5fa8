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

//! # ArchiComm Workers
//!
//! The worker pool scheduler. Render targets are bound to dedicated worker
//! threads while capacity lasts, queued in FIFO order otherwise, and rendered
//! on the coordinating thread whenever no worker can hold them.
//!
//! The scheduler is owned by a single coordinating thread and never blocks on
//! a worker: events are drained with [`Scheduler::pump`].

#![warn(missing_docs)]

pub mod scheduler;
pub mod target;
pub mod worker;

pub use scheduler::{
    CompletedFrame, RegistrationHandle, Scheduler, SchedulerConfig, SchedulerStats,
};
pub use target::{Placement, RenderTarget, TargetSnapshot};
pub use worker::{run_worker, ThreadSpawner, WorkerSpawner};
