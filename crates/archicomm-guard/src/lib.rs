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

//! # ArchiComm Guard
//!
//! Protection against update storms: a component or store re-triggering its
//! own re-render faster than the UI thread can settle.
//!
//! Two independent, advisory layers:
//! - [`UpdateCircuitBreaker`]: per-source sliding window (200 ms by default)
//!   that opens for a cooldown once a source exceeds its error threshold.
//! - [`UpdateDepthMonitor`]: global one-second window with per-key and total
//!   caps; exceeding either enters a time-boxed emergency mode that resets
//!   every counter.
//!
//! Both take the current instant explicitly and answer with booleans only.

#![warn(missing_docs)]

pub mod breaker;
pub mod depth;

pub use breaker::{
    BreakerConfig, BreakerEvent, BreakerEventKind, BreakerSnapshot, BreakerState,
    UpdateCircuitBreaker,
};
pub use depth::{UpdateDepthConfig, UpdateDepthMonitor, UpdateKey, UpdateMeta};
