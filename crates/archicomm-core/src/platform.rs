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

//! Platform services consumed by the governor.
//!
//! Capabilities are detected once at startup and passed explicitly; nothing
//! below the facade checks for platform features on its own.

use std::fmt::Debug;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// What the host platform offers to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Number of hardware threads available to the process.
    pub parallelism: usize,
    /// Whether surfaces can be moved onto worker threads. When `false`,
    /// every target renders on the coordinating thread.
    pub transferable_surfaces: bool,
}

impl Capabilities {
    /// Detects the running platform.
    pub fn detect() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or_else(|e| {
                log::warn!("Capabilities: available parallelism unknown ({e}), assuming 1.");
                1
            });
        let caps = Self {
            parallelism,
            transferable_surfaces: true,
        };
        log::info!(
            "Capabilities: parallelism={}, worker capacity={}",
            caps.parallelism,
            caps.worker_capacity()
        );
        caps
    }

    /// Explicit capabilities, mostly for tests and embedding.
    pub fn new(parallelism: usize, transferable_surfaces: bool) -> Self {
        Self {
            parallelism,
            transferable_surfaces,
        }
    }

    /// Maximum number of render workers: one core is always left to the
    /// coordinating thread, but there is always at least one worker.
    pub fn worker_capacity(&self) -> usize {
        self.parallelism.saturating_sub(1).max(1)
    }
}

/// A monotonic time source.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    /// Time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}
