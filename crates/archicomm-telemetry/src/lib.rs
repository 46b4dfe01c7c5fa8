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

//! Rolling-window metrics for the render governor.
//!
//! The monitor only observes: it never triggers anything on its own. The
//! budget evaluator and the quality controller sample it every tick.

pub mod memory;
pub mod monitor;
pub mod ring;

pub use memory::ProcessMemorySampler;
pub use monitor::{
    names, FrameRateTracker, Metric, MetricSummary, MetricsMonitor, MonitorConfig,
};
pub use ring::RingBuffer;
