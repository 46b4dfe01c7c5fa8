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

//! # ArchiComm Control
//!
//! The periodic half of the governor. Once per monitoring tick the
//! [`BudgetEvaluator`] compares every target against its budget and the
//! [`QualityController`] nudges the global quality level toward the frame
//! rate target.

#![warn(missing_docs)]

pub mod analysis;
pub mod quality;
pub mod timer;

pub use analysis::{AggregatedMetrics, BudgetEvaluator, TargetReading};
pub use quality::{QualityConfig, QualityController};
pub use timer::TickTimer;
