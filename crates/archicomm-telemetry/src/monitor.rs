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

//! The metrics monitor: named rolling windows plus frame-rate tracking.

use crate::memory::ProcessMemorySampler;
use crate::ring::RingBuffer;
use archicomm_core::platform::Clock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Well-known metric names.
pub mod names {
    /// Frame rate samples.
    pub const FPS: &str = "fps";
    /// Mean frame rate across targets, one sample per monitoring tick.
    pub const AGGREGATE_FPS: &str = "aggregate_fps";
    /// Per-frame render time in milliseconds.
    pub const RENDER_TIME_MS: &str = "render_time_ms";
    /// Memory usage in megabytes.
    pub const MEMORY_MB: &str = "memory_mb";

    /// Scopes a metric name to one render target (`"{target}/{metric}"`).
    pub fn for_target(target: &str, metric: &str) -> String {
        format!("{target}/{metric}")
    }
}

/// Configuration of the [`MetricsMonitor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Samples kept per metric name.
    pub history_size: usize,
    /// Whether [`MetricsMonitor::sample_process_memory`] reads the process RSS.
    pub sample_process_memory: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_size: 100,
            sample_process_memory: false,
        }
    }
}

/// One recorded sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// When the sample was taken.
    pub timestamp: Instant,
    /// Metric name.
    pub name: String,
    /// Measured duration, for timing metrics.
    pub duration: Option<Duration>,
    /// Sample value.
    pub value: f64,
}

/// Summary statistics over the current window of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Metric name.
    pub name: String,
    /// Number of samples in the window.
    pub count: usize,
    /// Arithmetic mean.
    pub average: f64,
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
    /// Most recent sample.
    pub latest: f64,
    /// Population variance; high values indicate stutter.
    pub variance: f64,
}

/// Computes frame rate from consecutive frame completion instants.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameRateTracker {
    last_frame: Option<Instant>,
    current_fps: f64,
}

impl FrameRateTracker {
    /// Creates a tracker with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a frame completion and returns the resulting fps sample.
    ///
    /// The first frame has no predecessor and yields nothing; neither does a
    /// frame that is not strictly later than the previous one.
    pub fn record(&mut self, timestamp: Instant) -> Option<f64> {
        let previous = self.last_frame.replace(timestamp)?;
        let delta = timestamp.checked_duration_since(previous)?;
        let delta_ms = delta.as_secs_f64() * 1000.0;
        if delta_ms <= 0.0 {
            return None;
        }
        self.current_fps = 1000.0 / delta_ms;
        Some(self.current_fps)
    }

    /// Most recent fps sample, `0.0` before the second frame.
    pub fn current_fps(&self) -> f64 {
        self.current_fps
    }

    /// Adopts a sample computed by another tracker.
    pub fn observe(&mut self, fps: f64) {
        self.current_fps = fps;
    }

    /// Forgets all history.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Bounded rolling windows of named metrics.
///
/// Pure bookkeeping: recording never triggers anything.
pub struct MetricsMonitor {
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    series: HashMap<String, RingBuffer<Metric>>,
    frames: FrameRateTracker,
    memory: Option<ProcessMemorySampler>,
}

impl MetricsMonitor {
    /// Creates an empty monitor.
    pub fn new(config: MonitorConfig, clock: Arc<dyn Clock>) -> Self {
        let memory = config
            .sample_process_memory
            .then(ProcessMemorySampler::new);
        Self {
            config,
            clock,
            series: HashMap::new(),
            frames: FrameRateTracker::new(),
            memory,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Appends a sample. `timestamp` defaults to the monitor's clock.
    pub fn record_metric(&mut self, name: &str, value: f64, timestamp: Option<Instant>) {
        let timestamp = timestamp.unwrap_or_else(|| self.clock.now());
        self.push(Metric {
            timestamp,
            name: name.to_string(),
            duration: None,
            value,
        });
    }

    /// Records a timing sample; the value is the duration in milliseconds.
    pub fn record_duration(&mut self, name: &str, duration: Duration) {
        let timestamp = self.clock.now();
        self.push(Metric {
            timestamp,
            name: name.to_string(),
            duration: Some(duration),
            value: duration.as_secs_f64() * 1000.0,
        });
    }

    /// Registers a frame completion and records the derived fps sample.
    pub fn record_frame(&mut self, timestamp: Instant) -> Option<f64> {
        let fps = self.frames.record(timestamp)?;
        self.record_metric(names::FPS, fps, Some(timestamp));
        Some(fps)
    }

    /// Records an fps sample measured by a per-target tracker.
    ///
    /// Non-finite and non-positive samples are ignored.
    pub fn record_fps(&mut self, fps: f64, timestamp: Instant) {
        if !(fps.is_finite() && fps > 0.0) {
            return;
        }
        self.frames.observe(fps);
        self.record_metric(names::FPS, fps, Some(timestamp));
    }

    /// Most recent frame-rate sample, `0.0` before any.
    pub fn current_fps(&self) -> f64 {
        self.frames.current_fps()
    }

    /// Records a memory usage sample in megabytes.
    pub fn record_memory(&mut self, memory_mb: f64) {
        self.record_metric(names::MEMORY_MB, memory_mb, None);
    }

    /// Samples the process resident memory, if enabled, and records it.
    pub fn sample_process_memory(&mut self) -> Option<f64> {
        let mb = self.memory.as_mut()?.sample_mb()?;
        self.record_memory(mb);
        Some(mb)
    }

    /// Mean of the window, or `0.0` for an empty or unknown metric.
    pub fn average_metric(&self, name: &str) -> f64 {
        match self.series.get(name) {
            Some(ring) if !ring.is_empty() => {
                ring.iter().map(|m| m.value).sum::<f64>() / ring.count() as f64
            }
            _ => 0.0,
        }
    }

    /// The most recent sample of a metric.
    pub fn latest_metric(&self, name: &str) -> Option<&Metric> {
        self.series.get(name).and_then(RingBuffer::latest)
    }

    /// Samples currently held for a metric.
    pub fn sample_count(&self, name: &str) -> usize {
        self.series.get(name).map_or(0, RingBuffer::count)
    }

    /// Iterates a metric's window from oldest to newest.
    pub fn samples<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Metric> + 'a {
        self.series.get(name).into_iter().flat_map(RingBuffer::iter)
    }

    /// Known metric names, sorted.
    pub fn metric_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.series.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Summary statistics of a metric, `None` when it has no samples.
    pub fn summary(&self, name: &str) -> Option<MetricSummary> {
        let ring = self.series.get(name)?;
        let latest = ring.latest()?.value;
        let count = ring.count();
        let average = self.average_metric(name);
        let (min, max) = ring
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), m| (lo.min(m.value), hi.max(m.value)));
        let variance = if count < 2 {
            0.0
        } else {
            ring.iter()
                .map(|m| (m.value - average) * (m.value - average))
                .sum::<f64>()
                / count as f64
        };
        Some(MetricSummary {
            name: name.to_string(),
            count,
            average,
            min,
            max,
            latest,
            variance,
        })
    }

    /// Summaries of every known metric, sorted by name.
    pub fn summaries(&self) -> Vec<MetricSummary> {
        self.metric_names()
            .into_iter()
            .filter_map(|name| self.summary(name))
            .collect()
    }

    /// Drops every sample and the frame-rate history.
    pub fn clear(&mut self) {
        self.series.clear();
        self.frames.reset();
    }

    fn push(&mut self, metric: Metric) {
        let capacity = self.config.history_size;
        log::trace!("Telemetry: {} = {:.3}", metric.name, metric.value);
        self.series
            .entry(metric.name.clone())
            .or_insert_with(|| RingBuffer::new(capacity))
            .push(metric);
    }
}

impl std::fmt::Debug for MetricsMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsMonitor")
            .field("config", &self.config)
            .field("series", &self.series.len())
            .field("current_fps", &self.frames.current_fps())
            .finish()
    }
}
