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

//! The governor facade.

use crate::config::GovernorConfig;
use crate::export::PerformanceExport;
use archicomm_control::{
    AggregatedMetrics, BudgetEvaluator, QualityController, TargetReading, TickTimer,
};
use archicomm_core::budget::{BudgetOverride, BudgetRegistry, PerformanceBudget};
use archicomm_core::listener::{ListenerId, ListenerSet};
use archicomm_core::platform::{Capabilities, Clock, SystemClock};
use archicomm_core::quality::QualityLevel;
use archicomm_core::recommendation::{Recommendation, RecommendationLog};
use archicomm_core::render::{FrameReport, FrameRequest, RenderSurface, RenderTargetId, TargetKind};
use archicomm_guard::{
    BreakerEvent, UpdateCircuitBreaker, UpdateDepthMonitor, UpdateKey, UpdateMeta,
};
use archicomm_telemetry::{names, MetricsMonitor};
use archicomm_workers::{RegistrationHandle, Scheduler, ThreadSpawner, WorkerSpawner};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Builds a [`Governor`] with explicit platform services.
pub struct GovernorBuilder {
    config: GovernorConfig,
    capabilities: Option<Capabilities>,
    clock: Option<Arc<dyn Clock>>,
    spawner: Option<Box<dyn WorkerSpawner>>,
}

impl GovernorBuilder {
    /// Starts from the default configuration.
    pub fn new() -> Self {
        Self {
            config: GovernorConfig::default(),
            capabilities: None,
            clock: None,
            spawner: None,
        }
    }

    /// Uses `config` (sanitized on build).
    pub fn config(mut self, config: GovernorConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses explicit capabilities instead of probing the platform.
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Uses a custom time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Uses a custom worker spawner.
    pub fn spawner(mut self, spawner: Box<dyn WorkerSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Creates the governor.
    pub fn build(self) -> Governor {
        let config = self.config.validated();
        let capabilities = self.capabilities.unwrap_or_else(Capabilities::detect);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let spawner = self.spawner.unwrap_or_else(|| Box::new(ThreadSpawner));

        let mut budgets = BudgetRegistry::new();
        for (kind, budget) in &config.kind_budgets {
            budgets.set_kind_default(*kind, *budget);
        }

        log::info!(
            "Governor: starting (target {:.0} fps, tick {} ms, worker capacity {}).",
            config.quality.target_fps,
            config.quality.tick_interval_ms,
            capabilities.worker_capacity()
        );

        Governor {
            monitor: MetricsMonitor::new(config.monitor.clone(), clock.clone()),
            scheduler: Scheduler::with_spawner(
                config.scheduler.clone(),
                capabilities,
                clock.clone(),
                spawner,
            ),
            budgets,
            evaluator: BudgetEvaluator,
            quality: QualityController::new(config.quality.clone()),
            timer: TickTimer::new(config.quality.tick_interval()),
            incidents: RecommendationLog::default(),
            budget_findings: Vec::new(),
            breaker: UpdateCircuitBreaker::new(config.breaker.clone()),
            depth: UpdateDepthMonitor::new(config.depth.clone()),
            quality_listeners: ListenerSet::new("Quality"),
            last_aggregate: AggregatedMetrics::default(),
            shut_down: false,
            clock,
            config,
        }
    }
}

impl Default for GovernorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The runtime performance-and-stability governor.
///
/// Owned by one coordinating thread; every method takes `&mut self` or
/// `&self` and nothing here is shared. Drive it by calling
/// [`pump`](Self::pump) from the host's frame or event loop.
pub struct Governor {
    config: GovernorConfig,
    clock: Arc<dyn Clock>,
    monitor: MetricsMonitor,
    scheduler: Scheduler,
    budgets: BudgetRegistry,
    evaluator: BudgetEvaluator,
    quality: QualityController,
    timer: TickTimer,
    incidents: RecommendationLog,
    budget_findings: Vec<Recommendation>,
    breaker: UpdateCircuitBreaker,
    depth: UpdateDepthMonitor,
    quality_listeners: ListenerSet<QualityLevel>,
    last_aggregate: AggregatedMetrics,
    shut_down: bool,
}

impl Governor {
    /// Creates a governor with `config`, probing the platform.
    pub fn new(config: GovernorConfig) -> Self {
        GovernorBuilder::new().config(config).build()
    }

    /// Starts a builder.
    pub fn builder() -> GovernorBuilder {
        GovernorBuilder::new()
    }

    /// The active (sanitized) configuration.
    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    // --- Render targets ---

    /// Registers a render target. Re-registering an id replaces it.
    pub fn register_target(
        &mut self,
        id: impl Into<RenderTargetId>,
        surface: impl RenderSurface,
        kind: TargetKind,
    ) -> RegistrationHandle {
        self.scheduler.register(id.into(), Box::new(surface), kind)
    }

    /// Unregisters a target and forgets its budget override. Unknown ids are
    /// ignored.
    pub fn unregister_target(&mut self, id: &RenderTargetId) {
        self.scheduler.unregister(id);
        self.budgets.remove(id);
    }

    /// Draws one frame of a target.
    pub fn render(&mut self, id: &RenderTargetId, request: FrameRequest) {
        self.scheduler.render(id, request);
    }

    /// Reports a frame completed outside the governor.
    pub fn report_frame(&mut self, id: &RenderTargetId, report: FrameReport) {
        self.scheduler.report_frame(id, report);
    }

    /// Read access to the worker pool.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    // --- Budgets ---

    /// Overrides part of a target's budget. Later calls merge into earlier
    /// ones; fields never set fall back to the kind default.
    pub fn set_budget(&mut self, id: impl Into<RenderTargetId>, patch: BudgetOverride) {
        let id = id.into();
        log::debug!("Governor: budget override for '{id}': {patch:?}");
        self.budgets.apply(id, patch);
    }

    /// The resolved budget of a registered target.
    pub fn budget(&self, id: &RenderTargetId) -> Option<PerformanceBudget> {
        self.scheduler
            .target(id)
            .map(|target| self.budgets.resolve(id, target.kind()))
    }

    // --- Metrics, recommendations and quality ---

    /// Read access to the metrics monitor.
    pub fn metrics(&self) -> &MetricsMonitor {
        &self.monitor
    }

    /// Records an application metric.
    pub fn record_metric(&mut self, name: &str, value: f64) {
        self.monitor.record_metric(name, value, None);
    }

    /// Governor-wide rollup of the current target metrics.
    pub fn aggregated_metrics(&self) -> AggregatedMetrics {
        self.evaluator.aggregate(
            &self.readings(),
            self.scheduler.active_workers(),
            self.config.quality.target_fps,
        )
    }

    /// Active recommendations: critical first, at most five.
    ///
    /// Budget findings come from the last tick only; worker incidents stay
    /// until cleared or displaced by newer ones.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        Recommendation::prioritize(
            self.budget_findings
                .iter()
                .chain(self.incidents.iter())
                .cloned(),
        )
    }

    /// Drops every recommendation.
    pub fn clear_recommendations(&mut self) {
        self.incidents.clear();
        self.budget_findings.clear();
    }

    /// The current quality level.
    pub fn quality_level(&self) -> QualityLevel {
        self.quality.level()
    }

    /// Subscribes to quality level changes.
    pub fn on_quality_changed(
        &mut self,
        listener: impl FnMut(&QualityLevel) + Send + 'static,
    ) -> ListenerId {
        self.quality_listeners.subscribe(listener)
    }

    /// Removes a quality listener.
    pub fn off_quality_changed(&mut self, id: ListenerId) -> bool {
        self.quality_listeners.unsubscribe(id)
    }

    // --- Update gating ---

    /// `false` while `source`'s breaker is open or the depth monitor is in
    /// emergency mode. A refusal counts as a blocked action.
    pub fn should_allow_update(&mut self, source: &str) -> bool {
        let now = self.clock.now();
        let allowed = self.breaker.should_allow(source, now);
        allowed && !self.depth.is_emergency(now)
    }

    /// Counts one state update of `source` in both layers. Returns `false`
    /// when either layer says the update should be dropped.
    pub fn record_update(&mut self, source: &str, meta: UpdateMeta) -> bool {
        let now = self.clock.now();
        let breaker_ok = self.breaker.record_update(source, now);
        let depth_ok = self
            .depth
            .record_update(UpdateKey::from_meta(source, &meta), now);
        if !(breaker_ok && depth_ok) {
            log::debug!(
                "Governor: update of '{source}' refused (action {:?}, breaker ok: {breaker_ok}, depth ok: {depth_ok}).",
                meta.action
            );
        }
        breaker_ok && depth_ok
    }

    /// Opens `source`'s breaker for one cooldown.
    pub fn force_trip(&mut self, source: &str, reason: &str) {
        let now = self.clock.now();
        self.breaker.force_trip(source, reason, now);
    }

    /// Closes `source`'s breaker. Returns `false` for unknown sources.
    pub fn reset_breaker(&mut self, source: &str) -> bool {
        let now = self.clock.now();
        self.breaker.reset(source, now)
    }

    /// Subscribes to `source`'s breaker events.
    pub fn on_breaker_event(
        &mut self,
        source: &str,
        listener: impl FnMut(&BreakerEvent) + Send + 'static,
    ) -> ListenerId {
        self.breaker.subscribe(source, listener)
    }

    /// Read access to the per-source breaker.
    pub fn breaker(&self) -> &UpdateCircuitBreaker {
        &self.breaker
    }

    /// Read access to the update-depth monitor.
    pub fn depth_monitor(&self) -> &UpdateDepthMonitor {
        &self.depth
    }

    // --- Driving ---

    /// [`pump_at`](Self::pump_at) with the governor's clock.
    pub fn pump(&mut self) -> usize {
        let now = self.clock.now();
        self.pump_at(now)
    }

    /// Drains worker events, feeds completed frames to the monitor and runs
    /// the monitoring tick when due. Returns the number of frames processed.
    pub fn pump_at(&mut self, now: Instant) -> usize {
        let frames = self.scheduler.pump(now);
        for frame in &frames {
            let id = frame.target_id.as_str();
            let render_ms = frame.report.render_time.as_secs_f64() * 1000.0;
            self.monitor
                .record_metric(names::RENDER_TIME_MS, render_ms, Some(frame.completed_at));
            self.monitor.record_metric(
                &names::for_target(id, names::RENDER_TIME_MS),
                render_ms,
                Some(frame.completed_at),
            );
            self.monitor.record_metric(
                &names::for_target(id, names::MEMORY_MB),
                frame.report.memory_mb,
                Some(frame.completed_at),
            );
            if let Some(fps) = frame.fps {
                self.monitor.record_metric(
                    &names::for_target(id, names::FPS),
                    fps,
                    Some(frame.completed_at),
                );
                self.monitor.record_fps(fps, frame.completed_at);
            }
        }

        let incidents = self.scheduler.take_incidents();
        if !incidents.is_empty() {
            self.incidents.extend(incidents);
        }

        if !self.shut_down && self.timer.poll(now) {
            self.tick_at(now);
        }
        frames.len()
    }

    /// Runs one monitoring tick: budget evaluation, then quality control.
    ///
    /// Returns the new quality level when it changed.
    pub fn tick_at(&mut self, now: Instant) -> Option<QualityLevel> {
        let readings = self.readings();

        self.budget_findings = self.evaluator.check_budgets(&readings);
        if !self.budget_findings.is_empty() {
            log::debug!(
                "Governor: {} budget recommendation(s) this tick.",
                self.budget_findings.len()
            );
        }

        let aggregate_fps = self.quality.aggregate_fps(&readings);
        self.monitor
            .record_metric(names::AGGREGATE_FPS, aggregate_fps, Some(now));
        if let Some(memory_mb) = self.monitor.sample_process_memory() {
            log::trace!("Governor: process memory {memory_mb:.1} MB.");
        }

        self.last_aggregate = self.evaluator.aggregate(
            &readings,
            self.scheduler.active_workers(),
            self.config.quality.target_fps,
        );

        let changed = self.quality.tick(aggregate_fps);
        if let Some(level) = changed {
            self.scheduler.broadcast_quality(level);
            let failures = self.quality_listeners.emit(&level);
            if failures > 0 {
                log::warn!("Governor: {failures} quality listener(s) failed.");
            }
        }
        changed
    }

    /// The rollup computed by the last tick.
    pub fn last_aggregate(&self) -> AggregatedMetrics {
        self.last_aggregate
    }

    // --- Export and lifecycle ---

    /// Captures the full governor state.
    pub fn export_performance_data(&self) -> PerformanceExport {
        let now = self.clock.now();
        let budgets = self
            .scheduler
            .targets()
            .map(|target| {
                (
                    target.id().clone(),
                    self.budgets.resolve(target.id(), target.kind()),
                )
            })
            .collect();

        PerformanceExport {
            generated_at_unix_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            quality_level: self.quality.level(),
            aggregated: self.aggregated_metrics(),
            budgets,
            targets: self.scheduler.snapshots(),
            metrics: self.monitor.summaries(),
            recommendations: self.recommendations(),
            breakers: self.breaker.snapshots(now),
            emergency_active: self.depth.is_emergency(now),
            scheduler: self.scheduler.stats(),
        }
    }

    /// Terminates every worker, stops ticking and drops queued targets.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.timer.reset();
        self.scheduler.shutdown();
        log::info!("Governor: shut down.");
    }

    fn readings(&self) -> Vec<TargetReading> {
        self.scheduler
            .targets()
            .map(|target| TargetReading {
                id: target.id().clone(),
                kind: target.kind(),
                metrics: *target.metrics(),
                budget: self.budgets.resolve(target.id(), target.kind()),
            })
            .collect()
    }
}

impl Drop for Governor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Governor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Governor")
            .field("quality", &self.quality.level())
            .field("scheduler", &self.scheduler)
            .field("incidents", &self.incidents.len())
            .field("budget_findings", &self.budget_findings.len())
            .finish_non_exhaustive()
    }
}
