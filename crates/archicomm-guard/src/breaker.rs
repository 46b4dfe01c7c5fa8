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

//! Per-source update-rate circuit breaker.
//!
//! Each named source (a component or a store) gets its own breaker:
//!
//! ```text
//! Closed ──(error_threshold updates within window)──► Open
//!   ▲                                                   │
//!   └──────────────(now >= open_until, lazily)──────────┘
//! ```
//!
//! While closed, reaching `warning_threshold` inside the window logs a
//! throttled warning. While open, every attempt is refused and counted.

use ahash::AHashMap;
use archicomm_core::listener::{ListenerId, ListenerSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Configuration shared by every source breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Length of the sliding window, in milliseconds.
    pub window_ms: u64,
    /// Updates within the window that trigger a warning.
    pub warning_threshold: u32,
    /// Updates within the window that open the breaker.
    pub error_threshold: u32,
    /// How long an open breaker stays open, in milliseconds.
    pub cooldown_ms: u64,
    /// Minimum spacing between two warnings of one source, in milliseconds.
    pub warning_interval_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_ms: 200,
            warning_threshold: 10,
            error_threshold: 15,
            cooldown_ms: 2500,
            warning_interval_ms: 750,
        }
    }
}

impl BreakerConfig {
    /// Sliding window length.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Open duration.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Warning throttle interval.
    pub fn warning_interval(&self) -> Duration {
        Duration::from_millis(self.warning_interval_ms)
    }
}

/// Public breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Updates flow.
    Closed,
    /// Updates are refused until the cooldown elapses.
    Open,
}

/// Point-in-time status of one source breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Source name.
    pub source: String,
    /// Effective state at snapshot time.
    pub state: BreakerState,
    /// Updates currently inside the sliding window.
    pub window_updates: usize,
    /// Updates accepted since creation or the last close.
    pub total_updates: u64,
    /// Attempts refused since creation or the last close.
    pub blocked_actions: u64,
    /// Warnings emitted since creation or the last close.
    pub warning_count: u64,
    /// Times the breaker opened.
    pub trip_count: u64,
    /// Remaining cooldown, when open.
    pub open_remaining_ms: Option<u64>,
    /// Why the breaker last opened.
    pub reason: Option<String>,
}

/// What happened to a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerEventKind {
    /// The warning threshold was reached.
    Warning,
    /// The breaker opened.
    Tripped,
    /// The breaker closed again.
    Closed,
}

/// Delivered to the listeners of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerEvent {
    /// What happened.
    pub kind: BreakerEventKind,
    /// Status right after the change.
    pub snapshot: BreakerSnapshot,
}

#[derive(Debug, Clone)]
enum SourceState {
    Closed,
    Open { until: Instant },
}

#[derive(Debug)]
struct SourceBreaker {
    state: SourceState,
    window: VecDeque<Instant>,
    total_updates: u64,
    blocked_actions: u64,
    warning_count: u64,
    trip_count: u64,
    last_warning: Option<Instant>,
    reason: Option<String>,
    listeners: ListenerSet<BreakerEvent>,
}

impl SourceBreaker {
    fn new() -> Self {
        Self {
            state: SourceState::Closed,
            window: VecDeque::new(),
            total_updates: 0,
            blocked_actions: 0,
            warning_count: 0,
            trip_count: 0,
            last_warning: None,
            reason: None,
            listeners: ListenerSet::new("Breaker"),
        }
    }

    fn is_open_at(&self, now: Instant) -> bool {
        matches!(self.state, SourceState::Open { until } if now < until)
    }

    /// Closed, nothing left in the window and nobody listening.
    fn is_dormant(&self, now: Instant, window: Duration) -> bool {
        !self.is_open_at(now)
            && self.listeners.is_empty()
            && self
                .window
                .back()
                .map_or(true, |last| now.saturating_duration_since(*last) >= window)
    }

    fn snapshot(&self, source: &str, now: Instant) -> BreakerSnapshot {
        let open_remaining_ms = match self.state {
            SourceState::Open { until } if now < until => {
                Some(until.duration_since(now).as_millis() as u64)
            }
            _ => None,
        };
        BreakerSnapshot {
            source: source.to_string(),
            state: if open_remaining_ms.is_some() {
                BreakerState::Open
            } else {
                BreakerState::Closed
            },
            window_updates: self.window.len(),
            total_updates: self.total_updates,
            blocked_actions: self.blocked_actions,
            warning_count: self.warning_count,
            trip_count: self.trip_count,
            open_remaining_ms,
            reason: self.reason.clone(),
        }
    }

    fn emit(&mut self, source: &str, kind: BreakerEventKind, now: Instant) {
        if self.listeners.is_empty() {
            return;
        }
        let event = BreakerEvent {
            kind,
            snapshot: self.snapshot(source, now),
        };
        self.listeners.emit(&event);
    }

    /// Closes an expired breaker. Window counters start over.
    fn refresh(&mut self, source: &str, now: Instant) {
        if let SourceState::Open { until } = self.state {
            if now >= until {
                self.close(source, now);
                log::info!("Breaker: '{source}' closed after cooldown.");
            }
        }
    }

    fn close(&mut self, source: &str, now: Instant) {
        self.state = SourceState::Closed;
        self.window.clear();
        self.total_updates = 0;
        self.blocked_actions = 0;
        self.warning_count = 0;
        self.last_warning = None;
        self.emit(source, BreakerEventKind::Closed, now);
    }

    fn trip(&mut self, source: &str, now: Instant, cooldown: Duration, reason: String) {
        let was_open = self.is_open_at(now);
        self.state = SourceState::Open {
            until: now + cooldown,
        };
        if !was_open {
            self.trip_count += 1;
        }
        log::error!(
            "Breaker: '{source}' opened for {} ms: {reason}",
            cooldown.as_millis()
        );
        self.reason = Some(reason);
        self.emit(source, BreakerEventKind::Tripped, now);
    }

    fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.window.front() {
            if now.saturating_duration_since(*front) >= window {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Registry of per-source breakers.
///
/// Sources are created on first use and dropped once dormant. Every call
/// takes the current instant so the breaker can be driven by any clock.
#[derive(Debug)]
pub struct UpdateCircuitBreaker {
    config: BreakerConfig,
    sources: AHashMap<String, SourceBreaker>,
    last_sweep: Option<Instant>,
}

impl UpdateCircuitBreaker {
    /// Creates an empty registry.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            sources: AHashMap::new(),
            last_sweep: None,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Returns `false` while the source's breaker is open.
    ///
    /// Refused attempts are counted as blocked actions. Unknown sources are
    /// always allowed.
    pub fn should_allow(&mut self, source: &str, now: Instant) -> bool {
        let Some(breaker) = self.sources.get_mut(source) else {
            return true;
        };
        breaker.refresh(source, now);
        if breaker.is_open_at(now) {
            breaker.blocked_actions += 1;
            log::trace!("Breaker: '{source}' blocked an update attempt.");
            false
        } else {
            true
        }
    }

    /// Counts one update of `source`. Returns `false` when the update should
    /// be dropped because the breaker is open.
    ///
    /// The update that reaches the error threshold is still accepted; it is
    /// the one that opens the breaker.
    pub fn record_update(&mut self, source: &str, now: Instant) -> bool {
        let window = self.config.window();
        let cooldown = self.config.cooldown();
        let warning_interval = self.config.warning_interval();
        let warning_threshold = self.config.warning_threshold.max(1) as usize;
        let error_threshold = self.config.error_threshold.max(1) as usize;

        self.sweep(source, now);
        let breaker = self.breaker_mut(source);
        breaker.refresh(source, now);
        if breaker.is_open_at(now) {
            breaker.blocked_actions += 1;
            return false;
        }

        breaker.purge(now, window);
        breaker.window.push_back(now);
        breaker.total_updates += 1;
        let in_window = breaker.window.len();

        if in_window >= error_threshold {
            let reason = format!(
                "{in_window} updates within {} ms (limit {error_threshold})",
                window.as_millis()
            );
            breaker.trip(source, now, cooldown, reason);
        } else if in_window >= warning_threshold {
            let due = breaker
                .last_warning
                .map_or(true, |last| now.saturating_duration_since(last) >= warning_interval);
            if due {
                breaker.last_warning = Some(now);
                breaker.warning_count += 1;
                log::warn!(
                    "Breaker: '{source}' is updating rapidly ({in_window} updates within {} ms).",
                    window.as_millis()
                );
                breaker.emit(source, BreakerEventKind::Warning, now);
            }
        }
        true
    }

    /// Opens a source's breaker for one cooldown, regardless of its rate.
    pub fn force_trip(&mut self, source: &str, reason: &str, now: Instant) {
        let cooldown = self.config.cooldown();
        let breaker = self.breaker_mut(source);
        breaker.trip(source, now, cooldown, format!("forced: {reason}"));
    }

    /// Closes a source's breaker immediately. Returns `false` for unknown
    /// sources.
    pub fn reset(&mut self, source: &str, now: Instant) -> bool {
        let Some(breaker) = self.sources.get_mut(source) else {
            return false;
        };
        breaker.close(source, now);
        log::info!("Breaker: '{source}' reset.");
        true
    }

    /// Closes every breaker.
    pub fn reset_all(&mut self, now: Instant) {
        for (source, breaker) in self.sources.iter_mut() {
            breaker.close(source, now);
        }
        log::info!("Breaker: all {} sources reset.", self.sources.len());
    }

    /// Subscribes to a source's events. The source is created if needed.
    pub fn subscribe(
        &mut self,
        source: &str,
        listener: impl FnMut(&BreakerEvent) + Send + 'static,
    ) -> ListenerId {
        self.breaker_mut(source).listeners.subscribe(listener)
    }

    /// Removes a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&mut self, source: &str, id: ListenerId) -> bool {
        self.sources
            .get_mut(source)
            .is_some_and(|breaker| breaker.listeners.unsubscribe(id))
    }

    /// `true` while the source's breaker is open. Does not count as an
    /// attempt.
    pub fn is_open(&self, source: &str, now: Instant) -> bool {
        self.sources
            .get(source)
            .is_some_and(|breaker| breaker.is_open_at(now))
    }

    /// Status of one source.
    pub fn snapshot(&self, source: &str, now: Instant) -> Option<BreakerSnapshot> {
        self.sources
            .get(source)
            .map(|breaker| breaker.snapshot(source, now))
    }

    /// Status of every source, sorted by name.
    pub fn snapshots(&self, now: Instant) -> Vec<BreakerSnapshot> {
        let mut all: Vec<BreakerSnapshot> = self
            .sources
            .iter()
            .map(|(source, breaker)| breaker.snapshot(source, now))
            .collect();
        all.sort_by(|a, b| a.source.cmp(&b.source));
        all
    }

    /// Number of sources currently tracked.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Drops dormant sources other than `current`, at most once per window.
    fn sweep(&mut self, current: &str, now: Instant) {
        let window = self.config.window();
        if self
            .last_sweep
            .is_some_and(|last| now.saturating_duration_since(last) < window)
        {
            return;
        }
        self.last_sweep = Some(now);

        let before = self.sources.len();
        self.sources
            .retain(|source, breaker| source == current || !breaker.is_dormant(now, window));
        let dropped = before - self.sources.len();
        if dropped > 0 {
            log::debug!("Breaker: dropped {dropped} dormant source(s).");
        }
    }

    fn breaker_mut(&mut self, source: &str) -> &mut SourceBreaker {
        self.sources
            .entry(source.to_string())
            .or_insert_with(SourceBreaker::new)
    }
}

impl Default for UpdateCircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_trips_at_error_threshold_and_reopens_after_cooldown() {
        let mut breaker = UpdateCircuitBreaker::default();
        let t0 = Instant::now();
        for i in 0..15 {
            assert!(breaker.record_update("cart-store", t0 + ms(i * 5)));
        }
        assert!(breaker.is_open("cart-store", t0 + ms(80)));
        assert!(!breaker.record_update("cart-store", t0 + ms(80)));
        assert!(!breaker.should_allow("cart-store", t0 + ms(2000)));

        let reopen = t0 + ms(70) + ms(2500);
        assert!(!breaker.should_allow("cart-store", reopen - ms(1)));
        assert!(breaker.should_allow("cart-store", reopen));
        let snap = breaker.snapshot("cart-store", reopen).unwrap();
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(snap.window_updates, 0);
        assert_eq!(snap.trip_count, 1);
    }

    #[test]
    fn test_slow_updates_never_trip() {
        let mut breaker = UpdateCircuitBreaker::default();
        let t0 = Instant::now();
        for i in 0..100 {
            assert!(breaker.record_update("canvas", t0 + ms(i * 20)));
        }
        let snap = breaker.snapshot("canvas", t0 + ms(2000)).unwrap();
        assert_eq!(snap.trip_count, 0);
        assert!(snap.window_updates <= 10);
    }

    #[test]
    fn test_blocked_attempts_are_counted() {
        let mut breaker = UpdateCircuitBreaker::default();
        let t0 = Instant::now();
        breaker.force_trip("toolbar", "manual", t0);
        assert!(!breaker.should_allow("toolbar", t0));
        assert!(!breaker.record_update("toolbar", t0 + ms(1)));
        let snap = breaker.snapshot("toolbar", t0 + ms(1)).unwrap();
        assert_eq!(snap.blocked_actions, 2);
        assert_eq!(snap.reason.as_deref(), Some("forced: manual"));
        assert_eq!(snap.open_remaining_ms, Some(2499));
    }

    #[test]
    fn test_warning_is_throttled() {
        let mut breaker = UpdateCircuitBreaker::new(BreakerConfig {
            error_threshold: 1000,
            ..Default::default()
        });
        let t0 = Instant::now();
        for i in 0..40 {
            breaker.record_update("grid", t0 + ms(i));
        }
        assert_eq!(breaker.snapshot("grid", t0 + ms(40)).unwrap().warning_count, 1);
        for i in 0..20 {
            breaker.record_update("grid", t0 + ms(800 + i));
        }
        assert_eq!(breaker.snapshot("grid", t0 + ms(820)).unwrap().warning_count, 2);
    }

    #[test]
    fn test_reset_closes_and_unknown_reset_is_false() {
        let mut breaker = UpdateCircuitBreaker::default();
        let t0 = Instant::now();
        breaker.force_trip("a", "test", t0);
        breaker.force_trip("b", "test", t0);
        assert!(breaker.reset("a", t0));
        assert!(breaker.should_allow("a", t0));
        assert!(!breaker.reset("missing", t0));
        breaker.reset_all(t0);
        assert!(breaker.should_allow("b", t0));
    }

    #[test]
    fn test_listeners_see_trip_and_close_and_are_isolated() {
        let mut breaker = UpdateCircuitBreaker::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        breaker.subscribe("store", |_| panic!("listener bug"));
        let sink = seen.clone();
        breaker.subscribe("store", move |event| sink.lock().unwrap().push(event.kind));

        let t0 = Instant::now();
        breaker.force_trip("store", "test", t0);
        assert!(breaker.should_allow("store", t0 + ms(2500)));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![BreakerEventKind::Tripped, BreakerEventKind::Closed]
        );
    }

    #[test]
    fn test_dormant_sources_are_dropped() {
        let mut breaker = UpdateCircuitBreaker::default();
        let t0 = Instant::now();
        for i in 0..100 {
            breaker.record_update(&format!("node-{i}"), t0);
        }
        breaker.subscribe("watched", |_| {});
        for _ in 0..15 {
            breaker.record_update("noisy", t0);
        }
        assert_eq!(breaker.source_count(), 102);

        // The open breaker outlives the window; idle sources do not.
        breaker.record_update("x", t0 + ms(1000));
        let names: Vec<String> = breaker
            .snapshots(t0 + ms(1000))
            .into_iter()
            .map(|s| s.source)
            .collect();
        assert_eq!(names, vec!["noisy", "watched", "x"]);

        breaker.record_update("x", t0 + ms(2500 + 200));
        assert_eq!(breaker.source_count(), 2);
        assert!(breaker.snapshot("noisy", t0 + ms(2700)).is_none());
    }

    #[test]
    fn test_sources_are_independent() {
        let mut breaker = UpdateCircuitBreaker::default();
        let t0 = Instant::now();
        for _ in 0..15 {
            breaker.record_update("noisy", t0);
        }
        assert!(breaker.is_open("noisy", t0));
        assert!(breaker.record_update("quiet", t0));
        assert!(breaker.should_allow("never-seen", t0));
        let names: Vec<String> = breaker.snapshots(t0).into_iter().map(|s| s.source).collect();
        assert_eq!(names, vec!["noisy", "quiet"]);
    }
}
