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

//! Global update-depth monitor.

use ahash::{AHashMap, RandomState};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Fixed seeds so equal payloads hash equally across monitor instances.
const PAYLOAD_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Configuration of the [`UpdateDepthMonitor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateDepthConfig {
    /// Length of the shared counting window, in milliseconds.
    pub window_ms: u64,
    /// Updates one key may make inside the window.
    pub max_updates_per_component: u32,
    /// Updates all keys together may make inside the window.
    pub max_updates_per_second: u32,
    /// How long emergency mode lasts, in milliseconds.
    pub emergency_duration_ms: u64,
}

impl Default for UpdateDepthConfig {
    fn default() -> Self {
        Self {
            window_ms: 1000,
            max_updates_per_component: 25,
            max_updates_per_second: 60,
            emergency_duration_ms: 5000,
        }
    }
}

impl UpdateDepthConfig {
    /// Counting window length.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Emergency mode duration.
    pub fn emergency_duration(&self) -> Duration {
        Duration::from_millis(self.emergency_duration_ms)
    }
}

/// Optional context attached to an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateMeta {
    /// Action or setter that caused the update, for diagnostics.
    pub action: Option<String>,
    /// Hash of the update payload; distinguishes repeated identical updates
    /// from legitimate streams of distinct ones.
    pub payload_hash: Option<u64>,
}

impl UpdateMeta {
    /// Metadata naming the triggering action.
    pub fn action(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            payload_hash: None,
        }
    }

    /// Attaches the hash of `payload`.
    pub fn with_payload<T: Hash + ?Sized>(mut self, payload: &T) -> Self {
        self.payload_hash = Some(hash_payload(payload));
        self
    }
}

/// Hashes a payload with the monitor's fixed seeds.
pub fn hash_payload<T: Hash + ?Sized>(payload: &T) -> u64 {
    let [k0, k1, k2, k3] = PAYLOAD_SEEDS;
    RandomState::with_seeds(k0, k1, k2, k3).hash_one(payload)
}

/// Identity counted by the depth monitor: a component or store name plus an
/// optional payload hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpdateKey {
    name: String,
    payload_hash: Option<u64>,
}

impl UpdateKey {
    /// Key for a bare name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload_hash: None,
        }
    }

    /// Key for a name and its update metadata.
    pub fn from_meta(name: impl Into<String>, meta: &UpdateMeta) -> Self {
        Self {
            name: name.into(),
            payload_hash: meta.payload_hash,
        }
    }

    /// The component or store name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for UpdateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.payload_hash {
            Some(hash) => write!(f, "{}#{hash:016x}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DepthEntry {
    update_count: u32,
    window_start: Instant,
}

/// Counts updates per key and globally inside a shared window.
///
/// Exceeding either cap enters emergency mode: every counter is cleared and
/// all updates are refused until the emergency duration elapses. Entry and
/// exit are each logged once.
#[derive(Debug)]
pub struct UpdateDepthMonitor {
    config: UpdateDepthConfig,
    entries: AHashMap<UpdateKey, DepthEntry>,
    global: VecDeque<Instant>,
    emergency_until: Option<Instant>,
    emergencies_total: u64,
}

impl UpdateDepthMonitor {
    /// Creates an idle monitor.
    pub fn new(config: UpdateDepthConfig) -> Self {
        Self {
            config,
            entries: AHashMap::new(),
            global: VecDeque::new(),
            emergency_until: None,
            emergencies_total: 0,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &UpdateDepthConfig {
        &self.config
    }

    /// Counts one update. Returns `false` in emergency mode, including for
    /// the update that triggers it.
    pub fn record_update(&mut self, key: UpdateKey, now: Instant) -> bool {
        self.purge(now);
        if self.emergency_until.is_some() {
            return false;
        }

        let entry = self.entries.entry(key.clone()).or_insert(DepthEntry {
            update_count: 0,
            window_start: now,
        });
        entry.update_count += 1;
        let key_count = entry.update_count;
        self.global.push_back(now);

        if key_count > self.config.max_updates_per_component {
            self.enter_emergency(
                now,
                format!(
                    "'{key}' updated {key_count} times within {} ms",
                    self.config.window_ms
                ),
            );
            return false;
        }
        if self.global.len() > self.config.max_updates_per_second as usize {
            self.enter_emergency(
                now,
                format!(
                    "{} updates within {} ms across all components",
                    self.global.len(),
                    self.config.window_ms
                ),
            );
            return false;
        }
        true
    }

    /// Updates counted for `key` in the current window.
    pub fn update_count(&mut self, key: &UpdateKey, now: Instant) -> u32 {
        self.purge(now);
        self.entries.get(key).map_or(0, |entry| entry.update_count)
    }

    /// Updates counted across every key in the current window.
    pub fn global_count(&mut self, now: Instant) -> usize {
        self.purge(now);
        self.global.len()
    }

    /// Keys currently tracked.
    pub fn tracked_keys(&mut self, now: Instant) -> usize {
        self.purge(now);
        self.entries.len()
    }

    /// `true` while emergency mode lasts.
    pub fn is_emergency(&self, now: Instant) -> bool {
        self.emergency_until.is_some_and(|until| now < until)
    }

    /// Remaining emergency time, if any.
    pub fn emergency_remaining(&self, now: Instant) -> Option<Duration> {
        self.emergency_until
            .filter(|until| now < *until)
            .map(|until| until.duration_since(now))
    }

    /// Emergencies entered since creation.
    pub fn emergencies_total(&self) -> u64 {
        self.emergencies_total
    }

    fn enter_emergency(&mut self, now: Instant, reason: String) {
        self.entries.clear();
        self.global.clear();
        self.emergency_until = Some(now + self.config.emergency_duration());
        self.emergencies_total += 1;
        log::warn!(
            "UpdateDepth: entering emergency mode for {} ms: {reason}",
            self.config.emergency_duration_ms
        );
    }

    /// Ends an expired emergency and drops stale counters.
    fn purge(&mut self, now: Instant) {
        if let Some(until) = self.emergency_until {
            if now >= until {
                self.emergency_until = None;
                log::info!("UpdateDepth: emergency mode over, updates flow again.");
            }
        }

        let window = self.config.window();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.window_start) < window);
        while let Some(front) = self.global.front() {
            if now.saturating_duration_since(*front) >= window {
                self.global.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for UpdateDepthMonitor {
    fn default() -> Self {
        Self::new(UpdateDepthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_per_key_cap_enters_emergency_and_resets_counts() {
        let mut monitor = UpdateDepthMonitor::default();
        let t0 = Instant::now();
        let hot = UpdateKey::new("diagram-store");
        let warm = UpdateKey::new("sidebar");

        for i in 0..24 {
            assert!(monitor.record_update(warm.clone(), t0 + ms(i)));
        }
        assert_eq!(monitor.update_count(&warm, t0 + ms(30)), 24);

        // 49 updates in total: the per-key cap is the trigger, not the global one.
        for i in 0..25 {
            assert!(monitor.record_update(hot.clone(), t0 + ms(30 + i)));
        }
        assert!(!monitor.record_update(hot.clone(), t0 + ms(60)));
        assert!(monitor.is_emergency(t0 + ms(60)));
        assert_eq!(monitor.update_count(&hot, t0 + ms(61)), 0);
        assert_eq!(monitor.update_count(&warm, t0 + ms(61)), 0);
        assert_eq!(monitor.emergencies_total(), 1);
    }

    #[test]
    fn test_counts_restart_from_zero_after_emergency() {
        let mut monitor = UpdateDepthMonitor::default();
        let t0 = Instant::now();
        let key = UpdateKey::new("store");
        for i in 0..24 {
            monitor.record_update(key.clone(), t0 + ms(i));
        }
        // A burst of distinct keys trips the global cap.
        for i in 0..40 {
            monitor.record_update(UpdateKey::new(format!("c{i}")), t0 + ms(100));
        }
        assert!(monitor.is_emergency(t0 + ms(100)));
        assert!(!monitor.record_update(key.clone(), t0 + ms(2000)));

        let after = t0 + ms(100) + ms(5000);
        assert!(!monitor.is_emergency(after));
        assert!(monitor.record_update(key.clone(), after));
        assert_eq!(monitor.update_count(&key, after), 1);
    }

    #[test]
    fn test_global_cap() {
        let mut monitor = UpdateDepthMonitor::default();
        let t0 = Instant::now();
        for i in 0..60 {
            assert!(monitor.record_update(UpdateKey::new(format!("k{}", i % 5)), t0 + ms(i)));
        }
        assert!(!monitor.record_update(UpdateKey::new("k0"), t0 + ms(61)));
        assert!(monitor.emergency_remaining(t0 + ms(61)).is_some());
    }

    #[test]
    fn test_stale_entries_are_purged() {
        let mut monitor = UpdateDepthMonitor::default();
        let t0 = Instant::now();
        monitor.record_update(UpdateKey::new("old"), t0);
        assert_eq!(monitor.tracked_keys(t0 + ms(999)), 1);
        assert_eq!(monitor.tracked_keys(t0 + ms(1000)), 0);
        assert_eq!(monitor.global_count(t0 + ms(1000)), 0);
    }

    #[test]
    fn test_payload_hash_distinguishes_keys() {
        let a = UpdateKey::from_meta("store", &UpdateMeta::default().with_payload("a"));
        let b = UpdateKey::from_meta("store", &UpdateMeta::default().with_payload("b"));
        let a2 = UpdateKey::from_meta("store", &UpdateMeta::action("set").with_payload("a"));
        assert_ne!(a, b);
        assert_eq!(a, a2);
        assert!(a.to_string().starts_with("store#"));
        assert_eq!(UpdateKey::new("plain").to_string(), "plain");
    }
}
