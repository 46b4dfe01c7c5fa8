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

use archicomm_guard::{
    BreakerConfig, BreakerEventKind, BreakerState, UpdateCircuitBreaker, UpdateDepthConfig,
    UpdateDepthMonitor, UpdateKey,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn test_cart_store_storm_opens_breaker() {
    let mut breaker = UpdateCircuitBreaker::new(BreakerConfig {
        error_threshold: 15,
        ..Default::default()
    });
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    breaker.subscribe("cart-store", move |event| sink.lock().unwrap().push(event.clone()));

    let t0 = Instant::now();
    let results: Vec<bool> = (0..16)
        .map(|i| breaker.record_update("cart-store", t0 + ms(i * 10)))
        .collect();
    assert!(results[..15].iter().all(|ok| *ok));
    assert!(!results[15]);

    let snapshot = breaker.snapshot("cart-store", t0 + ms(160)).unwrap();
    assert_eq!(snapshot.state, BreakerState::Open);
    assert_eq!(snapshot.blocked_actions, 1);

    // Every attempt inside the cooldown is refused.
    for i in 0..20 {
        assert!(!breaker.record_update("cart-store", t0 + ms(200 + i * 100)));
    }

    let events = events.lock().unwrap();
    let kinds: Vec<BreakerEventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![BreakerEventKind::Warning, BreakerEventKind::Tripped]);
    assert_eq!(events[1].snapshot.trip_count, 1);
}

#[test]
fn test_breaker_allows_again_after_cooldown() {
    let config = BreakerConfig::default();
    let mut breaker = UpdateCircuitBreaker::new(config.clone());
    let t0 = Instant::now();
    for _ in 0..config.error_threshold {
        breaker.record_update("canvas", t0);
    }
    assert!(!breaker.should_allow("canvas", t0));
    assert!(!breaker.should_allow("canvas", t0 + config.cooldown() - ms(1)));
    assert!(breaker.should_allow("canvas", t0 + config.cooldown()));
    assert!(breaker.record_update("canvas", t0 + config.cooldown()));
}

#[test]
fn test_emergency_resets_a_key_near_its_limit() {
    let config = UpdateDepthConfig::default();
    let mut monitor = UpdateDepthMonitor::new(config.clone());
    let t0 = Instant::now();
    let near = UpdateKey::new("properties-panel");
    for _ in 0..24 {
        assert!(monitor.record_update(near.clone(), t0));
    }
    assert_eq!(monitor.update_count(&near, t0), 24);

    let runaway = UpdateKey::new("layout-effect");
    for _ in 0..=config.max_updates_per_component {
        monitor.record_update(runaway.clone(), t0 + ms(10));
    }
    assert!(monitor.is_emergency(t0 + ms(10)));
    assert_eq!(monitor.update_count(&near, t0 + ms(10)), 0);

    let after = t0 + ms(10) + config.emergency_duration();
    assert!(monitor.record_update(near.clone(), after));
    assert_eq!(monitor.update_count(&near, after), 1);
}

#[test]
fn test_layers_are_independent() {
    let mut breaker = UpdateCircuitBreaker::default();
    let mut monitor = UpdateDepthMonitor::default();
    let t0 = Instant::now();

    // 20 updates in 1 s: fine for the breaker (200 ms window) and the monitor.
    for i in 0..20 {
        assert!(breaker.record_update("editor", t0 + ms(i * 50)));
        assert!(monitor.record_update(UpdateKey::new("editor"), t0 + ms(i * 50)));
    }
    monitor.record_update(UpdateKey::new("x"), t0 + ms(999));
    assert!(!breaker.is_open("editor", t0 + ms(1000)));
}

#[test]
fn test_snapshot_serializes_for_diagnostics() {
    let mut breaker = UpdateCircuitBreaker::default();
    let t0 = Instant::now();
    breaker.force_trip("diagram-store", "undo storm", t0);
    let snapshot = breaker.snapshot("diagram-store", t0).unwrap();

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["source"], "diagram-store");
    assert_eq!(json["reason"], "forced: undo storm");
}
