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

//! Polled periodic timer for the monitoring tick.

use std::time::{Duration, Instant};

/// Fires at most once per poll, on a fixed period.
///
/// When the caller falls behind by more than one period the missed ticks are
/// skipped, never replayed back to back.
#[derive(Debug, Clone)]
pub struct TickTimer {
    period: Duration,
    next_due: Option<Instant>,
    skipped: u64,
}

impl TickTimer {
    /// Creates a disarmed timer. The first poll arms it.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            next_due: None,
            skipped: 0,
        }
    }

    /// The tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Total ticks dropped because the caller fell behind.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Returns `true` if a tick is due at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(due) = self.next_due else {
            self.next_due = Some(now + self.period);
            return false;
        };
        if now < due {
            return false;
        }

        let late = now.duration_since(due);
        let missed = (late.as_nanos() / self.period.as_nanos()) as u64;
        if missed > 0 {
            self.skipped += missed;
            log::debug!("Tick: fell behind, skipping {missed} tick(s).");
        }
        let advance = u32::try_from(missed + 1).unwrap_or(u32::MAX);
        self.next_due = Some(due + self.period * advance);
        true
    }

    /// Disarms the timer; the next poll re-arms it.
    pub fn reset(&mut self) {
        self.next_due = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_period() {
        let t0 = Instant::now();
        let mut timer = TickTimer::new(Duration::from_millis(500));
        assert!(!timer.poll(t0));
        assert!(!timer.poll(t0 + Duration::from_millis(499)));
        assert!(timer.poll(t0 + Duration::from_millis(500)));
        assert!(!timer.poll(t0 + Duration::from_millis(600)));
        assert!(timer.poll(t0 + Duration::from_millis(1000)));
    }

    #[test]
    fn test_missed_ticks_are_skipped() {
        let t0 = Instant::now();
        let mut timer = TickTimer::new(Duration::from_millis(100));
        timer.poll(t0);
        assert!(timer.poll(t0 + Duration::from_millis(450)));
        assert_eq!(timer.skipped(), 3);
        // No catch-up burst.
        assert!(!timer.poll(t0 + Duration::from_millis(460)));
        assert!(timer.poll(t0 + Duration::from_millis(500)));
    }
}
