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

//! Recommendations raised by budget checks and worker incidents.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Maximum number of recommendations handed to callers at any time.
pub const MAX_RECOMMENDATIONS: usize = 5;

/// How urgent a recommendation is. `Critical` sorts above `Warning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Degraded experience for one target.
    Warning,
    /// Risk to the whole process.
    Critical,
}

/// A suggestion surfaced to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Urgency.
    pub severity: Severity,
    /// Stable description of the problem. Used as the deduplication key,
    /// so it must not embed live measurements.
    pub message: String,
    /// What the user or the caller can do about it.
    pub suggested_action: String,
    /// Observed values and expected effect.
    pub impact: String,
}

impl Recommendation {
    /// Creates a warning-level recommendation.
    pub fn warning(
        message: impl Into<String>,
        suggested_action: impl Into<String>,
        impact: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            suggested_action: suggested_action.into(),
            impact: impact.into(),
        }
    }

    /// Creates a critical recommendation.
    pub fn critical(
        message: impl Into<String>,
        suggested_action: impl Into<String>,
        impact: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Critical,
            message: message.into(),
            suggested_action: suggested_action.into(),
            impact: impact.into(),
        }
    }

    fn same_key(&self, other: &Recommendation) -> bool {
        self.severity == other.severity && self.message == other.message
    }

    /// Deduplicates by (message, severity), keeps the first occurrence,
    /// orders critical before warning (stable otherwise) and caps the list
    /// at [`MAX_RECOMMENDATIONS`].
    pub fn prioritize(items: impl IntoIterator<Item = Recommendation>) -> Vec<Recommendation> {
        let mut unique: Vec<Recommendation> = Vec::new();
        for item in items {
            if !unique.iter().any(|existing| existing.same_key(&item)) {
                unique.push(item);
            }
        }
        unique.sort_by(|a, b| b.severity.cmp(&a.severity));
        unique.truncate(MAX_RECOMMENDATIONS);
        unique
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {} ({})", self.severity, self.message, self.impact)
    }
}

/// A bounded, deduplicated history of incident recommendations, newest first.
///
/// At capacity the oldest warning is evicted; criticals are only dropped
/// once no warning is left.
#[derive(Debug, Clone)]
pub struct RecommendationLog {
    entries: VecDeque<Recommendation>,
    capacity: usize,
}

impl RecommendationLog {
    /// Creates a log holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Records a recommendation. A repeated (message, severity) pair replaces
    /// the older entry and moves to the front.
    pub fn push(&mut self, recommendation: Recommendation) {
        self.entries
            .retain(|existing| !existing.same_key(&recommendation));
        self.entries.push_front(recommendation);
        while self.entries.len() > self.capacity {
            let victim = self
                .entries
                .iter()
                .rposition(|entry| entry.severity == Severity::Warning)
                .unwrap_or(self.entries.len() - 1);
            self.entries.remove(victim);
        }
    }

    /// Returns the entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Recommendation> {
        self.entries.iter()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for RecommendationLog {
    fn default() -> Self {
        Self::new(MAX_RECOMMENDATIONS)
    }
}

impl Extend<Recommendation> for RecommendationLog {
    fn extend<I: IntoIterator<Item = Recommendation>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warn(msg: &str) -> Recommendation {
        Recommendation::warning(msg, "act", "impact")
    }

    fn crit(msg: &str) -> Recommendation {
        Recommendation::critical(msg, "act", "impact")
    }

    #[test]
    fn test_prioritize_dedups_by_message_and_severity() {
        let list = Recommendation::prioritize(vec![warn("a"), warn("a"), crit("a")]);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].severity, Severity::Critical);
        assert_eq!(list[1].severity, Severity::Warning);
    }

    #[test]
    fn test_prioritize_caps_and_keeps_critical() {
        let mut items: Vec<Recommendation> = (0..8).map(|i| warn(&format!("w{i}"))).collect();
        items.push(crit("memory"));
        let list = Recommendation::prioritize(items);
        assert_eq!(list.len(), MAX_RECOMMENDATIONS);
        assert_eq!(list[0].message, "memory");
        assert_eq!(list[1].message, "w0");
    }

    #[test]
    fn test_log_replaces_duplicates_and_bounds_size() {
        let mut log = RecommendationLog::new(3);
        log.push(warn("a"));
        log.push(warn("b"));
        log.push(warn("a"));
        let order: Vec<&str> = log.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);

        log.extend(vec![warn("c"), warn("d")]);
        assert_eq!(log.len(), 3);
        let order: Vec<&str> = log.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(order, vec!["d", "c", "a"]);
    }

    #[test]
    fn test_log_evicts_warnings_before_criticals() {
        let mut log = RecommendationLog::default();
        log.push(crit("worker spawn"));
        for i in 0..5 {
            log.push(warn(&format!("w{i}")));
        }
        assert_eq!(log.len(), MAX_RECOMMENDATIONS);
        let order: Vec<&str> = log.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(order, vec!["w4", "w3", "w2", "w1", "worker spawn"]);

        let list = Recommendation::prioritize(log.iter().cloned());
        assert_eq!(list[0].severity, Severity::Critical);
    }

    #[test]
    fn test_log_full_of_criticals_drops_incoming_warning() {
        let mut log = RecommendationLog::new(2);
        log.push(crit("a"));
        log.push(crit("b"));
        log.push(warn("c"));
        let order: Vec<&str> = log.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);

        log.push(crit("d"));
        let order: Vec<&str> = log.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(order, vec!["d", "b"]);
    }
}
