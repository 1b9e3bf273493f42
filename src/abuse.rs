// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Per-IP violation history.
//!
//! Every refused request (invalid payload, exhausted quota, full window) is
//! recorded against the client IP. Once an IP accumulates `block_threshold`
//! live events it should be moved to the block registry. Events older than
//! the decay window stop counting.

use crate::config::AbuseConfig;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One recorded violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspiciousEvent {
    pub at: Instant,
    pub reason: String,
}

/// Violation history for one IP, oldest first.
#[derive(Debug, Clone, Default)]
pub struct SuspiciousRecord {
    events: VecDeque<SuspiciousEvent>,
}

impl SuspiciousRecord {
    fn prune(&mut self, now: Instant, decay: Option<Duration>) {
        let Some(decay) = decay else {
            return;
        };
        while let Some(oldest) = self.events.front() {
            if now.saturating_duration_since(oldest.at) >= decay {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    fn live(
        &self,
        now: Instant,
        decay: Option<Duration>,
    ) -> impl Iterator<Item = &SuspiciousEvent> {
        self.events.iter().filter(move |event| match decay {
            Some(decay) => now.saturating_duration_since(event.at) < decay,
            None => true,
        })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Accumulates violations per client IP.
pub struct AbuseDetector {
    block_threshold: usize,
    decay: Option<Duration>,
    max_events_per_ip: usize,
    records: DashMap<IpAddr, SuspiciousRecord>,
}

impl AbuseDetector {
    pub fn new(config: &AbuseConfig) -> Self {
        Self {
            block_threshold: config.block_threshold,
            decay: config.decay(),
            max_events_per_ip: config.max_events_per_ip.max(config.block_threshold),
            records: DashMap::new(),
        }
    }

    /// Append a violation. Returns the number of live events for `ip` afterwards.
    pub fn record(&self, ip: IpAddr, reason: impl Into<String>) -> usize {
        let now = Instant::now();
        let reason = reason.into();

        let mut record = self.records.entry(ip).or_default();
        record.prune(now, self.decay);
        record.events.push_back(SuspiciousEvent {
            at: now,
            reason: reason.clone(),
        });
        while record.events.len() > self.max_events_per_ip {
            record.events.pop_front();
        }
        let count = record.events.len();
        drop(record);

        if count >= self.block_threshold {
            warn!(%ip, count, reason = %reason, "Suspicious activity threshold reached");
        } else {
            debug!(%ip, count, reason = %reason, "Suspicious activity recorded");
        }
        count
    }

    /// Whether `ip` has reached the block threshold.
    pub fn should_block(&self, ip: IpAddr) -> bool {
        self.live_count(ip) >= self.block_threshold
    }

    pub fn live_count(&self, ip: IpAddr) -> usize {
        let now = Instant::now();
        self.records
            .get(&ip)
            .map(|record| record.live(now, self.decay).count())
            .unwrap_or(0)
    }

    /// Live events for `ip`, oldest first.
    pub fn events(&self, ip: IpAddr) -> Vec<SuspiciousEvent> {
        let now = Instant::now();
        self.records
            .get(&ip)
            .map(|record| record.live(now, self.decay).cloned().collect())
            .unwrap_or_default()
    }

    /// Forget the history for `ip`. Returns whether there was one.
    pub fn clear(&self, ip: IpAddr) -> bool {
        self.records.remove(&ip).is_some()
    }

    /// Drop decayed events and records left empty. Returns the number of removed records.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.records.retain(|_, record| {
            record.prune(now, self.decay);
            let keep = !record.is_empty();
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    pub fn block_threshold(&self) -> usize {
        self.block_threshold
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(decay_secs: Option<u64>) -> AbuseDetector {
        AbuseDetector::new(&AbuseConfig {
            decay_secs,
            ..Default::default()
        })
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold() {
        let detector = detector(None);
        let ip = ip("203.0.113.7");

        for n in 1..5 {
            assert_eq!(detector.record(ip, "x"), n);
            assert!(!detector.should_block(ip));
        }
        assert_eq!(detector.record(ip, "x"), 5);
        assert!(detector.should_block(ip));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ips_are_independent() {
        let detector = detector(None);
        for _ in 0..5 {
            detector.record(ip("203.0.113.7"), "rate limit exceeded");
        }
        assert!(detector.should_block(ip("203.0.113.7")));
        assert!(!detector.should_block(ip("203.0.113.8")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_decay() {
        let detector = detector(Some(3600));
        let ip = ip("198.51.100.1");

        for _ in 0..4 {
            detector.record(ip, "invalid input");
        }
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(detector.live_count(ip), 0);

        detector.record(ip, "invalid input");
        assert!(!detector.should_block(ip));
        assert_eq!(detector.events(ip).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_decay_history_is_permanent() {
        let detector = detector(None);
        let ip = ip("198.51.100.2");
        for _ in 0..4 {
            detector.record(ip, "invalid input");
        }
        tokio::time::advance(Duration::from_secs(30 * 24 * 3600)).await;
        detector.record(ip, "invalid input");
        assert!(detector.should_block(ip));
        assert_eq!(detector.evict_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_capped() {
        let detector = AbuseDetector::new(&AbuseConfig {
            max_events_per_ip: 8,
            decay_secs: None,
            ..Default::default()
        });
        let ip = ip("198.51.100.3");
        for _ in 0..50 {
            detector.record(ip, "rate limit exceeded");
        }
        assert_eq!(detector.events(ip).len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired_and_clear() {
        let detector = detector(Some(60));
        detector.record(ip("192.0.2.1"), "x");
        tokio::time::advance(Duration::from_secs(30)).await;
        detector.record(ip("192.0.2.2"), "x");
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(detector.evict_expired(), 1);
        assert_eq!(detector.len(), 1);
        assert!(detector.clear(ip("192.0.2.2")));
        assert!(!detector.clear(ip("192.0.2.2")));
        assert!(detector.is_empty());
    }
}
