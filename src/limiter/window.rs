// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sliding-window request counter.
//!
//! Catches evenly timed bursts that a token bucket's refill would otherwise
//! let through: at most `max_requests` admissions per key in any trailing
//! `window`.

use super::{LimitOutcome, LimitReason, LimitSubject, Limiter, Quota};
use crate::error::Result;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Admission timestamps for one key, oldest first.
#[derive(Debug, Clone)]
pub struct BurstWindow {
    timestamps: VecDeque<Instant>,
    last_seen: Instant,
}

/// Outcome of a window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowVerdict {
    pub allowed: bool,
    /// Entries in the window after this check
    pub count: usize,
    /// Time until the oldest entry leaves the window
    pub retry_after: Duration,
}

impl BurstWindow {
    fn new(now: Instant) -> Self {
        Self {
            timestamps: VecDeque::new(),
            last_seen: now,
        }
    }

    /// Drop entries that are `window` old or older.
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn until_oldest_expires(&self, now: Instant, window: Duration) -> Duration {
        self.timestamps
            .front()
            .map(|oldest| window.saturating_sub(now.saturating_duration_since(*oldest)))
            .unwrap_or(Duration::ZERO)
    }

    fn check(&mut self, now: Instant, window: Duration, max_requests: u32) -> WindowVerdict {
        self.prune(now, window);
        self.last_seen = self.last_seen.max(now);

        let allowed = self.timestamps.len() < max_requests as usize;
        if allowed {
            self.timestamps.push_back(now);
        }

        WindowVerdict {
            allowed,
            count: self.timestamps.len(),
            retry_after: if allowed {
                Duration::ZERO
            } else {
                self.until_oldest_expires(now, window)
            },
        }
    }

    fn live_count(&self, now: Instant, window: Duration) -> usize {
        self.timestamps
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < window)
            .count()
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

/// Thread-safe sliding-window tracker keyed by arbitrary strings.
pub struct BurstWindowTracker {
    window: Duration,
    max_requests: u32,
    windows: DashMap<String, Arc<Mutex<BurstWindow>>>,
}

impl BurstWindowTracker {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            windows: DashMap::new(),
        }
    }

    fn entry(&self, key: &str) -> Arc<Mutex<BurstWindow>> {
        if let Some(existing) = self.windows.get(key) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(BurstWindow::new(Instant::now()))));
        Arc::clone(entry.value())
    }

    /// Record a request for `key` if the window has room.
    pub fn check(&self, key: &str) -> WindowVerdict {
        let window = self.entry(key);
        let mut window = window.lock();
        window.check(Instant::now(), self.window, self.max_requests)
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        self.check(key).allowed
    }

    /// Entries currently inside the window for `key`.
    pub fn count(&self, key: &str) -> usize {
        self.windows
            .get(key)
            .map(|w| w.lock().live_count(Instant::now(), self.window))
            .unwrap_or(0)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl Limiter for BurstWindowTracker {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    fn check(&self, subject: &LimitSubject<'_>) -> Result<LimitOutcome> {
        let key = subject.window_key();
        let window = self.entry(&key);
        let mut window = window.lock();
        let now = Instant::now();
        let verdict = window.check(now, self.window, self.max_requests);

        let quota = Quota {
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(verdict.count as u32),
            reset_in: window.until_oldest_expires(now, self.window),
        };

        if verdict.allowed {
            Ok(LimitOutcome::Allowed { quota })
        } else {
            debug!(
                %key,
                count = verdict.count,
                retry_after = ?verdict.retry_after,
                "Request window full"
            );
            Ok(LimitOutcome::Limited {
                reason: LimitReason::WindowFull,
                quota,
                retry_after: verdict.retry_after,
            })
        }
    }

    fn evict_idle(&self, idle_ttl: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.windows.retain(|_, window| {
            if Arc::strong_count(window) > 1 {
                return true;
            }
            // Live entries still count toward the limit, however short the TTL.
            let keep = match window.try_lock() {
                Some(w) => {
                    now.saturating_duration_since(w.last_seen()) < idle_ttl
                        || w.live_count(now, self.window) > 0
                }
                None => true,
            };
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    fn tracked_keys(&self) -> usize {
        self.len()
    }
}
