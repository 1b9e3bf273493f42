// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Per-identity token bucket limiter.
//!
//! Buckets are created lazily on an identity's first request and sized from
//! the role table at that moment. A later role change does not resize an
//! existing bucket; the identity keeps its original quota until the janitor
//! evicts the idle bucket.

use super::{LimitOutcome, LimitReason, LimitSubject, Limiter, Quota};
use crate::error::Result;
use crate::policy::{Role, RoleLimitPolicy, RoleLimits};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Token bucket for a single identity.
///
/// Invariant: `0 <= tokens <= capacity` after every operation.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Role limits the bucket was sized from
    limits: RoleLimits,
    /// Maximum tokens (bucket capacity)
    capacity: f64,
    /// Token refill rate per second
    refill_rate: f64,
    /// Available tokens
    tokens: f64,
    /// Last time tokens were refilled
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket sized from `limits`.
    pub fn new(limits: RoleLimits, now: Instant) -> Self {
        let capacity = limits.burst_capacity as f64;
        Self {
            limits,
            capacity,
            refill_rate: limits.refill_per_second(),
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Token count at `now`, without mutating the bucket.
    fn tokens_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.refill_rate).min(self.capacity)
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self, now: Instant) {
        self.tokens = self.tokens_at(now);
        self.last_refill = self.last_refill.max(now);
    }

    /// Try to take `cost` tokens. Leaves the balance untouched on refusal.
    pub fn try_consume(&mut self, cost: f64, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Whole tokens available at `now`.
    pub fn remaining(&self, now: Instant) -> u32 {
        self.tokens_at(now).floor() as u32
    }

    /// Seconds until the bucket is back at capacity.
    pub fn seconds_until_full(&self, now: Instant) -> f64 {
        let missing = self.capacity - self.tokens_at(now);
        if missing <= 0.0 {
            0.0
        } else if self.refill_rate > 0.0 {
            missing / self.refill_rate
        } else {
            f64::INFINITY
        }
    }

    pub fn limits(&self) -> RoleLimits {
        self.limits
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    fn quota(&self, now: Instant) -> Quota {
        Quota {
            limit: self.limits.requests_per_minute,
            remaining: self.remaining(now),
            reset_in: saturating_duration(self.seconds_until_full(now)),
        }
    }
}

fn saturating_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Thread-safe token bucket limiter keyed by identity.
///
/// Each bucket sits behind its own mutex, so unrelated identities never
/// contend; the map shard lock is only held while looking a bucket up.
pub struct TokenBucketLimiter {
    policy: Arc<RoleLimitPolicy>,
    buckets: DashMap<String, Arc<Mutex<TokenBucket>>>,
}

impl TokenBucketLimiter {
    pub fn new(policy: Arc<RoleLimitPolicy>) -> Self {
        Self {
            policy,
            buckets: DashMap::new(),
        }
    }

    /// Fetch the bucket for `identity`, creating it from `role` on first use.
    fn bucket(&self, identity: &str, role: Role) -> Result<Arc<Mutex<TokenBucket>>> {
        if let Some(existing) = self.buckets.get(identity) {
            return Ok(Arc::clone(existing.value()));
        }

        let limits = self.policy.limits_for(role)?;
        let entry = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| {
                debug!(identity, %role, ?limits, "Creating token bucket");
                Arc::new(Mutex::new(TokenBucket::new(limits, Instant::now())))
            });
        Ok(Arc::clone(entry.value()))
    }

    /// Charge `cost` tokens to `identity`. Returns whether the request was admitted.
    pub fn consume(&self, identity: &str, role: Role, cost: u32) -> Result<bool> {
        let bucket = self.bucket(identity, role)?;
        let mut bucket = bucket.lock();
        Ok(bucket.try_consume(cost as f64, Instant::now()))
    }

    /// Whole tokens left for `identity`, or `None` if it has no bucket.
    pub fn remaining(&self, identity: &str) -> Option<u32> {
        let bucket = self.buckets.get(identity)?;
        let remaining = bucket.lock().remaining(Instant::now());
        Some(remaining)
    }

    pub fn seconds_until_full(&self, identity: &str) -> Option<f64> {
        let bucket = self.buckets.get(identity)?;
        let secs = bucket.lock().seconds_until_full(Instant::now());
        Some(secs)
    }

    /// Snapshot of a bucket, for inspection.
    pub fn snapshot(&self, identity: &str) -> Option<TokenBucket> {
        self.buckets.get(identity).map(|b| b.lock().clone())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Limiter for TokenBucketLimiter {
    fn name(&self) -> &'static str {
        "token_bucket"
    }

    fn check(&self, subject: &LimitSubject<'_>) -> Result<LimitOutcome> {
        let bucket = self.bucket(subject.identity, subject.role)?;
        let mut bucket = bucket.lock();
        let now = Instant::now();

        if bucket.try_consume(1.0, now) {
            Ok(LimitOutcome::Allowed {
                quota: bucket.quota(now),
            })
        } else {
            let quota = bucket.quota(now);
            debug!(
                identity = subject.identity,
                retry_after = ?quota.reset_in,
                "Token bucket exhausted"
            );
            Ok(LimitOutcome::Limited {
                reason: LimitReason::QuotaExhausted,
                quota,
                retry_after: quota.reset_in,
            })
        }
    }

    fn evict_idle(&self, idle_ttl: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.buckets.retain(|_, bucket| {
            // A clone outside the map means a request is using the bucket right now.
            if Arc::strong_count(bucket) > 1 {
                return true;
            }
            // Only a refilled bucket can be dropped: a fresh one would start full.
            let keep = match bucket.try_lock() {
                Some(b) => {
                    now.saturating_duration_since(b.last_refill()) < idle_ttl
                        || b.tokens_at(now) < b.capacity()
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
