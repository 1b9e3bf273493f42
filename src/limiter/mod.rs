// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Quota limiters for the admission gate.
//!
//! Two strategies share the [`Limiter`] interface:
//! 1. Per-identity token bucket (primary throttle, sized by role)
//! 2. Per-(ip, identity) sliding window (secondary guard against timed bursts)
//!
//! [`LimiterChain`] composes them in configured order. Every strategy in the
//! chain has to admit a request for it to pass.

use crate::config::WindowConfig;
use crate::error::{GateError, Result};
use crate::policy::{Role, RoleLimitPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod token_bucket;
pub mod window;

pub use token_bucket::{TokenBucket, TokenBucketLimiter};
pub use window::{BurstWindow, BurstWindowTracker, WindowVerdict};

/// The caller a limit is evaluated for.
#[derive(Debug, Clone, Copy)]
pub struct LimitSubject<'a> {
    pub identity: &'a str,
    pub role: Role,
    pub client_ip: IpAddr,
}

impl LimitSubject<'_> {
    /// Key used by the sliding window: one window per (ip, identity) pair.
    pub fn window_key(&self) -> String {
        format!("{}:{}", self.client_ip, self.identity)
    }
}

/// Quota metadata reported to clients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quota {
    /// Advertised limit (requests per minute for buckets, requests per window for windows)
    pub limit: u32,
    /// Requests that could still be admitted right now
    pub remaining: u32,
    /// Time until the quota is fully restored
    pub reset_in: Duration,
}

/// Reason a limiter refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitReason {
    /// Token bucket has fewer tokens than the request costs
    QuotaExhausted,
    /// Sliding window already holds the maximum number of requests
    WindowFull,
}

impl fmt::Display for LimitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotaExhausted => write!(f, "rate limit exceeded"),
            Self::WindowFull => write!(f, "request window exceeded"),
        }
    }
}

/// Result of a limiter check.
#[derive(Debug, Clone, PartialEq)]
pub enum LimitOutcome {
    Allowed {
        quota: Quota,
    },
    Limited {
        reason: LimitReason,
        quota: Quota,
        /// Time the client should wait before retrying
        retry_after: Duration,
    },
}

impl LimitOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LimitOutcome::Allowed { .. })
    }

    pub fn quota(&self) -> Quota {
        match self {
            LimitOutcome::Allowed { quota } | LimitOutcome::Limited { quota, .. } => *quota,
        }
    }
}

/// A quota accounting strategy.
///
/// `check` is a single atomic read-modify-write per key: an admitted request
/// has already been charged when it returns.
pub trait Limiter: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, subject: &LimitSubject<'_>) -> Result<LimitOutcome>;

    /// Drop per-key state untouched for at least `idle_ttl`. Returns the number of evicted keys.
    fn evict_idle(&self, idle_ttl: Duration) -> usize;

    fn tracked_keys(&self) -> usize;
}

/// Strategy selector used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterStrategy {
    TokenBucket,
    SlidingWindow,
}

/// Ordered composition of limiters.
///
/// Stops at the first refusal, so later strategies are not charged for a
/// request an earlier one already refused. Charges made by earlier
/// strategies are never refunded.
pub struct LimiterChain {
    strategies: Vec<Arc<dyn Limiter>>,
}

impl LimiterChain {
    pub fn new(strategies: Vec<Arc<dyn Limiter>>) -> Self {
        Self { strategies }
    }

    /// Build the chain described by `strategies`.
    pub fn from_strategies(
        strategies: &[LimiterStrategy],
        policy: Arc<RoleLimitPolicy>,
        window: &WindowConfig,
    ) -> Self {
        let strategies = strategies
            .iter()
            .map(|strategy| -> Arc<dyn Limiter> {
                match strategy {
                    LimiterStrategy::TokenBucket => {
                        Arc::new(TokenBucketLimiter::new(Arc::clone(&policy)))
                    }
                    LimiterStrategy::SlidingWindow => Arc::new(BurstWindowTracker::new(
                        window.window_duration(),
                        window.max_requests,
                    )),
                }
            })
            .collect();
        Self::new(strategies)
    }
}

impl Limiter for LimiterChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    /// Quota metadata always comes from the first strategy; a later refusal
    /// keeps its own reason and retry hint.
    fn check(&self, subject: &LimitSubject<'_>) -> Result<LimitOutcome> {
        let mut primary = None;
        for strategy in &self.strategies {
            match strategy.check(subject)? {
                LimitOutcome::Allowed { quota } => {
                    primary.get_or_insert(quota);
                }
                LimitOutcome::Limited {
                    reason,
                    quota,
                    retry_after,
                } => {
                    debug!(strategy = strategy.name(), %reason, "Limiter refused request");
                    return Ok(LimitOutcome::Limited {
                        reason,
                        quota: primary.unwrap_or(quota),
                        retry_after,
                    });
                }
            }
        }

        primary
            .map(|quota| LimitOutcome::Allowed { quota })
            .ok_or_else(|| GateError::Internal("no limiter strategies configured".to_string()))
    }

    fn evict_idle(&self, idle_ttl: Duration) -> usize {
        self.strategies
            .iter()
            .map(|strategy| strategy.evict_idle(idle_ttl))
            .sum()
    }

    fn tracked_keys(&self) -> usize {
        self.strategies.iter().map(|s| s.tracked_keys()).sum()
    }
}
