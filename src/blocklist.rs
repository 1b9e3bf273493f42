// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Registry of blocked client IPs.
//!
//! Checked before any other work so blocked clients cost a single map lookup.
//! Entries are permanent unless a block TTL is configured; expired entries
//! read as unblocked and are purged by the janitor.

use crate::config::AbuseConfig;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// A single block.
#[derive(Debug, Clone)]
pub struct BlockEntry {
    pub reason: String,
    pub blocked_since: DateTime<Utc>,
    pub expires_at: Option<Instant>,
}

impl BlockEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }
}

/// Admin view of a block.
#[derive(Debug, Clone, Serialize)]
pub struct BlockedIp {
    pub ip: IpAddr,
    pub reason: String,
    pub blocked_since: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
}

pub struct BlockRegistry {
    ttl: Option<Duration>,
    default_retry_after: Duration,
    blocked: DashMap<IpAddr, BlockEntry>,
}

impl BlockRegistry {
    pub fn new(config: &AbuseConfig) -> Self {
        Self {
            ttl: config.block_ttl(),
            default_retry_after: Duration::from_secs(config.blocked_retry_after_secs),
            blocked: DashMap::new(),
        }
    }

    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let expired = match self.blocked.get(&ip) {
            None => return false,
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            self.blocked.remove_if(&ip, |_, entry| entry.is_expired(now));
            info!(%ip, "Block expired");
            return false;
        }
        true
    }

    /// Block `ip`. Returns `false` if it was already blocked.
    pub fn block(&self, ip: IpAddr, reason: impl Into<String>) -> bool {
        let now = Instant::now();
        let reason = reason.into();
        let expires_at = self.ttl.map(|ttl| now + ttl);

        let mut newly_blocked = true;
        self.blocked
            .entry(ip)
            .and_modify(|entry| {
                if entry.is_expired(now) {
                    *entry = BlockEntry {
                        reason: reason.clone(),
                        blocked_since: Utc::now(),
                        expires_at,
                    };
                } else {
                    newly_blocked = false;
                }
            })
            .or_insert_with(|| BlockEntry {
                reason: reason.clone(),
                blocked_since: Utc::now(),
                expires_at,
            });

        if newly_blocked {
            warn!(%ip, reason = %reason, ttl = ?self.ttl, "IP blocked");
        }
        newly_blocked
    }

    /// Administrative unblock. Returns whether `ip` was blocked.
    pub fn unblock(&self, ip: IpAddr) -> bool {
        let removed = self.blocked.remove(&ip).is_some();
        if removed {
            info!(%ip, "IP unblocked");
        }
        removed
    }

    /// How long a blocked client should wait: the remaining TTL, or the default.
    pub fn retry_after(&self, ip: IpAddr) -> Duration {
        let now = Instant::now();
        self.blocked
            .get(&ip)
            .and_then(|entry| entry.expires_at)
            .map(|expiry| expiry.saturating_duration_since(now))
            .unwrap_or(self.default_retry_after)
    }

    pub fn entries(&self) -> Vec<BlockedIp> {
        let now = Instant::now();
        let mut entries: Vec<BlockedIp> = self
            .blocked
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| BlockedIp {
                ip: *entry.key(),
                reason: entry.reason.clone(),
                blocked_since: entry.blocked_since,
                expires_in_secs: entry
                    .expires_at
                    .map(|expiry| expiry.saturating_duration_since(now).as_secs()),
            })
            .collect();
        entries.sort_by_key(|entry| entry.blocked_since);
        entries
    }

    /// Remove expired blocks. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        self.blocked.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}
