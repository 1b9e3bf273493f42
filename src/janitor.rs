// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Background eviction of idle gate state.
//!
//! Without it the per-identity and per-IP maps grow with every new client.
//! Entries in use by a request are never evicted.

use crate::controller::AdmissionController;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// What one sweep removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Token buckets and window entries idle past the TTL
    pub limiter_keys: usize,
    /// Abuse records whose events all decayed
    pub abuse_records: usize,
    /// Blocks past their TTL
    pub expired_blocks: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.limiter_keys + self.abuse_records + self.expired_blocks
    }
}

pub struct StateJanitor {
    controller: Arc<AdmissionController>,
    idle_ttl: Duration,
}

impl StateJanitor {
    pub fn new(controller: Arc<AdmissionController>, idle_ttl: Duration) -> Self {
        Self {
            controller,
            idle_ttl,
        }
    }

    /// Run one eviction pass.
    pub fn sweep(&self) -> SweepReport {
        let report = SweepReport {
            limiter_keys: self.controller.limiter().evict_idle(self.idle_ttl),
            abuse_records: self.controller.abuse().evict_expired(),
            expired_blocks: self.controller.blocklist().purge_expired(),
        };

        if report.total() > 0 {
            info!(
                limiter_keys = report.limiter_keys,
                abuse_records = report.abuse_records,
                expired_blocks = report.expired_blocks,
                "Evicted idle admission state"
            );
        } else {
            debug!("Janitor sweep found nothing to evict");
        }
        report
    }

    /// Sweep every `interval` until the returned task is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}
