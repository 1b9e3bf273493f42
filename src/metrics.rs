// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters fed from the controller's decision events.

use crate::controller::AdmissionController;
use crate::decision::DecisionEvent;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::warn;

pub struct DecisionMetrics {
    registry: Registry,
    decisions: IntCounterVec,
    dropped_events: IntCounter,
    blocked_ips: IntGauge,
    tracked_keys: IntGauge,
}

impl DecisionMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let decisions = IntCounterVec::new(
            Opts::new("admission_decisions_total", "Admission decisions by action and role"),
            &["action", "role"],
        )?;
        let dropped_events = IntCounter::new(
            "admission_decision_events_dropped_total",
            "Decision events the metrics collector fell behind on",
        )?;
        let blocked_ips = IntGauge::new("admission_blocked_ips", "Currently blocked client IPs")?;
        let tracked_keys = IntGauge::new(
            "admission_limiter_tracked_keys",
            "Per-key limiter entries held in memory",
        )?;

        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(dropped_events.clone()))?;
        registry.register(Box::new(blocked_ips.clone()))?;
        registry.register(Box::new(tracked_keys.clone()))?;

        Ok(Self {
            registry,
            decisions,
            dropped_events,
            blocked_ips,
            tracked_keys,
        })
    }

    pub fn observe(&self, event: &DecisionEvent) {
        self.decisions
            .with_label_values(&[event.action.as_str(), event.role.as_str()])
            .inc();
    }

    pub fn decisions(&self, action: &str, role: &str) -> u64 {
        self.decisions.with_label_values(&[action, role]).get()
    }

    /// Consume decision events until the controller goes away.
    pub fn spawn_collector(
        self: Arc<Self>,
        mut events: broadcast::Receiver<DecisionEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.observe(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Metrics collector lagging behind decision events");
                        self.dropped_events.inc_by(skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Render the text exposition format, refreshing gauges from `controller`.
    pub fn render(&self, controller: &AdmissionController) -> prometheus::Result<String> {
        self.blocked_ips.set(controller.blocklist().len() as i64);
        self.tracked_keys
            .set(controller.limiter().tracked_keys() as i64);

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
