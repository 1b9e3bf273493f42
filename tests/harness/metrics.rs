// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Metrics collection for attack simulation results.

use admission_gate::decision::Action;
use std::collections::HashMap;
use std::time::Duration;

/// Collects metrics during attack simulation.
#[derive(Debug, Default)]
pub struct AttackMetrics {
    /// Count of requests by outcome
    outcomes: HashMap<Action, usize>,
    /// Count of requests by IP
    requests_per_ip: HashMap<String, usize>,
    /// Count of requests by identity
    requests_per_identity: HashMap<String, usize>,
    /// Latency samples (microseconds)
    latencies: Vec<u64>,
}

impl AttackMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request outcome.
    pub fn record(&mut self, outcome: Action, ip: &str, identity: &str, latency: Duration) {
        *self.outcomes.entry(outcome).or_insert(0) += 1;
        *self.requests_per_ip.entry(ip.to_string()).or_insert(0) += 1;
        *self.requests_per_identity.entry(identity.to_string()).or_insert(0) += 1;
        self.latencies.push(latency.as_micros() as u64);
    }

    /// Get total request count.
    pub fn total_requests(&self) -> usize {
        self.outcomes.values().sum()
    }

    /// Get count for a specific outcome.
    pub fn count(&self, outcome: Action) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// Ratio of refused to total.
    pub fn block_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        let allowed = self.count(Action::Allow);
        (total - allowed) as f64 / total as f64
    }

    fn percentile_us(&self, p: f64) -> u64 {
        if self.latencies.is_empty() {
            return 0;
        }
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();
        let idx = (sorted.len() as f64 * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    /// Generate a summary report.
    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            total_requests: self.total_requests(),
            allowed: self.count(Action::Allow),
            throttled: self.count(Action::Throttle),
            rejected: self.count(Action::Reject),
            blocked: self.count(Action::Block),
            block_rate: self.block_rate(),
            median_latency_us: self.percentile_us(0.5),
            p99_latency_us: self.percentile_us(0.99),
            unique_ips: self.requests_per_ip.len(),
            unique_identities: self.requests_per_identity.len(),
        }
    }
}

/// Summary report of attack metrics.
#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub total_requests: usize,
    pub allowed: usize,
    pub throttled: usize,
    pub rejected: usize,
    pub blocked: usize,
    pub block_rate: f64,
    pub median_latency_us: u64,
    pub p99_latency_us: u64,
    pub unique_ips: usize,
    pub unique_identities: usize,
}

impl std::fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Attack Metrics Report ===")?;
        writeln!(f, "Total Requests:    {}", self.total_requests)?;
        writeln!(f)?;
        writeln!(f, "--- Outcomes ---")?;
        writeln!(f, "Allowed:           {}", self.allowed)?;
        writeln!(f, "Throttled:         {}", self.throttled)?;
        writeln!(f, "Rejected:          {}", self.rejected)?;
        writeln!(f, "Blocked:           {}", self.blocked)?;
        writeln!(f, "Block Rate:        {:.1}%", self.block_rate * 100.0)?;
        writeln!(f)?;
        writeln!(f, "--- Latency ---")?;
        writeln!(f, "Median:            {} us", self.median_latency_us)?;
        writeln!(f, "P99:               {} us", self.p99_latency_us)?;
        writeln!(f)?;
        writeln!(f, "--- Distribution ---")?;
        writeln!(f, "Unique IPs:        {}", self.unique_ips)?;
        writeln!(f, "Unique Identities: {}", self.unique_identities)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        let mut metrics = AttackMetrics::new();

        metrics.record(Action::Allow, "10.0.0.1", "a", Duration::from_micros(100));
        metrics.record(Action::Allow, "10.0.0.1", "b", Duration::from_micros(150));
        metrics.record(Action::Throttle, "10.0.0.1", "c", Duration::from_micros(50));

        assert_eq!(metrics.total_requests(), 3);
        assert_eq!(metrics.count(Action::Allow), 2);
        assert_eq!(metrics.count(Action::Throttle), 1);
        let report = metrics.report();
        assert_eq!(report.unique_ips, 1);
        assert_eq!(report.unique_identities, 3);
    }

    #[test]
    fn test_block_rate() {
        let mut metrics = AttackMetrics::new();
        for _ in 0..3 {
            metrics.record(Action::Allow, "10.0.0.1", "a", Duration::ZERO);
        }
        for _ in 0..7 {
            metrics.record(Action::Block, "10.0.0.1", "a", Duration::ZERO);
        }

        assert!((metrics.block_rate() - 0.7).abs() < 0.01);
    }
}
