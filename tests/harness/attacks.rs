// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Attack simulation patterns for security testing.

use admission_gate::policy::Role;
use std::time::Duration;

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of requests to send
    pub total_requests: usize,
    /// Gap between requests; zero sends back-to-back
    pub interval: Duration,
    /// Number of unique client IPs to rotate through
    pub unique_ips: usize,
    /// Number of unique identities to rotate through
    pub unique_identities: usize,
    /// Role every identity authenticates as
    pub role: Role,
    /// Share of requests carrying an injection payload (0.0-1.0)
    pub malicious_ratio: f64,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            interval: Duration::from_millis(100),
            unique_ips: 1,
            unique_identities: 1,
            role: Role::Viewer,
            malicious_ratio: 0.0,
        }
    }
}

/// Predefined attack patterns.
impl AttackConfig {
    /// One identity from one IP, far above its quota.
    pub fn identity_flood() -> Self {
        Self {
            total_requests: 200,
            interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    /// One shared credential used from many IPs.
    pub fn distributed_attack() -> Self {
        Self {
            total_requests: 500,
            interval: Duration::from_millis(20),
            unique_ips: 100,
            ..Default::default()
        }
    }

    /// Every request tries to subvert the model.
    pub fn prompt_injection_campaign() -> Self {
        Self {
            total_requests: 50,
            interval: Duration::from_millis(100),
            unique_ips: 5,
            unique_identities: 5,
            malicious_ratio: 1.0,
            ..Default::default()
        }
    }

    /// One identity hopping IPs to dodge per-IP tracking.
    pub fn ip_rotation() -> Self {
        Self {
            total_requests: 100,
            interval: Duration::ZERO,
            unique_ips: 50,
            ..Default::default()
        }
    }

    /// Stay just under the viewer rate.
    pub fn slow_drip() -> Self {
        Self {
            total_requests: 100,
            interval: Duration::from_millis(1100), // ~54/min < 60
            ..Default::default()
        }
    }

    /// Calculate expected duration for the attack.
    pub fn expected_duration(&self) -> Duration {
        self.interval * self.total_requests as u32
    }
}
