// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Role-based quota policy.
//!
//! Each authenticated role maps to a sustained rate (requests per minute)
//! and a burst capacity. Token buckets derive their refill rate and size
//! from this table once, when the bucket is first created.

use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Analyst,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Analyst, Role::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Analyst => "analyst",
            Role::Viewer => "viewer",
        }
    }

    /// Parse a role name, degrading unknown names to [`Role::Viewer`].
    pub fn parse_lossy(name: &str) -> Role {
        name.parse().unwrap_or(Role::Viewer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "analyst" => Ok(Role::Analyst),
            "viewer" => Ok(Role::Viewer),
            other => Err(GateError::Internal(format!("unknown role: {other}"))),
        }
    }
}

/// Quota for a single role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleLimits {
    /// Sustained rate; the bucket refills at `requests_per_minute / 60` tokens per second
    pub requests_per_minute: u32,
    /// Bucket capacity
    pub burst_capacity: u32,
}

impl RoleLimits {
    pub const fn new(requests_per_minute: u32, burst_capacity: u32) -> Self {
        Self {
            requests_per_minute,
            burst_capacity,
        }
    }

    pub fn refill_per_second(&self) -> f64 {
        self.requests_per_minute as f64 / 60.0
    }
}

/// Immutable role → limits table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleLimitPolicy {
    limits: HashMap<Role, RoleLimits>,
}

impl RoleLimitPolicy {
    pub fn from_table(limits: HashMap<Role, RoleLimits>) -> Self {
        Self { limits }
    }

    /// Look up the limits for a role.
    ///
    /// A role absent from the table is a configuration fault, not a client
    /// error, and is reported as [`GateError::Internal`].
    pub fn limits_for(&self, role: Role) -> Result<RoleLimits> {
        self.limits
            .get(&role)
            .copied()
            .ok_or_else(|| GateError::Internal(format!("no limits configured for role {role}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Role, &RoleLimits)> {
        self.limits.iter()
    }
}

pub fn default_role_limits() -> HashMap<Role, RoleLimits> {
    HashMap::from([
        (Role::Admin, RoleLimits::new(300, 50)),
        (Role::Analyst, RoleLimits::new(120, 20)),
        (Role::Viewer, RoleLimits::new(60, 10)),
    ])
}

impl Default for RoleLimitPolicy {
    fn default() -> Self {
        Self::from_table(default_role_limits())
    }
}
