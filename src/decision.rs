// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Admission decisions and the events emitted for them.

use crate::error::{GateError, Result};
use crate::limiter::Quota;
use crate::policy::Role;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// What the gate decided for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Throttle,
    Reject,
    Block,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Throttle => "throttle",
            Action::Reject => "reject",
            Action::Block => "block",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RejectKind {
    Invalid(Vec<String>),
    /// The gate failed and the failure policy is fail-closed
    Unavailable,
}

/// Outcome of one admission evaluation. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    action: Action,
    limit: u32,
    remaining: u32,
    reset_at: DateTime<Utc>,
    retry_after_secs: u64,
    reason: String,
    warnings: Vec<String>,
    sanitized_payload: Option<String>,
    reject: Option<RejectKind>,
}

/// Whole seconds, rounded up so clients never retry early.
fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn from_now(duration: Duration) -> DateTime<Utc> {
    let delta = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
    Utc::now() + delta
}

impl Decision {
    fn new(action: Action, reason: impl Into<String>) -> Self {
        Self {
            action,
            limit: 0,
            remaining: 0,
            reset_at: Utc::now(),
            retry_after_secs: 0,
            reason: reason.into(),
            warnings: Vec::new(),
            sanitized_payload: None,
            reject: None,
        }
    }

    pub fn allow(quota: Quota, sanitized_payload: String, warnings: Vec<String>) -> Self {
        Self {
            limit: quota.limit,
            remaining: quota.remaining,
            reset_at: from_now(quota.reset_in),
            warnings,
            sanitized_payload: Some(sanitized_payload),
            ..Self::new(Action::Allow, "allowed")
        }
    }

    /// Admission without quota accounting, used when the gate fails open.
    pub fn allow_unmetered(sanitized_payload: String, warnings: Vec<String>) -> Self {
        Self {
            warnings,
            sanitized_payload: Some(sanitized_payload),
            ..Self::new(Action::Allow, "allowed without quota check")
        }
    }

    pub fn throttle(quota: Quota, retry_after: Duration, reason: impl Into<String>) -> Self {
        Self {
            limit: quota.limit,
            remaining: quota.remaining,
            reset_at: from_now(quota.reset_in),
            retry_after_secs: ceil_secs(retry_after).max(1),
            ..Self::new(Action::Throttle, reason)
        }
    }

    pub fn reject(errors: Vec<String>) -> Self {
        Self {
            reject: Some(RejectKind::Invalid(errors.clone())),
            ..Self::new(Action::Reject, errors.join("; "))
        }
    }

    /// Rejection caused by a fault inside the gate.
    pub fn unavailable() -> Self {
        Self {
            reject: Some(RejectKind::Unavailable),
            ..Self::new(Action::Reject, "admission check unavailable")
        }
    }

    pub fn block(retry_after: Duration) -> Self {
        Self {
            retry_after_secs: ceil_secs(retry_after),
            ..Self::new(Action::Block, "ip blocked")
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn is_allowed(&self) -> bool {
        self.action == Action::Allow
    }

    /// Advertised limit for `X-RateLimit-Limit`.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        self.reset_at
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after_secs
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Escaped payload to forward downstream. Only set on allow.
    pub fn sanitized_payload(&self) -> Option<&str> {
        self.sanitized_payload.as_deref()
    }

    /// Validation errors behind a reject.
    pub fn errors(&self) -> &[String] {
        match &self.reject {
            Some(RejectKind::Invalid(errors)) => errors,
            _ => &[],
        }
    }

    /// Map onto the error taxonomy: `Ok` only for an allow.
    pub fn into_result(self) -> Result<Decision> {
        match self.action {
            Action::Allow => Ok(self),
            Action::Throttle => Err(GateError::RateLimitExceeded {
                retry_after_secs: self.retry_after_secs,
            }),
            Action::Block => Err(GateError::Blocked {
                retry_after_secs: self.retry_after_secs,
            }),
            Action::Reject => match self.reject {
                Some(RejectKind::Invalid(errors)) => Err(GateError::Validation(errors)),
                _ => Err(GateError::Internal(self.reason)),
            },
        }
    }
}

/// Structured record of a decision, published for collaborators (metrics, audit).
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEvent {
    pub at: DateTime<Utc>,
    pub identity: String,
    pub role: Role,
    pub client_ip: IpAddr,
    pub action: Action,
    pub reason: String,
    /// Redacted, truncated payload; absent for blocked clients
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_preview: Option<String>,
}
