// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Admission Gate
//!
//! Admission control for an expensive, metered backend. Every authenticated
//! request passes through [`AdmissionController::evaluate`] and comes out as
//! exactly one of allow, throttle, reject or block:
//!
//! - Role-based token buckets keyed by identity
//! - Burst window keyed by client IP and identity
//! - Payload validation, HTML escaping and log redaction
//! - Abuse tracking with escalation to an IP block
//! - Background eviction of idle per-key state

pub mod abuse;
pub mod blocklist;
pub mod config;
pub mod controller;
pub mod decision;
pub mod error;
pub mod handlers;
pub mod janitor;
pub mod limiter;
pub mod metrics;
pub mod policy;
pub mod validator;

pub use config::Config;
pub use controller::{AdmissionController, AdmissionRequest};
pub use decision::{Action, Decision, DecisionEvent};
pub use error::{GateError, Result};
pub use limiter::{Limiter, LimiterChain, TokenBucketLimiter, BurstWindowTracker};
pub use policy::{Role, RoleLimitPolicy, RoleLimits};
pub use validator::{InputValidator, ValidationReport};
