// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Admission controller.
//!
//! Runs the per-request pipeline and produces exactly one [`Decision`]:
//!
//! 1. Block registry (or an abuse history already at threshold) → `Block`
//! 2. Payload validation → `Reject`, violation recorded
//! 3. Limiter chain → `Throttle`, violation recorded
//! 4. Otherwise `Allow` with quota metadata
//!
//! Nothing here performs I/O or waits; every step is a bounded in-memory
//! operation so the gate stays off the critical path it protects.

use crate::abuse::AbuseDetector;
use crate::blocklist::BlockRegistry;
use crate::config::{Config, FailurePolicy};
use crate::decision::{Action, Decision, DecisionEvent};
use crate::error::{GateError, Result};
use crate::limiter::{LimitOutcome, LimitSubject, Limiter, LimiterChain};
use crate::policy::Role;
use crate::validator::InputValidator;
use chrono::Utc;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

const REASON_INVALID_INPUT: &str = "invalid input";
const REASON_RATE_LIMITED: &str = "rate limit exceeded";

/// An authenticated request awaiting admission.
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionRequest {
    pub identity: String,
    pub role: Role,
    pub client_ip: IpAddr,
    pub payload: String,
}

impl AdmissionRequest {
    pub fn new(
        identity: impl Into<String>,
        role: Role,
        client_ip: IpAddr,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            role,
            client_ip,
            payload: payload.into(),
        }
    }
}

pub struct AdmissionController {
    blocklist: Arc<BlockRegistry>,
    validator: Arc<InputValidator>,
    limiter: Arc<dyn Limiter>,
    abuse: Arc<AbuseDetector>,
    failure_policy: FailurePolicy,
    events: broadcast::Sender<DecisionEvent>,
}

impl AdmissionController {
    pub fn new(
        blocklist: Arc<BlockRegistry>,
        validator: Arc<InputValidator>,
        limiter: Arc<dyn Limiter>,
        abuse: Arc<AbuseDetector>,
        failure_policy: FailurePolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            blocklist,
            validator,
            limiter,
            abuse,
            failure_policy,
            events,
        }
    }

    /// Build every component from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let policy = Arc::new(config.roles.to_policy());
        let limiter =
            LimiterChain::from_strategies(&config.limiter.strategies, policy, &config.window);

        Ok(Self::new(
            Arc::new(BlockRegistry::new(&config.abuse)),
            Arc::new(InputValidator::new(config.validation.clone())?),
            Arc::new(limiter),
            Arc::new(AbuseDetector::new(&config.abuse)),
            config.failure_policy,
        ))
    }

    /// Decide whether `request` may proceed.
    pub fn evaluate(&self, request: &AdmissionRequest) -> Decision {
        let decision = self.decide(request);
        self.emit(request, &decision);
        decision
    }

    fn decide(&self, request: &AdmissionRequest) -> Decision {
        let ip = request.client_ip;

        if self.blocklist.is_blocked(ip) || self.escalate(ip, "abuse threshold reached") {
            return Decision::block(self.blocklist.retry_after(ip));
        }

        let report = self.validator.validate(&request.payload);
        if !report.is_valid() {
            self.record_violation(ip, REASON_INVALID_INPUT);
            return Decision::reject(report.errors.iter().map(ToString::to_string).collect());
        }

        let subject = LimitSubject {
            identity: &request.identity,
            role: request.role,
            client_ip: ip,
        };

        match self.limiter.check(&subject) {
            Ok(LimitOutcome::Allowed { quota }) => {
                Decision::allow(quota, report.sanitized, report.warnings)
            }
            Ok(LimitOutcome::Limited {
                reason,
                quota,
                retry_after,
            }) => {
                self.record_violation(ip, REASON_RATE_LIMITED);
                Decision::throttle(quota, retry_after, reason.to_string())
            }
            Err(err) => self.on_internal_error(request, err, report.sanitized, report.warnings),
        }
    }

    fn record_violation(&self, ip: IpAddr, reason: &str) {
        self.abuse.record(ip, reason);
        self.escalate(ip, reason);
    }

    /// Move `ip` to the block registry if its history reached the threshold.
    ///
    /// The history is cleared once converted into a block, so an expired or
    /// lifted block starts from a clean slate.
    fn escalate(&self, ip: IpAddr, reason: &str) -> bool {
        if !self.abuse.should_block(ip) {
            return false;
        }
        self.blocklist.block(ip, reason);
        self.abuse.clear(ip);
        true
    }

    fn on_internal_error(
        &self,
        request: &AdmissionRequest,
        err: GateError,
        sanitized: String,
        warnings: Vec<String>,
    ) -> Decision {
        match self.failure_policy {
            FailurePolicy::FailClosed => {
                error!(
                    identity = %request.identity,
                    ip = %request.client_ip,
                    error = %err,
                    "Admission check failed, rejecting"
                );
                Decision::unavailable()
            }
            FailurePolicy::FailOpen => {
                warn!(
                    identity = %request.identity,
                    ip = %request.client_ip,
                    error = %err,
                    "Admission check failed, admitting (fail-open)"
                );
                Decision::allow_unmetered(sanitized, warnings)
            }
        }
    }

    fn emit(&self, request: &AdmissionRequest, decision: &Decision) {
        let payload_preview = match decision.action() {
            Action::Block => None,
            _ => Some(self.validator.redact_for_logging(&request.payload)),
        };

        match decision.action() {
            Action::Allow => debug!(
                identity = %request.identity,
                ip = %request.client_ip,
                remaining = decision.remaining(),
                "Request admitted"
            ),
            action => info!(
                identity = %request.identity,
                ip = %request.client_ip,
                %action,
                reason = decision.reason(),
                retry_after_secs = decision.retry_after_secs(),
                preview = payload_preview.as_deref().unwrap_or(""),
                "Request refused"
            ),
        }

        if self.events.receiver_count() == 0 {
            return;
        }
        let _ = self.events.send(DecisionEvent {
            at: Utc::now(),
            identity: request.identity.clone(),
            role: request.role,
            client_ip: request.client_ip,
            action: decision.action(),
            reason: decision.reason().to_string(),
            payload_preview,
        });
    }

    /// Administrative unblock; also forgets the IP's violation history.
    pub fn unblock(&self, ip: IpAddr) -> bool {
        self.abuse.clear(ip);
        self.blocklist.unblock(ip)
    }

    /// Receive every future decision event.
    pub fn subscribe(&self) -> broadcast::Receiver<DecisionEvent> {
        self.events.subscribe()
    }

    pub fn blocklist(&self) -> &BlockRegistry {
        &self.blocklist
    }

    pub fn abuse(&self) -> &AbuseDetector {
        &self.abuse
    }

    pub fn limiter(&self) -> &dyn Limiter {
        self.limiter.as_ref()
    }

    pub fn validator(&self) -> &InputValidator {
        &self.validator
    }
}
