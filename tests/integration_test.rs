// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the admission gate.

use admission_gate::{
    config::{Config, ValidationConfig},
    controller::{AdmissionController, AdmissionRequest},
    decision::Action,
    error::GateError,
    limiter::{BurstWindowTracker, TokenBucketLimiter},
    policy::{Role, RoleLimitPolicy},
    validator::InputValidator,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

const QUESTION: &str = "Which obligations apply to deployers of high-risk AI systems?";

fn request(identity: &str, role: Role, ip: &str, payload: &str) -> AdmissionRequest {
    AdmissionRequest::new(identity, role, ip.parse().unwrap(), payload)
}

#[tokio::test(start_paused = true)]
async fn test_full_admission_flow() {
    let controller = AdmissionController::from_config(&Config::default()).unwrap();

    let decision =
        controller.evaluate(&request("analyst-7", Role::Analyst, "192.168.1.100", QUESTION));
    assert_eq!(decision.action(), Action::Allow);
    assert_eq!(decision.limit(), 120);
    assert_eq!(decision.remaining(), 19);
    assert_eq!(decision.sanitized_payload(), Some(QUESTION));
    assert!(decision.into_result().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_viewer_burst_is_ten() {
    let controller = AdmissionController::from_config(&Config::default()).unwrap();

    for i in 0..10 {
        let decision =
            controller.evaluate(&request("viewer-1", Role::Viewer, "10.0.0.1", QUESTION));
        assert_eq!(decision.action(), Action::Allow, "Request {} should be allowed", i + 1);
    }

    let decision = controller.evaluate(&request("viewer-1", Role::Viewer, "10.0.0.1", QUESTION));
    assert_eq!(decision.action(), Action::Throttle);
    assert_eq!(decision.remaining(), 0);
    assert!(decision.retry_after_secs() >= 1);
    assert!(matches!(
        decision.into_result(),
        Err(GateError::RateLimitExceeded { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_bucket_refills_to_capacity() {
    let limiter = TokenBucketLimiter::new(Arc::new(RoleLimitPolicy::default()));

    for _ in 0..10 {
        assert!(limiter.consume("viewer-2", Role::Viewer, 1).unwrap());
    }
    assert_eq!(limiter.remaining("viewer-2"), Some(0));

    // Viewer refills at one token per second.
    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(limiter.remaining("viewer-2"), Some(10));
}

#[tokio::test(start_paused = true)]
async fn test_burst_window_slides() {
    let tracker = BurstWindowTracker::new(Duration::from_secs(60), 5);

    for _ in 0..5 {
        assert!(tracker.is_allowed("10.0.0.2:viewer-3"));
    }
    assert!(!tracker.is_allowed("10.0.0.2:viewer-3"));

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(tracker.is_allowed("10.0.0.2:viewer-3"));
    assert_eq!(tracker.count("10.0.0.2:viewer-3"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abuse_history_blocks_despite_quota() {
    let controller = AdmissionController::from_config(&Config::default()).unwrap();
    let ip: IpAddr = "10.0.0.3".parse().unwrap();

    for _ in 0..5 {
        controller.abuse().record(ip, "x");
    }
    assert!(controller.abuse().should_block(ip));

    let decision = controller.evaluate(&request("admin-1", Role::Admin, "10.0.0.3", QUESTION));
    assert_eq!(decision.action(), Action::Block);
    assert_eq!(
        decision.into_result(),
        Err(GateError::Blocked {
            retry_after_secs: 3600
        })
    );
    assert!(controller.blocklist().is_blocked(ip));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_invalid_input_escalates_to_block() {
    let controller = AdmissionController::from_config(&Config::default()).unwrap();

    for _ in 0..5 {
        let decision = controller.evaluate(&request("viewer-4", Role::Viewer, "10.0.0.4", "Hi"));
        assert_eq!(decision.action(), Action::Reject);
    }

    // Blocked by IP: a different identity with a valid payload is refused too.
    let decision = controller.evaluate(&request("viewer-5", Role::Viewer, "10.0.0.4", QUESTION));
    assert_eq!(decision.action(), Action::Block);

    let other = controller.evaluate(&request("viewer-5", Role::Viewer, "10.0.0.5", QUESTION));
    assert_eq!(other.action(), Action::Allow);
}

#[tokio::test(start_paused = true)]
async fn test_unblock_restores_access() {
    let controller = AdmissionController::from_config(&Config::default()).unwrap();
    let ip: IpAddr = "10.0.0.6".parse().unwrap();
    controller.blocklist().block(ip, "manual");

    assert_eq!(
        controller.evaluate(&request("viewer-6", Role::Viewer, "10.0.0.6", QUESTION)).action(),
        Action::Block
    );
    assert!(controller.unblock(ip));
    assert_eq!(
        controller.evaluate(&request("viewer-6", Role::Viewer, "10.0.0.6", QUESTION)).action(),
        Action::Allow
    );
}

#[tokio::test]
async fn test_validation_rules() {
    let validator = InputValidator::new(ValidationConfig::default()).unwrap();

    let short = validator.validate("Hi");
    assert!(!short.is_valid());
    assert!(short.reason().contains("minimum"));

    let long = validator.validate(&"a".repeat(1001));
    assert!(!long.is_valid());
    assert!(long.reason().contains("maximum"));

    let script = validator.validate("<script>alert(1)</script> what is high risk?");
    assert!(!script.is_valid());
    assert!(script.reason().contains("suspicious content"));
}

#[tokio::test(start_paused = true)]
async fn test_window_only_configuration() {
    let config = Config::from_json(
        r#"{ "limiter": { "strategies": ["sliding_window"] }, "window": { "max_requests": 3 } }"#,
    )
    .unwrap();
    let controller = AdmissionController::from_config(&config).unwrap();

    for _ in 0..3 {
        let decision =
            controller.evaluate(&request("viewer-7", Role::Viewer, "10.0.0.7", QUESTION));
        assert_eq!(decision.action(), Action::Allow);
    }
    let decision = controller.evaluate(&request("viewer-7", Role::Viewer, "10.0.0.7", QUESTION));
    assert_eq!(decision.action(), Action::Throttle);
    assert_eq!(decision.reason(), "request window exceeded");
}

#[tokio::test(start_paused = true)]
async fn test_window_catches_burst_within_bucket() {
    let config = Config::from_json(r#"{ "window": { "max_requests": 5 } }"#).unwrap();
    let controller = AdmissionController::from_config(&config).unwrap();

    for _ in 0..5 {
        let decision = controller.evaluate(&request("admin-2", Role::Admin, "10.0.0.8", QUESTION));
        assert_eq!(decision.action(), Action::Allow);
    }

    // Admin bucket still has 45 tokens; the window refuses.
    let decision = controller.evaluate(&request("admin-2", Role::Admin, "10.0.0.8", QUESTION));
    assert_eq!(decision.action(), Action::Throttle);
    assert_eq!(decision.reason(), "request window exceeded");
    // Quota still describes the admin bucket, charged for the refused request too.
    assert_eq!(decision.limit(), 300);
    assert_eq!(decision.remaining(), 44);
}
