// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the admission gate.
//!
//! The gate runs as an external check service: the serving tier posts each
//! authenticated request to `/check` and forwards it to the generation
//! backend only on a 200.

use crate::blocklist::BlockedIp;
use crate::config::Config;
use crate::controller::{AdmissionController, AdmissionRequest};
use crate::decision::{Action, Decision};
use crate::error::{GateError, Result};
use crate::metrics::DecisionMetrics;
use crate::policy::Role;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

/// Shared application state.
pub struct AppState {
    pub controller: Arc<AdmissionController>,
    pub metrics: Arc<DecisionMetrics>,
    pub config: Config,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Admission check request from the serving tier.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub identity: String,
    /// Unknown roles are treated as `viewer`
    #[serde(default)]
    pub role: String,
    pub client_ip: String,
    pub payload: String,
}

/// Body returned for an admitted request.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub sanitized_payload: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub limit: u32,
    pub remaining: u32,
}

const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "admission-gate",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn quota_headers(decision: &Decision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit()));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining()));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(decision.reset_at().timestamp()));
    headers
}

/// Run the admission pipeline for one request.
pub async fn check(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckRequest>,
) -> Response {
    let client_ip: IpAddr = match req.client_ip.parse() {
        Ok(ip) => ip,
        Err(_) => {
            warn!(ip = %req.client_ip, "Invalid IP address format");
            return GateError::Validation(vec!["invalid client ip address".to_string()])
                .into_response();
        }
    };

    let role = Role::parse_lossy(&req.role);
    debug!(identity = %req.identity, %role, ip = %client_ip, "Processing admission check");

    let request = AdmissionRequest::new(req.identity, role, client_ip, req.payload);
    let decision = state.controller.evaluate(&request);

    // Quota headers go out on admissions and throttles only.
    let headers = matches!(decision.action(), Action::Allow | Action::Throttle)
        .then(|| quota_headers(&decision));

    match decision.into_result() {
        Ok(decision) => {
            let body = CheckResponse {
                allowed: true,
                limit: decision.limit(),
                remaining: decision.remaining(),
                warnings: decision.warnings().to_vec(),
                sanitized_payload: decision.sanitized_payload().unwrap_or_default().to_string(),
            };
            (StatusCode::OK, headers, Json(body)).into_response()
        }
        Err(err) => (headers, err).into_response(),
    }
}

/// List blocked IPs.
pub async fn list_blocked(State(state): State<Arc<AppState>>) -> Json<Vec<BlockedIp>> {
    Json(state.controller.blocklist().entries())
}

/// Lift a block.
pub async fn unblock(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Result<StatusCode> {
    let ip: IpAddr = ip
        .parse()
        .map_err(|_| GateError::Validation(vec!["invalid ip address".to_string()]))?;

    if state.controller.unblock(ip) {
        info!(%ip, "Block lifted by administrator");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response> {
    let body = state
        .metrics
        .render(&state.controller)
        .map_err(|e| GateError::Internal(format!("metrics encoding failed: {e}")))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

fn security_header(
    name: &'static str,
    value: &'static str,
) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(
        HeaderName::from_static(name),
        HeaderValue::from_static(value),
    )
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/check", post(check))
        .route("/admin/blocked", get(list_blocked))
        .route("/admin/blocked/:ip", delete(unblock));

    if state.config.metrics.enabled {
        router = router.route(&state.config.metrics.path, get(metrics));
    }

    router
        .layer(security_header("x-content-type-options", "nosniff"))
        .layer(security_header("x-frame-options", "DENY"))
        .layer(security_header("x-xss-protection", "1; mode=block"))
        .layer(security_header(
            "strict-transport-security",
            "max-age=31536000; includeSubDomains",
        ))
        .layer(security_header("referrer-policy", "strict-origin-when-cross-origin"))
        .layer(security_header("content-security-policy", "default-src 'self'"))
        .layer(security_header(
            "permissions-policy",
            "geolocation=(), microphone=(), camera=()",
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
