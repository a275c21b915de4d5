//! HTTP route handlers for Cue Gate.

use axum::{
    Json, Router,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use cue_common::constants::PROTOCOL_VERSION;
use cue_common::{Flag, VerifyError};

use crate::config::AppConfig;
use crate::state::AppState;

mod admin;
mod captcha;
mod health;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))

        // Alignment challenges
        .route("/api/v1/challenge", post(captcha::issue_alignment))
        .route("/api/v1/verify", post(captcha::verify_alignment))
        .route("/challenge", post(captcha::issue_alignment))
        .route("/verify", post(captcha::verify_alignment))

        // Align-and-gesture challenges
        .route("/api/v2/challenge", post(captcha::issue_gesture))
        .route("/api/v2/verify", post(captcha::verify_gesture))

        // Admin endpoints (token protected)
        .nest("/admin", admin_routes())

        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())

        // Add shared state
        .with_state(state)
}

/// Admin routes (suspicious set hygiene)
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/list-suspicious", get(admin::list_suspicious))
        .route("/clear-suspicious", post(admin::clear_suspicious))
}

/// Permissive unless `strict_origin` restricts to the allow-list
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if !config.strict_origin {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Error body for a failed request
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    ok: bool,
    message: &'static str,
    reason: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bot_score: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    flags: Vec<Flag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<serde_json::Value>,
    version: &'static str,
}

/// A pipeline error on its way to the client
#[derive(Debug)]
pub struct ApiError {
    error: VerifyError,
    /// Attach the score breakdown
    debug: bool,
}

impl ApiError {
    pub fn new(error: VerifyError, debug: bool) -> Self {
        Self { error, debug }
    }
}

impl From<VerifyError> for ApiError {
    fn from(error: VerifyError) -> Self {
        Self::new(error, false)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let detail = self.error.detail();

        let debug = self.debug.then(|| match &self.error {
            VerifyError::Alignment {
                angle_error,
                tolerance,
                reaction_ms,
                detail,
            } => json!({
                "angleError": angle_error,
                "tolerance": tolerance,
                "reactionMs": reaction_ms,
                "scores": detail,
            }),
            VerifyError::AutomationDetected(detail) => json!(detail),
            other => json!({ "error": other.to_string() }),
        });

        let body = ErrorBody {
            ok: false,
            message: self.error.public_message(),
            reason: self.error.reason(),
            bot_score: detail.and_then(|d| d.bot_score),
            flags: detail.map(|d| d.flags.clone()).unwrap_or_default(),
            debug,
            version: PROTOCOL_VERSION,
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self.error, VerifyError::RateLimited | VerifyError::Locked) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("60"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::captcha::Signer;
    use crate::store::MemoryStore;

    pub(super) fn test_state(config: AppConfig) -> AppState {
        AppState::with_parts(
            config,
            std::sync::Arc::new(MemoryStore::new()),
            Signer::new(b"router-secret").unwrap(),
        )
    }

    pub(super) async fn send(
        app: Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[test]
    fn test_error_body_shape() {
        let response = ApiError::from(VerifyError::Locked).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_debug_breakdown_only_when_enabled() {
        let err = || VerifyError::Alignment {
            angle_error: 20.0,
            tolerance: 8,
            reaction_ms: 40.0,
            detail: Box::new(cue_common::RejectionDetail {
                bot_score: Some(0.9),
                flags: vec![Flag::PerfectVelocity],
                ..Default::default()
            }),
        };

        let quiet = ApiError::new(err(), false).into_response();
        let bytes = to_bytes(quiet.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["ok"], false);
        assert_eq!(body["reason"], "alignment_failed");
        assert_eq!(body["botScore"], 0.9);
        assert_eq!(body["flags"][0], "perfect_velocity");
        assert!(body.get("debug").is_none());

        let loud = ApiError::new(err(), true).into_response();
        let bytes = to_bytes(loud.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["debug"]["tolerance"], 8);
    }

    #[tokio::test]
    async fn test_strict_origin_cors() {
        let config = AppConfig {
            strict_origin: true,
            allowed_origins: vec!["https://shop.example".to_string()],
            ..Default::default()
        };
        let app = create_router(test_state(config));

        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "https://shop.example")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://shop.example"
        );

        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "https://evil.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}
