//! Token-protected admin endpoints for the suspicious set.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use cue_common::constants::headers::X_ADMIN_TOKEN;

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

#[derive(Serialize)]
pub struct SuspiciousList {
    ok: bool,
    count: usize,
    identities: Vec<String>,
}

#[derive(Serialize)]
pub struct ClearResponse {
    ok: bool,
    cleared: usize,
}

/// Header token takes precedence over the query parameter.
/// Admin access is refused outright when no token is configured.
fn authorize(state: &AppState, headers: &HeaderMap, query: &TokenQuery) -> Result<(), StatusCode> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Err(StatusCode::FORBIDDEN);
    };

    let supplied = headers
        .get(X_ADMIN_TOKEN)
        .and_then(|v| v.to_str().ok())
        .or(query.token.as_deref())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if bool::from(supplied.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        tracing::warn!("Rejected admin request with a bad token");
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// List suspicious identities
pub async fn list_suspicious(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<Json<SuspiciousList>, StatusCode> {
    authorize(&state, &headers, &query)?;

    let identities = state.suspicious.list().await;
    Ok(Json(SuspiciousList {
        ok: true,
        count: identities.len(),
        identities,
    }))
}

/// Empty the suspicious set
pub async fn clear_suspicious(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ClearResponse>, StatusCode> {
    authorize(&state, &headers, &query)?;

    let cleared = state.suspicious.clear().await;
    tracing::info!(cleared, "Suspicious set cleared by admin");

    Ok(Json(ClearResponse { ok: true, cleared }))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{send, test_state};
    use crate::config::AppConfig;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    fn admin_config() -> AppConfig {
        AppConfig {
            admin_token: Some("s3cret".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_without_token() {
        let app = super::super::create_router(test_state(AppConfig::default()));
        let (status, _) = send(app, Method::GET, "/admin/list-suspicious?token=x", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_wrong_or_missing_token() {
        let app = super::super::create_router(test_state(admin_config()));

        let (status, _) = send(app.clone(), Method::GET, "/admin/list-suspicious", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) =
            send(app, Method::POST, "/admin/clear-suspicious?token=s3cre", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_and_clear() {
        let state = test_state(admin_config());
        state.suspicious.insert("203.0.113.9").await;
        state.suspicious.insert("203.0.113.7").await;
        let app = super::super::create_router(state.clone());

        let request = Request::builder()
            .uri("/admin/list-suspicious")
            .header("X-Admin-Token", "s3cret")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, body) =
            send(app.clone(), Method::GET, "/admin/list-suspicious?token=s3cret", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["identities"][0], "203.0.113.7");

        let (status, body) =
            send(app, Method::POST, "/admin/clear-suspicious?token=s3cret", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cleared"], 2);
        assert!(!state.suspicious.contains("203.0.113.9").await);
    }
}
