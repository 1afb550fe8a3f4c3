//! HTTP endpoints for the authorization and token steps.
//!
//! - `GET  /indieauth/auth`: consent prompt (JSON, or HTML for browsers)
//! - `POST /indieauth/auth`: approve a request or verify a code
//! - `GET  /indieauth/token`: verify a bearer token
//! - `POST /indieauth/token`: redeem a code for an access token
//! - `GET  /health`

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::consent::render_consent_page;
use crate::engine::{AuthorizationForm, AuthorizationOutcome, AuthorizationRequest, Engine, TokenRequest};
use crate::error::AuthError;

const FORM_MIME: &str = "application/x-www-form-urlencoded";

/// Shared state for HTTP handlers.
#[derive(Debug, Clone)]
pub struct HttpState {
    pub engine: Arc<Engine>,
}

/// Create the router serving both IndieAuth endpoints.
pub fn create_router(engine: Arc<Engine>) -> Router {
    let state = Arc::new(HttpState { engine });

    Router::new()
        .route("/health", get(health_check))
        .route("/indieauth/auth", get(handle_auth_get).post(handle_auth_post))
        .route("/indieauth/token", get(handle_token_get).post(handle_token_post))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.engine.store().backend()
    }))
}

/// `GET /indieauth/auth`
async fn handle_auth_get(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    query: Result<Query<AuthorizationRequest>, QueryRejection>,
) -> Result<Response, AuthError> {
    let Query(request) = query.map_err(|e| AuthError::invalid_request(e.body_text()))?;
    let request = state.engine.prompt(request)?;

    if accepts(&headers, "text/html") {
        return Ok(Html(render_consent_page(&request, state.engine.requires_password())).into_response());
    }

    Ok(negotiate(&headers, StatusCode::OK, &request))
}

/// `POST /indieauth/auth`
async fn handle_auth_post(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    form: Result<Form<AuthorizationForm>, FormRejection>,
) -> Result<Response, AuthError> {
    let Form(form) = form.map_err(|e| AuthError::invalid_request(e.body_text()))?;

    match state.engine.authorize(form).await? {
        AuthorizationOutcome::Verified(identity) => Ok(negotiate(&headers, StatusCode::OK, &identity)),
        AuthorizationOutcome::Redirect { location, .. } => {
            Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
        }
    }
}

/// `GET /indieauth/token`
async fn handle_token_get(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    let authorization = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());

    let response = match state.engine.verify(authorization).await {
        Ok(info) => negotiate(&headers, StatusCode::OK, &info),
        Err(e) => e.into_response(),
    };
    no_store(response)
}

/// `POST /indieauth/token`
async fn handle_token_post(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let result = match form {
        Ok(Form(request)) => state.engine.redeem(request).await,
        Err(e) => Err(AuthError::invalid_request(e.body_text())),
    };

    let response = match result {
        Ok(token) => negotiate(&headers, StatusCode::OK, &token),
        Err(e) => e.into_response(),
    };
    no_store(response)
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if self.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (
            status,
            Json(serde_json::json!({
                "error": self.error_code(),
                "error_description": self.to_string()
            })),
        )
            .into_response()
    }
}

/// Whether the `Accept` header lists `mime`.
fn accepts(headers: &HeaderMap, mime: &str) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|item| item.split(';').next().is_some_and(|m| m.trim().eq_ignore_ascii_case(mime)))
}

/// Serialize `body` as form-urlencoded when the client asks for it, JSON otherwise.
fn negotiate<T: Serialize>(headers: &HeaderMap, status: StatusCode, body: &T) -> Response {
    if !accepts(headers, FORM_MIME) {
        return (status, Json(body)).into_response();
    }

    match serde_urlencoded::to_string(body) {
        Ok(encoded) => (status, [(header::CONTENT_TYPE, FORM_MIME)], encoded).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to form-encode response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_accepts() {
        assert!(accepts(&accept("text/html,application/xhtml+xml;q=0.9"), "text/html"));
        assert!(accepts(&accept("application/json, application/x-www-form-urlencoded;q=0.5"), FORM_MIME));
        assert!(!accepts(&accept("application/json"), FORM_MIME));
        assert!(!accepts(&HeaderMap::new(), "text/html"));
    }

    #[test]
    fn test_error_response_status() {
        assert_eq!(AuthError::InvalidCode.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::InvalidToken.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::InvalidCredentials.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_no_store_headers() {
        let response = no_store(StatusCode::OK.into_response());
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert_eq!(response.headers()[header::PRAGMA], "no-cache");
    }
}
