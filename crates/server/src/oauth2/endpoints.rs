//! OAuth2 broker HTTP endpoints.
//!
//! - `GET /` - authorize, redirects to the upstream provider
//! - `GET /callback` - upstream return endpoint
//! - `POST /token` - authorization code exchange
//! - `GET /revoke`, `POST /revoke` - token revocation
//! - `GET /info` - identity behind a bearer token

use crate::error::FlowError;
use crate::oauth2::OAUTH2_TAG;
use crate::oauth2::flow::{
    AuthFlow, AuthorizeRequest, CallbackOutcome, CallbackRequest, TokenRequest, parse_http_url,
};
use axum::{
    Form, Json,
    body::Bytes,
    extract::{Query, State, rejection::FormRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Name of the cookie carrying the pending session id.
pub const SESSION_COOKIE: &str = "s";

/// Creates the broker router.
pub fn router(flow: AuthFlow) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize))
        .routes(routes!(callback))
        .routes(routes!(token))
        .routes(routes!(revoke_redirect, revoke_api))
        .routes(routes!(info))
        .with_state(flow)
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AuthorizeParams {
    /// Client identifier issued out of band
    pub client_id: Option<String>,
    /// Opaque client state, echoed back on the final redirect
    pub state: Option<String>,
    /// Where to return the user; must match the client's registered pattern
    pub redirect_uri: Option<String>,
}

impl From<AuthorizeParams> for AuthorizeRequest {
    fn from(p: AuthorizeParams) -> Self {
        Self {
            client_id: p.client_id,
            state: p.state,
            redirect_uri: p.redirect_uri,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CallbackParams {
    /// CSRF state generated by the broker
    pub state: Option<String>,
    /// Upstream authorization code
    pub code: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenForm {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub refresh_token: String,
    /// Always `bearer`
    pub token_type: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RevokeParams {
    pub token: Option<String>,
    /// Where to send the browser afterwards
    pub callback: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RevokeBody {
    /// Absent and `null` both mean "nothing to revoke"
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorBody {
    pub message: String,
}

/// `{"ok": true, "result": ...}` or `{"ok": false, "error": {"message": ...}}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
}

impl ApiResult {
    fn ok(result: serde_json::Value) -> Json<Self> {
        Json(Self {
            ok: true,
            result: Some(result),
            error: None,
        })
    }

    fn error(message: &str) -> Json<Self> {
        Json(Self {
            ok: false,
            result: None,
            error: Some(ApiErrorBody {
                message: message.to_string(),
            }),
        })
    }
}

// =============================================================================
// Endpoints
// =============================================================================

/// Authorization endpoint.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/",
    tag = OAUTH2_TAG,
    operation_id = "Authorize",
    summary = "Start the authorization code flow",
    description = "Validates the client and its redirect URI, stores a pending session and \
                   redirects the browser to the upstream identity provider. The session id is \
                   delivered in the `s` cookie (HttpOnly, Secure, SameSite=Lax).",
    params(AuthorizeParams),
    responses(
        (status = 302, description = "Redirect to the upstream provider"),
        (status = 400, description = "Missing or invalid parameter, unknown client or redirect URI mismatch", body = str, content_type = "text/plain"),
    )
)]
pub async fn authorize(
    State(flow): State<AuthFlow>,
    jar: CookieJar,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    match flow.authorize(&params.into()).await {
        Ok(redirect) => (
            jar.add(session_cookie(redirect.session_id)),
            found(&redirect.location),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Upstream callback endpoint.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/callback",
    tag = OAUTH2_TAG,
    operation_id = "Upstream Callback",
    summary = "Return endpoint for the upstream provider",
    description = "Consumes the pending session, checks the CSRF state, exchanges the upstream \
                   code for the user's identity and redirects to the client application with its \
                   own state and a one-time authorization code. Upstream failures redirect to the \
                   landing page without detail.",
    params(CallbackParams),
    responses(
        (status = 302, description = "Redirect to the client application or the landing page"),
        (status = 400, description = "Missing parameter, missing or invalid session, or state mismatch", body = str, content_type = "text/plain"),
        (status = 500, description = "Storage failure", body = str, content_type = "text/plain"),
    )
)]
pub async fn callback(
    State(flow): State<AuthFlow>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let session_id = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned());
    let request = CallbackRequest {
        state: params.state,
        code: params.code,
    };
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    match flow.callback(session_id.as_deref(), &request).await {
        Ok(outcome) => {
            if let CallbackOutcome::UpstreamFailed { .. } = outcome {
                tracing::debug!("callback ended on the landing page");
            }
            (jar, found(outcome.location())).into_response()
        }
        Err(e) => (jar, e).into_response(),
    }
}

/// Token endpoint.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "Token Exchange",
    summary = "Exchange an authorization code for a bearer token",
    description = "Server-to-server call authenticated with `client_id` and `client_secret`. The \
                   code must have been issued to the same client and is consumed by this call.",
    request_body(
        content = TokenForm,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Missing parameter, bad client credentials or invalid code", body = str, content_type = "text/plain"),
        (status = 500, description = "Storage failure", body = str, content_type = "text/plain"),
    )
)]
pub async fn token(
    State(flow): State<AuthFlow>,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(f) => f,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "unreadable token request");
            return FlowError::ClientInput("Invalid request body").into_response();
        }
    };
    let request = TokenRequest {
        client_id: form.client_id,
        client_secret: form.client_secret,
        code: form.code,
    };
    match flow.exchange(&request).await {
        Ok(refresh_token) => (
            StatusCode::OK,
            Json(TokenResponse {
                refresh_token,
                token_type: "bearer".to_string(),
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Browser-facing revocation.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/revoke",
    tag = OAUTH2_TAG,
    operation_id = "Revoke Token (redirect)",
    summary = "Revoke a token and redirect",
    description = "Deletes the token if it exists and redirects to `callback` (or the landing \
                   page) either way.",
    params(RevokeParams),
    responses(
        (status = 302, description = "Redirect to the callback or landing page"),
        (status = 500, description = "Storage failure", body = str, content_type = "text/plain"),
    )
)]
pub async fn revoke_redirect(
    State(flow): State<AuthFlow>,
    Query(params): Query<RevokeParams>,
) -> Response {
    let destination = params
        .callback
        .as_deref()
        .and_then(parse_http_url)
        .map(String::from)
        .unwrap_or_else(|| flow.landing_url.clone());
    match flow.revoke(params.token.as_deref().unwrap_or_default()).await {
        Ok(()) => found(&destination),
        Err(e) => e.into_response(),
    }
}

/// API revocation.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/revoke",
    tag = OAUTH2_TAG,
    operation_id = "Revoke Token",
    summary = "Revoke a token",
    description = "Deletes the token if it exists. Succeeds whether or not the token was known, \
                   so the response never reveals token validity. Accepts a JSON body or a \
                   urlencoded form with the same `token` field.",
    request_body(
        content(
            (RevokeBody = "application/json"),
            (RevokeBody = "application/x-www-form-urlencoded"),
        )
    ),
    responses(
        (status = 200, description = "Token revoked (or never existed)", body = ApiResult),
        (status = 400, description = "Body could not be parsed", body = ApiResult),
        (status = 500, description = "Storage failure", body = ApiResult),
    )
)]
pub async fn revoke_api(
    State(flow): State<AuthFlow>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(body) = parse_revoke_body(&headers, &body) else {
        return (
            StatusCode::BAD_REQUEST,
            ApiResult::error("invalid request body"),
        )
            .into_response();
    };
    match flow.revoke(body.token.as_deref().unwrap_or_default()).await {
        Ok(()) => (StatusCode::OK, ApiResult::ok(serde_json::json!({}))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "token revocation failed");
            (e.status(), ApiResult::error("internal server error")).into_response()
        }
    }
}

/// Token info endpoint.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/info",
    tag = OAUTH2_TAG,
    operation_id = "Token Info",
    summary = "Identity behind a bearer token",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "The token is live", body = ApiResult),
        (
            status = 401,
            description = "Missing, unknown, revoked or expired token",
            body = ApiResult
        ),
        (status = 500, description = "Storage failure", body = ApiResult),
    )
)]
pub async fn info(State(flow): State<AuthFlow>, headers: HeaderMap) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    match flow.identify(authorization).await {
        Ok(email) => (
            StatusCode::OK,
            ApiResult::ok(serde_json::json!({ "email": email })),
        )
            .into_response(),
        Err(FlowError::Internal(detail)) => {
            tracing::error!(error = %detail, "token lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiResult::error("internal server error"),
            )
                .into_response()
        }
        Err(e) => (StatusCode::UNAUTHORIZED, ApiResult::error(e.public_message())).into_response(),
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_revoke_body(headers: &HeaderMap, body: &[u8]) -> Option<RevokeBody> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        let token = url::form_urlencoded::parse(body)
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned());
        return Some(RevokeBody { token });
    }
    serde_json::from_slice(body).ok()
}

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .secure(true)
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// `302 Found` to `location`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
