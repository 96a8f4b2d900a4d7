//! The authorization-code state machine.
//!
//! ```text
//! START --authorize--> PENDING --callback--> UPSTREAM_VERIFIED --token--> EXCHANGED
//! ```
//!
//! Each transition is one atomic store operation plus one response. A rejected
//! transition leaves nothing behind, and every record moving the flow forward
//! (session, code) can be consumed exactly once.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use subtle::ConstantTimeEq;
use url::Url;

use crate::clock::Clock;
use crate::codec::SecretCodec;
use crate::error::FlowError;
use crate::metrics::StoreMetrics;
use crate::oauth2::upstream::IdentityProvider;
use crate::store::sweep::ExpirySweeper;
use crate::store::{
    ClientRegistry, CodeStore, DbClientRegistry, DbCodeStore, DbSessionStore, DbTokenStore,
    PendingSession, SessionStore, TokenStore,
};

/// Query parameters of the authorize request.
#[derive(Clone, Debug, Default)]
pub struct AuthorizeRequest {
    pub client_id: Option<String>,
    pub state: Option<String>,
    pub redirect_uri: Option<String>,
}

/// Result of a successful authorize: the session to put in the cookie and where
/// to send the browser.
#[derive(Clone, Debug)]
pub struct AuthorizeRedirect {
    pub session_id: String,
    pub location: String,
}

#[derive(Clone, Debug, Default)]
pub struct CallbackRequest {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Back to the client application with its state and a fresh code.
    Completed { location: String },
    /// The upstream exchange failed; the browser goes to the landing page.
    UpstreamFailed { location: String },
}

impl CallbackOutcome {
    pub fn location(&self) -> &str {
        match self {
            CallbackOutcome::Completed { location }
            | CallbackOutcome::UpstreamFailed { location } => location,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TokenRequest {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code: Option<String>,
}

/// The broker's authorization flow and everything it needs.
#[derive(Clone)]
pub struct AuthFlow {
    pub clients: Arc<dyn ClientRegistry>,
    pub sessions: Arc<dyn SessionStore>,
    pub codes: Arc<dyn CodeStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub codec: Arc<dyn SecretCodec>,
    pub upstream: Arc<dyn IdentityProvider>,
    pub metrics: Arc<StoreMetrics>,
    /// Failure landing page and default revoke destination.
    pub landing_url: String,
}

fn required<'a>(value: &'a Option<String>, missing: &'static str) -> Result<&'a str, FlowError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(FlowError::ClientInput(missing)),
    }
}

/// `s` parsed as an absolute `http`/`https` URL with a host.
///
/// The parser drops tabs and newlines, so callers that echo the URL back must use
/// the serialization of the returned value rather than `s`.
pub fn parse_http_url(s: &str) -> Option<Url> {
    Url::parse(s).ok().filter(|u| {
        matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| !h.is_empty())
    })
}

pub fn is_http_url(s: &str) -> bool {
    parse_http_url(s).is_some()
}

/// `callback_url` with `state` and `code` set, other query parameters kept.
fn client_redirect(callback_url: &str, state: &str, code: &str) -> Result<String, FlowError> {
    let mut url = Url::parse(callback_url)
        .map_err(|e| FlowError::Internal(format!("stored callback url unparsable: {e}")))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "state" && k != "code")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("state", state)
        .append_pair("code", code);
    Ok(url.into())
}

impl AuthFlow {
    /// Flow backed by the database stores.
    pub fn with_database(
        db: Arc<DatabaseConnection>,
        codec: Arc<dyn SecretCodec>,
        clock: Arc<dyn Clock>,
        upstream: Arc<dyn IdentityProvider>,
        metrics: Arc<StoreMetrics>,
        landing_url: String,
    ) -> Self {
        Self {
            clients: Arc::new(DbClientRegistry::new(db.clone())),
            sessions: Arc::new(DbSessionStore::new(
                db.clone(),
                codec.clone(),
                clock.clone(),
            )),
            codes: Arc::new(DbCodeStore::new(db.clone(), clock.clone())),
            tokens: Arc::new(DbTokenStore::new(db, codec.clone(), clock)),
            codec,
            upstream,
            metrics,
            landing_url,
        }
    }

    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper {
            sessions: self.sessions.clone(),
            codes: self.codes.clone(),
            tokens: self.tokens.clone(),
        }
    }

    /// START -> PENDING.
    ///
    /// The redirect URI is checked against the client's registered pattern before
    /// anything is written.
    #[tracing::instrument(skip_all, fields(client_id = req.client_id.as_deref()))]
    pub async fn authorize(&self, req: &AuthorizeRequest) -> Result<AuthorizeRedirect, FlowError> {
        let client_id = required(&req.client_id, "Missing client_id parameter")?;
        let callback_state = required(&req.state, "Missing state parameter")?;
        let callback_url = required(&req.redirect_uri, "Missing redirect_uri parameter")?;
        if !is_http_url(callback_url) {
            return Err(FlowError::ClientInput("Invalid redirect_uri parameter"));
        }

        let client = self
            .metrics
            .track("client_lookup", self.clients.lookup_client(client_id))
            .await?
            .ok_or(FlowError::ClientInput("Invalid client_id parameter"))?;
        if !client.match_redirect(callback_url) {
            tracing::info!(
                pattern = client.redirect_pattern(),
                redirect_uri = callback_url,
                "redirect_uri rejected"
            );
            return Err(FlowError::ClientInput("Invalid redirect_uri parameter"));
        }

        let state = self.codec.generate_state();
        let pending = PendingSession {
            client_id: client.id.clone(),
            state: state.clone(),
            callback_state: callback_state.to_string(),
            callback_url: callback_url.to_string(),
        };
        let session_id = self
            .metrics
            .track("session_create", self.sessions.create(&pending))
            .await?;

        Ok(AuthorizeRedirect {
            session_id,
            location: self.upstream.authorization_url(&state),
        })
    }

    /// PENDING -> UPSTREAM_VERIFIED.
    ///
    /// The session is consumed before the state comparison, so a forged callback
    /// also burns the session it targeted.
    #[tracing::instrument(skip_all)]
    pub async fn callback(
        &self,
        session_id: Option<&str>,
        req: &CallbackRequest,
    ) -> Result<CallbackOutcome, FlowError> {
        let state = required(&req.state, "Missing state parameter")?;
        let upstream_code = required(&req.code, "Missing code parameter")?;
        let session_id = match session_id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(FlowError::ClientInput("Missing session cookie")),
        };

        let session = self
            .metrics
            .track("session_consume", self.sessions.consume(session_id))
            .await?
            .ok_or(FlowError::NotFound("Invalid session cookie"))?;
        if !bool::from(session.state.as_bytes().ct_eq(state.as_bytes())) {
            tracing::warn!(client_id = %session.client_id, "callback state mismatch");
            return Err(FlowError::ClientInput("Mismatch state"));
        }

        let email = match self.upstream.exchange_code(upstream_code).await {
            Ok(email) => email,
            Err(e) => {
                tracing::warn!(
                    client_id = %session.client_id,
                    error = %e,
                    "upstream exchange failed"
                );
                return Ok(CallbackOutcome::UpstreamFailed {
                    location: self.landing_url.clone(),
                });
            }
        };

        let code = self.codec.generate_code();
        self.metrics
            .track(
                "code_create",
                self.codes.create(&session.client_id, &code, &email),
            )
            .await?;
        tracing::info!(client_id = %session.client_id, "upstream identity verified");

        Ok(CallbackOutcome::Completed {
            location: client_redirect(&session.callback_url, &session.callback_state, &code)?,
        })
    }

    /// UPSTREAM_VERIFIED -> EXCHANGED. Returns the raw bearer token.
    #[tracing::instrument(skip_all, fields(client_id = req.client_id.as_deref()))]
    pub async fn exchange(&self, req: &TokenRequest) -> Result<String, FlowError> {
        let client_id = required(&req.client_id, "Missing client_id parameter")?;
        let client_secret = required(&req.client_secret, "Missing client_secret parameter")?;
        let code = required(&req.code, "Missing code parameter")?;

        let client = self
            .metrics
            .track("client_lookup", self.clients.lookup_client(client_id))
            .await?
            .ok_or(FlowError::ClientInput("Invalid client_id parameter"))?;
        if !client.verify_secret(client_secret) {
            return Err(FlowError::ClientInput("Invalid client_secret parameter"));
        }

        let email = self
            .metrics
            .track("code_consume", self.codes.consume(&client.id, code))
            .await?
            .ok_or(FlowError::NotFound("Invalid code parameter"))?;

        let token = self
            .metrics
            .track("token_issue", self.tokens.issue(&email))
            .await?;
        tracing::info!(client_id = %client.id, "bearer token issued");
        Ok(token)
    }

    /// Any state -> terminal. Succeeds whether or not the token existed.
    #[tracing::instrument(skip_all)]
    pub async fn revoke(&self, raw_token: &str) -> Result<(), FlowError> {
        if raw_token.is_empty() {
            return Ok(());
        }
        self.metrics
            .track("token_revoke", self.tokens.revoke_by_raw_token(raw_token))
            .await?;
        Ok(())
    }

    /// Email behind an `Authorization: Bearer` header value.
    #[tracing::instrument(skip_all)]
    pub async fn identify(&self, authorization: Option<&str>) -> Result<String, FlowError> {
        let token = authorization
            .and_then(bearer_token)
            .ok_or(FlowError::NotFound("auth: unauthorized"))?;
        self.metrics
            .track("token_lookup", self.tokens.lookup_by_raw_token(token))
            .await?
            .ok_or(FlowError::NotFound("auth: unauthorized"))
    }
}

/// The credential of a `Bearer` authorization value; the scheme is case-insensitive.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_url_requires_scheme_and_host() {
        assert!(is_http_url("https://app.example.com/cb"));
        assert!(is_http_url("http://localhost:3000/cb"));
        assert!(!is_http_url("ftp://app.example.com/cb"));
        assert!(!is_http_url("javascript:alert(1)"));
        assert!(!is_http_url("/relative/path"));
        assert!(!is_http_url("not a url"));
    }

    #[test]
    fn parsed_http_url_drops_control_characters() {
        let url = parse_http_url("https://app/bye\r\nx\t").expect("valid after stripping");
        assert_eq!(url.as_str(), "https://app/byex");
    }

    #[test]
    fn client_redirect_sets_state_and_code() {
        let location = client_redirect("https://app/cb", "xyz", "c0de").unwrap();
        assert_eq!(location, "https://app/cb?state=xyz&code=c0de");
    }

    #[test]
    fn client_redirect_keeps_other_query_and_replaces_ours() {
        let location =
            client_redirect("https://app/cb?tenant=7&state=old&code=old", "xyz", "new").unwrap();
        let url = Url::parse(&location).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("tenant".to_string(), "7".to_string()),
                ("state".to_string(), "xyz".to_string()),
                ("code".to_string(), "new".to_string()),
            ]
        );
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer   abc  "), Some("abc"));
        assert_eq!(bearer_token("BEARER abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token(""), None);
    }
}
