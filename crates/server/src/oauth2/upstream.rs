//! The upstream identity provider.
//!
//! The broker only ever does two things with it: send the browser to its
//! authorization endpoint, and trade the returned code for an identity assertion
//! at its token endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::Request;
use hyper::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use once_cell::sync::OnceCell;
use rustls::{ClientConfig, RootCertStore};
use serde::Deserialize;
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;

/// Upper bound on the token endpoint response we are willing to buffer.
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

const ASSERTION_PADDING: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const URL_SAFE_ANY_PAD: GeneralPurpose =
    GeneralPurpose::new(&alphabet::URL_SAFE, ASSERTION_PADDING);
const STANDARD_ANY_PAD: GeneralPurpose =
    GeneralPurpose::new(&alphabet::STANDARD, ASSERTION_PADDING);

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser, carrying our CSRF `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an upstream authorization code for the verified email.
    async fn exchange_code(&self, code: &str) -> Result<String, UpstreamError>;
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct AssertionClaims {
    #[serde(default)]
    email: Option<String>,
}

/// Pull the email claim out of an identity assertion.
///
/// The signature is not checked: the assertion comes straight from the token
/// endpoint over an authenticated TLS connection we opened ourselves.
pub fn extract_email_from_id_token(id_token: &str) -> Result<String, UpstreamError> {
    let mut segments = id_token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(UpstreamError::InvalidAssertion(
            "expected three dot-separated segments".into(),
        ));
    };

    let decoded = URL_SAFE_ANY_PAD
        .decode(payload)
        .or_else(|_| STANDARD_ANY_PAD.decode(payload))
        .map_err(|e| UpstreamError::InvalidAssertion(format!("payload is not base64: {e}")))?;
    let claims: AssertionClaims = serde_json::from_slice(&decoded)
        .map_err(|e| UpstreamError::InvalidAssertion(format!("payload is not JSON: {e}")))?;

    claims
        .email
        .filter(|email| !email.is_empty())
        .ok_or_else(|| UpstreamError::InvalidAssertion("missing email claim".into()))
}

static TLS_CONFIG: OnceCell<Arc<ClientConfig>> = OnceCell::new();

/// Shared TLS client configuration using the webpki root store.
fn shared_tls_config() -> Result<Arc<ClientConfig>, UpstreamError> {
    TLS_CONFIG
        .get_or_try_init(|| {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            let config = ClientConfig::builder_with_provider(Arc::new(
                rustls::crypto::ring::default_provider(),
            ))
            .with_safe_default_protocol_versions()
            .map_err(|e| UpstreamError::Network(format!("TLS setup failed: {e}")))?
            .with_root_certificates(roots)
            .with_no_client_auth();
            Ok(Arc::new(config))
        })
        .cloned()
}

/// Identity provider reached over HTTPS (plain HTTP is accepted for local testing).
#[derive(Clone)]
pub struct HttpIdentityProvider {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    authorization_endpoint: Url,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    scope: String,
    redirect_uri: String,
    timeout: Duration,
}

impl std::fmt::Debug for HttpIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIdentityProvider")
            .field("authorization_endpoint", &self.authorization_endpoint.as_str())
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

impl HttpIdentityProvider {
    /// `redirect_uri` is the broker's own callback endpoint as registered upstream.
    pub fn new(config: &UpstreamConfig, redirect_uri: String) -> Result<Self, UpstreamError> {
        let authorization_endpoint = Url::parse(&config.authorization_endpoint)
            .map_err(|e| UpstreamError::InvalidResponse(format!("authorization endpoint: {e}")))?;

        let tls = (*shared_tls_config()?).clone();
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);

        Ok(Self {
            client,
            authorization_endpoint,
            token_endpoint: config.token_endpoint.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.scope.clone(),
            redirect_uri,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn post_token_request(
        &self,
        code: &str,
    ) -> Result<(hyper::StatusCode, Bytes), UpstreamError> {
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "authorization_code")
            .append_pair("code", code)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .finish();

        let request = Request::post(&self.token_endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("identity-broker/", env!("CARGO_PKG_VERSION")))
            .body(Full::new(Bytes::from(form)))
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;
        let status = response.status();
        let body = Limited::new(response.into_body(), MAX_RESPONSE_BYTES)
            .collect()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?
            .to_bytes();
        Ok((status, body))
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn authorization_url(&self, state: &str) -> String {
        let mut target = self.authorization_endpoint.clone();
        target
            .query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scope)
            .append_pair("access_type", "online")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        target.into()
    }

    #[tracing::instrument(skip_all, fields(endpoint = %self.token_endpoint))]
    async fn exchange_code(&self, code: &str) -> Result<String, UpstreamError> {
        let (status, body) = tokio::time::timeout(self.timeout, self.post_token_request(code))
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))??;

        if !status.is_success() {
            return Err(UpstreamError::Http { status });
        }

        let parsed: TokenEndpointResponse = serde_json::from_slice(&body)
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
        let id_token = parsed
            .id_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| UpstreamError::InvalidResponse("missing id_token".into()))?;

        extract_email_from_id_token(&id_token)
    }
}
