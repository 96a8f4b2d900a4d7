//! OAuth2 broker.
//!
//! Client applications run a standard authorization code flow against the
//! broker; the broker delegates the actual sign-in to an upstream identity
//! provider and hands back its own opaque bearer tokens.
//!
//! ## Endpoints
//!
//! - `GET /` - Authorization endpoint
//! - `GET /callback` - Upstream return endpoint
//! - `POST /token` - Token endpoint
//! - `GET|POST /revoke` - Token revocation
//! - `GET /info` - Token introspection for the bearer

pub mod endpoints;
pub mod flow;
pub mod upstream;

pub use endpoints::router;
pub use flow::AuthFlow;
pub use upstream::{HttpIdentityProvider, IdentityProvider};

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";
