//! Persistence for the authorization flow.
//!
//! Each store exposes only the operations the flow needs. Every one-time read is a
//! single conditional `DELETE ... RETURNING`, so two concurrent consumers of the same
//! record can never both succeed. Expiry is checked by time predicate at read time;
//! expired rows linger until [`sweep`] removes them.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DbErr;
use time::Duration;

pub mod client;
pub mod code;
pub mod session;
pub mod sweep;
pub mod token;

pub use client::{DbClientRegistry, RedirectPattern, RegisteredClient};
pub use code::DbCodeStore;
pub use session::DbSessionStore;
pub use token::DbTokenStore;

/// How long a pending session survives between authorize and callback.
pub const SESSION_TTL: Duration = Duration::hours(1);
/// How long an authorization code can be redeemed.
pub const CODE_TTL: Duration = Duration::hours(1);
/// Lifetime of an issued bearer token.
pub const TOKEN_TTL: Duration = Duration::days(7);

/// A pending authorization request, keyed by the session cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingSession {
    pub client_id: String,
    /// CSRF state sent upstream
    pub state: String,
    /// State supplied by the client application
    pub callback_state: String,
    pub callback_url: String,
}

#[async_trait]
pub trait ClientRegistry: Send + Sync {
    async fn lookup_client(&self, client_id: &str)
    -> Result<Option<Arc<RegisteredClient>>, DbErr>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist `session` under a fresh random id and return that id.
    async fn create(&self, session: &PendingSession) -> Result<String, DbErr>;

    /// Read and delete in one step. Expired sessions are reported as absent.
    async fn consume(&self, session_id: &str) -> Result<Option<PendingSession>, DbErr>;

    async fn purge_expired(&self) -> Result<u64, DbErr>;
}

#[async_trait]
pub trait CodeStore: Send + Sync {
    async fn create(&self, client_id: &str, code: &str, email: &str) -> Result<(), DbErr>;

    /// Read and delete a code issued to `client_id`, returning its identity.
    async fn consume(&self, client_id: &str, code: &str) -> Result<Option<String>, DbErr>;

    async fn purge_expired(&self) -> Result<u64, DbErr>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Mint a bearer token for `email`. The raw value is returned exactly once.
    async fn issue(&self, email: &str) -> Result<String, DbErr>;

    /// Delete the record for `raw_token`. Unknown tokens are not an error.
    async fn revoke_by_raw_token(&self, raw_token: &str) -> Result<(), DbErr>;

    /// Identity behind a live token.
    async fn lookup_by_raw_token(&self, raw_token: &str) -> Result<Option<String>, DbErr>;

    async fn purge_expired(&self) -> Result<u64, DbErr>;
}
