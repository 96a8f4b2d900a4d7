//! An OAuth2 broker that sits between client applications and a single upstream
//! identity provider.
//!
//! Client applications run the authorization-code grant against this service; the
//! broker delegates authentication to the upstream provider, extracts the verified
//! email from the returned identity assertion and issues its own opaque bearer tokens.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::metrics::StoreMetrics;

pub mod api;
pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod entity;
pub mod error;
pub mod metrics;
pub mod oauth2;
pub mod store;

/// Shared state handed to the operational endpoints.
#[derive(Clone, Debug)]
pub struct AppResources {
    pub config: Arc<AppConfig>,
    pub metrics: Arc<StoreMetrics>,
}
