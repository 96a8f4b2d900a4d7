//! HTTP surface of the broker.
//!
//! - `oauth2` endpoints at the root (`/`, `/callback`, `/token`, `/revoke`, `/info`)
//! - `health` - Health check endpoint (/healthz)
//! - `metrics` - Prometheus metrics endpoint (/metrics)
//! - `openapi` - OpenAPI/Utoipa configuration, served at `/api-docs`

pub mod health;
pub mod metrics;
pub mod openapi;

pub use health::MISC_TAG;

use crate::AppResources;
use crate::oauth2::{self, AuthFlow};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Builds the complete application router.
pub fn build_router(flow: AuthFlow, resources: AppResources) -> axum::Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .merge(oauth2::router(flow))
        .routes(routes!(metrics::metrics))
        .routes(routes!(health::health))
        .layer(axum::Extension(resources))
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip_all)]
pub async fn start_webserver(flow: AuthFlow, resources: AppResources) -> color_eyre::Result<()> {
    let config = resources.config.clone();
    let router = build_router(flow, resources);

    let addr = config.listen_addr.as_str();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, public_url = %config.public_url, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
