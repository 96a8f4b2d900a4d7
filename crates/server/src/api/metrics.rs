//! Prometheus metrics endpoint.

use crate::AppResources;
use crate::api::health::MISC_TAG;

/// Storage latency histograms.
#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/metrics",
    tag = MISC_TAG,
    operation_id = "Prometheus Metrics",
    responses(
        (
            status = 200,
            description = "Prometheus metrics in text exposition format",
            body = String,
            content_type = "text/plain"
        ),
        (status = 404, description = "Metrics disabled via configuration")
    )
)]
pub async fn metrics(
    axum::Extension(resources): axum::Extension<AppResources>,
) -> (hyper::StatusCode, String) {
    if !resources.config.metrics.enabled {
        return (hyper::StatusCode::NOT_FOUND, String::new());
    }
    (hyper::StatusCode::OK, resources.metrics.render())
}
