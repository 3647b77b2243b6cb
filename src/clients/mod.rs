//! HTTP adapters for the reference-data and work-order services.

pub mod catalog;
pub mod work_orders;

use std::time::Duration;

use crate::error::CollaboratorError;

pub use catalog::HttpCatalogClient;
pub use work_orders::HttpWorkOrderClient;

fn build_client(service: &str, timeout: Duration) -> Result<reqwest::Client, CollaboratorError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CollaboratorError::request_failed(service, format!("client build failed: {e}")))
}

/// Join a base URL and a path without doubling slashes.
fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Map a non-success status to `Rejected`.
async fn check_status(
    service: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, CollaboratorError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(CollaboratorError::Rejected {
        service: service.to_string(),
        reason: format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
    })
}
