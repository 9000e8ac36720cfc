//! Health check

use axum::Extension;
use axum::http::StatusCode;

use crate::service::LinkService;

use super::Error;

/// Check the storage is reachable
///
/// Request:
/// ```sh
/// curl -v http://localhost:8080/ping
/// ```
pub async fn ping(Extension(service): Extension<LinkService>) -> Result<StatusCode, Error> {
    service.storage().ping().await.map_err(|err| {
        tracing::error!("Storage is not reachable: {err}");

        Error::internal_server_error("Storage is not reachable")
    })?;

    Ok(StatusCode::OK)
}
