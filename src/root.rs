//! The root!
//!
//! The most important part of the shortener, the actual redirect logic

use axum::Extension;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::http::header::LOCATION;
use url::Url;

use crate::api::Error;
use crate::service;
use crate::service::LinkService;

/// The root!
///
/// All wildcard requests end up in this function.
///
/// A lookup in storage will be done looking for the right shortcut, based on the path
pub async fn root(
    Extension(service): Extension<LinkService>,
    uri: Uri,
) -> Result<(StatusCode, HeaderMap), Error> {
    let shortcut = uri.path().trim_matches('/');

    tracing::debug!("Looking for shortcut: /{shortcut}");

    let mut headers = HeaderMap::new();

    let status_code = match service.get_full_url(shortcut).await {
        Ok(full_url) => {
            tracing::debug!(r#"Shortcut "{shortcut}" redirecting to: {full_url}"#);

            // serialized by the parser, non-ASCII characters end up percent-encoded
            let location = Url::parse(&full_url).map_err(Error::internal_server_error)?;

            headers.insert(
                LOCATION,
                HeaderValue::from_str(location.as_str()).map_err(Error::internal_server_error)?,
            );

            StatusCode::TEMPORARY_REDIRECT
        }
        Err(service::Error::Deleted) => {
            tracing::debug!(r#"Shortcut "{shortcut}" no longer exists"#);

            StatusCode::GONE
        }
        Err(service::Error::NotFound) => {
            tracing::debug!(r#"Shortcut "{shortcut}" not found"#);

            StatusCode::NOT_FOUND
        }
        Err(err) => return Err(err.into()),
    };

    Ok((status_code, headers))
}
