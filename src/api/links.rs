//! Links API endpoints
//!
//! Shorten URLs, alone or in batches, and manage the links of the current owner

use axum::Extension;
use axum::Json;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;
use serde::Serialize;

use crate::links::BatchItem;
use crate::links::BatchResult;
use crate::links::LinkSummary;
use crate::service::LinkService;

use super::Error;
use super::Form;
use super::Owner;
use super::request_host;

/// Status code matching a (possibly) new link
fn created_status(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::CONFLICT
    }
}

/// Shorten a URL sent as plain text
///
/// Request:
/// ```sh
/// curl -v -d 'https://www.example.com/' http://localhost:8080/
/// ```
///
/// Response, `409 Conflict` when the URL was already shortened:
/// ```text
/// http://localhost:8080/AbCdEfGh
/// ```
pub async fn create_plain(
    Extension(service): Extension<LinkService>,
    owner: Owner,
    headers: HeaderMap,
    body: String,
) -> Result<Response, Error> {
    let (link, created) = service.create_link(body.trim(), owner.id()).await?;

    let short_url = service.build_short_url(&link.shortcut, request_host(&headers));

    Ok((created_status(created), owner, short_url).into_response())
}

/// Shorten form
#[derive(Debug, Deserialize)]
pub struct ShortenForm {
    /// URL to shorten
    url: String,
}

/// Shorten response
#[derive(Debug, Serialize)]
pub struct ShortenResponse {
    /// The short URL
    result: String,
}

/// Shorten a URL
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -d '{ "url": "https://www.example.com/" }' \
///     http://localhost:8080/api/shorten
/// ```
///
/// Response, `409 Conflict` when the URL was already shortened:
/// ```json
/// { "result": "http://localhost:8080/AbCdEfGh" }
/// ```
pub async fn create(
    Extension(service): Extension<LinkService>,
    owner: Owner,
    headers: HeaderMap,
    Form(form): Form<ShortenForm>,
) -> Result<Response, Error> {
    let (link, created) = service.create_link(&form.url, owner.id()).await?;

    let result = service.build_short_url(&link.shortcut, request_host(&headers));

    Ok((
        created_status(created),
        owner,
        Json(ShortenResponse { result }),
    )
        .into_response())
}

/// Shorten multiple URLs at once
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -d '[ { "correlation_id": "1", "original_url": "https://www.example.com/" } ]' \
///     http://localhost:8080/api/shorten/batch
/// ```
///
/// Response:
/// ```json
/// [ { "correlation_id": "1", "short_url": "http://localhost:8080/AbCdEfGh" } ]
/// ```
pub async fn batch(
    Extension(service): Extension<LinkService>,
    owner: Owner,
    headers: HeaderMap,
    Form(items): Form<Vec<BatchItem>>,
) -> Result<(StatusCode, Owner, Json<Vec<BatchResult>>), Error> {
    let results = service
        .bulk_create(items, owner.id(), request_host(&headers))
        .await?;

    Ok((StatusCode::CREATED, owner, Json(results)))
}

/// A link of the owner
#[derive(Debug, Serialize)]
pub struct UserUrl {
    /// The short URL
    short_url: String,

    /// The URL it redirects to
    original_url: String,
}

impl UserUrl {
    fn from_summary(service: &LinkService, host: Option<&str>, summary: LinkSummary) -> Self {
        Self {
            short_url: service.build_short_url(&summary.shortcut, host),
            original_url: summary.full_url,
        }
    }
}

/// List the links of the owner
///
/// Request:
/// ```sh
/// curl -v --cookie 'Authorization=tokentokentoken' http://localhost:8080/api/user/urls
/// ```
///
/// Response, `204 No Content` without links:
/// ```json
/// [ { "short_url": "http://localhost:8080/AbCdEfGh", "original_url": "https://www.example.com/" } ]
/// ```
pub async fn list(
    Extension(service): Extension<LinkService>,
    owner: Owner,
    headers: HeaderMap,
) -> Result<Response, Error> {
    let summaries = service.get_links_for_owner(owner.id()).await?;

    if summaries.is_empty() {
        return Ok((owner, StatusCode::NO_CONTENT).into_response());
    }

    let host = request_host(&headers);
    let urls = summaries
        .into_iter()
        .map(|summary| UserUrl::from_summary(&service, host, summary))
        .collect::<Vec<UserUrl>>();

    Ok((owner, Json(urls)).into_response())
}

/// Delete links of the owner
///
/// Links of other owners are left alone
///
/// Request:
/// ```sh
/// curl -v -X DELETE -H 'Content-Type: application/json' \
///     --cookie 'Authorization=tokentokentoken' \
///     -d '[ "AbCdEfGh" ]' \
///     http://localhost:8080/api/user/urls
/// ```
pub async fn delete(
    Extension(service): Extension<LinkService>,
    owner: Owner,
    Form(shortcuts): Form<Vec<String>>,
) -> Result<(Owner, StatusCode), Error> {
    service.soft_delete_links(&shortcuts, owner.id()).await?;

    Ok((owner, StatusCode::ACCEPTED))
}
