//! All API endpoint setup

use axum::Router;
use axum::routing::get;
use axum::routing::post;

pub use health::ping;
pub use links::create_plain;
pub use owner::JwtKeys;
pub use owner::Owner;
pub use request::Form;
pub use request::request_host;
pub use response::Error;

mod health;
mod links;
mod owner;
mod request;
mod response;

/// Get the Axum router for all API routes
pub fn router() -> Router {
    let user = Router::new().route("/urls", get(links::list).delete(links::delete));

    Router::new()
        .route("/shorten", post(links::create))
        .route("/shorten/batch", post(links::batch))
        .nest("/user", user)
}
