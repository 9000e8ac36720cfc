//! Owner of links
//!
//! Every caller is identified by a signed token in the `Authorization` cookie. Callers without a
//! valid token get a fresh owner ID and a cookie holding it.

use std::time::Duration;

use axum::Extension;
use axum::RequestPartsExt;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::IntoResponseParts;
use axum::response::ResponseParts;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use super::Error;

/// Name of the cookie holding the owner token
const OWNER_COOKIE: &str = "Authorization";

/// The keys used for encoding/decoding JWT tokens
#[derive(Clone)]
pub struct JwtKeys {
    /// The encoding key
    encoding: EncodingKey,

    /// The decoding key
    decoding: DecodingKey,

    /// How long a new token stays valid
    lifetime: Duration,
}

impl JwtKeys {
    /// Create new encoding/decoding keys, derived from a secret
    pub fn new(secret: &[u8], lifetime: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            lifetime,
        }
    }

    /// Sign a token for the owner
    fn generate_token(&self, owner_id: &str) -> Result<String, Error> {
        use jsonwebtoken::Header;
        use jsonwebtoken::encode;
        use jsonwebtoken::get_current_timestamp;

        let claims = Claims {
            sub: owner_id.to_string(),
            exp: get_current_timestamp() + self.lifetime.as_secs(),
        };

        encode(&Header::default(), &claims, &self.encoding).map_err(Error::internal_server_error)
    }

    /// Owner ID of a valid token
    fn verify_token(&self, token: &str) -> Option<String> {
        use jsonwebtoken::Validation;
        use jsonwebtoken::decode;

        match decode::<Claims>(token, &self.decoding, &Validation::default()) {
            Ok(token_data) => Some(token_data.claims.sub),
            Err(err) => {
                tracing::debug!("Ignoring invalid owner token: {err}");
                None
            }
        }
    }
}

/// The JWT claims to identify an owner
#[derive(Debug, Deserialize, Serialize)]
struct Claims {
    /// The owner ID
    sub: String,

    /// When does the token expire, seconds since the epoch
    exp: u64,
}

/// The owner of the current request
///
/// Used as response part as well, to hand out the cookie of a new owner
pub struct Owner {
    /// ID of the owner
    id: String,

    /// Cookies to send back, holds the token of a new owner
    jar: CookieJar,
}

impl Owner {
    /// ID of the owner
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Extension(jwt_keys) = parts
            .extract::<Extension<JwtKeys>>()
            .await
            .map_err(|_| Error::internal_server_error("Could not get JWT keys"))?;

        let jar = CookieJar::from_headers(&parts.headers);

        // the cookie wins, the header is there for clients without a cookie store
        let token = jar
            .get(OWNER_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get(AUTHORIZATION)
                    .and_then(|header| header.to_str().ok())
                    .map(|header| header.trim_start_matches("Bearer ").to_string())
            });

        if let Some(id) = token.and_then(|token| jwt_keys.verify_token(&token)) {
            return Ok(Self {
                id,
                jar: CookieJar::new(),
            });
        }

        let id = Uuid::new_v4().to_string();
        let token = jwt_keys.generate_token(&id)?;

        tracing::debug!("New owner: {id}");

        let cookie = Cookie::build((OWNER_COOKIE, token)).path("/").http_only(true);

        Ok(Self {
            id,
            jar: CookieJar::new().add(cookie),
        })
    }
}

impl IntoResponseParts for Owner {
    type Error = <CookieJar as IntoResponseParts>::Error;

    fn into_response_parts(self, res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        self.jar.into_response_parts(res)
    }
}
