//! Request extractors shared by the routes.

use axum::extract::FromRequestParts;
use axum_extra::extract::cookie::CookieJar;
use http::request::Parts;

use super::public::ApiError;
use super::routes::SharedState;
use crate::core::ChatError;
use crate::keys::AuthContext;

/// Name of the cookie carrying the caller's access key.
pub const AUTH_COOKIE: &str = "auth_key";

/// The authenticated caller. Rejects with 401 when the `auth_key`
/// cookie is missing or doesn't match a known key.
pub struct Auth(pub AuthContext);

impl FromRequestParts<SharedState> for Auth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let key = jar
            .get(AUTH_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ChatError::Unauthorized)?;
        let auth = state.chat.authenticate(&key)?;
        Ok(Auth(auth))
    }
}
