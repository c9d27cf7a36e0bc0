//! Router for login, logout and the caller's usage data

use axum::{
    Form, Json, Router,
    extract::{State, rejection::FormRejection},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use super::public;
use crate::api::extract::{AUTH_COOKIE, Auth};
use crate::api::public::ApiError;
use crate::api::routes::SharedState;
use crate::core::ChatError;

/// Exchange a valid key for the auth cookie
async fn login(
    State(state): State<SharedState>,
    jar: CookieJar,
    form: Result<Form<public::LoginForm>, FormRejection>,
) -> Result<(CookieJar, Json<public::MessageResponse>), ApiError> {
    let Form(form) = form.map_err(|e| ChatError::InvalidInput(e.body_text()))?;
    let auth = state.chat.authenticate(form.key.trim())?;
    tracing::info!("User '{}' logged in", auth.record.user_id);

    let cookie = Cookie::build((AUTH_COOKIE, auth.key))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.secure_cookies)
        .build();

    Ok((
        jar.add(cookie),
        Json(public::MessageResponse::new("Login successful")),
    ))
}

/// Clear the auth cookie. There is no server side state to drop.
async fn logout(jar: CookieJar) -> (CookieJar, Json<public::MessageResponse>) {
    (
        jar.remove(Cookie::build(AUTH_COOKIE).path("/")),
        Json(public::MessageResponse::new("Logged out")),
    )
}

/// Current usage and limit for the logged in key
async fn user_data(Auth(auth): Auth) -> Json<public::UserDataResponse> {
    Json(public::UserDataResponse::from(&auth.record))
}

/// Create the login/logout router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout))
}

/// Routes mounted under `/api`
pub fn api_router() -> Router<SharedState> {
    Router::new().route("/user-data", get(user_data))
}
