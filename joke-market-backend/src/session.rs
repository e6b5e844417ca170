use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use cookie::{Cookie, SameSite};
use http::header::COOKIE;
use http::request::Parts;
use http::{HeaderMap, HeaderValue};
use joke_market_engine::error::EngineError;
use joke_market_engine::models::ParticipantId;
use tracing::debug;

use crate::error::AppError;
use crate::MyState;

pub const COOKIE_NAME_SESSION: &str = "__Host_session";
pub const HEADER_NAME_SESSION: &str = "x-session-token";

/// The participant behind the session token of a request. Requests without a
/// known token are rejected with `SESSION_LOST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub participant_id: ParticipantId,
    pub token: String,
}

/// Prefers the explicit header over the cookie.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(HEADER_NAME_SESSION)
        .and_then(|value| value.to_str().ok())
    {
        return Some(token.to_owned());
    }
    headers
        .get_all(COOKIE)
        .into_iter()
        .filter_map(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == COOKIE_NAME_SESSION)
        .map(|cookie| cookie.value().to_owned())
}

pub fn session_cookie(token: &str) -> Result<HeaderValue, AppError> {
    let cookie = Cookie::build((COOKIE_NAME_SESSION, token))
        .path("/")
        .secure(true)
        .http_only(true)
        .same_site(SameSite::Strict)
        .build();
    Ok(HeaderValue::try_from(cookie.to_string())?)
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    MyState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = MyState::from_ref(state);
        let Some(token) = session_token(&parts.headers) else {
            debug!("request without session token");
            return Err(EngineError::SessionLost.into());
        };
        let participant_id = state.engine.resolve_session(&token)?;
        Ok(Self {
            participant_id,
            token,
        })
    }
}
