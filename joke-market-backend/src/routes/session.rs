use axum::extract::State;
use axum::response::IntoResponse;
use http::header::SET_COOKIE;
use http::StatusCode;
use joke_market_engine::roster::JoinedSession;
use joke_market_engine::views::{SelfSnapshot, SessionSnapshot};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::extract::AppJson;
use crate::session::{session_cookie, Session};
use crate::MyState;

#[derive(Debug, Deserialize, Serialize)]
pub struct JoinPayload {
    pub display_name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct InstructorLoginPayload {
    pub display_name: String,
    pub password: String,
}

fn with_cookie(joined: JoinedSession) -> Result<impl IntoResponse, AppError> {
    let cookie = session_cookie(&joined.token)?;
    Ok((StatusCode::CREATED, [(SET_COOKIE, cookie)], AppJson(joined)))
}

pub async fn join(
    State(state): State<MyState>,
    AppJson(payload): AppJson<JoinPayload>,
) -> Result<impl IntoResponse, AppError> {
    with_cookie(state.engine.join(&payload.display_name)?)
}

pub async fn instructor_login(
    State(state): State<MyState>,
    AppJson(payload): AppJson<InstructorLoginPayload>,
) -> Result<impl IntoResponse, AppError> {
    with_cookie(
        state
            .engine
            .instructor_login(&payload.display_name, &payload.password)?,
    )
}

pub async fn me(
    State(state): State<MyState>,
    session: Session,
) -> Result<AppJson<SelfSnapshot>, AppError> {
    Ok(AppJson(state.engine.me(session.participant_id)?))
}

pub async fn session(
    State(state): State<MyState>,
    session: Session,
) -> Result<AppJson<SessionSnapshot>, AppError> {
    Ok(AppJson(state.engine.session(session.participant_id)?))
}
