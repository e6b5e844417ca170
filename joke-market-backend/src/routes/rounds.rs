use axum::extract::State;
use http::StatusCode;
use joke_market_engine::models::{Round, RoundId};
use joke_market_engine::round::RoundConfiguration;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::extract::{AppJson, AppPath};
use crate::session::Session;
use crate::MyState;

#[derive(Debug, Deserialize, Serialize)]
pub struct RevealPayload {
    pub reveal: bool,
}

pub async fn list_rounds(State(state): State<MyState>, _session: Session) -> AppJson<Vec<Round>> {
    AppJson(state.engine.list_rounds())
}

/// `null` before the first round is configured.
pub async fn active_round(
    State(state): State<MyState>,
    _session: Session,
) -> AppJson<Option<Round>> {
    AppJson(state.engine.active_round())
}

pub async fn configure_round(
    State(state): State<MyState>,
    session: Session,
    AppJson(configuration): AppJson<RoundConfiguration>,
) -> Result<(StatusCode, AppJson<Round>), AppError> {
    let round = state
        .engine
        .configure_round(session.participant_id, configuration)?;
    Ok((StatusCode::CREATED, AppJson(round)))
}

pub async fn start_round(
    State(state): State<MyState>,
    session: Session,
    AppPath(round_id): AppPath<RoundId>,
) -> Result<AppJson<Round>, AppError> {
    Ok(AppJson(
        state.engine.start_round(session.participant_id, round_id)?,
    ))
}

pub async fn end_round(
    State(state): State<MyState>,
    session: Session,
    AppPath(round_id): AppPath<RoundId>,
) -> Result<AppJson<Round>, AppError> {
    Ok(AppJson(state.engine.end_round(session.participant_id, round_id)?))
}

pub async fn set_reveal_flag(
    State(state): State<MyState>,
    session: Session,
    AppPath(round_id): AppPath<RoundId>,
    AppJson(payload): AppJson<RevealPayload>,
) -> Result<AppJson<Round>, AppError> {
    Ok(AppJson(state.engine.set_reveal_flag(
        session.participant_id,
        round_id,
        payload.reveal,
    )?))
}
