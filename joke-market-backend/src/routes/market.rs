use axum::extract::State;
use http::StatusCode;
use joke_market_engine::market::{Budget, JokeSelection, MarketJoke, PurchaseReceipt};
use joke_market_engine::models::RoundId;
use joke_market_engine::stats::TeamStats;

use crate::error::AppError;
use crate::extract::{AppJson, AppPath};
use crate::session::Session;
use crate::MyState;

pub async fn list_market(
    State(state): State<MyState>,
    session: Session,
    AppPath(round_id): AppPath<RoundId>,
) -> Result<AppJson<Vec<MarketJoke>>, AppError> {
    Ok(AppJson(
        state
            .engine
            .list_market(round_id, Some(session.participant_id))?,
    ))
}

pub async fn budget(
    State(state): State<MyState>,
    session: Session,
    AppPath(round_id): AppPath<RoundId>,
) -> Result<AppJson<Budget>, AppError> {
    Ok(AppJson(state.engine.budget(round_id, session.participant_id)?))
}

pub async fn buy(
    State(state): State<MyState>,
    session: Session,
    AppPath(round_id): AppPath<RoundId>,
    AppJson(selection): AppJson<JokeSelection>,
) -> Result<(StatusCode, AppJson<PurchaseReceipt>), AppError> {
    let receipt = state
        .engine
        .buy(session.participant_id, round_id, selection.joke_id)?;
    Ok((StatusCode::CREATED, AppJson(receipt)))
}

pub async fn return_purchase(
    State(state): State<MyState>,
    session: Session,
    AppPath(round_id): AppPath<RoundId>,
    AppJson(selection): AppJson<JokeSelection>,
) -> Result<AppJson<PurchaseReceipt>, AppError> {
    Ok(AppJson(state.engine.return_purchase(
        session.participant_id,
        round_id,
        selection.joke_id,
    )?))
}

pub async fn leaderboard(
    State(state): State<MyState>,
    _session: Session,
    AppPath(round_id): AppPath<RoundId>,
) -> Result<AppJson<Vec<TeamStats>>, AppError> {
    Ok(AppJson(state.engine.leaderboard(round_id)?))
}
