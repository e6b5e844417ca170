use axum::extract::State;
use http::StatusCode;
use joke_market_engine::batch::{BatchSubmission, GradingSubmission, GradingTicket};
use joke_market_engine::models::{Batch, BatchId, RoundId};

use crate::error::AppError;
use crate::extract::{AppJson, AppPath};
use crate::session::Session;
use crate::MyState;

pub async fn submit_batch(
    State(state): State<MyState>,
    session: Session,
    AppPath(round_id): AppPath<RoundId>,
    AppJson(submission): AppJson<BatchSubmission>,
) -> Result<(StatusCode, AppJson<Batch>), AppError> {
    let batch = state
        .engine
        .submit_batch(session.participant_id, round_id, submission)?;
    Ok((StatusCode::CREATED, AppJson(batch)))
}

/// `null` when nothing is waiting to be graded.
pub async fn next_for_grading(
    State(state): State<MyState>,
    _session: Session,
    AppPath(round_id): AppPath<RoundId>,
) -> Result<AppJson<Option<GradingTicket>>, AppError> {
    Ok(AppJson(state.engine.next_for_grading(round_id)?))
}

pub async fn submit_grading(
    State(state): State<MyState>,
    session: Session,
    AppPath(batch_id): AppPath<BatchId>,
    AppJson(submission): AppJson<GradingSubmission>,
) -> Result<AppJson<Batch>, AppError> {
    Ok(AppJson(state.engine.submit_grading(
        session.participant_id,
        batch_id,
        submission,
    )?))
}
