use axum::extract::State;
use http::StatusCode;
use joke_market_engine::batch::BatchSummary;
use joke_market_engine::models::{Participant, ParticipantId, Team, TeamId};
use joke_market_engine::roster::AssignmentPatch;
use joke_market_engine::views::TeamSummary;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::extract::{AppJson, AppPath};
use crate::session::Session;
use crate::MyState;

#[derive(Debug, Deserialize, Serialize)]
pub struct AutoAssignPayload {
    pub customer_count: u32,
    pub team_count: u32,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RenameTeamPayload {
    pub name: String,
}

pub async fn roster(State(state): State<MyState>, _session: Session) -> AppJson<Vec<Participant>> {
    AppJson(state.engine.roster())
}

pub async fn patch_participant(
    State(state): State<MyState>,
    session: Session,
    AppPath(participant_id): AppPath<ParticipantId>,
    AppJson(patch): AppJson<AssignmentPatch>,
) -> Result<AppJson<Participant>, AppError> {
    Ok(AppJson(state.engine.patch_assignment(
        session.participant_id,
        participant_id,
        patch,
    )?))
}

pub async fn delete_participant(
    State(state): State<MyState>,
    session: Session,
    AppPath(participant_id): AppPath<ParticipantId>,
) -> Result<AppJson<Participant>, AppError> {
    Ok(AppJson(
        state
            .engine
            .remove_participant(session.participant_id, participant_id)?,
    ))
}

pub async fn feasible_customer_counts(
    State(state): State<MyState>,
    _session: Session,
) -> AppJson<Vec<u32>> {
    AppJson(state.engine.feasible_customer_counts())
}

pub async fn auto_assign(
    State(state): State<MyState>,
    session: Session,
    AppJson(payload): AppJson<AutoAssignPayload>,
) -> Result<AppJson<Vec<Participant>>, AppError> {
    Ok(AppJson(state.engine.auto_assign(
        session.participant_id,
        payload.customer_count,
        payload.team_count,
    )?))
}

pub async fn rename_team(
    State(state): State<MyState>,
    session: Session,
    AppPath(team_id): AppPath<TeamId>,
    AppJson(payload): AppJson<RenameTeamPayload>,
) -> Result<AppJson<Team>, AppError> {
    Ok(AppJson(state.engine.rename_team(
        session.participant_id,
        team_id,
        &payload.name,
    )?))
}

pub async fn team_summary(
    State(state): State<MyState>,
    _session: Session,
    AppPath(team_id): AppPath<TeamId>,
) -> Result<AppJson<TeamSummary>, AppError> {
    Ok(AppJson(state.engine.team_summary(team_id)?))
}

pub async fn team_batches(
    State(state): State<MyState>,
    _session: Session,
    AppPath(team_id): AppPath<TeamId>,
) -> Result<AppJson<Vec<BatchSummary>>, AppError> {
    Ok(AppJson(state.engine.team_batches(team_id)?))
}

pub async fn reset(State(state): State<MyState>, session: Session) -> Result<StatusCode, AppError> {
    state.engine.reset(session.participant_id)?;
    Ok(StatusCode::NO_CONTENT)
}
