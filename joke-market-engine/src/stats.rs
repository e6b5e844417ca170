//! Team statistics, derived from the batch and purchase ledgers on every
//! read.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::models::{Batch, BatchId, RoundId, Team, TeamId};
use crate::store::Store;
use crate::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningPoint {
    pub batch_id: BatchId,
    pub average_score: f64,
    pub passes_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPoint {
    pub batch_id: BatchId,
    pub accepted: u32,
    pub rejected: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    pub team_id: TeamId,
    pub team_name: String,
    /// Active purchases of the team's jokes.
    pub points: u32,
    /// Purchase records ever made, returned ones included.
    pub total_sales: u32,
    pub batches_submitted: u32,
    pub batches_rated: u32,
    /// Published jokes over all jokes of rated batches.
    pub acceptance_rate: f64,
    /// Mean of the batch averages.
    pub average_score: f64,
    /// Rated batches in submission order.
    pub learning_curve: Vec<LearningPoint>,
    pub output: Vec<OutputPoint>,
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: f64, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

impl Store {
    pub(crate) fn team_stats(&self, round_id: RoundId, team: &Team) -> TeamStats {
        let batches: Vec<&Batch> = self
            .round_batches(round_id)
            .filter(|batch| batch.team_id == team.id)
            .collect();
        let rated = batches
            .iter()
            .filter_map(|batch| batch.grading.as_ref().map(|grading| (batch, grading)))
            .collect_vec();
        let (points, total_sales) = self
            .round_purchases(round_id)
            .filter(|purchase| purchase.team_id == team.id)
            .fold((0, 0), |(points, sales), purchase| {
                (points + u32::from(purchase.is_active()), sales + 1)
            });

        let accepted: u32 = rated.iter().map(|(_, grading)| grading.passes_count).sum();
        let jokes: usize = rated.iter().map(|(batch, _)| batch.jokes.len()).sum();
        let score_sum: f64 = rated.iter().map(|(_, grading)| grading.average_score).sum();

        TeamStats {
            team_id: team.id,
            team_name: team.name.clone(),
            points,
            total_sales,
            batches_submitted: count(batches.len()),
            batches_rated: count(rated.len()),
            acceptance_rate: ratio(f64::from(accepted), jokes),
            average_score: ratio(score_sum, rated.len()),
            learning_curve: rated
                .iter()
                .map(|(batch, grading)| LearningPoint {
                    batch_id: batch.id,
                    average_score: grading.average_score,
                    passes_count: grading.passes_count,
                })
                .collect(),
            output: rated
                .iter()
                .map(|(batch, grading)| OutputPoint {
                    batch_id: batch.id,
                    accepted: grading.passes_count,
                    rejected: count(batch.jokes.len()).saturating_sub(grading.passes_count),
                })
                .collect(),
        }
    }

    pub(crate) fn leaderboard(&self, round_id: RoundId) -> Vec<TeamStats> {
        self.teams
            .values()
            .map(|team| self.team_stats(round_id, team))
            .sorted_by(|a, b| b.points.cmp(&a.points).then(a.team_id.cmp(&b.team_id)))
            .collect()
    }
}

impl Engine {
    pub fn team_stats(&self, round_id: RoundId, team_id: TeamId) -> Result<TeamStats, EngineError> {
        let store = self.read();
        store.round(round_id)?;
        let team = store.team(team_id)?;
        Ok(store.team_stats(round_id, team))
    }

    /// Every team of the session, most points first, ties by team id.
    pub fn leaderboard(&self, round_id: RoundId) -> Result<Vec<TeamStats>, EngineError> {
        let store = self.read();
        store.round(round_id)?;
        let leaderboard = store.leaderboard(round_id);
        debug!(round = %round_id, teams = leaderboard.len(), "computed leaderboard");
        Ok(leaderboard)
    }
}
