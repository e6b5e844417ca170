//! Batches of jokes: submitted by producers, graded once by quality control.
//!
//! The grading queue is FIFO by batch id and reading its head reserves
//! nothing. Several graders may look at the same batch; the first grading to
//! arrive wins and every later one is rejected with
//! [`EngineError::BatchAlreadyRated`].

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::models::{
    Batch, BatchId, BatchStatus, Grading, Joke, JokeId, JokeRating, ParticipantId, Role, Round,
    RoundId, TeamId,
};
use crate::store::Store;
use crate::Engine;

pub const MAX_JOKE_LENGTH: usize = 280;
pub const MAX_FEEDBACK_LENGTH: usize = 1000;
pub const MAX_TAGS: usize = 8;
pub const RATING_SCALE: core::ops::RangeInclusive<u8> = 1..=5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSubmission {
    pub team_id: TeamId,
    pub jokes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GradingSubmission {
    pub ratings: Vec<JokeRating>,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// A team's view of one of its batches. Joke texts are not echoed back, only
/// their ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub id: BatchId,
    pub round_id: RoundId,
    pub team_id: TeamId,
    pub status: BatchStatus,
    pub joke_ids: Vec<JokeId>,
    pub submitted_at: DateTime<Utc>,
    pub average_score: Option<f64>,
    pub passes_count: Option<u32>,
    pub feedback: Option<String>,
    pub rated_at: Option<DateTime<Utc>>,
}

impl From<&Batch> for BatchSummary {
    fn from(batch: &Batch) -> Self {
        let grading = batch.grading.as_ref();
        Self {
            id: batch.id,
            round_id: batch.round_id,
            team_id: batch.team_id,
            status: batch.status(),
            joke_ids: batch.jokes.iter().map(|joke| joke.id).collect(),
            submitted_at: batch.submitted_at,
            average_score: grading.map(|grading| grading.average_score),
            passes_count: grading.map(|grading| grading.passes_count),
            feedback: grading.and_then(|grading| grading.feedback.clone()),
            rated_at: grading.map(|grading| grading.rated_at),
        }
    }
}

/// The head of the grading queue, with everything a grader needs to rate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingTicket {
    pub batch_id: BatchId,
    pub round_id: RoundId,
    pub team_id: TeamId,
    pub jokes: Vec<Joke>,
    pub submitted_at: DateTime<Utc>,
    /// Submitted batches still waiting, this one included.
    pub queue_len: usize,
}

fn check_batch_size(round: &Round, count: usize) -> Result<(), EngineError> {
    let limit = round.batch_size as usize;
    if round.round_number == 1 {
        if count != limit {
            return Err(EngineError::Validation(format!(
                "a batch in round 1 must have exactly {limit} jokes, not {count}"
            )));
        }
    } else if count == 0 || count > limit {
        return Err(EngineError::Validation(format!(
            "a batch in round {} must have between 1 and {limit} jokes, not {count}",
            round.round_number
        )));
    }
    Ok(())
}

fn clean_jokes(jokes: Vec<String>) -> Result<Vec<String>, EngineError> {
    jokes
        .into_iter()
        .map(|joke| {
            let joke = joke.trim();
            if joke.is_empty() {
                Err(EngineError::Validation("jokes must not be empty".to_owned()))
            } else if joke.chars().count() > MAX_JOKE_LENGTH {
                Err(EngineError::Validation(format!(
                    "jokes must be at most {MAX_JOKE_LENGTH} characters"
                )))
            } else {
                Ok(joke.to_owned())
            }
        })
        .collect()
}

/// Keeps the ratings of jokes in `batch`, ordered like the batch, and drops
/// the rest.
fn accepted_ratings(batch: &Batch, ratings: Vec<JokeRating>) -> Result<Vec<JokeRating>, EngineError> {
    let mut seen = HashSet::new();
    let mut accepted = Vec::with_capacity(batch.jokes.len());
    for mut rating in ratings {
        let Some(position) = batch.position_of(rating.joke_id) else {
            debug!(batch = %batch.id, joke = %rating.joke_id, "ignoring rating of a joke outside the batch");
            continue;
        };
        if !RATING_SCALE.contains(&rating.rating) {
            return Err(EngineError::Validation(format!(
                "ratings must be between {} and {}",
                RATING_SCALE.start(),
                RATING_SCALE.end()
            )));
        }
        if !seen.insert(rating.joke_id) {
            return Err(EngineError::Validation(format!(
                "joke {} is rated more than once",
                rating.joke_id
            )));
        }
        rating.tags = rating
            .tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .take(MAX_TAGS)
            .map(ToOwned::to_owned)
            .collect();
        accepted.push((position, rating));
    }
    accepted.sort_by_key(|(position, _)| *position);
    Ok(accepted.into_iter().map(|(_, rating)| rating).collect())
}

fn clean_feedback(feedback: Option<String>) -> Result<Option<String>, EngineError> {
    let Some(feedback) = feedback else {
        return Ok(None);
    };
    let feedback = feedback.trim();
    if feedback.chars().count() > MAX_FEEDBACK_LENGTH {
        return Err(EngineError::Validation(format!(
            "feedback must be at most {MAX_FEEDBACK_LENGTH} characters"
        )));
    }
    Ok((!feedback.is_empty()).then(|| feedback.to_owned()))
}

#[allow(clippy::cast_precision_loss)]
fn score(ratings: &[JokeRating], pass_threshold: u8) -> (f64, u32) {
    if ratings.is_empty() {
        return (0.0, 0);
    }
    let total: u32 = ratings.iter().map(|rating| u32::from(rating.rating)).sum();
    let passes = ratings
        .iter()
        .filter(|rating| rating.rating >= pass_threshold)
        .count();
    (
        f64::from(total) / ratings.len() as f64,
        u32::try_from(passes).unwrap_or(u32::MAX),
    )
}

impl Store {
    pub(crate) fn grading_queue(&self, round_id: RoundId) -> impl Iterator<Item = &Batch> {
        self.round_batches(round_id)
            .filter(|batch| batch.status() == BatchStatus::Submitted)
    }

    pub(crate) fn next_for_grading(&self, round_id: RoundId) -> Option<GradingTicket> {
        let batch = self.grading_queue(round_id).next()?;
        Some(GradingTicket {
            batch_id: batch.id,
            round_id,
            team_id: batch.team_id,
            jokes: batch.jokes.clone(),
            submitted_at: batch.submitted_at,
            queue_len: self.grading_queue(round_id).count(),
        })
    }

    pub(crate) fn team_batches(&self, team_id: TeamId) -> Vec<BatchSummary> {
        self.batches
            .values()
            .filter(|batch| batch.team_id == team_id)
            .map(BatchSummary::from)
            .collect()
    }
}

impl Engine {
    pub fn submit_batch(
        &self,
        actor: ParticipantId,
        round_id: RoundId,
        submission: BatchSubmission,
    ) -> Result<Batch, EngineError> {
        let BatchSubmission { team_id, jokes } = submission;
        let jokes = clean_jokes(jokes)?;
        self.mutate("submit_batch", |store| {
            let producer = store.require_role(actor, Role::Producer, "producers")?;
            if producer.team_id != Some(team_id) {
                return Err(EngineError::Forbidden("producers of this team"));
            }
            store.team(team_id)?;
            let round = store.active_round(round_id)?;
            check_batch_size(round, jokes.len())?;

            let id = BatchId(store.sequences.batches.next());
            let jokes: Vec<Joke> = jokes
                .into_iter()
                .map(|text| Joke {
                    id: JokeId(store.sequences.jokes.next()),
                    text,
                })
                .collect();
            for (position, joke) in jokes.iter().enumerate() {
                store.jokes.insert(joke.id, (id, position));
            }
            let batch = Batch {
                id,
                round_id,
                team_id,
                jokes,
                submitted_at: Utc::now(),
                grading: None,
            };
            store.batches.insert(id, batch.clone());
            info!(batch = %id, round = %round_id, team = %team_id, jokes = batch.jokes.len(), "submitted batch");
            Ok(batch)
        })
    }

    /// Oldest ungraded batch of the round, `None` when the queue is empty.
    pub fn next_for_grading(&self, round_id: RoundId) -> Result<Option<GradingTicket>, EngineError> {
        let store = self.read();
        store.round(round_id)?;
        Ok(store.next_for_grading(round_id))
    }

    pub fn submit_grading(
        &self,
        actor: ParticipantId,
        batch_id: BatchId,
        submission: GradingSubmission,
    ) -> Result<Batch, EngineError> {
        let pass_threshold = self.settings.pass_threshold;
        let feedback = clean_feedback(submission.feedback)?;
        self.mutate("submit_grading", |store| {
            store.require_role(actor, Role::QualityControl, "quality control")?;
            let batch = store.batch(batch_id)?;
            store.active_round(batch.round_id)?;
            if batch.grading.is_some() {
                return Err(EngineError::BatchAlreadyRated(batch_id));
            }
            let ratings = accepted_ratings(batch, submission.ratings)?;
            let (average_score, passes_count) = score(&ratings, pass_threshold);

            let batch = store
                .batches
                .get_mut(&batch_id)
                .ok_or(EngineError::BatchNotFound(batch_id))?;
            batch.grading = Some(Grading {
                grader_id: actor,
                average_score,
                passes_count,
                ratings,
                feedback,
                rated_at: Utc::now(),
            });
            info!(batch = %batch_id, average_score, passes_count, "rated batch");
            Ok(batch.clone())
        })
    }

    pub fn grading_queue_len(&self, round_id: RoundId) -> Result<usize, EngineError> {
        let store = self.read();
        store.round(round_id)?;
        Ok(store.grading_queue(round_id).count())
    }

    pub fn batch(&self, batch_id: BatchId) -> Result<Batch, EngineError> {
        self.read().batch(batch_id).cloned()
    }

    /// Batch history of a team across all rounds, oldest first.
    pub fn team_batches(&self, team_id: TeamId) -> Result<Vec<BatchSummary>, EngineError> {
        let store = self.read();
        store.team(team_id)?;
        Ok(store.team_batches(team_id))
    }
}
