use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_type!(ParticipantId(u64));
id_type!(
    /// Teams are numbered from 1 and shown to the players, so they stay small.
    TeamId(u32)
);
id_type!(RoundId(u64));
id_type!(BatchId(u64));
id_type!(
    /// Allocated from one sequence, so the jokes of a batch have consecutive ids.
    JokeId(u64)
);
id_type!(PurchaseId(u64));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Instructor,
    Producer,
    QualityControl,
    Customer,
}

impl Role {
    #[must_use]
    pub const fn is_team_role(self) -> bool {
        matches!(self, Self::Producer | Self::QualityControl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    Waiting,
    Assigned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub status: ParticipantStatus,
    /// `None` exactly when the participant is waiting.
    pub role: Option<Role>,
    pub team_id: Option<TeamId>,
    pub joined_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
}

impl Participant {
    #[must_use]
    pub fn is_instructor(&self) -> bool {
        self.role == Some(Role::Instructor)
    }

    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    pub(crate) fn assign(&mut self, role: Role, team_id: Option<TeamId>, now: DateTime<Utc>) {
        self.status = ParticipantStatus::Assigned;
        self.role = Some(role);
        self.team_id = if role.is_team_role() { team_id } else { None };
        self.assigned_at = Some(now);
    }

    pub(crate) fn unassign(&mut self) {
        self.status = ParticipantStatus::Waiting;
        self.role = None;
        self.team_id = None;
        self.assigned_at = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    Configured,
    Active,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    /// 1: batches must have exactly `batch_size` jokes, 2: at most `batch_size`.
    pub round_number: u8,
    pub status: RoundStatus,
    pub batch_size: u32,
    pub customer_budget: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Tells producer and quality-control clients to show their teammates.
    pub reveal_teams: bool,
}

impl Round {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RoundStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joke {
    pub id: JokeId,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Submitted,
    Rated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JokeRating {
    pub joke_id: JokeId,
    /// 1 to 5.
    pub rating: u8,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grading {
    pub grader_id: ParticipantId,
    pub average_score: f64,
    pub passes_count: u32,
    pub ratings: Vec<JokeRating>,
    pub feedback: Option<String>,
    pub rated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub round_id: RoundId,
    pub team_id: TeamId,
    /// In submission order.
    pub jokes: Vec<Joke>,
    pub submitted_at: DateTime<Utc>,
    /// Set exactly once, by the first accepted grading.
    pub grading: Option<Grading>,
}

impl Batch {
    #[must_use]
    pub const fn status(&self) -> BatchStatus {
        if self.grading.is_some() {
            BatchStatus::Rated
        } else {
            BatchStatus::Submitted
        }
    }

    /// The jokes that made it onto the market: the first `passes_count` in
    /// submission order, not the best rated ones.
    #[must_use]
    pub fn published_jokes(&self) -> &[Joke] {
        let passes = self
            .grading
            .as_ref()
            .map_or(0, |grading| grading.passes_count as usize);
        &self.jokes[..passes.min(self.jokes.len())]
    }

    #[must_use]
    pub fn position_of(&self, joke_id: JokeId) -> Option<usize> {
        self.jokes.iter().position(|joke| joke.id == joke_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub round_id: RoundId,
    pub buyer_id: ParticipantId,
    pub joke_id: JokeId,
    pub team_id: TeamId,
    pub created_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl Purchase {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }
}
