//! Read-only projections polled by clients.
//!
//! Everything here is assembled under a single read lock so that a snapshot
//! never mixes two versions of the store.

use std::collections::BTreeSet;

use joke_market_allocation::feasible_customer_counts;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::batch::{BatchSummary, GradingTicket};
use crate::error::EngineError;
use crate::market::{Budget, MarketJoke};
use crate::models::{JokeId, Participant, ParticipantId, Role, Round, RoundId, Team, TeamId};
use crate::stats::TeamStats;
use crate::store::Store;
use crate::Engine;

/// What a participant knows about themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfSnapshot {
    pub participant: Participant,
    pub team: Option<Team>,
    /// The round the budget and purchases refer to.
    pub round_id: Option<RoundId>,
    /// Only for customers while there is a round.
    pub budget: Option<Budget>,
    /// Jokes with an active purchase by this participant in that round.
    pub purchases: BTreeSet<JokeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSummary {
    pub team: Team,
    pub members: Vec<Participant>,
    /// Counted in the current round.
    pub points: u32,
    pub batches_submitted: u32,
    pub batches_rated: u32,
    pub batches_pending: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleView {
    Instructor {
        roster: Vec<Participant>,
        teams: Vec<TeamSummary>,
        rounds: Vec<Round>,
        leaderboard: Vec<TeamStats>,
        feasible_customer_counts: Vec<u32>,
    },
    Producer {
        team: Option<TeamSummary>,
        batches: Vec<BatchSummary>,
    },
    QualityControl {
        next: Option<GradingTicket>,
        queue_len: usize,
        team: Option<TeamSummary>,
    },
    Customer {
        budget: Option<Budget>,
        market: Vec<MarketJoke>,
    },
    Unassigned,
}

/// Everything one poll of a client needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u64,
    pub me: SelfSnapshot,
    pub round: Option<Round>,
    pub view: RoleView,
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

impl Store {
    fn self_snapshot(&self, actor: ParticipantId) -> Result<SelfSnapshot, EngineError> {
        let participant = self.actor(actor)?.clone();
        let team = participant
            .team_id
            .and_then(|team_id| self.teams.get(&team_id).cloned());
        let round = self.current_round();
        let budget = round
            .filter(|_| participant.has_role(Role::Customer))
            .map(|round| Budget {
                round_id: round.id,
                starting: round.customer_budget,
                remaining: self.remaining_budget(round, actor),
            });
        let purchases = round
            .map(|round| {
                self.active_purchases_of(round.id, actor)
                    .map(|purchase| purchase.joke_id)
                    .collect()
            })
            .unwrap_or_default();
        Ok(SelfSnapshot {
            participant,
            team,
            round_id: round.map(|round| round.id),
            budget,
            purchases,
        })
    }

    fn team_summary(&self, team: &Team) -> TeamSummary {
        let round_id = self.current_round().map(|round| round.id);
        let batches: Vec<_> = round_id
            .map(|round_id| {
                self.round_batches(round_id)
                    .filter(|batch| batch.team_id == team.id)
                    .collect()
            })
            .unwrap_or_default();
        let rated = batches.iter().filter(|batch| batch.grading.is_some()).count();
        let points = round_id.map_or(0, |round_id| {
            self.round_purchases(round_id)
                .filter(|purchase| purchase.team_id == team.id && purchase.is_active())
                .count()
        });
        TeamSummary {
            team: team.clone(),
            members: self.team_members(team.id).cloned().collect(),
            points: count(points),
            batches_submitted: count(batches.len()),
            batches_rated: count(rated),
            batches_pending: count(batches.len() - rated),
        }
    }

    fn team_summary_of(&self, participant: &Participant) -> Option<TeamSummary> {
        participant
            .team_id
            .and_then(|team_id| self.teams.get(&team_id))
            .map(|team| self.team_summary(team))
    }

    fn role_view(&self, me: &SelfSnapshot) -> RoleView {
        let round = self.current_round();
        match me.participant.role {
            Some(Role::Instructor) => {
                let mut rounds: Vec<Round> = self.rounds.values().cloned().collect();
                rounds.sort_by_key(|round| round.round_number);
                RoleView::Instructor {
                    roster: self.participants.values().cloned().collect(),
                    teams: self
                        .teams
                        .values()
                        .map(|team| self.team_summary(team))
                        .collect(),
                    rounds,
                    leaderboard: round
                        .map(|round| self.leaderboard(round.id))
                        .unwrap_or_default(),
                    feasible_customer_counts: feasible_customer_counts(count(
                        self.eligible_participants().len(),
                    )),
                }
            }
            Some(Role::Producer) => RoleView::Producer {
                team: self.team_summary_of(&me.participant),
                batches: me
                    .participant
                    .team_id
                    .map(|team_id| self.team_batches(team_id))
                    .unwrap_or_default(),
            },
            Some(Role::QualityControl) => RoleView::QualityControl {
                next: round.and_then(|round| self.next_for_grading(round.id)),
                queue_len: round.map_or(0, |round| self.grading_queue(round.id).count()),
                team: self.team_summary_of(&me.participant),
            },
            Some(Role::Customer) => RoleView::Customer {
                budget: me.budget,
                market: round
                    .map(|round| self.market(round.id, Some(me.participant.id)))
                    .unwrap_or_default(),
            },
            None => RoleView::Unassigned,
        }
    }
}

impl Engine {
    pub fn me(&self, actor: ParticipantId) -> Result<SelfSnapshot, EngineError> {
        self.read().self_snapshot(actor)
    }

    pub fn team_summary(&self, team_id: TeamId) -> Result<TeamSummary, EngineError> {
        let store = self.read();
        let team = store.team(team_id)?;
        Ok(store.team_summary(team))
    }

    /// Self snapshot, current round and the projection for the actor's role.
    pub fn session(&self, actor: ParticipantId) -> Result<SessionSnapshot, EngineError> {
        let store = self.read();
        let me = store.self_snapshot(actor)?;
        let view = store.role_view(&me);
        debug!(participant = %actor, version = store.version, "built session snapshot");
        Ok(SessionSnapshot {
            version: store.version,
            round: store.current_round().cloned(),
            me,
            view,
        })
    }
}
