//! The single owned state of a running session.

use std::collections::{BTreeMap, HashMap};

use crate::error::EngineError;
use crate::models::{
    Batch, BatchId, JokeId, Participant, ParticipantId, Purchase, PurchaseId, Role, Round,
    RoundId, Team, TeamId,
};

/// Monotonic id generator, one per entity kind. Ids start at 1.
#[derive(Debug, Default, Clone)]
pub(crate) struct Sequence(u64);

impl Sequence {
    pub(crate) fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct Sequences {
    pub(crate) participants: Sequence,
    pub(crate) rounds: Sequence,
    pub(crate) batches: Sequence,
    pub(crate) jokes: Sequence,
    pub(crate) purchases: Sequence,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct Store {
    /// Bumped by every successful mutation.
    pub(crate) version: u64,
    pub(crate) sequences: Sequences,
    pub(crate) participants: BTreeMap<ParticipantId, Participant>,
    pub(crate) sessions: HashMap<String, ParticipantId>,
    pub(crate) teams: BTreeMap<TeamId, Team>,
    pub(crate) rounds: BTreeMap<RoundId, Round>,
    pub(crate) batches: BTreeMap<BatchId, Batch>,
    /// Where each joke lives: its batch and its position in that batch.
    pub(crate) jokes: HashMap<JokeId, (BatchId, usize)>,
    pub(crate) purchases: BTreeMap<PurchaseId, Purchase>,
}

impl Store {
    pub(crate) fn with_default_teams(team_count: u32) -> Self {
        let mut store = Self::default();
        for id in 1..=team_count {
            store.ensure_team(TeamId(id));
        }
        store
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
    }

    pub(crate) fn ensure_team(&mut self, id: TeamId) {
        self.teams.entry(id).or_insert_with(|| Team {
            id,
            name: format!("Team {id}"),
        });
    }

    /// Resolves the participant acting on a request. An unknown actor means
    /// the session is gone, not that some entity is missing.
    pub(crate) fn actor(&self, id: ParticipantId) -> Result<&Participant, EngineError> {
        self.participants.get(&id).ok_or(EngineError::SessionLost)
    }

    pub(crate) fn require_role(
        &self,
        id: ParticipantId,
        role: Role,
        who: &'static str,
    ) -> Result<&Participant, EngineError> {
        let actor = self.actor(id)?;
        if actor.has_role(role) {
            Ok(actor)
        } else {
            Err(EngineError::Forbidden(who))
        }
    }

    pub(crate) fn require_instructor(&self, id: ParticipantId) -> Result<(), EngineError> {
        self.require_role(id, Role::Instructor, "the instructor")
            .map(|_| ())
    }

    pub(crate) fn participant(&self, id: ParticipantId) -> Result<&Participant, EngineError> {
        self.participants
            .get(&id)
            .ok_or(EngineError::ParticipantNotFound(id))
    }

    pub(crate) fn team(&self, id: TeamId) -> Result<&Team, EngineError> {
        self.teams.get(&id).ok_or(EngineError::TeamNotFound(id))
    }

    pub(crate) fn round(&self, id: RoundId) -> Result<&Round, EngineError> {
        self.rounds.get(&id).ok_or(EngineError::RoundNotFound(id))
    }

    pub(crate) fn active_round(&self, id: RoundId) -> Result<&Round, EngineError> {
        let round = self.round(id)?;
        if round.is_active() {
            Ok(round)
        } else {
            Err(EngineError::RoundNotActive(id))
        }
    }

    pub(crate) fn batch(&self, id: BatchId) -> Result<&Batch, EngineError> {
        self.batches.get(&id).ok_or(EngineError::BatchNotFound(id))
    }

    pub(crate) fn round_batches(&self, round_id: RoundId) -> impl Iterator<Item = &Batch> {
        self.batches
            .values()
            .filter(move |batch| batch.round_id == round_id)
    }

    pub(crate) fn team_members(&self, team_id: TeamId) -> impl Iterator<Item = &Participant> {
        self.participants
            .values()
            .filter(move |participant| participant.team_id == Some(team_id))
    }

    pub(crate) fn round_purchases(&self, round_id: RoundId) -> impl Iterator<Item = &Purchase> {
        self.purchases
            .values()
            .filter(move |purchase| purchase.round_id == round_id)
    }

    pub(crate) fn active_purchases_of(
        &self,
        round_id: RoundId,
        buyer_id: ParticipantId,
    ) -> impl Iterator<Item = &Purchase> {
        self.round_purchases(round_id)
            .filter(move |purchase| purchase.buyer_id == buyer_id && purchase.is_active())
    }

    pub(crate) fn remaining_budget(&self, round: &Round, buyer_id: ParticipantId) -> u32 {
        let spent = self.active_purchases_of(round.id, buyer_id).count();
        round
            .customer_budget
            .saturating_sub(u32::try_from(spent).unwrap_or(u32::MAX))
    }

    /// The round clients should look at: the active one, otherwise the one
    /// with the highest round number.
    pub(crate) fn current_round(&self) -> Option<&Round> {
        self.rounds
            .values()
            .find(|round| round.is_active())
            .or_else(|| self.rounds.values().max_by_key(|round| round.round_number))
    }

    pub(crate) fn round_by_number(&self, round_number: u8) -> Option<&Round> {
        self.rounds
            .values()
            .find(|round| round.round_number == round_number)
    }
}
