//! Round lifecycle: `CONFIGURED -> ACTIVE -> ENDED`.
//!
//! There is one round id per round number. Configuring round 2 creates a fresh
//! round next to round 1; clients find it through [`Engine::list_rounds`].

use core::ops::RangeInclusive;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EngineError;
use crate::models::{ParticipantId, Round, RoundId, RoundStatus};
use crate::Engine;

pub const ROUND_NUMBERS: RangeInclusive<u8> = 1..=2;
pub const BATCH_SIZES: RangeInclusive<u32> = 1..=20;
pub const CUSTOMER_BUDGETS: RangeInclusive<u32> = 1..=100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundConfiguration {
    pub round_number: u8,
    /// Falls back to the configured default when omitted.
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default)]
    pub customer_budget: Option<u32>,
}

impl Engine {
    pub fn configure_round(
        &self,
        actor: ParticipantId,
        configuration: RoundConfiguration,
    ) -> Result<Round, EngineError> {
        let batch_size = configuration
            .batch_size
            .unwrap_or(self.settings.default_batch_size);
        let customer_budget = configuration
            .customer_budget
            .unwrap_or(self.settings.default_customer_budget);
        self.mutate("configure_round", |store| {
            store.require_instructor(actor)?;
            if !ROUND_NUMBERS.contains(&configuration.round_number) {
                return Err(EngineError::Validation(
                    "round number must be 1 or 2".to_owned(),
                ));
            }
            if !BATCH_SIZES.contains(&batch_size) {
                return Err(EngineError::Validation(format!(
                    "batch size must be between {} and {}",
                    BATCH_SIZES.start(),
                    BATCH_SIZES.end()
                )));
            }
            if !CUSTOMER_BUDGETS.contains(&customer_budget) {
                return Err(EngineError::Validation(format!(
                    "customer budget must be between {} and {}",
                    CUSTOMER_BUDGETS.start(),
                    CUSTOMER_BUDGETS.end()
                )));
            }

            let existing = store
                .round_by_number(configuration.round_number)
                .map(|round| (round.id, round.status));
            let id = match existing {
                Some((id, status)) if status != RoundStatus::Configured => {
                    return Err(EngineError::RoundNotConfigured(id));
                }
                Some((id, _)) => id,
                None => RoundId(store.sequences.rounds.next()),
            };
            let round = store.rounds.entry(id).or_insert_with(|| Round {
                id,
                round_number: configuration.round_number,
                status: RoundStatus::Configured,
                batch_size,
                customer_budget,
                started_at: None,
                ended_at: None,
                reveal_teams: false,
            });
            round.batch_size = batch_size;
            round.customer_budget = customer_budget;
            info!(
                round = %id,
                round_number = round.round_number,
                batch_size,
                customer_budget,
                "configured round"
            );
            Ok(round.clone())
        })
    }

    pub fn start_round(&self, actor: ParticipantId, round_id: RoundId) -> Result<Round, EngineError> {
        self.mutate("start_round", |store| {
            store.require_instructor(actor)?;
            let round = store.round(round_id)?;
            if round.status != RoundStatus::Configured {
                return Err(EngineError::RoundNotConfigured(round_id));
            }
            if let Some(other) = store.rounds.values().find(|other| other.is_active()) {
                return Err(EngineError::AnotherRoundActive(other.id));
            }
            let round = store
                .rounds
                .get_mut(&round_id)
                .ok_or(EngineError::RoundNotFound(round_id))?;
            round.status = RoundStatus::Active;
            round.started_at = Some(Utc::now());
            info!(round = %round_id, round_number = round.round_number, "started round");
            Ok(round.clone())
        })
    }

    pub fn end_round(&self, actor: ParticipantId, round_id: RoundId) -> Result<Round, EngineError> {
        self.mutate("end_round", |store| {
            store.require_instructor(actor)?;
            store.active_round(round_id)?;
            let round = store
                .rounds
                .get_mut(&round_id)
                .ok_or(EngineError::RoundNotFound(round_id))?;
            round.status = RoundStatus::Ended;
            round.ended_at = Some(Utc::now());
            info!(round = %round_id, round_number = round.round_number, "ended round");
            Ok(round.clone())
        })
    }

    /// Purely cosmetic, allowed in every state.
    pub fn set_reveal_flag(
        &self,
        actor: ParticipantId,
        round_id: RoundId,
        reveal: bool,
    ) -> Result<Round, EngineError> {
        self.mutate("set_reveal_flag", |store| {
            store.require_instructor(actor)?;
            let round = store
                .rounds
                .get_mut(&round_id)
                .ok_or(EngineError::RoundNotFound(round_id))?;
            round.reveal_teams = reveal;
            info!(round = %round_id, reveal, "set reveal flag");
            Ok(round.clone())
        })
    }

    /// All rounds ordered by round number.
    #[must_use]
    pub fn list_rounds(&self) -> Vec<Round> {
        let store = self.read();
        let mut rounds: Vec<Round> = store.rounds.values().cloned().collect();
        rounds.sort_by_key(|round| round.round_number);
        rounds
    }

    /// The active round, or the latest configured one between rounds.
    #[must_use]
    pub fn active_round(&self) -> Option<Round> {
        self.read().current_round().cloned()
    }

    pub fn round(&self, round_id: RoundId) -> Result<Round, EngineError> {
        self.read().round(round_id).cloned()
    }
}
