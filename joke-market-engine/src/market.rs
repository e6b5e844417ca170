//! The market of published jokes and the per-customer budget ledger.
//!
//! Budgets are never stored. The remaining budget of a customer is the
//! round's starting budget minus their active purchases, and a team's points
//! are the active purchases of its jokes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EngineError;
use crate::models::{
    BatchId, JokeId, ParticipantId, Purchase, PurchaseId, Role, RoundId, TeamId,
};
use crate::store::Store;
use crate::Engine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketJoke {
    pub joke_id: JokeId,
    pub batch_id: BatchId,
    pub team_id: TeamId,
    pub text: String,
    pub bought_by_viewer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub round_id: RoundId,
    pub starting: u32,
    pub remaining: u32,
}

/// Result of a buy or a return. `team_delta` is the change of the owning
/// team's points, +1 for a buy and -1 for a return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub purchase: Purchase,
    pub budget_remaining: u32,
    pub team_id: TeamId,
    pub team_delta: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JokeSelection {
    pub joke_id: JokeId,
}

impl Store {
    /// The team owning `joke_id`, if the joke is published in `round_id`.
    fn published_joke(&self, round_id: RoundId, joke_id: JokeId) -> Result<TeamId, EngineError> {
        self.jokes
            .get(&joke_id)
            .and_then(|(batch_id, position)| self.batches.get(batch_id).map(|batch| (batch, *position)))
            .filter(|(batch, position)| {
                batch.round_id == round_id && *position < batch.published_jokes().len()
            })
            .map(|(batch, _)| batch.team_id)
            .ok_or(EngineError::JokeNotFound(joke_id))
    }

    pub(crate) fn market(&self, round_id: RoundId, viewer_id: Option<ParticipantId>) -> Vec<MarketJoke> {
        let bought: Vec<JokeId> = viewer_id
            .map(|viewer| {
                self.active_purchases_of(round_id, viewer)
                    .map(|purchase| purchase.joke_id)
                    .collect()
            })
            .unwrap_or_default();
        self.round_batches(round_id)
            .flat_map(|batch| {
                batch.published_jokes().iter().map(|joke| MarketJoke {
                    joke_id: joke.id,
                    batch_id: batch.id,
                    team_id: batch.team_id,
                    text: joke.text.clone(),
                    bought_by_viewer: bought.contains(&joke.id),
                })
            })
            .collect()
    }

    pub(crate) fn budget(&self, round_id: RoundId, buyer_id: ParticipantId) -> Result<Budget, EngineError> {
        let round = self.round(round_id)?;
        Ok(Budget {
            round_id,
            starting: round.customer_budget,
            remaining: self.remaining_budget(round, buyer_id),
        })
    }
}

impl Engine {
    /// Every published joke of the round, ordered by batch and position.
    pub fn list_market(
        &self,
        round_id: RoundId,
        viewer_id: Option<ParticipantId>,
    ) -> Result<Vec<MarketJoke>, EngineError> {
        let store = self.read();
        store.round(round_id)?;
        Ok(store.market(round_id, viewer_id))
    }

    pub fn budget(&self, round_id: RoundId, buyer_id: ParticipantId) -> Result<Budget, EngineError> {
        let store = self.read();
        store.actor(buyer_id)?;
        store.budget(round_id, buyer_id)
    }

    pub fn buy(
        &self,
        actor: ParticipantId,
        round_id: RoundId,
        joke_id: JokeId,
    ) -> Result<PurchaseReceipt, EngineError> {
        self.mutate("buy", |store| {
            store.require_role(actor, Role::Customer, "customers")?;
            let round = store.active_round(round_id)?;
            let team_id = store.published_joke(round_id, joke_id)?;
            if store
                .active_purchases_of(round_id, actor)
                .any(|purchase| purchase.joke_id == joke_id)
            {
                return Err(EngineError::AlreadyBought(joke_id));
            }
            let remaining = store.remaining_budget(round, actor);
            if remaining == 0 {
                return Err(EngineError::InsufficientBudget);
            }

            let purchase = Purchase {
                id: PurchaseId(store.sequences.purchases.next()),
                round_id,
                buyer_id: actor,
                joke_id,
                team_id,
                created_at: Utc::now(),
                returned_at: None,
            };
            store.purchases.insert(purchase.id, purchase.clone());
            info!(purchase = %purchase.id, buyer = %actor, joke = %joke_id, team = %team_id, "bought joke");
            Ok(PurchaseReceipt {
                purchase,
                budget_remaining: remaining - 1,
                team_id,
                team_delta: 1,
            })
        })
    }

    pub fn return_purchase(
        &self,
        actor: ParticipantId,
        round_id: RoundId,
        joke_id: JokeId,
    ) -> Result<PurchaseReceipt, EngineError> {
        self.mutate("return_purchase", |store| {
            store.require_role(actor, Role::Customer, "customers")?;
            store.active_round(round_id)?;
            let records: Vec<(PurchaseId, bool)> = store
                .round_purchases(round_id)
                .filter(|purchase| purchase.buyer_id == actor && purchase.joke_id == joke_id)
                .map(|purchase| (purchase.id, purchase.is_active()))
                .collect();
            if records.is_empty() {
                return Err(EngineError::NotBoughtYet(joke_id));
            }
            let id = records
                .into_iter()
                .find_map(|(id, active)| active.then_some(id))
                .ok_or(EngineError::AlreadyReturned(joke_id))?;

            let purchase = store
                .purchases
                .get_mut(&id)
                .ok_or(EngineError::NotBoughtYet(joke_id))?;
            purchase.returned_at = Some(Utc::now());
            let purchase = purchase.clone();
            let budget = store.budget(round_id, actor)?;
            info!(purchase = %purchase.id, buyer = %actor, joke = %joke_id, "returned joke");
            Ok(PurchaseReceipt {
                team_id: purchase.team_id,
                purchase,
                budget_remaining: budget.remaining,
                team_delta: -1,
            })
        })
    }
}
