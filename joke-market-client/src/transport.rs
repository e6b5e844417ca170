use async_trait::async_trait;
use joke_market_engine::batch::{BatchSubmission, GradingSubmission};
use joke_market_engine::market::PurchaseReceipt;
use joke_market_engine::models::{Batch, BatchId, JokeId, RoundId};
use joke_market_engine::roster::JoinedSession;
use joke_market_engine::views::SessionSnapshot;

use crate::error::ClientError;

/// The operations a player client needs, independent of how they reach the
/// engine. Every call except joining carries the session token.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn join(&self, display_name: &str) -> Result<JoinedSession, ClientError>;

    async fn instructor_login(
        &self,
        display_name: &str,
        password: &str,
    ) -> Result<JoinedSession, ClientError>;

    /// The identity lookup the poller runs on every tick.
    async fn session(&self, token: &str) -> Result<SessionSnapshot, ClientError>;

    async fn submit_batch(
        &self,
        token: &str,
        round_id: RoundId,
        submission: BatchSubmission,
    ) -> Result<Batch, ClientError>;

    async fn submit_grading(
        &self,
        token: &str,
        batch_id: BatchId,
        submission: GradingSubmission,
    ) -> Result<Batch, ClientError>;

    async fn buy(
        &self,
        token: &str,
        round_id: RoundId,
        joke_id: JokeId,
    ) -> Result<PurchaseReceipt, ClientError>;

    async fn return_purchase(
        &self,
        token: &str,
        round_id: RoundId,
        joke_id: JokeId,
    ) -> Result<PurchaseReceipt, ClientError>;
}
