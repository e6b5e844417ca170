use std::sync::Arc;

use async_trait::async_trait;
use joke_market_engine::batch::{BatchSubmission, GradingSubmission};
use joke_market_engine::market::PurchaseReceipt;
use joke_market_engine::models::{Batch, BatchId, JokeId, RoundId};
use joke_market_engine::roster::JoinedSession;
use joke_market_engine::views::SessionSnapshot;
use joke_market_engine::Engine;

use crate::error::ClientError;
use crate::transport::Transport;

/// Talks to an engine in the same process.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    engine: Arc<Engine>,
}

impl LocalTransport {
    #[must_use]
    pub const fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    #[must_use]
    pub const fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn join(&self, display_name: &str) -> Result<JoinedSession, ClientError> {
        Ok(self.engine.join(display_name)?)
    }

    async fn instructor_login(
        &self,
        display_name: &str,
        password: &str,
    ) -> Result<JoinedSession, ClientError> {
        Ok(self.engine.instructor_login(display_name, password)?)
    }

    async fn session(&self, token: &str) -> Result<SessionSnapshot, ClientError> {
        let actor = self.engine.resolve_session(token)?;
        Ok(self.engine.session(actor)?)
    }

    async fn submit_batch(
        &self,
        token: &str,
        round_id: RoundId,
        submission: BatchSubmission,
    ) -> Result<Batch, ClientError> {
        let actor = self.engine.resolve_session(token)?;
        Ok(self.engine.submit_batch(actor, round_id, submission)?)
    }

    async fn submit_grading(
        &self,
        token: &str,
        batch_id: BatchId,
        submission: GradingSubmission,
    ) -> Result<Batch, ClientError> {
        let actor = self.engine.resolve_session(token)?;
        Ok(self.engine.submit_grading(actor, batch_id, submission)?)
    }

    async fn buy(
        &self,
        token: &str,
        round_id: RoundId,
        joke_id: JokeId,
    ) -> Result<PurchaseReceipt, ClientError> {
        let actor = self.engine.resolve_session(token)?;
        Ok(self.engine.buy(actor, round_id, joke_id)?)
    }

    async fn return_purchase(
        &self,
        token: &str,
        round_id: RoundId,
        joke_id: JokeId,
    ) -> Result<PurchaseReceipt, ClientError> {
        let actor = self.engine.resolve_session(token)?;
        Ok(self.engine.return_purchase(actor, round_id, joke_id)?)
    }
}
