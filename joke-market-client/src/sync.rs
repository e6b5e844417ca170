//! Keeps a local model of one participant's session in step with the server
//! by polling.
//!
//! Polls only read. Starting a poll aborts the one still in flight, and a
//! result is only applied if no newer poll has started since. Observers
//! subscribed through [`SyncClient::subscribe`] are woken only when the
//! merged model actually changed.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use joke_market_config::Config;
use joke_market_engine::batch::{BatchSubmission, GradingSubmission};
use joke_market_engine::market::PurchaseReceipt;
use joke_market_engine::models::{
    Batch, BatchId, JokeId, JokeRating, ParticipantId, Role, Round, RoundId, TeamId,
};
use joke_market_engine::roster::JoinedSession;
use joke_market_engine::views::{RoleView, SelfSnapshot, SessionSnapshot};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CachedGrading, Caches, EnrichedBatch};
use crate::error::ClientError;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub participant_id: ParticipantId,
    pub token: String,
}

/// The client's merged view of the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientState {
    pub identity: Option<Identity>,
    pub me: Option<SelfSnapshot>,
    pub round: Option<Round>,
    pub view: Option<RoleView>,
    /// Store version of the last applied poll.
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Applied { changed: bool },
    /// A newer poll started before this one finished.
    Superseded,
    /// The server no longer knows this identity; it has been cleared.
    LoggedOut,
    /// Transient failure, the model is left as it was.
    Failed,
}

/// The parts of the self record whose change is worth telling observers
/// about.
#[derive(Debug, PartialEq, Eq)]
struct Fingerprint {
    id: ParticipantId,
    role: Option<Role>,
    team_id: Option<TeamId>,
    budget: Option<u32>,
    purchases: BTreeSet<JokeId>,
}

impl From<&SelfSnapshot> for Fingerprint {
    fn from(me: &SelfSnapshot) -> Self {
        Self {
            id: me.participant.id,
            role: me.participant.role,
            team_id: me.participant.team_id,
            budget: me.budget.map(|budget| budget.remaining),
            purchases: me.purchases.clone(),
        }
    }
}

fn merge(state: &mut ClientState, snapshot: SessionSnapshot) -> bool {
    let mut changed = false;
    if state.me.as_ref().map(Fingerprint::from) != Some(Fingerprint::from(&snapshot.me)) {
        state.me = Some(snapshot.me);
        changed = true;
    }
    if state.round != snapshot.round {
        state.round = snapshot.round;
        changed = true;
    }
    if state.view.as_ref() != Some(&snapshot.view) {
        state.view = Some(snapshot.view);
        changed = true;
    }
    state.version = snapshot.version;
    changed
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SyncClient<T: Transport> {
    transport: Arc<T>,
    state: watch::Sender<ClientState>,
    caches: Mutex<Caches>,
    generation: AtomicU64,
    in_flight: Mutex<Option<AbortHandle>>,
    interval: Duration,
}

impl<T: Transport> SyncClient<T> {
    #[must_use]
    pub fn new(transport: Arc<T>, interval: Duration) -> Self {
        let (state, _) = watch::channel(ClientState::default());
        Self {
            transport,
            state,
            caches: Mutex::new(Caches::default()),
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            interval,
        }
    }

    #[must_use]
    pub fn from_config(transport: Arc<T>, config: &Config) -> Self {
        Self::new(transport, config.poll_interval())
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    fn token(&self) -> Result<String, ClientError> {
        self.state
            .borrow()
            .identity
            .as_ref()
            .map(|identity| identity.token.clone())
            .ok_or(ClientError::LoggedOut)
    }

    /// Makes any poll still in flight stale, so its result is never applied.
    fn supersede(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = lock(&self.in_flight).take() {
            previous.abort();
        }
    }

    fn adopt(&self, joined: JoinedSession) -> Identity {
        let identity = Identity {
            participant_id: joined.participant.id,
            token: joined.token,
        };
        self.supersede();
        lock(&self.caches).clear();
        self.state.send_replace(ClientState {
            identity: Some(identity.clone()),
            ..ClientState::default()
        });
        info!(participant = %identity.participant_id, "logged in");
        identity
    }

    pub async fn join(&self, display_name: &str) -> Result<Identity, ClientError> {
        let joined = self.transport.join(display_name).await?;
        Ok(self.adopt(joined))
    }

    pub async fn instructor_login(
        &self,
        display_name: &str,
        password: &str,
    ) -> Result<Identity, ClientError> {
        let joined = self.transport.instructor_login(display_name, password).await?;
        Ok(self.adopt(joined))
    }

    /// Forgets the identity and everything learned with it.
    pub fn logout(&self) {
        self.supersede();
        lock(&self.caches).clear();
        self.state.send_if_modified(|state| {
            let was_logged_in = state.identity.is_some();
            *state = ClientState::default();
            was_logged_in
        });
    }

    /// Fetches a fresh session snapshot and merges it into the model.
    pub async fn poll(&self) -> PollOutcome {
        let Ok(token) = self.token() else {
            return PollOutcome::LoggedOut;
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let transport = Arc::clone(&self.transport);
        let handle = tokio::spawn(async move { transport.session(&token).await });
        if let Some(previous) = lock(&self.in_flight).replace(handle.abort_handle()) {
            previous.abort();
        }

        let result = match handle.await {
            Ok(result) => result,
            Err(error) => {
                debug!(generation, %error, "poll aborted");
                return PollOutcome::Superseded;
            }
        };
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "dropping result of superseded poll");
            return PollOutcome::Superseded;
        }

        match result {
            Ok(snapshot) => {
                let changed = self.state.send_if_modified(|state| merge(state, snapshot));
                PollOutcome::Applied { changed }
            }
            Err(error) if error.ends_session() => {
                warn!(%error, "session lost, logging out");
                self.logout();
                PollOutcome::LoggedOut
            }
            Err(error) => {
                debug!(%error, "poll failed");
                PollOutcome::Failed
            }
        }
    }

    /// The team's batch history from the last poll, with locally remembered
    /// joke texts and gradings.
    #[must_use]
    pub fn history(&self) -> Vec<EnrichedBatch> {
        let state = self.state.borrow();
        let batches = match &state.view {
            Some(RoleView::Producer { batches, .. }) => batches.as_slice(),
            _ => &[],
        };
        lock(&self.caches).enrich(batches)
    }

    #[must_use]
    pub fn my_grading(&self, round_id: RoundId, batch_id: BatchId) -> Option<CachedGrading> {
        lock(&self.caches).gradings.get(&(round_id, batch_id)).cloned()
    }

    pub async fn submit_batch(
        &self,
        round_id: RoundId,
        team_id: TeamId,
        jokes: Vec<String>,
    ) -> Result<Batch, ClientError> {
        let token = self.token()?;
        let batch = self
            .transport
            .submit_batch(&token, round_id, BatchSubmission { team_id, jokes })
            .await?;
        let texts = batch.jokes.iter().map(|joke| joke.text.clone()).collect();
        lock(&self.caches)
            .batch_texts
            .insert((batch.round_id, batch.id), texts);
        Ok(batch)
    }

    pub async fn submit_grading(
        &self,
        batch_id: BatchId,
        ratings: Vec<JokeRating>,
        feedback: Option<String>,
    ) -> Result<Batch, ClientError> {
        let token = self.token()?;
        let batch = self
            .transport
            .submit_grading(
                &token,
                batch_id,
                GradingSubmission {
                    ratings: ratings.clone(),
                    feedback: feedback.clone(),
                },
            )
            .await?;
        lock(&self.caches)
            .gradings
            .insert((batch.round_id, batch.id), CachedGrading { ratings, feedback });
        Ok(batch)
    }

    pub async fn buy(
        &self,
        round_id: RoundId,
        joke_id: JokeId,
    ) -> Result<PurchaseReceipt, ClientError> {
        let token = self.token()?;
        self.transport.buy(&token, round_id, joke_id).await
    }

    pub async fn return_purchase(
        &self,
        round_id: RoundId,
        joke_id: JokeId,
    ) -> Result<PurchaseReceipt, ClientError> {
        let token = self.token()?;
        self.transport.return_purchase(&token, round_id, joke_id).await
    }
}

/// Polls in the background until cancelled or logged out. Dropping the
/// handle stops the poller.
pub struct PollerHandle {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollerHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        lock(&self.task)
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the poller to exit.
    pub async fn join(&self) {
        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                debug!(%error, "poller ended abnormally");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

pub fn spawn_poller<T: Transport>(client: Arc<SyncClient<T>>) -> PollerHandle {
    let cancel = CancellationToken::new();
    let cancel_task = cancel.clone();
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(client.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel_task.cancelled() => break,
                _ = interval.tick() => {
                    if client.poll().await == PollOutcome::LoggedOut {
                        debug!("stopped polling after logout");
                        break;
                    }
                }
            }
        }
    });
    PollerHandle {
        cancel,
        task: Mutex::new(Some(task)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;
    use joke_market_engine::models::{BatchStatus, ParticipantId};
    use joke_market_engine::round::RoundConfiguration;
    use joke_market_engine::Engine;
    use tokio::sync::Notify;

    use super::*;
    use crate::local::LocalTransport;

    /// Delegates to the engine, but can fail or hang the next session lookup.
    struct Scripted {
        inner: LocalTransport,
        fail: AtomicBool,
        hang_next: AtomicBool,
        started: Notify,
    }

    impl Scripted {
        fn new(engine: Arc<Engine>) -> Self {
            Self {
                inner: LocalTransport::new(engine),
                fail: AtomicBool::new(false),
                hang_next: AtomicBool::new(false),
                started: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn join(&self, display_name: &str) -> Result<JoinedSession, ClientError> {
            self.inner.join(display_name).await
        }

        async fn instructor_login(
            &self,
            display_name: &str,
            password: &str,
        ) -> Result<JoinedSession, ClientError> {
            self.inner.instructor_login(display_name, password).await
        }

        async fn session(&self, token: &str) -> Result<SessionSnapshot, ClientError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClientError::Transport("connection refused".to_owned()));
            }
            if self.hang_next.swap(false, Ordering::SeqCst) {
                self.started.notify_one();
                std::future::pending::<()>().await;
            }
            self.inner.session(token).await
        }

        async fn submit_batch(
            &self,
            token: &str,
            round_id: RoundId,
            submission: BatchSubmission,
        ) -> Result<Batch, ClientError> {
            self.inner.submit_batch(token, round_id, submission).await
        }

        async fn submit_grading(
            &self,
            token: &str,
            batch_id: BatchId,
            submission: GradingSubmission,
        ) -> Result<Batch, ClientError> {
            self.inner.submit_grading(token, batch_id, submission).await
        }

        async fn buy(
            &self,
            token: &str,
            round_id: RoundId,
            joke_id: JokeId,
        ) -> Result<PurchaseReceipt, ClientError> {
            self.inner.buy(token, round_id, joke_id).await
        }

        async fn return_purchase(
            &self,
            token: &str,
            round_id: RoundId,
            joke_id: JokeId,
        ) -> Result<PurchaseReceipt, ClientError> {
            self.inner.return_purchase(token, round_id, joke_id).await
        }
    }

    fn client(engine: &Arc<Engine>) -> (Arc<Scripted>, Arc<SyncClient<Scripted>>) {
        let transport = Arc::new(Scripted::new(Arc::clone(engine)));
        let client = SyncClient::new(Arc::clone(&transport), Duration::from_millis(10));
        (transport, Arc::new(client))
    }

    fn instructor(engine: &Engine) -> ParticipantId {
        engine
            .instructor_login("Frizzle", "instructor")
            .unwrap()
            .participant
            .id
    }

    #[tokio::test]
    async fn observers_only_hear_about_changes() {
        let engine = Arc::new(Engine::default());
        let (_, client) = client(&engine);
        let mut observer = client.subscribe();
        client.join("Ada").await.unwrap();
        observer.borrow_and_update();

        assert_eq!(client.poll().await, PollOutcome::Applied { changed: true });
        assert!(observer.has_changed().unwrap());
        observer.borrow_and_update();
        assert_eq!(client.state().view, Some(RoleView::Unassigned));

        assert_eq!(client.poll().await, PollOutcome::Applied { changed: false });
        engine.join("Bob").unwrap();
        assert_eq!(client.poll().await, PollOutcome::Applied { changed: false });
        assert!(!observer.has_changed().unwrap());
        assert_eq!(client.state().version, engine.version());
    }

    #[tokio::test]
    async fn lost_session_logs_out() {
        let engine = Arc::new(Engine::default());
        let instructor = instructor(&engine);
        let (_, client) = client(&engine);
        let identity = client.join("Ada").await.unwrap();
        client.poll().await;

        engine
            .remove_participant(instructor, identity.participant_id)
            .unwrap();
        assert_eq!(client.poll().await, PollOutcome::LoggedOut);
        assert_eq!(client.identity(), None);
        assert_eq!(client.state(), ClientState::default());
        assert!(matches!(
            client.buy(RoundId(1), JokeId(1)).await,
            Err(ClientError::LoggedOut)
        ));
    }

    #[tokio::test]
    async fn transient_errors_keep_the_model() {
        let engine = Arc::new(Engine::default());
        let (transport, client) = client(&engine);
        client.join("Ada").await.unwrap();
        client.poll().await;
        let before = client.state();

        transport.fail.store(true, Ordering::SeqCst);
        assert_eq!(client.poll().await, PollOutcome::Failed);
        assert_eq!(client.state(), before);
        transport.fail.store(false, Ordering::SeqCst);
        assert!(matches!(client.poll().await, PollOutcome::Applied { .. }));
    }

    #[tokio::test]
    async fn newer_poll_supersedes_older_one() {
        let engine = Arc::new(Engine::default());
        let (transport, client) = client(&engine);
        client.join("Ada").await.unwrap();

        transport.hang_next.store(true, Ordering::SeqCst);
        let first = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.poll().await }
        });
        transport.started.notified().await;

        assert_eq!(client.poll().await, PollOutcome::Applied { changed: true });
        assert_eq!(first.await.unwrap(), PollOutcome::Superseded);
    }

    #[tokio::test]
    async fn joining_again_drops_the_poll_of_the_old_identity() {
        let engine = Arc::new(Engine::default());
        let instructor = instructor(&engine);
        let (transport, client) = client(&engine);
        let ada = client.join("Ada").await.unwrap();

        transport.hang_next.store(true, Ordering::SeqCst);
        let stale = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.poll().await }
        });
        transport.started.notified().await;

        engine.remove_participant(instructor, ada.participant_id).unwrap();
        let bob = client.join("Bob").await.unwrap();
        assert_eq!(stale.await.unwrap(), PollOutcome::Superseded);
        assert_eq!(client.identity(), Some(bob.clone()));

        assert_eq!(client.poll().await, PollOutcome::Applied { changed: true });
        let me = client.state().me.unwrap();
        assert_eq!(me.participant.id, bob.participant_id);
    }

    #[tokio::test]
    async fn poller_stops_on_cancel_and_on_logout() {
        let engine = Arc::new(Engine::default());
        let instructor = instructor(&engine);
        let (_, client) = client(&engine);
        let identity = client.join("Ada").await.unwrap();
        let mut observer = client.subscribe();

        let poller = spawn_poller(Arc::clone(&client));
        tokio::time::timeout(Duration::from_secs(5), observer.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(client.state().me.is_some());

        engine
            .remove_participant(instructor, identity.participant_id)
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), poller.join())
            .await
            .unwrap();
        assert!(poller.is_finished());
        assert_eq!(client.identity(), None);

        client.join("Ada again").await.unwrap();
        let poller = spawn_poller(Arc::clone(&client));
        poller.stop();
        tokio::time::timeout(Duration::from_secs(5), poller.join())
            .await
            .unwrap();
        assert!(client.identity().is_some());
    }

    #[tokio::test]
    async fn own_submissions_enrich_the_history() {
        let engine = Arc::new(Engine::default());
        let instructor = instructor(&engine);
        engine.join("Ada").unwrap();
        engine.join("Bob").unwrap();
        let (transport, producer) = client(&engine);
        producer.join("Cleo").await.unwrap();
        let grader = SyncClient::new(Arc::clone(&transport), Duration::from_millis(10));
        grader.join("Dan").await.unwrap();
        engine.join("Eve").unwrap();
        engine.join("Finn").unwrap();
        engine.auto_assign(instructor, 2, 2).unwrap();
        let round = engine
            .configure_round(
                instructor,
                RoundConfiguration {
                    round_number: 1,
                    batch_size: Some(2),
                    customer_budget: Some(2),
                },
            )
            .unwrap();
        engine.start_round(instructor, round.id).unwrap();

        let jokes = vec!["pun one".to_owned(), "pun two".to_owned()];
        let batch = producer
            .submit_batch(round.id, TeamId(1), jokes.clone())
            .await
            .unwrap();
        producer.poll().await;
        let history = producer.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].summary.status, BatchStatus::Submitted);
        assert_eq!(history[0].jokes.as_ref(), Some(&jokes));

        let ratings: Vec<JokeRating> = batch
            .jokes
            .iter()
            .map(|joke| JokeRating {
                joke_id: joke.id,
                rating: 4,
                tags: Vec::new(),
            })
            .collect();
        grader
            .submit_grading(batch.id, ratings.clone(), Some("nice".to_owned()))
            .await
            .unwrap();
        assert_eq!(
            grader.my_grading(round.id, batch.id).map(|grading| grading.ratings),
            Some(ratings)
        );

        producer.poll().await;
        let history = producer.history();
        assert_eq!(history[0].summary.status, BatchStatus::Rated);
        assert_eq!(history[0].summary.passes_count, Some(2));
        assert_eq!(history[0].jokes.as_ref(), Some(&jokes));
    }
}
