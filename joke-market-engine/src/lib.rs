//! The authoritative state of a joke market session: participants, teams,
//! rounds, batches and purchases, behind one lock.
//!
//! Every mutating operation takes the write lock, validates completely and
//! only then applies its changes, so operations are atomic and serialised.
//! Reads take the read lock and return owned snapshots.

pub mod batch;
pub mod error;
pub mod market;
pub mod models;
pub mod round;
pub mod roster;
pub mod stats;
mod store;
pub mod views;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use error::EngineError;
use models::ParticipantId;
use store::Store;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub instructor_password: String,
    pub default_team_count: u32,
    pub pass_threshold: u8,
    pub default_batch_size: u32,
    pub default_customer_budget: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            instructor_password: "instructor".to_owned(),
            default_team_count: 4,
            pass_threshold: 3,
            default_batch_size: 5,
            default_customer_budget: 10,
        }
    }
}

#[derive(Debug)]
pub struct Engine {
    settings: EngineSettings,
    store: RwLock<Store>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl Engine {
    #[must_use]
    pub fn new(settings: EngineSettings) -> Self {
        let store = Store::with_default_teams(settings.default_team_count);
        Self {
            settings,
            store: RwLock::new(store),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Increases with every successful mutation, resets included.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.read().version
    }

    /// Maps the opaque token handed out by [`Engine::join`] or
    /// [`Engine::instructor_login`] back to its participant.
    pub fn resolve_session(&self, token: &str) -> Result<ParticipantId, EngineError> {
        self.read()
            .sessions
            .get(token)
            .copied()
            .ok_or(EngineError::SessionLost)
    }

    // Mutations validate before they change anything, so a store behind a
    // poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Store) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut store = self.write();
        match f(&mut store) {
            Ok(value) => {
                store.touch();
                Ok(value)
            }
            Err(error) => {
                warn!(operation, %error, "rejected");
                Err(error)
            }
        }
    }
}
