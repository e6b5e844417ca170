//! What a client remembers about its own submissions. The server does not
//! echo joke texts in batch histories and does not hand gradings back to
//! their graders, so clients keep them locally.

use std::collections::BTreeMap;

use joke_market_engine::batch::BatchSummary;
use joke_market_engine::models::{BatchId, JokeRating, RoundId};
use serde::{Deserialize, Serialize};

pub type BatchKey = (RoundId, BatchId);

pub const DEFAULT_CAPACITY: usize = 256;

/// A map holding at most `capacity` entries. Ids only grow, so the smallest
/// key is the oldest entry and the first to go.
#[derive(Debug, Clone)]
pub struct BoundedCache<V> {
    entries: BTreeMap<BatchKey, V>,
    capacity: usize,
}

impl<V> Default for BoundedCache<V> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl<V> BoundedCache<V> {
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
        }
    }

    pub fn insert(&mut self, key: BatchKey, value: V) {
        self.entries.insert(key, value);
        while self.entries.len() > self.capacity {
            self.entries.pop_first();
        }
    }

    #[must_use]
    pub fn get(&self, key: &BatchKey) -> Option<&V> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedGrading {
    pub ratings: Vec<JokeRating>,
    pub feedback: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct Caches {
    /// Joke texts of batches this client submitted.
    pub batch_texts: BoundedCache<Vec<String>>,
    /// Gradings this client submitted.
    pub gradings: BoundedCache<CachedGrading>,
}

/// A polled history entry with whatever the client remembers about it.
/// Status and scores always come from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedBatch {
    pub summary: BatchSummary,
    pub jokes: Option<Vec<String>>,
    pub my_grading: Option<CachedGrading>,
}

impl Caches {
    #[must_use]
    pub fn enrich(&self, history: &[BatchSummary]) -> Vec<EnrichedBatch> {
        history
            .iter()
            .map(|summary| {
                let key = (summary.round_id, summary.id);
                EnrichedBatch {
                    summary: summary.clone(),
                    jokes: self.batch_texts.get(&key).cloned(),
                    my_grading: self.gradings.get(&key).cloned(),
                }
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.batch_texts.clear();
        self.gradings.clear();
    }
}
