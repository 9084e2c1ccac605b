//! Process-wide model lookup with deferred resolution.
//!
//! `open` (model creation) and the first view attach can arrive in either
//! order; the registry removes that ordering assumption. A `get` for a model
//! that has not arrived parks a waiter under a deadline; `set` resolves all
//! parked waiters in arrival order; [`ModelRegistry::sweep`] expires entries
//! whose deadline has passed, failing their waiters with
//! [`RegistryError::NotFound`].
//!
//! Time is injected as [`Instant`] arguments so expiry is deterministic under
//! test; no async runtime is involved.

use crate::model::SharedModel;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long a `get` waits for `open` before failing (matches the original
/// protocol's 10 second widget-model wait).
pub const DEFAULT_MODEL_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("model not found for id: {0}")]
    NotFound(String),
}

/// Callback receiving the resolved model, or the timeout failure.
pub type Waiter = Box<dyn FnOnce(Result<SharedModel, RegistryError>)>;

enum Entry {
    Pending { waiters: Vec<Waiter>, deadline: Instant },
    Resolved(SharedModel),
}

pub struct ModelRegistry {
    entries: BTreeMap<String, Entry>,
    timeout: Duration,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> ModelRegistry {
        Self::with_timeout(DEFAULT_MODEL_WAIT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> ModelRegistry {
        ModelRegistry {
            entries: BTreeMap::new(),
            timeout,
        }
    }

    /// Resolve `id` now or later.
    ///
    /// If the model has arrived the waiter runs immediately; otherwise it is
    /// parked until [`set`](Self::set) resolves the entry or a later
    /// [`sweep`](Self::sweep) passes the deadline armed here. A fresh pending
    /// entry gets `now + timeout` as its deadline; joining an existing wait
    /// does not extend it.
    pub fn get<F>(&mut self, id: &str, now: Instant, waiter: F)
    where
        F: FnOnce(Result<SharedModel, RegistryError>) + 'static,
    {
        match self.entries.get_mut(id) {
            Some(Entry::Resolved(model)) => waiter(Ok(model.clone())),
            Some(Entry::Pending { waiters, .. }) => waiters.push(Box::new(waiter)),
            None => {
                self.entries.insert(
                    id.to_string(),
                    Entry::Pending {
                        waiters: vec![Box::new(waiter)],
                        deadline: now + self.timeout,
                    },
                );
            }
        }
    }

    /// The resolved model for `id`, if it has arrived.
    pub fn try_get(&self, id: &str) -> Option<SharedModel> {
        match self.entries.get(id) {
            Some(Entry::Resolved(model)) => Some(model.clone()),
            _ => None,
        }
    }

    /// Store a model, waking any parked waiters in arrival order.
    ///
    /// Replacing a live model for the same id is a protocol violation by the
    /// sender; the registry keeps the newer model and logs it.
    pub fn set(&mut self, id: impl Into<String>, model: SharedModel) {
        let id = id.into();
        match self.entries.insert(id.clone(), Entry::Resolved(model.clone())) {
            Some(Entry::Pending { waiters, .. }) => {
                for waiter in waiters {
                    waiter(Ok(model.clone()));
                }
            }
            Some(Entry::Resolved(_)) => {
                tracing::warn!(model_id = %id, "replaced a live model; missing close?");
            }
            None => {}
        }
    }

    /// Remove the entry for `id`. Parked waiters fail immediately; a future
    /// `get` starts a fresh wait rather than resurrecting the old model.
    pub fn delete(&mut self, id: &str) {
        if let Some(Entry::Pending { waiters, .. }) = self.entries.remove(id) {
            for waiter in waiters {
                waiter(Err(RegistryError::NotFound(id.to_string())));
            }
        }
    }

    /// Expire pending entries whose deadline has passed, failing their
    /// waiters. Returns how many entries were expired.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter_map(|(id, entry)| match entry {
                Entry::Pending { deadline, .. } if *deadline <= now => Some(id.clone()),
                _ => None,
            })
            .collect();
        for id in &expired {
            tracing::warn!(model_id = %id, "model wait timed out");
            if let Some(Entry::Pending { waiters, .. }) = self.entries.remove(id) {
                for waiter in waiters {
                    waiter(Err(RegistryError::NotFound(id.clone())));
                }
            }
        }
        expired.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("entries", &self.entries.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
