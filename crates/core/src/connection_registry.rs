use std::collections::HashMap;
use std::sync::Arc;

use crate::driver::DbSession;

/// Live sessions keyed by saved-connection id. This is the only owner of
/// a session handle; callers borrow clones for the duration of one job.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    active: HashMap<String, Arc<dyn DbSession>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a session, returning any session previously held for `id`
    /// so the caller can release it.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        session: Arc<dyn DbSession>,
    ) -> Option<Arc<dyn DbSession>> {
        self.active.insert(id.into(), session)
    }

    /// Hands out a session for one background job.
    #[must_use]
    pub fn checkout(&self, id: &str) -> Option<Arc<dyn DbSession>> {
        self.active.get(id).map(Arc::clone)
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<dyn DbSession>> {
        self.active.remove(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Empties the registry, returning every session for release.
    pub fn drain(&mut self) -> Vec<Arc<dyn DbSession>> {
        self.active.drain().map(|(_, session)| session).collect()
    }
}
