use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::contract::{ActionFilter, ActionPatch, ActionStore};
use warden_core::{Action, ActionStatus, Result, WardenError};

/// In-process store. A single mutex guards the map, which makes every
/// conditional update atomic with respect to every other store call.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<Uuid, Action>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unavailable backend: every call fails with a store error
    /// until switched back on.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(WardenError::Store("memory store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ActionStore for MemoryStore {
    async fn create(&self, action: &Action) -> Result<()> {
        self.check_online()?;
        let mut rows = self.rows.lock();
        if rows.contains_key(&action.id) {
            return Err(WardenError::Store(format!(
                "action {} already exists",
                action.id
            )));
        }
        rows.insert(action.id, action.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Action>> {
        self.check_online()?;
        Ok(self.rows.lock().get(&id).cloned())
    }

    async fn list(&self, filter: &ActionFilter) -> Result<Vec<Action>> {
        self.check_online()?;
        let mut matched: Vec<Action> = self
            .rows
            .lock()
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matched.sort_by_key(|a| a.requested_at);
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn conditional_update(
        &self,
        id: Uuid,
        expected: ActionStatus,
        new: ActionStatus,
        patch: ActionPatch,
    ) -> Result<usize> {
        self.check_online()?;
        let mut rows = self.rows.lock();
        match rows.get_mut(&id) {
            Some(action) if action.status == expected => {
                action.status = new;
                patch.apply(action);
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}
