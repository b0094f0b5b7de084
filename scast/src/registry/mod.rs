//! Session registry.
//!
//! The single source of truth for session lookup and listing. Registry
//! membership is serialized behind one lock; individual session state lives
//! in the runners and is never touched here.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::session::SessionHandle;
use crate::{Error, Result};

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<String, Arc<SessionHandle>>,
    /// name -> id
    by_name: HashMap<String, String>,
}

/// Thread-safe name/id map of all sessions, owned by the orchestrator.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Fails with `DuplicateName` when the name is taken;
    /// the registry is left unchanged in that case.
    pub fn register(&self, handle: Arc<SessionHandle>) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(handle.name()) {
            return Err(Error::DuplicateName {
                name: handle.name().to_string(),
            });
        }
        inner
            .by_name
            .insert(handle.name().to_string(), handle.id().to_string());
        inner.by_id.insert(handle.id().to_string(), handle);
        Ok(())
    }

    /// Look up by session id.
    pub fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.inner.read().by_id.get(id).cloned()
    }

    /// Look up by session name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<SessionHandle>> {
        let inner = self.inner.read();
        inner
            .by_name
            .get(name)
            .and_then(|id| inner.by_id.get(id))
            .cloned()
    }

    /// Whether a session with this name exists.
    pub fn contains_name(&self, name: &str) -> bool {
        self.inner.read().by_name.contains_key(name)
    }

    /// Stable snapshot of all sessions.
    pub fn list(&self) -> Vec<Arc<SessionHandle>> {
        self.inner.read().by_id.values().cloned().collect()
    }

    /// Remove a session by id, returning its handle.
    pub fn remove(&self, id: &str) -> Option<Arc<SessionHandle>> {
        let mut inner = self.inner.write();
        let handle = inner.by_id.remove(id)?;
        inner.by_name.remove(handle.name());
        Some(handle)
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_id.is_empty()
    }
}
