//! In-memory visibility store.
//!
//! Both directions are indexed under one lock so that an edge is never
//! visible from one side only.

use crate::traits::VisibilityStore;
use crate::{VisibilityError, VisibilityResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

#[derive(Default)]
struct EdgeIndex {
    by_granter: BTreeMap<String, BTreeSet<String>>,
    by_grantee: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Default)]
pub struct InMemoryVisibilityStore {
    edges: RwLock<EdgeIndex>,
}

impl InMemoryVisibilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_poisoned() -> VisibilityError {
        VisibilityError::Backend("visibility lock poisoned".to_string())
    }
}

#[async_trait]
impl VisibilityStore for InMemoryVisibilityStore {
    async fn edges_from(&self, granter: &str) -> VisibilityResult<BTreeSet<String>> {
        let guard = self.edges.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard.by_granter.get(granter).cloned().unwrap_or_default())
    }

    async fn edges_to(&self, grantee: &str) -> VisibilityResult<BTreeSet<String>> {
        let guard = self.edges.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard.by_grantee.get(grantee).cloned().unwrap_or_default())
    }

    async fn add_edge(&self, granter: &str, grantee: &str) -> VisibilityResult<bool> {
        let mut guard = self.edges.write().map_err(|_| Self::lock_poisoned())?;
        let inserted = guard
            .by_granter
            .entry(granter.to_string())
            .or_default()
            .insert(grantee.to_string());
        guard
            .by_grantee
            .entry(grantee.to_string())
            .or_default()
            .insert(granter.to_string());
        Ok(inserted)
    }

    async fn remove_edge(&self, granter: &str, grantee: &str) -> VisibilityResult<bool> {
        let mut guard = self.edges.write().map_err(|_| Self::lock_poisoned())?;
        let removed = remove_from(&mut guard.by_granter, granter, grantee);
        remove_from(&mut guard.by_grantee, grantee, granter);
        Ok(removed)
    }
}

/// Drop `member` from the set under `key`, and the key once its set is empty.
fn remove_from(index: &mut BTreeMap<String, BTreeSet<String>>, key: &str, member: &str) -> bool {
    let Some(set) = index.get_mut(key) else {
        return false;
    };
    let removed = set.remove(member);
    if set.is_empty() {
        index.remove(key);
    }
    removed
}
