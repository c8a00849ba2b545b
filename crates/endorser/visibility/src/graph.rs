use crate::memory::InMemoryVisibilityStore;
use crate::traits::VisibilityStore;
use crate::{VisibilityError, VisibilityResult};
use endorser_types::is_identifier_shaped;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Identifiers one viewer may see, captured at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisibleSet {
    viewer: Option<String>,
    visible: BTreeSet<String>,
}

impl VisibleSet {
    /// The set for an unauthenticated request: nobody is visible.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new<I, S>(viewer: impl Into<String>, granters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let viewer = viewer.into();
        let mut visible = granters.into_iter().map(Into::into).collect::<BTreeSet<_>>();
        visible.insert(viewer.clone());
        Self {
            viewer: Some(viewer),
            visible,
        }
    }

    pub fn viewer(&self) -> Option<&str> {
        self.viewer.as_deref()
    }

    pub fn can_see(&self, identifier: &str) -> bool {
        self.visible.contains(identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.visible.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }
}

/// Visibility service. Cheap to clone; all clones share one store.
#[derive(Clone)]
pub struct VisibilityGraph {
    store: Arc<dyn VisibilityStore>,
}

impl Default for VisibilityGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityGraph {
    /// Graph over an in-memory edge store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryVisibilityStore::new()))
    }

    pub fn with_store(store: Arc<dyn VisibilityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn VisibilityStore> {
        &self.store
    }

    pub async fn can_see(&self, viewer: &str, subject: &str) -> VisibilityResult<bool> {
        if viewer == subject {
            return Ok(true);
        }
        Ok(self.store.edges_from(subject).await?.contains(viewer))
    }

    /// The viewer plus every identifier with a direct grant to it.
    pub async fn visible_set(&self, viewer: Option<&str>) -> VisibilityResult<VisibleSet> {
        match viewer {
            None => Ok(VisibleSet::anonymous()),
            Some(viewer) => {
                let granters = self.store.edges_to(viewer).await?;
                Ok(VisibleSet::new(viewer, granters))
            }
        }
    }

    /// Allow `grantee` to see `granter`. Returns false if already granted.
    pub async fn grant(
        &self,
        caller: &str,
        granter: &str,
        grantee: &str,
    ) -> VisibilityResult<bool> {
        check_caller(caller, granter)?;
        check_identifier(grantee)?;
        let inserted = self.store.add_edge(granter, grantee).await?;
        debug!(granter, grantee, inserted, "visibility granted");
        Ok(inserted)
    }

    /// Withdraw a grant. Returns false if there was nothing to withdraw.
    pub async fn revoke(
        &self,
        caller: &str,
        granter: &str,
        grantee: &str,
    ) -> VisibilityResult<bool> {
        check_caller(caller, granter)?;
        check_identifier(grantee)?;
        let removed = self.store.remove_edge(granter, grantee).await?;
        debug!(granter, grantee, removed, "visibility revoked");
        Ok(removed)
    }

    /// Bootstrap edges between a registrar and the party it registered. Each
    /// side may later revoke its own edge.
    pub async fn register(&self, registrar: &str, registrant: &str) -> VisibilityResult<()> {
        check_identifier(registrar)?;
        check_identifier(registrant)?;
        if registrar == registrant {
            return Ok(());
        }
        self.store.add_edge(registrar, registrant).await?;
        self.store.add_edge(registrant, registrar).await?;
        debug!(registrar, registrant, "registration visibility bootstrapped");
        Ok(())
    }

    /// Identifiers that `granter` lets see it.
    pub async fn who_can_see(&self, granter: &str) -> VisibilityResult<BTreeSet<String>> {
        self.store.edges_from(granter).await
    }

    /// Identifiers visible to `viewer`, excluding itself.
    pub async fn seen_by(&self, viewer: &str) -> VisibilityResult<BTreeSet<String>> {
        self.store.edges_to(viewer).await
    }
}

fn check_caller(caller: &str, granter: &str) -> VisibilityResult<()> {
    if caller != granter {
        return Err(VisibilityError::NotGranter {
            caller: caller.to_string(),
            granter: granter.to_string(),
        });
    }
    check_identifier(granter)
}

fn check_identifier(identifier: &str) -> VisibilityResult<()> {
    if is_identifier_shaped(identifier) {
        Ok(())
    } else {
        Err(VisibilityError::InvalidIdentifier(identifier.to_string()))
    }
}
