use crate::VisibilityResult;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Storage interface for visibility edges.
#[async_trait]
pub trait VisibilityStore: Send + Sync {
    /// Grantees that `granter` allows to see it.
    async fn edges_from(&self, granter: &str) -> VisibilityResult<BTreeSet<String>>;

    /// Granters that allow `grantee` to see them.
    async fn edges_to(&self, grantee: &str) -> VisibilityResult<BTreeSet<String>>;

    /// Insert an edge. Returns false when it was already present.
    async fn add_edge(&self, granter: &str, grantee: &str) -> VisibilityResult<bool>;

    /// Remove an edge. Returns false when it was absent.
    async fn remove_edge(&self, granter: &str, grantee: &str) -> VisibilityResult<bool>;
}
