use crate::model::{
    ClaimAppend, ClaimFilter, ClaimRecord, ConfirmationRecord, FulfillmentRecord, HandleState,
};
use crate::StoreResult;
use async_trait::async_trait;
use endorser_types::{HandleId, SequenceId};

/// Storage interface for the append-only claim log.
///
/// Implementations must make `append` atomic: the claim row, its handle
/// binding, its links and its confirmations are written together or not at
/// all, and handle checks happen under the same lock or transaction.
#[async_trait]
pub trait ClaimLog: Send + Sync {
    /// Append a claim and return the stored record with its sequence id.
    async fn append(&self, claim: ClaimAppend) -> StoreResult<ClaimRecord>;

    async fn by_id(&self, id: SequenceId) -> StoreResult<Option<ClaimRecord>>;

    /// All versions of a handle, oldest first.
    async fn by_handle(&self, handle: &HandleId) -> StoreResult<Vec<ClaimRecord>>;

    async fn latest_by_handle(&self, handle: &HandleId) -> StoreResult<Option<ClaimRecord>>;

    async fn handle_state(&self, handle: &HandleId) -> StoreResult<Option<HandleState>>;

    async fn query(&self, filter: &ClaimFilter) -> StoreResult<Vec<ClaimRecord>>;

    /// Inclusive range in log order, applied and rejected alike.
    async fn range(&self, from: SequenceId, to: Option<SequenceId>)
        -> StoreResult<Vec<ClaimRecord>>;

    async fn latest_sequence(&self) -> StoreResult<Option<SequenceId>>;

    /// Applied claims with this content hash, oldest first.
    async fn by_content_hash(&self, hash: &str) -> StoreResult<Vec<ClaimRecord>>;

    /// Applied claims with this `match_hash`, oldest first.
    async fn by_match_hash(&self, hash: &str) -> StoreResult<Vec<ClaimRecord>>;

    /// Links to `parent` declared by the current version of each child.
    async fn fulfillments_to(&self, parent: &HandleId) -> StoreResult<Vec<FulfillmentRecord>>;

    /// Links declared by one claim version.
    async fn fulfillments_of(&self, child: SequenceId) -> StoreResult<Vec<FulfillmentRecord>>;

    async fn confirmations_of(&self, target: SequenceId) -> StoreResult<Vec<ConfirmationRecord>>;

    async fn confirmations_by(&self, confirmer: &str) -> StoreResult<Vec<ConfirmationRecord>>;
}
