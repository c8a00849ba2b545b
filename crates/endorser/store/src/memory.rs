//! In-memory reference implementation of the claim log.
//!
//! One `RwLock` guards the claims and every secondary index, so an append is
//! checked and committed as a single step. Production deployments should use
//! the PostgreSQL adapter.

use crate::model::{
    content_hash, match_hash, ClaimAppend, ClaimFilter, ClaimRecord, ConfirmationRecord,
    FulfillmentRecord, HandleBinding, HandleState, QueryWindow,
};
use crate::traits::ClaimLog;
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use endorser_types::{HandleId, SequenceId};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct LogState {
    /// Position `i` holds sequence id `i + 1`.
    claims: Vec<ClaimRecord>,
    handles: HashMap<HandleId, HandleState>,
    versions: HashMap<HandleId, Vec<SequenceId>>,
    by_hash: HashMap<String, Vec<SequenceId>>,
    by_match_hash: HashMap<String, Vec<SequenceId>>,
    links: Vec<FulfillmentRecord>,
    links_by_parent: HashMap<HandleId, Vec<usize>>,
    links_by_child: HashMap<SequenceId, Vec<usize>>,
    confirmations: Vec<ConfirmationRecord>,
    confirmations_by_target: HashMap<SequenceId, Vec<usize>>,
}

impl LogState {
    fn get(&self, id: SequenceId) -> Option<&ClaimRecord> {
        let index = usize::try_from(id.value()).ok()?.checked_sub(1)?;
        self.claims.get(index)
    }

    fn is_current(&self, record: &ClaimRecord) -> bool {
        match &record.handle_id {
            None => true,
            Some(handle) => self
                .handles
                .get(handle)
                .is_some_and(|state| state.current == record.sequence_id),
        }
    }

    fn link_is_current(&self, link: &FulfillmentRecord) -> bool {
        match &link.child_handle {
            None => true,
            Some(handle) => self
                .handles
                .get(handle)
                .is_some_and(|state| state.current == link.child_sequence),
        }
    }

    fn already_counted(&self, confirmer: &str, target: SequenceId) -> bool {
        self.confirmations_by_target
            .get(&target)
            .into_iter()
            .flatten()
            .filter_map(|i| self.confirmations.get(*i))
            .any(|c| c.counted && c.confirmer == confirmer)
    }
}

/// Handle index change decided before anything is written.
enum HandleChange {
    None,
    Insert(HandleState),
    Advance(HandleId),
}

#[derive(Default)]
pub struct InMemoryClaimLog {
    state: RwLock<LogState>,
}

impl InMemoryClaimLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_poisoned() -> StoreError {
        StoreError::Backend("claim log lock poisoned".to_string())
    }
}

#[async_trait]
impl ClaimLog for InMemoryClaimLog {
    async fn append(&self, claim: ClaimAppend) -> StoreResult<ClaimRecord> {
        let mut guard = self.state.write().map_err(|_| Self::lock_poisoned())?;
        let sequence_id = SequenceId::new(guard.claims.len() as u64 + 1);
        let applied = claim.disposition.is_applied();
        let kind = claim.claim_type.handle_kind().to_string();

        let change = if !applied {
            HandleChange::None
        } else {
            match &claim.binding {
                HandleBinding::Unbound => HandleChange::None,
                HandleBinding::Allocate { namespace, owner } => {
                    let handle = namespace.handle_for(sequence_id);
                    if guard.handles.contains_key(&handle) {
                        return Err(StoreError::Conflict(format!(
                            "handle {handle} already exists"
                        )));
                    }
                    HandleChange::Insert(HandleState {
                        handle_id: handle,
                        owner: owner.clone(),
                        kind,
                        first: sequence_id,
                        current: sequence_id,
                    })
                }
                HandleBinding::Fresh { handle, owner } => {
                    if guard.handles.contains_key(handle) {
                        return Err(StoreError::Conflict(format!(
                            "handle {handle} already exists"
                        )));
                    }
                    HandleChange::Insert(HandleState {
                        handle_id: handle.clone(),
                        owner: owner.clone(),
                        kind,
                        first: sequence_id,
                        current: sequence_id,
                    })
                }
                HandleBinding::Supersede {
                    handle,
                    expected_current,
                } => {
                    let state = guard.handles.get(handle).ok_or_else(|| {
                        StoreError::NotFound(format!("handle {handle} not found"))
                    })?;
                    if state.current != *expected_current {
                        return Err(StoreError::StaleVersion {
                            handle: handle.clone(),
                            expected: *expected_current,
                            found: state.current,
                        });
                    }
                    HandleChange::Advance(handle.clone())
                }
            }
        };

        for confirmation in &claim.confirmations {
            if guard.get(confirmation.target_sequence).is_none() {
                return Err(StoreError::InvalidInput(format!(
                    "confirmation target {} does not exist",
                    confirmation.target_sequence
                )));
            }
        }

        let handle_id = match change {
            HandleChange::None => None,
            HandleChange::Insert(state) => {
                let handle = state.handle_id.clone();
                debug!(%handle, %sequence_id, "handle created");
                guard.handles.insert(handle.clone(), state);
                Some(handle)
            }
            HandleChange::Advance(handle) => {
                if let Some(state) = guard.handles.get_mut(&handle) {
                    state.current = sequence_id;
                }
                debug!(%handle, %sequence_id, "handle advanced");
                Some(handle)
            }
        };

        let record = ClaimRecord {
            sequence_id,
            issuer: claim.issuer,
            subject: claim.subject,
            claim_type: claim.claim_type,
            content_hash: content_hash(&claim.payload),
            payload: claim.payload,
            issued_at: claim.issued_at,
            recorded_at: Utc::now(),
            handle_id: handle_id.clone(),
            disposition: claim.disposition,
        };

        if let Some(handle) = &handle_id {
            guard
                .versions
                .entry(handle.clone())
                .or_default()
                .push(sequence_id);
        }
        if applied {
            guard
                .by_hash
                .entry(record.content_hash.clone())
                .or_default()
                .push(sequence_id);
            guard
                .by_match_hash
                .entry(match_hash(&record.payload))
                .or_default()
                .push(sequence_id);

            for link in claim.links {
                let index = guard.links.len();
                guard
                    .links_by_parent
                    .entry(link.parent_handle.clone())
                    .or_default()
                    .push(index);
                guard
                    .links_by_child
                    .entry(sequence_id)
                    .or_default()
                    .push(index);
                guard.links.push(FulfillmentRecord {
                    child_sequence: sequence_id,
                    child_handle: handle_id.clone(),
                    child_type: record.claim_type.clone(),
                    kind: link.kind,
                    parent_handle: link.parent_handle,
                    parent_type: link.parent_type,
                    declared_last_claim: link.declared_last_claim,
                    resolved_current: link.resolved_current,
                });
            }

            for confirmation in claim.confirmations {
                let counted = confirmation.counted
                    && !guard.already_counted(&record.issuer, confirmation.target_sequence);
                let index = guard.confirmations.len();
                guard
                    .confirmations_by_target
                    .entry(confirmation.target_sequence)
                    .or_default()
                    .push(index);
                guard.confirmations.push(ConfirmationRecord {
                    confirmation_sequence: sequence_id,
                    confirmer: record.issuer.clone(),
                    target_sequence: confirmation.target_sequence,
                    target_handle: confirmation.target_handle,
                    counted,
                });
            }
        }

        guard.claims.push(record.clone());
        Ok(record)
    }

    async fn by_id(&self, id: SequenceId) -> StoreResult<Option<ClaimRecord>> {
        let guard = self.state.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard.get(id).cloned())
    }

    async fn by_handle(&self, handle: &HandleId) -> StoreResult<Vec<ClaimRecord>> {
        let guard = self.state.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard
            .versions
            .get(handle)
            .into_iter()
            .flatten()
            .filter_map(|id| guard.get(*id).cloned())
            .collect())
    }

    async fn latest_by_handle(&self, handle: &HandleId) -> StoreResult<Option<ClaimRecord>> {
        let guard = self.state.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard
            .handles
            .get(handle)
            .and_then(|state| guard.get(state.current))
            .cloned())
    }

    async fn handle_state(&self, handle: &HandleId) -> StoreResult<Option<HandleState>> {
        let guard = self.state.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard.handles.get(handle).cloned())
    }

    async fn query(&self, filter: &ClaimFilter) -> StoreResult<Vec<ClaimRecord>> {
        let guard = self.state.read().map_err(|_| Self::lock_poisoned())?;
        let candidates: Box<dyn Iterator<Item = &ClaimRecord> + '_> = match &filter.handle_id {
            Some(handle) => Box::new(
                guard
                    .versions
                    .get(handle)
                    .into_iter()
                    .flatten()
                    .filter_map(|id| guard.get(*id)),
            ),
            None => Box::new(guard.claims.iter()),
        };
        let mut values = candidates
            .filter(|record| filter.matches(record))
            .filter(|record| !filter.current_only || guard.is_current(record))
            .cloned()
            .collect::<Vec<_>>();
        if filter.newest_first {
            values.reverse();
        }
        Ok(apply_window(values, filter.window))
    }

    async fn range(
        &self,
        from: SequenceId,
        to: Option<SequenceId>,
    ) -> StoreResult<Vec<ClaimRecord>> {
        let guard = self.state.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard
            .claims
            .iter()
            .filter(|record| record.sequence_id >= from)
            .take_while(|record| to.map_or(true, |to| record.sequence_id <= to))
            .cloned()
            .collect())
    }

    async fn latest_sequence(&self) -> StoreResult<Option<SequenceId>> {
        let guard = self.state.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard.claims.last().map(|record| record.sequence_id))
    }

    async fn by_content_hash(&self, hash: &str) -> StoreResult<Vec<ClaimRecord>> {
        let guard = self.state.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard
            .by_hash
            .get(hash)
            .into_iter()
            .flatten()
            .filter_map(|id| guard.get(*id).cloned())
            .collect())
    }

    async fn by_match_hash(&self, hash: &str) -> StoreResult<Vec<ClaimRecord>> {
        let guard = self.state.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard
            .by_match_hash
            .get(hash)
            .into_iter()
            .flatten()
            .filter_map(|id| guard.get(*id).cloned())
            .collect())
    }

    async fn fulfillments_to(&self, parent: &HandleId) -> StoreResult<Vec<FulfillmentRecord>> {
        let guard = self.state.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard
            .links_by_parent
            .get(parent)
            .into_iter()
            .flatten()
            .filter_map(|i| guard.links.get(*i))
            .filter(|link| guard.link_is_current(link))
            .cloned()
            .collect())
    }

    async fn fulfillments_of(&self, child: SequenceId) -> StoreResult<Vec<FulfillmentRecord>> {
        let guard = self.state.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard
            .links_by_child
            .get(&child)
            .into_iter()
            .flatten()
            .filter_map(|i| guard.links.get(*i).cloned())
            .collect())
    }

    async fn confirmations_of(&self, target: SequenceId) -> StoreResult<Vec<ConfirmationRecord>> {
        let guard = self.state.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard
            .confirmations_by_target
            .get(&target)
            .into_iter()
            .flatten()
            .filter_map(|i| guard.confirmations.get(*i).cloned())
            .collect())
    }

    async fn confirmations_by(&self, confirmer: &str) -> StoreResult<Vec<ConfirmationRecord>> {
        let guard = self.state.read().map_err(|_| Self::lock_poisoned())?;
        Ok(guard
            .confirmations
            .iter()
            .filter(|c| c.confirmer == confirmer)
            .cloned()
            .collect())
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}
