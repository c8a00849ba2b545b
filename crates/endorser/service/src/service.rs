//! Service facade.
//!
//! Submissions go through the envelope verifier and the linkage resolver.
//! Every read is scrubbed for the viewer before it leaves this type; an
//! anonymous viewer sees no identifiers at all.

use crate::config::{QueryConfig, ServiceConfig, StorageConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::verifier::{EnvelopeVerifier, PreVerifiedEnvelopes, SignedEnvelope};
use endorser_chain::HashChain;
use endorser_linkage::{LinkageError, LinkageResolver, SubmitReceipt, TotalsRequest, UnitTotals};
use endorser_redaction::{scrub, scrub_with_report};
use endorser_store::{ClaimFilter, ClaimLog, ClaimRecord, InMemoryClaimLog, QueryWindow};
use endorser_types::{SequenceId, VerifiedClaim};
use endorser_visibility::{VisibilityGraph, VisibleSet};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct ClaimService {
    resolver: LinkageResolver,
    verifier: Arc<dyn EnvelopeVerifier>,
    query: QueryConfig,
}

impl ClaimService {
    pub fn new(
        resolver: LinkageResolver,
        verifier: Arc<dyn EnvelopeVerifier>,
        query: QueryConfig,
    ) -> Self {
        Self {
            resolver,
            verifier,
            query,
        }
    }

    /// In-memory stores, default namespace and limits, pre-verified envelopes.
    pub fn in_memory() -> Self {
        Self::new(
            LinkageResolver::in_memory(),
            Arc::new(PreVerifiedEnvelopes),
            QueryConfig::default(),
        )
    }

    /// Build the stores named by the configuration.
    pub async fn from_config(config: &ServiceConfig) -> ServiceResult<Self> {
        let namespace = config
            .namespace()
            .map_err(|e| ServiceError::Config(e.to_string()))?;

        let (log, visibility): (Arc<dyn ClaimLog>, VisibilityGraph) = match &config.storage {
            StorageConfig::Memory => (Arc::new(InMemoryClaimLog::new()), VisibilityGraph::new()),
            #[cfg(feature = "postgres")]
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                let log = endorser_store::postgres::PostgresClaimLog::connect_with_options(
                    url,
                    *max_connections,
                    *connect_timeout_secs,
                )
                .await?;
                let edges =
                    endorser_visibility::postgres::PostgresVisibilityStore::from_pool(
                        log.pool().clone(),
                    )
                    .await?;
                (Arc::new(log), VisibilityGraph::with_store(Arc::new(edges)))
            }
            #[cfg(not(feature = "postgres"))]
            StorageConfig::Postgres { .. } => {
                return Err(ServiceError::Config(
                    "postgres storage requires the `postgres` feature".to_string(),
                ))
            }
        };

        info!(namespace = namespace.prefix(), "claim service ready");
        Ok(Self::new(
            LinkageResolver::new(log, visibility, namespace),
            Arc::new(PreVerifiedEnvelopes),
            config.query,
        ))
    }

    pub fn resolver(&self) -> &LinkageResolver {
        &self.resolver
    }

    // ---------------------------------------------------------------------
    // Submission
    // ---------------------------------------------------------------------

    pub async fn submit(&self, envelope: &SignedEnvelope) -> ServiceResult<SubmitReceipt> {
        let span = info_span!("submit", request_id = %Uuid::new_v4());
        async move {
            let claim = self.verifier.verify(envelope).await?;
            self.submit_verified(claim).await
        }
        .instrument(span)
        .await
    }

    /// Submit a claim whose envelope was verified by the caller.
    pub async fn submit_verified(&self, claim: VerifiedClaim) -> ServiceResult<SubmitReceipt> {
        let receipt = self.resolver.submit(claim).await?;
        info!(
            sequence_id = %receipt.sequence_id,
            claim_type = %receipt.claim_type,
            warnings = receipt.warnings.len(),
            "claim accepted"
        );
        Ok(receipt)
    }

    // ---------------------------------------------------------------------
    // Claim reads
    // ---------------------------------------------------------------------

    pub async fn claim(&self, viewer: Option<&str>, id: SequenceId) -> ServiceResult<Value> {
        let (visible, record) = futures::try_join!(self.visible(viewer), self.record(id))?;
        Ok(scrub(&visible, &serde_json::to_value(&record)?))
    }

    /// Current version of an entity.
    pub async fn claim_by_handle(&self, viewer: Option<&str>, handle: &str) -> ServiceResult<Value> {
        let record = self.resolver.current_version(handle).await?;
        self.scrubbed(viewer, &record).await
    }

    /// The unredacted record, refused if the viewer would lose anything to
    /// scrubbing.
    pub async fn full_claim(&self, viewer: Option<&str>, id: SequenceId) -> ServiceResult<Value> {
        let (visible, record) = futures::try_join!(self.visible(viewer), self.record(id))?;
        let value = serde_json::to_value(&record)?;
        if scrub_with_report(&visible, &value).altered() {
            debug!(sequence_id = %id, "full claim withheld");
            return Err(ServiceError::Hidden);
        }
        Ok(value)
    }

    pub async fn claims(&self, viewer: Option<&str>, filter: ClaimFilter) -> ServiceResult<Vec<Value>> {
        let filter = ClaimFilter {
            window: self.window(filter.window),
            ..filter
        };
        let records = self.resolver.log().query(&filter).await?;
        self.scrubbed_all(viewer, &records).await
    }

    // ---------------------------------------------------------------------
    // Linked views
    // ---------------------------------------------------------------------

    pub async fn plans(
        &self,
        viewer: Option<&str>,
        handle: Option<&str>,
        window: QueryWindow,
    ) -> ServiceResult<Vec<Value>> {
        let views = self.resolver.plans(handle, self.window(window)).await?;
        self.scrubbed_all(viewer, &views).await
    }

    /// Current plans of one issuer, newest first, paged by `before`.
    pub async fn plans_by_issuer(
        &self,
        viewer: Option<&str>,
        issuer: &str,
        before: Option<SequenceId>,
        window: QueryWindow,
    ) -> ServiceResult<Vec<Value>> {
        let views = self
            .resolver
            .plans_by_issuer(issuer, before, self.window(window))
            .await?;
        self.scrubbed_all(viewer, &views).await
    }

    pub async fn offers(
        &self,
        viewer: Option<&str>,
        handle: Option<&str>,
        window: QueryWindow,
    ) -> ServiceResult<Vec<Value>> {
        let views = self.resolver.offers(handle, self.window(window)).await?;
        self.scrubbed_all(viewer, &views).await
    }

    pub async fn gives(
        &self,
        viewer: Option<&str>,
        handle: Option<&str>,
        window: QueryWindow,
    ) -> ServiceResult<Vec<Value>> {
        let views = self.resolver.gives(handle, self.window(window)).await?;
        self.scrubbed_all(viewer, &views).await
    }

    pub async fn offers_to_plan(&self, viewer: Option<&str>, plan: &str) -> ServiceResult<Vec<Value>> {
        let views = self.resolver.offers_to_plan(plan).await?;
        self.scrubbed_all(viewer, &views).await
    }

    pub async fn gives_to_plan(&self, viewer: Option<&str>, plan: &str) -> ServiceResult<Vec<Value>> {
        let views = self.resolver.gives_to_plan(plan).await?;
        self.scrubbed_all(viewer, &views).await
    }

    pub async fn gives_to_plans(
        &self,
        viewer: Option<&str>,
        plans: &[&str],
    ) -> ServiceResult<Vec<Value>> {
        let views = self.resolver.gives_to_plans(plans).await?;
        self.scrubbed_all(viewer, &views).await
    }

    /// The parent plan with `childFulfillsLinkConfirmed`.
    pub async fn plan_fulfilled_by_plan(
        &self,
        viewer: Option<&str>,
        plan: &str,
    ) -> ServiceResult<Option<Value>> {
        match self.resolver.plan_fulfilled_by_plan(plan).await? {
            Some(view) => Ok(Some(self.scrubbed(viewer, &view).await?)),
            None => Ok(None),
        }
    }

    pub async fn plan_fulfillers_to_plan(
        &self,
        viewer: Option<&str>,
        plan: &str,
    ) -> ServiceResult<Vec<Value>> {
        let views = self.resolver.plan_fulfillers_to_plan(plan).await?;
        self.scrubbed_all(viewer, &views).await
    }

    pub async fn give_fulfillers_to_offer(
        &self,
        viewer: Option<&str>,
        offer: &str,
    ) -> ServiceResult<Vec<Value>> {
        let views = self.resolver.give_fulfillers_to_offer(offer).await?;
        self.scrubbed_all(viewer, &views).await
    }

    pub async fn give_fulfillers_to_give(
        &self,
        viewer: Option<&str>,
        give: &str,
    ) -> ServiceResult<Vec<Value>> {
        let views = self.resolver.give_fulfillers_to_give(give).await?;
        self.scrubbed_all(viewer, &views).await
    }

    pub async fn providers_to_give(
        &self,
        viewer: Option<&str>,
        give: &str,
    ) -> ServiceResult<Vec<Value>> {
        let providers = self.resolver.providers_to_give(give).await?;
        self.scrubbed_all(viewer, &providers).await
    }

    pub async fn gives_provided_by(
        &self,
        viewer: Option<&str>,
        provider: &str,
        window: QueryWindow,
    ) -> ServiceResult<Vec<Value>> {
        let views = self
            .resolver
            .gives_provided_by(provider, self.window(window))
            .await?;
        self.scrubbed_all(viewer, &views).await
    }

    pub async fn confirmations_of(
        &self,
        viewer: Option<&str>,
        target: SequenceId,
    ) -> ServiceResult<Vec<Value>> {
        let views = self.resolver.confirmations_of(target).await?;
        self.scrubbed_all(viewer, &views).await
    }

    /// Totals carry unit codes and amounts only, so nothing needs scrubbing.
    pub async fn offer_totals(
        &self,
        requester: Option<&str>,
        request: &TotalsRequest,
    ) -> ServiceResult<UnitTotals> {
        Ok(self.resolver.offer_totals(requester, request).await?)
    }

    pub async fn give_totals(
        &self,
        requester: Option<&str>,
        request: &TotalsRequest,
    ) -> ServiceResult<UnitTotals> {
        Ok(self.resolver.give_totals(requester, request).await?)
    }

    // ---------------------------------------------------------------------
    // Visibility
    // ---------------------------------------------------------------------

    pub async fn can_see(&self, viewer: &str, subject: &str) -> ServiceResult<bool> {
        Ok(self.resolver.visibility().can_see(viewer, subject).await?)
    }

    /// `caller` must be the granter.
    pub async fn grant(&self, caller: &str, granter: &str, grantee: &str) -> ServiceResult<bool> {
        Ok(self
            .resolver
            .visibility()
            .grant(caller, granter, grantee)
            .await?)
    }

    pub async fn revoke(&self, caller: &str, granter: &str, grantee: &str) -> ServiceResult<bool> {
        Ok(self
            .resolver
            .visibility()
            .revoke(caller, granter, grantee)
            .await?)
    }

    /// Who the caller lets see it.
    pub async fn who_can_see(&self, caller: &str) -> ServiceResult<BTreeSet<String>> {
        Ok(self.resolver.visibility().who_can_see(caller).await?)
    }

    /// Whom the caller can see.
    pub async fn seen_by(&self, caller: &str) -> ServiceResult<BTreeSet<String>> {
        Ok(self.resolver.visibility().seen_by(caller).await?)
    }

    // ---------------------------------------------------------------------
    // Integrity
    // ---------------------------------------------------------------------

    /// Chain digest over the log slice `from..=to`, rejected envelopes
    /// included.
    pub async fn hash_chain(
        &self,
        seed: &str,
        from: SequenceId,
        to: Option<SequenceId>,
    ) -> ServiceResult<String> {
        let records = self.resolver.log().range(from, to).await?;
        let mut chain = HashChain::new(seed);
        for record in &records {
            chain.push(record.sequence_id, &record.payload);
        }
        debug!(from = %from, entries = records.len(), "hash chain computed");
        Ok(chain.into_digest())
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    /// Apply the configured default and ceiling to a requested window.
    pub fn window(&self, requested: QueryWindow) -> QueryWindow {
        let limit = match requested.limit {
            0 => self.query.default_limit,
            limit => limit.min(self.query.max_limit),
        };
        QueryWindow {
            limit,
            offset: requested.offset,
        }
    }

    async fn visible(&self, viewer: Option<&str>) -> ServiceResult<VisibleSet> {
        Ok(self.resolver.visibility().visible_set(viewer).await?)
    }

    async fn record(&self, id: SequenceId) -> ServiceResult<ClaimRecord> {
        self.resolver
            .log()
            .by_id(id)
            .await?
            .ok_or_else(|| LinkageError::NotFound(format!("no claim {id}")).into())
    }

    async fn scrubbed<T: Serialize>(&self, viewer: Option<&str>, value: &T) -> ServiceResult<Value> {
        let visible = self.visible(viewer).await?;
        Ok(scrub(&visible, &serde_json::to_value(value)?))
    }

    async fn scrubbed_all<T: Serialize>(
        &self,
        viewer: Option<&str>,
        values: &[T],
    ) -> ServiceResult<Vec<Value>> {
        let visible = self.visible(viewer).await?;
        values
            .iter()
            .map(|value| Ok(scrub(&visible, &serde_json::to_value(value)?)))
            .collect()
    }
}
