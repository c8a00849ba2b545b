//! Submission pipeline.
//!
//! classify -> validate -> duplicate check -> handle -> fulfills ->
//! confirmation targets -> append -> registration bootstrap.
//!
//! Every check that reads the log happens before the append, and the append
//! carries the expected handle version, so the log rejects an edit that lost
//! a race instead of applying both.

use crate::error::{ConflictKind, LinkageError, LinkageResult};
use crate::parse::{self, LinkRef, TargetRef};
use crate::receipt::{ConfirmationOutcome, LinkOutcome, SubmitReceipt, UnresolvedLinkWarning};
use endorser_store::{
    content_hash, match_hash, ClaimAppend, ClaimLog, ClaimRecord, ConfirmationAppend,
    HandleBinding, InMemoryClaimLog, LinkDeclaration, StoreError,
};
use endorser_types::{
    is_identifier_shaped, mask_identifiers, ClaimType, HandleId, HandleNamespace, VerifiedClaim,
};
use endorser_visibility::VisibilityGraph;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolves submissions against the claim log and assembles linked views.
#[derive(Clone)]
pub struct LinkageResolver {
    pub(crate) log: Arc<dyn ClaimLog>,
    pub(crate) visibility: VisibilityGraph,
    pub(crate) namespace: HandleNamespace,
}

/// Everything decided about a submission before it is appended.
struct Submission {
    binding: HandleBinding,
    links: Vec<LinkDeclaration>,
    confirmations: Vec<ConfirmationAppend>,
    registrant: Option<String>,
    warnings: Vec<UnresolvedLinkWarning>,
}

impl LinkageResolver {
    pub fn new(
        log: Arc<dyn ClaimLog>,
        visibility: VisibilityGraph,
        namespace: HandleNamespace,
    ) -> Self {
        Self {
            log,
            visibility,
            namespace,
        }
    }

    /// Resolver over fresh in-memory stores with the default namespace.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryClaimLog::new()),
            VisibilityGraph::new(),
            HandleNamespace::default(),
        )
    }

    pub fn log(&self) -> &Arc<dyn ClaimLog> {
        &self.log
    }

    pub fn visibility(&self) -> &VisibilityGraph {
        &self.visibility
    }

    pub fn namespace(&self) -> &HandleNamespace {
        &self.namespace
    }

    /// Turn lookup text (full handle or bare local suffix) into a handle.
    pub fn resolve_reference(&self, reference: &str) -> LinkageResult<HandleId> {
        Ok(self.namespace.expand(reference)?)
    }

    /// Validate, link and record one verified claim.
    pub async fn submit(&self, claim: VerifiedClaim) -> LinkageResult<SubmitReceipt> {
        let claim_type = claim.claim_type();
        let append = ClaimAppend::from_verified(&claim);

        let submission = match self.prepare(&claim, &claim_type).await {
            Ok(submission) => submission,
            Err(err) => return self.reject(append, err).await,
        };
        let Submission {
            binding,
            links,
            confirmations,
            registrant,
            mut warnings,
        } = submission;

        let fulfills = links.iter().map(link_outcome).collect::<Vec<_>>();
        let requested = confirmations.clone();
        let applied = append
            .clone()
            .with_binding(binding)
            .with_links(links)
            .with_confirmations(confirmations);
        let record = match self.log.append(applied).await {
            Ok(record) => record,
            Err(StoreError::StaleVersion { handle, .. }) => {
                let err: LinkageError = ConflictKind::ConcurrentEdit(handle.to_string()).into();
                return self.reject(append, err).await;
            }
            Err(StoreError::Conflict(message)) => {
                let err: LinkageError = ConflictKind::ConcurrentEdit(message).into();
                return self.reject(append, err).await;
            }
            Err(err) => return Err(err.into()),
        };

        // Recorded from here on: later failures are warnings, never errors.
        if let Some(registrant) = registrant {
            if let Err(err) = self.visibility.register(&record.issuer, &registrant).await {
                warn!(sequence_id = %record.sequence_id, error = %err, "registration visibility not granted");
                warnings.push(UnresolvedLinkWarning::registration(
                    registrant,
                    "visibility could not be granted",
                ));
            }
        }

        let confirmations = match self.log.confirmations_by(&record.issuer).await {
            Ok(stored) => stored
                .into_iter()
                .filter(|c| c.confirmation_sequence == record.sequence_id)
                .map(|c| ConfirmationOutcome {
                    target_sequence_id: c.target_sequence,
                    target_handle_id: c.target_handle,
                    counted: c.counted,
                })
                .collect(),
            Err(err) => {
                warn!(sequence_id = %record.sequence_id, error = %err, "confirmation tallies not read back");
                requested
                    .into_iter()
                    .map(|c| ConfirmationOutcome {
                        target_sequence_id: c.target_sequence,
                        target_handle_id: c.target_handle,
                        counted: c.counted,
                    })
                    .collect()
            }
        };

        for warning in &warnings {
            info!(sequence_id = %record.sequence_id, %warning, "claim recorded with unresolved link");
        }
        debug!(
            sequence_id = %record.sequence_id,
            claim_type = %record.claim_type,
            handle = ?record.handle_id.as_ref().map(HandleId::as_str),
            "claim applied"
        );

        Ok(SubmitReceipt {
            sequence_id: record.sequence_id,
            handle_id: record.handle_id,
            claim_type: record.claim_type,
            fulfills,
            confirmations,
            warnings,
        })
    }

    /// Log the envelope as rejected when the error calls for it, then fail.
    /// The stored reason is readable by anyone, so identifiers are masked.
    async fn reject<T>(&self, append: ClaimAppend, err: LinkageError) -> LinkageResult<T> {
        if err.is_rejection() {
            let reason = mask_identifiers(&err.to_string());
            let record = self.log.append(append.rejected(reason)).await?;
            warn!(sequence_id = %record.sequence_id, reason = %err, "claim rejected");
        }
        Err(err)
    }

    async fn prepare(
        &self,
        claim: &VerifiedClaim,
        claim_type: &ClaimType,
    ) -> LinkageResult<Submission> {
        let payload = &claim.payload;
        if !payload.is_object() {
            return Err(LinkageError::Validation(
                "claim payload must be a JSON object".to_string(),
            ));
        }
        if !is_identifier_shaped(&claim.issuer) {
            return Err(LinkageError::Validation(
                "issuer is not an identifier".to_string(),
            ));
        }

        let link_refs = parse::link_refs(claim_type, payload).map_err(LinkageError::Validation)?;
        let targets = if claim_type.is_confirmation() {
            parse::confirmation_targets(payload).map_err(LinkageError::Validation)?
        } else {
            Vec::new()
        };
        let registrant = if *claim_type == ClaimType::RegisterAction {
            match parse::registrant(payload) {
                Some(registrant) if is_identifier_shaped(registrant) => {
                    Some(registrant.to_string())
                }
                _ => {
                    return Err(LinkageError::Validation(
                        "a registration needs participant.identifier".to_string(),
                    ))
                }
            }
        } else {
            None
        };

        self.check_duplicate(claim).await?;
        let binding = self.resolve_binding(claim, claim_type).await?;

        let mut warnings = Vec::new();
        let links = self.resolve_links(link_refs, &mut warnings).await?;
        let confirmations = self.resolve_targets(targets, &mut warnings).await?;

        Ok(Submission {
            binding,
            links,
            confirmations,
            registrant,
            warnings,
        })
    }

    /// Same payload, issuer, subject and issue time. Resubmitting the same
    /// content later is a new claim.
    async fn check_duplicate(&self, claim: &VerifiedClaim) -> LinkageResult<()> {
        let hash = content_hash(&claim.payload);
        let existing = self.log.by_content_hash(&hash).await?;
        // microseconds: the precision every backend keeps
        let issued = claim.issued_at.timestamp_micros();
        match existing.iter().find(|record| {
            record.issuer == claim.issuer
                && record.subject == claim.subject
                && record.issued_at.timestamp_micros() == issued
        }) {
            Some(record) => Err(ConflictKind::Duplicate(record.sequence_id).into()),
            None => Ok(()),
        }
    }

    async fn resolve_binding(
        &self,
        claim: &VerifiedClaim,
        claim_type: &ClaimType,
    ) -> LinkageResult<HandleBinding> {
        if !claim_type.is_versioned() {
            return Ok(HandleBinding::Unbound);
        }
        let payload = &claim.payload;
        let declared = match payload.get("identifier") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(text)) => Some(text.as_str()),
            Some(_) => {
                return Err(LinkageError::Validation(
                    "identifier must be a string".to_string(),
                ))
            }
        };

        let handle = match declared {
            Some(text) => HandleId::parse_submitted(text)?,
            None => match parse::edit_reference(payload).map_err(LinkageError::Validation)? {
                Some(last) => self
                    .log
                    .by_id(last)
                    .await?
                    .filter(ClaimRecord::is_applied)
                    .and_then(|record| record.handle_id)
                    .ok_or_else(|| {
                        LinkageError::Validation(format!("claim {last} has no handle to edit"))
                    })?,
                None => {
                    debug!(issuer = %claim.issuer, kind = claim_type.handle_kind(), "allocating handle");
                    return Ok(HandleBinding::Allocate {
                        namespace: self.namespace.clone(),
                        owner: claim.issuer.clone(),
                    });
                }
            },
        };

        // A person profile keyed by a DID can only be authored by that DID.
        let owner = match declared {
            Some(text) if *claim_type == ClaimType::Person && is_identifier_shaped(text) => {
                text.to_string()
            }
            _ => claim.issuer.clone(),
        };
        if owner != claim.issuer {
            return Err(ConflictKind::ForeignIssuer {
                handle: handle.to_string(),
            }
            .into());
        }

        match self.log.handle_state(&handle).await? {
            Some(state) => {
                if state.kind != claim_type.handle_kind() {
                    return Err(LinkageError::Validation(format!(
                        "handle is a {}, not a {}",
                        state.kind,
                        claim_type.handle_kind()
                    )));
                }
                if state.owner != claim.issuer {
                    return Err(ConflictKind::ForeignIssuer {
                        handle: handle.to_string(),
                    }
                    .into());
                }
                debug!(%handle, current = %state.current, "superseding version");
                Ok(HandleBinding::Supersede {
                    handle,
                    expected_current: state.current,
                })
            }
            None if self.namespace.contains(&handle) => Err(LinkageError::Validation(
                "local handle was never issued".to_string(),
            )),
            None => Ok(HandleBinding::Fresh { handle, owner }),
        }
    }

    async fn resolve_links(
        &self,
        refs: Vec<LinkRef>,
        warnings: &mut Vec<UnresolvedLinkWarning>,
    ) -> LinkageResult<Vec<LinkDeclaration>> {
        let mut links = Vec::with_capacity(refs.len());
        for link in refs {
            let parent = match (&link.identifier, link.last_claim_id) {
                (Some(identifier), _) => Some(HandleId::parse_submitted(identifier)?),
                (None, Some(last)) => self
                    .log
                    .by_id(last)
                    .await?
                    .filter(ClaimRecord::is_applied)
                    .and_then(|record| record.handle_id),
                (None, None) => None,
            };
            let Some(parent_handle) = parent else {
                warnings.push(UnresolvedLinkWarning::fulfills(
                    link.describe(),
                    "no recorded entity matches",
                ));
                continue;
            };

            let state = self.log.handle_state(&parent_handle).await?;
            if state.is_none() {
                warnings.push(UnresolvedLinkWarning::fulfills(
                    parent_handle.as_str(),
                    "parent handle has no recorded version",
                ));
            }
            links.push(LinkDeclaration {
                kind: link.kind,
                parent_type: link
                    .parent_type
                    .or_else(|| state.as_ref().map(|s| s.kind.clone())),
                parent_handle,
                declared_last_claim: link.last_claim_id,
                resolved_current: state.map(|s| s.current),
            });
        }
        Ok(links)
    }

    async fn resolve_targets(
        &self,
        targets: Vec<TargetRef>,
        warnings: &mut Vec<UnresolvedLinkWarning>,
    ) -> LinkageResult<Vec<ConfirmationAppend>> {
        let mut confirmations = Vec::with_capacity(targets.len());
        for target in targets {
            match self.match_target(&target).await? {
                Some(record) => confirmations.push(ConfirmationAppend {
                    target_sequence: record.sequence_id,
                    counted: !record.claim_type.is_confirmation(),
                    target_handle: record.handle_id,
                }),
                None => warnings.push(UnresolvedLinkWarning::confirmation(
                    target.describe(),
                    "no recorded claim matches",
                )),
            }
        }
        Ok(confirmations)
    }

    /// Claim id first, then handle, then content. Content matches ignore the
    /// keys that only say where a claim is recorded (see `match_hash`). Any
    /// one match is enough.
    async fn match_target(&self, target: &TargetRef) -> LinkageResult<Option<ClaimRecord>> {
        if let Some(id) = target.last_claim_id {
            if let Some(record) = self.log.by_id(id).await?.filter(ClaimRecord::is_applied) {
                return Ok(Some(record));
            }
        }
        if let Some(reference) = &target.handle {
            if let Ok(handle) = self.namespace.expand(reference) {
                if let Some(record) = self.log.latest_by_handle(&handle).await? {
                    return Ok(Some(record));
                }
            }
        }
        let hash = match_hash(&target.content);
        Ok(self.log.by_match_hash(&hash).await?.pop())
    }
}

fn link_outcome(link: &LinkDeclaration) -> LinkOutcome {
    LinkOutcome {
        kind: link.kind,
        parent_handle_id: link.parent_handle.clone(),
        declared_last_claim_id: link.declared_last_claim,
        parent_current_sequence_id: link.resolved_current,
        link_confirmed: matches!(
            (link.declared_last_claim, link.resolved_current),
            (Some(declared), Some(current)) if declared == current
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use endorser_visibility::VisibilityError;
    use serde_json::json;

    const X: &str = "did:ethr:0x1111111111111111111111111111111111111111";
    const Y: &str = "did:ethr:0x2222222222222222222222222222222222222222";

    #[tokio::test]
    async fn unversioned_claims_get_no_handle() {
        let resolver = LinkageResolver::in_memory();
        let receipt = resolver
            .submit(VerifiedClaim::new(X, json!({"@type": "JoinAction", "event": {"name": "x"}})))
            .await
            .unwrap();
        assert!(receipt.handle_id.is_none());
        assert_eq!(receipt.claim_type, ClaimType::JoinAction);
    }

    #[tokio::test]
    async fn non_object_payloads_are_rejected_and_logged() {
        let resolver = LinkageResolver::in_memory();
        let err = resolver
            .submit(VerifiedClaim::new(X, json!(["not", "a", "claim"])))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkageError::Validation(_)));
        let logged = resolver
            .log()
            .range(endorser_types::SequenceId::FIRST, None)
            .await
            .unwrap();
        assert_eq!(logged.len(), 1);
        assert!(!logged[0].is_applied());
    }

    #[tokio::test]
    async fn internal_ids_are_not_handles() {
        let resolver = LinkageResolver::in_memory();
        let err = resolver
            .submit(VerifiedClaim::new(X, json!({"@type": "PlanAction", "identifier": "12"})))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkageError::Validation(_)));

        let err = resolver
            .submit(VerifiedClaim::new(
                X,
                json!({"@type": "PlanAction", "identifier": "https://endorser.ch/entity/claim-99"}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkageError::Validation(_)));
    }

    #[tokio::test]
    async fn external_handles_are_claimed_fresh() {
        let resolver = LinkageResolver::in_memory();
        let handle = "https://example.org/plans/garden";
        let receipt = resolver
            .submit(VerifiedClaim::new(X, json!({"@type": "PlanAction", "identifier": handle})))
            .await
            .unwrap();
        assert_eq!(receipt.handle_id.unwrap().as_str(), handle);

        let err = resolver
            .submit(VerifiedClaim::new(
                Y,
                json!({"@type": "PlanAction", "identifier": handle, "name": "mine"}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LinkageError::Conflict(ConflictKind::ForeignIssuer { .. })
        ));
    }

    #[tokio::test]
    async fn edits_must_keep_the_handle_kind() {
        let resolver = LinkageResolver::in_memory();
        let plan = resolver
            .submit(VerifiedClaim::new(X, json!({"@type": "PlanAction", "name": "p"})))
            .await
            .unwrap();
        let handle = plan.handle_id.unwrap();

        let project = resolver
            .submit(VerifiedClaim::new(
                X,
                json!({"@type": "Project", "identifier": handle.as_str(), "name": "p2"}),
            ))
            .await
            .unwrap();
        assert_eq!(project.handle_id.as_ref(), Some(&handle));

        let err = resolver
            .submit(VerifiedClaim::new(
                X,
                json!({"@type": "Offer", "identifier": handle.as_str()}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkageError::Validation(_)));
    }

    #[tokio::test]
    async fn edits_can_name_the_previous_claim() {
        let resolver = LinkageResolver::in_memory();
        let offer = resolver
            .submit(VerifiedClaim::new(X, json!({"@type": "Offer", "name": "v1"})))
            .await
            .unwrap();
        let edit = resolver
            .submit(VerifiedClaim::new(
                X,
                json!({"@type": "Offer", "lastClaimId": offer.sequence_id.to_string(), "name": "v2"}),
            ))
            .await
            .unwrap();
        assert_eq!(edit.handle_id, offer.handle_id);
    }

    #[tokio::test]
    async fn person_profiles_belong_to_their_did() {
        let resolver = LinkageResolver::in_memory();
        let own = resolver
            .submit(VerifiedClaim::new(X, json!({"@type": "Person", "identifier": X, "name": "x"})))
            .await
            .unwrap();
        assert_eq!(own.handle_id.unwrap().as_str(), X);

        let err = resolver
            .submit(VerifiedClaim::new(Y, json!({"@type": "Person", "identifier": X, "name": "y"})))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkageError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicates_conflict() {
        let resolver = LinkageResolver::in_memory();
        let payload = json!({"@type": "JoinAction", "event": {"name": "meetup"}});
        let claim = VerifiedClaim::new(X, payload.clone());
        let first = resolver.submit(claim.clone()).await.unwrap();
        let err = resolver.submit(claim.clone()).await.unwrap_err();
        match err {
            LinkageError::Conflict(ConflictKind::Duplicate(id)) => {
                assert_eq!(id, first.sequence_id)
            }
            other => panic!("unexpected {other:?}"),
        }
        // the same content from another issuer is its own claim
        let mut other = claim.clone();
        other.issuer = Y.to_string();
        resolver.submit(other).await.unwrap();

        // and so is the same content about another subject
        resolver.submit(claim.with_subject(Y)).await.unwrap();
    }

    #[tokio::test]
    async fn repeating_a_claim_later_is_not_a_duplicate() {
        let resolver = LinkageResolver::in_memory();
        let payload = json!({
            "@type": "GiveAction",
            "recipient": {"identifier": Y},
            "object": {"amountOfThisGood": 1, "unitCode": "HUR"}
        });
        let mut last_week = VerifiedClaim::new(X, payload.clone());
        last_week.issued_at = chrono::Utc::now() - chrono::Duration::days(7);
        let first = resolver.submit(last_week).await.unwrap();
        let second = resolver.submit(VerifiedClaim::new(X, payload)).await.unwrap();
        assert!(second.sequence_id > first.sequence_id);

        let applied = resolver
            .log()
            .by_content_hash(&content_hash(&json!({
                "@type": "GiveAction",
                "recipient": {"identifier": Y},
                "object": {"amountOfThisGood": 1, "unitCode": "HUR"}
            })))
            .await
            .unwrap();
        assert_eq!(applied.len(), 2);
    }

    #[tokio::test]
    async fn rejection_reasons_name_no_identifiers() {
        let resolver = LinkageResolver::in_memory();
        resolver
            .submit(VerifiedClaim::new(Y, json!({"@type": "Person", "identifier": X})))
            .await
            .unwrap_err();
        resolver
            .submit(VerifiedClaim::new(X, json!({"@type": "Person", "identifier": X})))
            .await
            .unwrap();
        resolver
            .submit(VerifiedClaim::new(
                X,
                json!({"@type": "PlanAction", "identifier": X, "name": "mine"}),
            ))
            .await
            .unwrap_err();

        let mut audit = endorser_store::ClaimFilter::new();
        audit.include_rejected = true;
        let rejected = resolver
            .log()
            .query(&audit)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| !r.is_applied())
            .collect::<Vec<_>>();
        assert_eq!(rejected.len(), 2);
        for record in rejected {
            let endorser_store::Disposition::Rejected { reason } = &record.disposition else {
                panic!("expected a rejection");
            };
            assert!(!reason.contains(X), "{reason}");
            assert!(!reason.is_empty());
        }
    }

    #[tokio::test]
    async fn unresolved_links_warn_but_record() {
        let resolver = LinkageResolver::in_memory();
        let receipt = resolver
            .submit(VerifiedClaim::new(
                X,
                json!({
                    "@type": "GiveAction",
                    "fulfills": [
                        {"@type": "Offer", "identifier": "https://example.org/offers/none"},
                        {"@type": "Offer", "lastClaimId": 404}
                    ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(receipt.warnings.len(), 2);
        assert_eq!(receipt.fulfills.len(), 1);
        assert!(!receipt.fulfills[0].link_confirmed);
        assert!(receipt.has_warnings());
    }

    #[tokio::test]
    async fn registration_bootstraps_visibility() {
        let resolver = LinkageResolver::in_memory();
        resolver
            .submit(VerifiedClaim::new(
                X,
                json!({"@type": "RegisterAction", "participant": {"identifier": Y}}),
            ))
            .await
            .unwrap();
        assert!(resolver.visibility().can_see(X, Y).await.unwrap());
        assert!(resolver.visibility().can_see(Y, X).await.unwrap());

        let err = resolver
            .submit(VerifiedClaim::new(X, json!({"@type": "RegisterAction"})))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkageError::Validation(_)));
    }

    /// Visibility backend that is down.
    struct UnavailableVisibility;

    #[async_trait::async_trait]
    impl endorser_visibility::VisibilityStore for UnavailableVisibility {
        async fn edges_from(
            &self,
            _granter: &str,
        ) -> endorser_visibility::VisibilityResult<std::collections::BTreeSet<String>> {
            Err(VisibilityError::Backend("unavailable".to_string()))
        }

        async fn edges_to(
            &self,
            _grantee: &str,
        ) -> endorser_visibility::VisibilityResult<std::collections::BTreeSet<String>> {
            Err(VisibilityError::Backend("unavailable".to_string()))
        }

        async fn add_edge(
            &self,
            _granter: &str,
            _grantee: &str,
        ) -> endorser_visibility::VisibilityResult<bool> {
            Err(VisibilityError::Backend("unavailable".to_string()))
        }

        async fn remove_edge(
            &self,
            _granter: &str,
            _grantee: &str,
        ) -> endorser_visibility::VisibilityResult<bool> {
            Err(VisibilityError::Backend("unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn recorded_registration_survives_a_visibility_outage() {
        let resolver = LinkageResolver::new(
            Arc::new(InMemoryClaimLog::new()),
            VisibilityGraph::with_store(Arc::new(UnavailableVisibility)),
            HandleNamespace::default(),
        );
        let receipt = resolver
            .submit(VerifiedClaim::new(
                X,
                json!({"@type": "RegisterAction", "participant": {"identifier": Y}}),
            ))
            .await
            .unwrap();
        assert_eq!(receipt.warnings.len(), 1);
        assert_eq!(
            receipt.warnings[0].link,
            crate::receipt::UnresolvedLink::Registration
        );
        let record = resolver.log().by_id(receipt.sequence_id).await.unwrap().unwrap();
        assert!(record.is_applied());
    }
}
