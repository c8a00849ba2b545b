//! Linked views and listings over the log.
//!
//! Everything here is read-only. Link confirmation and give confirmation are
//! recomputed on every read from the current handle index, so an edit to a
//! parent is reflected without touching its children.

use crate::error::{LinkageError, LinkageResult};
use crate::parse;
use crate::resolver::LinkageResolver;
use crate::views::{
    ConfirmationView, FulfillerView, GiveView, OfferView, PlanLinkView, PlanView, ProviderRef,
    ResolvedLink,
};
use endorser_store::{ClaimFilter, ClaimRecord, FulfillmentRecord, LinkKind, QueryWindow};
use endorser_types::{payload_str, ClaimType, HandleId, SequenceId};
use std::collections::BTreeSet;

impl LinkageResolver {
    /// Current version of a handle named by lookup text.
    pub async fn current_version(&self, reference: &str) -> LinkageResult<ClaimRecord> {
        let handle = self.resolve_reference(reference)?;
        self.log
            .latest_by_handle(&handle)
            .await?
            .ok_or_else(|| LinkageError::NotFound(format!("no entity with handle {handle}")))
    }

    pub async fn plans(
        &self,
        handle: Option<&str>,
        window: QueryWindow,
    ) -> LinkageResult<Vec<PlanView>> {
        let filter = self
            .listing(handle, window)?
            .of_type(ClaimType::PlanAction)
            .of_type(ClaimType::Project);
        let mut views = Vec::new();
        for record in self.log.query(&filter).await? {
            views.extend(self.plan_view(record).await?);
        }
        Ok(views)
    }

    /// Current plans issued by `issuer`, newest first. `before` pages by
    /// the plans' current sequence ids.
    pub async fn plans_by_issuer(
        &self,
        issuer: &str,
        before: Option<SequenceId>,
        window: QueryWindow,
    ) -> LinkageResult<Vec<PlanView>> {
        let mut filter = self
            .listing(None, window)?
            .of_type(ClaimType::PlanAction)
            .of_type(ClaimType::Project)
            .issued_by(issuer);
        filter.before = before;
        let mut views = Vec::new();
        for record in self.log.query(&filter).await? {
            views.extend(self.plan_view(record).await?);
        }
        Ok(views)
    }

    pub async fn offers(
        &self,
        handle: Option<&str>,
        window: QueryWindow,
    ) -> LinkageResult<Vec<OfferView>> {
        let filter = self.listing(handle, window)?.of_type(ClaimType::Offer);
        let mut views = Vec::new();
        for record in self.log.query(&filter).await? {
            views.extend(self.offer_view(record).await?);
        }
        Ok(views)
    }

    pub async fn gives(
        &self,
        handle: Option<&str>,
        window: QueryWindow,
    ) -> LinkageResult<Vec<GiveView>> {
        let filter = self.listing(handle, window)?.of_type(ClaimType::GiveAction);
        let mut views = Vec::new();
        for record in self.log.query(&filter).await? {
            views.extend(self.give_view(record).await?);
        }
        Ok(views)
    }

    /// Offers whose `itemOffered.isPartOf` names the plan, newest first.
    pub async fn offers_to_plan(&self, plan: &str) -> LinkageResult<Vec<OfferView>> {
        let handle = self.resolve_reference(plan)?;
        let children = self
            .children(&handle, |link| {
                link.kind == LinkKind::PartOf && link.child_type == ClaimType::Offer
            })
            .await?;
        let mut views = Vec::new();
        for (_, record) in children {
            views.extend(self.offer_view(record).await?);
        }
        Ok(views)
    }

    /// Gives linked straight to the plan, trades included, newest first.
    pub async fn gives_to_plan(&self, plan: &str) -> LinkageResult<Vec<GiveView>> {
        self.gives_to_plans(&[plan]).await
    }

    /// Gives linked straight to any of the plans, each give once, newest
    /// first.
    pub async fn gives_to_plans(&self, plans: &[&str]) -> LinkageResult<Vec<GiveView>> {
        let mut seen = BTreeSet::new();
        let mut records = Vec::new();
        for plan in plans {
            let handle = self.resolve_reference(plan)?;
            let children = self
                .children(&handle, |link| {
                    link.kind != LinkKind::PartOf && link.child_type == ClaimType::GiveAction
                })
                .await?;
            for (_, record) in children {
                if seen.insert(record.sequence_id) {
                    records.push(record);
                }
            }
        }
        records.sort_by(|a, b| b.sequence_id.cmp(&a.sequence_id));

        let mut views = Vec::new();
        for record in records {
            views.extend(self.give_view(record).await?);
        }
        Ok(views)
    }

    /// The plan this plan declares it fulfills, if any.
    pub async fn plan_fulfilled_by_plan(&self, plan: &str) -> LinkageResult<Option<PlanLinkView>> {
        let record = self.current_version(plan).await?;
        let links = self.resolved_links(record.sequence_id).await?;
        let Some(parent) = links
            .iter()
            .find(|l| l.link.kind == LinkKind::Fulfills && l.points_at_plan())
        else {
            return Ok(None);
        };
        let confirmed = self.plan_link_confirmed(record.sequence_id, parent).await?;
        let Some(parent_record) = self.log.latest_by_handle(&parent.link.parent_handle).await?
        else {
            return Ok(None);
        };
        Ok(self
            .plan_view(parent_record)
            .await?
            .map(|plan| PlanLinkView {
                plan,
                child_fulfills_link_confirmed: confirmed,
            }))
    }

    /// Plans that declare they fulfill this plan, newest first.
    pub async fn plan_fulfillers_to_plan(&self, plan: &str) -> LinkageResult<Vec<PlanView>> {
        let handle = self.resolve_reference(plan)?;
        let children = self
            .children(&handle, |link| {
                link.kind == LinkKind::Fulfills && link.child_type.is_plan_like()
            })
            .await?;
        let mut views = Vec::new();
        for (_, record) in children {
            views.extend(self.plan_view(record).await?);
        }
        Ok(views)
    }

    pub async fn give_fulfillers_to_offer(&self, offer: &str) -> LinkageResult<Vec<FulfillerView>> {
        self.give_fulfillers(offer).await
    }

    pub async fn give_fulfillers_to_give(&self, give: &str) -> LinkageResult<Vec<FulfillerView>> {
        self.give_fulfillers(give).await
    }

    /// `provider` entries of the give's current version.
    pub async fn providers_to_give(&self, give: &str) -> LinkageResult<Vec<ProviderRef>> {
        let record = self.current_version(give).await?;
        Ok(parse::providers(&record.payload)
            .into_iter()
            .map(|(identifier, provider_type)| ProviderRef {
                identifier,
                provider_type,
            })
            .collect())
    }

    /// Current gives listing `provider` among their providers, newest first.
    pub async fn gives_provided_by(
        &self,
        provider: &str,
        window: QueryWindow,
    ) -> LinkageResult<Vec<GiveView>> {
        let needle = self
            .namespace
            .expand(provider)
            .map(|handle| handle.to_string())
            .unwrap_or_else(|_| provider.to_string());
        let filter = ClaimFilter::new()
            .of_type(ClaimType::GiveAction)
            .current()
            .newest_first()
            .containing(needle.clone());

        let matching = self
            .log
            .query(&filter)
            .await?
            .into_iter()
            .filter(|record| {
                parse::providers(&record.payload)
                    .iter()
                    .any(|(identifier, _)| *identifier == needle)
            })
            .skip(window.offset)
            .take(if window.limit == 0 { usize::MAX } else { window.limit })
            .collect::<Vec<_>>();

        let mut views = Vec::new();
        for record in matching {
            views.extend(self.give_view(record).await?);
        }
        Ok(views)
    }

    /// Every confirmation recorded against one claim, oldest first.
    pub async fn confirmations_of(&self, target: SequenceId) -> LinkageResult<Vec<ConfirmationView>> {
        let mut views = Vec::new();
        for confirmation in self.log.confirmations_of(target).await? {
            let issued_at = self
                .log
                .by_id(confirmation.confirmation_sequence)
                .await?
                .map(|record| record.issued_at);
            views.push(ConfirmationView {
                confirmation_sequence_id: confirmation.confirmation_sequence,
                confirmer: confirmation.confirmer,
                target_sequence_id: confirmation.target_sequence,
                target_handle_id: confirmation.target_handle,
                counted: confirmation.counted,
                issued_at,
            });
        }
        Ok(views)
    }

    fn listing(&self, handle: Option<&str>, window: QueryWindow) -> LinkageResult<ClaimFilter> {
        let mut filter = ClaimFilter::new().current().newest_first().window(window);
        if let Some(reference) = handle {
            filter = filter.for_handle(self.resolve_reference(reference)?);
        }
        Ok(filter)
    }

    async fn give_fulfillers(&self, parent: &str) -> LinkageResult<Vec<FulfillerView>> {
        let handle = self.resolve_reference(parent)?;
        let parent_current = self.log.handle_state(&handle).await?.map(|s| s.current);
        let children = self
            .children(&handle, |link| {
                link.kind == LinkKind::Fulfills && link.child_type == ClaimType::GiveAction
            })
            .await?;
        Ok(children
            .into_iter()
            .map(|(link, record)| FulfillerView {
                fulfills_link_confirmed: link.confirmed_against(parent_current),
                handle_id: record.handle_id,
                sequence_id: record.sequence_id,
                claim_type: record.claim_type,
                issuer: record.issuer,
                issued_at: record.issued_at,
                full_claim: record.payload,
            })
            .collect())
    }

    /// Current child versions linked to `parent`, one entry per child,
    /// newest first.
    pub(crate) async fn children<F>(
        &self,
        parent: &HandleId,
        accept: F,
    ) -> LinkageResult<Vec<(FulfillmentRecord, ClaimRecord)>>
    where
        F: Fn(&FulfillmentRecord) -> bool,
    {
        let mut seen = BTreeSet::new();
        let mut children = Vec::new();
        for link in self.log.fulfillments_to(parent).await? {
            if !accept(&link) || !seen.insert(link.child_sequence) {
                continue;
            }
            if let Some(record) = self.log.by_id(link.child_sequence).await? {
                children.push((link, record));
            }
        }
        children.sort_by(|a, b| b.1.sequence_id.cmp(&a.1.sequence_id));
        Ok(children)
    }

    pub(crate) async fn resolved_links(&self, child: SequenceId) -> LinkageResult<Vec<ResolvedLink>> {
        let mut resolved = Vec::new();
        for link in self.log.fulfillments_of(child).await? {
            let parent = self.log.handle_state(&link.parent_handle).await?;
            resolved.push(ResolvedLink { link, parent });
        }
        Ok(resolved)
    }

    /// The party whose confirmation makes a give count as received: the
    /// give's recipient, else its offer's recipient, else the issuer of the
    /// plan the give or its offer points at.
    pub(crate) async fn eligible_recipient(
        &self,
        give: &ClaimRecord,
    ) -> LinkageResult<Option<String>> {
        if let Some(recipient) = parse::party(&give.payload, "recipient") {
            return Ok(Some(recipient.to_string()));
        }
        for link in self.log.fulfillments_of(give.sequence_id).await? {
            let Some(parent) = self.log.latest_by_handle(&link.parent_handle).await? else {
                continue;
            };
            if parent.claim_type.is_plan_like() {
                return Ok(Some(parent.issuer));
            }
            if parent.claim_type == ClaimType::Offer {
                if let Some(recipient) = parse::party(&parent.payload, "recipient") {
                    return Ok(Some(recipient.to_string()));
                }
                if let Some(plan) = self.offer_plan(&parent).await? {
                    return Ok(Some(plan.issuer));
                }
            }
        }
        Ok(None)
    }

    pub(crate) async fn give_confirmed(&self, give: &ClaimRecord) -> LinkageResult<bool> {
        let Some(recipient) = self.eligible_recipient(give).await? else {
            return Ok(false);
        };
        if give.issuer == recipient {
            return Ok(true);
        }
        Ok(self
            .log
            .confirmations_of(give.sequence_id)
            .await?
            .iter()
            .any(|c| c.counted && c.confirmer == recipient))
    }

    /// A plan-to-plan link holds when the child saw the parent's current
    /// version, or when the parent's issuer has a counted confirmation of
    /// this child version.
    async fn plan_link_confirmed(
        &self,
        child: SequenceId,
        link: &ResolvedLink,
    ) -> LinkageResult<bool> {
        if link.confirmed() {
            return Ok(true);
        }
        let Some(parent) = &link.parent else {
            return Ok(false);
        };
        Ok(self
            .log
            .confirmations_of(child)
            .await?
            .iter()
            .any(|c| c.counted && c.confirmer == parent.owner))
    }

    /// Current version of the plan an offer is part of.
    async fn offer_plan(&self, offer: &ClaimRecord) -> LinkageResult<Option<ClaimRecord>> {
        for link in self.log.fulfillments_of(offer.sequence_id).await? {
            if link.kind != LinkKind::PartOf {
                continue;
            }
            if let Some(plan) = self.log.latest_by_handle(&link.parent_handle).await? {
                return Ok(Some(plan));
            }
        }
        Ok(None)
    }

    pub(crate) async fn plan_view(&self, record: ClaimRecord) -> LinkageResult<Option<PlanView>> {
        let Some(handle_id) = record.handle_id.clone() else {
            return Ok(None);
        };
        let links = self.resolved_links(record.sequence_id).await?;
        let parent = links
            .iter()
            .find(|l| l.link.kind == LinkKind::Fulfills && l.points_at_plan());
        let fulfills_link_confirmed = match parent {
            Some(link) => self.plan_link_confirmed(record.sequence_id, link).await?,
            None => false,
        };
        Ok(Some(PlanView {
            handle_id,
            current_sequence_id: record.sequence_id,
            agent_did: parse::party(&record.payload, "agent").map(str::to_string),
            name: payload_str(&record.payload, &["name"]).map(str::to_string),
            description: payload_str(&record.payload, &["description"]).map(str::to_string),
            fulfills_plan_handle_id: parent.map(|l| l.link.parent_handle.clone()),
            fulfills_plan_last_claim_id: parent.and_then(|l| l.link.declared_last_claim),
            fulfills_link_confirmed,
            claim_type: record.claim_type,
            issuer: record.issuer,
            issued_at: record.issued_at,
        }))
    }

    pub(crate) async fn offer_view(&self, record: ClaimRecord) -> LinkageResult<Option<OfferView>> {
        let Some(handle_id) = record.handle_id.clone() else {
            return Ok(None);
        };
        let links = self.resolved_links(record.sequence_id).await?;
        let plan = links.iter().find(|l| l.link.kind == LinkKind::PartOf);
        let offered = parse::quantity(&record.payload, "includesObject");

        let gives = self
            .children(&handle_id, |link| {
                link.kind == LinkKind::Fulfills && link.child_type == ClaimType::GiveAction
            })
            .await?;
        let mut amount_given = 0.0;
        let mut amount_given_confirmed = 0.0;
        let mut non_amount_given_confirmed = 0;
        for (_, give) in gives {
            let given = parse::quantity(&give.payload, "object");
            let confirmed = self.give_confirmed(&give).await?;
            let in_unit = match (&offered.unit, &given.unit) {
                (None, _) => true,
                (Some(offer_unit), Some(give_unit)) => offer_unit == give_unit,
                (Some(_), None) => false,
            };
            match given.amount {
                Some(amount) if in_unit => {
                    amount_given += amount;
                    if confirmed {
                        amount_given_confirmed += amount;
                    }
                }
                None if confirmed => non_amount_given_confirmed += 1,
                _ => {}
            }
        }

        Ok(Some(OfferView {
            handle_id,
            current_sequence_id: record.sequence_id,
            offered_by_did: parse::party(&record.payload, "offeredBy")
                .map(str::to_string)
                .or_else(|| Some(record.issuer.clone())),
            recipient_did: parse::party(&record.payload, "recipient").map(str::to_string),
            recipient_plan_id: plan.map(|l| l.link.parent_handle.clone()),
            fulfills_plan_last_claim_id: plan.and_then(|l| l.link.declared_last_claim),
            fulfills_link_confirmed: plan.is_some_and(ResolvedLink::confirmed),
            name: payload_str(&record.payload, &["name"]).map(str::to_string),
            description: payload_str(&record.payload, &["description"])
                .or_else(|| payload_str(&record.payload, &["itemOffered", "description"]))
                .map(str::to_string),
            unit: offered.unit,
            amount: offered.amount,
            amount_given,
            amount_given_confirmed,
            non_amount_given_confirmed,
            valid_through: payload_str(&record.payload, &["validThrough"]).map(str::to_string),
            issuer: record.issuer,
            issued_at: record.issued_at,
        }))
    }

    pub(crate) async fn give_view(&self, record: ClaimRecord) -> LinkageResult<Option<GiveView>> {
        let Some(handle_id) = record.handle_id.clone() else {
            return Ok(None);
        };
        let links = self.resolved_links(record.sequence_id).await?;
        let plan_link = links.iter().find(|l| l.points_at_plan());
        let primary = links
            .iter()
            .find(|l| l.link.kind == LinkKind::Fulfills && !l.points_at_plan())
            .or(plan_link);

        // A give to an offer inherits the offer's plan.
        let (fulfills_plan_handle_id, fulfills_plan_last_claim_id) = match plan_link {
            Some(link) => (
                Some(link.link.parent_handle.clone()),
                link.link.declared_last_claim,
            ),
            None => match primary.filter(|l| l.parent_kind().as_deref() == Some("Offer")) {
                Some(offer_link) => {
                    match self.log.latest_by_handle(&offer_link.link.parent_handle).await? {
                        Some(offer) => match self.offer_plan(&offer).await? {
                            Some(plan) => (plan.handle_id, Some(plan.sequence_id)),
                            None => (None, None),
                        },
                        None => (None, None),
                    }
                }
                None => (None, None),
            },
        };

        let given = parse::quantity(&record.payload, "object");
        let confirmed = self.give_confirmed(&record).await?;
        Ok(Some(GiveView {
            handle_id,
            current_sequence_id: record.sequence_id,
            agent_did: parse::party(&record.payload, "agent").map(str::to_string),
            recipient_did: parse::party(&record.payload, "recipient").map(str::to_string),
            description: payload_str(&record.payload, &["description"]).map(str::to_string),
            amount_confirmed: if confirmed {
                given.amount.unwrap_or(0.0)
            } else {
                0.0
            },
            unit: given.unit,
            amount: given.amount,
            fulfills_handle_id: primary.map(|l| l.link.parent_handle.clone()),
            fulfills_type: primary.and_then(|l| match l.link.kind {
                LinkKind::Trade => Some("TradeAction".to_string()),
                _ => l.parent_kind(),
            }),
            fulfills_last_claim_id: primary.and_then(|l| l.link.declared_last_claim),
            fulfills_link_confirmed: primary.is_some_and(ResolvedLink::confirmed),
            fulfills_plan_handle_id,
            fulfills_plan_last_claim_id,
            issuer: record.issuer,
            issued_at: record.issued_at,
        }))
    }
}
