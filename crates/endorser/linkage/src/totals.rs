//! Unit-keyed totals over offers and gives.

use crate::error::{LinkageError, LinkageResult};
use crate::parse::{self, Quantity};
use crate::resolver::LinkageResolver;
use endorser_store::{ClaimFilter, ClaimRecord, LinkKind};
use endorser_types::{ClaimType, HandleId};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// Amount per unit code.
pub type UnitTotals = BTreeMap<String, f64>;

/// Parameters of a totals query. Exactly one of `plan_id` and
/// `recipient_id` must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsRequest {
    pub plan_id: Option<String>,
    pub recipient_id: Option<String>,
    /// Only report this unit.
    pub unit: Option<String>,
    #[serde(default)]
    pub include_trades: bool,
    /// Gives only: count only gives the recipient has confirmed.
    #[serde(default)]
    pub confirmed_only: bool,
}

impl TotalsRequest {
    pub fn for_plan(plan: impl Into<String>) -> Self {
        Self {
            plan_id: Some(plan.into()),
            ..Self::default()
        }
    }

    pub fn for_recipient(recipient: impl Into<String>) -> Self {
        Self {
            recipient_id: Some(recipient.into()),
            ..Self::default()
        }
    }

    pub fn with_trades(mut self) -> Self {
        self.include_trades = true;
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.confirmed_only = true;
        self
    }

    pub fn in_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

enum Scope {
    Plan(HandleId),
    Recipient(String),
}

impl LinkageResolver {
    /// Offered amounts per unit, for offers that are part of a plan or
    /// addressed to the requester.
    pub async fn offer_totals(
        &self,
        requester: Option<&str>,
        request: &TotalsRequest,
    ) -> LinkageResult<UnitTotals> {
        let offers = match self.totals_scope(requester, request)? {
            Scope::Plan(plan) => self
                .children(&plan, |link| {
                    link.kind == LinkKind::PartOf && link.child_type == ClaimType::Offer
                })
                .await?
                .into_iter()
                .map(|(_, record)| record)
                .collect(),
            Scope::Recipient(recipient) => {
                self.current_addressed_to(ClaimType::Offer, &recipient)
                    .await?
            }
        };

        let mut totals = UnitTotals::new();
        for offer in &offers {
            add(
                &mut totals,
                parse::quantity(&offer.payload, "includesObject"),
                request.unit.as_deref(),
            );
        }
        Ok(totals)
    }

    /// Given amounts per unit. For a plan, each give reaching it directly or
    /// through one of its offers counts once; trades only on request.
    pub async fn give_totals(
        &self,
        requester: Option<&str>,
        request: &TotalsRequest,
    ) -> LinkageResult<UnitTotals> {
        let gives = match self.totals_scope(requester, request)? {
            Scope::Plan(plan) => self.gives_reaching(&plan, request.include_trades).await?,
            Scope::Recipient(recipient) => {
                self.current_addressed_to(ClaimType::GiveAction, &recipient)
                    .await?
            }
        };

        let mut totals = UnitTotals::new();
        for give in &gives {
            if request.confirmed_only && !self.give_confirmed(give).await? {
                continue;
            }
            add(
                &mut totals,
                parse::quantity(&give.payload, "object"),
                request.unit.as_deref(),
            );
        }
        Ok(totals)
    }

    fn totals_scope(&self, requester: Option<&str>, request: &TotalsRequest) -> LinkageResult<Scope> {
        match (&request.plan_id, &request.recipient_id) {
            (Some(_), Some(_)) => Err(LinkageError::Validation(
                "request totals for a plan or for a recipient, not both".to_string(),
            )),
            (None, None) => Err(LinkageError::Validation(
                "totals need a planId or a recipientId".to_string(),
            )),
            (Some(plan), None) => Ok(Scope::Plan(self.resolve_reference(plan)?)),
            (None, Some(recipient)) if requester == Some(recipient.as_str()) => {
                Ok(Scope::Recipient(recipient.clone()))
            }
            (None, Some(_)) => Err(LinkageError::Validation(
                "recipient totals are only available to the recipient".to_string(),
            )),
        }
    }

    async fn gives_reaching(
        &self,
        plan: &HandleId,
        include_trades: bool,
    ) -> LinkageResult<Vec<ClaimRecord>> {
        let direct = self
            .children(plan, |link| {
                link.child_type == ClaimType::GiveAction && link.kind != LinkKind::PartOf
            })
            .await?;
        let trades = direct
            .iter()
            .filter(|(link, _)| link.kind == LinkKind::Trade)
            .map(|(_, give)| give.sequence_id)
            .collect::<BTreeSet<_>>();

        let mut seen = BTreeSet::new();
        let mut gives = Vec::new();
        for (_, give) in direct {
            if seen.insert(give.sequence_id) {
                gives.push(give);
            }
        }

        let offers = self
            .children(plan, |link| {
                link.kind == LinkKind::PartOf && link.child_type == ClaimType::Offer
            })
            .await?;
        for (_, offer) in offers {
            let Some(offer_handle) = offer.handle_id else {
                continue;
            };
            let via_offer = self
                .children(&offer_handle, |link| {
                    link.kind == LinkKind::Fulfills && link.child_type == ClaimType::GiveAction
                })
                .await?;
            for (_, give) in via_offer {
                if seen.insert(give.sequence_id) {
                    gives.push(give);
                }
            }
        }

        if !include_trades {
            gives.retain(|give| !trades.contains(&give.sequence_id));
        }
        Ok(gives)
    }

    async fn current_addressed_to(
        &self,
        claim_type: ClaimType,
        recipient: &str,
    ) -> LinkageResult<Vec<ClaimRecord>> {
        let filter = ClaimFilter::new()
            .of_type(claim_type)
            .current()
            .containing(recipient);
        Ok(self
            .log
            .query(&filter)
            .await?
            .into_iter()
            .filter(|record| parse::party(&record.payload, "recipient") == Some(recipient))
            .collect())
    }
}

/// Amounts without a unit code cannot be grouped and are left out.
fn add(totals: &mut UnitTotals, quantity: Quantity, only: Option<&str>) {
    let (Some(amount), Some(unit)) = (quantity.amount, quantity.unit) else {
        return;
    };
    if only.is_some_and(|only| only != unit) {
        return;
    }
    *totals.entry(unit).or_insert(0.0) += amount;
}
