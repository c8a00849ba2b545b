use chrono::{DateTime, Utc};
use endorser_store::{FulfillmentRecord, HandleState, LinkKind};
use endorser_types::{ClaimType, HandleId, SequenceId};
use serde::Serialize;
use serde_json::Value;

/// A stored link together with the parent's handle row as of now.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedLink {
    pub link: FulfillmentRecord,
    pub parent: Option<HandleState>,
}

impl ResolvedLink {
    pub fn parent_current(&self) -> Option<SequenceId> {
        self.parent.as_ref().map(|state| state.current)
    }

    pub fn confirmed(&self) -> bool {
        self.link.confirmed_against(self.parent_current())
    }

    /// Handle kind of the parent, falling back to the declared `@type`.
    pub fn parent_kind(&self) -> Option<String> {
        match (&self.parent, &self.link.parent_type) {
            (Some(state), _) => Some(state.kind.clone()),
            (None, Some(declared)) => Some(ClaimType::from_tag(declared).handle_kind().to_string()),
            (None, None) => None,
        }
    }

    pub fn points_at_plan(&self) -> bool {
        self.link.kind == LinkKind::Trade
            || self
                .parent_kind()
                .is_some_and(|kind| ClaimType::from_tag(&kind).is_plan_like())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanView {
    pub handle_id: HandleId,
    pub current_sequence_id: SequenceId,
    pub claim_type: ClaimType,
    pub issuer: String,
    pub agent_did: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub fulfills_plan_handle_id: Option<HandleId>,
    pub fulfills_plan_last_claim_id: Option<SequenceId>,
    /// Declared pointer is current, or the parent's issuer confirmed this
    /// version.
    pub fulfills_link_confirmed: bool,
}

/// The plan another plan fulfills, seen from the child.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLinkView {
    pub plan: PlanView,
    pub child_fulfills_link_confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferView {
    pub handle_id: HandleId,
    pub current_sequence_id: SequenceId,
    pub issuer: String,
    pub offered_by_did: Option<String>,
    pub recipient_did: Option<String>,
    pub recipient_plan_id: Option<HandleId>,
    pub fulfills_plan_last_claim_id: Option<SequenceId>,
    pub fulfills_link_confirmed: bool,
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub amount: Option<f64>,
    /// Sum over current gives fulfilling this offer, in the offer's unit.
    pub amount_given: f64,
    pub amount_given_confirmed: f64,
    /// Confirmed gives that carry no amount.
    pub non_amount_given_confirmed: usize,
    pub valid_through: Option<String>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GiveView {
    pub handle_id: HandleId,
    pub current_sequence_id: SequenceId,
    pub issuer: String,
    pub agent_did: Option<String>,
    pub recipient_did: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub amount: Option<f64>,
    /// The amount once the recipient has confirmed the give, else zero.
    pub amount_confirmed: f64,
    pub fulfills_handle_id: Option<HandleId>,
    pub fulfills_type: Option<String>,
    pub fulfills_last_claim_id: Option<SequenceId>,
    pub fulfills_link_confirmed: bool,
    pub fulfills_plan_handle_id: Option<HandleId>,
    pub fulfills_plan_last_claim_id: Option<SequenceId>,
    pub issued_at: DateTime<Utc>,
}

/// A child claim linked to a parent, with its full payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillerView {
    pub handle_id: Option<HandleId>,
    pub sequence_id: SequenceId,
    pub claim_type: ClaimType,
    pub issuer: String,
    pub issued_at: DateTime<Utc>,
    pub fulfills_link_confirmed: bool,
    pub full_claim: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderRef {
    pub identifier: String,
    #[serde(rename = "@type", skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationView {
    pub confirmation_sequence_id: SequenceId,
    pub confirmer: String,
    pub target_sequence_id: SequenceId,
    pub target_handle_id: Option<HandleId>,
    pub counted: bool,
    pub issued_at: Option<DateTime<Utc>>,
}
