//! Payload field extraction.
//!
//! Everything here is pure: it reads references out of a claim payload and
//! reports malformed ones as a message, leaving lookups to the resolver.

use endorser_store::LinkKind;
use endorser_types::{payload_str, ClaimType, SequenceId};
use serde_json::Value;

/// A parent reference declared by a claim before it is resolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LinkRef {
    pub kind: LinkKind,
    pub parent_type: Option<String>,
    pub identifier: Option<String>,
    pub last_claim_id: Option<SequenceId>,
}

impl LinkRef {
    /// Text used when reporting an unresolved reference.
    pub fn describe(&self) -> String {
        match (&self.identifier, self.last_claim_id) {
            (Some(identifier), _) => identifier.clone(),
            (None, Some(id)) => format!("lastClaimId {id}"),
            (None, None) => "(empty)".to_string(),
        }
    }
}

/// One entry of a confirmation's `object`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TargetRef {
    pub last_claim_id: Option<SequenceId>,
    pub handle: Option<String>,
    pub content: Value,
}

impl TargetRef {
    pub fn describe(&self) -> String {
        match (self.last_claim_id, &self.handle) {
            (Some(id), _) => format!("lastClaimId {id}"),
            (None, Some(handle)) => handle.clone(),
            (None, None) => "embedded claim".to_string(),
        }
    }
}

/// Amount and unit from a `TypeAndQuantityNode`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Quantity {
    pub amount: Option<f64>,
    pub unit: Option<String>,
}

/// Parent references a claim declares: `fulfills` on plans, projects and
/// gives, `itemOffered.isPartOf` on offers.
pub(crate) fn link_refs(claim_type: &ClaimType, payload: &Value) -> Result<Vec<LinkRef>, String> {
    match claim_type {
        ClaimType::Offer => match payload.get("itemOffered").and_then(|item| item.get("isPartOf")) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(part_of) => Ok(vec![entry_ref(LinkKind::PartOf, part_of, "itemOffered.isPartOf")?]),
        },
        t if t.is_plan_like() || *t == ClaimType::GiveAction => {
            one_or_many(payload.get("fulfills"))
                .into_iter()
                .map(fulfills_ref)
                .collect()
        }
        _ => Ok(Vec::new()),
    }
}

fn fulfills_ref(entry: &Value) -> Result<LinkRef, String> {
    if !entry.is_object() {
        return Err("each fulfills entry must be an object".to_string());
    }
    if payload_str(entry, &["@type"]) == Some("TradeAction") {
        let plan = entry
            .get("isPartOf")
            .ok_or_else(|| "a TradeAction fulfills entry needs isPartOf".to_string())?;
        return entry_ref(LinkKind::Trade, plan, "fulfills.isPartOf");
    }
    entry_ref(LinkKind::Fulfills, entry, "fulfills")
}

fn entry_ref(kind: LinkKind, entry: &Value, field: &str) -> Result<LinkRef, String> {
    if !entry.is_object() {
        return Err(format!("{field} must be an object"));
    }
    let identifier = match entry.get("identifier") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => return Err(format!("{field}.identifier must be a string")),
    };
    let last_claim_id = last_claim_id(entry, field)?;
    if identifier.is_none() && last_claim_id.is_none() {
        return Err(format!("{field} needs an identifier or a lastClaimId"));
    }
    Ok(LinkRef {
        kind,
        parent_type: payload_str(entry, &["@type"]).map(str::to_string),
        identifier,
        last_claim_id,
    })
}

fn last_claim_id(entry: &Value, field: &str) -> Result<Option<SequenceId>, String> {
    match entry.get("lastClaimId") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => SequenceId::from_reference(value)
            .map(Some)
            .ok_or_else(|| format!("{field}.lastClaimId is not a claim id: {value}")),
    }
}

/// Top-level `lastClaimId` of a claim, used to name the entity being edited.
pub(crate) fn edit_reference(payload: &Value) -> Result<Option<SequenceId>, String> {
    last_claim_id(payload, "claim")
}

/// Targets of a confirmation, from `object` (single or array).
pub(crate) fn confirmation_targets(payload: &Value) -> Result<Vec<TargetRef>, String> {
    let entries = one_or_many(payload.get("object"));
    if entries.is_empty() {
        return Err("a confirmation needs an object to confirm".to_string());
    }
    entries
        .into_iter()
        .map(|entry| {
            if !entry.is_object() {
                return Err("each confirmed object must be a claim object".to_string());
            }
            let last_claim_id = match entry.get("lastClaimId") {
                None | Some(Value::Null) => None,
                Some(value) => SequenceId::from_reference(value),
            };
            let handle = payload_str(entry, &["handleId"])
                .or_else(|| payload_str(entry, &["identifier"]))
                .map(str::to_string);
            Ok(TargetRef {
                last_claim_id,
                handle,
                content: entry.clone(),
            })
        })
        .collect()
}

/// `participant.identifier` of a registration.
pub(crate) fn registrant(payload: &Value) -> Option<&str> {
    payload_str(payload, &["participant", "identifier"])
}

/// `<field>.identifier`, e.g. the recipient or agent of a claim.
pub(crate) fn party<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload_str(payload, &[field, "identifier"])
}

pub(crate) fn quantity(payload: &Value, field: &str) -> Quantity {
    let node = payload.get(field);
    Quantity {
        amount: node
            .and_then(|n| n.get("amountOfThisGood"))
            .and_then(Value::as_f64),
        unit: node
            .and_then(|n| n.get("unitCode"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// `(identifier, @type)` of each `provider` entry.
pub(crate) fn providers(payload: &Value) -> Vec<(String, Option<String>)> {
    one_or_many(payload.get("provider"))
        .into_iter()
        .filter_map(|entry| {
            let identifier = payload_str(entry, &["identifier"])?;
            Some((
                identifier.to_string(),
                payload_str(entry, &["@type"]).map(str::to_string),
            ))
        })
        .collect()
}

fn one_or_many(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
    }
}
