use chrono::{DateTime, Utc};
use endorser_types::{canonical_json, ClaimType, HandleId, HandleNamespace, SequenceId, VerifiedClaim};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// BLAKE3 of the canonical payload text. Identical payloads hash identically
/// regardless of key order.
pub fn content_hash(payload: &Value) -> String {
    blake3::hash(canonical_json(payload).as_bytes())
        .to_hex()
        .to_string()
}

/// Top-level keys that say where or how a claim is recorded rather than what
/// it asserts.
const ENVELOPE_KEYS: [&str; 3] = ["@context", "identifier", "lastClaimId"];

/// BLAKE3 of the canonical payload with `@context`, `identifier` and
/// `lastClaimId` removed from the top level. A confirmation that embeds a
/// claim without those keys still finds it.
pub fn match_hash(payload: &Value) -> String {
    match payload {
        Value::Object(map) => {
            let mut stripped = map.clone();
            for key in ENVELOPE_KEYS {
                stripped.remove(key);
            }
            content_hash(&Value::Object(stripped))
        }
        other => content_hash(other),
    }
}

/// Whether a logged claim took effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Disposition {
    Applied,
    /// Kept for audit only: moves no handle, creates no links or tallies.
    Rejected { reason: String },
}

impl Disposition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Disposition::Applied)
    }
}

/// How a claim attaches to a handle, applied atomically with the insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleBinding {
    /// Not a versioned entity.
    Unbound,
    /// Mint a local handle from the new claim's sequence id.
    Allocate {
        namespace: HandleNamespace,
        owner: String,
    },
    /// First claim for a caller-supplied handle. Fails if the handle exists.
    Fresh { handle: HandleId, owner: String },
    /// New version of an existing handle. Fails unless `expected_current` is
    /// still the current version.
    Supersede {
        handle: HandleId,
        expected_current: SequenceId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// `fulfills` on plans, projects and gives.
    Fulfills,
    /// A `TradeAction` fulfillment naming its plan through `isPartOf`.
    Trade,
    /// `itemOffered.isPartOf` on offers.
    PartOf,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Fulfills => "fulfills",
            LinkKind::Trade => "trade",
            LinkKind::PartOf => "partof",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "fulfills" => Some(LinkKind::Fulfills),
            "trade" => Some(LinkKind::Trade),
            "partof" => Some(LinkKind::PartOf),
            _ => None,
        }
    }
}

/// A link as declared by a submitted claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDeclaration {
    pub kind: LinkKind,
    pub parent_handle: HandleId,
    /// `@type` the child declared for its parent, if any.
    pub parent_type: Option<String>,
    /// The parent version the child says it saw (`lastClaimId`).
    pub declared_last_claim: Option<SequenceId>,
    /// The parent's current version when the child was recorded.
    pub resolved_current: Option<SequenceId>,
}

/// A stored link, owned by one claim version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentRecord {
    pub child_sequence: SequenceId,
    pub child_handle: Option<HandleId>,
    pub child_type: ClaimType,
    pub kind: LinkKind,
    pub parent_handle: HandleId,
    pub parent_type: Option<String>,
    pub declared_last_claim: Option<SequenceId>,
    pub resolved_current: Option<SequenceId>,
}

impl FulfillmentRecord {
    /// Confirmed iff the declared pointer equals the parent's current version
    /// now. Stale pointers stay stored and report false.
    pub fn confirmed_against(&self, parent_current: Option<SequenceId>) -> bool {
        matches!(
            (self.declared_last_claim, parent_current),
            (Some(declared), Some(current)) if declared == current
        )
    }
}

/// A confirmation target resolved by the linkage resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationAppend {
    pub target_sequence: SequenceId,
    pub target_handle: Option<HandleId>,
    /// False for confirmations of confirmations. The log also clears it when
    /// the same confirmer already has a counted confirmation of the target.
    pub counted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRecord {
    pub confirmation_sequence: SequenceId,
    pub confirmer: String,
    pub target_sequence: SequenceId,
    pub target_handle: Option<HandleId>,
    pub counted: bool,
}

/// Append payload. Sequence id, content hash and handle ids are assigned by
/// the log.
#[derive(Debug, Clone)]
pub struct ClaimAppend {
    pub issuer: String,
    pub subject: Option<String>,
    pub claim_type: ClaimType,
    pub payload: Value,
    pub issued_at: DateTime<Utc>,
    pub binding: HandleBinding,
    pub links: Vec<LinkDeclaration>,
    pub confirmations: Vec<ConfirmationAppend>,
    pub disposition: Disposition,
}

impl ClaimAppend {
    pub fn from_verified(claim: &VerifiedClaim) -> Self {
        Self {
            issuer: claim.issuer.clone(),
            subject: claim.subject.clone(),
            claim_type: claim.claim_type(),
            payload: claim.payload.clone(),
            issued_at: claim.issued_at,
            binding: HandleBinding::Unbound,
            links: Vec::new(),
            confirmations: Vec::new(),
            disposition: Disposition::Applied,
        }
    }

    pub fn with_binding(mut self, binding: HandleBinding) -> Self {
        self.binding = binding;
        self
    }

    pub fn with_links(mut self, links: Vec<LinkDeclaration>) -> Self {
        self.links = links;
        self
    }

    pub fn with_confirmations(mut self, confirmations: Vec<ConfirmationAppend>) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// Audit-only copy: drops any binding, links and confirmations.
    pub fn rejected(mut self, reason: impl Into<String>) -> Self {
        self.binding = HandleBinding::Unbound;
        self.links.clear();
        self.confirmations.clear();
        self.disposition = Disposition::Rejected {
            reason: reason.into(),
        };
        self
    }
}

/// One immutable row of the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    pub sequence_id: SequenceId,
    pub issuer: String,
    pub subject: Option<String>,
    pub claim_type: ClaimType,
    pub payload: Value,
    pub issued_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub handle_id: Option<HandleId>,
    pub content_hash: String,
    pub disposition: Disposition,
}

impl ClaimRecord {
    pub fn is_applied(&self) -> bool {
        self.disposition.is_applied()
    }
}

/// Row of the handle index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleState {
    pub handle_id: HandleId,
    /// The only issuer allowed to add versions.
    pub owner: String,
    /// `ClaimType::handle_kind` of the first version.
    pub kind: String,
    pub first: SequenceId,
    pub current: SequenceId,
}

/// Paged read window. A zero limit means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn first(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }
}

/// Fixed lookups over the log. Empty fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    pub claim_types: Vec<ClaimType>,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub issued_from: Option<DateTime<Utc>>,
    pub issued_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the canonical payload text.
    pub text: Option<String>,
    pub handle_id: Option<HandleId>,
    /// Only the current version of each handle (unversioned claims always pass).
    pub current_only: bool,
    pub include_rejected: bool,
    pub newest_first: bool,
    /// Exclusive sequence cursors.
    pub before: Option<SequenceId>,
    pub after: Option<SequenceId>,
    pub window: QueryWindow,
}

impl ClaimFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, claim_type: ClaimType) -> Self {
        self.claim_types.push(claim_type);
        self
    }

    pub fn issued_by(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn about(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn containing(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn for_handle(mut self, handle: HandleId) -> Self {
        self.handle_id = Some(handle);
        self
    }

    pub fn issued_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.issued_from = from;
        self.issued_to = to;
        self
    }

    pub fn current(mut self) -> Self {
        self.current_only = true;
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub fn window(mut self, window: QueryWindow) -> Self {
        self.window = window;
        self
    }

    /// Checks everything except `current_only` and the window, which need
    /// log-level context.
    pub fn matches(&self, record: &ClaimRecord) -> bool {
        if !self.include_rejected && !record.is_applied() {
            return false;
        }
        if !self.claim_types.is_empty() && !self.claim_types.contains(&record.claim_type) {
            return false;
        }
        if self.issuer.as_deref().is_some_and(|i| i != record.issuer) {
            return false;
        }
        if self
            .subject
            .as_deref()
            .is_some_and(|s| record.subject.as_deref() != Some(s))
        {
            return false;
        }
        if self.issued_from.is_some_and(|from| record.issued_at < from)
            || self.issued_to.is_some_and(|to| record.issued_at > to)
        {
            return false;
        }
        if self
            .handle_id
            .as_ref()
            .is_some_and(|h| record.handle_id.as_ref() != Some(h))
        {
            return false;
        }
        if self.before.is_some_and(|b| record.sequence_id >= b)
            || self.after.is_some_and(|a| record.sequence_id <= a)
        {
            return false;
        }
        if let Some(needle) = &self.text {
            let haystack = canonical_json(&record.payload).to_lowercase();
            if !haystack.contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}
