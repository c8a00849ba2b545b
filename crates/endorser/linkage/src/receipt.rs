use endorser_store::LinkKind;
use endorser_types::{ClaimType, HandleId, SequenceId};
use serde::Serialize;
use std::fmt;

/// Which secondary reference of a recorded claim could not be matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnresolvedLink {
    Fulfills,
    Confirmation,
    /// Visibility bootstrap of a registration that was recorded anyway.
    Registration,
}

/// A reference that did not resolve. The claim itself was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedLinkWarning {
    pub link: UnresolvedLink,
    pub reference: String,
    pub reason: String,
}

impl UnresolvedLinkWarning {
    pub(crate) fn fulfills(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            link: UnresolvedLink::Fulfills,
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn confirmation(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            link: UnresolvedLink::Confirmation,
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn registration(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            link: UnresolvedLink::Registration,
            reference: reference.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for UnresolvedLinkWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link = match self.link {
            UnresolvedLink::Fulfills => "fulfills",
            UnresolvedLink::Confirmation => "confirmation",
            UnresolvedLink::Registration => "registration",
        };
        write!(f, "{link} reference {} unresolved: {}", self.reference, self.reason)
    }
}

/// A link as recorded with the submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkOutcome {
    pub kind: LinkKind,
    pub parent_handle_id: HandleId,
    pub declared_last_claim_id: Option<SequenceId>,
    pub parent_current_sequence_id: Option<SequenceId>,
    /// Declared pointer equals the parent's current version at recording time.
    pub link_confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationOutcome {
    pub target_sequence_id: SequenceId,
    pub target_handle_id: Option<HandleId>,
    pub counted: bool,
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub sequence_id: SequenceId,
    pub handle_id: Option<HandleId>,
    pub claim_type: ClaimType,
    pub fulfills: Vec<LinkOutcome>,
    pub confirmations: Vec<ConfirmationOutcome>,
    pub warnings: Vec<UnresolvedLinkWarning>,
}

impl SubmitReceipt {
    /// The first declared link, if any.
    pub fn primary_link(&self) -> Option<&LinkOutcome> {
        self.fulfills.first()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
