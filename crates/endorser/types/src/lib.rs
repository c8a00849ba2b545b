//! Endorser claim model.
//!
//! Shared vocabulary for every Endorser crate:
//! - `SequenceId` (log position) and `HandleId` (stable entity handle), kept
//!   apart on purpose with explicit conversions through `HandleNamespace`
//! - identifier shape and the hidden sentinel
//! - claim type classification and the verified claim envelope
//! - canonical payload text used for hashing and duplicate detection

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod canonical;
mod claim;
pub mod identifier;
mod ids;

pub use canonical::canonical_json;
pub use claim::{payload_str, ClaimType, VerifiedClaim};
pub use identifier::{
    hidden_key, is_hidden_sentinel, is_identifier_shaped, mask_identifiers, HIDDEN_SENTINEL,
};
pub use ids::{HandleError, HandleId, HandleNamespace, HandleResult, SequenceId};
