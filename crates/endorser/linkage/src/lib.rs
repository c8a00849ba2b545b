//! Endorser linkage resolver.
//!
//! Turns verified claims into log entries and log entries into linked views:
//! - handle versioning: allocate, claim an external handle, or supersede the
//!   current version (only by the handle's original issuer)
//! - `fulfills` and `isPartOf` links, stored with the parent version the
//!   child saw and re-checked against the parent's current version on read
//! - confirmation targets matched by claim id, handle or content (top-level
//!   `@context`, `identifier` and `lastClaimId` aside);
//!   confirmations of confirmations are kept but never counted
//! - plan, offer and give views, listings and unit-keyed totals; a plan's
//!   link to its parent plan also counts as confirmed once the parent's
//!   issuer confirms the child
//!
//! Failures that stop a claim from applying (`Validation`, `Conflict`) still
//! log the envelope as rejected. References that cannot be matched are
//! reported as warnings on the receipt.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
mod parse;
mod receipt;
mod report;
mod resolver;
mod totals;
mod views;

pub use error::{ConflictKind, LinkageError, LinkageResult};
pub use receipt::{
    ConfirmationOutcome, LinkOutcome, SubmitReceipt, UnresolvedLink, UnresolvedLinkWarning,
};
pub use resolver::LinkageResolver;
pub use totals::{TotalsRequest, UnitTotals};
pub use views::{
    ConfirmationView, FulfillerView, GiveView, OfferView, PlanLinkView, PlanView, ProviderRef,
};
