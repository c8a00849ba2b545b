//! Endorser claim log.
//!
//! The log is the system of record:
//! - every submission, applied or rejected, gets the next sequence id
//! - handle bindings (allocate, fresh, supersede) commit atomically with the
//!   claim, so two edits of one handle cannot both win
//! - an explicit handle index answers "current version" without scanning
//! - fulfillment links and confirmations are stored alongside their claim
//!
//! Design stance:
//! - the in-memory adapter is the reference implementation used in tests
//! - PostgreSQL (feature `postgres`) is the durable backend

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryClaimLog;
pub use model::{
    content_hash, match_hash, ClaimAppend, ClaimFilter, ClaimRecord, ConfirmationAppend,
    ConfirmationRecord, Disposition, FulfillmentRecord, HandleBinding, HandleState,
    LinkDeclaration, LinkKind, QueryWindow,
};
pub use traits::ClaimLog;
