//! Identifier redaction.
//!
//! `scrub` rewrites a JSON value for one viewer: every identifier the viewer
//! may not see becomes the hidden sentinel, everything else is left exactly as
//! it was. `all_identifiers_inside` lists identifiers found by the same walk.
//!
//! Both are pure functions of their inputs; the visibility snapshot is taken
//! by the caller.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod scrub;
mod walk;

pub use scrub::{all_identifiers_inside, scrub, scrub_with_report, Scrubbed};
pub use walk::Node;
