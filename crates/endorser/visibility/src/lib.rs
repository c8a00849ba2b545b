//! Identity visibility graph.
//!
//! Directed edges `granter -> grantee` mean "grantee may see granter's
//! identifier". Visibility is one hop: a viewer sees itself plus every
//! identifier with a direct edge to it. Registration adds bootstrap edges in
//! both directions; everything else is explicit grant and revoke.
//!
//! The edge set lives behind `VisibilityStore`. `VisibilityGraph` is the
//! service callers hold, and `VisibleSet` is the snapshot handed to redaction.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
mod graph;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{VisibilityError, VisibilityResult};
pub use graph::{VisibilityGraph, VisibleSet};
pub use memory::InMemoryVisibilityStore;
pub use traits::VisibilityStore;
