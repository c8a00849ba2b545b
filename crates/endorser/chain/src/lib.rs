//! Tamper-evidence hash chain.
//!
//! For each claim in log order:
//! - `entry = canonical(payload)`, prefixed with the sequence id when the
//!   payload carries any identifier
//! - `link = sha256(entry)`
//! - `running = sha256(running + link)`
//!
//! An empty claim list yields the seed unchanged. Digests are lowercase hex.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod rolling;

pub use rolling::{chain, entry_input, sha256_hex, ChainEntry, ChainStep, HashChain};
