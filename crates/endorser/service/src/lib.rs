//! Endorser service.
//!
//! Wires the claim log, visibility graph and linkage resolver together
//! behind [`ClaimService`], which verifies envelopes on the way in and
//! scrubs every read for its viewer on the way out.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
mod service;
pub mod telemetry;
pub mod verifier;

pub use config::{HandleConfig, LoggingConfig, QueryConfig, ServiceConfig, StorageConfig};
pub use error::{ErrorBody, ErrorDetail, ServiceError, ServiceResult};
pub use service::ClaimService;
pub use verifier::{EnvelopeVerifier, PreVerifiedEnvelopes, SignedEnvelope};
