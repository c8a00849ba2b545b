//! Log positions and entity handles.
//!
//! A `SequenceId` names one immutable claim in the log. A `HandleId` names a
//! mutable entity whose versions are claims. The two are never interchanged:
//! the only bridge is `HandleNamespace`, which mints local handles from the
//! sequence id of the claim that introduced the entity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Result type for handle parsing.
pub type HandleResult<T> = Result<T, HandleError>;

/// Errors raised when text cannot be used as a handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("handle must not be empty")]
    Empty,

    #[error("'{0}' is an internal claim id, not a handle")]
    InternalSequenceId(String),

    #[error("handle '{0}' is not an absolute URI")]
    NotAbsolute(String),

    #[error("invalid handle namespace '{0}'")]
    InvalidNamespace(String),
}

/// Position of a claim in the log. Assigned once at insert, strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(u64);

impl SequenceId {
    pub const FIRST: SequenceId = SequenceId(1);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Read a claim reference such as `lastClaimId`, which may arrive as a
    /// decimal string or a JSON number.
    pub fn from_reference(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(Self),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SequenceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

/// Stable, global identifier of an entity version chain. Always an absolute URI.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HandleId(String);

impl HandleId {
    /// Validate caller-supplied handle text.
    ///
    /// Internal sequence ids are refused outright so that a log position can
    /// never be mistaken for an entity handle.
    pub fn parse_submitted(text: &str) -> HandleResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(HandleError::Empty);
        }
        if text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HandleError::InternalSequenceId(text.to_string()));
        }
        if !has_uri_scheme(text) {
            return Err(HandleError::NotAbsolute(text.to_string()));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for HandleId {
    type Error = HandleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_submitted(&value)
    }
}

impl From<HandleId> for String {
    fn from(value: HandleId) -> Self {
        value.0
    }
}

const LOCAL_SUFFIX_PREFIX: &str = "claim-";

/// The URI prefix under which this deployment mints handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleNamespace {
    prefix: String,
}

impl HandleNamespace {
    pub const DEFAULT_PREFIX: &'static str = "https://endorser.ch/entity/";

    pub fn new(prefix: impl Into<String>) -> HandleResult<Self> {
        let prefix = prefix.into();
        let terminated = prefix.ends_with('/') || prefix.ends_with(':') || prefix.ends_with('#');
        if !has_uri_scheme(&prefix) || !terminated {
            return Err(HandleError::InvalidNamespace(prefix));
        }
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Mint the handle for an entity first introduced by `sequence`.
    pub fn handle_for(&self, sequence: SequenceId) -> HandleId {
        HandleId(format!("{}{}{}", self.prefix, LOCAL_SUFFIX_PREFIX, sequence))
    }

    /// Sequence id of the introducing claim, for handles minted here.
    pub fn local_sequence(&self, handle: &HandleId) -> Option<SequenceId> {
        handle
            .as_str()
            .strip_prefix(&self.prefix)?
            .strip_prefix(LOCAL_SUFFIX_PREFIX)?
            .parse()
            .ok()
    }

    pub fn contains(&self, handle: &HandleId) -> bool {
        handle.as_str().starts_with(&self.prefix)
    }

    /// Resolve lookup text to a handle. Bare local suffixes are accepted here,
    /// but never on submission.
    pub fn expand(&self, reference: &str) -> HandleResult<HandleId> {
        let reference = reference.trim();
        if has_uri_scheme(reference) {
            return HandleId::parse_submitted(reference);
        }
        if reference.is_empty() {
            return Err(HandleError::Empty);
        }
        if reference.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HandleError::InternalSequenceId(reference.to_string()));
        }
        Ok(HandleId(format!("{}{}", self.prefix, reference)))
    }
}

impl Default for HandleNamespace {
    fn default() -> Self {
        Self {
            prefix: Self::DEFAULT_PREFIX.to_string(),
        }
    }
}

fn has_uri_scheme(text: &str) -> bool {
    let Some((scheme, rest)) = text.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_alpha
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !rest.is_empty()
}
