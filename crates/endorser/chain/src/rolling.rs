use endorser_redaction::all_identifiers_inside;
use endorser_types::{canonical_json, SequenceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// One claim as seen by the chain: its log position and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEntry {
    pub sequence_id: SequenceId,
    pub payload: Value,
}

impl ChainEntry {
    pub fn new(sequence_id: SequenceId, payload: Value) -> Self {
        Self {
            sequence_id,
            payload,
        }
    }
}

/// Digests produced while folding one claim into the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStep {
    pub sequence_id: SequenceId,
    pub link_digest: String,
    pub running_digest: String,
}

/// Incremental chain state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashChain {
    running: String,
}

impl HashChain {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            running: seed.into(),
        }
    }

    pub fn push(&mut self, sequence_id: SequenceId, payload: &Value) -> ChainStep {
        let link_digest = sha256_hex(entry_input(sequence_id, payload).as_bytes());
        let mut joined = String::with_capacity(self.running.len() + link_digest.len());
        joined.push_str(&self.running);
        joined.push_str(&link_digest);
        self.running = sha256_hex(joined.as_bytes());
        ChainStep {
            sequence_id,
            link_digest,
            running_digest: self.running.clone(),
        }
    }

    pub fn digest(&self) -> &str {
        &self.running
    }

    pub fn into_digest(self) -> String {
        self.running
    }
}

/// Text hashed for one claim. Identity-free payloads chain the same way
/// whatever id they were assigned.
pub fn entry_input(sequence_id: SequenceId, payload: &Value) -> String {
    let text = canonical_json(payload);
    if all_identifiers_inside(payload).is_empty() {
        text
    } else {
        format!("{sequence_id}{text}")
    }
}

pub fn chain(seed: &str, entries: &[ChainEntry]) -> String {
    let mut state = HashChain::new(seed);
    for entry in entries {
        state.push(entry.sequence_id, &entry.payload);
    }
    state.into_digest()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
