use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Claim classification, read from the payload `@type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClaimType {
    /// A confirmation of one or more other claims.
    AgreeAction,
    GiveAction,
    JoinAction,
    Offer,
    Person,
    PlanAction,
    Project,
    RegisterAction,
    Tenure,
    Other(String),
}

impl ClaimType {
    pub fn of_payload(payload: &Value) -> Self {
        payload
            .get("@type")
            .and_then(Value::as_str)
            .map(Self::from_tag)
            .unwrap_or_else(|| ClaimType::Other(String::new()))
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "AgreeAction" => ClaimType::AgreeAction,
            "GiveAction" => ClaimType::GiveAction,
            "JoinAction" => ClaimType::JoinAction,
            "Offer" => ClaimType::Offer,
            "Person" => ClaimType::Person,
            "PlanAction" => ClaimType::PlanAction,
            "Project" => ClaimType::Project,
            "RegisterAction" => ClaimType::RegisterAction,
            "Tenure" => ClaimType::Tenure,
            other => ClaimType::Other(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            ClaimType::AgreeAction => "AgreeAction",
            ClaimType::GiveAction => "GiveAction",
            ClaimType::JoinAction => "JoinAction",
            ClaimType::Offer => "Offer",
            ClaimType::Person => "Person",
            ClaimType::PlanAction => "PlanAction",
            ClaimType::Project => "Project",
            ClaimType::RegisterAction => "RegisterAction",
            ClaimType::Tenure => "Tenure",
            ClaimType::Other(tag) => tag,
        }
    }

    /// Types whose claims form a version chain under a handle.
    pub fn is_versioned(&self) -> bool {
        matches!(
            self,
            ClaimType::GiveAction
                | ClaimType::Offer
                | ClaimType::Person
                | ClaimType::PlanAction
                | ClaimType::Project
                | ClaimType::Tenure
        )
    }

    pub fn is_confirmation(&self) -> bool {
        matches!(self, ClaimType::AgreeAction)
    }

    pub fn is_plan_like(&self) -> bool {
        matches!(self, ClaimType::PlanAction | ClaimType::Project)
    }

    /// Handle kind shared by interchangeable types. A handle first claimed as a
    /// plan may be continued as a project and vice versa.
    pub fn handle_kind(&self) -> &str {
        if self.is_plan_like() {
            "PlanAction"
        } else {
            self.tag()
        }
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl From<String> for ClaimType {
    fn from(value: String) -> Self {
        Self::from_tag(&value)
    }
}

impl From<ClaimType> for String {
    fn from(value: ClaimType) -> Self {
        value.tag().to_string()
    }
}

/// Output of upstream signature verification. The core never sees signature bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedClaim {
    pub issuer: String,
    pub subject: Option<String>,
    pub payload: Value,
    pub issued_at: DateTime<Utc>,
}

impl VerifiedClaim {
    pub fn new(issuer: impl Into<String>, payload: Value) -> Self {
        Self {
            issuer: issuer.into(),
            subject: None,
            payload,
            issued_at: Utc::now(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn claim_type(&self) -> ClaimType {
        ClaimType::of_payload(&self.payload)
    }
}

/// String found by following object keys from `value`.
pub fn payload_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |node, key| node.get(key))
        .and_then(Value::as_str)
}
