//! Call-center wire protocol.
//!
//! - domain enums shared by the store and the dashboard (`CallStatus`, `Priority`, `RiskScores`)
//! - the `{ "type": ..., "data": ... }` envelope used in both directions
//! - typed call events and the normalizer that turns envelopes into them

mod event;
mod lenient;
mod normalize;

pub use event::{
    CallEnd, CallEvent, CallTransfer, CallUpdate, EventKind, LiveTranscriptChunk, NewCall,
    RiskAssessmentUpdate, ScoreUpdate, StatusUpdate, TranscriptUpdate,
};
pub use normalize::{normalize, normalize_envelope, NormalizeError};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub type CallId = u64;

/// Wire envelope. `data` defaults to `null` when a sender omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: T,
}

pub const FRONTEND_READY: &str = "frontend_ready";

impl Envelope<Value> {
    /// Announces that the dashboard is ready to receive the backlog.
    pub fn frontend_ready() -> Self {
        Self {
            kind: FRONTEND_READY.to_string(),
            data: serde_json::json!({ "client": "calldesk" }),
        }
    }

    pub fn named(event: impl Into<String>, data: Value) -> Self {
        Self {
            kind: event.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallStatus {
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "connected-to-agent")]
    ConnectedToAgent,
    #[serde(rename = "connected-to-911")]
    ConnectedTo911,
    #[serde(rename = "completed")]
    Completed,
}

impl CallStatus {
    pub fn label(self) -> &'static str {
        match self {
            CallStatus::InProgress => "In Progress",
            CallStatus::ConnectedToAgent => "Connected to Human",
            CallStatus::ConnectedTo911 => "Connected to 911",
            CallStatus::Completed => "Completed",
        }
    }
}

/// Call priority. Labels the dashboard does not know are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    Emergency,
    HighPriority,
    #[default]
    Normal,
    LowPriority,
    Other(String),
}

impl Priority {
    pub fn from_label(label: &str) -> Self {
        match label {
            "Emergency" => Priority::Emergency,
            "High Priority" => Priority::HighPriority,
            "Normal" => Priority::Normal,
            "Low Priority" => Priority::LowPriority,
            other => Priority::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Priority::Emergency => "Emergency",
            Priority::HighPriority => "High Priority",
            Priority::Normal => "Normal",
            Priority::LowPriority => "Low Priority",
            Priority::Other(label) => label,
        }
    }

    /// Tertiary display key: High 2, Normal 3, Low 4, anything else 1.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::HighPriority => 2,
            Priority::Normal => 3,
            Priority::LowPriority => 4,
            Priority::Emergency | Priority::Other(_) => 1,
        }
    }
}

impl Serialize for Priority {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // The backend uses -1 as "not yet classified".
        Ok(match Value::deserialize(deserializer)? {
            Value::String(label) => Priority::from_label(&label),
            _ => Priority::Normal,
        })
    }
}

/// Four independent percentages, each in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScores {
    #[serde(
        default,
        alias = "self_harm",
        alias = "self_harm_percentage",
        deserialize_with = "lenient::score_or_zero"
    )]
    pub self_harm: u8,
    #[serde(
        default,
        alias = "distress_percentage",
        deserialize_with = "lenient::score_or_zero"
    )]
    pub distress: u8,
    #[serde(
        default,
        alias = "homicidal_percentage",
        deserialize_with = "lenient::score_or_zero"
    )]
    pub homicidal: u8,
    #[serde(
        default,
        alias = "psychosis_percentage",
        deserialize_with = "lenient::score_or_zero"
    )]
    pub psychosis: u8,
}

impl RiskScores {
    pub fn new(self_harm: u8, distress: u8, homicidal: u8, psychosis: u8) -> Self {
        Self {
            self_harm: self_harm.min(100),
            distress: distress.min(100),
            homicidal: homicidal.min(100),
            psychosis: psychosis.min(100),
        }
    }

    pub fn highest(&self) -> u8 {
        self.self_harm
            .max(self.distress)
            .max(self.homicidal)
            .max(self.psychosis)
    }
}
