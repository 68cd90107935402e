use std::fmt;

use serde::Deserialize;

use crate::{lenient, CallId, CallStatus, Priority, RiskScores};

/// One normalized inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    NewCall(NewCall),
    CallUpdate(CallUpdate),
    CallEnd(CallEnd),
    CallTransfer(CallTransfer),
    StatusUpdate(StatusUpdate),
    RiskAssessmentUpdate(RiskAssessmentUpdate),
    TranscriptUpdate(TranscriptUpdate),
    LiveTranscriptChunk(LiveTranscriptChunk),
}

impl CallEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            CallEvent::NewCall(_) => EventKind::NewCall,
            CallEvent::CallUpdate(_) => EventKind::CallUpdate,
            CallEvent::CallEnd(_) => EventKind::CallEnd,
            CallEvent::CallTransfer(_) => EventKind::CallTransfer,
            CallEvent::StatusUpdate(_) => EventKind::StatusUpdate,
            CallEvent::RiskAssessmentUpdate(_) => EventKind::RiskAssessmentUpdate,
            CallEvent::TranscriptUpdate(_) => EventKind::TranscriptUpdate,
            CallEvent::LiveTranscriptChunk(_) => EventKind::LiveTranscriptChunk,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewCall,
    CallUpdate,
    CallEnd,
    CallTransfer,
    StatusUpdate,
    RiskAssessmentUpdate,
    TranscriptUpdate,
    LiveTranscriptChunk,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::NewCall,
        EventKind::CallUpdate,
        EventKind::CallEnd,
        EventKind::CallTransfer,
        EventKind::StatusUpdate,
        EventKind::RiskAssessmentUpdate,
        EventKind::TranscriptUpdate,
        EventKind::LiveTranscriptChunk,
    ];

    pub fn wire_tag(self) -> &'static str {
        match self {
            EventKind::NewCall => "new_call",
            EventKind::CallUpdate => "call_update",
            EventKind::CallEnd => "call_end",
            EventKind::CallTransfer => "call_transfer",
            EventKind::StatusUpdate => "call_status_update",
            EventKind::RiskAssessmentUpdate => "risk_assessment_update",
            EventKind::TranscriptUpdate => "transcript_update",
            EventKind::LiveTranscriptChunk => "live_transcript_update",
        }
    }

    pub fn from_wire_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_tag() == tag)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_tag())
    }
}

/// Risk scores as they appear on call-level events, where each score may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ScoreUpdate {
    #[serde(default, rename = "self_harm_percentage", deserialize_with = "lenient::score")]
    pub self_harm: Option<u8>,
    #[serde(default, rename = "distress_percentage", deserialize_with = "lenient::score")]
    pub distress: Option<u8>,
    #[serde(default, rename = "homicidal_percentage", deserialize_with = "lenient::score")]
    pub homicidal: Option<u8>,
    #[serde(default, rename = "psychosis_percentage", deserialize_with = "lenient::score")]
    pub psychosis: Option<u8>,
}

impl ScoreUpdate {
    /// Full score set, with absent scores as 0.
    pub fn resolve(&self) -> RiskScores {
        RiskScores {
            self_harm: self.self_harm.unwrap_or(0),
            distress: self.distress.unwrap_or(0),
            homicidal: self.homicidal.unwrap_or(0),
            psychosis: self.psychosis.unwrap_or(0),
        }
    }

    /// Overwrites only the scores present in this update.
    pub fn merge_into(&self, scores: &mut RiskScores) {
        if let Some(value) = self.self_harm {
            scores.self_harm = value;
        }
        if let Some(value) = self.distress {
            scores.distress = value;
        }
        if let Some(value) = self.homicidal {
            scores.homicidal = value;
        }
        if let Some(value) = self.psychosis {
            scores.psychosis = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewCall {
    #[serde(default, rename = "call_id", alias = "id", deserialize_with = "lenient::id")]
    pub id: Option<CallId>,
    #[serde(rename = "user_phone")]
    pub phone: String,
    #[serde(default, rename = "user_name", deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, rename = "call_duration", deserialize_with = "lenient::text")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub summary: Option<String>,
    #[serde(default, rename = "call_priority")]
    pub priority: Option<Priority>,
    #[serde(default, rename = "call_transcript", deserialize_with = "lenient::text")]
    pub transcript: Option<String>,
    #[serde(flatten)]
    pub scores: ScoreUpdate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallUpdate {
    #[serde(rename = "user_phone")]
    pub phone: String,
    #[serde(default, rename = "call_priority")]
    pub priority: Option<Priority>,
    #[serde(default, rename = "call_transcript", deserialize_with = "lenient::text")]
    pub transcript: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub summary: Option<String>,
    #[serde(flatten)]
    pub scores: ScoreUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallEnd {
    #[serde(rename = "user_phone")]
    pub phone: String,
}

/// Hand-off of a call to a human agent or emergency services.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallTransfer {
    #[serde(default, rename = "call_id", alias = "id", deserialize_with = "lenient::id")]
    pub id: Option<CallId>,
    #[serde(default, rename = "user_phone")]
    pub phone: Option<String>,
    #[serde(default = "default_transfer_status", rename = "status")]
    pub target: CallStatus,
}

fn default_transfer_status() -> CallStatus {
    CallStatus::ConnectedToAgent
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusUpdate {
    #[serde(rename = "call_id", deserialize_with = "lenient::required_id")]
    pub id: CallId,
    pub status: CallStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RiskAssessmentUpdate {
    #[serde(rename = "call_id", deserialize_with = "lenient::required_id")]
    pub id: CallId,
    #[serde(default, rename = "risk_assessment")]
    pub scores: RiskScores,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TranscriptUpdate {
    #[serde(rename = "call_id", deserialize_with = "lenient::required_id")]
    pub id: CallId,
    pub transcript: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LiveTranscriptChunk {
    #[serde(rename = "user_phone")]
    pub phone: String,
    pub role: String,
    pub message: String,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub timestamp: Option<f64>,
}
