use std::time::SystemTime;

use call_protocol::{CallId, CallStatus, Priority, RiskScores};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NAME: &str = "Unknown";
pub const DEFAULT_DURATION: &str = "0.0";
pub const DEFAULT_SUMMARY: &str = "Call in progress...";
pub const DEFAULT_TOPIC: &str = "General";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub role: String,
    pub message: String,
    #[serde(default)]
    pub time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub id: CallId,
    pub phone: String,
    pub display_name: String,
    pub duration_text: String,
    pub topic: String,
    pub summary: String,
    pub status: CallStatus,
    pub priority: Priority,
    pub risk_assessment: RiskScores,
    pub transcript: String,
    #[serde(default)]
    pub transcript_chunks: Vec<TranscriptChunk>,
    /// Set when a `new_call` creates the record; seeded and appended records carry their own.
    #[serde(default)]
    pub created_at: Option<SystemTime>,
    /// Presentation highlight; cleared by the session once the display window passes.
    #[serde(default)]
    pub is_new: bool,
}

impl CallRecord {
    /// A record with every display field at its default.
    pub fn new(id: CallId, phone: impl Into<String>) -> Self {
        Self {
            id,
            phone: phone.into(),
            display_name: DEFAULT_NAME.to_string(),
            duration_text: DEFAULT_DURATION.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            summary: DEFAULT_SUMMARY.to_string(),
            status: CallStatus::InProgress,
            priority: Priority::Normal,
            risk_assessment: RiskScores::default(),
            transcript: String::new(),
            transcript_chunks: Vec::new(),
            created_at: None,
            is_new: false,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == CallStatus::InProgress
    }
}

/// First whitespace-delimited token of `summary`, or "General".
pub fn topic_from_summary(summary: Option<&str>) -> String {
    summary
        .and_then(|text| text.split_whitespace().next())
        .unwrap_or(DEFAULT_TOPIC)
        .to_string()
}

/// Operator edit. Every `Some` field overwrites, every `None` field is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallPatch {
    pub phone: Option<String>,
    pub display_name: Option<String>,
    pub duration_text: Option<String>,
    pub topic: Option<String>,
    pub summary: Option<String>,
    pub status: Option<CallStatus>,
    pub priority: Option<Priority>,
    pub risk_assessment: Option<RiskScores>,
    pub transcript: Option<String>,
    pub is_new: Option<bool>,
}

impl CallPatch {
    pub fn status(status: CallStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub(crate) fn apply_to(self, record: &mut CallRecord) {
        if let Some(phone) = self.phone {
            record.phone = phone;
        }
        if let Some(name) = self.display_name {
            record.display_name = name;
        }
        if let Some(duration) = self.duration_text {
            record.duration_text = duration;
        }
        if let Some(topic) = self.topic {
            record.topic = topic;
        }
        if let Some(summary) = self.summary {
            record.summary = summary;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(priority) = self.priority {
            record.priority = priority;
        }
        if let Some(scores) = self.risk_assessment {
            record.risk_assessment = scores;
        }
        if let Some(transcript) = self.transcript {
            record.transcript = transcript;
        }
        if let Some(is_new) = self.is_new {
            record.is_new = is_new;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_is_first_word_of_summary() {
        assert_eq!(topic_from_summary(Some("Feeling anxious")), "Feeling");
        assert_eq!(topic_from_summary(Some("  Panic   attack")), "Panic");
        assert_eq!(topic_from_summary(Some("   ")), "General");
        assert_eq!(topic_from_summary(None), "General");
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let mut record = CallRecord::new(7, "+1-555-0001");
        record.is_new = true;
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["displayName"], "Unknown");
        assert_eq!(value["status"], "in-progress");
        assert_eq!(value["riskAssessment"]["selfHarm"], 0);
        assert_eq!(value["isNew"], true);
    }

    #[test]
    fn creation_time_is_optional_on_the_wire() {
        let mut record = CallRecord::new(7, "+1");
        let mut value = serde_json::to_value(&record).unwrap();
        assert!(value["createdAt"].is_null());

        value.as_object_mut().unwrap().remove("createdAt");
        let parsed: CallRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.created_at, None);

        record.created_at = Some(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(60));
        let parsed: CallRecord = serde_json::from_value(serde_json::to_value(&record).unwrap()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn empty_patch_changes_nothing() {
        let original = CallRecord::new(1, "+1");
        let mut patched = original.clone();
        let patch = CallPatch::default();
        assert!(patch.is_empty());
        patch.apply_to(&mut patched);
        assert_eq!(patched, original);
    }
}
