use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::{CallEvent, Envelope, EventKind};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown event kind {0:?}")]
    UnknownKind(String),
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: EventKind,
        source: serde_json::Error,
    },
    #[error("{kind} names neither call_id nor user_phone")]
    MissingReference { kind: EventKind },
}

/// Decodes one text frame into a typed event.
pub fn normalize(text: &str) -> Result<CallEvent, NormalizeError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    normalize_envelope(envelope)
}

pub fn normalize_envelope(envelope: Envelope) -> Result<CallEvent, NormalizeError> {
    let kind = EventKind::from_wire_tag(&envelope.kind)
        .ok_or_else(|| NormalizeError::UnknownKind(envelope.kind.clone()))?;
    let data = envelope.data;
    trace!(target: "call_protocol::normalize", %kind, "decoding payload");

    let event = match kind {
        EventKind::NewCall => CallEvent::NewCall(payload(kind, data)?),
        EventKind::CallUpdate => CallEvent::CallUpdate(payload(kind, data)?),
        EventKind::CallEnd => CallEvent::CallEnd(payload(kind, data)?),
        EventKind::CallTransfer => {
            let transfer: crate::CallTransfer = payload(kind, data)?;
            if transfer.id.is_none() && transfer.phone.is_none() {
                return Err(NormalizeError::MissingReference { kind });
            }
            CallEvent::CallTransfer(transfer)
        }
        EventKind::StatusUpdate => CallEvent::StatusUpdate(payload(kind, data)?),
        EventKind::RiskAssessmentUpdate => CallEvent::RiskAssessmentUpdate(payload(kind, data)?),
        EventKind::TranscriptUpdate => CallEvent::TranscriptUpdate(payload(kind, data)?),
        EventKind::LiveTranscriptChunk => CallEvent::LiveTranscriptChunk(payload(kind, data)?),
    };
    Ok(event)
}

fn payload<T: DeserializeOwned>(kind: EventKind, data: Value) -> Result<T, NormalizeError> {
    serde_json::from_value(data).map_err(|source| NormalizeError::InvalidPayload { kind, source })
}
