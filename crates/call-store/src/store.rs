use std::time::SystemTime;

use call_protocol::{
    CallEnd, CallEvent, CallId, CallStatus, CallTransfer, CallUpdate, LiveTranscriptChunk, NewCall,
    RiskAssessmentUpdate, StatusUpdate, TranscriptUpdate,
};
use thiserror::Error;
use tracing::debug;

use crate::order::display_order;
use crate::record::{topic_from_summary, DEFAULT_DURATION, DEFAULT_NAME, DEFAULT_SUMMARY};
use crate::{CallPatch, CallRecord, TranscriptChunk};

/// Counter start for ids allocated by the store; seed fixtures live below it.
pub const FIRST_ALLOCATED_ID: CallId = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("phone {phone} already belongs to call {owner}")]
    PhoneInUse { phone: String, owner: CallId },
}

/// What a single reduction did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created(CallId),
    Merged(CallId),
    Updated(CallId),
    Removed(CallId),
    Unmatched,
}

impl Outcome {
    /// Id of the record whose highlight was raised by this reduction.
    pub fn highlighted(self) -> Option<CallId> {
        match self {
            Outcome::Created(id) | Outcome::Merged(id) => Some(id),
            _ => None,
        }
    }

    pub fn changed(self) -> bool {
        self != Outcome::Unmatched
    }
}

#[derive(Debug, Clone)]
pub struct CallStore {
    // Storage order, newest first. Display order is derived on read.
    calls: Vec<CallRecord>,
    next_id: CallId,
}

impl Default for CallStore {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            next_id: FIRST_ALLOCATED_ID,
        }
    }
}

impl CallStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the collection. Later duplicates of a phone or id are dropped.
    pub fn with_seed(records: impl IntoIterator<Item = CallRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            if store.find_by_phone(&record.phone).is_some() || store.contains(record.id) {
                debug!(target: "call_store", id = record.id, phone = %record.phone, "skipping duplicate seed record");
                continue;
            }
            store.advance_past(record.id);
            store.calls.push(record);
        }
        store
    }

    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn next_id(&self) -> CallId {
        self.next_id
    }

    pub fn get(&self, id: CallId) -> Option<&CallRecord> {
        self.calls.iter().find(|call| call.id == id)
    }

    pub fn find_by_phone(&self, phone: &str) -> Option<&CallRecord> {
        self.calls.iter().find(|call| call.phone == phone)
    }

    pub fn display_order(&self) -> Vec<CallRecord> {
        display_order(&self.calls)
    }

    /// Number of calls still in progress.
    pub fn active_count(&self) -> usize {
        self.calls.iter().filter(|call| call.is_in_progress()).count()
    }

    /// Applies one normalized event.
    pub fn apply(&mut self, event: &CallEvent) -> Outcome {
        let outcome = match event {
            CallEvent::NewCall(new_call) => self.apply_new_call(new_call),
            CallEvent::CallUpdate(update) => self.apply_call_update(update),
            CallEvent::CallEnd(end) => self.apply_call_end(end),
            CallEvent::CallTransfer(transfer) => self.apply_call_transfer(transfer),
            CallEvent::StatusUpdate(update) => self.apply_status_update(update),
            CallEvent::RiskAssessmentUpdate(update) => self.apply_risk_update(update),
            CallEvent::TranscriptUpdate(update) => self.apply_transcript_update(update),
            CallEvent::LiveTranscriptChunk(chunk) => self.apply_transcript_chunk(chunk),
        };
        if outcome == Outcome::Unmatched {
            debug!(target: "call_store", kind = %event.kind(), "event matched no call");
        }
        outcome
    }

    fn apply_new_call(&mut self, event: &NewCall) -> Outcome {
        if let Some(existing) = self.by_phone_mut(&event.phone) {
            if let Some(name) = &event.name {
                existing.display_name = name.clone();
            }
            if let Some(duration) = &event.duration {
                existing.duration_text = duration.clone();
            }
            if let Some(summary) = &event.summary {
                existing.topic = topic_from_summary(Some(summary));
                existing.summary = summary.clone();
            }
            if let Some(priority) = &event.priority {
                existing.priority = priority.clone();
            }
            if let Some(transcript) = &event.transcript {
                existing.transcript = transcript.clone();
            }
            event.scores.merge_into(&mut existing.risk_assessment);
            existing.is_new = true;
            return Outcome::Merged(existing.id);
        }

        let id = match event.id {
            Some(id) if self.accepts_id(id) => id,
            _ => self.allocate_id(),
        };
        self.advance_past(id);

        let record = CallRecord {
            id,
            phone: event.phone.clone(),
            display_name: event.name.clone().unwrap_or_else(|| DEFAULT_NAME.to_string()),
            duration_text: event
                .duration
                .clone()
                .unwrap_or_else(|| DEFAULT_DURATION.to_string()),
            topic: topic_from_summary(event.summary.as_deref()),
            summary: event
                .summary
                .clone()
                .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
            status: CallStatus::InProgress,
            priority: event.priority.clone().unwrap_or_default(),
            risk_assessment: event.scores.resolve(),
            transcript: event.transcript.clone().unwrap_or_default(),
            transcript_chunks: Vec::new(),
            created_at: Some(SystemTime::now()),
            is_new: true,
        };
        self.calls.insert(0, record);
        Outcome::Created(id)
    }

    fn apply_call_update(&mut self, event: &CallUpdate) -> Outcome {
        let Some(call) = self.by_phone_mut(&event.phone) else {
            return Outcome::Unmatched;
        };
        if let Some(priority) = &event.priority {
            call.priority = priority.clone();
        }
        if let Some(transcript) = &event.transcript {
            call.transcript = transcript.clone();
        }
        if let Some(summary) = &event.summary {
            call.summary = summary.clone();
        }
        call.risk_assessment = event.scores.resolve();
        Outcome::Updated(call.id)
    }

    fn apply_call_end(&mut self, event: &CallEnd) -> Outcome {
        match self.calls.iter().position(|call| call.phone == event.phone) {
            Some(index) => Outcome::Removed(self.calls.remove(index).id),
            None => Outcome::Unmatched,
        }
    }

    fn apply_call_transfer(&mut self, event: &CallTransfer) -> Outcome {
        let index = event
            .id
            .and_then(|id| self.calls.iter().position(|call| call.id == id))
            .or_else(|| {
                let phone = event.phone.as_deref()?;
                self.calls.iter().position(|call| call.phone == phone)
            });
        let Some(call) = index.map(|index| &mut self.calls[index]) else {
            return Outcome::Unmatched;
        };
        call.status = event.target;
        Outcome::Updated(call.id)
    }

    fn apply_status_update(&mut self, event: &StatusUpdate) -> Outcome {
        let Some(call) = self.by_id_mut(event.id) else {
            return Outcome::Unmatched;
        };
        call.status = event.status;
        Outcome::Updated(call.id)
    }

    fn apply_risk_update(&mut self, event: &RiskAssessmentUpdate) -> Outcome {
        let Some(call) = self.by_id_mut(event.id) else {
            return Outcome::Unmatched;
        };
        call.risk_assessment = event.scores;
        Outcome::Updated(call.id)
    }

    fn apply_transcript_update(&mut self, event: &TranscriptUpdate) -> Outcome {
        let Some(call) = self.by_id_mut(event.id) else {
            return Outcome::Unmatched;
        };
        call.transcript = event.transcript.clone();
        Outcome::Updated(call.id)
    }

    fn apply_transcript_chunk(&mut self, event: &LiveTranscriptChunk) -> Outcome {
        let Some(call) = self.by_phone_mut(&event.phone) else {
            return Outcome::Unmatched;
        };
        call.transcript_chunks.push(TranscriptChunk {
            role: event.role.clone(),
            message: event.message.clone(),
            time: event.timestamp,
        });
        Outcome::Updated(call.id)
    }

    /// Operator removal by id.
    pub fn remove(&mut self, id: CallId) -> Option<CallRecord> {
        let index = self.calls.iter().position(|call| call.id == id)?;
        Some(self.calls.remove(index))
    }

    /// Operator edit. Returns `Ok(false)` when no call has `id`.
    pub fn patch(&mut self, id: CallId, patch: CallPatch) -> Result<bool, StoreError> {
        if let Some(phone) = &patch.phone {
            if let Some(owner) = self.find_by_phone(phone).filter(|call| call.id != id) {
                return Err(StoreError::PhoneInUse {
                    phone: phone.clone(),
                    owner: owner.id,
                });
            }
        }
        let Some(call) = self.by_id_mut(id) else {
            return Ok(false);
        };
        patch.apply_to(call);
        Ok(true)
    }

    /// Operator insert. A record whose phone is already live is merged into the
    /// existing call, which keeps its id; otherwise the record is prepended.
    pub fn append(&mut self, record: CallRecord) -> CallId {
        if let Some(existing) = self.by_phone_mut(&record.phone) {
            let id = existing.id;
            let mut chunks = std::mem::take(&mut existing.transcript_chunks);
            chunks.extend(record.transcript_chunks.iter().cloned());
            *existing = CallRecord {
                id,
                transcript_chunks: chunks,
                ..record
            };
            return id;
        }

        let mut record = record;
        if !self.accepts_id(record.id) {
            record.id = self.allocate_id();
        }
        self.advance_past(record.id);
        let id = record.id;
        self.calls.insert(0, record);
        id
    }

    pub fn clear_new(&mut self, id: CallId) -> bool {
        match self.by_id_mut(id) {
            Some(call) if call.is_new => {
                call.is_new = false;
                true
            }
            _ => false,
        }
    }

    fn contains(&self, id: CallId) -> bool {
        self.get(id).is_some()
    }

    fn by_id_mut(&mut self, id: CallId) -> Option<&mut CallRecord> {
        self.calls.iter_mut().find(|call| call.id == id)
    }

    fn by_phone_mut(&mut self, phone: &str) -> Option<&mut CallRecord> {
        self.calls.iter_mut().find(|call| call.phone == phone)
    }

    // CallId::MAX is never taken from outside so the counter keeps room to advance.
    fn accepts_id(&self, id: CallId) -> bool {
        id != 0 && id != CallId::MAX && !self.contains(id)
    }

    fn allocate_id(&mut self) -> CallId {
        while self.contains(self.next_id) {
            match self.next_id.checked_add(1) {
                Some(next) => self.next_id = next,
                None => return self.lowest_free_id(),
            }
        }
        self.next_id
    }

    // Counter exhausted: reuse a gap at or above FIRST_ALLOCATED_ID without moving it back.
    fn lowest_free_id(&self) -> CallId {
        (FIRST_ALLOCATED_ID..=CallId::MAX)
            .find(|id| !self.contains(*id))
            .unwrap_or(FIRST_ALLOCATED_ID)
    }

    fn advance_past(&mut self, used: CallId) {
        self.next_id = self.next_id.max(used.saturating_add(1));
    }
}
