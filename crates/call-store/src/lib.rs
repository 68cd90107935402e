//! In-memory call collection for the operations dashboard.
//!
//! The store is the only owner of call records. Inbound events are applied one at a
//! time through [`CallStore::apply`]; operator actions use the local operations
//! (`remove`, `patch`, `append`), which share the same matching rules.

mod order;
mod record;
pub mod seed;
mod store;

pub use order::{compare_for_display, display_order};
pub use record::{topic_from_summary, CallPatch, CallRecord, TranscriptChunk};
pub use store::{CallStore, Outcome, StoreError, FIRST_ALLOCATED_ID};

pub use call_protocol::{CallId, CallStatus, Priority, RiskScores};
