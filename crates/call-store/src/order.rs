use std::cmp::Ordering;

use call_protocol::Priority;

use crate::CallRecord;

/// In-progress calls first, then Emergency, then by priority rank ascending.
pub fn compare_for_display(a: &CallRecord, b: &CallRecord) -> Ordering {
    let emergency = |record: &CallRecord| record.priority == Priority::Emergency;
    b.is_in_progress()
        .cmp(&a.is_in_progress())
        .then_with(|| emergency(b).cmp(&emergency(a)))
        .then_with(|| a.priority.rank().cmp(&b.priority.rank()))
}

/// Display view of `calls`. Ties keep storage order.
pub fn display_order(calls: &[CallRecord]) -> Vec<CallRecord> {
    let mut sorted = calls.to_vec();
    sorted.sort_by(compare_for_display);
    sorted
}
