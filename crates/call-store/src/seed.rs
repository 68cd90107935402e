//! Deterministic fixture calls shown before the backend has sent anything.

use call_protocol::{CallStatus, Priority, RiskScores};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{CallRecord, FIRST_ALLOCATED_ID};

struct Fixture {
    name: &'static str,
    phone: &'static str,
    duration: &'static str,
    status: CallStatus,
    topic: &'static str,
    priority: &'static str,
    summary: &'static str,
}

const FIXTURES: &[Fixture] = &[
    Fixture {
        name: "Sarah Johnson",
        phone: "+1 (555) 123-4567",
        duration: "5m 32s",
        status: CallStatus::ConnectedToAgent,
        topic: "Anxiety",
        priority: "Normal",
        summary: "Worked through coping strategies for work-related anxiety.",
    },
    Fixture {
        name: "Michael Chen",
        phone: "+1 (555) 234-5678",
        duration: "8m 47s",
        status: CallStatus::ConnectedTo911,
        topic: "Panic Attack",
        priority: "High Priority",
        summary: "Severe panic symptoms; emergency services engaged.",
    },
    Fixture {
        name: "Emily Rodriguez",
        phone: "+1 (555) 345-6789",
        duration: "3m 12s",
        status: CallStatus::InProgress,
        topic: "Suicidal",
        priority: "Emergency",
        summary: "Caller reports suicidal thoughts. Crisis intervention under way.",
    },
    Fixture {
        name: "David Thompson",
        phone: "+1 (555) 456-7890",
        duration: "12m 05s",
        status: CallStatus::Completed,
        topic: "Coping tips",
        priority: "Low Priority",
        summary: "Discussed stress management routines.",
    },
    Fixture {
        name: "James Wilson",
        phone: "+1 (555) 678-9012",
        duration: "1m 45s",
        status: CallStatus::InProgress,
        topic: "Addiction",
        priority: "High Priority",
        summary: "Looking for substance-use recovery resources.",
    },
    Fixture {
        name: "Olivia Martinez",
        phone: "+1 (555) 789-0123",
        duration: "4m 30s",
        status: CallStatus::Completed,
        topic: "Isolation",
        priority: "Urgent",
        summary: "Active listening for a caller feeling isolated.",
    },
    Fixture {
        name: "Maria Garcia",
        phone: "+1 (555) 222-3333",
        duration: "4m 15s",
        status: CallStatus::InProgress,
        topic: "Homicidal",
        priority: "Emergency",
        summary: "Caller describes thoughts of harming someone.",
    },
    Fixture {
        name: "Alex Rivera",
        phone: "+1 (555) 111-2222",
        duration: "2m 30s",
        status: CallStatus::InProgress,
        topic: "Panic Attack",
        priority: "Normal",
        summary: "Panic attack symptoms, breathing exercise in progress.",
    },
];

/// Builds fixture calls whose risk scores come from a seeded generator.
pub struct SeedGenerator {
    rng: StdRng,
}

impl SeedGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn scores(&mut self) -> RiskScores {
        RiskScores::new(
            self.rng.gen_range(0..=100),
            self.rng.gen_range(0..=100),
            self.rng.gen_range(0..=100),
            self.rng.gen_range(0..=100),
        )
    }

    /// Every fixture, ids 1.. in table order.
    pub fn fixtures(&mut self) -> Vec<CallRecord> {
        FIXTURES
            .iter()
            .enumerate()
            .map(|(index, fixture)| {
                let mut record = CallRecord::new(index as u64 + 1, fixture.phone);
                record.display_name = fixture.name.to_string();
                record.duration_text = fixture.duration.to_string();
                record.status = fixture.status;
                record.topic = fixture.topic.to_string();
                record.priority = Priority::from_label(fixture.priority);
                record.summary = fixture.summary.to_string();
                record.transcript = format!(
                    "Agent: Thank you for calling. How can I help today?\n{}: {}",
                    fixture.name.split_whitespace().next().unwrap_or(fixture.name),
                    fixture.summary
                );
                record.risk_assessment = self.scores();
                record
            })
            .collect()
    }
}

/// Fixture set for `seed`; identical seeds give identical calls.
pub fn fixtures(seed: u64) -> Vec<CallRecord> {
    let records = SeedGenerator::new(seed).fixtures();
    debug_assert!(records.iter().all(|record| record.id < FIRST_ALLOCATED_ID));
    records
}
