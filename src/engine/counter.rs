//! Participant counting with stale-but-valid snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::probe::ProbeError;

/// Raw counts as read off the client window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantCounts {
    pub current: u32,
    pub maximum: u32,
}

/// A well-formed participant observation. Replaced wholesale on each
/// successful read, never partially mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParticipantSnapshot {
    pub current_count: u32,
    pub maximum_count: u32,
    pub captured_at: DateTime<Utc>,
}

/// Outcome of feeding one read attempt into the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOutcome {
    /// A fresh snapshot was taken. `first_fix` marks the first successful
    /// read since the counter was last reset.
    Updated { first_fix: bool },
    /// Transient failure; the previous snapshot remains valid.
    Stale,
    /// The participant display cannot be read reliably (retry budget
    /// exhausted, structural failure, or unknown capacity). The caller
    /// escalates this to the lifecycle monitor.
    Escalate,
}

/// Maintains the latest [`ParticipantSnapshot`] while the client is in its
/// normal operating state.
pub struct ParticipantCounter {
    snapshot: Option<ParticipantSnapshot>,
    consecutive_failures: u32,
    retry_budget: u32,
    have_fix: bool,
}

impl ParticipantCounter {
    pub fn new(retry_budget: u32) -> Self {
        Self {
            snapshot: None,
            consecutive_failures: 0,
            retry_budget,
            have_fix: false,
        }
    }

    pub fn snapshot(&self) -> Option<ParticipantSnapshot> {
        self.snapshot
    }

    /// Forget everything; called when the meeting ends or the client leaves
    /// its normal state.
    pub fn reset(&mut self) {
        self.snapshot = None;
        self.consecutive_failures = 0;
        self.have_fix = false;
    }

    pub fn ingest(&mut self, result: Result<ParticipantCounts, ProbeError>) -> CounterOutcome {
        match result {
            Ok(counts) if counts.maximum == 0 => {
                // Capacity unknown: the ratio is undefined, never a division.
                CounterOutcome::Escalate
            }
            Ok(counts) => {
                self.consecutive_failures = 0;
                let first_fix = !self.have_fix;
                self.have_fix = true;
                self.snapshot = Some(ParticipantSnapshot {
                    current_count: counts.current,
                    maximum_count: counts.maximum,
                    captured_at: Utc::now(),
                });
                CounterOutcome::Updated { first_fix }
            }
            Err(ProbeError::Transient(_)) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures > self.retry_budget {
                    CounterOutcome::Escalate
                } else {
                    CounterOutcome::Stale
                }
            }
            Err(ProbeError::Structural(_)) => CounterOutcome::Escalate,
        }
    }
}
