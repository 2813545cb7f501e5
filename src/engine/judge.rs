//! The exit-by-ratio decision function.

use crate::config::ThresholdConfig;

use super::counter::ParticipantSnapshot;

/// What the judge concluded from one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Enough participants are present to inhibit auto-exit.
    pub over_threshold: bool,
    /// The raw exit condition held this tick (before debounce).
    pub exit_condition: bool,
    /// The debounced exit condition fired this tick.
    pub triggered: bool,
}

/// Pure threshold decision with debounce.
///
/// The consecutive-hit counter is the only mutable state here; it resets
/// whenever the exit condition is false, so a single noisy sample never
/// triggers an exit.
#[derive(Debug, Default)]
pub struct RatioJudge {
    consecutive_hits: u32,
}

impl RatioJudge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.consecutive_hits = 0;
    }

    /// Evaluate one snapshot against the thresholds.
    ///
    /// Callers must not pass snapshots with an unknown capacity; a zero
    /// maximum yields `over_threshold = false` but such snapshots are
    /// escalated upstream before they ever reach the judge.
    pub fn observe(&mut self, snapshot: &ParticipantSnapshot, config: &ThresholdConfig) -> Verdict {
        let over_threshold = snapshot.maximum_count > 0
            && (snapshot.current_count as f64 / snapshot.maximum_count as f64)
                > config.activation_threshold;

        let exit_condition =
            !over_threshold && snapshot.current_count <= config.max_count_to_exit;

        if exit_condition {
            self.consecutive_hits = self.consecutive_hits.saturating_add(1);
        } else {
            self.consecutive_hits = 0;
        }

        Verdict {
            over_threshold,
            exit_condition,
            triggered: exit_condition && self.consecutive_hits >= config.debounce_ticks.max(1),
        }
    }
}
