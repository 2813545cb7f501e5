//! Lifecycle classification of the conferencing client.

use serde::{Deserialize, Serialize};

use crate::probe::ProbeError;

/// Coarse classification of the client's observable run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    NotRunning,
    Minimized,
    Normal,
    UnexpectedBehavior,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRunning => "not-running",
            Self::Minimized => "minimized",
            Self::Normal => "normal",
            Self::UnexpectedBehavior => "unexpected-behavior",
        }
    }

    /// Whether this state counts as being inside a meeting.
    pub fn in_meeting(&self) -> bool {
        matches!(self, Self::Normal | Self::Minimized)
    }
}

/// What a tick's classification meant for the meeting lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    /// The client window appeared; a meeting was entered.
    Entered,
    /// The client window disappeared; the meeting is over.
    Exited,
    /// The client was declared unsupported. Reported once per episode.
    Unsupported,
}

/// Tracks the client lifecycle across probe ticks.
///
/// Owns the only [`LifecycleState`] value in the system. Structural probe
/// failures latch the monitor in `UnexpectedBehavior` until the window
/// disappears and the cycle resets, so a broken client is reported once
/// rather than every tick.
pub struct StateMonitor {
    state: LifecycleState,
    unsupported_reported: bool,
    unsupported_reason: Option<String>,
}

impl StateMonitor {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::NotRunning,
            unsupported_reported: false,
            unsupported_reason: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn unsupported_reason(&self) -> Option<&str> {
        self.unsupported_reason.as_deref()
    }

    /// Feed one probe classification into the monitor.
    pub fn observe(
        &mut self,
        result: Result<LifecycleState, ProbeError>,
    ) -> Transition {
        match result {
            // Retried next tick without a state change.
            Err(ProbeError::Transient(_)) => Transition::None,
            Err(ProbeError::Structural(reason)) => self.declare_unsupported(reason),
            Ok(next) => self.apply(next),
        }
    }

    /// Escalation path for downstream readers: the participant panel could
    /// not be read reliably, so the client is effectively unsupported.
    pub fn escalate_unsupported(&mut self, reason: impl Into<String>) -> Transition {
        self.declare_unsupported(reason.into())
    }

    fn declare_unsupported(&mut self, reason: String) -> Transition {
        if self.state != LifecycleState::UnexpectedBehavior {
            self.state = LifecycleState::UnexpectedBehavior;
        }
        if self.unsupported_reported {
            return Transition::None;
        }
        self.unsupported_reported = true;
        self.unsupported_reason = Some(reason);
        Transition::Unsupported
    }

    fn apply(&mut self, next: LifecycleState) -> Transition {
        let prev = self.state;

        // Once unsupported, only the window disappearing resets the episode.
        if prev == LifecycleState::UnexpectedBehavior && next != LifecycleState::NotRunning {
            return Transition::None;
        }

        match (prev, next) {
            (LifecycleState::NotRunning, LifecycleState::Normal)
            | (LifecycleState::NotRunning, LifecycleState::Minimized) => {
                self.state = next;
                Transition::Entered
            }
            (LifecycleState::NotRunning, LifecycleState::UnexpectedBehavior) => {
                self.declare_unsupported("client window appeared in an unrecognized form".into())
            }
            (prev, LifecycleState::NotRunning) if prev != LifecycleState::NotRunning => {
                self.state = next;
                self.unsupported_reported = false;
                self.unsupported_reason = None;
                Transition::Exited
            }
            (_, LifecycleState::UnexpectedBehavior) => {
                self.declare_unsupported("client structure no longer recognized".into())
            }
            _ => {
                // NotRunning -> NotRunning and Minimized <-> Normal.
                self.state = next;
                Transition::None
            }
        }
    }
}

impl Default for StateMonitor {
    fn default() -> Self {
        Self::new()
    }
}
