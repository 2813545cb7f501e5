//! Engine notifications and shared status.
//!
//! Every notification leaves the engine through one broadcast channel, sent
//! from the engine task itself, so consumers on other tasks observe events
//! in exactly the order decisions were made.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::counter::ParticipantSnapshot;
use super::lifecycle::LifecycleState;

/// How many notifications the status handle remembers for consumers that
/// poll instead of subscribing.
const EVENT_LOG_CAPACITY: usize = 100;

/// Who asked for the exit that is (or was) in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitOrigin {
    Judge,
    Manual,
}

/// Whether an observed meeting exit was our doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitCause {
    SelfCaused,
    External,
}

/// Values derived on each refresh tick, handed to consumers as one object.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DerivedState {
    pub lifecycle: LifecycleState,
    pub current_count: u32,
    pub maximum_count: u32,
    pub over_threshold: bool,
    pub activation_threshold: f64,
    pub max_count_to_exit: u32,
}

impl Default for DerivedState {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleState::NotRunning,
            current_count: 0,
            maximum_count: 0,
            over_threshold: false,
            activation_threshold: 0.0,
            max_count_to_exit: 0,
        }
    }
}

/// Notifications emitted by the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EngineEvent {
    EnteredMeeting {
        state: LifecycleState,
    },
    ExitedMeeting {
        cause: ExitCause,
        /// Present when the exit was self-caused.
        origin: Option<ExitOrigin>,
        /// Last counts observed before the exit, when any were captured.
        current_count: Option<u32>,
        maximum_count: Option<u32>,
    },
    CountsAvailable {
        snapshot: ParticipantSnapshot,
    },
    /// The leave action was invoked but the client never left within the
    /// confirmation window (or the invocation itself failed).
    ExitAttemptFailed {
        origin: ExitOrigin,
    },
    /// The client is running but cannot be monitored. Once per episode.
    ClientUnsupported {
        reason: String,
    },
    Refreshed {
        derived: DerivedState,
    },
}

/// One remembered notification.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: EngineEvent,
}

/// Snapshot of the engine visible to API handlers and the CLI.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStatus {
    pub derived: DerivedState,
    pub pending_exit: Option<ExitOrigin>,
    pub last_exit: Option<ExitCause>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Thread-safe handle sharing engine status with other tasks.
#[derive(Clone, Default)]
pub struct EngineStatusHandle {
    inner: Arc<Mutex<StatusInner>>,
}

#[derive(Default)]
struct StatusInner {
    status: EngineStatus,
    events: VecDeque<RecordedEvent>,
}

impl EngineStatusHandle {
    pub async fn get(&self) -> EngineStatus {
        self.inner.lock().await.status.clone()
    }

    pub async fn set_derived(&self, derived: DerivedState) {
        let mut inner = self.inner.lock().await;
        inner.status.derived = derived;
        inner.status.updated_at = Some(Utc::now());
    }

    pub async fn set_pending_exit(&self, pending: Option<ExitOrigin>) {
        let mut inner = self.inner.lock().await;
        inner.status.pending_exit = pending;
    }

    pub async fn set_last_exit(&self, cause: ExitCause) {
        let mut inner = self.inner.lock().await;
        inner.status.last_exit = Some(cause);
    }

    pub async fn record_event(&self, event: &EngineEvent) {
        let mut inner = self.inner.lock().await;
        if inner.events.len() == EVENT_LOG_CAPACITY {
            inner.events.pop_front();
        }
        inner.events.push_back(RecordedEvent {
            at: Utc::now(),
            event: event.clone(),
        });
    }

    pub async fn recent_events(&self) -> Vec<RecordedEvent> {
        self.inner.lock().await.events.iter().cloned().collect()
    }
}
