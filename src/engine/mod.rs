//! The exit-by-ratio decision engine.
//!
//! Composed of four parts: the lifecycle monitor, the participant counter,
//! the ratio judge, and the orchestrator that ties them to the external
//! leave action. Data flows one way through them on each refresh tick.

pub mod counter;
pub mod events;
pub mod judge;
pub mod lifecycle;
pub mod orchestrator;

pub use counter::{ParticipantCounts, ParticipantSnapshot};
pub use events::{
    DerivedState, EngineEvent, EngineStatus, EngineStatusHandle, ExitCause, ExitOrigin,
    RecordedEvent,
};
pub use judge::RatioJudge;
pub use lifecycle::LifecycleState;
pub use orchestrator::{EngineHandle, EngineSettings, ExitOrchestrator, LeaveOutcome};
