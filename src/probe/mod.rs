//! Probing of the conferencing client's observable state.
//!
//! The engine only talks to the client through [`MeetingProbe`]; the
//! Hyprland implementation lives in [`hyprland`] and can be swapped for a
//! scripted probe in tests.

pub mod hyprland;
pub mod parse;

use async_trait::async_trait;
use thiserror::Error;

use crate::engine::counter::ParticipantCounts;
use crate::engine::lifecycle::LifecycleState;

pub use hyprland::HyprlandProbe;

/// Probe failures, split by how the monitor must react.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Recoverable read failure; retried on the next tick, never surfaced
    /// individually.
    #[error("transient probe failure: {0}")]
    Transient(String),
    /// The client is present but its observable structure is not one we
    /// understand (incompatible version, unreadable participant panel).
    #[error("unsupported client structure: {0}")]
    Structural(String),
}

/// Narrow window/process contract consumed by the engine.
#[async_trait]
pub trait MeetingProbe: Send + Sync {
    /// Classify the client's current lifecycle state.
    async fn classify(&mut self) -> Result<LifecycleState, ProbeError>;

    /// Read the displayed participant count and room capacity.
    /// Only called while the client is in its normal operating state.
    async fn read_participants(&mut self) -> Result<ParticipantCounts, ProbeError>;
}
