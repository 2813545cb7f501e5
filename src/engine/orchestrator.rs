//! Exit orchestration.
//!
//! Runs the refresh cycle on a dedicated task: classify the client, refresh
//! the participant snapshot, run the judge, and drive the external leave
//! action. Manual exits and threshold updates arrive as commands on the
//! same task, so decisions are strictly sequential and two leave
//! invocations can never be in flight at once.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::action::LeaveAction;
use crate::config::{MonitorConfig, ThresholdConfig};
use crate::probe::MeetingProbe;

use super::counter::{CounterOutcome, ParticipantCounter};
use super::events::{DerivedState, EngineEvent, EngineStatusHandle, ExitCause, ExitOrigin};
use super::judge::RatioJudge;
use super::lifecycle::{LifecycleState, StateMonitor, Transition};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

/// Engine loop timing and tolerances.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    pub confirmation_window: Duration,
    pub read_retry_budget: u32,
}

impl From<&MonitorConfig> for EngineSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            confirmation_window: Duration::from_secs(config.confirmation_window_seconds),
            read_retry_budget: config.read_retry_budget,
        }
    }
}

/// Outcome of a manual leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeaveOutcome {
    /// The leave action was invoked.
    Requested,
    /// An exit request was already pending; it keeps its original origin
    /// and no second action was issued.
    Coalesced,
    /// There is no meeting to leave.
    NotInMeeting,
    /// The leave action itself failed.
    Failed,
}

enum EngineCommand {
    ManualLeave { reply: oneshot::Sender<LeaveOutcome> },
    UpdateThresholds(ThresholdConfig),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    ExitRequested,
    AwaitingConfirmation,
}

#[derive(Debug, Clone, Copy)]
struct ExitRequest {
    issued_at: Instant,
    origin: ExitOrigin,
}

/// Cloneable handle for talking to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    status: EngineStatusHandle,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> EngineStatusHandle {
        self.status.clone()
    }

    /// Explicit user override: leave the meeting now. Resolves once the
    /// leave action has been attempted (or coalesced into a pending one).
    pub async fn manual_leave(&self) -> anyhow::Result<LeaveOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::ManualLeave { reply })
            .await
            .map_err(|_| anyhow::anyhow!("exit engine is not running"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("exit engine dropped the request"))
    }

    /// Atomically replace the thresholds used from the next tick on.
    pub async fn update_thresholds(&self, thresholds: ThresholdConfig) -> anyhow::Result<()> {
        thresholds.validate()?;
        self.tx
            .send(EngineCommand::UpdateThresholds(thresholds))
            .await
            .map_err(|_| anyhow::anyhow!("exit engine is not running"))
    }

    /// Stop the engine. No notifications are emitted afterwards.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(EngineCommand::Shutdown).await;
    }
}

pub struct ExitOrchestrator {
    probe: Box<dyn MeetingProbe>,
    leave: Box<dyn LeaveAction>,
    thresholds: ThresholdConfig,
    settings: EngineSettings,
    monitor: StateMonitor,
    counter: ParticipantCounter,
    judge: RatioJudge,
    phase: Phase,
    pending: Option<ExitRequest>,
    /// Set after a failed attempt; blocks further judge-triggered exits
    /// until the exit condition goes false or the lifecycle resets.
    judge_suppressed: bool,
    status: EngineStatusHandle,
    events: broadcast::Sender<EngineEvent>,
    rx: mpsc::Receiver<EngineCommand>,
}

impl ExitOrchestrator {
    /// Build the engine and start its background task.
    pub fn spawn(
        probe: Box<dyn MeetingProbe>,
        leave: Box<dyn LeaveAction>,
        thresholds: ThresholdConfig,
        settings: EngineSettings,
    ) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let status = EngineStatusHandle::default();

        let handle = EngineHandle {
            tx,
            status: status.clone(),
            events: events.clone(),
        };

        let orchestrator = Self {
            probe,
            leave,
            thresholds,
            counter: ParticipantCounter::new(settings.read_retry_budget),
            settings,
            monitor: StateMonitor::new(),
            judge: RatioJudge::new(),
            phase: Phase::Idle,
            pending: None,
            judge_suppressed: false,
            status,
            events,
            rx,
        };

        let task = tokio::spawn(orchestrator.run());
        (handle, task)
    }

    async fn run(mut self) {
        let mut ticker = interval(self.settings.poll_interval);
        // A tick whose work overruns is dropped, not queued: at most one
        // probe cycle in flight against the client window.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Exit engine started (poll every {:?}, confirmation window {:?})",
            self.settings.poll_interval, self.settings.confirmation_window
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh_tick().await,
                command = self.rx.recv() => match command {
                    Some(EngineCommand::ManualLeave { reply }) => {
                        let outcome = self.request_exit(ExitOrigin::Manual).await;
                        let _ = reply.send(outcome);
                    }
                    Some(EngineCommand::UpdateThresholds(thresholds)) => {
                        info!(
                            "Thresholds updated: activation {}, max count {}, debounce {}",
                            thresholds.activation_threshold,
                            thresholds.max_count_to_exit,
                            thresholds.debounce_ticks
                        );
                        self.thresholds = thresholds;
                    }
                    Some(EngineCommand::Shutdown) | None => break,
                },
            }
        }

        info!("Exit engine stopped");
    }

    async fn refresh_tick(&mut self) {
        let classified = self.probe.classify().await;
        let transition = self.monitor.observe(classified);
        self.handle_transition(transition).await;

        if self.monitor.state() == LifecycleState::Normal {
            let outcome = self.counter.ingest(self.probe.read_participants().await);
            match outcome {
                CounterOutcome::Updated { first_fix: true } => {
                    if let Some(snapshot) = self.counter.snapshot() {
                        self.emit(EngineEvent::CountsAvailable { snapshot }).await;
                    }
                }
                CounterOutcome::Escalate => {
                    let transition = self
                        .monitor
                        .escalate_unsupported("participant count cannot be read reliably");
                    self.handle_transition(transition).await;
                }
                CounterOutcome::Updated { first_fix: false } | CounterOutcome::Stale => {}
            }
        }

        let mut over_threshold = false;
        if self.monitor.state() == LifecycleState::Normal {
            if let Some(snapshot) = self.counter.snapshot() {
                let verdict = self.judge.observe(&snapshot, &self.thresholds);
                over_threshold = verdict.over_threshold;
                if !verdict.exit_condition {
                    // The room filled back up; a future failure may retry.
                    self.judge_suppressed = false;
                }
                if verdict.triggered && self.phase == Phase::Idle && !self.judge_suppressed {
                    info!(
                        "Exit condition held for {} ticks at {}/{} participants, leaving",
                        self.thresholds.debounce_ticks,
                        snapshot.current_count,
                        snapshot.maximum_count
                    );
                    self.request_exit(ExitOrigin::Judge).await;
                }
            }
        } else {
            self.judge.reset();
        }

        self.check_confirmation_window().await;
        self.publish_refreshed(over_threshold).await;
    }

    async fn handle_transition(&mut self, transition: Transition) {
        match transition {
            Transition::None => {}
            Transition::Entered => {
                self.counter.reset();
                self.judge.reset();
                self.judge_suppressed = false;
                self.emit(EngineEvent::EnteredMeeting {
                    state: self.monitor.state(),
                })
                .await;
            }
            Transition::Exited => {
                let last = self.counter.snapshot();
                let (cause, origin) = self.classify_exit();
                self.status.set_last_exit(cause).await;
                self.status.set_pending_exit(None).await;
                self.emit(EngineEvent::ExitedMeeting {
                    cause,
                    origin,
                    current_count: last.map(|s| s.current_count),
                    maximum_count: last.map(|s| s.maximum_count),
                })
                .await;
                self.counter.reset();
                self.judge.reset();
                self.judge_suppressed = false;
            }
            Transition::Unsupported => {
                let reason = self
                    .monitor
                    .unsupported_reason()
                    .unwrap_or("client structure not recognized")
                    .to_string();
                warn!("Client unsupported: {reason}");
                self.emit(EngineEvent::ClientUnsupported { reason }).await;
            }
        }
    }

    /// Decide whether the exit we just observed was our own doing.
    ///
    /// A pending request confirmed within the window is self-caused; an
    /// expired request no longer claims the exit.
    fn classify_exit(&mut self) -> (ExitCause, Option<ExitOrigin>) {
        let classification = match self.pending.take() {
            Some(request) if request.issued_at.elapsed() <= self.settings.confirmation_window => {
                (ExitCause::SelfCaused, Some(request.origin))
            }
            _ => (ExitCause::External, None),
        };
        self.phase = Phase::Idle;
        classification
    }

    /// Single invocation path shared by the judge and manual exits.
    async fn request_exit(&mut self, origin: ExitOrigin) -> LeaveOutcome {
        if let Some(pending) = &self.pending {
            debug!(
                "Leave already pending (origin {:?}), coalescing {:?} trigger",
                pending.origin, origin
            );
            return LeaveOutcome::Coalesced;
        }
        if self.monitor.state() == LifecycleState::NotRunning {
            return LeaveOutcome::NotInMeeting;
        }

        self.phase = Phase::ExitRequested;
        info!("Requesting meeting leave (origin {:?})", origin);

        match self.leave.request_leave().await {
            Ok(()) => {
                self.pending = Some(ExitRequest {
                    issued_at: Instant::now(),
                    origin,
                });
                self.phase = Phase::AwaitingConfirmation;
                self.status.set_pending_exit(Some(origin)).await;
                LeaveOutcome::Requested
            }
            Err(e) => {
                error!("Leave action failed: {e:#}");
                self.phase = Phase::Idle;
                // No automatic retry against an unresponsive client.
                self.judge_suppressed = true;
                self.emit(EngineEvent::ExitAttemptFailed { origin }).await;
                LeaveOutcome::Failed
            }
        }
    }

    /// A leave that never took visible effect is reported once and dropped;
    /// no automatic retry is issued.
    async fn check_confirmation_window(&mut self) {
        if self.phase != Phase::AwaitingConfirmation {
            return;
        }
        let Some(request) = self.pending else {
            return;
        };
        if self.monitor.state() != LifecycleState::NotRunning
            && request.issued_at.elapsed() > self.settings.confirmation_window
        {
            warn!(
                "Leave request (origin {:?}) not confirmed within {:?}",
                request.origin, self.settings.confirmation_window
            );
            self.pending = None;
            self.phase = Phase::Idle;
            // No automatic retry against an unresponsive client.
            self.judge_suppressed = true;
            self.status.set_pending_exit(None).await;
            self.emit(EngineEvent::ExitAttemptFailed {
                origin: request.origin,
            })
            .await;
        }
    }

    async fn publish_refreshed(&mut self, over_threshold: bool) {
        let snapshot = self.counter.snapshot();
        let derived = DerivedState {
            lifecycle: self.monitor.state(),
            current_count: snapshot.map(|s| s.current_count).unwrap_or(0),
            maximum_count: snapshot.map(|s| s.maximum_count).unwrap_or(0),
            over_threshold,
            activation_threshold: self.thresholds.activation_threshold,
            max_count_to_exit: self.thresholds.max_count_to_exit,
        };
        self.status.set_derived(derived).await;
        // Refreshed is broadcast every tick but kept out of the recorded
        // event log, which holds notable notifications only.
        let _ = self.events.send(EngineEvent::Refreshed { derived });
    }

    async fn emit(&self, event: EngineEvent) {
        self.status.record_event(&event).await;
        let _ = self.events.send(event);
    }
}
