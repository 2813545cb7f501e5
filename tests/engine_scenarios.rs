//! End-to-end engine scenarios driven through scripted collaborators.
//!
//! Time is paused, so ticks and confirmation windows run instantly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::timeout;

use meetwarden::action::LeaveAction;
use meetwarden::config::ThresholdConfig;
use meetwarden::engine::{
    EngineEvent, EngineHandle, EngineSettings, ExitCause, ExitOrigin, ExitOrchestrator,
    LeaveOutcome, LifecycleState, ParticipantCounts,
};
use meetwarden::probe::{MeetingProbe, ProbeError};

/// Shared fake of the observable client, mutated by tests and by the fake
/// leave action.
#[derive(Clone)]
struct World {
    inner: Arc<Mutex<WorldState>>,
}

struct WorldState {
    lifecycle: LifecycleState,
    /// `None` reads as a transient participant-read failure.
    counts: Option<ParticipantCounts>,
    /// Whether a successful leave action actually removes the window.
    leave_effective: bool,
    leave_fails: bool,
    leave_invocations: u32,
}

impl World {
    fn new(lifecycle: LifecycleState, counts: Option<(u32, u32)>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WorldState {
                lifecycle,
                counts: counts.map(|(current, maximum)| ParticipantCounts { current, maximum }),
                leave_effective: true,
                leave_fails: false,
                leave_invocations: 0,
            })),
        }
    }

    fn set_lifecycle(&self, lifecycle: LifecycleState) {
        self.inner.lock().unwrap().lifecycle = lifecycle;
    }

    fn set_counts(&self, counts: Option<(u32, u32)>) {
        self.inner.lock().unwrap().counts =
            counts.map(|(current, maximum)| ParticipantCounts { current, maximum });
    }

    fn set_leave_effective(&self, effective: bool) {
        self.inner.lock().unwrap().leave_effective = effective;
    }

    fn set_leave_fails(&self, fails: bool) {
        self.inner.lock().unwrap().leave_fails = fails;
    }

    fn leave_invocations(&self) -> u32 {
        self.inner.lock().unwrap().leave_invocations
    }
}

struct FakeProbe {
    world: World,
}

#[async_trait]
impl MeetingProbe for FakeProbe {
    async fn classify(&mut self) -> Result<LifecycleState, ProbeError> {
        Ok(self.world.inner.lock().unwrap().lifecycle)
    }

    async fn read_participants(&mut self) -> Result<ParticipantCounts, ProbeError> {
        self.world
            .inner
            .lock()
            .unwrap()
            .counts
            .ok_or_else(|| ProbeError::Transient("participant panel not visible".into()))
    }
}

struct FakeLeave {
    world: World,
}

#[async_trait]
impl LeaveAction for FakeLeave {
    async fn request_leave(&self) -> anyhow::Result<()> {
        let mut state = self.world.inner.lock().unwrap();
        state.leave_invocations += 1;
        if state.leave_fails {
            bail!("client refused the leave command");
        }
        if state.leave_effective {
            state.lifecycle = LifecycleState::NotRunning;
        }
        Ok(())
    }
}

fn thresholds(activation: f64, max_exit: u32, debounce: u32) -> ThresholdConfig {
    ThresholdConfig {
        activation_threshold: activation,
        max_count_to_exit: max_exit,
        debounce_ticks: debounce,
    }
}

fn settings(poll_secs: u64, window_secs: u64) -> EngineSettings {
    EngineSettings {
        poll_interval: Duration::from_secs(poll_secs),
        confirmation_window: Duration::from_secs(window_secs),
        read_retry_budget: 3,
    }
}

fn start_engine(
    world: &World,
    thresholds: ThresholdConfig,
    settings: EngineSettings,
) -> (EngineHandle, tokio::task::JoinHandle<()>) {
    ExitOrchestrator::spawn(
        Box::new(FakeProbe {
            world: world.clone(),
        }),
        Box::new(FakeLeave {
            world: world.clone(),
        }),
        thresholds,
        settings,
    )
}

async fn next_event(rx: &mut broadcast::Receiver<EngineEvent>) -> EngineEvent {
    timeout(Duration::from_secs(120), rx.recv())
        .await
        .expect("no engine event within the timeout")
        .expect("engine event channel closed")
}

/// Receive events until one matches, returning it and everything seen on
/// the way there.
async fn wait_for(
    rx: &mut broadcast::Receiver<EngineEvent>,
    pred: impl Fn(&EngineEvent) -> bool,
) -> (EngineEvent, Vec<EngineEvent>) {
    let mut seen = Vec::new();
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return (event, seen);
        }
        seen.push(event);
    }
}

async fn wait_ticks(rx: &mut broadcast::Receiver<EngineEvent>, ticks: usize) -> Vec<EngineEvent> {
    let mut seen = Vec::new();
    let mut refreshed = 0;
    while refreshed < ticks {
        let event = next_event(rx).await;
        if matches!(event, EngineEvent::Refreshed { .. }) {
            refreshed += 1;
        }
        seen.push(event);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn test_thinned_meeting_triggers_self_exit_after_debounce() {
    let world = World::new(LifecycleState::Normal, Some((3, 10)));
    let (engine, _task) = start_engine(&world, thresholds(0.5, 5, 3), settings(1, 10));
    let mut events = engine.subscribe();

    let (exit, seen) = wait_for(&mut events, |e| {
        matches!(e, EngineEvent::ExitedMeeting { .. })
    })
    .await;

    let EngineEvent::ExitedMeeting {
        cause,
        origin,
        current_count,
        ..
    } = exit
    else {
        unreachable!()
    };
    assert_eq!(cause, ExitCause::SelfCaused);
    assert_eq!(origin, Some(ExitOrigin::Judge));
    assert_eq!(current_count, Some(3));
    assert_eq!(world.leave_invocations(), 1);

    // The condition had to hold for three ticks before the leave fired.
    let ticks_before_exit = seen
        .iter()
        .filter(|e| matches!(e, EngineEvent::Refreshed { .. }))
        .count();
    assert!(ticks_before_exit >= 3, "left after {ticks_before_exit} ticks");

    // Entry and first counts were announced along the way.
    assert!(seen
        .iter()
        .any(|e| matches!(e, EngineEvent::EnteredMeeting { .. })));
    assert_eq!(
        seen.iter()
            .filter(|e| matches!(e, EngineEvent::CountsAvailable { .. }))
            .count(),
        1
    );

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_full_meeting_never_triggers() {
    let world = World::new(LifecycleState::Normal, Some((8, 10)));
    let (engine, _task) = start_engine(&world, thresholds(0.5, 5, 3), settings(1, 10));
    let mut events = engine.subscribe();

    wait_ticks(&mut events, 6).await;

    assert_eq!(world.leave_invocations(), 0);
    let status = engine.status().get().await;
    assert!(status.derived.over_threshold);
    assert_eq!(status.derived.current_count, 8);
    assert!(status.pending_exit.is_none());

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unknown_capacity_escalates_to_unsupported() {
    let world = World::new(LifecycleState::Normal, Some((3, 0)));
    let (engine, _task) = start_engine(&world, thresholds(0.5, 5, 1), settings(1, 10));
    let mut events = engine.subscribe();

    wait_for(&mut events, |e| {
        matches!(e, EngineEvent::ClientUnsupported { .. })
    })
    .await;

    // The judge is never consulted and the report is not repeated.
    let later = wait_ticks(&mut events, 4).await;
    assert_eq!(world.leave_invocations(), 0);
    assert!(!later
        .iter()
        .any(|e| matches!(e, EngineEvent::ClientUnsupported { .. })));

    let status = engine.status().get().await;
    assert_eq!(status.derived.lifecycle, LifecycleState::UnexpectedBehavior);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_external_exit_reported_when_no_request_pending() {
    let world = World::new(LifecycleState::Normal, Some((8, 10)));
    let (engine, _task) = start_engine(&world, thresholds(0.5, 5, 3), settings(1, 10));
    let mut events = engine.subscribe();

    wait_ticks(&mut events, 2).await;
    world.set_lifecycle(LifecycleState::NotRunning);

    let (exit, _) = wait_for(&mut events, |e| {
        matches!(e, EngineEvent::ExitedMeeting { .. })
    })
    .await;

    let EngineEvent::ExitedMeeting { cause, origin, .. } = exit else {
        unreachable!()
    };
    assert_eq!(cause, ExitCause::External);
    assert_eq!(origin, None);
    assert_eq!(world.leave_invocations(), 0);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_exit_coalesces_with_pending_judge_request() {
    let world = World::new(LifecycleState::Normal, Some((3, 10)));
    // Leave succeeds but the window lingers, keeping the request pending.
    world.set_leave_effective(false);
    let (engine, _task) = start_engine(&world, thresholds(0.5, 5, 1), settings(1, 60));
    let mut events = engine.subscribe();

    wait_ticks(&mut events, 2).await;
    assert_eq!(
        engine.status().get().await.pending_exit,
        Some(ExitOrigin::Judge)
    );

    // Explicit user override while the judge's request is still pending.
    let outcome = engine.manual_leave().await.unwrap();
    assert_eq!(outcome, LeaveOutcome::Coalesced);
    assert_eq!(world.leave_invocations(), 1);

    // When the window finally goes, the exit keeps its original origin.
    world.set_lifecycle(LifecycleState::NotRunning);
    let (exit, _) = wait_for(&mut events, |e| {
        matches!(e, EngineEvent::ExitedMeeting { .. })
    })
    .await;
    let EngineEvent::ExitedMeeting { cause, origin, .. } = exit else {
        unreachable!()
    };
    assert_eq!(cause, ExitCause::SelfCaused);
    assert_eq!(origin, Some(ExitOrigin::Judge));

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_leave_fails_once_without_retry() {
    let world = World::new(LifecycleState::Normal, Some((3, 10)));
    world.set_leave_effective(false);
    let (engine, _task) = start_engine(&world, thresholds(0.5, 5, 1), settings(1, 3));
    let mut events = engine.subscribe();

    let (failed, _) = wait_for(&mut events, |e| {
        matches!(e, EngineEvent::ExitAttemptFailed { .. })
    })
    .await;
    let EngineEvent::ExitAttemptFailed { origin } = failed else {
        unreachable!()
    };
    assert_eq!(origin, ExitOrigin::Judge);
    assert_eq!(world.leave_invocations(), 1);
    assert!(engine.status().get().await.pending_exit.is_none());

    // The exit condition still holds, but no retry storm follows.
    wait_ticks(&mut events, 5).await;
    assert_eq!(world.leave_invocations(), 1);

    // A manual request is an explicit override and goes through.
    let outcome = engine.manual_leave().await.unwrap();
    assert_eq!(outcome, LeaveOutcome::Requested);
    assert_eq!(world.leave_invocations(), 2);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_leave_invocation_reports_failure() {
    let world = World::new(LifecycleState::Normal, Some((3, 10)));
    world.set_leave_fails(true);
    let (engine, _task) = start_engine(&world, thresholds(0.5, 5, 1), settings(1, 10));
    let mut events = engine.subscribe();

    wait_for(&mut events, |e| {
        matches!(e, EngineEvent::ExitAttemptFailed { .. })
    })
    .await;
    assert_eq!(world.leave_invocations(), 1);

    wait_ticks(&mut events, 4).await;
    assert_eq!(world.leave_invocations(), 1);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_exit_without_meeting() {
    let world = World::new(LifecycleState::NotRunning, None);
    let (engine, _task) = start_engine(&world, thresholds(0.5, 5, 3), settings(1, 10));

    let outcome = engine.manual_leave().await.unwrap();
    assert_eq!(outcome, LeaveOutcome::NotInMeeting);
    assert_eq!(world.leave_invocations(), 0);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_threshold_update_applies_between_ticks() {
    let world = World::new(LifecycleState::Normal, Some((3, 10)));
    // 3/10 is above a 0.2 activation threshold, so nothing fires.
    let (engine, _task) = start_engine(&world, thresholds(0.2, 5, 1), settings(1, 10));
    let mut events = engine.subscribe();

    wait_ticks(&mut events, 3).await;
    assert_eq!(world.leave_invocations(), 0);

    engine
        .update_thresholds(thresholds(0.5, 5, 1))
        .await
        .unwrap();

    let (exit, _) = wait_for(&mut events, |e| {
        matches!(e, EngineEvent::ExitedMeeting { .. })
    })
    .await;
    let EngineEvent::ExitedMeeting { cause, .. } = exit else {
        unreachable!()
    };
    assert_eq!(cause, ExitCause::SelfCaused);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_transient_read_failures_keep_stale_snapshot_then_escalate() {
    let world = World::new(LifecycleState::Normal, Some((8, 10)));
    let (engine, _task) = start_engine(&world, thresholds(0.5, 5, 3), settings(1, 10));
    let mut events = engine.subscribe();

    wait_for(&mut events, |e| {
        matches!(e, EngineEvent::CountsAvailable { .. })
    })
    .await;

    // Reads start failing; the last snapshot stays valid for a while.
    world.set_counts(None);
    wait_ticks(&mut events, 2).await;
    let status = engine.status().get().await;
    assert_eq!(status.derived.lifecycle, LifecycleState::Normal);
    assert_eq!(status.derived.current_count, 8);

    // Beyond the retry budget the client is declared unsupported.
    wait_for(&mut events, |e| {
        matches!(e, EngineEvent::ClientUnsupported { .. })
    })
    .await;
    let status = engine.status().get().await;
    assert_eq!(status.derived.lifecycle, LifecycleState::UnexpectedBehavior);
    assert_eq!(world.leave_invocations(), 0);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_minimized_entry_counts_arrive_after_restore() {
    let world = World::new(LifecycleState::Minimized, Some((3, 10)));
    let (engine, _task) = start_engine(&world, thresholds(0.5, 5, 3), settings(1, 10));
    let mut events = engine.subscribe();

    let (entered, _) = wait_for(&mut events, |e| {
        matches!(e, EngineEvent::EnteredMeeting { .. })
    })
    .await;
    let EngineEvent::EnteredMeeting { state } = entered else {
        unreachable!()
    };
    assert_eq!(state, LifecycleState::Minimized);

    // Counts are not read while minimized.
    let seen = wait_ticks(&mut events, 2).await;
    assert!(!seen
        .iter()
        .any(|e| matches!(e, EngineEvent::CountsAvailable { .. })));

    world.set_lifecycle(LifecycleState::Normal);
    wait_for(&mut events, |e| {
        matches!(e, EngineEvent::CountsAvailable { .. })
    })
    .await;

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_events_after_shutdown() {
    let world = World::new(LifecycleState::Normal, Some((8, 10)));
    let (engine, task) = start_engine(&world, thresholds(0.5, 5, 3), settings(1, 10));
    let mut events = engine.subscribe();

    wait_ticks(&mut events, 2).await;
    engine.shutdown().await;
    timeout(Duration::from_secs(5), task)
        .await
        .expect("engine did not stop")
        .unwrap();
    // The handle holds a sender; release it so the channel can close.
    drop(engine);

    // Drain whatever was in flight; the channel must then be closed.
    loop {
        match events.recv().await {
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
