//! Service composition and the event consumer loop.
//!
//! Everything is wired once here: probe, leave action, recorder, engine,
//! API server. The consumer loop below is the in-process presentation
//! layer: it renders engine notifications into the log and applies the
//! recording policy.

use crate::action::{self, RecordingControl, ShellRecorder};
use crate::api::{ApiServer, API_PORT};
use crate::config::{Config, StopOnExit};
use crate::engine::{EngineEvent, EngineSettings, ExitCause, ExitOrchestrator};
use crate::probe::HyprlandProbe;
use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

struct RecordingPolicy {
    auto_record: bool,
    stop_on_exit: StopOnExit,
}

pub async fn run_service() -> Result<()> {
    info!("Starting meetwarden service");

    let config = Config::load()?;

    let probe = HyprlandProbe::new(&config.client)?;
    let leave = action::build_leave_action(&config.leave, &config.client.window_class)?;
    let recorder = ShellRecorder::new(&config.recording);
    let policy = RecordingPolicy {
        auto_record: config.recording.auto_record,
        stop_on_exit: config.recording.stop_on_exit,
    };

    let (engine, engine_task) = ExitOrchestrator::spawn(
        Box::new(probe),
        leave,
        config.threshold,
        EngineSettings::from(&config.monitor),
    );

    let api_server = ApiServer::new(engine.clone(), &config);
    tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("API server failed: {}", e);
        }
    });

    info!("meetwarden is ready!");
    info!("Check status: curl http://127.0.0.1:{API_PORT}/status");
    info!("Leave manually: curl -X POST http://127.0.0.1:{API_PORT}/leave");

    let mut events = engine.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => consume_event(event, &policy, &recorder).await,
            Err(RecvError::Lagged(dropped)) => {
                warn!("Event consumer lagged, {dropped} notifications dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }

    engine_task.await?;
    Ok(())
}

async fn consume_event(event: EngineEvent, policy: &RecordingPolicy, recorder: &ShellRecorder) {
    match event {
        EngineEvent::EnteredMeeting { state } => {
            info!("Participated in a meeting ({})", state.as_str());
            if policy.auto_record {
                if let Err(e) = recorder.start().await {
                    warn!("Failed to start recorder: {e:#}");
                }
            }
        }
        EngineEvent::CountsAvailable { snapshot } => {
            info!(
                "Started capturing participant counts: {}/{}",
                snapshot.current_count, snapshot.maximum_count
            );
        }
        EngineEvent::ExitedMeeting {
            cause,
            origin,
            current_count,
            maximum_count,
        } => {
            match cause {
                ExitCause::SelfCaused => {
                    info!("Left the meeting (requested by {:?})", origin)
                }
                ExitCause::External => info!("Meeting ended externally (user or host)"),
            }
            if let (Some(current), Some(maximum)) = (current_count, maximum_count) {
                info!("Final participant count: {current}/{maximum}");
            }

            let stop = match policy.stop_on_exit {
                StopOnExit::Always => true,
                StopOnExit::SelfCaused => cause == ExitCause::SelfCaused,
                StopOnExit::Never => false,
            };
            if stop {
                if let Err(e) = recorder.stop().await {
                    warn!("Failed to stop recorder: {e:#}");
                }
            }
        }
        EngineEvent::ExitAttemptFailed { origin } => {
            warn!("Leave attempt (origin {:?}) did not take effect", origin);
        }
        EngineEvent::ClientUnsupported { reason } => {
            warn!("Client cannot be monitored: {reason}");
        }
        EngineEvent::Refreshed { derived } => {
            debug!(
                "Refreshed: {} {}/{} over_threshold={}",
                derived.lifecycle.as_str(),
                derived.current_count,
                derived.maximum_count,
                derived.over_threshold
            );
        }
    }
}
