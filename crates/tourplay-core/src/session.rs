//! Playback Session - async driver for a [`PlaybackController`]
//!
//! Owns the controller on a single task and feeds it, in arrival order:
//! - sampling ticks on the configured cadence
//! - rendering surface events
//! - host commands
//! - configuration overrides received by the telemetry reporter
//!
//! The telemetry reporter runs as a separate task and only ever sees frames
//! published after each tick, so a slow or failed channel cannot delay
//! playback decisions.

use crate::{
    controller::{ControllerMessage, PlaybackController},
    surface::{MediaEvent, RenderingSurface},
    telemetry::{ReporterExit, TelemetryConnector, TelemetryReporter},
    types::{SessionId, TelemetryFrame, VariantId},
    Error, Result,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Spawns playback sessions
pub struct PlaybackSession;

impl PlaybackSession {
    /// Start `controller` on its own task. Surface events are read from
    /// `media_events`; telemetry is enabled when a connector is given.
    #[instrument(skip_all, fields(session = %controller.session_id()))]
    pub fn spawn<S>(
        controller: PlaybackController<S>,
        media_events: mpsc::UnboundedReceiver<MediaEvent>,
        telemetry: Option<Arc<dyn TelemetryConnector>>,
    ) -> SessionHandle<S>
    where
        S: RenderingSurface + 'static,
    {
        let session_id = controller.session_id();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (frames_tx, frames_rx) = watch::channel(None);
        let (overrides_tx, overrides_rx) = mpsc::unbounded_channel();

        let reporter = telemetry.map(|connector| {
            let reporter = TelemetryReporter::new(
                connector,
                session_id,
                controller.config().telemetry_interval(),
                frames_rx.clone(),
                overrides_tx,
                shutdown_rx.clone(),
            );
            tokio::spawn(reporter.run())
        });

        let driver = SessionDriver {
            controller,
            commands: commands_rx,
            media_events,
            overrides: overrides_rx,
            frames: frames_tx,
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(driver.run());

        info!(telemetry = reporter.is_some(), "Playback session spawned");

        SessionHandle {
            session_id,
            commands: commands_tx,
            shutdown: shutdown_tx,
            frames: frames_rx,
            task,
            reporter,
        }
    }
}

/// Host-side handle to a running session
pub struct SessionHandle<S: RenderingSurface> {
    session_id: SessionId,
    commands: mpsc::UnboundedSender<ControllerMessage>,
    shutdown: watch::Sender<bool>,
    frames: watch::Receiver<Option<TelemetryFrame>>,
    task: JoinHandle<PlaybackController<S>>,
    reporter: Option<JoinHandle<ReporterExit>>,
}

impl<S: RenderingSurface + 'static> SessionHandle<S> {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Queue a message for the controller
    pub fn send(&self, message: ControllerMessage) -> Result<()> {
        self.commands.send(message).map_err(|_| Error::SessionClosed)
    }

    /// Pin a variant
    pub fn select_variant(&self, id: VariantId) -> Result<()> {
        self.send(ControllerMessage::SelectVariant(id))
    }

    /// Retry after a terminal error
    pub fn retry(&self) -> Result<()> {
        self.send(ControllerMessage::Retry)
    }

    /// Most recent frame published after a sampling tick
    pub fn latest_frame(&self) -> Option<TelemetryFrame> {
        self.frames.borrow().clone()
    }

    /// Tear the session down: stop both timers, cancel any pending switch and
    /// hand the controller back
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn shutdown(self) -> Result<PlaybackController<S>> {
        self.shutdown.send_replace(true);

        let controller = self
            .task
            .await
            .map_err(|e| Error::Internal(format!("session task failed: {e}")))?;

        if let Some(reporter) = self.reporter {
            match reporter.await {
                Ok(exit) => debug!(?exit, "Reporter joined"),
                Err(e) => warn!(error = %e, "Reporter task failed"),
            }
        }

        info!(qoe = controller.metrics().qoe_score(), "Playback session shut down");
        Ok(controller)
    }
}

struct SessionDriver<S: RenderingSurface> {
    controller: PlaybackController<S>,
    commands: mpsc::UnboundedReceiver<ControllerMessage>,
    media_events: mpsc::UnboundedReceiver<MediaEvent>,
    overrides: mpsc::UnboundedReceiver<crate::config::ConfigOverride>,
    frames: watch::Sender<Option<TelemetryFrame>>,
    shutdown: watch::Receiver<bool>,
}

impl<S: RenderingSurface> SessionDriver<S> {
    async fn run(mut self) -> PlaybackController<S> {
        let started_at = Instant::now();
        let mut sampler = interval(self.controller.config().sample_interval());
        sampler.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if let Err(e) = self.controller.start() {
            warn!(error = %e, "Initial load failed to start");
        }

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                Some(message) = self.commands.recv() => {
                    if message == ControllerMessage::Teardown {
                        break;
                    }
                    self.apply(message);
                }
                Some(event) = self.media_events.recv() => {
                    self.apply(ControllerMessage::Media(event));
                }
                Some(patch) = self.overrides.recv() => {
                    self.apply(ControllerMessage::ConfigPushed(patch));
                }
                _ = sampler.tick() => {
                    let now_ms = started_at.elapsed().as_millis() as u64;
                    self.apply(ControllerMessage::Tick { now_ms });
                    self.frames.send_replace(self.controller.telemetry_frame());
                }
            }
        }

        if let Err(e) = self.controller.dispatch(ControllerMessage::Teardown) {
            debug!(error = %e, "Teardown after close");
        }
        self.frames.send_replace(None);
        self.controller
    }

    fn apply(&mut self, message: ControllerMessage) {
        if let Err(e) = self.controller.dispatch(message) {
            debug!(error = %e, code = e.error_code(), "Message rejected");
        }
    }
}
