//! Playback controller
//!
//! A single-threaded state machine. Every external stimulus (sampling tick,
//! surface event, pushed configuration, host command, teardown) arrives as a
//! [`ControllerMessage`] through [`PlaybackController::dispatch`], which is
//! the only entry point that mutates playback state.
//!
//! After teardown every message is rejected with [`Error::SessionClosed`]
//! before anything is read or written, so late ticks and load callbacks
//! cannot touch the detached surface.

use crate::{
    catalog::{MediaOrigin, QualityCatalog, TemplateOrigin},
    config::{ConfigOverride, ControllerConfig},
    device::{DeviceProfile, DeviceProfiler, EnvironmentSnapshot},
    engine::{Decision, QualityDecisionEngine, SwitchInFlight},
    error::MediaErrorKind,
    health::{BufferHealthMonitor, HealthTransition, StallSignal},
    metrics::SessionMetrics,
    surface::{MediaEvent, RenderingSurface},
    switcher::{SourceSwitchCoordinator, SwitchOutcome},
    types::{
        HealthState, PlaybackState, QualityVariant, SessionId, SwitchReason, SwitchRequest,
        TelemetryFrame, VariantId,
    },
    Error, Result,
};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Host-facing callbacks. Presentation only; every method defaults to a
/// no-op.
pub trait PlaybackObserver: Send {
    fn on_quality_changed(&mut self, _variant: &QualityVariant) {}
    fn on_playback_error(&mut self, _terminal: bool, _message: &str) {}
    fn on_health_state_changed(&mut self, _state: HealthState) {}
}

/// Observer callbacks as values
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    QualityChanged(VariantId),
    PlaybackError { terminal: bool, message: String },
    HealthStateChanged(HealthState),
}

/// Forwards callbacks into a channel
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: ControllerEvent) {
        // Receiver gone means nobody is listening
        let _ = self.tx.send(event);
    }
}

impl PlaybackObserver for ChannelObserver {
    fn on_quality_changed(&mut self, variant: &QualityVariant) {
        self.forward(ControllerEvent::QualityChanged(variant.id.clone()));
    }

    fn on_playback_error(&mut self, terminal: bool, message: &str) {
        self.forward(ControllerEvent::PlaybackError {
            terminal,
            message: message.to_string(),
        });
    }

    fn on_health_state_changed(&mut self, state: HealthState) {
        self.forward(ControllerEvent::HealthStateChanged(state));
    }
}

/// Everything the controller reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerMessage {
    /// Sampling tick; `now_ms` is monotonic session time
    Tick { now_ms: u64 },
    /// Event from the rendering surface
    Media(MediaEvent),
    /// Override pushed over the telemetry channel
    ConfigPushed(ConfigOverride),
    /// Host pins a variant
    SelectVariant(VariantId),
    /// User retry after a terminal error
    Retry,
    /// Session end
    Teardown,
}

/// Adaptive playback controller for one session
pub struct PlaybackController<S: RenderingSurface> {
    session_id: SessionId,
    config: ControllerConfig,
    profile: DeviceProfile,
    catalog: QualityCatalog,
    monitor: BufferHealthMonitor,
    engine: QualityDecisionEngine,
    switcher: SourceSwitchCoordinator,
    surface: S,
    state: PlaybackState,
    metrics: SessionMetrics,
    observers: Vec<Box<dyn PlaybackObserver>>,
    now_ms: u64,
    started: bool,
    torn_down: bool,
}

impl<S: RenderingSurface> PlaybackController<S> {
    /// Build a controller resolving sources from the catalog's URL template
    pub fn new(config: ControllerConfig, env: EnvironmentSnapshot, surface: S) -> Result<Self> {
        let origin = TemplateOrigin::new(config.catalog.source_template.clone());
        Self::with_origin(config, env, surface, &origin)
    }

    /// Build a controller with a custom media origin
    pub fn with_origin(
        config: ControllerConfig,
        env: EnvironmentSnapshot,
        surface: S,
        origin: &dyn MediaOrigin,
    ) -> Result<Self> {
        config.validate()?;
        let catalog = QualityCatalog::from_config(&config.catalog, origin)?;
        let profile = DeviceProfiler::new(env).profile();
        let initial = catalog.initial_variant(&profile).id.clone();

        let session_id = SessionId::new();
        info!(
            session = %session_id,
            tier = %profile.tier,
            class = %profile.class,
            score = profile.score,
            initial = %initial,
            "Playback controller created"
        );

        Ok(Self {
            session_id,
            monitor: BufferHealthMonitor::from_config(&config),
            engine: QualityDecisionEngine::new(initial.clone(), &config),
            switcher: SourceSwitchCoordinator::new(),
            state: PlaybackState::new(initial),
            metrics: SessionMetrics::default(),
            observers: Vec::new(),
            now_ms: 0,
            started: false,
            torn_down: false,
            config,
            profile,
            catalog,
            surface,
        })
    }

    pub fn add_observer(&mut self, observer: Box<dyn PlaybackObserver>) {
        self.observers.push(observer);
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn catalog(&self) -> &QualityCatalog {
        &self.catalog
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn health(&self) -> HealthState {
        self.monitor.state()
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Direct surface access for hosts and tests; never used to change the
    /// source
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn is_switching(&self) -> bool {
        self.engine.is_switching()
    }

    /// Fallback chain exhausted; waiting for a retry
    pub fn is_halted(&self) -> bool {
        self.engine.is_halted()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Load the initial variant. Playback starts once ready when autoplay is
    /// configured.
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub fn start(&mut self) -> Result<()> {
        if self.torn_down {
            return Err(Error::SessionClosed);
        }
        if self.started {
            debug!("Controller already started");
            return Ok(());
        }
        self.started = true;
        self.state.play_intent = self.config.autoplay;

        let request = self.engine.begin_initial_load();
        let outcome = self
            .switcher
            .execute(request, &self.state, &self.catalog, &mut self.surface);
        self.handle_outcome(outcome);
        Ok(())
    }

    /// Apply one message
    pub fn dispatch(&mut self, message: ControllerMessage) -> Result<()> {
        if self.torn_down {
            debug!(?message, "Message after teardown dropped");
            return Err(Error::SessionClosed);
        }

        match message {
            ControllerMessage::Tick { now_ms } => self.on_tick(now_ms),
            ControllerMessage::Media(event) => self.on_media_event(event),
            ControllerMessage::ConfigPushed(patch) => self.apply_override(&patch),
            ControllerMessage::SelectVariant(id) => self.select_variant(id),
            ControllerMessage::Retry => self.retry(),
            ControllerMessage::Teardown => self.teardown(),
        }
    }

    /// Frame for the telemetry reporter; `None` without a playback target
    pub fn telemetry_frame(&self) -> Option<TelemetryFrame> {
        if self.torn_down {
            return None;
        }
        let snapshot = self.surface.snapshot()?;
        Some(TelemetryFrame {
            session_id: self.session_id,
            timestamp: Utc::now(),
            buffer_level: snapshot.buffered_ahead_secs,
            playback_rate: snapshot.playback_rate,
            ready_state: snapshot.ready_state,
            network_state: snapshot.network_state,
            current_time: snapshot.current_time,
            duration: snapshot.duration.or(self.state.duration_secs),
            variant: self.state.variant.clone(),
            health: self.monitor.state(),
            rebuffer_events: self.monitor.rebuffer_event_count(),
            last_switch_at_ms: self.engine.last_switch_at_ms(),
            metrics: self.metrics.clone(),
        })
    }

    fn on_tick(&mut self, now_ms: u64) -> Result<()> {
        self.now_ms = now_ms;
        let switching = self.switcher.is_pending();

        let snapshot = self.surface.snapshot();
        if let Some(snapshot) = snapshot.as_ref().filter(|_| !switching) {
            self.state.position_secs = snapshot.current_time;
            if snapshot.duration.is_some() {
                self.state.duration_secs = snapshot.duration;
            }
        }

        // A loading source is not a playback target
        let sample = snapshot.filter(|_| !switching).map(|s| s.to_sample(now_ms));
        let transition = self.monitor.sample(sample.as_ref());
        if sample.is_none() {
            return Ok(());
        }
        self.after_health_sample(transition);
        Ok(())
    }

    fn on_media_event(&mut self, event: MediaEvent) -> Result<()> {
        let switching = self.switcher.is_pending();
        match event {
            MediaEvent::CanPlay => {
                if switching {
                    let outcome = self.switcher.on_ready(&mut self.surface);
                    self.handle_outcome(outcome);
                }
            }
            MediaEvent::Playing if !switching => self.state.play_intent = true,
            MediaEvent::Paused if !switching => self.state.play_intent = false,
            MediaEvent::Stalled | MediaEvent::Waiting => {
                self.metrics.stall_signals += 1;
                if switching {
                    debug!(?event, "Stall signal during source switch ignored");
                } else {
                    let signal = if event == MediaEvent::Stalled {
                        StallSignal::Stalled
                    } else {
                        StallSignal::Waiting
                    };
                    let transition = self.monitor.force_starved(signal);
                    self.after_health_sample(transition);
                }
            }
            MediaEvent::Error { code } => self.on_media_error(MediaErrorKind::from_code(code)),
            MediaEvent::TimeUpdate { current_time } if !switching => {
                self.state.position_secs = current_time;
            }
            MediaEvent::DurationChange { duration } => self.state.duration_secs = Some(duration),
            _ => {}
        }
        Ok(())
    }

    fn on_media_error(&mut self, kind: MediaErrorKind) {
        if self.switcher.is_pending() {
            let outcome = self.switcher.on_error(kind, &self.catalog, &mut self.surface);
            self.handle_outcome(outcome);
            return;
        }

        if self.engine.is_halted() {
            debug!(kind = %kind, "Media error while halted ignored");
            return;
        }

        // The playing source failed: walk the rest of its fallback chain
        warn!(variant = %self.state.variant, kind = %kind, "Current source failed");
        let chain: Vec<VariantId> = self
            .catalog
            .fallback_chain(&self.state.variant)
            .into_iter()
            .skip(1)
            .collect();

        let Some(first) = chain.first().cloned() else {
            self.engine.on_switch_exhausted();
            self.report_exhausted(1, kind);
            return;
        };

        if let Some(request) = self.engine.recover(first, self.state.position_secs) {
            self.metrics.fallbacks += 1;
            let outcome = self.switcher.execute_with_chain(
                request,
                chain,
                &self.state,
                &self.catalog,
                &mut self.surface,
            );
            self.handle_outcome(outcome);
        }
    }

    fn select_variant(&mut self, id: VariantId) -> Result<()> {
        if self.catalog.get(&id).is_none() {
            return Err(Error::UnknownVariant(id));
        }
        if let Some(request) = self
            .engine
            .request(id, self.state.position_secs, SwitchReason::Manual)
        {
            self.execute(request);
        }
        Ok(())
    }

    fn retry(&mut self) -> Result<()> {
        let Some(request) = self.engine.retry(&self.catalog, self.state.position_secs) else {
            return Ok(());
        };
        info!(target = %request.target, "Manual retry");
        self.metrics.retries += 1;
        self.state.play_intent = true;
        self.execute(request);
        Ok(())
    }

    fn apply_override(&mut self, patch: &ConfigOverride) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        match self.config.merge(patch) {
            Ok(()) => {
                self.monitor
                    .set_watermarks(self.config.low_watermark_secs, self.config.high_watermark_secs);
                self.engine.apply_config(&self.config);
                info!(?patch, "Configuration override applied");
            }
            Err(e) => warn!(error = %e, ?patch, "Configuration override rejected"),
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        self.torn_down = true;
        self.switcher.cancel();
        self.engine.cancel();
        info!(
            session = %self.session_id,
            variant = %self.state.variant,
            qoe = self.metrics.qoe_score(),
            "Playback session torn down"
        );
        Ok(())
    }

    fn after_health_sample(&mut self, transition: Option<HealthTransition>) {
        self.metrics.rebuffer_events = self.monitor.rebuffer_event_count();
        if let Some(t) = transition {
            self.notify(|o| o.on_health_state_changed(t.to));
        }

        let report = self.monitor.report(transition);
        if let Decision::Switch(request) =
            self.engine
                .evaluate(&self.catalog, &report, self.state.position_secs)
        {
            self.execute(request);
        }
    }

    fn execute(&mut self, request: SwitchRequest) {
        let outcome = self
            .switcher
            .execute(request, &self.state, &self.catalog, &mut self.surface);
        self.handle_outcome(outcome);
    }

    fn handle_outcome(&mut self, outcome: SwitchOutcome) {
        match outcome {
            SwitchOutcome::Loading { attempt, .. } => {
                if attempt > 1 {
                    self.metrics.fallbacks += 1;
                }
            }
            SwitchOutcome::Completed {
                variant,
                resumed_at,
                resumed,
            } => {
                let reason = match self.engine.in_flight() {
                    SwitchInFlight::Pending(request) => Some(request.reason),
                    _ => None,
                };
                self.engine.on_switch_completed(variant.clone(), self.now_ms);
                if reason != Some(SwitchReason::Initial) {
                    self.metrics.quality_switches += 1;
                }

                self.state.variant = variant;
                self.state.position_secs = resumed_at;
                self.state.play_intent = resumed;

                if let Some(variant) = self.catalog.get(&self.state.variant).cloned() {
                    self.notify(|o| o.on_quality_changed(&variant));
                }

                // Health measured on the old source does not carry over
                if let Some(t) = self.monitor.rebaseline() {
                    self.notify(|o| o.on_health_state_changed(t.to));
                }
            }
            SwitchOutcome::Exhausted { attempted, kind } => {
                self.engine.on_switch_exhausted();
                self.report_exhausted(attempted, kind);
            }
            SwitchOutcome::Ignored => {}
        }
    }

    fn report_exhausted(&mut self, attempted: usize, kind: MediaErrorKind) {
        self.metrics.terminal_errors += 1;
        let err = Error::FallbackExhausted { attempted, kind };
        error!(code = err.error_code(), error = %err, "Playback failed");
        let message = kind.describe();
        self.notify(|o| o.on_playback_error(true, message));
    }

    fn notify(&mut self, mut f: impl FnMut(&mut dyn PlaybackObserver)) {
        for observer in self.observers.iter_mut() {
            f(observer.as_mut());
        }
    }
}
