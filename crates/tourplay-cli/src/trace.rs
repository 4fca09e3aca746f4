//! Playback trace replay
//!
//! A trace is a JSON document describing the host environment and a timed
//! list of actions against a simulated surface. Replay runs the controller
//! synchronously on a virtual clock, one sampling tick per configured
//! interval, applying every action due at or before each tick first.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tourplay_core::{
    ChannelObserver, ConfigOverride, ControllerConfig, ControllerEvent, ControllerMessage, EnvironmentSnapshot,
    HealthState, MediaEvent, PlaybackController, ReadyState, SessionMetrics, SimulatedSurface, VariantId,
};

/// A scripted playback session
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Trace {
    pub environment: EnvironmentSnapshot,
    /// Variants whose source fails to load
    pub failing_variants: Vec<VariantId>,
    pub block_autoplay: bool,
    pub steps: Vec<TraceStep>,
}

impl Trace {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading trace {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing trace {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceStep {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: TraceAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TraceAction {
    /// Change what the surface reports
    Buffer {
        ahead_secs: f64,
        #[serde(default)]
        ready_state: Option<u8>,
        #[serde(default)]
        playing: Option<bool>,
        #[serde(default)]
        current_time: Option<f64>,
    },
    /// Surface event
    Media { event: MediaEvent },
    /// Host pins a variant
    Select { variant: VariantId },
    /// User retry
    Retry,
    /// Server-pushed override
    Config { patch: ConfigOverride },
}

/// One line of the replay timeline
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub at_ms: u64,
    #[serde(flatten)]
    pub kind: TimelineKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineKind {
    QualityChanged { variant: VariantId },
    HealthChanged { state: HealthState },
    PlaybackError { terminal: bool, message: String },
    Rejected { reason: String },
}

/// Result of a replay
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub initial_variant: VariantId,
    pub final_variant: VariantId,
    pub final_health: HealthState,
    pub halted: bool,
    pub duration_ms: u64,
    pub metrics: SessionMetrics,
    pub qoe_score: f64,
    pub timeline: Vec<TimelineEntry>,
}

/// Run `trace` through a fresh controller
pub fn replay(trace: &Trace, config: ControllerConfig) -> anyhow::Result<SimulationReport> {
    let interval = config.sample_interval_ms;
    let mut surface = SimulatedSurface::new();
    surface.set_block_autoplay(trace.block_autoplay);

    let mut controller = PlaybackController::new(config, trace.environment.clone(), surface)
        .context("building controller")?;
    for id in &trace.failing_variants {
        let variant = controller
            .catalog()
            .get(id)
            .with_context(|| format!("unknown failing variant {id}"))?;
        let source = variant.source.clone();
        controller.surface_mut().fail_source(source);
    }

    let (observer, mut events) = ChannelObserver::new();
    controller.add_observer(Box::new(observer));
    let initial_variant = controller.state().variant.clone();

    let mut steps = trace.steps.clone();
    steps.sort_by_key(|s| s.at_ms);
    let end_ms = steps.last().map(|s| s.at_ms).unwrap_or(0) + interval;

    let mut timeline = Vec::new();
    controller.start()?;
    collect(&mut events, 0, &mut timeline);

    let mut pending = steps.into_iter().peekable();
    let mut now_ms = 0;
    while now_ms <= end_ms {
        while let Some(step) = pending.next_if(|s| s.at_ms <= now_ms) {
            if let Err(e) = apply(&mut controller, step.action) {
                timeline.push(TimelineEntry {
                    at_ms: step.at_ms,
                    kind: TimelineKind::Rejected { reason: e.to_string() },
                });
            }
            collect(&mut events, step.at_ms, &mut timeline);
        }
        controller.dispatch(ControllerMessage::Tick { now_ms })?;
        collect(&mut events, now_ms, &mut timeline);
        now_ms += interval;
    }

    controller.dispatch(ControllerMessage::Teardown)?;

    Ok(SimulationReport {
        initial_variant,
        final_variant: controller.state().variant.clone(),
        final_health: controller.health(),
        halted: controller.is_halted(),
        duration_ms: end_ms,
        metrics: controller.metrics().clone(),
        qoe_score: controller.metrics().qoe_score(),
        timeline,
    })
}

fn apply(controller: &mut PlaybackController<SimulatedSurface>, action: TraceAction) -> tourplay_core::Result<()> {
    match action {
        TraceAction::Buffer {
            ahead_secs,
            ready_state,
            playing,
            current_time,
        } => {
            let surface = controller.surface_mut();
            surface.set_buffered_ahead(ahead_secs);
            if let Some(rs) = ready_state {
                surface.set_ready_state(ReadyState::from_u8(rs));
            }
            if let Some(playing) = playing {
                surface.set_playing(playing);
            }
            if let Some(t) = current_time {
                surface.set_current_time(t);
            }
            Ok(())
        }
        TraceAction::Media { event } => {
            let surface = controller.surface_mut();
            match &event {
                MediaEvent::CanPlay => surface.set_ready_state(ReadyState::HaveEnoughData),
                MediaEvent::TimeUpdate { current_time } => surface.set_current_time(*current_time),
                MediaEvent::DurationChange { duration } => surface.set_duration(Some(*duration)),
                _ => {}
            }
            controller.dispatch(ControllerMessage::Media(event))
        }
        TraceAction::Select { variant } => controller.dispatch(ControllerMessage::SelectVariant(variant)),
        TraceAction::Retry => controller.dispatch(ControllerMessage::Retry),
        TraceAction::Config { patch } => controller.dispatch(ControllerMessage::ConfigPushed(patch)),
    }
}

fn collect(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<ControllerEvent>,
    at_ms: u64,
    timeline: &mut Vec<TimelineEntry>,
) {
    while let Ok(event) = events.try_recv() {
        let kind = match event {
            ControllerEvent::QualityChanged(variant) => TimelineKind::QualityChanged { variant },
            ControllerEvent::HealthStateChanged(state) => TimelineKind::HealthChanged { state },
            ControllerEvent::PlaybackError { terminal, message } => TimelineKind::PlaybackError { terminal, message },
        };
        timeline.push(TimelineEntry { at_ms, kind });
    }
}
