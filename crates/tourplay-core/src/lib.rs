//! Tourplay Core - Adaptive playback controller for Tourplay
//!
//! This crate decides which quality variant of a media asset to play and
//! when to switch:
//! - One-shot device profiling for the initial variant
//! - Sub-second buffer health monitoring
//! - Hysteresis-based downgrade (and optional upgrade) decisions
//! - In-place source switching with position/intent preservation and a
//!   fallback chain
//! - Best-effort telemetry with server-pushed configuration overrides
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Tourplay Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Device    │  │   Quality    │  │    Buffer    │           │
//! │  │   Profiler   │─▶│   Catalog    │  │    Health    │           │
//! │  └──────────────┘  └──────┬───────┘  └──────┬───────┘           │
//! │                           │                 │                   │
//! │                    ┌──────┴─────────────────┴──────┐            │
//! │                    │   Quality Decision Engine     │            │
//! │                    └──────────────┬────────────────┘            │
//! │                                   │                             │
//! │  ┌──────────────┐  ┌──────────────┴──┐  ┌──────────────┐        │
//! │  │  Telemetry   │◀─│    Playback     │─▶│ Source Switch│        │
//! │  │  Reporter    │─▶│   Controller    │  │ Coordinator  │        │
//! │  └──────────────┘  └─────────────────┘  └──────┬───────┘        │
//! │                                                │                │
//! │                                      ┌─────────┴──────┐         │
//! │                                      │Rendering Surface│        │
//! │                                      └────────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod device;
pub mod catalog;
pub mod health;
pub mod engine;
pub mod surface;
pub mod switcher;
pub mod telemetry;
pub mod controller;
pub mod session;
pub mod metrics;

pub use error::{Error, MediaErrorKind, Result};
pub use types::*;
pub use config::{CatalogConfig, ConfigOverride, ControllerConfig, VariantSpec};
pub use device::{ConnectionInfo, DeviceProfile, DeviceProfiler, EffectiveType, EnvironmentSnapshot};
pub use catalog::{Direction, MediaOrigin, QualityCatalog, TemplateOrigin};
pub use health::{BufferHealthMonitor, HealthReport, HealthTransition, StallSignal};
pub use engine::{Decision, QualityDecisionEngine, SwitchInFlight};
pub use surface::{MediaEvent, RenderingSurface, SimulatedSurface, SurfaceCall, SurfaceError, SurfaceSnapshot};
pub use switcher::{SourceSwitchCoordinator, SwitchOutcome};
pub use telemetry::{
    BeaconConnector, InboundMessage, MemoryConnector, MemoryServer, ReporterExit, TelemetryChannel,
    TelemetryConnector, TelemetryReporter,
};
pub use controller::{ChannelObserver, ControllerEvent, ControllerMessage, PlaybackController, PlaybackObserver};
pub use session::{PlaybackSession, SessionHandle};
pub use metrics::SessionMetrics;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
pub fn init() {
    tracing::info!(version = VERSION, "Tourplay Core initialized");
}
