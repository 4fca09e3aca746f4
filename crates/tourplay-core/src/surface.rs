//! Rendering surface interface
//!
//! The controller never decodes media. It drives an external surface through
//! [`RenderingSurface`] and learns about its progress from [`MediaEvent`]s.
//! [`SimulatedSurface`] is a scriptable in-process implementation used by the
//! CLI trace replay, the benches and the tests.

use crate::types::{BufferSample, NetworkState, ReadyState};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors reported synchronously by a surface call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    /// Playback needs a user gesture. Expected on many hosts; not a failure.
    #[error("autoplay was rejected by the host")]
    AutoplayRejected,

    #[error("surface is detached")]
    Detached,

    #[error("source could not be loaded: {0}")]
    Load(String),
}

/// Point-in-time view of the surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSnapshot {
    pub buffered_ahead_secs: f64,
    pub ready_state: ReadyState,
    pub network_state: NetworkState,
    pub current_time: f64,
    pub duration: Option<f64>,
    pub playback_rate: f64,
    pub paused: bool,
    pub fully_buffered: bool,
}

impl SurfaceSnapshot {
    /// Buffer sample for the health monitor
    pub fn to_sample(&self, timestamp_ms: u64) -> BufferSample {
        BufferSample {
            buffered_ahead_secs: self.buffered_ahead_secs,
            ready_state: self.ready_state,
            is_playing: !self.paused,
            fully_buffered: self.fully_buffered,
            timestamp_ms,
        }
    }
}

/// Events emitted by the surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MediaEvent {
    /// The loaded source can start playing
    CanPlay,
    Playing,
    Paused,
    /// Download stopped making progress
    Stalled,
    /// Playback is waiting for data
    Waiting,
    /// Media error with the surface's numeric code
    Error { code: u16 },
    TimeUpdate { current_time: f64 },
    DurationChange { duration: f64 },
    /// Presentation only; ignored by the controller
    VolumeChange,
}

/// An externally owned media element.
///
/// Only the switch coordinator calls `load`.
pub trait RenderingSurface: Send {
    fn load(&mut self, source: &Url) -> Result<(), SurfaceError>;
    fn play(&mut self) -> Result<(), SurfaceError>;
    fn pause(&mut self);
    fn seek(&mut self, seconds: f64);
    /// `None` when no playback target is attached
    fn snapshot(&self) -> Option<SurfaceSnapshot>;
}

/// Call recorded by [`SimulatedSurface`]
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Load(Url),
    Play,
    Pause,
    Seek(f64),
}

/// Scriptable surface that records every call
#[derive(Debug, Clone)]
pub struct SimulatedSurface {
    calls: Vec<SurfaceCall>,
    failing_sources: Vec<Url>,
    block_autoplay: bool,
    detached: bool,
    state: SurfaceSnapshot,
}

impl Default for SimulatedSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSurface {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            failing_sources: Vec::new(),
            block_autoplay: false,
            detached: false,
            state: SurfaceSnapshot {
                buffered_ahead_secs: 0.0,
                ready_state: ReadyState::HaveNothing,
                network_state: NetworkState::Empty,
                current_time: 0.0,
                duration: None,
                playback_rate: 1.0,
                paused: true,
                fully_buffered: false,
            },
        }
    }

    /// Every call made so far
    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<SurfaceCall> {
        std::mem::take(&mut self.calls)
    }

    /// Count of `load` calls
    pub fn load_count(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, SurfaceCall::Load(_))).count()
    }

    /// Make `load` fail synchronously for `source`
    pub fn fail_source(&mut self, source: Url) {
        self.failing_sources.push(source);
    }

    pub fn set_block_autoplay(&mut self, block: bool) {
        self.block_autoplay = block;
    }

    /// Detach the playback target; snapshots become unavailable
    pub fn set_detached(&mut self, detached: bool) {
        self.detached = detached;
    }

    pub fn set_buffered_ahead(&mut self, secs: f64) {
        self.state.buffered_ahead_secs = secs;
    }

    pub fn set_ready_state(&mut self, ready_state: ReadyState) {
        self.state.ready_state = ready_state;
    }

    pub fn set_current_time(&mut self, secs: f64) {
        self.state.current_time = secs;
    }

    pub fn set_duration(&mut self, secs: Option<f64>) {
        self.state.duration = secs;
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.state.paused = !playing;
    }

    pub fn set_fully_buffered(&mut self, fully_buffered: bool) {
        self.state.fully_buffered = fully_buffered;
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn current_time(&self) -> f64 {
        self.state.current_time
    }
}

impl RenderingSurface for SimulatedSurface {
    fn load(&mut self, source: &Url) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::Load(source.clone()));
        if self.detached {
            return Err(SurfaceError::Detached);
        }
        if self.failing_sources.contains(source) {
            self.state.network_state = NetworkState::NoSource;
            return Err(SurfaceError::Load(source.to_string()));
        }
        self.state.buffered_ahead_secs = 0.0;
        self.state.ready_state = ReadyState::HaveNothing;
        self.state.network_state = NetworkState::Loading;
        self.state.current_time = 0.0;
        self.state.paused = true;
        self.state.fully_buffered = false;
        Ok(())
    }

    fn play(&mut self) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::Play);
        if self.block_autoplay {
            return Err(SurfaceError::AutoplayRejected);
        }
        self.state.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.calls.push(SurfaceCall::Pause);
        self.state.paused = true;
    }

    fn seek(&mut self, seconds: f64) {
        self.calls.push(SurfaceCall::Seek(seconds));
        self.state.current_time = seconds;
    }

    fn snapshot(&self) -> Option<SurfaceSnapshot> {
        if self.detached {
            None
        } else {
            Some(self.state)
        }
    }
}
