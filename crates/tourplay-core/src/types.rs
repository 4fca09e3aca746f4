//! Core types for Tourplay

use crate::metrics::SessionMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a quality variant (`low`, `mobile`, `standard`, `highperf`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(String);

impl VariantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VariantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for VariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns quality tier name
    pub fn quality_name(&self) -> &'static str {
        match self.height {
            0..=240 => "240p",
            241..=360 => "360p",
            361..=480 => "480p",
            481..=720 => "720p",
            721..=1080 => "1080p",
            1081..=1440 => "1440p",
            _ => "4K",
        }
    }

    pub const SD_360P: Resolution = Resolution { width: 640, height: 360 };
    pub const SD_480P: Resolution = Resolution { width: 854, height: 480 };
    pub const HD_720P: Resolution = Resolution { width: 1280, height: 720 };
    pub const FHD_1080P: Resolution = Resolution { width: 1920, height: 1080 };
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One independently loadable encoding of the media asset.
///
/// Variants are created by the catalog at startup and never change
/// during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVariant {
    /// Variant name
    pub id: VariantId,
    /// Where the rendering surface loads this variant from
    pub source: Url,
    /// Nominal resolution ceiling
    pub max_resolution: Resolution,
}

/// Coarse performance tier of the host device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTier {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for DeviceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceTier::Low => write!(f, "low"),
            DeviceTier::Medium => write!(f, "medium"),
            DeviceTier::High => write!(f, "high"),
        }
    }
}

/// Form factor of the host device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceClass {
    /// Phones and tablets
    pub fn is_handheld(&self) -> bool {
        matches!(self, DeviceClass::Mobile | DeviceClass::Tablet)
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Mobile => write!(f, "mobile"),
            DeviceClass::Tablet => write!(f, "tablet"),
            DeviceClass::Desktop => write!(f, "desktop"),
        }
    }
}

/// Media ready state as reported by the rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

impl ReadyState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::HaveNothing,
            1 => ReadyState::HaveMetadata,
            2 => ReadyState::HaveCurrentData,
            3 => ReadyState::HaveFutureData,
            _ => ReadyState::HaveEnoughData,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Enough data to keep playing past the current frame
    pub fn can_play(&self) -> bool {
        *self >= ReadyState::HaveFutureData
    }
}

/// Network state as reported by the rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Empty,
    Idle,
    Loading,
    NoSource,
}

/// A single buffer observation. Produced every sampling tick and consumed
/// immediately by the health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferSample {
    /// Seconds buffered ahead of the playhead
    pub buffered_ahead_secs: f64,
    pub ready_state: ReadyState,
    pub is_playing: bool,
    /// The whole asset is already buffered
    pub fully_buffered: bool,
    pub timestamp_ms: u64,
}

/// Coarse playback runway classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    AtRisk,
    Starved,
}

impl HealthState {
    pub fn is_unhealthy(&self) -> bool {
        !matches!(self, HealthState::Healthy)
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::AtRisk => write!(f, "at_risk"),
            HealthState::Starved => write!(f, "starved"),
        }
    }
}

/// Why a variant switch was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    /// First load of the session
    Initial,
    /// Buffer starvation forced a drop to the safe variant
    Downgrade,
    /// Sustained health allowed one step up
    Upgrade,
    /// Host pinned a variant
    Manual,
    /// Current source failed mid-playback
    Fallback,
    /// User retried after a terminal error
    Retry,
}

/// A single variant change, consumed once by the switch coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchRequest {
    pub target: VariantId,
    /// Position captured when the request was created
    pub resume_from_secs: f64,
    /// Rewind applied before resuming
    pub resume_backoff_secs: f64,
    pub reason: SwitchReason,
}

impl SwitchRequest {
    /// Position to seek to once the new source is ready
    pub fn resume_position(&self) -> f64 {
        (self.resume_from_secs - self.resume_backoff_secs).max(0.0)
    }
}

/// Mutable playback state, owned by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub variant: VariantId,
    pub position_secs: f64,
    /// Whether the viewer wants playback running
    pub play_intent: bool,
    pub duration_secs: Option<f64>,
}

impl PlaybackState {
    pub fn new(variant: VariantId) -> Self {
        Self {
            variant,
            position_secs: 0.0,
            play_intent: false,
            duration_secs: None,
        }
    }
}

/// Periodic telemetry report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub buffer_level: f64,
    pub playback_rate: f64,
    pub ready_state: ReadyState,
    pub network_state: NetworkState,
    pub current_time: f64,
    pub duration: Option<f64>,
    pub variant: VariantId,
    pub health: HealthState,
    pub rebuffer_events: u32,
    /// Session time of the last completed source change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_switch_at_ms: Option<u64>,
    pub metrics: SessionMetrics,
}
