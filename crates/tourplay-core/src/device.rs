//! Device profiling
//!
//! One-shot, best-effort classification of the host into a performance tier
//! and a form factor. The result only picks the *initial* variant; live
//! buffer health always takes precedence once playback starts.
//!
//! Scoring:
//! - cores: +3 (>= 8), +2 (>= 4), +1 (>= 2)
//! - memory: +3 (>= 8 GB), +2 (>= 4 GB), +1 (>= 2 GB)
//! - pixel ratio: +2 (>= 3), +1 (>= 2)
//! - battery below 15%: -1
//! - save-data, 2G-class connection or downlink below 1 Mbps: -2
//! - mobile OS: -1, old/low-end phone: a further -1
//!
//! Score >= 4 is `high`, >= 1 is `medium`, anything else `low`.

use crate::types::{DeviceClass, DeviceTier};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment signals captured once at mount.
///
/// Every field is optional; a missing signal contributes nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSnapshot {
    /// Logical CPU cores
    pub logical_cores: Option<u32>,
    /// Reported device memory in GB
    pub device_memory_gb: Option<f64>,
    /// Device pixel ratio
    pub pixel_ratio: Option<f64>,
    /// Network information
    pub connection: Option<ConnectionInfo>,
    /// Battery charge, 0.0 - 1.0
    pub battery_level: Option<f64>,
    /// User agent string
    pub user_agent: Option<String>,
}

/// Network information reported by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionInfo {
    pub effective_type: Option<EffectiveType>,
    /// Estimated downlink in Mbps
    pub downlink_mbps: Option<f64>,
    pub save_data: bool,
}

/// Effective connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
}

impl EffectiveType {
    pub fn is_2g_class(&self) -> bool {
        matches!(self, EffectiveType::Slow2g | EffectiveType::TwoG)
    }
}

impl ConnectionInfo {
    /// Save-data, 2G-class or sub-1 Mbps links
    pub fn is_constrained(&self) -> bool {
        self.save_data
            || self.effective_type.map(|t| t.is_2g_class()).unwrap_or(false)
            || self.downlink_mbps.map(|d| d < 1.0).unwrap_or(false)
    }
}

/// Result of a classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub tier: DeviceTier,
    pub class: DeviceClass,
    /// Raw heuristic score
    pub score: i32,
    /// Reported memory, kept for the catalog's high-memory override
    pub memory_gb: Option<f64>,
}

/// Signals derived from the user agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct AgentSignals {
    mobile_os: bool,
    tablet: bool,
    low_end_phone: bool,
}

/// Device classifier over an injected environment snapshot
#[derive(Debug, Clone)]
pub struct DeviceProfiler {
    env: EnvironmentSnapshot,
}

impl DeviceProfiler {
    pub fn new(env: EnvironmentSnapshot) -> Self {
        Self { env }
    }

    /// Classify into `(tier, class)`
    pub fn classify(&self) -> (DeviceTier, DeviceClass) {
        let profile = self.profile();
        (profile.tier, profile.class)
    }

    /// Full classification including the raw score
    pub fn profile(&self) -> DeviceProfile {
        let agent = self
            .env
            .user_agent
            .as_deref()
            .map(parse_user_agent)
            .unwrap_or_default();

        let score = self.score(&agent);
        let tier = match score {
            s if s >= 4 => DeviceTier::High,
            s if s >= 1 => DeviceTier::Medium,
            _ => DeviceTier::Low,
        };
        let class = if agent.tablet {
            DeviceClass::Tablet
        } else if agent.mobile_os {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        };

        debug!(score, tier = %tier, class = %class, "Device classified");

        DeviceProfile {
            tier,
            class,
            score,
            memory_gb: self.env.device_memory_gb,
        }
    }

    fn score(&self, agent: &AgentSignals) -> i32 {
        let mut score = 0;

        score += match self.env.logical_cores {
            Some(c) if c >= 8 => 3,
            Some(c) if c >= 4 => 2,
            Some(c) if c >= 2 => 1,
            _ => 0,
        };

        score += match self.env.device_memory_gb {
            Some(m) if m >= 8.0 => 3,
            Some(m) if m >= 4.0 => 2,
            Some(m) if m >= 2.0 => 1,
            _ => 0,
        };

        score += match self.env.pixel_ratio {
            Some(r) if r >= 3.0 => 2,
            Some(r) if r >= 2.0 => 1,
            _ => 0,
        };

        if matches!(self.env.battery_level, Some(level) if level < 0.15) {
            score -= 1;
        }

        if self.env.connection.as_ref().map(|c| c.is_constrained()).unwrap_or(false) {
            score -= 2;
        }

        if agent.mobile_os {
            score -= 1;
            if agent.low_end_phone {
                score -= 1;
            }
        }

        score
    }
}

fn parse_user_agent(ua: &str) -> AgentSignals {
    let ua = ua.to_lowercase();

    let ipad = ua.contains("ipad");
    let iphone = ua.contains("iphone") || ua.contains("ipod");
    let android = ua.contains("android");

    let tablet = ipad || ua.contains("tablet") || (android && !ua.contains("mobile"));
    let mobile_os = ipad || iphone || android || ua.contains("mobi");

    // Android < 8 or iOS < 13 handsets
    let low_end_phone = !tablet
        && (version_after(&ua, "android ").map(|v| v < 8).unwrap_or(false)
            || version_after(&ua, "iphone os ").map(|v| v < 13).unwrap_or(false));

    AgentSignals {
        mobile_os,
        tablet,
        low_end_phone,
    }
}

/// Major version number following `marker`, e.g. `android 7.1` -> 7
fn version_after(ua: &str, marker: &str) -> Option<u32> {
    let start = ua.find(marker)? + marker.len();
    let digits: String = ua[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESKTOP_UA: &str =
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
    const OLD_ANDROID_UA: &str =
        "Mozilla/5.0 (Linux; Android 7.0; SM-J330F) AppleWebKit/537.36 Chrome/64.0 Mobile Safari/537.36";
    const IPAD_UA: &str =
        "Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X) AppleWebKit/605.1.15 Version/16.0 Safari/604.1";

    #[test]
    fn test_high_tier_desktop() {
        let profiler = DeviceProfiler::new(EnvironmentSnapshot {
            logical_cores: Some(8),
            device_memory_gb: Some(8.0),
            pixel_ratio: Some(2.0),
            ..Default::default()
        });
        assert_eq!(profiler.classify(), (DeviceTier::High, DeviceClass::Desktop));
        assert_eq!(profiler.profile().score, 7);
    }

    #[test]
    fn test_low_tier_save_data() {
        let profiler = DeviceProfiler::new(EnvironmentSnapshot {
            logical_cores: Some(2),
            device_memory_gb: Some(2.0),
            connection: Some(ConnectionInfo {
                save_data: true,
                ..Default::default()
            }),
            ..Default::default()
        });
        let profile = profiler.profile();
        assert_eq!(profile.score, 0);
        assert_eq!(profile.tier, DeviceTier::Low);
    }

    #[test]
    fn test_connection_penalty_applied_once() {
        let connection = ConnectionInfo {
            effective_type: Some(EffectiveType::TwoG),
            downlink_mbps: Some(0.4),
            save_data: true,
        };
        let profiler = DeviceProfiler::new(EnvironmentSnapshot {
            logical_cores: Some(4),
            device_memory_gb: Some(4.0),
            connection: Some(connection),
            ..Default::default()
        });
        assert_eq!(profiler.profile().score, 2);
    }

    #[test]
    fn test_old_phone_penalties() {
        let profiler = DeviceProfiler::new(EnvironmentSnapshot {
            logical_cores: Some(4),
            device_memory_gb: Some(2.0),
            pixel_ratio: Some(2.0),
            battery_level: Some(0.10),
            user_agent: Some(OLD_ANDROID_UA.to_string()),
            ..Default::default()
        });
        // 2 + 1 + 1 - 1 (battery) - 1 (mobile) - 1 (old phone)
        let profile = profiler.profile();
        assert_eq!(profile.score, 1);
        assert_eq!(profile.tier, DeviceTier::Medium);
        assert_eq!(profile.class, DeviceClass::Mobile);
    }

    #[test]
    fn test_tablet_detection() {
        let profiler = DeviceProfiler::new(EnvironmentSnapshot {
            user_agent: Some(IPAD_UA.to_string()),
            ..Default::default()
        });
        assert_eq!(profiler.classify().1, DeviceClass::Tablet);

        let profiler = DeviceProfiler::new(EnvironmentSnapshot {
            user_agent: Some(DESKTOP_UA.to_string()),
            ..Default::default()
        });
        assert_eq!(profiler.classify().1, DeviceClass::Desktop);
    }

    #[test]
    fn test_empty_snapshot_is_low() {
        let profiler = DeviceProfiler::new(EnvironmentSnapshot::default());
        assert_eq!(profiler.classify(), (DeviceTier::Low, DeviceClass::Desktop));
    }

    #[test]
    fn test_snapshot_json() {
        let json = r#"{
            "logical_cores": 4,
            "connection": { "effective_type": "slow-2g" }
        }"#;
        let env: EnvironmentSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(env.logical_cores, Some(4));
        assert!(env.connection.unwrap().is_constrained());
    }
}
