//! Controller configuration
//!
//! Thresholds, cadences and the variant catalog definition. Loaded from JSON
//! and adjustable at runtime through [`ConfigOverride`] messages pushed over
//! the telemetry channel.

use crate::{types::{Resolution, VariantId}, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Buffer sampling cadence (milliseconds)
    pub sample_interval_ms: u64,
    /// Telemetry reporting cadence (milliseconds)
    pub telemetry_interval_ms: u64,
    /// Buffer below this (seconds) while playing is unhealthy
    pub low_watermark_secs: f64,
    /// Buffer above this (seconds) is healthy
    pub high_watermark_secs: f64,
    /// Rebuffer entries required before the first downgrade
    pub downgrade_threshold: u32,
    /// Consecutive healthy samples required before an upgrade
    pub recovery_threshold: u32,
    /// Rewind applied when resuming after a switch (seconds)
    pub resume_backoff_secs: f64,
    /// Start playing as soon as the first source is ready
    pub autoplay: bool,
    /// Allow stepping back up after sustained health.
    /// Off by default: smooth playback wins over quality.
    pub upgrade_enabled: bool,
    /// Variant catalog definition
    pub catalog: CatalogConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 500,
            telemetry_interval_ms: 5000,
            low_watermark_secs: 1.0,
            high_watermark_secs: 3.0,
            downgrade_threshold: 1,
            recovery_threshold: 10,
            resume_backoff_secs: 0.5,
            autoplay: true,
            upgrade_enabled: false,
            catalog: CatalogConfig::default(),
        }
    }
}

/// Variant catalog definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Source locator template; `{variant}` is replaced by the variant id
    pub source_template: String,
    /// Variants ordered from most conservative to most capable
    pub variants: Vec<VariantSpec>,
    /// Variant for medium-tier desktops
    pub default_variant: VariantId,
    /// Last-resort variant of the fallback chain
    pub baseline_variant: VariantId,
    /// Variant for medium-tier phones and tablets
    pub handheld_variant: Option<VariantId>,
    /// Downgrade target on starvation; the most conservative variant when unset
    pub mobile_safe_variant: Option<VariantId>,
    /// Hosts reporting at least this much memory (GB) start on the most
    /// capable variant regardless of tier
    pub high_memory_gb: f64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            source_template: "https://media.tourplay.dev/tour/{variant}.mp4".to_string(),
            variants: vec![
                VariantSpec::new("low", Resolution::SD_360P),
                VariantSpec::new("mobile", Resolution::SD_480P),
                VariantSpec::new("standard", Resolution::HD_720P),
                VariantSpec::new("highperf", Resolution::FHD_1080P),
            ],
            default_variant: VariantId::new("standard"),
            baseline_variant: VariantId::new("standard"),
            handheld_variant: Some(VariantId::new("mobile")),
            mobile_safe_variant: None,
            high_memory_gb: 16.0,
        }
    }
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    pub id: VariantId,
    pub max_resolution: Resolution,
}

impl VariantSpec {
    pub fn new(id: impl Into<String>, max_resolution: Resolution) -> Self {
        Self {
            id: VariantId::new(id),
            max_resolution,
        }
    }
}

impl ControllerConfig {
    /// Parse configuration from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_ms == 0 || self.telemetry_interval_ms == 0 {
            return Err(Error::InvalidConfig("intervals must be non-zero".into()));
        }
        if !(self.low_watermark_secs >= 0.0 && self.low_watermark_secs < self.high_watermark_secs) {
            return Err(Error::InvalidConfig(format!(
                "low watermark {} must be below high watermark {}",
                self.low_watermark_secs, self.high_watermark_secs
            )));
        }
        if self.downgrade_threshold == 0 {
            return Err(Error::InvalidConfig("downgrade threshold must be at least 1".into()));
        }
        if self.resume_backoff_secs < 0.0 {
            return Err(Error::InvalidConfig("resume backoff must not be negative".into()));
        }
        self.catalog.validate()
    }

    /// Apply an override. Only fields present in the override change; an
    /// override that would produce an invalid configuration is rejected and
    /// leaves `self` untouched.
    pub fn merge(&mut self, patch: &ConfigOverride) -> Result<()> {
        let mut next = self.clone();

        if let Some(v) = patch.low_watermark_secs {
            next.low_watermark_secs = v;
        }
        if let Some(v) = patch.high_watermark_secs {
            next.high_watermark_secs = v;
        }
        if let Some(v) = patch.downgrade_threshold {
            next.downgrade_threshold = v;
        }
        if let Some(v) = patch.recovery_threshold {
            next.recovery_threshold = v;
        }
        if let Some(v) = patch.resume_backoff_secs {
            next.resume_backoff_secs = v;
        }
        if let Some(v) = patch.upgrade_enabled {
            next.upgrade_enabled = v;
        }
        if let Some(v) = patch.telemetry_interval_ms {
            next.telemetry_interval_ms = v;
        }

        next.validate()?;
        debug!(?patch, "Configuration override merged");
        *self = next;
        Ok(())
    }
}

impl CatalogConfig {
    fn validate(&self) -> Result<()> {
        if self.variants.is_empty() {
            return Err(Error::EmptyCatalog);
        }
        if !self.source_template.contains("{variant}") {
            return Err(Error::InvalidConfig(
                "source template must contain {variant}".into(),
            ));
        }
        let known = |id: &VariantId| self.variants.iter().any(|v| &v.id == id);
        for (i, spec) in self.variants.iter().enumerate() {
            if self.variants[..i].iter().any(|v| v.id == spec.id) {
                return Err(Error::InvalidConfig(format!("duplicate variant {}", spec.id)));
            }
        }
        if !known(&self.default_variant) {
            return Err(Error::UnknownVariant(self.default_variant.clone()));
        }
        if !known(&self.baseline_variant) {
            return Err(Error::UnknownVariant(self.baseline_variant.clone()));
        }
        for id in self.handheld_variant.iter().chain(self.mobile_safe_variant.iter()) {
            if !known(id) {
                return Err(Error::UnknownVariant(id.clone()));
            }
        }
        Ok(())
    }
}

/// Partial configuration pushed by the telemetry server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverride {
    pub low_watermark_secs: Option<f64>,
    pub high_watermark_secs: Option<f64>,
    pub downgrade_threshold: Option<u32>,
    pub recovery_threshold: Option<u32>,
    pub resume_backoff_secs: Option<f64>,
    pub upgrade_enabled: Option<bool>,
    pub telemetry_interval_ms: Option<u64>,
}

impl ConfigOverride {
    pub fn is_empty(&self) -> bool {
        *self == ConfigOverride::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.sample_interval_ms, 500);
        assert_eq!(config.telemetry_interval_ms, 5000);
        assert_eq!(config.low_watermark_secs, 1.0);
        assert_eq!(config.high_watermark_secs, 3.0);
        assert_eq!(config.downgrade_threshold, 1);
        assert_eq!(config.recovery_threshold, 10);
        assert!(!config.upgrade_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = ControllerConfig::from_json_str(r#"{ "upgrade_enabled": true }"#).unwrap();
        assert!(config.upgrade_enabled);
        assert_eq!(config.catalog.variants.len(), 4);
    }

    #[test]
    fn test_invalid_watermarks_rejected() {
        let result = ControllerConfig::from_json_str(
            r#"{ "low_watermark_secs": 4.0, "high_watermark_secs": 3.0 }"#,
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_baseline_rejected() {
        let mut config = ControllerConfig::default();
        config.catalog.baseline_variant = VariantId::new("ultra");
        assert!(matches!(config.validate(), Err(Error::UnknownVariant(_))));
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut config = ControllerConfig::default();
        let patch = ConfigOverride {
            recovery_threshold: Some(20),
            ..Default::default()
        };
        config.merge(&patch).unwrap();
        assert_eq!(config.recovery_threshold, 20);
        assert_eq!(config.low_watermark_secs, 1.0);
        assert_eq!(config.high_watermark_secs, 3.0);
    }

    #[test]
    fn test_invalid_merge_is_atomic() {
        let mut config = ControllerConfig::default();
        let patch = ConfigOverride {
            recovery_threshold: Some(20),
            low_watermark_secs: Some(5.0),
            ..Default::default()
        };
        assert!(config.merge(&patch).is_err());
        assert_eq!(config, ControllerConfig::default());
    }
}
