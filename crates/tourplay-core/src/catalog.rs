//! Quality catalog
//!
//! The fixed, ordered set of variants for a session, from most conservative
//! to most capable, plus the initial-variant policy and the fallback chain.

use crate::{
    config::CatalogConfig,
    device::DeviceProfile,
    types::{DeviceTier, QualityVariant, VariantId},
    Error, Result,
};
use tracing::{debug, info};
use url::Url;

/// Direction of a step through the catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards the most capable variant
    Up,
    /// Towards the most conservative variant
    Down,
}

/// Resolves a variant identifier to a loadable source locator
pub trait MediaOrigin: Send + Sync {
    fn resolve(&self, variant: &VariantId) -> Result<Url>;
}

/// Origin built from a URL template containing `{variant}`
#[derive(Debug, Clone)]
pub struct TemplateOrigin {
    template: String,
}

impl TemplateOrigin {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl MediaOrigin for TemplateOrigin {
    fn resolve(&self, variant: &VariantId) -> Result<Url> {
        let url = Url::parse(&self.template.replace("{variant}", variant.as_str()))?;
        Ok(url)
    }
}

/// Ordered variant catalog
#[derive(Debug, Clone)]
pub struct QualityCatalog {
    variants: Vec<QualityVariant>,
    default_index: usize,
    baseline_index: usize,
    handheld_index: Option<usize>,
    mobile_safe_index: usize,
    high_memory_gb: f64,
}

impl QualityCatalog {
    /// Build the catalog, resolving every variant through `origin`
    pub fn from_config(config: &CatalogConfig, origin: &dyn MediaOrigin) -> Result<Self> {
        if config.variants.is_empty() {
            return Err(Error::EmptyCatalog);
        }

        let mut variants: Vec<QualityVariant> = Vec::with_capacity(config.variants.len());
        for spec in &config.variants {
            let source = origin.resolve(&spec.id)?;
            if variants.iter().any(|v| v.source == source) {
                return Err(Error::InvalidConfig(format!(
                    "variant {} resolves to a locator already in use: {}",
                    spec.id, source
                )));
            }
            variants.push(QualityVariant {
                id: spec.id.clone(),
                source,
                max_resolution: spec.max_resolution,
            });
        }

        let index_of = |id: &VariantId| {
            variants
                .iter()
                .position(|v| &v.id == id)
                .ok_or_else(|| Error::UnknownVariant(id.clone()))
        };

        let default_index = index_of(&config.default_variant)?;
        let baseline_index = index_of(&config.baseline_variant)?;
        let handheld_index = config.handheld_variant.as_ref().map(index_of).transpose()?;
        let mobile_safe_index = config.mobile_safe_variant.as_ref().map(index_of).transpose()?.unwrap_or(0);

        info!(
            variants = variants.len(),
            default = %config.default_variant,
            baseline = %config.baseline_variant,
            "Quality catalog built"
        );

        Ok(Self {
            variants,
            default_index,
            baseline_index,
            handheld_index,
            mobile_safe_index,
            high_memory_gb: config.high_memory_gb,
        })
    }

    /// Build the catalog using the config's own source template
    pub fn with_template(config: &CatalogConfig) -> Result<Self> {
        Self::from_config(config, &TemplateOrigin::new(config.source_template.clone()))
    }

    /// All variants, most conservative first
    pub fn variants(&self) -> &[QualityVariant] {
        &self.variants
    }

    pub fn get(&self, id: &VariantId) -> Option<&QualityVariant> {
        self.variants.iter().find(|v| &v.id == id)
    }

    pub fn position(&self, id: &VariantId) -> Option<usize> {
        self.variants.iter().position(|v| &v.id == id)
    }

    pub fn most_conservative(&self) -> &QualityVariant {
        &self.variants[0]
    }

    pub fn most_capable(&self) -> &QualityVariant {
        &self.variants[self.variants.len() - 1]
    }

    pub fn default_variant(&self) -> &QualityVariant {
        &self.variants[self.default_index]
    }

    /// Last resort of the fallback chain
    pub fn baseline(&self) -> &QualityVariant {
        &self.variants[self.baseline_index]
    }

    /// True when `id` sits below the default variant. Automatic upgrades
    /// stop at the default.
    pub fn is_below_default(&self, id: &VariantId) -> bool {
        self.position(id)
            .map(|i| i < self.default_index)
            .unwrap_or(false)
    }

    /// Where starvation sends playback
    pub fn downgrade_target(&self) -> &QualityVariant {
        &self.variants[self.mobile_safe_index]
    }

    /// True when `id` is at or below the downgrade target, i.e. a downgrade
    /// would not lower quality. Unknown ids are never at the floor.
    pub fn is_at_safe_floor(&self, id: &VariantId) -> bool {
        self.position(id)
            .map(|i| i <= self.mobile_safe_index)
            .unwrap_or(false)
    }

    /// One step through the catalog order; `None` at either end or for an
    /// unknown variant
    pub fn next(&self, id: &VariantId, direction: Direction) -> Option<&QualityVariant> {
        let index = self.position(id)?;
        match direction {
            Direction::Up => self.variants.get(index + 1),
            Direction::Down => index.checked_sub(1).and_then(|i| self.variants.get(i)),
        }
    }

    /// Initial variant for a device.
    ///
    /// Hosts reporting at least `high_memory_gb` always start on the most
    /// capable variant, whatever their computed tier.
    pub fn initial_variant(&self, profile: &DeviceProfile) -> &QualityVariant {
        if profile.memory_gb.map(|m| m >= self.high_memory_gb).unwrap_or(false) {
            debug!(memory_gb = ?profile.memory_gb, "High-memory host, starting on most capable variant");
            return self.most_capable();
        }

        match profile.tier {
            DeviceTier::Low => self.most_conservative(),
            DeviceTier::Medium if profile.class.is_handheld() => self
                .handheld_index
                .map(|i| &self.variants[i])
                .unwrap_or_else(|| self.most_conservative()),
            DeviceTier::Medium => self.default_variant(),
            DeviceTier::High => self.most_capable(),
        }
    }

    /// Variants to try, in order, when `first` is requested: the request
    /// itself, then the most conservative variant, then the baseline.
    pub fn fallback_chain(&self, first: &VariantId) -> Vec<VariantId> {
        let mut chain: Vec<VariantId> = Vec::with_capacity(3);
        for id in [
            first,
            &self.most_conservative().id,
            &self.baseline().id,
        ] {
            if !chain.contains(id) {
                chain.push(id.clone());
            }
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceClass;

    fn catalog() -> QualityCatalog {
        QualityCatalog::with_template(&CatalogConfig::default()).unwrap()
    }

    fn profile(tier: DeviceTier, class: DeviceClass, memory_gb: Option<f64>) -> DeviceProfile {
        DeviceProfile {
            tier,
            class,
            score: 0,
            memory_gb,
        }
    }

    #[test]
    fn test_order_and_ends() {
        let catalog = catalog();
        assert_eq!(catalog.most_conservative().id.as_str(), "low");
        assert_eq!(catalog.most_capable().id.as_str(), "highperf");
        assert_eq!(catalog.baseline().id.as_str(), "standard");
        assert_eq!(
            catalog.variants()[1].source.as_str(),
            "https://media.tourplay.dev/tour/mobile.mp4"
        );
    }

    #[test]
    fn test_next() {
        let catalog = catalog();
        let low = VariantId::new("low");
        let top = VariantId::new("highperf");
        assert_eq!(catalog.next(&low, Direction::Up).map(|v| v.id.as_str()), Some("mobile"));
        assert!(catalog.next(&low, Direction::Down).is_none());
        assert!(catalog.next(&top, Direction::Up).is_none());
        assert!(catalog.next(&VariantId::new("ultra"), Direction::Up).is_none());
    }

    #[test]
    fn test_initial_variant_policy() {
        let catalog = catalog();
        let pick = |p: DeviceProfile| catalog.initial_variant(&p).id.as_str().to_string();

        assert_eq!(pick(profile(DeviceTier::Low, DeviceClass::Desktop, None)), "low");
        assert_eq!(pick(profile(DeviceTier::Medium, DeviceClass::Mobile, None)), "mobile");
        assert_eq!(pick(profile(DeviceTier::Medium, DeviceClass::Tablet, None)), "mobile");
        assert_eq!(pick(profile(DeviceTier::Medium, DeviceClass::Desktop, None)), "standard");
        assert_eq!(pick(profile(DeviceTier::High, DeviceClass::Mobile, None)), "highperf");
    }

    #[test]
    fn test_high_memory_override() {
        let catalog = catalog();
        let p = profile(DeviceTier::Medium, DeviceClass::Mobile, Some(16.0));
        assert_eq!(catalog.initial_variant(&p).id.as_str(), "highperf");
        let p = profile(DeviceTier::Low, DeviceClass::Desktop, Some(32.0));
        assert_eq!(catalog.initial_variant(&p).id.as_str(), "highperf");
    }

    #[test]
    fn test_fallback_chain_dedup() {
        let catalog = catalog();
        let chain = catalog.fallback_chain(&VariantId::new("highperf"));
        let ids: Vec<_> = chain.iter().map(|v| v.as_str()).collect();
        assert_eq!(ids, vec!["highperf", "low", "standard"]);

        let chain = catalog.fallback_chain(&VariantId::new("low"));
        let ids: Vec<_> = chain.iter().map(|v| v.as_str()).collect();
        assert_eq!(ids, vec!["low", "standard"]);
    }

    #[test]
    fn test_downgrade_target() {
        let catalog = catalog();
        assert_eq!(catalog.downgrade_target().id.as_str(), "low");
        assert!(catalog.is_at_safe_floor(&VariantId::new("low")));
        assert!(!catalog.is_at_safe_floor(&VariantId::new("mobile")));

        let config = CatalogConfig {
            mobile_safe_variant: Some(VariantId::new("mobile")),
            ..Default::default()
        };
        let catalog = QualityCatalog::with_template(&config).unwrap();
        assert_eq!(catalog.downgrade_target().id.as_str(), "mobile");
        assert!(catalog.is_at_safe_floor(&VariantId::new("low")));
        assert!(catalog.is_at_safe_floor(&VariantId::new("mobile")));
        assert!(!catalog.is_at_safe_floor(&VariantId::new("standard")));
    }

    #[test]
    fn test_below_default() {
        let catalog = catalog();
        assert!(catalog.is_below_default(&VariantId::new("low")));
        assert!(catalog.is_below_default(&VariantId::new("mobile")));
        assert!(!catalog.is_below_default(&VariantId::new("standard")));
        assert!(!catalog.is_below_default(&VariantId::new("highperf")));
        assert!(!catalog.is_below_default(&VariantId::new("ultra")));
    }

    #[test]
    fn test_duplicate_locators_rejected() {
        struct Fixed;
        impl MediaOrigin for Fixed {
            fn resolve(&self, _variant: &VariantId) -> Result<Url> {
                Ok(Url::parse("https://media.example.com/same.mp4")?)
            }
        }
        let result = QualityCatalog::from_config(&CatalogConfig::default(), &Fixed);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
