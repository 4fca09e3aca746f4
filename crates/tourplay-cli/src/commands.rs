//! CLI command implementations

use crate::output::{self, OutputFormat};
use crate::trace::{self, TimelineKind};
use anyhow::Context;
use console::style;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;
use tourplay_core::{ControllerConfig, DeviceProfile, DeviceProfiler, EnvironmentSnapshot, QualityCatalog, VariantId};

/// Load controller configuration, falling back to defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ControllerConfig> {
    match path {
        Some(path) => ControllerConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(ControllerConfig::default()),
    }
}

#[derive(Debug, Serialize)]
struct Classification {
    profile: DeviceProfile,
    initial_variant: VariantId,
    source: String,
}

/// Classify an environment snapshot and report the initial variant
pub fn classify(snapshot: &Path, config: &ControllerConfig, format: &str) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(snapshot)
        .with_context(|| format!("reading snapshot {}", snapshot.display()))?;
    let env: EnvironmentSnapshot = serde_json::from_str(&content)
        .with_context(|| format!("parsing snapshot {}", snapshot.display()))?;

    let catalog = QualityCatalog::with_template(&config.catalog)?;
    let profile = DeviceProfiler::new(env).profile();
    let initial = catalog.initial_variant(&profile);

    let result = Classification {
        profile,
        initial_variant: initial.id.clone(),
        source: initial.source.to_string(),
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&result)?),
        OutputFormat::Text => {
            println!("Device Classification:");
            println!("  Tier:    {}", result.profile.tier);
            println!("  Class:   {}", result.profile.class);
            println!("  Score:   {}", result.profile.score);
            if let Some(memory) = result.profile.memory_gb {
                println!("  Memory:  {:.1} GB", memory);
            }
            println!("\nInitial variant: {}", style(&result.initial_variant).cyan().bold());
            println!("  Source: {}", result.source);
        }
    }

    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct CatalogRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Variant")]
    id: String,
    #[tabled(rename = "Resolution")]
    resolution: String,
    #[tabled(rename = "Quality")]
    quality: String,
    #[tabled(rename = "Roles")]
    roles: String,
    #[tabled(rename = "Source")]
    source: String,
}

fn catalog_rows(config: &ControllerConfig) -> anyhow::Result<Vec<CatalogRow>> {
    let catalog = QualityCatalog::with_template(&config.catalog)?;
    let last = catalog.variants().len() - 1;

    let rows = catalog
        .variants()
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let mut roles = Vec::new();
            if i == 0 {
                roles.push("floor");
            }
            if i == last {
                roles.push("ceiling");
            }
            if v.id == config.catalog.default_variant {
                roles.push("default");
            }
            if v.id == config.catalog.baseline_variant {
                roles.push("baseline");
            }
            if config.catalog.handheld_variant.as_ref() == Some(&v.id) {
                roles.push("handheld");
            }
            if catalog.downgrade_target().id == v.id {
                roles.push("mobile-safe");
            }
            CatalogRow {
                index: i,
                id: v.id.to_string(),
                resolution: v.max_resolution.to_string(),
                quality: v.max_resolution.quality_name().to_string(),
                roles: roles.join(", "),
                source: v.source.to_string(),
            }
        })
        .collect();

    Ok(rows)
}

/// Print the resolved catalog
pub fn catalog(config: &ControllerConfig, format: &str) -> anyhow::Result<()> {
    let rows = catalog_rows(config)?;

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&rows)?),
        OutputFormat::Text => {
            println!("Quality Catalog ({} variants):", rows.len());
            println!("{}", output::table(rows));
        }
    }

    Ok(())
}

/// Replay a trace file and print the timeline
pub fn simulate(trace_path: &Path, config: ControllerConfig, format: &str) -> anyhow::Result<()> {
    let trace = trace::Trace::from_file(trace_path)?;
    let report = trace::replay(&trace, config)?;

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&report)?),
        OutputFormat::Text => {
            println!("Replaying {}", trace_path.display());
            println!("  Initial variant: {}\n", style(&report.initial_variant).cyan());

            for entry in &report.timeline {
                let line = match &entry.kind {
                    TimelineKind::QualityChanged { variant } => {
                        format!("quality -> {}", style(variant).cyan().bold())
                    }
                    TimelineKind::HealthChanged { state } => format!("health  -> {}", output::health(*state)),
                    TimelineKind::PlaybackError { terminal, message } => {
                        let label = if *terminal { "terminal error" } else { "error" };
                        format!("{}: {}", style(label).red().bold(), message)
                    }
                    TimelineKind::Rejected { reason } => format!("{}: {}", style("rejected").yellow(), reason),
                };
                println!("{} {}", output::at(entry.at_ms), line);
            }

            let m = &report.metrics;
            println!("\nSummary:");
            println!("  Final variant:   {}", report.final_variant);
            println!("  Final health:    {}", output::health(report.final_health));
            println!("  Halted:          {}", report.halted);
            println!("  Quality changes: {}", m.quality_switches);
            println!("  Rebuffers:       {}", m.rebuffer_events);
            println!("  Stall signals:   {}", m.stall_signals);
            println!("  Fallbacks:       {}", m.fallbacks);
            println!("  Terminal errors: {}", m.terminal_errors);
            println!("  QoE score:       {:.1}", report.qoe_score);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.sample_interval_ms, ControllerConfig::default().sample_interval_ms);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut config = ControllerConfig::default();
        config.downgrade_threshold = 3;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&config).unwrap().as_bytes())
            .unwrap();

        let loaded = load_config(Some(file.path())).unwrap();
        assert_eq!(loaded.downgrade_threshold, 3);
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("missing.json"))).unwrap_err();
        assert!(err.to_string().contains("loading configuration"));
    }

    #[test]
    fn test_catalog_roles() {
        let rows = catalog_rows(&ControllerConfig::default()).unwrap();
        assert!(rows[0].roles.contains("floor"));
        assert!(rows[rows.len() - 1].roles.contains("ceiling"));
        assert!(rows.iter().any(|r| r.roles.contains("default")));
        assert!(rows.iter().any(|r| r.roles.contains("baseline")));
    }

    #[test]
    fn test_classify_reads_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{ "logical_cores": 8, "device_memory_gb": 8 }"#)
            .unwrap();
        classify(file.path(), &ControllerConfig::default(), "json").unwrap();
    }
}
