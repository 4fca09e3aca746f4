//! Output formatting for CLI

use console::style;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};
use tourplay_core::HealthState;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Pretty JSON for machine consumers
pub fn to_json<T: Serialize>(data: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// Rounded table for text output
pub fn table<T: Tabled>(rows: impl IntoIterator<Item = T>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Health state with a traffic-light color
pub fn health(state: HealthState) -> String {
    match state {
        HealthState::Healthy => style(state).green().to_string(),
        HealthState::AtRisk => style(state).yellow().to_string(),
        HealthState::Starved => style(state).red().bold().to_string(),
    }
}

/// Millisecond timestamp column
pub fn at(ms: u64) -> String {
    style(format!("[{:>7} ms]", ms)).dim().to_string()
}
