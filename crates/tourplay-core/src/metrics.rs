//! Session quality-of-experience counters
//!
//! Reported alongside every telemetry frame.

use serde::{Deserialize, Serialize};

/// Cumulative counters for one playback session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Completed variant switches
    pub quality_switches: u32,
    /// Fallback attempts after a load failure
    pub fallbacks: u32,
    /// Explicit stall/waiting signals from the surface
    pub stall_signals: u32,
    /// Entries into an unhealthy buffer state
    pub rebuffer_events: u32,
    /// Fallback chains that ran out of variants
    pub terminal_errors: u32,
    /// Manual retries after a terminal error
    pub retries: u32,
}

impl SessionMetrics {
    /// Quality of Experience score (0-100)
    pub fn qoe_score(&self) -> f64 {
        let mut score = 100.0;

        // Stalls are the most visible failure
        score -= (self.rebuffer_events as f64 * 10.0).min(50.0);
        score -= (self.quality_switches as f64 * 2.0).min(20.0);
        score -= self.terminal_errors as f64 * 25.0;

        score.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qoe_perfect() {
        assert_eq!(SessionMetrics::default().qoe_score(), 100.0);
    }

    #[test]
    fn test_qoe_penalties() {
        let metrics = SessionMetrics {
            rebuffer_events: 2,
            quality_switches: 3,
            ..Default::default()
        };
        // 100 - 2*10 - 3*2 = 74
        assert!((metrics.qoe_score() - 74.0).abs() < 0.1);

        let metrics = SessionMetrics {
            rebuffer_events: 20,
            terminal_errors: 3,
            ..Default::default()
        };
        assert_eq!(metrics.qoe_score(), 0.0);
    }
}
