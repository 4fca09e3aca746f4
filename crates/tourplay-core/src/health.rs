//! Buffer health monitoring
//!
//! Classifies each buffer sample into a [`HealthState`]. Sampling runs on a
//! sub-second cadence so starvation is caught before it turns into a visible
//! stall.
//!
//! - Below the low watermark while playing (and not fully buffered):
//!   `starved` when the surface has no future data, `at_risk` otherwise.
//! - Above the high watermark, or fully buffered: `healthy`.
//! - Between the watermarks: no change.
//! - Stall/waiting signals from the surface force `starved` immediately.
//!
//! A new source starts from a healthy baseline, and its first sample is
//! ignored. State measured against the old source never carries over.

use crate::{
    config::ControllerConfig,
    types::{BufferSample, HealthState, ReadyState},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Explicit stall signal from the rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallSignal {
    /// Download stopped making progress
    Stalled,
    /// Playback paused waiting for data
    Waiting,
}

/// A change of health state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthTransition {
    pub from: HealthState,
    pub to: HealthState,
    /// Caused by a stall signal rather than the watermarks
    pub forced: bool,
}

/// Health state plus rolling counters, as seen by the decision engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub state: HealthState,
    pub transition: Option<HealthTransition>,
    pub consecutive_good_samples: u32,
    pub rebuffer_events: u32,
}

/// Watermark-based buffer health classifier
#[derive(Debug, Clone)]
pub struct BufferHealthMonitor {
    low_watermark: f64,
    high_watermark: f64,
    state: HealthState,
    consecutive_good_samples: u32,
    /// Cumulative for the session; never reset
    rebuffer_events: u32,
    /// Drop the next sample (first one after a source change)
    skip_next: bool,
}

impl BufferHealthMonitor {
    pub fn new(low_watermark: f64, high_watermark: f64) -> Self {
        Self {
            low_watermark,
            high_watermark,
            state: HealthState::Healthy,
            consecutive_good_samples: 0,
            rebuffer_events: 0,
            skip_next: false,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(config.low_watermark_secs, config.high_watermark_secs)
    }

    /// Adopt new watermarks; state and counters are kept
    pub fn set_watermarks(&mut self, low: f64, high: f64) {
        self.low_watermark = low;
        self.high_watermark = high;
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn consecutive_good_samples(&self) -> u32 {
        self.consecutive_good_samples
    }

    pub fn rebuffer_event_count(&self) -> u32 {
        self.rebuffer_events
    }

    /// Classify one sample. A missing sample (no playback target) yields
    /// no transition and leaves every counter untouched.
    pub fn sample(&mut self, input: Option<&BufferSample>) -> Option<HealthTransition> {
        let sample = input?;
        if self.skip_next {
            self.skip_next = false;
            debug!(ahead = sample.buffered_ahead_secs, "Settling sample ignored");
            return None;
        }
        let ahead = sample.buffered_ahead_secs;

        if sample.is_playing && !sample.fully_buffered && ahead < self.low_watermark {
            let target = if sample.ready_state <= ReadyState::HaveCurrentData {
                HealthState::Starved
            } else {
                HealthState::AtRisk
            };
            return self.enter_unhealthy(target, false);
        }

        if sample.fully_buffered || ahead > self.high_watermark {
            self.consecutive_good_samples = self.consecutive_good_samples.saturating_add(1);
            return self.enter(HealthState::Healthy, false);
        }

        None
    }

    /// Authoritative stall signal: enter `starved` without consulting the
    /// watermarks
    pub fn force_starved(&mut self, signal: StallSignal) -> Option<HealthTransition> {
        debug!(?signal, "Stall signal");
        self.enter_unhealthy(HealthState::Starved, true)
    }

    /// Start over on a new source: back to `healthy` with an empty streak,
    /// and the next sample ignored. The rebuffer count is kept.
    pub fn rebaseline(&mut self) -> Option<HealthTransition> {
        self.consecutive_good_samples = 0;
        self.skip_next = true;
        self.enter(HealthState::Healthy, false)
    }

    /// Snapshot for the decision engine
    pub fn report(&self, transition: Option<HealthTransition>) -> HealthReport {
        HealthReport {
            state: self.state,
            transition,
            consecutive_good_samples: self.consecutive_good_samples,
            rebuffer_events: self.rebuffer_events,
        }
    }

    fn enter_unhealthy(&mut self, target: HealthState, forced: bool) -> Option<HealthTransition> {
        self.consecutive_good_samples = 0;

        match self.state {
            // One rebuffer episode counts once
            HealthState::Healthy => {
                self.rebuffer_events = self.rebuffer_events.saturating_add(1);
                self.enter(target, forced)
            }
            // Escalation within an episode
            HealthState::AtRisk if target == HealthState::Starved => self.enter(target, forced),
            _ => None,
        }
    }

    fn enter(&mut self, to: HealthState, forced: bool) -> Option<HealthTransition> {
        if self.state == to {
            return None;
        }
        let transition = HealthTransition {
            from: self.state,
            to,
            forced,
        };
        self.state = to;
        debug!(
            from = %transition.from,
            to = %transition.to,
            forced,
            rebuffer_events = self.rebuffer_events,
            "Health transition"
        );
        Some(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ahead: f64, ready_state: ReadyState, is_playing: bool) -> BufferSample {
        BufferSample {
            buffered_ahead_secs: ahead,
            ready_state,
            is_playing,
            fully_buffered: false,
            timestamp_ms: 0,
        }
    }

    fn monitor() -> BufferHealthMonitor {
        BufferHealthMonitor::new(1.0, 3.0)
    }

    #[test]
    fn test_missing_sample_is_noop() {
        let mut m = monitor();
        assert_eq!(m.sample(None), None);
        assert_eq!(m.state(), HealthState::Healthy);
        assert_eq!(m.rebuffer_event_count(), 0);
    }

    #[test]
    fn test_low_buffer_enters_unhealthy_once() {
        let mut m = monitor();
        let low = sample(0.4, ReadyState::HaveFutureData, true);

        let t = m.sample(Some(&low)).unwrap();
        assert_eq!(t.to, HealthState::AtRisk);
        assert!(!t.forced);
        assert_eq!(m.rebuffer_event_count(), 1);

        for _ in 0..5 {
            assert_eq!(m.sample(Some(&low)), None);
        }
        assert_eq!(m.rebuffer_event_count(), 1);
    }

    #[test]
    fn test_starved_when_no_future_data() {
        let mut m = monitor();
        let t = m.sample(Some(&sample(0.0, ReadyState::HaveCurrentData, true))).unwrap();
        assert_eq!(t.to, HealthState::Starved);
    }

    #[test]
    fn test_escalation_does_not_double_count() {
        let mut m = monitor();
        m.sample(Some(&sample(0.5, ReadyState::HaveFutureData, true)));
        let t = m.sample(Some(&sample(0.1, ReadyState::HaveMetadata, true))).unwrap();
        assert_eq!((t.from, t.to), (HealthState::AtRisk, HealthState::Starved));
        assert_eq!(m.rebuffer_event_count(), 1);
    }

    #[test]
    fn test_paused_or_fully_buffered_never_unhealthy() {
        let mut m = monitor();
        assert_eq!(m.sample(Some(&sample(0.0, ReadyState::HaveNothing, false))), None);

        let mut tail = sample(0.3, ReadyState::HaveEnoughData, true);
        tail.fully_buffered = true;
        assert_eq!(m.sample(Some(&tail)), None);
        assert_eq!(m.state(), HealthState::Healthy);
        assert_eq!(m.consecutive_good_samples(), 1);
        assert_eq!(m.rebuffer_event_count(), 0);
    }

    #[test]
    fn test_recovery_keeps_rebuffer_count() {
        let mut m = monitor();
        m.sample(Some(&sample(0.2, ReadyState::HaveCurrentData, true)));
        assert_eq!(m.consecutive_good_samples(), 0);

        // Between watermarks: no change
        assert_eq!(m.sample(Some(&sample(2.0, ReadyState::HaveEnoughData, true))), None);
        assert_eq!(m.state(), HealthState::Starved);

        let t = m.sample(Some(&sample(4.0, ReadyState::HaveEnoughData, true))).unwrap();
        assert_eq!(t.to, HealthState::Healthy);
        assert_eq!(m.consecutive_good_samples(), 1);
        assert_eq!(m.rebuffer_event_count(), 1);

        m.sample(Some(&sample(0.2, ReadyState::HaveCurrentData, true)));
        assert_eq!(m.rebuffer_event_count(), 2);
        assert_eq!(m.consecutive_good_samples(), 0);
    }

    #[test]
    fn test_stall_signal_forces_starved() {
        let mut m = monitor();
        m.sample(Some(&sample(10.0, ReadyState::HaveEnoughData, true)));

        let t = m.force_starved(StallSignal::Waiting).unwrap();
        assert_eq!(t.to, HealthState::Starved);
        assert!(t.forced);
        assert_eq!(m.rebuffer_event_count(), 1);

        assert_eq!(m.force_starved(StallSignal::Stalled), None);
        assert_eq!(m.rebuffer_event_count(), 1);
    }

    #[test]
    fn test_rebaseline_after_source_change() {
        let mut m = monitor();
        let starving = sample(0.1, ReadyState::HaveCurrentData, true);
        m.sample(Some(&starving));
        assert_eq!(m.state(), HealthState::Starved);

        let t = m.rebaseline().unwrap();
        assert_eq!((t.from, t.to), (HealthState::Starved, HealthState::Healthy));
        assert_eq!(m.rebuffer_event_count(), 1);
        assert_eq!(m.consecutive_good_samples(), 0);

        // First sample on the new source is ignored
        assert_eq!(m.sample(Some(&starving)), None);
        assert_eq!(m.state(), HealthState::Healthy);
        assert_eq!(m.rebuffer_event_count(), 1);

        // Then classification resumes, and a new episode counts
        let t = m.sample(Some(&starving)).unwrap();
        assert_eq!(t.to, HealthState::Starved);
        assert_eq!(m.rebuffer_event_count(), 2);
    }

    #[test]
    fn test_rebaseline_when_healthy_is_silent() {
        let mut m = monitor();
        m.sample(Some(&sample(5.0, ReadyState::HaveEnoughData, true)));
        assert_eq!(m.rebaseline(), None);
        assert_eq!(m.consecutive_good_samples(), 0);
    }

    #[test]
    fn test_rebuffer_count_monotonic_over_mixed_sequence() {
        let mut m = monitor();
        let levels = [5.0, 0.2, 0.1, 2.0, 0.3, 4.0, 4.5, 0.0, 0.0, 3.5, 0.9, 1.5, 6.0];
        let mut entries = 0;
        let mut last_count = 0;
        for level in levels {
            let before = m.state();
            let t = m.sample(Some(&sample(level, ReadyState::HaveFutureData, true)));
            if let Some(t) = t {
                if !before.is_unhealthy() && t.to.is_unhealthy() {
                    entries += 1;
                }
            }
            assert!(m.rebuffer_event_count() >= last_count);
            last_count = m.rebuffer_event_count();
        }
        assert_eq!(m.rebuffer_event_count(), entries);
        assert_eq!(entries, 3);
    }
}
