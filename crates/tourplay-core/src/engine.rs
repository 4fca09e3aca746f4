//! Quality decision engine
//!
//! Turns health reports into variant switch requests.
//!
//! - First unhealthy episode (threshold defaults to one rebuffer entry):
//!   jump straight to the mobile-safe variant (the most conservative one
//!   unless configured otherwise), never one step at a time.
//! - Sustained health: one step up the catalog, only when the upgrade path
//!   is enabled (disabled by default), and never past the default variant.
//! - While a switch is in flight, and for the first sample after the new
//!   source loads, downgrade triggers are ignored.
//! - After the fallback chain is exhausted nothing is requested until a
//!   manual retry.

use crate::{
    catalog::{Direction, QualityCatalog},
    config::ControllerConfig,
    health::HealthReport,
    types::{HealthState, SwitchReason, SwitchRequest, VariantId},
};
use tracing::{debug, info};

/// Switch bookkeeping; the single source of truth for "are we switching"
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchInFlight {
    /// No switch in progress
    Idle,
    /// A request was handed to the coordinator and has not resolved
    Pending(SwitchRequest),
    /// The new source loaded; waiting for its first health sample
    Settling,
}

/// Outcome of evaluating a health report
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Hold,
    Switch(SwitchRequest),
}

/// Hysteresis-based variant selection
#[derive(Debug, Clone)]
pub struct QualityDecisionEngine {
    current: VariantId,
    in_flight: SwitchInFlight,
    last_switch_at_ms: Option<u64>,
    /// Set when the fallback chain ran out
    halted: bool,
    downgrade_threshold: u32,
    recovery_threshold: u32,
    resume_backoff_secs: f64,
    upgrade_enabled: bool,
}

impl QualityDecisionEngine {
    pub fn new(initial: VariantId, config: &ControllerConfig) -> Self {
        Self {
            current: initial,
            in_flight: SwitchInFlight::Idle,
            last_switch_at_ms: None,
            halted: false,
            downgrade_threshold: config.downgrade_threshold,
            recovery_threshold: config.recovery_threshold,
            resume_backoff_secs: config.resume_backoff_secs,
            upgrade_enabled: config.upgrade_enabled,
        }
    }

    /// Adopt thresholds from a (merged) configuration
    pub fn apply_config(&mut self, config: &ControllerConfig) {
        self.downgrade_threshold = config.downgrade_threshold;
        self.recovery_threshold = config.recovery_threshold;
        self.resume_backoff_secs = config.resume_backoff_secs;
        if self.upgrade_enabled != config.upgrade_enabled {
            info!(enabled = config.upgrade_enabled, "Upgrade path toggled");
        }
        self.upgrade_enabled = config.upgrade_enabled;
    }

    pub fn current(&self) -> &VariantId {
        &self.current
    }

    pub fn in_flight(&self) -> &SwitchInFlight {
        &self.in_flight
    }

    pub fn is_switching(&self) -> bool {
        matches!(self.in_flight, SwitchInFlight::Pending(_))
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn last_switch_at_ms(&self) -> Option<u64> {
        self.last_switch_at_ms
    }

    /// Mark the session's first load as in flight
    pub fn begin_initial_load(&mut self) -> SwitchRequest {
        let request = SwitchRequest {
            target: self.current.clone(),
            resume_from_secs: 0.0,
            resume_backoff_secs: 0.0,
            reason: SwitchReason::Initial,
        };
        self.in_flight = SwitchInFlight::Pending(request.clone());
        request
    }

    /// Evaluate a health report
    pub fn evaluate(&mut self, catalog: &QualityCatalog, report: &HealthReport, position_secs: f64) -> Decision {
        if self.halted {
            return Decision::Hold;
        }

        match self.in_flight {
            SwitchInFlight::Pending(_) => return Decision::Hold,
            SwitchInFlight::Settling => {
                debug!(variant = %self.current, "New source settled");
                self.in_flight = SwitchInFlight::Idle;
                return Decision::Hold;
            }
            SwitchInFlight::Idle => {}
        }

        if report.state.is_unhealthy() && report.rebuffer_events >= self.downgrade_threshold {
            if catalog.is_at_safe_floor(&self.current) {
                return Decision::Hold;
            }
            let target = catalog.downgrade_target().id.clone();
            info!(
                from = %self.current,
                to = %target,
                health = %report.state,
                rebuffer_events = report.rebuffer_events,
                "Downgrading to mobile-safe variant"
            );
            return self
                .request(target, position_secs, SwitchReason::Downgrade)
                .map(Decision::Switch)
                .unwrap_or(Decision::Hold);
        }

        if self.upgrade_enabled
            && report.state == HealthState::Healthy
            && report.consecutive_good_samples > self.recovery_threshold
            && catalog.is_below_default(&self.current)
        {
            if let Some(next) = catalog.next(&self.current, Direction::Up) {
                let target = next.id.clone();
                info!(
                    from = %self.current,
                    to = %target,
                    good_samples = report.consecutive_good_samples,
                    "Upgrading one step"
                );
                return self
                    .request(target, position_secs, SwitchReason::Upgrade)
                    .map(Decision::Switch)
                    .unwrap_or(Decision::Hold);
            }
        }

        Decision::Hold
    }

    /// Create a switch request. Returns `None` when the target is already
    /// current, a switch is in flight, or the engine is halted.
    pub fn request(&mut self, target: VariantId, position_secs: f64, reason: SwitchReason) -> Option<SwitchRequest> {
        if self.halted {
            debug!(target = %target, "Engine halted, request ignored");
            return None;
        }
        if self.is_switching() {
            debug!(target = %target, "Switch already in flight, request ignored");
            return None;
        }
        if target == self.current {
            debug!(target = %target, "Target is current variant, request suppressed");
            return None;
        }
        Some(self.issue(target, position_secs, reason))
    }

    /// Recovery request after the current source failed. Bypasses the
    /// redundancy check; still refused while another switch is pending.
    pub fn recover(&mut self, target: VariantId, position_secs: f64) -> Option<SwitchRequest> {
        if self.halted || self.is_switching() {
            return None;
        }
        Some(self.issue(target, position_secs, SwitchReason::Fallback))
    }

    /// Manual retry: always restarts from the most conservative variant and
    /// clears the halt
    pub fn retry(&mut self, catalog: &QualityCatalog, position_secs: f64) -> Option<SwitchRequest> {
        if self.is_switching() {
            debug!("Retry ignored, switch in flight");
            return None;
        }
        self.halted = false;
        let target = catalog.most_conservative().id.clone();
        Some(self.issue(target, position_secs, SwitchReason::Retry))
    }

    /// The coordinator finished loading `variant`
    pub fn on_switch_completed(&mut self, variant: VariantId, now_ms: u64) {
        self.current = variant;
        self.last_switch_at_ms = Some(now_ms);
        self.in_flight = SwitchInFlight::Settling;
    }

    /// The fallback chain ran out
    pub fn on_switch_exhausted(&mut self) {
        self.in_flight = SwitchInFlight::Idle;
        self.halted = true;
    }

    /// Session teardown
    pub fn cancel(&mut self) {
        self.in_flight = SwitchInFlight::Idle;
    }

    fn issue(&mut self, target: VariantId, position_secs: f64, reason: SwitchReason) -> SwitchRequest {
        let request = SwitchRequest {
            target,
            resume_from_secs: position_secs,
            resume_backoff_secs: self.resume_backoff_secs,
            reason,
        };
        self.in_flight = SwitchInFlight::Pending(request.clone());
        request
    }
}
