//! Source switch coordinator
//!
//! Performs in-place variant switches on the rendering surface. Position and
//! play intent are captured when the switch starts; once the new source is
//! ready the surface is rewound slightly behind the captured position and
//! resumed if it was playing.
//!
//! A failed load walks the fallback chain: requested variant, then the most
//! conservative one, then the catalog baseline. Running off the end of the
//! chain is reported as [`SwitchOutcome::Exhausted`] and never retried
//! automatically.

use crate::{
    catalog::QualityCatalog,
    error::{Error, MediaErrorKind},
    surface::{RenderingSurface, SurfaceError},
    types::{PlaybackState, SwitchRequest, VariantId},
};
use tracing::{debug, info, warn};

/// Result of driving a switch one step
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchOutcome {
    /// A source load was issued; waiting for ready or error
    Loading { variant: VariantId, attempt: usize },
    /// The new source is ready and positioned
    Completed {
        variant: VariantId,
        resumed_at: f64,
        /// Playback was resumed (false when paused or autoplay was rejected)
        resumed: bool,
    },
    /// Every variant in the chain failed
    Exhausted { attempted: usize, kind: MediaErrorKind },
    /// No switch pending; nothing done
    Ignored,
}

#[derive(Debug, Clone)]
struct PendingSwitch {
    request: SwitchRequest,
    chain: Vec<VariantId>,
    attempt: usize,
    play_intent: bool,
}

impl PendingSwitch {
    fn current(&self) -> Option<&VariantId> {
        self.chain.get(self.attempt)
    }
}

/// Drives the surface through a variant change
#[derive(Debug, Default)]
pub struct SourceSwitchCoordinator {
    pending: Option<PendingSwitch>,
}

impl SourceSwitchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start a switch using the standard fallback chain for the target
    pub fn execute<S: RenderingSurface + ?Sized>(
        &mut self,
        request: SwitchRequest,
        state: &PlaybackState,
        catalog: &QualityCatalog,
        surface: &mut S,
    ) -> SwitchOutcome {
        let chain = catalog.fallback_chain(&request.target);
        self.execute_with_chain(request, chain, state, catalog, surface)
    }

    /// Start a switch over an explicit chain. The chain's first entry must be
    /// the request target.
    pub fn execute_with_chain<S: RenderingSurface + ?Sized>(
        &mut self,
        request: SwitchRequest,
        chain: Vec<VariantId>,
        state: &PlaybackState,
        catalog: &QualityCatalog,
        surface: &mut S,
    ) -> SwitchOutcome {
        if self.pending.is_some() {
            debug!(target = %request.target, "Switch already pending, request dropped");
            return SwitchOutcome::Ignored;
        }

        info!(
            target = %request.target,
            reason = ?request.reason,
            from = %state.variant,
            position = request.resume_from_secs,
            play_intent = state.play_intent,
            "Switching source"
        );

        self.pending = Some(PendingSwitch {
            request,
            chain,
            attempt: 0,
            play_intent: state.play_intent,
        });
        self.load_current(catalog, surface, MediaErrorKind::Unknown)
    }

    /// The loading source can play: rewind, and resume if the viewer wanted
    /// playback running
    pub fn on_ready<S: RenderingSurface + ?Sized>(&mut self, surface: &mut S) -> SwitchOutcome {
        let Some(pending) = self.pending.take() else {
            return SwitchOutcome::Ignored;
        };
        let Some(variant) = pending.current().cloned() else {
            return SwitchOutcome::Ignored;
        };

        let resumed_at = pending.request.resume_position();
        surface.seek(resumed_at);

        let resumed = if pending.play_intent {
            match surface.play() {
                Ok(()) => true,
                Err(SurfaceError::AutoplayRejected) => {
                    debug!(variant = %variant, "Autoplay rejected, waiting for user gesture");
                    false
                }
                Err(e) => {
                    let err = Error::from(e);
                    warn!(variant = %variant, code = err.error_code(), error = %err, "Resume after switch failed");
                    false
                }
            }
        } else {
            false
        };

        info!(variant = %variant, resumed_at, resumed, "Source switch completed");
        SwitchOutcome::Completed {
            variant,
            resumed_at,
            resumed,
        }
    }

    /// The loading source failed: move to the next chain entry
    pub fn on_error<S: RenderingSurface + ?Sized>(
        &mut self,
        kind: MediaErrorKind,
        catalog: &QualityCatalog,
        surface: &mut S,
    ) -> SwitchOutcome {
        let Some(pending) = self.pending.as_mut() else {
            return SwitchOutcome::Ignored;
        };
        if let Some(variant) = pending.current().cloned() {
            let err = Error::VariantLoad { variant, kind };
            warn!(attempt = pending.attempt + 1, code = err.error_code(), error = %err, "Variant failed to load");
        }
        pending.attempt += 1;
        self.load_current(catalog, surface, kind)
    }

    /// Drop the pending switch; later ready/error callbacks are ignored
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(target = %pending.request.target, "Pending switch cancelled");
        }
    }

    fn load_current<S: RenderingSurface + ?Sized>(
        &mut self,
        catalog: &QualityCatalog,
        surface: &mut S,
        mut last_kind: MediaErrorKind,
    ) -> SwitchOutcome {
        loop {
            let Some(pending) = self.pending.as_mut() else {
                return SwitchOutcome::Ignored;
            };
            let Some(id) = pending.current().cloned() else {
                let attempted = pending.chain.len();
                self.pending = None;
                return SwitchOutcome::Exhausted {
                    attempted,
                    kind: last_kind,
                };
            };

            let Some(variant) = catalog.get(&id) else {
                warn!(variant = %id, "Variant not in catalog, skipping");
                pending.attempt += 1;
                continue;
            };

            match surface.load(&variant.source) {
                Ok(()) => {
                    debug!(variant = %id, source = %variant.source, attempt = pending.attempt + 1, "Loading source");
                    return SwitchOutcome::Loading {
                        variant: id,
                        attempt: pending.attempt + 1,
                    };
                }
                Err(e) => {
                    last_kind = match e {
                        SurfaceError::Detached => MediaErrorKind::Aborted,
                        _ => MediaErrorKind::SourceNotSupported,
                    };
                    let err = Error::VariantLoad {
                        variant: id,
                        kind: last_kind,
                    };
                    warn!(code = err.error_code(), error = %err, surface_error = %e, "Source load rejected");
                    pending.attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CatalogConfig,
        surface::{SimulatedSurface, SurfaceCall},
        types::SwitchReason,
    };

    fn catalog() -> QualityCatalog {
        QualityCatalog::with_template(&CatalogConfig::default()).unwrap()
    }

    fn request(target: &str, from: f64) -> SwitchRequest {
        SwitchRequest {
            target: VariantId::new(target),
            resume_from_secs: from,
            resume_backoff_secs: 0.5,
            reason: SwitchReason::Downgrade,
        }
    }

    fn state(variant: &str, play_intent: bool) -> PlaybackState {
        PlaybackState {
            variant: VariantId::new(variant),
            position_secs: 20.0,
            play_intent,
            duration_secs: None,
        }
    }

    #[test]
    fn test_switch_preserves_position_and_intent() {
        let catalog = catalog();
        let mut surface = SimulatedSurface::new();
        let mut switcher = SourceSwitchCoordinator::new();

        let outcome = switcher.execute(request("low", 20.0), &state("standard", true), &catalog, &mut surface);
        assert_eq!(
            outcome,
            SwitchOutcome::Loading {
                variant: VariantId::new("low"),
                attempt: 1
            }
        );

        let outcome = switcher.on_ready(&mut surface);
        assert_eq!(
            outcome,
            SwitchOutcome::Completed {
                variant: VariantId::new("low"),
                resumed_at: 19.5,
                resumed: true
            }
        );
        assert_eq!(&surface.calls()[1..], &[SurfaceCall::Seek(19.5), SurfaceCall::Play]);
        assert!(!switcher.is_pending());
    }

    #[test]
    fn test_paused_session_stays_paused() {
        let catalog = catalog();
        let mut surface = SimulatedSurface::new();
        let mut switcher = SourceSwitchCoordinator::new();

        switcher.execute(request("low", 0.3), &state("standard", false), &catalog, &mut surface);
        let outcome = switcher.on_ready(&mut surface);
        assert!(matches!(outcome, SwitchOutcome::Completed { resumed: false, resumed_at, .. } if resumed_at == 0.0));
        assert!(!surface.calls().contains(&SurfaceCall::Play));
        assert!(surface.is_paused());
    }

    #[test]
    fn test_autoplay_rejection_is_not_an_error() {
        let catalog = catalog();
        let mut surface = SimulatedSurface::new();
        surface.set_block_autoplay(true);
        let mut switcher = SourceSwitchCoordinator::new();

        switcher.execute(request("low", 5.0), &state("standard", true), &catalog, &mut surface);
        let outcome = switcher.on_ready(&mut surface);
        assert!(matches!(outcome, SwitchOutcome::Completed { resumed: false, .. }));
    }

    #[test]
    fn test_fallback_chain_walk() {
        let catalog = catalog();
        let mut surface = SimulatedSurface::new();
        let mut switcher = SourceSwitchCoordinator::new();

        switcher.execute(request("highperf", 5.0), &state("standard", true), &catalog, &mut surface);

        let outcome = switcher.on_error(MediaErrorKind::Decode, &catalog, &mut surface);
        assert_eq!(
            outcome,
            SwitchOutcome::Loading {
                variant: VariantId::new("low"),
                attempt: 2
            }
        );
        let outcome = switcher.on_error(MediaErrorKind::Decode, &catalog, &mut surface);
        assert_eq!(
            outcome,
            SwitchOutcome::Loading {
                variant: VariantId::new("standard"),
                attempt: 3
            }
        );
        let outcome = switcher.on_error(MediaErrorKind::Network, &catalog, &mut surface);
        assert_eq!(
            outcome,
            SwitchOutcome::Exhausted {
                attempted: 3,
                kind: MediaErrorKind::Network
            }
        );
        assert!(!switcher.is_pending());
        assert_eq!(surface.load_count(), 3);
    }

    #[test]
    fn test_synchronous_load_failure_advances_chain() {
        let catalog = catalog();
        let mut surface = SimulatedSurface::new();
        surface.fail_source(catalog.get(&VariantId::new("mobile")).unwrap().source.clone());
        let mut switcher = SourceSwitchCoordinator::new();

        let outcome = switcher.execute(request("mobile", 5.0), &state("standard", true), &catalog, &mut surface);
        assert_eq!(
            outcome,
            SwitchOutcome::Loading {
                variant: VariantId::new("low"),
                attempt: 2
            }
        );
    }

    #[test]
    fn test_cancel_makes_callbacks_noops() {
        let catalog = catalog();
        let mut surface = SimulatedSurface::new();
        let mut switcher = SourceSwitchCoordinator::new();

        switcher.execute(request("low", 5.0), &state("standard", true), &catalog, &mut surface);
        switcher.cancel();
        surface.take_calls();

        assert_eq!(switcher.on_ready(&mut surface), SwitchOutcome::Ignored);
        assert_eq!(
            switcher.on_error(MediaErrorKind::Network, &catalog, &mut surface),
            SwitchOutcome::Ignored
        );
        assert!(surface.calls().is_empty());
    }
}
