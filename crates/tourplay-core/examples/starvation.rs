//! Buffer starvation example
//!
//! Drives a controller against a simulated surface: playback starts on the
//! device's initial variant, the buffer drains, and the controller steps
//! down to the safe variant while keeping the playback position.
//!
//! Run with: cargo run -p tourplay-core --example starvation

use tourplay_core::{
    ChannelObserver, ControllerConfig, ControllerEvent, ControllerMessage, EnvironmentSnapshot, MediaEvent,
    PlaybackController, ReadyState, SimulatedSurface,
};

fn main() -> tourplay_core::Result<()> {
    println!("Tourplay Core - Buffer Starvation Example");
    println!("==========================================\n");

    let env = EnvironmentSnapshot {
        logical_cores: Some(4),
        device_memory_gb: Some(2.0),
        ..Default::default()
    };

    let mut controller = PlaybackController::new(ControllerConfig::default(), env, SimulatedSurface::new())?;
    let (observer, mut events) = ChannelObserver::new();
    controller.add_observer(Box::new(observer));

    println!("Device profile: {:?}", controller.profile());
    controller.start()?;

    // Source loaded, buffer fills
    controller.surface_mut().set_ready_state(ReadyState::HaveEnoughData);
    controller.dispatch(ControllerMessage::Media(MediaEvent::CanPlay))?;
    controller.surface_mut().set_buffered_ahead(6.0);

    let mut now_ms = 0;
    for _ in 0..4 {
        now_ms += 500;
        controller.surface_mut().set_current_time(now_ms as f64 / 1000.0);
        controller.dispatch(ControllerMessage::Tick { now_ms })?;
    }

    // Network collapses
    println!("\nDraining buffer at {:.1}s...", controller.surface().current_time());
    controller.surface_mut().set_buffered_ahead(0.1);
    controller.surface_mut().set_ready_state(ReadyState::HaveCurrentData);
    now_ms += 500;
    controller.dispatch(ControllerMessage::Tick { now_ms })?;

    // The replacement source becomes playable
    controller.surface_mut().set_ready_state(ReadyState::HaveEnoughData);
    controller.dispatch(ControllerMessage::Media(MediaEvent::CanPlay))?;

    println!("\nEvents:");
    while let Ok(event) = events.try_recv() {
        match event {
            ControllerEvent::QualityChanged(variant) => println!("  quality -> {}", variant),
            ControllerEvent::HealthStateChanged(state) => println!("  health  -> {}", state),
            ControllerEvent::PlaybackError { terminal, message } => {
                println!("  error (terminal={}): {}", terminal, message)
            }
        }
    }

    let state = controller.state();
    println!("\nNow playing {} from {:.2}s", state.variant, state.position_secs);
    println!("QoE score: {:.1}", controller.metrics().qoe_score());

    controller.dispatch(ControllerMessage::Teardown)?;
    Ok(())
}
