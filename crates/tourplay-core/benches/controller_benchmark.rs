//! Benchmark tests for tourplay-core operations
//!
//! Run with: cargo bench -p tourplay-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tourplay_core::{
    BufferHealthMonitor, BufferSample, CatalogConfig, ConnectionInfo, ControllerConfig, ControllerMessage,
    DeviceProfiler, EffectiveType, EnvironmentSnapshot, MediaEvent, PlaybackController, QualityCatalog,
    ReadyState, SessionMetrics, SimulatedSurface, VariantId,
};

// ============================================================================
// Helpers
// ============================================================================

fn phone() -> EnvironmentSnapshot {
    EnvironmentSnapshot {
        logical_cores: Some(8),
        device_memory_gb: Some(4.0),
        pixel_ratio: Some(3.0),
        connection: Some(ConnectionInfo {
            effective_type: Some(EffectiveType::ThreeG),
            downlink_mbps: Some(1.5),
            save_data: false,
        }),
        battery_level: Some(0.4),
        user_agent: Some(
            "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 Mobile Safari/537.36".to_string(),
        ),
    }
}

fn sample(ahead: f64) -> BufferSample {
    BufferSample {
        buffered_ahead_secs: ahead,
        ready_state: ReadyState::HaveFutureData,
        is_playing: true,
        fully_buffered: false,
        timestamp_ms: 0,
    }
}

fn playing_controller() -> PlaybackController<SimulatedSurface> {
    let mut controller =
        PlaybackController::new(ControllerConfig::default(), EnvironmentSnapshot::default(), SimulatedSurface::new())
            .unwrap();
    controller.start().unwrap();
    controller.dispatch(ControllerMessage::Media(MediaEvent::CanPlay)).unwrap();
    controller.surface_mut().set_ready_state(ReadyState::HaveEnoughData);
    controller.surface_mut().set_buffered_ahead(5.0);
    controller
}

// ============================================================================
// Classification Benchmarks
// ============================================================================

fn bench_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("Device Classification");

    group.bench_function("profile_phone", |b| {
        let profiler = DeviceProfiler::new(phone());
        b.iter(|| black_box(profiler.profile()))
    });

    group.bench_function("profile_empty", |b| {
        let profiler = DeviceProfiler::new(EnvironmentSnapshot::default());
        b.iter(|| black_box(profiler.classify()))
    });

    group.bench_function("initial_variant", |b| {
        let catalog = QualityCatalog::with_template(&CatalogConfig::default()).unwrap();
        let profile = DeviceProfiler::new(phone()).profile();
        b.iter(|| black_box(catalog.initial_variant(&profile).id.clone()))
    });

    group.finish();
}

// ============================================================================
// Health Benchmarks
// ============================================================================

fn bench_health_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("Health Sampling");

    for &len in &[10usize, 100, 1000] {
        let levels: Vec<f64> = (0..len).map(|i| ((i * 7) % 50) as f64 / 10.0).collect();
        group.bench_with_input(BenchmarkId::new("sample_sequence", len), &levels, |b, levels| {
            b.iter(|| {
                let mut monitor = BufferHealthMonitor::new(1.0, 3.0);
                for &level in levels {
                    black_box(monitor.sample(Some(&sample(level))));
                }
                black_box(monitor.rebuffer_event_count())
            })
        });
    }

    group.finish();
}

// ============================================================================
// Dispatch Benchmarks
// ============================================================================

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("Controller Dispatch");

    group.bench_function("healthy_tick", |b| {
        let mut controller = playing_controller();
        let mut now_ms = 0u64;
        b.iter(|| {
            now_ms += 500;
            controller.dispatch(ControllerMessage::Tick { now_ms }).unwrap();
        })
    });

    group.bench_function("time_update", |b| {
        let mut controller = playing_controller();
        let mut t = 0.0;
        b.iter(|| {
            t += 0.25;
            controller
                .dispatch(ControllerMessage::Media(MediaEvent::TimeUpdate { current_time: t }))
                .unwrap();
        })
    });

    group.bench_function("downgrade_cycle", |b| {
        b.iter(|| {
            let mut controller = playing_controller();
            controller.dispatch(ControllerMessage::Tick { now_ms: 500 }).unwrap();
            controller.surface_mut().set_buffered_ahead(0.1);
            controller.dispatch(ControllerMessage::Tick { now_ms: 1000 }).unwrap();
            controller.dispatch(ControllerMessage::Media(MediaEvent::CanPlay)).unwrap();
            black_box(controller.state().variant.clone())
        })
    });

    group.bench_function("manual_select_suppressed", |b| {
        let mut controller = playing_controller();
        let current: VariantId = controller.state().variant.clone();
        b.iter(|| {
            controller
                .dispatch(ControllerMessage::SelectVariant(current.clone()))
                .unwrap();
        })
    });

    group.bench_function("telemetry_frame", |b| {
        let controller = playing_controller();
        b.iter(|| black_box(controller.telemetry_frame()))
    });

    group.finish();
}

// ============================================================================
// QoE Benchmarks
// ============================================================================

fn bench_qoe(c: &mut Criterion) {
    let metrics = SessionMetrics {
        quality_switches: 3,
        rebuffer_events: 2,
        stall_signals: 4,
        ..Default::default()
    };
    c.bench_function("qoe_score", |b| b.iter(|| black_box(metrics.qoe_score())));
}

criterion_group!(
    classification_benches,
    bench_classification,
);

criterion_group!(
    health_benches,
    bench_health_sampling,
);

criterion_group!(
    dispatch_benches,
    bench_dispatch,
);

criterion_group!(
    qoe_benches,
    bench_qoe,
);

criterion_main!(
    classification_benches,
    health_benches,
    dispatch_benches,
    qoe_benches,
);
