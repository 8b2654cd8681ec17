//! End-to-end frame scenarios driven through `OrbEngine::tick` with a
//! simulated clock.

use orb_renderer::config::{DecodeStrategy, OrbConfig};
use orb_renderer::engine::{EngineEvent, FrameKind, OrbEngine};
use orb_renderer::governor::{Fidelity, SchedulerMode};
use orb_renderer::raster::{ImageSource, TargetKey, TargetKind, TargetRasterizer};
use orb_renderer::state::{ActivityState, OverrideMode};
use pretty_assertions::assert_eq;

const HZ: f64 = 60.0;

fn config(particles: usize) -> OrbConfig {
    let mut config = OrbConfig::default();
    config.swarm.particle_count = particles;
    config.raster.decode = DecodeStrategy::Deferred;
    config
}

fn engine(particles: usize) -> OrbEngine {
    OrbEngine::new_seeded(config(particles), 1234).unwrap()
}

/// Tick at 60 Hz for frames `from..to`, collecting events.
fn run(engine: &mut OrbEngine, from: u32, to: u32) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    for k in from..to {
        engine.tick(k as f64 / HZ);
        events.extend(engine.drain_events());
    }
    events
}

fn disc_png() -> Vec<u8> {
    let mut img = image::RgbaImage::from_pixel(64, 64, image::Rgba([0, 0, 0, 255]));
    for (x, y, px) in img.enumerate_pixels_mut() {
        let (dx, dy) = (x as f32 - 32.0, y as f32 - 32.0);
        if dx * dx + dy * dy < 20.0 * 20.0 {
            *px = image::Rgba([255, 255, 255, 255]);
        }
    }
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

#[test]
fn thought_text_is_rasterized_on_the_next_frame() {
    let mut engine = engine(1400);
    engine.set_activity_state(ActivityState::Thinking, Some("hello world"));
    engine.tick(0.0);

    let cfg = config(1400);
    let mut reference = TargetRasterizer::new(&cfg.raster, 1400, cfg.cloud_ceiling()).unwrap();
    let key = TargetKey::new(TargetKind::Text, "hello world", ActivityState::Thinking);
    let expected = reference.resolve(&key).clone();

    let cloud = engine.current_cloud();
    assert!(!cloud.is_empty());
    assert!(cloud.len() <= 1400);
    assert_eq!(cloud, &expected);
    assert_eq!(engine.current_target(), Some(&key));
}

#[test]
fn swarm_converges_onto_the_text_cloud() {
    let mut engine = engine(400);
    engine.set_activity_state(ActivityState::Thinking, Some("hi"));
    run(&mut engine, 0, 900);

    let points = engine.current_cloud().points().to_vec();
    assert!(!points.is_empty());
    for p in &engine.swarm().particles {
        let nearest = points
            .iter()
            .map(|t| (p.pos - *t).length())
            .fold(f32::INFINITY, f32::min);
        assert!(nearest < 5.0, "particle {nearest:.2} px from the cloud");
    }
}

#[test]
fn dormant_ignores_thought_and_action() {
    let mut engine = engine(300);
    engine.set_activity_state(ActivityState::Dormant, Some("still here"));
    engine.tick(0.0);
    engine.set_action("wave", 5000);
    run(&mut engine, 1, 120);

    assert!(engine.current_cloud().is_empty());
    assert_eq!(engine.current_target(), None);
    assert_eq!(engine.rasterizations(), 0);
}

#[test]
fn image_target_beats_a_live_action() {
    let mut engine = engine(300);
    engine.set_activity_state(ActivityState::Listening, Some("looking"));
    engine.tick(0.0);

    engine.set_action("wave", 5000);
    engine.set_image_target(ImageSource::Bytes(disc_png()), "disc");
    engine.tick(1.0 / HZ);

    let target = engine.current_target().unwrap();
    assert_eq!(target.kind, TargetKind::Image);
    assert_eq!(target.payload, "disc");

    // Dropping the image falls back to the action
    engine.clear_image_target();
    engine.tick(2.0 / HZ);
    assert_eq!(engine.current_target().map(|k| k.kind), Some(TargetKind::Action));
}

#[test]
fn previous_cloud_is_kept_while_an_image_decodes() {
    let mut cfg = config(300);
    cfg.raster.decode = DecodeStrategy::Staged;
    let mut engine = OrbEngine::new_seeded(cfg, 1234).unwrap();
    engine.set_activity_state(ActivityState::Thinking, Some("hi"));
    engine.tick(0.0);
    let text_key = engine.current_target().cloned();
    let text_cloud = engine.current_cloud().clone();
    assert!(!text_cloud.is_empty());

    engine.set_image_target(ImageSource::Bytes(disc_png()), "disc");
    engine.tick(1.0 / HZ);
    assert!(engine.is_loading());
    assert_eq!(engine.current_target().cloned(), text_key);
    assert_eq!(engine.current_cloud(), &text_cloud);
    assert_eq!(engine.particles_updated(), 300);

    engine.tick(2.0 / HZ);
    assert!(!engine.is_loading());
    let target = engine.current_target().unwrap();
    assert_eq!(target.kind, TargetKind::Image);
    assert_eq!(target.payload, "disc");
    assert_ne!(engine.current_cloud(), &text_cloud);
}

#[test]
fn long_thought_stays_reachable_with_few_particles() {
    let mut cfg = OrbConfig::default();
    cfg.apply_preset("Lightweight");
    cfg.raster.decode = DecodeStrategy::Deferred;
    let particles = cfg.swarm.particle_count;
    assert_eq!(particles, 600);

    let thought = "THE QUICK BROWN FOX JUMPS OVER THE LAZY DOG WHILE WE WAIT HERE";
    let mut engine = OrbEngine::new_seeded(cfg.clone(), 1234).unwrap();
    engine.set_activity_state(ActivityState::Thinking, Some(thought));
    engine.tick(0.0);

    let cloud = engine.current_cloud();
    assert!(!cloud.is_empty());
    assert!(cloud.len() <= particles, "{} points for {particles} particles", cloud.len());

    // Every point has a particle assigned to it
    let reachable: Vec<_> = (0..particles).filter_map(|i| cloud.point_for(i)).collect();
    for point in cloud.points() {
        assert!(reachable.contains(point), "{point:?} has no particle");
    }

    // The bottom line of text is still covered
    let mut full = TargetRasterizer::new(&cfg.raster, particles, 100_000).unwrap();
    let uncapped = full.rasterize_text(thought);
    let lowest = |points: &[egui::Vec2]| points.iter().map(|p| p.y).fold(f32::MIN, f32::max);
    let text_bottom = lowest(uncapped.points());
    assert!(
        lowest(&reachable) >= text_bottom - 12.0,
        "reachable bottom {} vs text bottom {text_bottom}",
        lowest(&reachable)
    );
}

#[test]
fn expired_action_leaves_resolution_on_the_expiry_frame() {
    let mut engine = engine(300);
    engine.set_activity_state(ActivityState::Listening, None);
    engine.tick(0.0);
    engine.set_action("wave", 1000);

    engine.tick(0.5);
    assert_eq!(engine.current_target().map(|k| k.kind), Some(TargetKind::Action));

    engine.tick(1.0);
    assert!(engine.avatar().action().is_none());
    assert_eq!(
        engine.current_target().map(|k| k.kind),
        Some(TargetKind::StateGlyph)
    );
}

#[test]
fn expired_override_frees_the_slot() {
    let mut engine = engine(300);
    engine.set_activity_state(ActivityState::Thinking, None);
    engine.tick(0.0);
    engine.set_override(
        OverrideMode::FreeText {
            text: "brb".to_string(),
        },
        500,
    );

    engine.tick(0.25);
    assert_eq!(engine.current_target().map(|k| k.payload.as_str()), Some("brb"));

    engine.tick(0.5);
    assert!(engine.avatar().active_override().is_none());
    assert_eq!(
        engine.current_target().map(|k| k.kind),
        Some(TargetKind::StateGlyph)
    );
}

#[test]
fn heartbeat_follows_the_state_table() {
    let mut engine = engine(100);
    let expected = [
        (ActivityState::Dormant, 0.0),
        (ActivityState::Listening, 64.0),
        (ActivityState::Thinking, 96.0),
        (ActivityState::Speaking, 82.0),
    ];
    for (state, bpm) in expected {
        engine.set_activity_state(state, None);
        assert_eq!(engine.avatar().heartbeat_bpm(), bpm, "{state}");
    }

    engine.set_emotion("Calm and relaxed");
    assert_eq!(engine.avatar().heartbeat_bpm(), 58.0);
    engine.set_emotion("anxious");
    assert_eq!(engine.avatar().heartbeat_bpm(), 110.0);

    // Emotion never wakes a dormant orb
    engine.set_activity_state(ActivityState::Dormant, None);
    assert_eq!(engine.avatar().heartbeat_bpm(), 0.0);
}

#[test]
fn slow_frames_engage_low_fidelity_and_thin_the_update() {
    let mut engine = engine(300);
    engine.set_activity_state(ActivityState::Speaking, None);
    engine.tick(0.0);
    engine.tick(1.0 / HZ);
    assert_eq!(engine.particles_updated(), 300);

    // 120 ms per frame, well past the 90 ms threshold
    let mut now = 1.0 / HZ;
    let mut events = Vec::new();
    for _ in 0..7 {
        now += 0.12;
        engine.tick(now);
        events.extend(engine.drain_events());
    }
    assert_eq!(engine.fidelity(), Fidelity::Full);
    assert!(events.is_empty());

    now += 0.12;
    engine.tick(now);
    events.extend(engine.drain_events());
    assert_eq!(engine.fidelity(), Fidelity::Low);
    assert!(matches!(
        events.as_slice(),
        [EngineEvent::LowFidelityEngaged { avg_frame_ms }] if *avg_frame_ms > 50.0
    ));
    assert_eq!(engine.particles_updated(), 100);

    // A full window of fast frames restores fidelity
    for _ in 0..30 {
        now += 1.0 / HZ;
        engine.tick(now);
        events.extend(engine.drain_events());
    }
    assert_eq!(engine.fidelity(), Fidelity::Full);
    assert_eq!(events.last(), Some(&EngineEvent::LowFidelityRelaxed));
    assert_eq!(engine.particles_updated(), 300);
}

#[test]
fn visualization_hold_completes_exactly_once() {
    let mut engine = engine(300);
    engine.set_activity_state(ActivityState::Listening, None);
    engine.tick(0.0);
    engine.request_visualization_hold("a red apple", 3.0);

    let mut completions = Vec::new();
    for k in 1..240u32 {
        let now = k as f64 / HZ;
        if k == 60 {
            // Transitions during the hold are ignored
            engine.set_activity_state(ActivityState::Speaking, None);
        }
        engine.tick(now);
        for event in engine.drain_events() {
            if let EngineEvent::VisualizationComplete(subject) = event {
                completions.push((k, subject));
            }
        }

        if now < 3.0 {
            assert_eq!(engine.avatar().activity(), ActivityState::Thinking);
            assert!(matches!(
                engine.avatar().active_override().map(|o| &o.mode),
                Some(OverrideMode::GlyphCloud { glyphs }) if glyphs == "a red apple"
            ));
        }
    }

    assert_eq!(completions, vec![(180, "a red apple".to_string())]);
    assert_eq!(engine.avatar().activity(), ActivityState::Listening);
    assert!(engine.avatar().active_override().is_none());
}

#[test]
fn hidden_host_renders_minimal_frames_at_the_idle_rate() {
    let mut engine = engine(300);
    engine.set_activity_state(ActivityState::Thinking, Some("busy"));
    engine.tick(0.0);
    let rasterized = engine.rasterizations();
    assert_eq!(rasterized, 1);

    engine.on_host_hidden();
    engine.set_activity_state(ActivityState::Thinking, Some("something new"));

    let mut minimal = 0;
    for k in 1..=60u32 {
        let outcome = engine.tick(k as f64 / HZ);
        match outcome.kind {
            FrameKind::Minimal => minimal += 1,
            FrameKind::Skipped => {}
            other => panic!("unexpected {other:?} frame while hidden"),
        }
    }
    assert_eq!(engine.scheduler_mode(), SchedulerMode::Idle);
    assert_eq!(minimal, 4);
    assert_eq!(engine.rasterizations(), rasterized);
    assert_eq!(engine.particles_updated(), 0);

    engine.on_host_visible();
    let outcome = engine.tick(61.0 / HZ);
    assert_eq!(outcome.kind, FrameKind::Full);
    assert_eq!(engine.rasterizations(), rasterized + 1);
    assert_eq!(engine.current_target().map(|k| k.payload.as_str()), Some("something new"));
}
