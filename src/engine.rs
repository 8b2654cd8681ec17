//! Orb engine: owns particles, targets, avatar state and the governor, and
//! runs the per-frame pipeline
//!
//! Inputs from collaborators are plain method calls that only mutate fields;
//! they are read at the start of the next `tick`. Inputs with a TTL are
//! stamped with the clock of the most recent tick.

use egui::{vec2, Painter, Pos2, Rect};
use image::RgbaImage;
use serde::Serialize;
use std::time::Duration;

use crate::config::{ColorScheme, OrbConfig};
use crate::error::{OrbError, Result};
use crate::governor::{Fidelity, FrameScheduler, GovernorEvent, HostFlags, SchedulerMode};
use crate::offscreen::{FrameLook, FrameRenderer};
use crate::overlays::{breathing, heartbeat_pulse, OverlayRenderer};
use crate::particles::SwarmEngine;
use crate::raster::{ImageSource, PointCloud, TargetKey, TargetRasterizer};
use crate::state::{ActivityState, AvatarState, OverrideMode, TargetSpec};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Physics, targets and decorations all ran.
    Full,
    /// Ring and breathing glow only (hidden, locked or loading host).
    Minimal,
    /// Called before the minimum interval elapsed; nothing ran.
    Skipped,
    /// Engine stopped; the host should not reschedule.
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameOutcome {
    pub kind: FrameKind,
    /// Delay until the next tick is due; `None` once stopped.
    pub next_frame_in: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    VisualizationComplete(String),
    LowFidelityEngaged { avg_frame_ms: f32 },
    LowFidelityRelaxed,
}

impl From<GovernorEvent> for EngineEvent {
    fn from(event: GovernorEvent) -> Self {
        match event {
            GovernorEvent::LowFidelityEngaged { avg_frame_ms } => {
                EngineEvent::LowFidelityEngaged { avg_frame_ms }
            }
            GovernorEvent::LowFidelityRelaxed => EngineEvent::LowFidelityRelaxed,
        }
    }
}

/// Best-effort diagnostics snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct PerformanceReport {
    pub avg_frame_ms: f32,
    pub fps: f32,
    pub slow_frames: usize,
    pub particle_count: usize,
    pub particles_updated: usize,
    pub cloud_len: usize,
    pub fidelity: Fidelity,
    pub mode: SchedulerMode,
    pub activity: ActivityState,
    pub rasterizations: u64,
    pub loading: bool,
    pub frames: u64,
}

pub struct OrbEngine {
    config: OrbConfig,
    colors: ColorScheme,

    avatar: AvatarState,
    rasterizer: TargetRasterizer,
    swarm: SwarmEngine,
    scheduler: FrameScheduler,
    overlays: OverlayRenderer,

    flags: HostFlags,
    events: Vec<EngineEvent>,
    running: bool,
    now: f64,
    last_kind: FrameKind,
    particles_updated: usize,
    frames: u64,
}

impl OrbEngine {
    pub fn new(config: OrbConfig) -> Result<Self> {
        let swarm = SwarmEngine::new(&config.swarm);
        Self::with_swarm(config, swarm)
    }

    /// Same as `new` with a reproducible particle layout.
    pub fn new_seeded(config: OrbConfig, seed: u64) -> Result<Self> {
        let swarm = SwarmEngine::new_seeded(&config.swarm, seed);
        Self::with_swarm(config, swarm)
    }

    fn with_swarm(config: OrbConfig, swarm: SwarmEngine) -> Result<Self> {
        if swarm.is_empty() {
            return Err(OrbError::NoParticles);
        }
        let rasterizer = TargetRasterizer::new(&config.raster, swarm.len(), config.cloud_ceiling())?;

        log::info!(
            "orb engine ready: {} particles, {}x{} target canvas",
            swarm.len(),
            config.raster.canvas_width,
            config.raster.canvas_height
        );

        Ok(Self {
            colors: config.get_color_scheme(),
            avatar: AvatarState::new(&config.avatar),
            scheduler: FrameScheduler::new(&config.governor),
            overlays: OverlayRenderer::new(&config.overlays),
            rasterizer,
            swarm,
            config,
            flags: HostFlags::default(),
            events: Vec::new(),
            running: true,
            now: 0.0,
            last_kind: FrameKind::Skipped,
            particles_updated: 0,
            frames: 0,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &OrbConfig {
        &self.config
    }

    pub fn colors(&self) -> &ColorScheme {
        &self.colors
    }

    pub fn avatar(&self) -> &AvatarState {
        &self.avatar
    }

    pub fn swarm(&self) -> &SwarmEngine {
        &self.swarm
    }

    pub fn current_cloud(&self) -> &PointCloud {
        self.rasterizer.current()
    }

    /// Identity of the cloud the swarm is gathering into, if any.
    pub fn current_target(&self) -> Option<&TargetKey> {
        self.rasterizer.current_key()
    }

    pub fn rasterizations(&self) -> u64 {
        self.rasterizer.rasterizations()
    }

    pub fn is_loading(&self) -> bool {
        self.rasterizer.is_loading()
    }

    pub fn fidelity(&self) -> Fidelity {
        self.scheduler.fidelity()
    }

    pub fn scheduler_mode(&self) -> SchedulerMode {
        self.scheduler.mode()
    }

    pub fn host_flags(&self) -> HostFlags {
        self.flags
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn last_frame_kind(&self) -> FrameKind {
        self.last_kind
    }

    pub fn particles_updated(&self) -> usize {
        self.particles_updated
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn set_color_scheme(&mut self, index: usize) {
        self.config.set_color_scheme(index);
        self.colors = self.config.get_color_scheme();
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    pub fn set_activity_state(&mut self, state: ActivityState, thought: Option<&str>) {
        self.avatar.set_activity_state(state, thought);
    }

    pub fn set_emotion(&mut self, label: &str) {
        self.avatar.set_emotion(label);
    }

    /// `ttl_ms == 0` uses the configured default.
    pub fn set_action(&mut self, label: &str, ttl_ms: u64) {
        self.avatar.set_action(label, ttl_ms, self.now);
    }

    pub fn set_override(&mut self, mode: OverrideMode, ttl_ms: u64) {
        let image = match &mode {
            OverrideMode::Image { data } => Some(data.clone()),
            _ => None,
        };
        self.avatar.set_override(mode, ttl_ms, self.now);

        if let Some(data) = image {
            if let Some(key) = self.avatar.active_override().and_then(|o| o.image_key()) {
                let key = key.to_string();
                self.rasterizer.request_image(&key, ImageSource::Bytes(data));
            }
        }
    }

    pub fn clear_override(&mut self) {
        self.avatar.clear_override();
    }

    /// Start decoding an image target; the swarm keeps its previous target
    /// until the decode lands on a later frame.
    pub fn set_image_target(&mut self, source: ImageSource, key: &str) {
        self.avatar.set_image_key(Some(key.to_string()));
        self.rasterizer.request_image(key, source);
    }

    pub fn clear_image_target(&mut self) {
        self.avatar.set_image_key(None);
    }

    pub fn request_visualization_hold(&mut self, subject: &str, seconds: f32) {
        self.avatar.request_visualization_hold(subject, seconds, self.now);
    }

    /// Synthesize the default reply pattern when no override is active.
    pub fn on_reply_complete(&mut self, reply: &str) {
        if self.avatar.synthesize_reply_override(reply, self.now) {
            log::debug!("reply pattern override synthesized");
        }
    }

    pub fn set_performance_focus(&mut self, enabled: bool) {
        self.flags.performance_focus = enabled;
    }

    pub fn on_host_hidden(&mut self) {
        self.flags.hidden = true;
    }

    pub fn on_host_visible(&mut self) {
        self.flags.hidden = false;
    }

    pub fn on_host_locked(&mut self) {
        self.flags.locked = true;
    }

    pub fn on_host_unlocked(&mut self) {
        self.flags.locked = false;
    }

    pub fn set_host_loading(&mut self, loading: bool) {
        self.flags.loading = loading;
    }

    /// Stop producing frames; `tick` reports `Stopped` and asks for no reschedule.
    pub fn stop(&mut self) {
        if self.running {
            log::info!("orb engine stopped");
        }
        self.running = false;
    }

    pub fn start(&mut self) {
        if !self.running {
            log::info!("orb engine started");
            self.scheduler.restart();
        }
        self.running = true;
    }

    // ========================================================================
    // Frame pipeline
    // ========================================================================

    /// Run one frame at time `now` (seconds, monotonic).
    pub fn tick(&mut self, now: f64) -> FrameOutcome {
        if !self.running {
            self.last_kind = FrameKind::Stopped;
            return FrameOutcome {
                kind: FrameKind::Stopped,
                next_frame_in: None,
            };
        }

        self.now = now;
        let Some(dt) = self.scheduler.admit(now, self.flags) else {
            return FrameOutcome {
                kind: FrameKind::Skipped,
                next_frame_in: Some(self.scheduler.next_frame_in(now)),
            };
        };
        self.frames += 1;

        // Fixed order: expiry, hold timer, energy, then target resolution
        self.avatar.expire(now);
        if let Some(subject) = self.avatar.advance_hold(now) {
            self.events.push(EngineEvent::VisualizationComplete(subject));
        }
        self.avatar.smooth_energy(dt);

        let kind = if self.scheduler.is_minimal() {
            self.overlays.advance_clock(dt);
            self.particles_updated = 0;
            FrameKind::Minimal
        } else {
            self.rasterizer.poll_decodes();
            let wanted = self.avatar.wanted_image_keys();
            self.rasterizer.retain_images(&wanted);

            let spec = self.avatar.resolve(|key| self.rasterizer.image_status(key));
            self.apply_target(spec);

            let phase = self.swarm.phase();
            self.particles_updated = self.swarm.step(
                dt,
                self.rasterizer.current(),
                self.avatar.activity(),
                phase,
                self.scheduler.stride(),
            );

            let decorations = self.avatar.decorations();
            self.overlays.update(dt, self.avatar.energy(), decorations.waveform);
            FrameKind::Full
        };

        self.events
            .extend(self.scheduler.drain_events().into_iter().map(EngineEvent::from));
        self.last_kind = kind;

        FrameOutcome {
            kind,
            next_frame_in: Some(self.scheduler.next_frame_in(now)),
        }
    }

    fn apply_target(&mut self, spec: TargetSpec) {
        match spec {
            // Image still decoding: keep pulling toward whatever we had
            TargetSpec::Hold => {}
            TargetSpec::Empty => {
                if self.rasterizer.current_key().is_some() {
                    log::debug!("target cleared, back to orbit");
                    self.rasterizer.clear_current();
                    self.swarm.retarget();
                }
            }
            other => {
                let Some(key) = other.key(self.avatar.activity()) else {
                    return;
                };
                if self.rasterizer.current_key() != Some(&key) {
                    self.rasterizer.resolve(&key);
                    self.swarm.retarget();
                }
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn performance_report(&self) -> PerformanceReport {
        let avg = self.scheduler.avg_frame_ms();
        PerformanceReport {
            avg_frame_ms: avg,
            fps: if avg > 0.0 { 1000.0 / avg } else { 0.0 },
            slow_frames: self.scheduler.slow_in_window(),
            particle_count: self.swarm.len(),
            particles_updated: self.particles_updated,
            cloud_len: self.rasterizer.current().len(),
            fidelity: self.scheduler.fidelity(),
            mode: self.scheduler.mode(),
            activity: self.avatar.activity(),
            rasterizations: self.rasterizer.rasterizations(),
            loading: self.rasterizer.is_loading(),
            frames: self.frames,
        }
    }

    // ========================================================================
    // Presentation
    // ========================================================================

    /// Scale from engine units to screen points so the canvas and the ring fit.
    fn view_scale(&self, rect: Rect) -> f32 {
        let reach = self.config.overlays.ring_radius * 1.3;
        let half_w = (self.config.raster.canvas_width as f32 / 2.0).max(reach);
        let half_h = (self.config.raster.canvas_height as f32 / 2.0).max(reach);
        (rect.width() / (2.0 * half_w)).min(rect.height() / (2.0 * half_h)).max(0.05)
    }

    /// Draw the most recent frame into `rect`.
    pub fn render(&self, painter: &Painter, rect: Rect) {
        let bg = self.colors.background;
        painter.rect_filled(rect, 0.0, egui::Color32::from_rgb(bg[0], bg[1], bg[2]));

        let scale = self.view_scale(rect);
        if self.last_kind == FrameKind::Minimal {
            self.overlays.render_minimal(painter, rect, scale, &self.colors);
            return;
        }

        let activity = self.avatar.activity();
        self.overlays.render(
            painter,
            rect,
            scale,
            &self.colors,
            &self.avatar.decorations(),
            self.avatar.heartbeat_bpm(),
            self.avatar.energy(),
            self.scheduler.fidelity(),
        );
        self.swarm.render(
            painter,
            rect,
            scale,
            self.colors.palette(activity),
            activity,
            self.avatar.energy(),
            self.scheduler.stride(),
        );
    }

    /// Headless rendering of the current frame at canvas resolution, framed
    /// the same way as the live preview.
    pub fn snapshot(&self) -> Result<RgbaImage> {
        let (width, height) = (self.config.raster.canvas_width, self.config.raster.canvas_height);
        let frame = Rect::from_min_size(Pos2::ZERO, vec2(width as f32, height as f32));
        let minimal = self.last_kind == FrameKind::Minimal;
        let time = self.overlays.time();
        let look = FrameLook {
            activity: self.avatar.activity(),
            energy: self.avatar.energy(),
            pulse: if minimal {
                breathing(time)
            } else {
                heartbeat_pulse(time, self.avatar.heartbeat_bpm())
            },
            ring_radius: self.config.overlays.ring_radius,
            glow_intensity: self.config.overlays.glow_intensity,
            scale: self.view_scale(frame),
            minimal,
            stride: self.scheduler.stride(),
        };

        let mut renderer = FrameRenderer::new(width, height)?;
        Ok(renderer.render_frame(&self.swarm, &self.colors, &look))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecodeStrategy;
    use pretty_assertions::assert_eq;

    fn engine() -> OrbEngine {
        let mut config = OrbConfig::default();
        config.swarm.particle_count = 200;
        config.raster.decode = DecodeStrategy::Deferred;
        OrbEngine::new_seeded(config, 42).unwrap()
    }

    #[test]
    fn zero_particles_is_rejected() {
        let mut config = OrbConfig::default();
        config.swarm.particle_count = 0;
        assert!(matches!(OrbEngine::new(config), Err(OrbError::NoParticles)));
    }

    #[test]
    fn unavailable_surface_is_fatal_at_construction() {
        let mut config = OrbConfig::default();
        config.raster.canvas_height = 0;
        assert!(matches!(
            OrbEngine::new(config),
            Err(OrbError::SurfaceUnavailable { .. })
        ));
    }

    #[test]
    fn stopped_engine_asks_for_no_reschedule() {
        let mut engine = engine();
        engine.stop();
        assert_eq!(
            engine.tick(0.0),
            FrameOutcome {
                kind: FrameKind::Stopped,
                next_frame_in: None
            }
        );

        engine.start();
        let outcome = engine.tick(10.0);
        assert_eq!(outcome.kind, FrameKind::Full);
        assert!(outcome.next_frame_in.is_some());
    }

    #[test]
    fn early_tick_is_skipped() {
        let mut engine = engine();
        assert_eq!(engine.tick(0.0).kind, FrameKind::Full);
        let outcome = engine.tick(0.001);
        assert_eq!(outcome.kind, FrameKind::Skipped);
        assert!(outcome.next_frame_in.is_some_and(|d| d > Duration::ZERO));
    }

    #[test]
    fn dormant_engine_orbits_with_an_empty_cloud() {
        let mut engine = engine();
        engine.tick(0.0);
        assert!(engine.current_cloud().is_empty());
        assert_eq!(engine.rasterizations(), 0);
    }

    #[test]
    fn reply_completion_adds_a_pattern_decoration() {
        let mut engine = engine();
        engine.set_activity_state(ActivityState::Speaking, None);
        engine.tick(0.0);
        engine.on_reply_complete("Here is the summary you asked for.");
        assert!(engine.avatar().decorations().pattern.is_some());
    }

    #[test]
    fn image_override_decodes_and_wins() {
        let mut engine = engine();
        engine.set_activity_state(ActivityState::Listening, Some("thinking aloud"));
        engine.tick(0.0);

        let image = RgbaImage::from_pixel(32, 32, image::Rgba([255, 255, 255, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        engine.set_override(OverrideMode::Image { data: bytes }, 5000);
        engine.set_action("smile", 5000);

        engine.tick(1.0 / 60.0);
        let key = engine.avatar().active_override().and_then(|o| o.image_key()).unwrap();
        assert_eq!(
            engine.rasterizer.current_key().map(|k| k.payload.as_str()),
            Some(key)
        );
    }

    #[test]
    fn report_serializes_for_diagnostics() {
        let mut engine = engine();
        engine.tick(0.0);
        let report = engine.performance_report();
        assert_eq!(report.particle_count, 200);
        assert_eq!(report.frames, 1);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["fidelity"], "full");
        assert_eq!(json["mode"], "active");
    }

    #[test]
    fn snapshot_matches_canvas_size() {
        let mut engine = engine();
        engine.set_activity_state(ActivityState::Speaking, Some("hi"));
        engine.tick(0.0);
        let frame = engine.snapshot().unwrap();
        assert_eq!(frame.dimensions(), (640, 320));
    }

    #[test]
    fn snapshot_keeps_ring_and_glow_inside_the_frame() {
        let mut engine = engine();
        engine.set_activity_state(ActivityState::Speaking, Some("hi"));
        engine.tick(0.0);
        let frame = engine.snapshot().unwrap();
        let (width, height) = frame.dimensions();

        // The ring is wider than the canvas is tall, so it must be scaled down
        assert!(engine.config().overlays.ring_radius > height as f32 / 2.0);
        let background = *frame.get_pixel(0, 0);
        for x in 0..width {
            assert_eq!(*frame.get_pixel(x, 0), background, "top row lit at x={x}");
            assert_eq!(*frame.get_pixel(x, height - 1), background, "bottom row lit at x={x}");
        }
        assert!((0..width).any(|x| *frame.get_pixel(x, height / 2) != background));
    }
}
