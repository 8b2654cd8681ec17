//! Swarm Physics Engine for Orb Studio
//! Particles orbit the center and gather into target clouds with a
//! swarm-then-settle spring, swirl, wander and per-particle jitter

use crate::config::SwarmConfig;
use crate::raster::PointCloud;
use crate::state::ActivityState;
use egui::{Color32, Painter, Rect, Vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

/// Individual particle data
#[derive(Clone, Debug)]
pub struct Particle {
    pub pos: Vec2,
    pub vel: Vec2,
    /// Fixed orbital radius used when no target is active
    pub orbit_radius: f32,
    pub angle: f32,
    /// Radians per 60 Hz frame before the activity multiplier
    pub angular_speed: f32,
    pub seed: f32,
    pub mass: f32,
    pub size: f32,
    pub color_index: usize,
}

/// Where the swarm is in its pursuit of the current target.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SwarmPhase {
    /// Past the settle threshold: stronger pull, stronger damping.
    pub settled: bool,
    /// Inside the initial burst window: boosted wander.
    pub bursting: bool,
}

pub struct SwarmEngine {
    pub particles: Vec<Particle>,
    config: SwarmConfig,
    time: f32,
    target_changed_at: f32,
    frame_index: usize,
    updated_last_step: usize,
}

impl SwarmEngine {
    pub fn new(config: &SwarmConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic particle layout for tests and snapshots.
    pub fn new_seeded(config: &SwarmConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &SwarmConfig, mut rng: StdRng) -> Self {
        let speed_range = (config.max_angular_speed - config.min_angular_speed).max(1e-6);
        let size_range = (config.max_size - config.min_size).max(0.01);
        let mass_range = (config.max_mass - config.min_mass).max(0.01);

        let particles = (0..config.particle_count)
            .map(|_| {
                let orbit_radius =
                    config.base_radius + rng.gen_range(-1.0..1.0) * config.radius_spread;
                let angle = rng.gen_range(0.0..TAU);
                Particle {
                    pos: Vec2::angled(angle) * orbit_radius,
                    vel: Vec2::ZERO,
                    orbit_radius,
                    angle,
                    angular_speed: config.min_angular_speed + rng.gen_range(0.0..speed_range),
                    seed: rng.gen_range(0.0..TAU),
                    mass: config.min_mass + rng.gen_range(0.0..mass_range),
                    size: config.min_size + rng.gen_range(0.0..size_range),
                    color_index: rng.gen_range(0..64),
                }
            })
            .collect();

        Self {
            particles,
            config: config.clone(),
            time: 0.0,
            target_changed_at: f32::NEG_INFINITY,
            frame_index: 0,
            updated_last_step: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn updated_last_step(&self) -> usize {
        self.updated_last_step
    }

    /// Restart the gather-then-settle timing; call whenever the target changes.
    pub fn retarget(&mut self) {
        self.target_changed_at = self.time;
    }

    pub fn phase(&self) -> SwarmPhase {
        let since = self.time - self.target_changed_at;
        SwarmPhase {
            settled: since >= self.config.settle_after_secs,
            bursting: since < self.config.swarm_window_secs,
        }
    }

    /// Fallback orbital position for a particle at the current time.
    fn orbital_position(&self, p: &Particle) -> Vec2 {
        let wobble = (self.time * self.config.wobble_speed + p.seed).sin() * self.config.wobble_amplitude;
        Vec2::angled(p.angle) * (p.orbit_radius + wobble)
    }

    /// Sum of two offset sines, so particles never collapse onto one pixel.
    fn jitter(&self, p: &Particle) -> Vec2 {
        let t = self.time * self.config.jitter_speed;
        let amp = self.config.jitter_amplitude;
        Vec2::new(
            ((t + p.seed).sin() + (t * 1.7 + p.seed * 2.3).sin()) * amp,
            ((t * 1.3 + p.seed * 1.1).cos() + (t * 0.6 + p.seed * 3.1).sin()) * amp,
        )
    }

    fn max_speed(&self, activity: ActivityState, size: f32) -> f32 {
        let size_span = (self.config.max_size - self.config.min_size).max(0.01);
        let size_norm = ((size - self.config.min_size) / size_span).clamp(0.0, 1.0);
        // Larger particles move a little slower
        self.config.max_speed * self.config.max_speed_scale.get(activity) * (1.2 - 0.4 * size_norm)
    }

    /// Advance the swarm by `dt` seconds. With `stride > 1` only every
    /// stride-th particle (rotating each step) is integrated, with a
    /// proportionally larger step. Returns how many particles were updated.
    pub fn step(
        &mut self,
        dt: f32,
        cloud: &PointCloud,
        activity: ActivityState,
        phase: SwarmPhase,
        stride: usize,
    ) -> usize {
        let stride = stride.max(1);
        let dt = dt.clamp(0.0, self.config.max_step_secs);
        self.time += dt;
        self.frame_index = self.frame_index.wrapping_add(1);

        // Work in "60 Hz frames" so tunables read as per-frame amounts
        let f = dt * 60.0 * stride as f32;
        if f <= 0.0 {
            self.updated_last_step = 0;
            return 0;
        }

        let cfg = &self.config;
        let (pull, damping) = if phase.settled {
            (cfg.settle_pull, cfg.settle_damping)
        } else {
            (cfg.swarm_pull, cfg.swarm_damping)
        };
        let damping = damping.powf(f);
        let orbit_mult = cfg.orbit_speed.get(activity);
        let swirl = cfg.swirl.get(activity);
        let falloff = cfg.swirl_falloff.max(1.0);
        let swirl_floor = cfg.swirl_floor.clamp(0.0, 1.0);
        let wander_amp = if phase.bursting {
            cfg.wander_amplitude * cfg.swarm_wander_boost
        } else {
            cfg.wander_amplitude
        };
        let wander_t = self.time * cfg.wander_speed;

        let offset = self.frame_index % stride;
        let mut updated = 0;

        for i in 0..self.particles.len() {
            if stride > 1 && (i + offset) % stride != 0 {
                continue;
            }

            self.particles[i].angle =
                (self.particles[i].angle + self.particles[i].angular_speed * orbit_mult * f) % TAU;

            let p = &self.particles[i];
            let desired = match cloud.point_for(i) {
                Some(point) => point + self.jitter(p),
                None => self.orbital_position(p),
            };
            let max_speed = self.max_speed(activity, p.size);

            let p = &mut self.particles[i];
            let to_desired = desired - p.pos;

            // Spring toward the desired position
            p.vel += to_desired * (pull * f / p.mass);

            // Tangential swirl around the center, weaker close to the target
            let perp = Vec2::new(-desired.y, desired.x);
            let closeness = (to_desired.length() / falloff).clamp(swirl_floor, 1.0);
            p.vel += perp * (swirl * closeness * f);

            // Wander
            p.vel += Vec2::new(
                (wander_t + p.seed).sin(),
                (wander_t * 0.8 + p.seed * 1.3).cos(),
            ) * (wander_amp * f);

            p.vel *= damping;

            let speed = p.vel.length();
            if speed > max_speed {
                p.vel *= max_speed / speed;
            }

            p.pos += p.vel * f;
            updated += 1;
        }

        self.updated_last_step = updated;
        updated
    }

    /// Alpha (0..1) and size multiplier for the whole swarm; both grow with
    /// energy and with activity (speaking > thinking > listening > dormant).
    pub fn appearance(&self, activity: ActivityState, energy: f32) -> (f32, f32) {
        let energy = energy.clamp(0.0, 1.0);
        (
            (self.config.alpha.get(activity) * (0.5 + 0.5 * energy)).clamp(0.0, 1.0),
            self.config.size_scale.get(activity) * (0.8 + 0.4 * energy),
        )
    }

    /// Render particles to egui painter
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        painter: &Painter,
        rect: Rect,
        scale: f32,
        palette: &[[u8; 3]],
        activity: ActivityState,
        energy: f32,
        stride: usize,
    ) {
        let stride = stride.max(1);
        let (alpha_base, size_mult) = self.appearance(activity, energy);
        let size_base = size_mult * scale.max(0.1);
        let center = rect.center();

        for (i, p) in self.particles.iter().enumerate() {
            if stride > 1 && i % stride != 0 {
                continue;
            }

            let alpha = (alpha_base * 255.0).min(255.0) as u8;
            if alpha < 3 {
                continue;
            }

            let rgb = palette
                .get(p.color_index % palette.len().max(1))
                .copied()
                .unwrap_or([255, 255, 255]);
            let pos = center + p.pos * scale;
            let size = p.size * size_base;

            // Soft halo then core
            let glow_alpha = (alpha / 3).max(5);
            painter.circle_filled(
                pos,
                size * 1.8,
                Color32::from_rgba_unmultiplied(rgb[0], rgb[1], rgb[2], glow_alpha),
            );
            painter.circle_filled(
                pos,
                size,
                Color32::from_rgba_unmultiplied(rgb[0], rgb[1], rgb[2], alpha),
            );
        }
    }
}
