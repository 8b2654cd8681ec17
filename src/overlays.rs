//! Decorative Overlay Renderer for Orb Studio
//! Ring and heartbeat glow, harmonic pattern, radial waveform spikes,
//! floating glyph cloud and ambient dust, drawn independently of the swarm

use egui::{Align2, Color32, FontId, Painter, Pos2, Rect, Stroke, Vec2};
use rand::Rng;
use std::f32::consts::{FRAC_PI_2, TAU};

use crate::config::{ColorScheme, OverlayConfig};
use crate::governor::Fidelity;
use crate::state::{Decorations, PatternParams};

/// Heartbeat envelope in 0..1: a strong beat followed by a softer echo.
/// Zero when `bpm` is not positive.
pub fn heartbeat_pulse(time: f32, bpm: f32) -> f32 {
    if bpm <= 0.0 {
        return 0.0;
    }
    let phase = (time * bpm / 60.0).fract();
    let lub = (-phase * 12.0).exp();
    let dub = if phase >= 0.28 {
        0.6 * (-(phase - 0.28) * 12.0).exp()
    } else {
        0.0
    };
    (lub + dub).min(1.0)
}

/// Slow breathing used by the minimal frame, 0..1.
pub fn breathing(time: f32) -> f32 {
    0.5 + 0.5 * (time * TAU / 4.0).sin()
}

/// Closed radial harmonic curve `r = R (1 + amp sin(a θ + rot + drift) cos(b θ))`.
pub fn pattern_points(params: &PatternParams, samples: usize, radius: f32, time: f32) -> Vec<Vec2> {
    let samples = samples.max(8);
    let drift = time * 0.3;
    (0..=samples)
        .map(|i| {
            let theta = i as f32 / samples as f32 * TAU;
            let r = radius
                * (1.0 + params.amp * (params.a * theta + params.rot + drift).sin() * (params.b * theta).cos());
            Vec2::angled(theta) * r
        })
        .collect()
}

struct DustMote {
    pos: Vec2,
    vel: Vec2,
    size: f32,
    phase: f32,
}

pub struct OverlayRenderer {
    config: OverlayConfig,
    time: f32,
    smoothed_spikes: Vec<f32>,
    dust: Vec<DustMote>,
}

impl OverlayRenderer {
    pub fn new(config: &OverlayConfig) -> Self {
        let mut rng = rand::thread_rng();
        let reach = config.ring_radius * 1.5;
        let dust = (0..config.dust_count)
            .map(|_| DustMote {
                pos: Vec2::angled(rng.gen_range(0.0..TAU)) * rng.gen_range(0.0..reach),
                vel: Vec2::angled(rng.gen_range(0.0..TAU)) * rng.gen_range(2.0..9.0),
                size: rng.gen_range(0.6..1.6),
                phase: rng.gen_range(0.0..TAU),
            })
            .collect();

        Self {
            config: config.clone(),
            time: 0.0,
            smoothed_spikes: vec![0.0; config.waveform_spikes],
            dust,
        }
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn spikes(&self) -> &[f32] {
        &self.smoothed_spikes
    }

    /// Advance overlay animation. Spikes follow energy while the waveform is
    /// active and decay to zero otherwise.
    pub fn update(&mut self, dt: f32, energy: f32, waveform_active: bool) {
        self.time += dt.max(0.0);
        let t = self.time;
        let smoothing = self.config.waveform_smoothing.clamp(0.0, 0.95);

        for (i, value) in self.smoothed_spikes.iter_mut().enumerate() {
            let raw = if waveform_active {
                let wobble = ((t * 5.3 + i as f32 * 0.61).sin() * (t * 2.1 + i as f32 * 0.23).cos()).abs();
                energy.clamp(0.0, 1.0) * (0.35 + 0.65 * wobble)
            } else {
                0.0
            };
            *value = *value * smoothing + raw * (1.0 - smoothing);
        }

        let reach = self.config.ring_radius * 1.5;
        for mote in &mut self.dust {
            mote.pos += mote.vel * dt;
            if mote.pos.length() > reach {
                // Re-enter from the opposite side
                mote.pos = -mote.pos * 0.9;
            }
        }
    }

    /// Advance only the clock; used for minimal frames.
    pub fn advance_clock(&mut self, dt: f32) {
        self.time += dt.max(0.0);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        painter: &Painter,
        rect: Rect,
        scale: f32,
        colors: &ColorScheme,
        decorations: &Decorations,
        heartbeat_bpm: f32,
        energy: f32,
        fidelity: Fidelity,
    ) {
        let center = rect.center();
        let thin = fidelity == Fidelity::Low;
        let pulse = heartbeat_pulse(self.time, heartbeat_bpm);

        self.render_glow(painter, center, scale, colors, 0.35 + 0.4 * energy + 0.25 * pulse);
        if self.config.ring_enabled {
            self.render_ring(painter, center, scale, colors, 1.0 + 0.04 * pulse, 0.5 + 0.5 * pulse);
        }

        if self.config.dust_enabled && !thin {
            self.render_dust(painter, center, scale, colors);
        }
        if let Some(params) = &decorations.pattern {
            self.render_pattern(painter, center, scale, colors, params, thin);
        }
        if decorations.waveform || self.smoothed_spikes.iter().any(|v| *v > 0.01) {
            self.render_spikes(painter, center, scale, colors, thin);
        }
        if let Some(glyphs) = &decorations.glyph_cloud {
            self.render_glyph_cloud(painter, center, scale, colors, glyphs, thin);
        }
    }

    /// Static frame for hidden/locked hosts: ring and a breathing glow.
    pub fn render_minimal(&self, painter: &Painter, rect: Rect, scale: f32, colors: &ColorScheme) {
        let center = rect.center();
        let breath = breathing(self.time);
        self.render_glow(painter, center, scale, colors, 0.25 + 0.35 * breath);
        self.render_ring(painter, center, scale, colors, 1.0, 0.4);
    }

    fn render_glow(&self, painter: &Painter, center: Pos2, scale: f32, colors: &ColorScheme, level: f32) {
        let intensity = (self.config.glow_intensity * level).clamp(0.0, 1.0);
        let rgb = colors.glow;
        let radius = self.config.ring_radius * scale;

        // Layered soft disc, outermost first
        for (factor, share) in [(1.25, 0.05), (1.0, 0.08), (0.75, 0.12), (0.45, 0.18)] {
            let alpha = (255.0 * intensity * share) as u8;
            if alpha < 2 {
                continue;
            }
            painter.circle_filled(
                center,
                radius * factor,
                Color32::from_rgba_unmultiplied(rgb[0], rgb[1], rgb[2], alpha),
            );
        }
    }

    fn render_ring(
        &self,
        painter: &Painter,
        center: Pos2,
        scale: f32,
        colors: &ColorScheme,
        radius_mult: f32,
        brightness: f32,
    ) {
        let rgb = colors.ring;
        let radius = self.config.ring_radius * scale * radius_mult;
        let alpha = (90.0 + 140.0 * brightness.clamp(0.0, 1.0)) as u8;
        painter.circle_stroke(
            center,
            radius,
            Stroke::new(1.5, Color32::from_rgba_unmultiplied(rgb[0], rgb[1], rgb[2], alpha)),
        );
        painter.circle_stroke(
            center,
            radius + 3.0,
            Stroke::new(4.0, Color32::from_rgba_unmultiplied(rgb[0], rgb[1], rgb[2], alpha / 6)),
        );
    }

    fn render_dust(&self, painter: &Painter, center: Pos2, scale: f32, colors: &ColorScheme) {
        let rgb = colors.dust;
        for mote in &self.dust {
            let twinkle = 0.5 + 0.5 * (self.time * 1.3 + mote.phase).sin();
            let alpha = (20.0 + 70.0 * twinkle) as u8;
            painter.circle_filled(
                center + mote.pos * scale,
                mote.size * scale.max(0.5),
                Color32::from_rgba_unmultiplied(rgb[0], rgb[1], rgb[2], alpha),
            );
        }
    }

    fn render_pattern(
        &self,
        painter: &Painter,
        center: Pos2,
        scale: f32,
        colors: &ColorScheme,
        params: &PatternParams,
        thin: bool,
    ) {
        let samples = if thin {
            self.config.pattern_samples / 2
        } else {
            self.config.pattern_samples
        };
        let points = pattern_points(params, samples, self.config.pattern_radius, self.time);

        let rgb = colors.pattern;
        let stroke = Stroke::new(1.2, Color32::from_rgba_unmultiplied(rgb[0], rgb[1], rgb[2], 170));
        for pair in points.windows(2) {
            painter.line_segment([center + pair[0] * scale, center + pair[1] * scale], stroke);
        }
    }

    fn render_spikes(&self, painter: &Painter, center: Pos2, scale: f32, colors: &ColorScheme, thin: bool) {
        let count = self.smoothed_spikes.len();
        if count == 0 {
            return;
        }
        let step = if thin { 2 } else { 1 };
        let rgb = colors.waveform;
        let base = self.config.ring_radius * scale;

        for i in (0..count).step_by(step) {
            let value = self.smoothed_spikes[i];
            if value < 0.01 {
                continue;
            }
            let dir = Vec2::angled(i as f32 / count as f32 * TAU - FRAC_PI_2);
            let inner = center + dir * (base + 4.0);
            let outer = center + dir * (base + 4.0 + value * self.config.waveform_amplitude * scale);
            let alpha = (80.0 + 175.0 * value.min(1.0)) as u8;
            painter.line_segment(
                [inner, outer],
                Stroke::new(2.0, Color32::from_rgba_unmultiplied(rgb[0], rgb[1], rgb[2], alpha)),
            );
        }
    }

    fn render_glyph_cloud(
        &self,
        painter: &Painter,
        center: Pos2,
        scale: f32,
        colors: &ColorScheme,
        glyphs: &str,
        thin: bool,
    ) {
        let chars: Vec<char> = glyphs.chars().filter(|c| !c.is_whitespace()).collect();
        if chars.is_empty() {
            return;
        }
        let count = if thin {
            self.config.glyph_count / 2
        } else {
            self.config.glyph_count
        };
        let rgb = colors.glyphs;
        let font = FontId::proportional(self.config.glyph_size * scale.max(0.5));

        for i in 0..count {
            let seed = i as f32 * 2.399;
            let angle = seed + self.time * (0.08 + 0.02 * (i % 3) as f32);
            let radius = self.config.ring_radius * (1.05 + 0.2 * (seed * 1.7).sin().abs());
            let pos = center + Vec2::angled(angle) * radius * scale;
            let alpha = (60.0 + 120.0 * (0.5 + 0.5 * (self.time * 0.9 + seed).sin())) as u8;
            painter.text(
                pos,
                Align2::CENTER_CENTER,
                chars[i % chars.len()],
                font.clone(),
                Color32::from_rgba_unmultiplied(rgb[0], rgb[1], rgb[2], alpha),
            );
        }
    }
}
