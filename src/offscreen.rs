//! CPU (headless) offscreen renderer for orb snapshots.
//!
//! Rasterizes the glow, ring and swarm into float RGB + alpha buffers, then
//! quantizes to RGBA8. The preview is drawn through egui, so expect small
//! differences; colors, alpha and layout follow the preview.

use image::RgbaImage;
use std::path::Path;

use crate::config::ColorScheme;
use crate::error::{OrbError, Result};
use crate::particles::SwarmEngine;
use crate::state::ActivityState;

/// Everything about a frame that is not particle data.
#[derive(Clone, Copy, Debug)]
pub struct FrameLook {
    pub activity: ActivityState,
    pub energy: f32,
    /// 0..1 heartbeat or breathing level driving the glow
    pub pulse: f32,
    pub ring_radius: f32,
    pub glow_intensity: f32,
    /// Engine units to pixels; ring, glow and swarm are scaled around the center
    pub scale: f32,
    /// Ring and glow only, no particles
    pub minimal: bool,
    /// Only every n-th particle is drawn (low fidelity)
    pub stride: usize,
}

/// Simple CPU renderer.
pub struct FrameRenderer {
    width: u32,
    height: u32,
    /// RGB in 0..255-ish float space (can exceed 255 for additive glow).
    rgb: Vec<f32>,
    /// Alpha in 0..1.
    alpha: Vec<f32>,
}

impl FrameRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(OrbError::SurfaceUnavailable { width, height });
        }
        let px = (width * height) as usize;
        Ok(Self {
            width,
            height,
            rgb: vec![0.0; px * 3],
            alpha: vec![0.0; px],
        })
    }

    fn clear(&mut self, bg: [u8; 3]) {
        for pixel in self.rgb.chunks_exact_mut(3) {
            pixel[0] = bg[0] as f32;
            pixel[1] = bg[1] as f32;
            pixel[2] = bg[2] as f32;
        }
        self.alpha.fill(1.0);
    }

    /// Additive disc with a smooth radial falloff.
    fn draw_circle_soft(&mut self, cx: f32, cy: f32, radius: f32, color: [u8; 3], alpha: f32) {
        if radius <= 0.1 || alpha <= 0.0 {
            return;
        }

        let min_x = (cx - radius).floor().max(0.0) as i32;
        let max_x = (cx + radius).ceil().min(self.width as f32 - 1.0) as i32;
        let min_y = (cy - radius).floor().max(0.0) as i32;
        let max_y = (cy + radius).ceil().min(self.height as f32 - 1.0) as i32;
        let radius_sq = radius * radius;

        for py in min_y..=max_y {
            for px in min_x..=max_x {
                let dx = px as f32 - cx;
                let dy = py as f32 - cy;
                let dist_sq = dx * dx + dy * dy;
                if dist_sq > radius_sq {
                    continue;
                }

                let t = (dist_sq.sqrt() / radius).clamp(0.0, 1.0);
                let a = (alpha * (1.0 - t).powf(1.8)).clamp(0.0, 1.0);

                let base = (py as u32 * self.width + px as u32) as usize * 3;
                self.rgb[base] += color[0] as f32 * a;
                self.rgb[base + 1] += color[1] as f32 * a;
                self.rgb[base + 2] += color[2] as f32 * a;
            }
        }
    }

    /// Thin annulus, anti-aliased over one pixel.
    fn draw_ring(&mut self, cx: f32, cy: f32, radius: f32, width: f32, color: [u8; 3], alpha: f32) {
        let outer = radius + width;
        let min_x = (cx - outer).floor().max(0.0) as i32;
        let max_x = (cx + outer).ceil().min(self.width as f32 - 1.0) as i32;
        let min_y = (cy - outer).floor().max(0.0) as i32;
        let max_y = (cy + outer).ceil().min(self.height as f32 - 1.0) as i32;

        for py in min_y..=max_y {
            for px in min_x..=max_x {
                let dist = ((px as f32 - cx).powi(2) + (py as f32 - cy).powi(2)).sqrt();
                let coverage = (1.0 - ((dist - radius).abs() - width * 0.5).max(0.0)).clamp(0.0, 1.0);
                if coverage <= 0.0 {
                    continue;
                }
                let a = alpha * coverage;
                let base = (py as u32 * self.width + px as u32) as usize * 3;
                self.rgb[base] = self.rgb[base] * (1.0 - a) + color[0] as f32 * a;
                self.rgb[base + 1] = self.rgb[base + 1] * (1.0 - a) + color[1] as f32 * a;
                self.rgb[base + 2] = self.rgb[base + 2] * (1.0 - a) + color[2] as f32 * a;
            }
        }
    }

    /// Render one frame. Particle positions are relative to the image center.
    pub fn render_frame(&mut self, swarm: &SwarmEngine, colors: &ColorScheme, look: &FrameLook) -> RgbaImage {
        self.clear(colors.background);

        let cx = self.width as f32 / 2.0;
        let cy = self.height as f32 / 2.0;
        let scale = look.scale.max(0.05);
        let ring_radius = look.ring_radius * scale;

        // Glow behind everything
        let glow = (look.glow_intensity * (0.35 + 0.4 * look.energy + 0.25 * look.pulse)).clamp(0.0, 1.0);
        self.draw_circle_soft(cx, cy, ring_radius * 1.25, colors.glow, glow * 0.6);

        self.draw_ring(cx, cy, ring_radius, 1.5, colors.ring, 0.6 + 0.3 * look.pulse);

        if !look.minimal {
            let palette = colors.palette(look.activity);
            let (alpha, size_mult) = swarm.appearance(look.activity, look.energy);
            let stride = look.stride.max(1);

            for (i, p) in swarm.particles.iter().enumerate() {
                if i % stride != 0 {
                    continue;
                }
                let color = palette[p.color_index % palette.len()];
                let size = p.size * size_mult * scale.max(0.1);
                let (x, y) = (cx + p.pos.x * scale, cy + p.pos.y * scale);
                self.draw_circle_soft(x, y, size * 1.8, color, alpha / 3.0);
                self.draw_circle_soft(x, y, size, color, alpha);
            }
        }

        self.quantize()
    }

    fn quantize(&self) -> RgbaImage {
        // One stop of exposure, then a gentle tonemap to avoid harsh clipping
        let exposure_mult = 2.0_f32;
        let mut out = RgbaImage::new(self.width, self.height);

        for (i, pixel) in out.pixels_mut().enumerate() {
            let base = i * 3;
            let mut channels = [0u8; 4];
            for c in 0..3 {
                let v = (self.rgb[base + c] / 255.0) * exposure_mult;
                channels[c] = ((v / (1.0 + v)).clamp(0.0, 1.0) * 255.0) as u8;
            }
            channels[3] = (self.alpha[i].clamp(0.0, 1.0) * 255.0) as u8;
            pixel.0 = channels;
        }
        out
    }
}

/// Write a rendered frame to disk as PNG.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
    image.save_with_format(path, image::ImageFormat::Png)?;
    log::info!("snapshot saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwarmConfig;
    use pretty_assertions::assert_eq;

    fn look(minimal: bool) -> FrameLook {
        FrameLook {
            activity: ActivityState::Speaking,
            energy: 1.0,
            pulse: 0.5,
            ring_radius: 60.0,
            glow_intensity: 0.6,
            scale: 1.0,
            minimal,
            stride: 1,
        }
    }

    fn swarm() -> SwarmEngine {
        let config = SwarmConfig {
            particle_count: 300,
            base_radius: 40.0,
            radius_spread: 10.0,
            ..Default::default()
        };
        SwarmEngine::new_seeded(&config, 21)
    }

    fn brightness(image: &RgbaImage) -> u64 {
        image.pixels().map(|p| p[0] as u64 + p[1] as u64 + p[2] as u64).sum()
    }

    #[test]
    fn zero_sized_surface_is_rejected() {
        assert!(matches!(
            FrameRenderer::new(0, 10),
            Err(OrbError::SurfaceUnavailable { width: 0, height: 10 })
        ));
    }

    #[test]
    fn particles_add_light_over_the_minimal_frame() {
        let mut renderer = FrameRenderer::new(200, 200).unwrap();
        let colors = ColorScheme::default();
        let minimal = renderer.render_frame(&swarm(), &colors, &look(true));
        let full = renderer.render_frame(&swarm(), &colors, &look(false));

        assert_eq!(full.dimensions(), (200, 200));
        assert!(brightness(&full) > brightness(&minimal));
        assert!(full.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn scale_shrinks_the_ring_toward_the_center() {
        let mut renderer = FrameRenderer::new(200, 200).unwrap();
        let colors = ColorScheme::default();
        let wide = FrameLook {
            ring_radius: 90.0,
            ..look(true)
        };
        let full_size = renderer.render_frame(&swarm(), &colors, &wide);
        let halved = renderer.render_frame(&swarm(), &colors, &FrameLook { scale: 0.5, ..wide });

        // Ring at x = 190 unscaled, x = 145 at half scale
        let background = *halved.get_pixel(0, 100);
        assert_ne!(*full_size.get_pixel(190, 100), background);
        assert_eq!(*halved.get_pixel(190, 100), background);
        assert_ne!(*halved.get_pixel(145, 100), background);
    }

    #[test]
    fn snapshot_round_trips_through_png() {
        let mut renderer = FrameRenderer::new(64, 48).unwrap();
        let frame = renderer.render_frame(&swarm(), &ColorScheme::default(), &look(false));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orb.png");
        save_png(&frame, &path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded.dimensions(), (64, 48));
    }
}
