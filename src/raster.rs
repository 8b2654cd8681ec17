//! Target Rasterizer for Orb Studio
//! Turns text, action labels and images into sparse 2-D point clouds

use crossbeam_channel::{unbounded, Receiver, Sender};
use egui::Vec2;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::{DecodeStrategy, RasterConfig};
use crate::error::{OrbError, Result};
use crate::glyphs;
use crate::state::ActivityState;

/// Ordered target points, relative to the canvas center.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<Vec2>,
}

impl PointCloud {
    pub fn new(points: Vec<Vec2>) -> Self {
        Self { points }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    /// Target for particle `index`; wraps around so shrinking clouds stay in bounds.
    pub fn point_for(&self, index: usize) -> Option<Vec2> {
        if self.points.is_empty() {
            None
        } else {
            Some(self.points[index % self.points.len()])
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TargetKind {
    Text,
    Action,
    Image,
    StateGlyph,
}

/// Cache identity: (mode, payload identity, activity state).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct TargetKey {
    pub kind: TargetKind,
    pub payload: String,
    pub activity: ActivityState,
}

impl TargetKey {
    pub fn new(kind: TargetKind, payload: impl Into<String>, activity: ActivityState) -> Self {
        Self {
            kind,
            payload: payload.into(),
            activity,
        }
    }
}

/// Where image bytes come from.
#[derive(Clone, Debug)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ImageStatus {
    Missing,
    Loading,
    Ready,
    Failed,
}

enum ImageSlot {
    Loading,
    Ready(PointCloud),
    Failed,
}

struct DecodeResult {
    key: String,
    cloud: Result<PointCloud>,
}

/// Image waiting for an inline decode; `polls_left` frames pass first.
struct PendingDecode {
    key: String,
    source: ImageSource,
    polls_left: u8,
}

pub struct TargetRasterizer {
    config: RasterConfig,
    ceiling: usize,
    particle_count: usize,
    canvas: RgbaImage,

    // Single-slot cache of the current target
    cached_key: Option<TargetKey>,
    cached: PointCloud,

    images: HashMap<String, ImageSlot>,
    deferred: Vec<PendingDecode>,
    decode_tx: Sender<DecodeResult>,
    decode_rx: Receiver<DecodeResult>,

    rasterizations: u64,
}

impl TargetRasterizer {
    pub fn new(config: &RasterConfig, particle_count: usize, ceiling: usize) -> Result<Self> {
        if config.canvas_width == 0 || config.canvas_height == 0 {
            return Err(OrbError::SurfaceUnavailable {
                width: config.canvas_width,
                height: config.canvas_height,
            });
        }

        let (decode_tx, decode_rx) = unbounded();
        Ok(Self {
            config: config.clone(),
            ceiling: ceiling.max(1),
            particle_count,
            canvas: RgbaImage::new(config.canvas_width, config.canvas_height),
            cached_key: None,
            cached: PointCloud::empty(),
            images: HashMap::new(),
            deferred: Vec::new(),
            decode_tx,
            decode_rx,
            rasterizations: 0,
        })
    }

    /// Cloud for the most recently resolved key (empty when none).
    pub fn current(&self) -> &PointCloud {
        &self.cached
    }

    pub fn current_key(&self) -> Option<&TargetKey> {
        self.cached_key.as_ref()
    }

    /// Number of times a canvas was actually rendered and sampled.
    pub fn rasterizations(&self) -> u64 {
        self.rasterizations
    }

    pub fn particle_count(&self) -> usize {
        self.particle_count
    }

    /// True while any requested image is still decoding.
    pub fn is_loading(&self) -> bool {
        self.images.values().any(|slot| matches!(slot, ImageSlot::Loading))
    }

    pub fn image_status(&self, key: &str) -> ImageStatus {
        match self.images.get(key) {
            None => ImageStatus::Missing,
            Some(ImageSlot::Loading) => ImageStatus::Loading,
            Some(ImageSlot::Ready(_)) => ImageStatus::Ready,
            Some(ImageSlot::Failed) => ImageStatus::Failed,
        }
    }

    /// Resolve a key to its cloud, re-rendering only when the key changed.
    pub fn resolve(&mut self, key: &TargetKey) -> &PointCloud {
        if self.cached_key.as_ref() == Some(key) {
            return &self.cached;
        }

        self.cached = match key.kind {
            TargetKind::Text => self.rasterize_text(&key.payload),
            TargetKind::StateGlyph => self.rasterize_text(&key.payload),
            TargetKind::Action => self.rasterize_action(&key.payload),
            TargetKind::Image => match self.images.get(&key.payload) {
                Some(ImageSlot::Ready(cloud)) => cloud.clone(),
                _ => PointCloud::empty(),
            },
        };
        log::debug!("target {:?} -> {} points", key, self.cached.len());
        self.cached_key = Some(key.clone());
        &self.cached
    }

    /// Drop the current target; the swarm falls back to orbital motion.
    pub fn clear_current(&mut self) {
        self.cached_key = None;
        self.cached = PointCloud::empty();
    }

    pub fn rasterize_text(&mut self, text: &str) -> PointCloud {
        let text = truncate_chars(text, self.config.max_text_chars);
        self.render_canvas(|canvas, config| {
            glyphs::draw_text(canvas, &text, config.font_scale, config.line_spacing);
        })
    }

    pub fn rasterize_action(&mut self, label: &str) -> PointCloud {
        let label = truncate_chars(label, self.config.max_text_chars);
        self.render_canvas(|canvas, config| {
            glyphs::draw_action(
                canvas,
                &label,
                config.font_scale,
                config.line_spacing,
                config.glyph_stroke,
            );
        })
    }

    fn render_canvas(&mut self, draw: impl FnOnce(&mut RgbaImage, &RasterConfig)) -> PointCloud {
        self.rasterizations += 1;
        for pixel in self.canvas.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
        draw(&mut self.canvas, &self.config);

        let raw = sample_alpha(
            &self.canvas,
            self.config.text_grid_step,
            self.config.alpha_threshold,
        );
        PointCloud::new(downsample(raw, self.ceiling))
    }

    // ========================================================================
    // Image targets
    // ========================================================================

    /// Start decoding an image under `key`. A key that is already ready or
    /// loading is left alone.
    pub fn request_image(&mut self, key: &str, source: ImageSource) {
        if matches!(
            self.images.get(key),
            Some(ImageSlot::Ready(_)) | Some(ImageSlot::Loading)
        ) {
            return;
        }
        self.images.insert(key.to_string(), ImageSlot::Loading);

        match self.config.decode {
            DecodeStrategy::Deferred | DecodeStrategy::Staged => {
                let polls_left = u8::from(self.config.decode == DecodeStrategy::Staged);
                self.deferred.push(PendingDecode {
                    key: key.to_string(),
                    source,
                    polls_left,
                });
            }
            DecodeStrategy::Background => {
                let tx = self.decode_tx.clone();
                let config = self.config.clone();
                let ceiling = self.ceiling;
                let key = key.to_string();
                rayon::spawn(move || {
                    let cloud = rasterize_image_source(&source, &config, ceiling);
                    // Receiver gone means the engine was dropped
                    let _ = tx.send(DecodeResult { key, cloud });
                });
            }
        }
    }

    /// Keep only the image slots whose keys are still wanted. Decodes still in
    /// flight for dropped keys are discarded when they land.
    pub fn retain_images(&mut self, wanted: &[&str]) {
        self.images.retain(|key, _| wanted.contains(&key.as_str()));
        self.deferred.retain(|pending| wanted.contains(&pending.key.as_str()));
        if let Some(key) = &self.cached_key {
            if key.kind == TargetKind::Image && !wanted.contains(&key.payload.as_str()) {
                self.clear_current();
            }
        }
    }

    /// Apply finished decodes. Returns true when any slot changed state.
    pub fn poll_decodes(&mut self) -> bool {
        let mut changed = false;

        for mut pending in std::mem::take(&mut self.deferred) {
            if pending.polls_left > 0 {
                pending.polls_left -= 1;
                self.deferred.push(pending);
                continue;
            }
            let cloud = rasterize_image_source(&pending.source, &self.config, self.ceiling);
            changed |= self.finish_decode(DecodeResult {
                key: pending.key,
                cloud,
            });
        }
        while let Ok(result) = self.decode_rx.try_recv() {
            changed |= self.finish_decode(result);
        }

        changed
    }

    fn finish_decode(&mut self, result: DecodeResult) -> bool {
        let Some(slot) = self.images.get_mut(&result.key) else {
            log::debug!("discarding stale image decode for {}", result.key);
            return false;
        };
        if !matches!(slot, ImageSlot::Loading) {
            return false;
        }

        self.rasterizations += 1;
        *slot = match result.cloud {
            Ok(cloud) => {
                log::debug!("image {} decoded into {} points", result.key, cloud.len());
                ImageSlot::Ready(cloud)
            }
            Err(e) => {
                log::warn!("image target {} unusable: {}", result.key, e);
                ImageSlot::Failed
            }
        };
        true
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Keep grid cells whose alpha exceeds the threshold.
pub fn sample_alpha(canvas: &RgbaImage, step: u32, threshold: u8) -> Vec<Vec2> {
    let step = step.max(1) as usize;
    let half = Vec2::new(canvas.width() as f32 / 2.0, canvas.height() as f32 / 2.0);
    let mut points = Vec::new();
    for y in (0..canvas.height()).step_by(step) {
        for x in (0..canvas.width()).step_by(step) {
            if canvas.get_pixel(x, y)[3] > threshold {
                points.push(Vec2::new(x as f32, y as f32) - half);
            }
        }
    }
    points
}

/// Rec. 709 luminance of an RGBA pixel, 0..1.
pub fn luminance(pixel: &Rgba<u8>) -> f32 {
    (0.2126 * pixel[0] as f32 + 0.7152 * pixel[1] as f32 + 0.0722 * pixel[2] as f32) / 255.0
}

/// Keep every k-th point so the result never exceeds `ceiling`.
pub fn downsample(points: Vec<Vec2>, ceiling: usize) -> Vec<Vec2> {
    let ceiling = ceiling.max(1);
    if points.len() <= ceiling {
        return points;
    }
    let stride = points.len().div_ceil(ceiling);
    points.into_iter().step_by(stride).collect()
}

fn rasterize_image_source(
    source: &ImageSource,
    config: &RasterConfig,
    ceiling: usize,
) -> Result<PointCloud> {
    match source {
        ImageSource::Bytes(bytes) => rasterize_image(bytes, config, ceiling),
        ImageSource::Path(path) => {
            let bytes = std::fs::read(path).map_err(|source| OrbError::ImageRead {
                path: path.clone(),
                source,
            })?;
            rasterize_image(&bytes, config, ceiling)
        }
    }
}

/// Decode, fit into the canvas and sample bright, visible pixels.
pub fn rasterize_image(bytes: &[u8], config: &RasterConfig, ceiling: usize) -> Result<PointCloud> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| OrbError::ImageDecode(e.to_string()))?;

    let fit = config.image_fit.clamp(0.05, 1.0);
    let max_w = ((config.canvas_width as f32 * fit) as u32).max(1);
    let max_h = ((config.canvas_height as f32 * fit) as u32).max(1);
    let fitted = decoded.resize(max_w, max_h, FilterType::Triangle).to_rgba8();

    let mut canvas = RgbaImage::new(config.canvas_width, config.canvas_height);
    let x = (config.canvas_width.saturating_sub(fitted.width()) / 2) as i64;
    let y = (config.canvas_height.saturating_sub(fitted.height()) / 2) as i64;
    imageops::overlay(&mut canvas, &fitted, x, y);

    let step = config.image_grid_step.max(1) as usize;
    let half = Vec2::new(canvas.width() as f32 / 2.0, canvas.height() as f32 / 2.0);
    let min_alpha = (config.min_image_alpha * 255.0) as u8;
    let mut points = Vec::new();
    for py in (0..canvas.height()).step_by(step) {
        for px in (0..canvas.width()).step_by(step) {
            let pixel = canvas.get_pixel(px, py);
            if pixel[3] > min_alpha && luminance(pixel) > config.luminance_threshold {
                points.push(Vec2::new(px as f32, py as f32) - half);
            }
        }
    }

    Ok(PointCloud::new(downsample(points, ceiling)))
}
