//! Configuration System for Orb Studio
//! Every tunable of the swarm renderer, plus presets and JSON persistence

use serde::{Deserialize, Serialize};

use crate::state::ActivityState;

// ============================================================================
// Enums
// ============================================================================

/// How image targets are decoded.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum DecodeStrategy {
    /// Decode on the rayon pool, hand the result back over a channel.
    Background,
    /// Decode at the start of the next frame (deterministic, used by tests).
    Deferred,
    /// Decode on the caller's thread, one frame later than `Deferred`, so a
    /// request always spans a full frame in the loading state.
    Staged,
}

// ============================================================================
// Per-activity scalars
// ============================================================================

/// One value per activity state.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize, Debug)]
pub struct ActivityScale {
    pub dormant: f32,
    pub listening: f32,
    pub thinking: f32,
    pub speaking: f32,
}

impl ActivityScale {
    pub const fn new(dormant: f32, listening: f32, thinking: f32, speaking: f32) -> Self {
        Self {
            dormant,
            listening,
            thinking,
            speaking,
        }
    }

    pub fn get(&self, state: ActivityState) -> f32 {
        match state {
            ActivityState::Dormant => self.dormant,
            ActivityState::Listening => self.listening,
            ActivityState::Thinking => self.thinking,
            ActivityState::Speaking => self.speaking,
        }
    }
}

// ============================================================================
// Color Scheme
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ColorScheme {
    pub name: String,
    pub dormant: Vec<[u8; 3]>,
    pub listening: Vec<[u8; 3]>,
    pub thinking: Vec<[u8; 3]>,
    pub speaking: Vec<[u8; 3]>,
    pub background: [u8; 3],
    pub ring: [u8; 3],
    pub glow: [u8; 3],
    pub pattern: [u8; 3],
    pub waveform: [u8; 3],
    pub glyphs: [u8; 3],
    pub dust: [u8; 3],
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::aurora()
    }
}

impl ColorScheme {
    pub fn aurora() -> Self {
        Self {
            name: "Aurora".to_string(),
            dormant: vec![[70, 90, 130], [60, 70, 110]],
            listening: vec![[90, 200, 255], [120, 170, 255], [80, 230, 210]],
            thinking: vec![[170, 120, 255], [120, 150, 255], [220, 140, 255]],
            speaking: vec![[120, 255, 200], [90, 220, 255], [255, 220, 140]],
            background: [4, 6, 14],
            ring: [90, 170, 255],
            glow: [60, 120, 255],
            pattern: [160, 120, 255],
            waveform: [120, 230, 255],
            glyphs: [200, 190, 255],
            dust: [140, 160, 200],
        }
    }

    pub fn ember() -> Self {
        Self {
            name: "Ember".to_string(),
            dormant: vec![[110, 60, 40], [90, 50, 40]],
            listening: vec![[255, 170, 80], [255, 130, 60]],
            thinking: vec![[255, 110, 70], [255, 190, 90], [230, 80, 60]],
            speaking: vec![[255, 220, 120], [255, 150, 60], [255, 250, 200]],
            background: [12, 5, 2],
            ring: [255, 140, 60],
            glow: [255, 90, 30],
            pattern: [255, 180, 90],
            waveform: [255, 200, 120],
            glyphs: [255, 220, 170],
            dust: [200, 140, 100],
        }
    }

    pub fn mono() -> Self {
        Self {
            name: "Mono".to_string(),
            dormant: vec![[90, 90, 90]],
            listening: vec![[190, 190, 190], [160, 160, 160]],
            thinking: vec![[230, 230, 230], [200, 200, 200]],
            speaking: vec![[255, 255, 255], [220, 220, 220]],
            background: [0, 0, 0],
            ring: [200, 200, 200],
            glow: [150, 150, 150],
            pattern: [210, 210, 210],
            waveform: [230, 230, 230],
            glyphs: [240, 240, 240],
            dust: [120, 120, 120],
        }
    }

    pub fn all_schemes() -> Vec<ColorScheme> {
        vec![Self::aurora(), Self::ember(), Self::mono()]
    }

    /// Particle palette for an activity state, never empty.
    pub fn palette(&self, state: ActivityState) -> &[[u8; 3]] {
        let palette = match state {
            ActivityState::Dormant => &self.dormant,
            ActivityState::Listening => &self.listening,
            ActivityState::Thinking => &self.thinking,
            ActivityState::Speaking => &self.speaking,
        };
        if palette.is_empty() {
            &[[255, 255, 255]]
        } else {
            palette
        }
    }
}

// ============================================================================
// Swarm Configuration
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct SwarmConfig {
    pub particle_count: usize,
    // Orbital fallback
    pub base_radius: f32,
    pub radius_spread: f32,
    pub wobble_amplitude: f32,
    pub wobble_speed: f32,
    pub min_angular_speed: f32, // radians per 60 Hz frame
    pub max_angular_speed: f32,
    pub orbit_speed: ActivityScale,
    // Gather / settle
    pub swarm_pull: f32,
    pub settle_pull: f32,
    pub swarm_damping: f32,
    pub settle_damping: f32,
    pub swarm_window_secs: f32,
    pub settle_after_secs: f32,
    // Liveliness
    pub swirl: ActivityScale,
    pub swirl_falloff: f32,
    /// Fraction of the swirl kept at the target itself
    pub swirl_floor: f32,
    pub wander_amplitude: f32,
    pub wander_speed: f32,
    pub swarm_wander_boost: f32,
    pub jitter_amplitude: f32,
    pub jitter_speed: f32,
    // Limits
    pub max_speed: f32,
    pub max_speed_scale: ActivityScale,
    pub max_step_secs: f32,
    pub min_size: f32,
    pub max_size: f32,
    pub min_mass: f32,
    pub max_mass: f32,
    // Rendering
    pub alpha: ActivityScale,
    pub size_scale: ActivityScale,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            particle_count: 1400,
            base_radius: 120.0,
            radius_spread: 40.0,
            wobble_amplitude: 6.0,
            wobble_speed: 0.8,
            min_angular_speed: 0.004,
            max_angular_speed: 0.012,
            orbit_speed: ActivityScale::new(0.35, 0.7, 1.3, 1.7),
            swarm_pull: 0.035,
            settle_pull: 0.08,
            swarm_damping: 0.90,
            settle_damping: 0.82,
            swarm_window_secs: 1.5,
            settle_after_secs: 1.2,
            swirl: ActivityScale::new(0.0003, 0.0007, 0.0015, 0.0018),
            swirl_falloff: 40.0,
            swirl_floor: 0.15,
            wander_amplitude: 0.03,
            wander_speed: 1.1,
            swarm_wander_boost: 2.5,
            jitter_amplitude: 0.8,
            jitter_speed: 1.6,
            max_speed: 6.0,
            max_speed_scale: ActivityScale::new(0.5, 0.8, 1.1, 1.3),
            max_step_secs: 0.05,
            min_size: 1.0,
            max_size: 2.6,
            min_mass: 0.8,
            max_mass: 1.2,
            alpha: ActivityScale::new(0.35, 0.6, 0.8, 0.95),
            size_scale: ActivityScale::new(0.8, 1.0, 1.1, 1.25),
        }
    }
}

// ============================================================================
// Rasterizer Configuration
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct RasterConfig {
    /// Virtual canvas every target is rasterized onto.
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Bitmap font scale (8 px glyph cell times this).
    pub font_scale: u32,
    pub line_spacing: f32,
    pub text_grid_step: u32,
    pub alpha_threshold: u8,
    pub image_grid_step: u32,
    pub luminance_threshold: f32,
    pub min_image_alpha: f32,
    pub image_fit: f32,
    /// Cloud ceiling as a multiple of the particle count.
    pub max_cloud_ratio: f32,
    pub max_text_chars: usize,
    pub glyph_stroke: u32,
    pub decode: DecodeStrategy,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            canvas_width: 640,
            canvas_height: 320,
            font_scale: 4,
            line_spacing: 1.25,
            text_grid_step: 6,
            alpha_threshold: 120,
            image_grid_step: 5,
            luminance_threshold: 0.18,
            min_image_alpha: 0.1,
            image_fit: 0.7,
            max_cloud_ratio: 2.0,
            max_text_chars: 64,
            glyph_stroke: 7,
            decode: DecodeStrategy::Background,
        }
    }
}

// ============================================================================
// Avatar Configuration
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct AvatarConfig {
    pub energy_targets: ActivityScale,
    /// Time constant of the energy filter, seconds.
    pub energy_tau: f32,
    pub heartbeat_bpm: ActivityScale,
    pub default_action_ttl_ms: u64,
    pub reply_override_ttl_ms: u64,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            energy_targets: ActivityScale::new(0.12, 0.4, 0.7, 1.0),
            energy_tau: 0.35,
            heartbeat_bpm: ActivityScale::new(0.0, 64.0, 96.0, 82.0),
            default_action_ttl_ms: 4000,
            reply_override_ttl_ms: 6000,
        }
    }
}

// ============================================================================
// Governor Configuration
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct GovernorConfig {
    pub full_rate_hz: f32,
    pub focus_rate_hz: f32,
    pub idle_rate_hz: f32,
    pub slow_frame_ms: f32,
    pub slow_frames_to_engage: usize,
    pub sample_window: usize,
    pub relax_max_slow: usize,
    pub low_fidelity_stride: usize,
    /// Weight of the newest sample in the frame-time average.
    pub average_weight: f32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            full_rate_hz: 60.0,
            focus_rate_hz: 30.0,
            idle_rate_hz: 4.0,
            slow_frame_ms: 90.0,
            slow_frames_to_engage: 8,
            sample_window: 30,
            relax_max_slow: 2,
            low_fidelity_stride: 3,
            average_weight: 0.1,
        }
    }
}

// ============================================================================
// Overlay Configuration
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct OverlayConfig {
    pub ring_enabled: bool,
    pub ring_radius: f32,
    pub glow_intensity: f32,
    pub dust_enabled: bool,
    pub dust_count: usize,
    pub glyph_count: usize,
    pub glyph_size: f32,
    pub waveform_spikes: usize,
    pub waveform_amplitude: f32,
    pub waveform_smoothing: f32,
    pub pattern_samples: usize,
    pub pattern_radius: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            ring_enabled: true,
            ring_radius: 175.0,
            glow_intensity: 0.6,
            dust_enabled: true,
            dust_count: 60,
            glyph_count: 24,
            glyph_size: 14.0,
            waveform_spikes: 96,
            waveform_amplitude: 36.0,
            waveform_smoothing: 0.8,
            pattern_samples: 360,
            pattern_radius: 140.0,
        }
    }
}

// ============================================================================
// Main Configuration
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct OrbConfig {
    #[serde(default)]
    pub swarm: SwarmConfig,
    #[serde(default)]
    pub raster: RasterConfig,
    #[serde(default)]
    pub avatar: AvatarConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub overlays: OverlayConfig,
    #[serde(default)]
    pub color_scheme_index: usize,
}

impl OrbConfig {
    pub fn get_color_scheme(&self) -> ColorScheme {
        ColorScheme::all_schemes()
            .get(self.color_scheme_index)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_color_scheme(&mut self, index: usize) {
        if index < ColorScheme::all_schemes().len() {
            self.color_scheme_index = index;
        }
    }

    /// Upper bound on a target cloud's length. Raw samples past
    /// `max_cloud_ratio` x particles are strided, and the cloud the swarm
    /// follows never outnumbers the particles, so every point gets one.
    pub fn cloud_ceiling(&self) -> usize {
        let count = self.swarm.particle_count;
        ((count as f32 * self.raster.max_cloud_ratio) as usize).min(count).max(1)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }

    pub fn preset_names() -> Vec<&'static str> {
        vec!["Default", "Lightweight", "Showcase"]
    }

    /// Apply a preset by name; unknown names are ignored.
    pub fn apply_preset(&mut self, name: &str) {
        match name {
            "Default" => self.preset_default(),
            "Lightweight" => self.preset_lightweight(),
            "Showcase" => self.preset_showcase(),
            _ => {}
        }
    }

    pub fn preset_default(&mut self) {
        self.swarm = SwarmConfig::default();
        self.governor = GovernorConfig::default();
        self.overlays = OverlayConfig::default();
        self.color_scheme_index = 0;
    }

    /// Low-power machines: fewer particles, thinner decorations.
    pub fn preset_lightweight(&mut self) {
        self.swarm = SwarmConfig {
            particle_count: 600,
            ..Default::default()
        };
        self.governor = GovernorConfig {
            full_rate_hz: 30.0,
            focus_rate_hz: 20.0,
            low_fidelity_stride: 2,
            ..Default::default()
        };
        self.overlays = OverlayConfig {
            dust_count: 20,
            glyph_count: 12,
            waveform_spikes: 48,
            pattern_samples: 180,
            ..Default::default()
        };
    }

    pub fn preset_showcase(&mut self) {
        self.swarm = SwarmConfig {
            particle_count: 2400,
            max_size: 3.0,
            ..Default::default()
        };
        self.governor = GovernorConfig {
            low_fidelity_stride: 4,
            ..Default::default()
        };
        self.overlays = OverlayConfig {
            dust_count: 120,
            glyph_count: 36,
            glow_intensity: 0.8,
            ..Default::default()
        };
        self.color_scheme_index = 1;
    }
}
