//! Avatar State & Override Resolver for Orb Studio
//! Activity state, energy, heartbeat, time-limited overrides and the
//! per-frame decision of which target the swarm gathers into

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::config::AvatarConfig;
use crate::raster::{ImageStatus, TargetKey, TargetKind};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    #[default]
    Dormant,
    Listening,
    Thinking,
    Speaking,
}

impl ActivityState {
    pub const ALL: [ActivityState; 4] = [
        ActivityState::Dormant,
        ActivityState::Listening,
        ActivityState::Thinking,
        ActivityState::Speaking,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ActivityState::Dormant => "dormant",
            ActivityState::Listening => "listening",
            ActivityState::Thinking => "thinking",
            ActivityState::Speaking => "speaking",
        }
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivityState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dormant" | "idle" | "sleep" | "asleep" => Ok(ActivityState::Dormant),
            "listening" => Ok(ActivityState::Listening),
            "thinking" => Ok(ActivityState::Thinking),
            "speaking" => Ok(ActivityState::Speaking),
            other => Err(format!("unknown activity state: {other}")),
        }
    }
}

/// Parameters of the radial harmonic pattern.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize, Debug)]
pub struct PatternParams {
    pub a: f32,
    pub b: f32,
    pub amp: f32,
    pub rot: f32,
}

/// Override directive. Only glyph-cloud, free-text and image modes produce a
/// target; pattern and waveform are decorations.
#[derive(Clone, PartialEq, Serialize, Deserialize, Debug)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OverrideMode {
    Clear,
    Pattern { a: f32, b: f32, amp: f32, rot: f32 },
    Waveform,
    GlyphCloud { glyphs: String },
    Image { data: Vec<u8> },
    FreeText { text: String },
}

#[derive(Clone, Debug)]
pub struct VisualOverride {
    pub mode: OverrideMode,
    pub expires_at: f64,
    image_key: Option<String>,
}

impl VisualOverride {
    pub fn image_key(&self) -> Option<&str> {
        self.image_key.as_deref()
    }
}

#[derive(Clone, Debug)]
pub struct ActionLabel {
    pub label: String,
    pub expires_at: f64,
}

#[derive(Clone, Debug)]
pub struct VisualizationHold {
    pub subject: String,
    pub deadline: f64,
}

/// What the swarm should gather into this frame.
#[derive(Clone, PartialEq, Debug)]
pub enum TargetSpec {
    /// No target: pure orbital motion.
    Empty,
    /// An image that wins resolution is still decoding: keep the previous cloud.
    Hold,
    Text(String),
    Action(String),
    Image(String),
    StateGlyph(ActivityState),
}

impl TargetSpec {
    /// Cache key for specs that map to a cloud.
    pub fn key(&self, activity: ActivityState) -> Option<TargetKey> {
        match self {
            TargetSpec::Empty | TargetSpec::Hold => None,
            TargetSpec::Text(text) => Some(TargetKey::new(TargetKind::Text, text.as_str(), activity)),
            TargetSpec::Action(label) => {
                Some(TargetKey::new(TargetKind::Action, label.as_str(), activity))
            }
            TargetSpec::Image(key) => Some(TargetKey::new(TargetKind::Image, key.as_str(), activity)),
            TargetSpec::StateGlyph(state) => {
                Some(TargetKey::new(TargetKind::StateGlyph, state.name(), activity))
            }
        }
    }
}

/// Decorations active this frame.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Decorations {
    pub pattern: Option<PatternParams>,
    pub waveform: bool,
    pub glyph_cloud: Option<String>,
}

const EMOTION_BPM: &[(&[&str], f32)] = &[
    (&["calm", "relaxed"], 58.0),
    (&["focused", "flow"], 92.0),
    (&["tense", "anxious"], 110.0),
    (&["excited", "happy"], 98.0),
];

/// Heartbeat cadence in beats per minute; 0 disables the heartbeat visual.
pub fn heartbeat_bpm(config: &AvatarConfig, activity: ActivityState, emotion: &str) -> f32 {
    if activity == ActivityState::Dormant {
        return 0.0;
    }

    let emotion = emotion.to_lowercase();
    for (keywords, bpm) in EMOTION_BPM {
        if keywords.iter().any(|k| emotion.contains(k)) {
            return *bpm;
        }
    }
    config.heartbeat_bpm.get(activity)
}

pub struct AvatarState {
    config: AvatarConfig,
    activity: ActivityState,
    thought: String,
    emotion: String,
    energy: f32,
    action: Option<ActionLabel>,
    override_slot: Option<VisualOverride>,
    hold: Option<VisualizationHold>,
    image_key: Option<String>,
}

impl AvatarState {
    pub fn new(config: &AvatarConfig) -> Self {
        Self {
            config: config.clone(),
            activity: ActivityState::Dormant,
            thought: String::new(),
            emotion: String::new(),
            energy: config.energy_targets.get(ActivityState::Dormant),
            action: None,
            override_slot: None,
            hold: None,
            image_key: None,
        }
    }

    pub fn activity(&self) -> ActivityState {
        self.activity
    }

    pub fn thought(&self) -> &str {
        &self.thought
    }

    pub fn emotion(&self) -> &str {
        &self.emotion
    }

    pub fn energy(&self) -> f32 {
        self.energy
    }

    pub fn energy_target(&self) -> f32 {
        self.config.energy_targets.get(self.activity)
    }

    pub fn action(&self) -> Option<&ActionLabel> {
        self.action.as_ref()
    }

    pub fn active_override(&self) -> Option<&VisualOverride> {
        self.override_slot.as_ref()
    }

    pub fn hold(&self) -> Option<&VisualizationHold> {
        self.hold.as_ref()
    }

    pub fn image_key(&self) -> Option<&str> {
        self.image_key.as_deref()
    }

    pub fn heartbeat_bpm(&self) -> f32 {
        heartbeat_bpm(&self.config, self.activity, &self.emotion)
    }

    /// Image keys currently worth keeping decoded.
    pub fn wanted_image_keys(&self) -> Vec<&str> {
        self.image_key
            .as_deref()
            .into_iter()
            .chain(self.override_slot.as_ref().and_then(|o| o.image_key()))
            .collect()
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    pub fn set_activity_state(&mut self, state: ActivityState, thought: Option<&str>) {
        if let Some(thought) = thought {
            self.thought = thought.to_string();
        }
        if self.hold.is_some() {
            log::debug!("visualization hold active, ignoring transition to {state}");
            return;
        }
        self.activity = state;
    }

    pub fn set_emotion(&mut self, label: &str) {
        self.emotion = label.to_string();
    }

    pub fn set_action(&mut self, label: &str, ttl_ms: u64, now: f64) {
        let ttl_ms = if ttl_ms == 0 {
            self.config.default_action_ttl_ms
        } else {
            ttl_ms
        };
        self.action = Some(ActionLabel {
            label: label.to_string(),
            expires_at: now + ttl_ms as f64 / 1000.0,
        });
    }

    pub fn set_override(&mut self, mode: OverrideMode, ttl_ms: u64, now: f64) {
        if mode == OverrideMode::Clear {
            self.clear_override();
            return;
        }
        let image_key = match &mode {
            OverrideMode::Image { data } => Some(override_image_key(data)),
            _ => None,
        };
        self.override_slot = Some(VisualOverride {
            mode,
            expires_at: now + ttl_ms as f64 / 1000.0,
            image_key,
        });
    }

    pub fn clear_override(&mut self) {
        self.override_slot = None;
    }

    pub fn set_image_key(&mut self, key: Option<String>) {
        self.image_key = key;
    }

    /// Default override after a chat reply, only when the slot is free.
    pub fn synthesize_reply_override(&mut self, reply: &str, now: f64) -> bool {
        if self.override_slot.is_some() {
            return false;
        }
        let mut hasher = DefaultHasher::new();
        reply.hash(&mut hasher);
        let hash = hasher.finish();

        let words = reply.split_whitespace().count();
        let mode = OverrideMode::Pattern {
            a: 2.0 + (reply.chars().count() % 5) as f32,
            b: 3.0 + (words % 4) as f32,
            amp: 0.35,
            rot: (hash % 360) as f32 * std::f32::consts::PI / 180.0,
        };
        let ttl = self.config.reply_override_ttl_ms;
        self.set_override(mode, ttl, now);
        true
    }

    /// Pin the state to thinking with a glyph cloud of `subject` for `seconds`.
    pub fn request_visualization_hold(&mut self, subject: &str, seconds: f32, now: f64) {
        let deadline = now + seconds.max(0.0) as f64;
        self.activity = ActivityState::Thinking;
        self.override_slot = Some(VisualOverride {
            mode: OverrideMode::GlyphCloud {
                glyphs: subject.to_string(),
            },
            expires_at: deadline,
            image_key: None,
        });
        self.hold = Some(VisualizationHold {
            subject: subject.to_string(),
            deadline,
        });
        log::info!("visualization hold for {seconds:.1}s: {subject}");
    }

    // ========================================================================
    // Per-frame steps (called in this order)
    // ========================================================================

    /// Drop entries whose expiry has been reached. Returns true if anything expired.
    pub fn expire(&mut self, now: f64) -> bool {
        let mut expired = false;
        if self.override_slot.as_ref().is_some_and(|o| now >= o.expires_at) {
            self.override_slot = None;
            expired = true;
        }
        if self.action.as_ref().is_some_and(|a| now >= a.expires_at) {
            self.action = None;
            expired = true;
        }
        expired
    }

    /// Finish the visualization hold once its deadline is crossed; returns the
    /// subject exactly once.
    pub fn advance_hold(&mut self, now: f64) -> Option<String> {
        let deadline = self.hold.as_ref()?.deadline;
        if now < deadline {
            return None;
        }
        let hold = self.hold.take()?;

        if let Some(VisualOverride {
            mode: OverrideMode::GlyphCloud { glyphs },
            ..
        }) = &self.override_slot
        {
            if *glyphs == hold.subject {
                self.override_slot = None;
            }
        }
        self.activity = ActivityState::Listening;
        log::info!("visualization complete: {}", hold.subject);
        Some(hold.subject)
    }

    /// First-order smoothing of energy toward the state's target.
    pub fn smooth_energy(&mut self, dt: f32) {
        let tau = self.config.energy_tau.max(1e-3);
        let alpha = 1.0 - (-dt.max(0.0) / tau).exp();
        self.energy += (self.energy_target() - self.energy) * alpha;
    }

    /// Target resolution, highest priority first.
    pub fn resolve(&self, image_status: impl Fn(&str) -> ImageStatus) -> TargetSpec {
        if let Some(active) = &self.override_slot {
            match &active.mode {
                OverrideMode::GlyphCloud { glyphs } => return TargetSpec::Text(glyphs.clone()),
                OverrideMode::FreeText { text } => return TargetSpec::Text(text.clone()),
                OverrideMode::Image { .. } => {
                    if let Some(key) = active.image_key() {
                        match image_status(key) {
                            ImageStatus::Ready => return TargetSpec::Image(key.to_string()),
                            ImageStatus::Loading => return TargetSpec::Hold,
                            ImageStatus::Missing | ImageStatus::Failed => {}
                        }
                    }
                }
                OverrideMode::Pattern { .. } | OverrideMode::Waveform | OverrideMode::Clear => {}
            }
        }

        if self.activity == ActivityState::Dormant {
            return TargetSpec::Empty;
        }

        if let Some(key) = &self.image_key {
            match image_status(key) {
                ImageStatus::Ready => return TargetSpec::Image(key.clone()),
                ImageStatus::Loading => return TargetSpec::Hold,
                ImageStatus::Missing | ImageStatus::Failed => {}
            }
        }

        if let Some(action) = &self.action {
            return TargetSpec::Action(action.label.clone());
        }

        if !self.thought.trim().is_empty() {
            return TargetSpec::Text(self.thought.clone());
        }

        TargetSpec::StateGlyph(self.activity)
    }

    pub fn decorations(&self) -> Decorations {
        let mut decorations = Decorations {
            waveform: self.activity == ActivityState::Speaking,
            ..Default::default()
        };
        match self.override_slot.as_ref().map(|o| &o.mode) {
            Some(OverrideMode::Pattern { a, b, amp, rot }) => {
                decorations.pattern = Some(PatternParams {
                    a: *a,
                    b: *b,
                    amp: *amp,
                    rot: *rot,
                });
            }
            Some(OverrideMode::Waveform) => decorations.waveform = true,
            Some(OverrideMode::GlyphCloud { glyphs }) => {
                decorations.glyph_cloud = Some(glyphs.clone());
            }
            _ => {}
        }
        decorations
    }
}

fn override_image_key(data: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    format!("override:{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn avatar() -> AvatarState {
        AvatarState::new(&AvatarConfig::default())
    }

    fn nothing_loaded(_: &str) -> ImageStatus {
        ImageStatus::Missing
    }

    #[test]
    fn parses_state_names() {
        assert_eq!("Thinking".parse::<ActivityState>(), Ok(ActivityState::Thinking));
        assert_eq!(" idle ".parse::<ActivityState>(), Ok(ActivityState::Dormant));
        assert!("dancing".parse::<ActivityState>().is_err());
    }

    #[test]
    fn heartbeat_table_without_emotion() {
        let config = AvatarConfig::default();
        assert_eq!(heartbeat_bpm(&config, ActivityState::Dormant, ""), 0.0);
        assert_eq!(heartbeat_bpm(&config, ActivityState::Listening, ""), 64.0);
        assert_eq!(heartbeat_bpm(&config, ActivityState::Thinking, ""), 96.0);
        assert_eq!(heartbeat_bpm(&config, ActivityState::Speaking, ""), 82.0);
    }

    #[test]
    fn emotion_keywords_override_cadence_but_not_dormancy() {
        let config = AvatarConfig::default();
        assert_eq!(heartbeat_bpm(&config, ActivityState::Listening, "Calm"), 58.0);
        assert_eq!(heartbeat_bpm(&config, ActivityState::Listening, "in the flow"), 92.0);
        assert_eq!(heartbeat_bpm(&config, ActivityState::Speaking, "anxious"), 110.0);
        assert_eq!(heartbeat_bpm(&config, ActivityState::Thinking, "happy!"), 98.0);
        assert_eq!(heartbeat_bpm(&config, ActivityState::Dormant, "excited"), 0.0);
    }

    #[test]
    fn dormant_without_override_resolves_empty() {
        let mut avatar = avatar();
        avatar.set_activity_state(ActivityState::Dormant, Some("secret thought"));
        avatar.set_action("smile", 5000, 0.0);
        assert_eq!(avatar.resolve(nothing_loaded), TargetSpec::Empty);
    }

    #[test]
    fn state_name_is_the_fallback_target() {
        let mut avatar = avatar();
        avatar.set_activity_state(ActivityState::Listening, None);
        assert_eq!(
            avatar.resolve(nothing_loaded),
            TargetSpec::StateGlyph(ActivityState::Listening)
        );
    }

    #[test]
    fn resolution_priority_image_action_thought() {
        let mut avatar = avatar();
        avatar.set_activity_state(ActivityState::Speaking, Some("hello"));
        assert_eq!(avatar.resolve(nothing_loaded), TargetSpec::Text("hello".into()));

        avatar.set_action("wave", 5000, 0.0);
        assert_eq!(avatar.resolve(nothing_loaded), TargetSpec::Action("wave".into()));

        avatar.set_image_key(Some("cat".into()));
        assert_eq!(avatar.resolve(|_| ImageStatus::Ready), TargetSpec::Image("cat".into()));
        assert_eq!(avatar.resolve(|_| ImageStatus::Loading), TargetSpec::Hold);
        assert_eq!(avatar.resolve(|_| ImageStatus::Failed), TargetSpec::Action("wave".into()));
    }

    #[test]
    fn image_override_beats_action() {
        let mut avatar = avatar();
        avatar.set_activity_state(ActivityState::Thinking, None);
        avatar.set_action("smile", 5000, 0.0);
        avatar.set_override(OverrideMode::Image { data: vec![1, 2, 3] }, 5000, 0.0);

        let key = avatar.active_override().and_then(|o| o.image_key()).unwrap().to_string();
        assert_eq!(avatar.resolve(|_| ImageStatus::Ready), TargetSpec::Image(key));
    }

    #[test]
    fn decoration_overrides_do_not_produce_targets() {
        let mut avatar = avatar();
        avatar.set_activity_state(ActivityState::Thinking, Some("idea"));
        avatar.set_override(
            OverrideMode::Pattern {
                a: 3.0,
                b: 5.0,
                amp: 0.4,
                rot: 0.0,
            },
            5000,
            0.0,
        );
        assert_eq!(avatar.resolve(nothing_loaded), TargetSpec::Text("idea".into()));
        assert!(avatar.decorations().pattern.is_some());

        avatar.set_override(OverrideMode::Waveform, 5000, 0.0);
        assert!(avatar.decorations().waveform);
        assert_eq!(avatar.resolve(nothing_loaded), TargetSpec::Text("idea".into()));
    }

    #[test]
    fn expiry_has_no_grace_frame() {
        let mut avatar = avatar();
        avatar.set_activity_state(ActivityState::Listening, None);
        avatar.set_action("nod", 1000, 10.0);
        avatar.set_override(OverrideMode::FreeText { text: "hey".into() }, 500, 10.0);

        assert!(!avatar.expire(10.499));
        assert_eq!(avatar.resolve(nothing_loaded), TargetSpec::Text("hey".into()));

        assert!(avatar.expire(10.5));
        assert_eq!(avatar.resolve(nothing_loaded), TargetSpec::Action("nod".into()));

        assert!(avatar.expire(11.0));
        assert_eq!(
            avatar.resolve(nothing_loaded),
            TargetSpec::StateGlyph(ActivityState::Listening)
        );
    }

    #[test]
    fn clear_mode_empties_the_slot() {
        let mut avatar = avatar();
        avatar.set_override(OverrideMode::Waveform, 5000, 0.0);
        avatar.set_override(OverrideMode::Clear, 5000, 0.0);
        assert!(avatar.active_override().is_none());
    }

    #[test]
    fn energy_approaches_target_without_snapping() {
        let mut avatar = avatar();
        avatar.set_activity_state(ActivityState::Speaking, None);
        let start = avatar.energy();

        avatar.smooth_energy(1.0 / 60.0);
        let after_one = avatar.energy();
        assert!(after_one > start && after_one < 1.0);

        for _ in 0..600 {
            avatar.smooth_energy(1.0 / 60.0);
        }
        assert!((avatar.energy() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn hold_pins_thinking_and_completes_once() {
        let mut avatar = avatar();
        avatar.set_activity_state(ActivityState::Listening, None);
        avatar.request_visualization_hold("a red apple", 3.0, 1.0);

        avatar.set_activity_state(ActivityState::Speaking, None);
        assert_eq!(avatar.activity(), ActivityState::Thinking);
        assert_eq!(avatar.advance_hold(3.9), None);

        assert_eq!(avatar.advance_hold(4.0), Some("a red apple".to_string()));
        assert_eq!(avatar.activity(), ActivityState::Listening);
        assert!(avatar.active_override().is_none());
        assert_eq!(avatar.advance_hold(4.1), None);
    }

    #[test]
    fn reply_override_only_fills_an_empty_slot() {
        let mut avatar = avatar();
        assert!(avatar.synthesize_reply_override("all done here", 0.0));
        assert!(avatar.decorations().pattern.is_some());
        assert!(!avatar.synthesize_reply_override("again", 0.0));
    }

    #[test]
    fn override_modes_round_trip_as_tagged_json() {
        let mode = OverrideMode::FreeText { text: "hi".into() };
        let json = serde_json::to_string(&mode).unwrap();
        assert_eq!(json, r#"{"mode":"free_text","text":"hi"}"#);
        let back: OverrideMode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mode);
    }
}
