//! Orb Studio - host application
//! Runs the orb engine in an egui window with a control panel

use eframe::egui;
use orb_renderer::config::{ColorScheme, OrbConfig};
use orb_renderer::engine::{EngineEvent, FrameKind, OrbEngine};
use orb_renderer::offscreen;
use orb_renderer::{ActivityState, ImageSource, OverrideMode};
use std::time::{Duration, Instant};

const CONFIG_PATH: &str = "orb_config.json";
const TOAST_SECS: u64 = 4;

struct Toast {
    text: String,
    expires: Instant,
}

#[derive(Clone, Copy, PartialEq)]
enum SettingsTab {
    State,
    Overrides,
    Display,
}

#[derive(Clone, Copy, PartialEq)]
enum OverrideChoice {
    Pattern,
    Waveform,
    GlyphCloud,
    FreeText,
}

/// Main application state
struct OrbStudioApp {
    engine: OrbEngine,
    started: Instant,

    // UI state
    show_settings: bool,
    settings_tab: SettingsTab,
    selected_preset: usize,
    color_scheme_names: Vec<String>,

    // Inputs the panel feeds into the engine
    activity: ActivityState,
    thought: String,
    emotion: String,
    action: String,
    action_ttl_ms: u64,
    hold_subject: String,
    hold_secs: f32,
    override_choice: OverrideChoice,
    override_text: String,
    override_ttl_ms: u64,
    pattern: [f32; 4],
    reply: String,
    focus: bool,
    locked: bool,
    loading: bool,

    toasts: Vec<Toast>,
}

impl OrbStudioApp {
    fn new(cc: &eframe::CreationContext<'_>, engine: OrbEngine) -> Self {
        // Setup dark theme
        let mut visuals = egui::Visuals::dark();
        visuals.window_fill = egui::Color32::from_rgba_unmultiplied(12, 12, 22, 245);
        visuals.panel_fill = egui::Color32::from_rgba_unmultiplied(16, 16, 30, 240);
        cc.egui_ctx.set_visuals(visuals);

        let color_scheme_names: Vec<String> = ColorScheme::all_schemes()
            .iter()
            .map(|s| s.name.clone())
            .collect();

        Self {
            engine,
            started: Instant::now(),
            show_settings: true,
            settings_tab: SettingsTab::State,
            selected_preset: 0,
            color_scheme_names,
            activity: ActivityState::Dormant,
            thought: String::new(),
            emotion: String::new(),
            action: "smile".to_string(),
            action_ttl_ms: 4000,
            hold_subject: "a red apple".to_string(),
            hold_secs: 3.0,
            override_choice: OverrideChoice::Pattern,
            override_text: "✦ ✧ ★".to_string(),
            override_ttl_ms: 6000,
            pattern: [3.0, 5.0, 0.35, 0.0],
            reply: String::new(),
            focus: false,
            locked: false,
            loading: false,
            toasts: Vec::new(),
        }
    }

    fn toast(&mut self, text: impl Into<String>) {
        self.toasts.push(Toast {
            text: text.into(),
            expires: Instant::now() + Duration::from_secs(TOAST_SECS),
        });
    }

    fn rebuild_engine(&mut self, config: OrbConfig) {
        match OrbEngine::new(config) {
            Ok(engine) => {
                self.engine = engine;
                self.engine.set_activity_state(self.activity, Some(&self.thought));
                self.engine.set_emotion(&self.emotion);
                self.engine.set_performance_focus(self.focus);
            }
            Err(e) => {
                log::warn!("keeping previous engine: {e}");
                self.toast(format!("Could not apply settings: {e}"));
            }
        }
    }

    /// Minimized windows count as hidden.
    fn sync_visibility(&mut self, ctx: &egui::Context) {
        let minimized = ctx.input(|i| i.viewport().minimized).unwrap_or(false);
        if minimized != self.engine.host_flags().hidden {
            if minimized {
                self.engine.on_host_hidden();
            } else {
                self.engine.on_host_visible();
            }
        }
    }

    fn handle_events(&mut self) {
        for event in self.engine.drain_events() {
            match event {
                EngineEvent::VisualizationComplete(subject) => {
                    self.activity = ActivityState::Listening;
                    self.toast(format!("Visualized: {subject}"));
                }
                EngineEvent::LowFidelityEngaged { avg_frame_ms } => {
                    self.toast(format!(
                        "Frames are slow ({avg_frame_ms:.0} ms), switching to a lighter orb"
                    ));
                }
                EngineEvent::LowFidelityRelaxed => {
                    log::info!("full fidelity restored");
                }
            }
        }
    }
}

impl eframe::App for OrbStudioApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = self.started.elapsed().as_secs_f64();

        self.sync_visibility(ctx);
        let outcome = self.engine.tick(now);
        self.handle_events();

        // UI Layout
        self.render_top_bar(ctx);
        if self.show_settings {
            self.render_settings_panel(ctx);
        }
        self.render_canvas(ctx);
        self.render_toasts(ctx);

        // The engine decides its own cadence; stopped means no reschedule
        if let Some(delay) = outcome.next_frame_in {
            ctx.request_repaint_after(delay);
        }
    }
}

impl OrbStudioApp {
    fn render_top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("◉ Orb Studio");
                ui.separator();

                if self.engine.is_running() {
                    if ui.button("⏸ Stop").clicked() {
                        self.engine.stop();
                    }
                } else if ui.button("▶ Start").clicked() {
                    self.engine.start();
                    ctx.request_repaint();
                }

                if ui.button("📷 Save snapshot").clicked() {
                    self.save_snapshot();
                }

                ui.separator();
                ui.toggle_value(&mut self.show_settings, "⚙ Settings");

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let report = self.engine.performance_report();
                    ui.label(format!(
                        "{:.0} fps · {:.1} ms · {:?} · {:?} · {}/{} particles · {} pts{}",
                        report.fps,
                        report.avg_frame_ms,
                        report.mode,
                        report.fidelity,
                        report.particles_updated,
                        report.particle_count,
                        report.cloud_len,
                        if report.loading { " · loading" } else { "" },
                    ));
                });
            });
        });
    }

    fn render_settings_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("settings_panel")
            .min_width(280.0)
            .show(ctx, |ui| {
                ui.heading("Controls");
                ui.separator();

                // Tab buttons
                ui.horizontal(|ui| {
                    ui.selectable_value(&mut self.settings_tab, SettingsTab::State, "State");
                    ui.selectable_value(&mut self.settings_tab, SettingsTab::Overrides, "Overrides");
                    ui.selectable_value(&mut self.settings_tab, SettingsTab::Display, "Display");
                });

                ui.separator();

                egui::ScrollArea::vertical().show(ui, |ui| match self.settings_tab {
                    SettingsTab::State => self.render_state_settings(ui),
                    SettingsTab::Overrides => self.render_override_settings(ui),
                    SettingsTab::Display => self.render_display_settings(ui),
                });
            });
    }

    fn render_state_settings(&mut self, ui: &mut egui::Ui) {
        ui.label("Activity");
        ui.horizontal_wrapped(|ui| {
            for state in ActivityState::ALL {
                if ui
                    .selectable_value(&mut self.activity, state, state.name())
                    .changed()
                {
                    self.engine.set_activity_state(state, None);
                }
            }
        });

        ui.add_space(8.0);
        ui.label("Thought");
        ui.horizontal(|ui| {
            ui.text_edit_singleline(&mut self.thought);
            if ui.button("Send").clicked() {
                self.engine.set_activity_state(self.activity, Some(&self.thought));
            }
        });

        ui.label("Emotion");
        if ui.text_edit_singleline(&mut self.emotion).changed() {
            self.engine.set_emotion(&self.emotion);
        }
        ui.label(format!("Heartbeat: {:.0} bpm", self.engine.avatar().heartbeat_bpm()));
        ui.add(egui::ProgressBar::new(self.engine.avatar().energy()).text("energy"));

        ui.add_space(8.0);
        ui.label("Action");
        ui.horizontal(|ui| {
            ui.text_edit_singleline(&mut self.action);
            if ui.button("Play").clicked() {
                self.engine.set_action(&self.action, self.action_ttl_ms);
            }
        });
        ui.add(egui::Slider::new(&mut self.action_ttl_ms, 0..=10000).text("ttl ms"));

        ui.add_space(8.0);
        ui.label("Visualization hold");
        ui.text_edit_singleline(&mut self.hold_subject);
        ui.horizontal(|ui| {
            ui.add(egui::Slider::new(&mut self.hold_secs, 0.5..=10.0).text("s"));
            if ui.button("Visualize").clicked() {
                self.engine
                    .request_visualization_hold(&self.hold_subject, self.hold_secs);
                self.activity = ActivityState::Thinking;
            }
        });

        ui.add_space(8.0);
        ui.label("Image target");
        ui.horizontal(|ui| {
            if ui.button("📂 Load image").clicked() {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("Image", &["png", "jpg", "jpeg", "gif", "bmp", "webp"])
                    .pick_file()
                {
                    let key = path.to_string_lossy().to_string();
                    self.engine.set_image_target(ImageSource::Path(path), &key);
                }
            }
            if ui.button("Clear").clicked() {
                self.engine.clear_image_target();
            }
        });

        ui.add_space(8.0);
        ui.label("Chat reply");
        ui.horizontal(|ui| {
            ui.text_edit_singleline(&mut self.reply);
            if ui.button("Complete").clicked() {
                self.engine.on_reply_complete(&self.reply);
            }
        });
    }

    fn render_override_settings(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            ui.selectable_value(&mut self.override_choice, OverrideChoice::Pattern, "Pattern");
            ui.selectable_value(&mut self.override_choice, OverrideChoice::Waveform, "Waveform");
            ui.selectable_value(&mut self.override_choice, OverrideChoice::GlyphCloud, "Glyph cloud");
            ui.selectable_value(&mut self.override_choice, OverrideChoice::FreeText, "Free text");
        });

        ui.add_space(8.0);
        match self.override_choice {
            OverrideChoice::Pattern => {
                ui.add(egui::Slider::new(&mut self.pattern[0], 1.0..=9.0).text("a"));
                ui.add(egui::Slider::new(&mut self.pattern[1], 1.0..=9.0).text("b"));
                ui.add(egui::Slider::new(&mut self.pattern[2], 0.0..=0.8).text("amplitude"));
                ui.add(egui::Slider::new(&mut self.pattern[3], 0.0..=std::f32::consts::TAU).text("rotation"));
            }
            OverrideChoice::Waveform => {
                ui.label("Radial spikes driven by energy");
            }
            OverrideChoice::GlyphCloud | OverrideChoice::FreeText => {
                ui.text_edit_singleline(&mut self.override_text);
            }
        }
        ui.add(egui::Slider::new(&mut self.override_ttl_ms, 500..=20000).text("ttl ms"));

        ui.horizontal(|ui| {
            if ui.button("Apply").clicked() {
                let mode = match self.override_choice {
                    OverrideChoice::Pattern => OverrideMode::Pattern {
                        a: self.pattern[0],
                        b: self.pattern[1],
                        amp: self.pattern[2],
                        rot: self.pattern[3],
                    },
                    OverrideChoice::Waveform => OverrideMode::Waveform,
                    OverrideChoice::GlyphCloud => OverrideMode::GlyphCloud {
                        glyphs: self.override_text.clone(),
                    },
                    OverrideChoice::FreeText => OverrideMode::FreeText {
                        text: self.override_text.clone(),
                    },
                };
                self.engine.set_override(mode, self.override_ttl_ms);
            }
            if ui.button("📂 Image override").clicked() {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("Image", &["png", "jpg", "jpeg", "gif", "bmp", "webp"])
                    .pick_file()
                {
                    match std::fs::read(&path) {
                        Ok(data) => self
                            .engine
                            .set_override(OverrideMode::Image { data }, self.override_ttl_ms),
                        Err(e) => {
                            log::warn!("failed to read {}: {e}", path.display());
                            self.toast(format!("Could not read {}", path.display()));
                        }
                    }
                }
            }
            if ui.button("Clear").clicked() {
                self.engine.clear_override();
            }
        });

        if let Some(active) = self.engine.avatar().active_override() {
            let left = (active.expires_at - self.engine.now()).max(0.0);
            ui.label(format!("Active override, {left:.1}s left"));
        }
    }

    fn render_display_settings(&mut self, ui: &mut egui::Ui) {
        // Preset selector
        ui.horizontal(|ui| {
            ui.label("Preset:");
            let preset_names = OrbConfig::preset_names();
            let mut chosen = None;
            egui::ComboBox::from_id_source("preset_combo")
                .selected_text(preset_names.get(self.selected_preset).copied().unwrap_or("Default"))
                .show_ui(ui, |ui| {
                    for (i, name) in preset_names.iter().enumerate() {
                        if ui.selectable_value(&mut self.selected_preset, i, *name).changed() {
                            chosen = Some(*name);
                        }
                    }
                });
            if let Some(name) = chosen {
                let mut config = self.engine.config().clone();
                config.apply_preset(name);
                self.rebuild_engine(config);
            }
        });

        ui.horizontal(|ui| {
            ui.label("Colors:");
            let mut index = self.engine.config().color_scheme_index;
            egui::ComboBox::from_id_source("scheme_combo")
                .selected_text(self.color_scheme_names.get(index).cloned().unwrap_or_default())
                .show_ui(ui, |ui| {
                    for (i, name) in self.color_scheme_names.iter().enumerate() {
                        ui.selectable_value(&mut index, i, name);
                    }
                });
            if index != self.engine.config().color_scheme_index {
                self.engine.set_color_scheme(index);
            }
        });

        ui.add_space(8.0);
        ui.label("Host signals");
        if ui.checkbox(&mut self.focus, "Performance focus").changed() {
            self.engine.set_performance_focus(self.focus);
        }
        if ui.checkbox(&mut self.locked, "Locked").changed() {
            if self.locked {
                self.engine.on_host_locked();
            } else {
                self.engine.on_host_unlocked();
            }
        }
        if ui.checkbox(&mut self.loading, "Loading").changed() {
            self.engine.set_host_loading(self.loading);
        }

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            if ui.button("💾 Save config").clicked() {
                match self.engine.config().save(CONFIG_PATH) {
                    Ok(()) => self.toast(format!("Saved {CONFIG_PATH}")),
                    Err(e) => {
                        log::warn!("config save failed: {e:#}");
                        self.toast("Config save failed");
                    }
                }
            }
            if ui.button("📂 Reload config").clicked() {
                match OrbConfig::load(CONFIG_PATH) {
                    Ok(config) => self.rebuild_engine(config),
                    Err(e) => {
                        log::warn!("config load failed: {e:#}");
                        self.toast("Config load failed");
                    }
                }
            }
        });

        ui.add_space(8.0);
        ui.collapsing("Performance report", |ui| {
            let report = self.engine.performance_report();
            let text = serde_json::to_string_pretty(&report).unwrap_or_default();
            ui.monospace(text);
        });
    }

    fn save_snapshot(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("PNG", &["png"])
            .set_file_name("orb.png")
            .save_file()
        else {
            return;
        };

        let result = self
            .engine
            .snapshot()
            .and_then(|frame| offscreen::save_png(&frame, &path));
        match result {
            Ok(()) => self.toast(format!("Saved {}", path.display())),
            Err(e) => {
                log::warn!("snapshot failed: {e}");
                self.toast(format!("Snapshot failed: {e}"));
            }
        }
    }

    fn render_canvas(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let (rect, _) = ui.allocate_exact_size(ui.available_size(), egui::Sense::hover());
            let painter = ui.painter_at(rect);
            self.engine.render(&painter, rect);

            if self.engine.last_frame_kind() == FrameKind::Stopped {
                painter.text(
                    rect.center_bottom() - egui::vec2(0.0, 24.0),
                    egui::Align2::CENTER_CENTER,
                    "stopped",
                    egui::FontId::proportional(14.0),
                    egui::Color32::from_gray(140),
                );
            }
        });
    }

    fn render_toasts(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        self.toasts.retain(|t| t.expires > now);
        if self.toasts.is_empty() {
            return;
        }

        egui::Area::new(egui::Id::new("toasts"))
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-16.0, -16.0))
            .show(ctx, |ui| {
                for toast in &self.toasts {
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.label(&toast.text);
                    });
                }
            });
        ctx.request_repaint_after(Duration::from_millis(250));
    }
}

fn load_config() -> OrbConfig {
    if !std::path::Path::new(CONFIG_PATH).exists() {
        return OrbConfig::default();
    }
    match OrbConfig::load(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("ignoring {CONFIG_PATH}: {e:#}");
            OrbConfig::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let engine = OrbEngine::new(load_config())?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 760.0])
            .with_title("Orb Studio")
            .with_min_inner_size([720.0, 480.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Orb Studio",
        options,
        Box::new(|cc| Box::new(OrbStudioApp::new(cc, engine))),
    )
    .map_err(|e| anyhow::anyhow!("window failed: {e}"))
}
