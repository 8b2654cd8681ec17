//! Frame Scheduler / Performance Governor for Orb Studio
//! Rate limiting per host mode, slow-frame detection and fidelity control

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use crate::config::GovernorConfig;

/// Visibility and focus signals pushed by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HostFlags {
    pub hidden: bool,
    pub locked: bool,
    pub loading: bool,
    pub performance_focus: bool,
}

impl HostFlags {
    pub fn mode(&self) -> SchedulerMode {
        if self.hidden || self.locked || self.loading {
            SchedulerMode::Idle
        } else if self.performance_focus {
            SchedulerMode::Focus
        } else {
            SchedulerMode::Active
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerMode {
    /// Awake and foregrounded: full rate.
    Active,
    /// Manual performance focus: intermediate rate, thinned swarm.
    Focus,
    /// Hidden, locked or loading: a few Hz, minimal frames only.
    Idle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fidelity {
    Full,
    Low,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GovernorEvent {
    LowFidelityEngaged { avg_frame_ms: f32 },
    LowFidelityRelaxed,
}

pub struct FrameScheduler {
    config: GovernorConfig,
    mode: SchedulerMode,
    fidelity: Fidelity,

    last_frame_at: Option<f64>,
    // The first delta after a mode change spans the switch and says nothing
    // about rendering cost
    skip_next_sample: bool,

    window: VecDeque<bool>,
    slow_in_window: usize,
    avg_frame_ms: f32,
    last_delta_ms: f32,

    events: Vec<GovernorEvent>,
}

impl FrameScheduler {
    pub fn new(config: &GovernorConfig) -> Self {
        Self {
            config: config.clone(),
            mode: SchedulerMode::Active,
            fidelity: Fidelity::Full,
            last_frame_at: None,
            skip_next_sample: false,
            window: VecDeque::with_capacity(config.sample_window),
            slow_in_window: 0,
            avg_frame_ms: 0.0,
            last_delta_ms: 0.0,
            events: Vec::new(),
        }
    }

    pub fn mode(&self) -> SchedulerMode {
        self.mode
    }

    pub fn fidelity(&self) -> Fidelity {
        self.fidelity
    }

    pub fn avg_frame_ms(&self) -> f32 {
        self.avg_frame_ms
    }

    pub fn last_delta_ms(&self) -> f32 {
        self.last_delta_ms
    }

    pub fn slow_in_window(&self) -> usize {
        self.slow_in_window
    }

    pub fn target_rate_hz(&self) -> f32 {
        let rate = match self.mode {
            SchedulerMode::Active => self.config.full_rate_hz,
            SchedulerMode::Focus => self.config.focus_rate_hz,
            SchedulerMode::Idle => self.config.idle_rate_hz,
        };
        rate.max(0.1)
    }

    fn interval_secs(&self) -> f64 {
        1.0 / self.target_rate_hz() as f64
    }

    /// Particle update/draw stride for the current fidelity and mode.
    pub fn stride(&self) -> usize {
        if self.fidelity == Fidelity::Low || self.mode == SchedulerMode::Focus {
            self.config.low_fidelity_stride.max(1)
        } else {
            1
        }
    }

    /// Minimal frames only: no particles, no rasterization.
    pub fn is_minimal(&self) -> bool {
        self.mode == SchedulerMode::Idle
    }

    /// Decide whether a frame runs at `now`. Returns the elapsed time since
    /// the previous admitted frame, or `None` when the minimum interval for
    /// the current mode has not passed yet.
    pub fn admit(&mut self, now: f64, flags: HostFlags) -> Option<f32> {
        let mode = flags.mode();
        if mode != self.mode {
            log::info!("scheduler mode {:?} -> {:?}", self.mode, mode);
            self.mode = mode;
            self.reset_samples();
            self.skip_next_sample = true;
        }

        let interval = self.interval_secs();
        let elapsed = match self.last_frame_at {
            // Allow a little early arrival so vsync jitter does not halve the rate
            Some(last) if now - last < interval * 0.9 => return None,
            Some(last) => Some((now - last).max(0.0)),
            None => None,
        };
        self.last_frame_at = Some(now);

        let Some(elapsed) = elapsed else {
            return Some(0.0);
        };

        let delta_ms = (elapsed * 1000.0) as f32;
        self.last_delta_ms = delta_ms;
        if std::mem::take(&mut self.skip_next_sample) {
            return Some(elapsed as f32);
        }
        // Idle frames are slow on purpose
        if self.mode != SchedulerMode::Idle {
            self.record(delta_ms);
        }
        Some(elapsed as f32)
    }

    /// Feed one measured inter-frame delta into the slow-frame detector.
    pub fn record(&mut self, delta_ms: f32) {
        if self.window.is_empty() && self.avg_frame_ms == 0.0 {
            self.avg_frame_ms = delta_ms;
        } else {
            let w = self.config.average_weight.clamp(0.0, 1.0);
            self.avg_frame_ms += (delta_ms - self.avg_frame_ms) * w;
        }

        let slow = delta_ms > self.config.slow_frame_ms;
        self.window.push_back(slow);
        if slow {
            self.slow_in_window += 1;
        }
        while self.window.len() > self.config.sample_window.max(1) {
            if self.window.pop_front() == Some(true) {
                self.slow_in_window -= 1;
            }
        }

        match self.fidelity {
            Fidelity::Full if self.slow_in_window >= self.config.slow_frames_to_engage => {
                log::info!(
                    "low fidelity engaged: {} slow frames, avg {:.1} ms",
                    self.slow_in_window,
                    self.avg_frame_ms
                );
                self.fidelity = Fidelity::Low;
                self.reset_samples();
                self.events.push(GovernorEvent::LowFidelityEngaged {
                    avg_frame_ms: self.avg_frame_ms,
                });
            }
            Fidelity::Low
                if self.window.len() >= self.config.sample_window.max(1)
                    && self.slow_in_window <= self.config.relax_max_slow =>
            {
                log::info!("full fidelity restored, avg {:.1} ms", self.avg_frame_ms);
                self.fidelity = Fidelity::Full;
                self.reset_samples();
                self.events.push(GovernorEvent::LowFidelityRelaxed);
            }
            _ => {}
        }
    }

    /// Forget the previous frame time, e.g. after the engine was stopped.
    pub fn restart(&mut self) {
        self.last_frame_at = None;
        self.skip_next_sample = false;
        self.reset_samples();
    }

    fn reset_samples(&mut self) {
        self.window.clear();
        self.slow_in_window = 0;
    }

    /// Delay before the next frame is due, measured from `now`.
    pub fn next_frame_in(&self, now: f64) -> Duration {
        let interval = self.interval_secs();
        let remaining = match self.last_frame_at {
            Some(last) => (last + interval - now).max(0.0),
            None => 0.0,
        };
        Duration::from_secs_f64(remaining)
    }

    pub fn drain_events(&mut self) -> Vec<GovernorEvent> {
        std::mem::take(&mut self.events)
    }
}
