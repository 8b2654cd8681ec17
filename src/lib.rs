//! Orb renderer: a real-time adaptive particle-swarm avatar.
//!
//! Thousands of particles orbit a center point and regroup into text, action
//! glyphs or image silhouettes as the assistant's state changes. A frame
//! scheduler throttles the loop when the host is hidden and drops to a
//! thinner swarm when frames run slow.

pub mod config;
pub mod engine;
pub mod error;
pub mod glyphs;
pub mod governor;
pub mod offscreen;
pub mod overlays;
pub mod particles;
pub mod raster;
pub mod state;

pub use config::OrbConfig;
pub use engine::{EngineEvent, FrameKind, FrameOutcome, OrbEngine, PerformanceReport};
pub use error::OrbError;
pub use raster::{ImageSource, PointCloud};
pub use state::{ActivityState, OverrideMode};
