// THEORY:
// This file is the entry point of the `safeflame` library crate: a kitchen-safety
// hazard engine that turns camera frames and object detections into prioritized,
// rate-limited alerts.
//
// The primary API is `HazardEngine` (in `engine`), driven one tick at a time.
// Underneath it sit two stages:
// 1.  `signals`: pixel heuristics for flame, smoke, boil-over and proximity,
//     built on the primitives in `core_modules`.
// 2.  `tracker`: the per-zone unattended-burner state machine and cooldowns.
//
// Delivery of the resulting alerts (`dispatch`) and debug overlays (`overlay`) are
// optional layers on top; hosts may ignore both and consume `TickReport`s directly.

pub mod config;
pub mod core_modules;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod hazard;
pub mod overlay;
pub mod signals;
pub mod tracker;
pub mod types;

pub use config::{ConfigValue, EngineConfig, HsvBand, SignalConfig, TrackerConfig};
pub use core_modules::frame::Frame;
pub use engine::{HazardEngine, TickReport};
pub use error::{ConfigError, EngineError};
pub use hazard::{AlertEvent, Hazard, HazardKind, Severity};
pub use tracker::{BurnerState, KitchenStatus, ZoneStatus};
pub use types::{BoundingBox, Detection, Rect, Seconds, Zone};
