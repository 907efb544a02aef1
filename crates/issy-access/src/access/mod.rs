//! Access pass crate: sub-modules.

pub mod types;
pub mod config;
pub mod clock;
pub mod core;
pub mod verify;
pub mod qr;
pub mod rotation;

// Re-export top-level items for convenience.
pub use types::*;
pub use config::RotationConfig;
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use self::core::{generate, generate_at, seconds_until_next_rotation, time_step};
pub use rotation::{CodeSource, HmacCodeSource, RotationEngine, Rotator};
