//! Bundled platform capabilities.
//!
//! Hosts with real hardware plug their own [`PositionSensor`] and
//! [`SpeechEngine`] into the navigator. These implementations let the engine
//! run headless: positions are replayed along the installed route and speech
//! goes to the log.
//!
//! [`PositionSensor`]: crate::position::PositionSensor
//! [`SpeechEngine`]: crate::voice::SpeechEngine

mod replay;
mod speaker;

pub use replay::{walk, RouteReplaySensor};
pub use speaker::LogSpeechEngine;
