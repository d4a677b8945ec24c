//! Helpers for exercising the pipeline without ffmpeg installed.

pub mod executor;
pub mod station;

pub use executor::{FakeMedia, RecordedCall, ScriptedExecutor};
pub use station::StationFixture;
