//! Playback timing.
//!
//! The [`PlaybackClock`] turns whatever time an engine reports (or fails to
//! report) into a displayed position that moves plausibly while playing and
//! stays put while paused.

mod clock;

pub use clock::{ClockConfig, ClockMode, PlaybackClock};
