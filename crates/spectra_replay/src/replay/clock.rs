//! Playback clock for transport displays.
//!
//! Some engine embeddings report a current time of `0`, or a frozen value,
//! while they are in fact playing. The clock keeps a displayed time that is
//! usable anyway, by switching between three modes on every poll:
//!
//! - [`ClockMode::Reported`] - the engine reported a positive time; trust it.
//! - [`ClockMode::Interpolated`] - no report, but playing with a known total;
//!   advance by one poll interval, clamped to the total.
//! - [`ClockMode::Held`] - otherwise hold at the last known real time.
//!
//! The last known real time is written only here: by [`PlaybackClock::poll`]
//! and by the transport actions, which update it before calling the engine.

use crate::adapter::PlaybackAdapter;
use crate::time::Timestamp;
use std::time::Duration;

/// Timing parameters for the clock.
#[derive(Clone, Debug, PartialEq)]
pub struct ClockConfig {
    /// How often the engine is polled.
    pub poll_interval: Duration,
    /// Distance covered by one skip back/forward.
    pub seek_step: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            seek_step: Duration::from_secs(5),
        }
    }
}

impl ClockConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_seek_step(mut self, step: Duration) -> Self {
        self.seek_step = step;
        self
    }
}

/// Where the displayed time came from on the latest poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockMode {
    Reported,
    Interpolated,
    Held,
}

/// Displayed time, total time and transport state for one viewer.
#[derive(Debug)]
pub struct PlaybackClock {
    config: ClockConfig,
    /// Time shown to the user.
    current: Timestamp,
    total: Timestamp,
    /// Last time the engine (or a transport action) established for real.
    last_known: Option<Timestamp>,
    playing: bool,
    speed: f64,
    mode: ClockMode,
}

impl PlaybackClock {
    /// Create a stopped clock.
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            current: Timestamp::zero(),
            total: Timestamp::zero(),
            last_known: None,
            playing: false,
            speed: 1.0,
            mode: ClockMode::Held,
        }
    }

    /// Start over for a newly attached engine.
    pub fn reset(&mut self, total: Timestamp) {
        self.current = Timestamp::zero();
        self.total = total;
        self.last_known = None;
        self.playing = false;
        self.speed = 1.0;
        self.mode = ClockMode::Held;
    }

    /// Get the clock configuration.
    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Get the time shown to the user.
    pub fn current_time(&self) -> Timestamp {
        self.current
    }

    /// Get the length of the recording.
    pub fn total_time(&self) -> Timestamp {
        self.total
    }

    /// Get the last time established by the engine or a seek.
    pub fn last_known(&self) -> Option<Timestamp> {
        self.last_known
    }

    /// Check if playback is running.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Get the current playback speed.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Get where the current time came from on the last poll.
    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Progress through the recording, from 0.0 to 1.0.
    pub fn progress(&self) -> f32 {
        if self.total.is_zero() {
            return 0.0;
        }
        (self.current.as_millis() as f32 / self.total.as_millis() as f32).min(1.0)
    }

    /// One poll tick. Without an adapter this does nothing.
    pub fn poll(&mut self, adapter: Option<&mut PlaybackAdapter>) -> ClockMode {
        let Some(adapter) = adapter else {
            return self.mode;
        };

        if let Some(total) = adapter.metadata().total_time.filter(|t| !t.is_zero()) {
            self.total = total;
        }

        let reported = adapter.current_time();
        if !reported.is_zero() {
            self.current = reported;
            self.last_known = Some(reported);
            self.mode = ClockMode::Reported;
        } else if self.playing && !self.total.is_zero() {
            self.current = self
                .current
                .saturating_add(self.config.poll_interval)
                .min(self.total);
            self.mode = ClockMode::Interpolated;
        } else {
            self.current = self.last_known.unwrap_or_default();
            self.mode = ClockMode::Held;
        }
        self.mode
    }

    /// Resume playback where the engine is.
    pub fn play(&mut self, adapter: Option<&mut PlaybackAdapter>) -> bool {
        let Some(adapter) = adapter else {
            return false;
        };
        match adapter.play(None) {
            Ok(_) => {
                self.playing = true;
                true
            }
            Err(err) => {
                tracing::debug!("Play ignored: {}", err);
                false
            }
        }
    }

    /// Pause, capturing the real position first.
    pub fn pause(&mut self, adapter: Option<&mut PlaybackAdapter>) -> bool {
        let Some(adapter) = adapter else {
            return false;
        };

        let reported = adapter.current_time();
        let captured = if reported.is_zero() {
            self.current
        } else {
            reported
        };
        self.last_known = Some(captured);
        self.current = captured;

        match adapter.pause() {
            Ok(_) => {
                self.playing = false;
                true
            }
            Err(err) => {
                tracing::debug!("Pause ignored: {}", err);
                false
            }
        }
    }

    /// Toggle between play and pause.
    pub fn toggle(&mut self, adapter: Option<&mut PlaybackAdapter>) -> bool {
        if self.playing {
            self.pause(adapter)
        } else {
            self.play(adapter)
        }
    }

    /// Seek relative to the last known real time.
    pub fn seek_by(&mut self, adapter: Option<&mut PlaybackAdapter>, delta_millis: i64) -> bool {
        let base = self.last_known.unwrap_or(self.current);
        self.seek_to(adapter, base.offset_by(delta_millis))
    }

    /// Skip forward by one seek step.
    pub fn skip_forward(&mut self, adapter: Option<&mut PlaybackAdapter>) -> bool {
        let step = i64::try_from(self.config.seek_step.as_millis()).unwrap_or(i64::MAX);
        self.seek_by(adapter, step)
    }

    /// Skip back by one seek step.
    pub fn skip_back(&mut self, adapter: Option<&mut PlaybackAdapter>) -> bool {
        let step = i64::try_from(self.config.seek_step.as_millis()).unwrap_or(i64::MAX);
        self.seek_by(adapter, -step)
    }

    /// Seek to an absolute position, clamped to the recording.
    ///
    /// The clamped target becomes the last known real time before the
    /// engine is asked to play from it, so the next poll cannot show a
    /// stale report.
    pub fn seek_to(&mut self, adapter: Option<&mut PlaybackAdapter>, target: Timestamp) -> bool {
        let Some(adapter) = adapter else {
            return false;
        };

        let target = target.min(self.total);
        self.last_known = Some(target);
        self.current = target;

        match adapter.play(Some(target)) {
            Ok(_) => {
                self.playing = true;
                true
            }
            Err(err) => {
                tracing::debug!("Seek to {} not dispatched: {}", target, err);
                false
            }
        }
    }

    /// Seek to a fraction of the total, as a slider drag does.
    pub fn seek_fraction(&mut self, adapter: Option<&mut PlaybackAdapter>, fraction: f64) -> bool {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let target = (self.total.as_millis() as f64 * fraction).round();
        self.seek_to(adapter, Timestamp::from_millis_f64(target))
    }

    /// Play again from the beginning.
    pub fn restart(&mut self, adapter: Option<&mut PlaybackAdapter>) -> bool {
        self.seek_to(adapter, Timestamp::zero())
    }

    /// Change the speed multiplier; local state follows only a successful dispatch.
    pub fn set_speed(&mut self, adapter: Option<&mut PlaybackAdapter>, speed: f64) -> bool {
        let Some(adapter) = adapter else {
            return false;
        };
        if !(speed.is_finite() && speed > 0.0) {
            tracing::warn!("Ignoring invalid playback speed {}", speed);
            return false;
        }

        match adapter.set_speed(speed) {
            Ok(_) => {
                self.speed = speed;
                true
            }
            Err(err) => {
                tracing::debug!("Speed change ignored: {}", err);
                false
            }
        }
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new(ClockConfig::default())
    }
}
