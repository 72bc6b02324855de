//! Headless replay engine.
//!
//! An in-process engine that replays normalized events against a virtual
//! clock without rendering anything. It is shaped like the embeddings the
//! adapter has to cope with: lifecycle hooks on the handle itself, playback
//! controls nested under `replayer`.
//!
//! The engine can also be built "silent", reporting a current time of `0`
//! while it plays, the way some real embeddings do.

use crate::adapter::{methods, EngineObject};
use crate::decode::{derive_start_time, derive_total_time};
use crate::engine::{EngineFactory, EngineOptions};
use crate::error::{CallError, EngineInitError};
use crate::event::NormalizedEvent;
use crate::time::Timestamp;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Instant;

/// Field the playback controls live under.
pub const REPLAYER_FIELD: &str = "replayer";

/// Lifecycle state of a headless engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// Built, never played.
    Idle,
    Playing,
    Paused,
    /// Reached the end of the recording.
    Finished,
    /// Torn down; every further call fails.
    Destroyed,
}

/// Virtual transport, advanced from elapsed time on every access.
#[derive(Debug)]
struct Transport {
    state: EngineState,
    /// Offset from the first event.
    position: Timestamp,
    duration: Timestamp,
    speed: f64,
    last_update: Option<Instant>,
    fullscreen: bool,
}

impl Transport {
    fn new(duration: Timestamp) -> Self {
        Self {
            state: EngineState::Idle,
            position: Timestamp::zero(),
            duration,
            speed: 1.0,
            last_update: None,
            fullscreen: false,
        }
    }

    fn advance(&mut self) {
        if self.state != EngineState::Playing {
            return;
        }

        let now = Instant::now();
        let Some(last) = self.last_update.replace(now) else {
            return;
        };
        let elapsed = now.saturating_duration_since(last);
        let millis = (elapsed.as_secs_f64() * 1000.0 * self.speed) as u64;
        self.position = Timestamp::from_millis(self.position.as_millis().saturating_add(millis))
            .min(self.duration);

        if self.position >= self.duration {
            self.state = EngineState::Finished;
            self.last_update = None;
        }
    }

    fn play(&mut self, from: Option<Timestamp>) {
        self.advance();
        match from {
            Some(position) => self.position = position.min(self.duration),
            None if self.state == EngineState::Finished => self.position = Timestamp::zero(),
            None => {}
        }
        self.state = EngineState::Playing;
        self.last_update = Some(Instant::now());
        self.advance();
    }

    fn pause(&mut self) {
        self.advance();
        if self.state == EngineState::Playing {
            self.state = EngineState::Paused;
            self.last_update = None;
        }
    }

    fn set_speed(&mut self, speed: f64) {
        self.advance();
        self.speed = speed;
    }
}

#[derive(Debug)]
struct Shared {
    transport: Mutex<Transport>,
    events: Vec<NormalizedEvent>,
    start_time: Timestamp,
    reports_time: bool,
}

impl Shared {
    fn live(&self) -> Result<parking_lot::MutexGuard<'_, Transport>, CallError> {
        let transport = self.transport.lock();
        if transport.state == EngineState::Destroyed {
            return Err(CallError::Threw("engine destroyed".to_string()));
        }
        Ok(transport)
    }
}

/// The handle returned by [`HeadlessEngineFactory`].
pub struct HeadlessHandle {
    shared: Arc<Shared>,
    replayer: ReplayerSurface,
}

impl HeadlessHandle {
    fn new(events: Vec<NormalizedEvent>, reports_time: bool) -> Self {
        let start_time = derive_start_time(&events).unwrap_or_default();
        let duration = derive_total_time(&events);

        let shared = Arc::new(Shared {
            transport: Mutex::new(Transport::new(duration)),
            events,
            start_time,
            reports_time,
        });
        Self {
            replayer: ReplayerSurface {
                shared: shared.clone(),
            },
            shared,
        }
    }

    pub fn monitor(&self) -> HeadlessMonitor {
        HeadlessMonitor {
            shared: self.shared.clone(),
        }
    }
}

impl EngineObject for HeadlessHandle {
    fn exposes(&self, method: &str) -> bool {
        matches!(method, methods::DESTROY | methods::TOGGLE_FULLSCREEN)
    }

    fn invoke(&self, method: &str, _args: &[Value]) -> Result<Value, CallError> {
        match method {
            methods::DESTROY => {
                let mut transport = self.shared.transport.lock();
                if transport.state != EngineState::Destroyed {
                    tracing::debug!("Headless engine destroyed at {}", transport.position);
                    transport.state = EngineState::Destroyed;
                    transport.last_update = None;
                }
                Ok(Value::Null)
            }
            methods::TOGGLE_FULLSCREEN => {
                let mut transport = self.shared.live()?;
                transport.fullscreen = !transport.fullscreen;
                Ok(Value::Bool(transport.fullscreen))
            }
            _ => Err(CallError::Missing),
        }
    }

    fn property(&self, name: &str) -> Option<&dyn EngineObject> {
        (name == REPLAYER_FIELD).then_some(&self.replayer as &dyn EngineObject)
    }

    fn values(&self) -> Vec<&dyn EngineObject> {
        vec![&self.replayer as &dyn EngineObject]
    }
}

/// The nested playback surface.
struct ReplayerSurface {
    shared: Arc<Shared>,
}

const REPLAYER_METHODS: [&str; 5] = [
    methods::PLAY,
    methods::PAUSE,
    methods::SET_SPEED,
    methods::GET_CURRENT_TIME,
    methods::GET_META_DATA,
];

impl EngineObject for ReplayerSurface {
    fn exposes(&self, method: &str) -> bool {
        REPLAYER_METHODS.contains(&method)
    }

    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, CallError> {
        if !self.exposes(method) {
            return Err(CallError::Missing);
        }
        let mut transport = self.shared.live()?;

        match method {
            methods::PLAY => {
                let from = match args.first() {
                    None | Some(Value::Null) => None,
                    Some(value) => Some(
                        value
                            .as_f64()
                            .map(Timestamp::from_millis_f64)
                            .ok_or_else(|| CallError::Incompatible(value.to_string()))?,
                    ),
                };
                transport.play(from);
                Ok(Value::Null)
            }
            methods::PAUSE => {
                transport.pause();
                Ok(Value::Null)
            }
            methods::SET_SPEED => {
                let speed = args
                    .first()
                    .and_then(Value::as_f64)
                    .filter(|s| s.is_finite() && *s > 0.0)
                    .ok_or_else(|| CallError::Threw("speed must be a positive number".to_string()))?;
                transport.set_speed(speed);
                Ok(Value::Null)
            }
            methods::GET_CURRENT_TIME => {
                transport.advance();
                if self.shared.reports_time {
                    Ok(json!(transport.position.as_millis()))
                } else {
                    Ok(json!(0))
                }
            }
            methods::GET_META_DATA => {
                let start = self.shared.start_time;
                Ok(json!({
                    "startTime": start.as_millis(),
                    "endTime": start.as_millis().saturating_add(transport.duration.as_millis()),
                    "totalTime": transport.duration.as_millis(),
                }))
            }
            _ => Err(CallError::Missing),
        }
    }
}

/// Point-in-time view of a headless engine.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSnapshot {
    pub state: EngineState,
    pub position: Timestamp,
    pub duration: Timestamp,
    pub speed: f64,
    pub fullscreen: bool,
    /// Events at or before the current position.
    pub replayed: usize,
}

/// Observes an engine from outside the adapter.
#[derive(Clone)]
pub struct HeadlessMonitor {
    shared: Arc<Shared>,
}

impl HeadlessMonitor {
    pub fn snapshot(&self) -> EngineSnapshot {
        let mut transport = self.shared.transport.lock();
        transport.advance();

        let start = self.shared.start_time;
        let replayed = self
            .shared
            .events
            .iter()
            .filter(|e| e.timestamp.saturating_sub(start) <= transport.position)
            .count();

        EngineSnapshot {
            state: transport.state,
            position: transport.position,
            duration: transport.duration,
            speed: transport.speed,
            fullscreen: transport.fullscreen,
            replayed,
        }
    }

    pub fn total_events(&self) -> usize {
        self.shared.events.len()
    }
}

/// Builds [`HeadlessHandle`]s.
#[derive(Clone, Default)]
pub struct HeadlessEngineFactory {
    silent: bool,
    built: usize,
    last: Option<HeadlessMonitor>,
}

impl HeadlessEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engines whose `getCurrentTime` always answers `0`.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    /// Monitor for the most recently built engine.
    pub fn monitor(&self) -> Option<HeadlessMonitor> {
        self.last.clone()
    }

    /// How many engines this factory has built.
    pub fn built(&self) -> usize {
        self.built
    }
}

impl EngineFactory for HeadlessEngineFactory {
    fn construct(
        &mut self,
        events: &[NormalizedEvent],
        options: &EngineOptions,
    ) -> Result<Box<dyn EngineObject>, EngineInitError> {
        if events.is_empty() {
            return Err(EngineInitError::Construction(
                "no events to replay".to_string(),
            ));
        }

        let handle = HeadlessHandle::new(events.to_vec(), !self.silent);
        if options.auto_play {
            handle.shared.transport.lock().play(None);
        }

        self.built += 1;
        self.last = Some(handle.monitor());
        tracing::debug!(
            "Headless engine #{} built over {} events",
            self.built,
            events.len()
        );
        Ok(Box::new(handle))
    }
}
