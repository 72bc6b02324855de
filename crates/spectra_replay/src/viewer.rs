//! Replay viewer state.
//!
//! [`ReplayViewer`] ties the pieces together for one viewing surface: it
//! owns the committed session, the single live engine adapter, the playback
//! clock and the timeline view.
//!
//! Loads are split into [`begin_load`](ReplayViewer::begin_load) and
//! [`commit_load`](ReplayViewer::commit_load) so that the fetch can run
//! elsewhere. Every `begin_load` issues a new [`LoadTicket`]; a result
//! arriving with an older ticket is dropped without touching state.

use crate::adapter::PlaybackAdapter;
use crate::decode::{DecodedSession, EventDecoder};
use crate::engine::{EngineFactory, EngineOptions};
use crate::error::SessionLoadError;
use crate::event::{Metadata, NormalizedEvent, SessionPayload};
use crate::replay::{ClockConfig, ClockMode, PlaybackClock};
use crate::session::SessionLoader;
use crate::time::Timestamp;
use crate::timeline::{self, TimelineEntry, TimelineFilter, TimelineView};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Viewer configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewerConfig {
    pub clock: ClockConfig,
    pub engine: EngineOptions,
}

/// Identifies one load attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    session_id: String,
}

impl LoadTicket {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// User-facing status flags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewerStatus {
    pub loading: bool,
    /// Set when the last load failed.
    pub load_error: Option<String>,
    /// Set when the engine could not be built; the timeline stays usable.
    pub engine_error: Option<String>,
}

/// Commands accepted by [`ReplayViewer::run`].
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerCommand {
    Load(String),
    Play,
    Pause,
    Toggle,
    SkipForward,
    SkipBack,
    SeekTo(Timestamp),
    SeekFraction(f64),
    Restart,
    SetSpeed(f64),
    ToggleFullscreen,
    SetFilter(TimelineFilter),
    SetSearch(String),
    /// Jump to the entry at this index of the current timeline.
    Select(usize),
    Close,
}

/// What the transport and status displays show.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewerSnapshot {
    /// The committed session.
    pub session_id: Option<String>,
    /// The session most recently asked for, committed or not.
    pub requested: Option<String>,
    pub status: ViewerStatus,
    pub engine_ready: bool,
    pub event_count: usize,
    pub current: Timestamp,
    pub total: Timestamp,
    pub playing: bool,
    pub speed: f64,
    pub mode: Option<ClockMode>,
}

type LoadResult = (LoadTicket, Result<SessionPayload, SessionLoadError>);

/// One replay viewing surface.
pub struct ReplayViewer<F: EngineFactory> {
    factory: F,
    options: EngineOptions,
    decoder: EventDecoder,
    /// Session id of the committed session.
    session_id: Option<String>,
    /// Session id of the latest load, committed or not.
    requested: Option<String>,
    session: Option<DecodedSession>,
    adapter: Option<PlaybackAdapter>,
    clock: PlaybackClock,
    timeline: TimelineView,
    status: ViewerStatus,
    generation: u64,
}

impl<F: EngineFactory> ReplayViewer<F> {
    pub fn new(factory: F, config: ViewerConfig) -> Self {
        Self {
            factory,
            options: config.engine,
            decoder: EventDecoder::new(),
            session_id: None,
            requested: None,
            session: None,
            adapter: None,
            clock: PlaybackClock::new(config.clock),
            timeline: TimelineView::new(),
            status: ViewerStatus::default(),
            generation: 0,
        }
    }

    pub fn with_decoder(mut self, decoder: EventDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    /// Id of the committed session.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Id of the latest requested session, which may not have loaded.
    pub fn requested_session_id(&self) -> Option<&str> {
        self.requested.as_deref()
    }

    pub fn session(&self) -> Option<&DecodedSession> {
        self.session.as_ref()
    }

    pub fn events(&self) -> &[NormalizedEvent] {
        match &self.session {
            Some(session) => &session.events,
            None => &[],
        }
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.session.as_ref().map(|s| &s.metadata)
    }

    pub fn adapter(&self) -> Option<&PlaybackAdapter> {
        self.adapter.as_ref()
    }

    pub fn is_engine_ready(&self) -> bool {
        self.adapter.is_some()
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        ViewerSnapshot {
            session_id: self.session_id.clone(),
            requested: self.requested.clone(),
            status: self.status.clone(),
            engine_ready: self.adapter.is_some(),
            event_count: self.events().len(),
            current: self.clock.current_time(),
            total: self.clock.total_time(),
            playing: self.clock.is_playing(),
            speed: self.clock.speed(),
            mode: self.adapter.is_some().then(|| self.clock.mode()),
        }
    }

    /// Start loading `session_id`. Results for earlier tickets become stale.
    pub fn begin_load(&mut self, session_id: impl Into<String>) -> LoadTicket {
        self.generation += 1;
        let session_id = session_id.into();
        self.requested = Some(session_id.clone());
        self.status.loading = true;
        self.status.load_error = None;
        tracing::debug!("Load #{} started for session {}", self.generation, session_id);

        LoadTicket {
            generation: self.generation,
            session_id,
        }
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Apply the outcome of a load. Returns whether a session was committed.
    pub fn commit_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<SessionPayload, SessionLoadError>,
    ) -> bool {
        if !self.is_current(&ticket) {
            tracing::debug!(
                "Dropping stale load #{} for session {}",
                ticket.generation,
                ticket.session_id
            );
            return false;
        }
        self.status.loading = false;

        match result {
            Ok(payload) => {
                let decoded = self.decoder.decode_payload(payload);
                tracing::info!(
                    "Session {} committed: {} events, {} placeholders",
                    ticket.session_id,
                    decoded.events.len(),
                    decoded.report.placeholders
                );
                self.session_id = Some(ticket.session_id);
                self.install(decoded);
                true
            }
            Err(err) => {
                tracing::warn!("Session {} could not be loaded: {}", ticket.session_id, err);
                self.status.load_error = Some(err.user_message().to_string());
                false
            }
        }
    }

    /// Fetch and commit `session_id` in one step.
    pub async fn load(&mut self, loader: &SessionLoader, session_id: &str) -> bool {
        let ticket = self.begin_load(session_id);
        let result = loader.fetch(session_id).await;
        self.commit_load(ticket, result)
    }

    /// Commit an already decoded session, bypassing the loader.
    pub fn install(&mut self, session: DecodedSession) {
        self.session = Some(session);
        self.timeline.invalidate();
        self.rebuild_engine();
    }

    /// Replace the committed event set, rebuilding the engine over it.
    pub fn replace_events(&mut self, events: Vec<NormalizedEvent>) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("No committed session; ignoring new event set");
            return;
        };
        session.events = events;
        self.rebuild_engine();
    }

    /// Dispose the live engine, then build one over the committed events.
    fn rebuild_engine(&mut self) {
        if let Some(previous) = self.adapter.take() {
            previous.dispose();
        }
        self.status.engine_error = None;

        let Some(session) = self.session.as_ref() else {
            self.clock.reset(Timestamp::zero());
            return;
        };
        self.clock.reset(session.metadata.total_time_or_zero());

        if session.events.is_empty() {
            tracing::info!("Session has no events; playback unavailable");
            return;
        }

        let built = self
            .factory
            .construct(&session.events, &self.options)
            .and_then(|handle| PlaybackAdapter::attach(handle, session.metadata.clone()));

        match built {
            Ok(adapter) => {
                tracing::info!("Replay engine ready over {} events", session.events.len());
                self.adapter = Some(adapter);
            }
            Err(err) => {
                tracing::warn!("Replay engine unavailable: {}", err);
                self.status.engine_error = Some(err.user_message().to_string());
            }
        }
    }

    /// One poll of the playback clock.
    pub fn tick(&mut self) -> ClockMode {
        self.clock.poll(self.adapter.as_mut())
    }

    pub fn play(&mut self) -> bool {
        self.clock.play(self.adapter.as_mut())
    }

    pub fn pause(&mut self) -> bool {
        self.clock.pause(self.adapter.as_mut())
    }

    pub fn toggle(&mut self) -> bool {
        self.clock.toggle(self.adapter.as_mut())
    }

    pub fn skip_forward(&mut self) -> bool {
        self.clock.skip_forward(self.adapter.as_mut())
    }

    pub fn skip_back(&mut self) -> bool {
        self.clock.skip_back(self.adapter.as_mut())
    }

    pub fn seek_to(&mut self, target: Timestamp) -> bool {
        self.clock.seek_to(self.adapter.as_mut(), target)
    }

    pub fn seek_fraction(&mut self, fraction: f64) -> bool {
        self.clock.seek_fraction(self.adapter.as_mut(), fraction)
    }

    pub fn restart(&mut self) -> bool {
        self.clock.restart(self.adapter.as_mut())
    }

    pub fn set_speed(&mut self, speed: f64) -> bool {
        self.clock.set_speed(self.adapter.as_mut(), speed)
    }

    pub fn toggle_fullscreen(&mut self) -> bool {
        let Some(adapter) = self.adapter.as_mut() else {
            return false;
        };
        match adapter.toggle_fullscreen() {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!("Fullscreen toggle ignored: {}", err);
                false
            }
        }
    }

    pub fn timeline_filter(&self) -> &TimelineFilter {
        self.timeline.filter()
    }

    pub fn set_filter(&mut self, filter: TimelineFilter) {
        self.timeline.set_filter(filter);
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.timeline.set_search(search);
    }

    /// Timeline entries for the committed session under the active filter
    /// and search.
    pub fn timeline_entries(&mut self) -> &[TimelineEntry] {
        match self.session.as_ref() {
            Some(session) => self.timeline.entries(&session.metadata),
            None => &[],
        }
    }

    /// Jump to the timeline entry at `index`.
    pub fn select_entry(&mut self, index: usize) -> bool {
        let Some(entry) = self.timeline_entries().get(index).cloned() else {
            tracing::debug!("No timeline entry at index {}", index);
            return false;
        };
        timeline::select(&entry, &mut self.clock, self.adapter.as_mut())
    }

    /// Dispose the engine and invalidate any in-flight load.
    pub fn close(&mut self) {
        self.generation += 1;
        self.status.loading = false;
        if let Some(adapter) = self.adapter.take() {
            adapter.dispose();
        }
        self.clock.reset(Timestamp::zero());
        tracing::debug!("Viewer closed");
    }

    /// Drive the viewer until [`ViewerCommand::Close`] arrives or `commands`
    /// closes.
    ///
    /// Polls the clock on its fixed interval and applies commands between
    /// polls. Fetches run on spawned tasks and re-enter through the ticket
    /// guard. After every step the current [`ViewerSnapshot`] is published
    /// on `updates` if it changed.
    pub async fn run(
        &mut self,
        loader: SessionLoader,
        mut commands: mpsc::Receiver<ViewerCommand>,
        updates: watch::Sender<ViewerSnapshot>,
    ) {
        let (loaded_tx, mut loaded) = mpsc::channel::<LoadResult>(4);
        let period = self.clock.config().poll_interval.max(Duration::from_millis(1));
        let mut poll = tokio::time::interval(period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.tick();
                }
                Some((ticket, result)) = loaded.recv() => {
                    self.commit_load(ticket, result);
                }
                command = commands.recv() => match command {
                    None | Some(ViewerCommand::Close) => break,
                    Some(ViewerCommand::Load(session_id)) => {
                        let ticket = self.begin_load(session_id);
                        let loader = loader.clone();
                        let loaded_tx = loaded_tx.clone();
                        tokio::spawn(async move {
                            let result = loader.fetch(ticket.session_id()).await;
                            // The viewer may already be gone.
                            let _ = loaded_tx.send((ticket, result)).await;
                        });
                    }
                    Some(command) => self.apply(command),
                }
            }

            let snapshot = self.snapshot();
            updates.send_if_modified(|current| {
                if *current == snapshot {
                    return false;
                }
                *current = snapshot;
                true
            });
        }

        self.close();
        updates.send_replace(self.snapshot());
    }

    fn apply(&mut self, command: ViewerCommand) {
        match command {
            ViewerCommand::Play => {
                self.play();
            }
            ViewerCommand::Pause => {
                self.pause();
            }
            ViewerCommand::Toggle => {
                self.toggle();
            }
            ViewerCommand::SkipForward => {
                self.skip_forward();
            }
            ViewerCommand::SkipBack => {
                self.skip_back();
            }
            ViewerCommand::SeekTo(target) => {
                self.seek_to(target);
            }
            ViewerCommand::SeekFraction(fraction) => {
                self.seek_fraction(fraction);
            }
            ViewerCommand::Restart => {
                self.restart();
            }
            ViewerCommand::SetSpeed(speed) => {
                self.set_speed(speed);
            }
            ViewerCommand::ToggleFullscreen => {
                self.toggle_fullscreen();
            }
            ViewerCommand::SetFilter(filter) => self.set_filter(filter),
            ViewerCommand::SetSearch(search) => self.set_search(search),
            ViewerCommand::Select(index) => {
                self.select_entry(index);
            }
            other @ (ViewerCommand::Load(_) | ViewerCommand::Close) => {
                tracing::debug!("{:?} is handled by the run loop", other);
            }
        }
    }
}
