//! The replay engine construction boundary.
//!
//! Constructing an engine is the one step whose result this crate does not
//! control: the factory gets the full decoded event array and hands back an
//! opaque [`EngineObject`], which the viewer wraps in a
//! [`PlaybackAdapter`](crate::adapter::PlaybackAdapter).

use crate::adapter::EngineObject;
use crate::error::EngineInitError;
use crate::event::NormalizedEvent;

/// Options passed to the engine constructor.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineOptions {
    /// Start playing as soon as the engine is built.
    pub auto_play: bool,
    /// Let the engine draw its own transport controls.
    pub show_controller: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            auto_play: false,
            show_controller: true,
        }
    }
}

/// Builds engine instances from decoded events.
pub trait EngineFactory {
    fn construct(
        &mut self,
        events: &[NormalizedEvent],
        options: &EngineOptions,
    ) -> Result<Box<dyn EngineObject>, EngineInitError>;
}

impl<F> EngineFactory for F
where
    F: FnMut(&[NormalizedEvent], &EngineOptions) -> Result<Box<dyn EngineObject>, EngineInitError>,
{
    fn construct(
        &mut self,
        events: &[NormalizedEvent],
        options: &EngineOptions,
    ) -> Result<Box<dyn EngineObject>, EngineInitError> {
        self(events, options)
    }
}
