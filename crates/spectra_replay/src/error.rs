//! Replay error types

use crate::adapter::Resolution;
use thiserror::Error;

/// A single attempt to call a method on one candidate location of the engine handle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    /// The candidate does not expose the method
    #[error("method not exposed")]
    Missing,

    /// The method exists but raised
    #[error("method raised: {0}")]
    Threw(String),

    /// The method answered with a value of the wrong shape
    #[error("incompatible return value: {0}")]
    Incompatible(String),
}

/// Every candidate path for a control call failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("`{method}` unavailable after {} attempt(s)", attempts.len())]
    Unavailable {
        method: &'static str,
        attempts: Vec<(Resolution, CallError)>,
    },
}

/// Fetching or parsing the outer session payload failed
#[derive(Error, Debug)]
pub enum SessionLoadError {
    /// The replay URL could not be built
    #[error("invalid replay url: {0}")]
    InvalidUrl(String),

    /// Transport-level failure
    #[error("session request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("session request returned status {0}")]
    Status(u16),

    /// The body was not JSON
    #[error("session payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl SessionLoadError {
    /// Message shown to the user; details stay in the logs.
    pub fn user_message(&self) -> &'static str {
        "session could not be loaded"
    }
}

/// Constructing the engine or discovering its control surface failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineInitError {
    /// The engine constructor raised
    #[error("engine construction failed: {0}")]
    Construction(String),

    /// The constructed handle exposes none of the control methods
    #[error("engine handle exposes no playback controls")]
    NoControlSurface,
}

impl EngineInitError {
    /// Message shown to the user; the timeline stays usable.
    pub fn user_message(&self) -> &'static str {
        "player could not be initialized"
    }
}
