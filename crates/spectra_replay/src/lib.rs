//! Spectra Replay Core
//!
//! Replays recorded user sessions: a stream of timestamped UI events is
//! fetched, decoded, handed to a replay engine and presented next to a
//! searchable event timeline with transport controls.
//!
//! - **Decoding**: [`EventDecoder`] accepts native objects, JSON text and
//!   compressed or base64-compressed text, and never drops an element
//! - **Engine control**: [`PlaybackAdapter`] gives an opaque engine handle a
//!   fixed control surface by probing ranked candidate locations
//! - **Timeline**: [`timeline::aggregate`] merges custom events and errors
//!   into one ordered, filterable list
//! - **Clock**: [`PlaybackClock`] keeps a usable current time even when the
//!   engine stops reporting one
//!
//! [`ReplayViewer`] owns all of the above for one viewing surface.
//!
//! # Example
//!
//! ```rust
//! use spectra_replay::decode::EventDecoder;
//! use spectra_replay::event::SessionPayload;
//! use spectra_replay::timeline::{aggregate, TimelineFilter};
//!
//! let payload = SessionPayload::from_slice(br#"{
//!     "events": ["{\"timestamp\":500,\"type\":\"click\"}"],
//!     "metadata": {
//!         "customEvents": [
//!             { "eventType": "network", "data": { "method": "GET", "url": "/a" }, "timestamp": 10 }
//!         ]
//!     }
//! }"#).unwrap();
//!
//! let session = EventDecoder::new().decode_payload(payload);
//! assert_eq!(session.events[0].timestamp.as_millis(), 500);
//!
//! let entries = aggregate(&session.metadata, &TimelineFilter::All, "");
//! assert_eq!(entries[0].summary(), "GET /a");
//! ```

pub mod adapter;
pub mod decode;
pub mod engine;
pub mod error;
pub mod event;
pub mod headless;
pub mod replay;
pub mod session;
pub mod testing;
pub mod time;
pub mod timeline;
pub mod viewer;

pub use adapter::{EngineObject, PlaybackAdapter, Resolution};
pub use decode::{DecodeReport, DecodeTier, DecodedSession, EventDecoder};
pub use engine::{EngineFactory, EngineOptions};
pub use error::{AdapterError, CallError, EngineInitError, SessionLoadError};
pub use event::{
    CustomEvent, ErrorRecord, EventContext, EventKind, Metadata, NormalizedEvent, RawEvent,
    SessionPayload,
};
pub use headless::{HeadlessEngineFactory, HeadlessMonitor};
pub use replay::{ClockConfig, ClockMode, PlaybackClock};
pub use session::{LoaderConfig, SessionLoader};
pub use time::Timestamp;
pub use timeline::{TimelineEntry, TimelineFilter, TimelineView};
pub use viewer::{
    LoadTicket, ReplayViewer, ViewerCommand, ViewerConfig, ViewerSnapshot, ViewerStatus,
};
