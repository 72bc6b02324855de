//! The opaque engine handle.
//!
//! Replay engines are embedded in different ways: some put their controls on
//! the object the constructor returns, some nest them under a field, some
//! only reveal them on one of the object's values. [`EngineObject`] is the
//! smallest surface that lets the adapter probe all of these.

use crate::error::CallError;
use serde_json::Value;

/// Control and lifecycle method names, as engines spell them.
pub mod methods {
    pub const PLAY: &str = "play";
    pub const PAUSE: &str = "pause";
    pub const SET_SPEED: &str = "setSpeed";
    pub const GET_CURRENT_TIME: &str = "getCurrentTime";
    pub const GET_META_DATA: &str = "getMetaData";
    pub const TOGGLE_FULLSCREEN: &str = "toggleFullscreen";
    pub const DESTROY: &str = "destroy";
    pub const TEARDOWN: &str = "$destroy";

    /// The six controls the adapter exposes.
    pub const CONTROLS: [&str; 6] = [
        PLAY,
        PAUSE,
        SET_SPEED,
        GET_CURRENT_TIME,
        GET_META_DATA,
        TOGGLE_FULLSCREEN,
    ];
}

/// A dynamically shaped object returned by an engine constructor.
///
/// Calls take `&self`; engines that mutate on `play`/`pause` keep their
/// state behind interior mutability, as a script object would.
pub trait EngineObject {
    /// Whether `method` is callable on this object.
    fn exposes(&self, method: &str) -> bool;

    /// Call `method` with JSON arguments.
    ///
    /// Returns [`CallError::Missing`] when the method is not exposed.
    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, CallError>;

    /// The nested object stored under `name`.
    fn property(&self, _name: &str) -> Option<&dyn EngineObject> {
        None
    }

    /// The object's own enumerable values, in declaration order.
    fn values(&self) -> Vec<&dyn EngineObject> {
        Vec::new()
    }
}
