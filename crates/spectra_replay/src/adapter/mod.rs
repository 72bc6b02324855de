//! Playback control adapter.
//!
//! [`PlaybackAdapter`] owns the handle returned by an engine constructor and
//! presents a fixed control surface over it. Each call is resolved against a
//! ranked list of candidate locations:
//!
//! 1. [`Resolution::TopLevel`] - the method on the handle itself.
//! 2. [`Resolution::Nested`] - the method on each field in
//!    [`NESTED_CANDIDATES`], in order.
//! 3. [`Resolution::Scan`] - getters only: the first of the handle's own
//!    values that exposes the method.
//!
//! A candidate that is missing, raises, or answers with the wrong shape
//! moves resolution on to the next one. When every candidate fails the call
//! returns [`AdapterError::Unavailable`]; getters fall back to a safe
//! default instead.

mod handle;

pub use handle::{methods, EngineObject};

use crate::error::{AdapterError, CallError, EngineInitError};
use crate::event::Metadata;
use crate::time::Timestamp;
use serde_json::Value;
use std::fmt;

/// Field names engines are known to nest their controls under, ranked.
pub const NESTED_CANDIDATES: [&str; 2] = ["replayer", "player"];

/// Where a control call was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    TopLevel,
    Nested(&'static str),
    Scan,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::TopLevel => f.write_str("top-level"),
            Resolution::Nested(name) => write!(f, "nested `{name}`"),
            Resolution::Scan => f.write_str("value scan"),
        }
    }
}

/// The single owner of one engine handle.
///
/// Dropping the adapter disposes the handle.
pub struct PlaybackAdapter {
    handle: Option<Box<dyn EngineObject>>,
    metadata: Metadata,
}

impl fmt::Debug for PlaybackAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackAdapter")
            .field("attached", &self.handle.is_some())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl PlaybackAdapter {
    /// Take ownership of a freshly constructed handle.
    ///
    /// Fails when none of the six controls can be located on any candidate
    /// path. `metadata` seeds the value returned by [`metadata`](Self::metadata)
    /// until the engine reports its own.
    pub fn attach(
        handle: Box<dyn EngineObject>,
        metadata: Metadata,
    ) -> Result<Self, EngineInitError> {
        let adapter = Self {
            handle: Some(handle),
            metadata,
        };

        let located: Vec<_> = methods::CONTROLS
            .iter()
            .filter_map(|method| adapter.locate(method).map(|via| (*method, via)))
            .collect();

        if located.is_empty() {
            // Dropping `adapter` tears the rejected handle down.
            return Err(EngineInitError::NoControlSurface);
        }

        for (method, via) in &located {
            tracing::debug!("Engine control `{}` located at {}", method, via);
        }
        Ok(adapter)
    }

    /// Where `method` would be resolved, judged by exposure alone.
    pub fn locate(&self, method: &str) -> Option<Resolution> {
        let handle = self.handle.as_deref()?;
        if handle.exposes(method) {
            return Some(Resolution::TopLevel);
        }
        for name in NESTED_CANDIDATES {
            if handle.property(name).is_some_and(|n| n.exposes(method)) {
                return Some(Resolution::Nested(name));
            }
        }
        handle
            .values()
            .into_iter()
            .any(|v| v.exposes(method))
            .then_some(Resolution::Scan)
    }

    /// Start or resume playback, optionally from `at`.
    pub fn play(&mut self, at: Option<Timestamp>) -> Result<Resolution, AdapterError> {
        let args: Vec<Value> = at.map(|t| Value::from(t.as_millis())).into_iter().collect();
        self.dispatch(methods::PLAY, &args, false, ignore_result)
            .map(|(_, via)| via)
    }

    /// Pause playback.
    pub fn pause(&mut self) -> Result<Resolution, AdapterError> {
        self.dispatch(methods::PAUSE, &[], false, ignore_result)
            .map(|(_, via)| via)
    }

    /// Set the playback speed multiplier.
    pub fn set_speed(&mut self, multiplier: f64) -> Result<Resolution, AdapterError> {
        self.dispatch(methods::SET_SPEED, &[Value::from(multiplier)], false, ignore_result)
            .map(|(_, via)| via)
    }

    /// Toggle fullscreen presentation.
    pub fn toggle_fullscreen(&mut self) -> Result<Resolution, AdapterError> {
        self.dispatch(methods::TOGGLE_FULLSCREEN, &[], false, ignore_result)
            .map(|(_, via)| via)
    }

    /// The engine's reported position, or `0` when it cannot be read.
    pub fn current_time(&mut self) -> Timestamp {
        match self.try_current_time() {
            Ok(time) => time,
            Err(err) => {
                tracing::trace!("{}", err);
                Timestamp::zero()
            }
        }
    }

    /// The engine's reported position, or why it could not be read.
    pub fn try_current_time(&mut self) -> Result<Timestamp, AdapterError> {
        self.dispatch(methods::GET_CURRENT_TIME, &[], true, |value| {
            value
                .as_f64()
                .map(Timestamp::from_millis_f64)
                .ok_or_else(|| CallError::Incompatible(value.to_string()))
        })
        .map(|(time, _)| time)
    }

    /// The latest metadata: refreshed from the engine when it answers,
    /// otherwise the last known value.
    pub fn metadata(&mut self) -> &Metadata {
        let reported = self.dispatch(methods::GET_META_DATA, &[], true, |value| {
            if !value.is_object() {
                return Err(CallError::Incompatible(value.to_string()));
            }
            serde_json::from_value::<Metadata>(value)
                .map_err(|err| CallError::Incompatible(err.to_string()))
        });

        match reported {
            Ok((reported, _)) => self.metadata.absorb(reported),
            Err(err) => tracing::trace!("{}", err),
        }
        &self.metadata
    }

    /// The last known metadata, without asking the engine.
    pub fn cached_metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Check if the engine has not been disposed.
    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    /// Tear down the engine instance now.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match handle.invoke(methods::DESTROY, &[]) {
            Ok(_) => tracing::debug!("Engine disposed via `{}`", methods::DESTROY),
            Err(CallError::Missing) => match handle.invoke(methods::TEARDOWN, &[]) {
                Ok(_) => tracing::debug!("Engine disposed via `{}`", methods::TEARDOWN),
                Err(CallError::Missing) => {
                    tracing::debug!("Engine exposes no teardown hook; dropping handle")
                }
                Err(err) => tracing::warn!("Engine teardown failed: {}", err),
            },
            Err(err) => tracing::warn!("Engine destroy failed: {}", err),
        }
    }

    /// Resolve and call `method` through the ranked candidates.
    ///
    /// `accept` validates the returned value; a rejection counts as a failed
    /// attempt and resolution continues.
    fn dispatch<T>(
        &self,
        method: &'static str,
        args: &[Value],
        scan: bool,
        accept: impl Fn(Value) -> Result<T, CallError>,
    ) -> Result<(T, Resolution), AdapterError> {
        let mut attempts = Vec::new();

        let Some(handle) = self.handle.as_deref() else {
            return Err(AdapterError::Unavailable { method, attempts });
        };

        match attempt(handle, method, args, &accept) {
            Ok(value) => return Ok((value, Resolution::TopLevel)),
            Err(err) => attempts.push((Resolution::TopLevel, err)),
        }

        for name in NESTED_CANDIDATES {
            let via = Resolution::Nested(name);
            let Some(nested) = handle.property(name) else {
                attempts.push((via, CallError::Missing));
                continue;
            };
            match attempt(nested, method, args, &accept) {
                Ok(value) => return Ok((value, via)),
                Err(err) => attempts.push((via, err)),
            }
        }

        if scan {
            let found = handle.values().into_iter().find(|v| v.exposes(method));
            let outcome = match found {
                Some(value) => attempt(value, method, args, &accept),
                None => Err(CallError::Missing),
            };
            match outcome {
                Ok(value) => return Ok((value, Resolution::Scan)),
                Err(err) => attempts.push((Resolution::Scan, err)),
            }
        }

        let err = AdapterError::Unavailable { method, attempts };
        tracing::debug!("{}", err);
        Err(err)
    }
}

impl Drop for PlaybackAdapter {
    fn drop(&mut self) {
        self.release();
    }
}

fn attempt<T>(
    target: &dyn EngineObject,
    method: &str,
    args: &[Value],
    accept: &impl Fn(Value) -> Result<T, CallError>,
) -> Result<T, CallError> {
    target.invoke(method, args).and_then(accept)
}

fn ignore_result(_: Value) -> Result<(), CallError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedHandle;
    use serde_json::json;

    fn attach(handle: ScriptedHandle) -> PlaybackAdapter {
        PlaybackAdapter::attach(Box::new(handle), Metadata::default()).unwrap()
    }

    #[test]
    fn test_top_level_controls() {
        let handle = ScriptedHandle::new()
            .returns("play", Value::Null)
            .returns("getCurrentTime", json!(1_250.7));
        let log = handle.log();
        let mut adapter = attach(handle);

        assert_eq!(adapter.play(Some(Timestamp::from_millis(300))), Ok(Resolution::TopLevel));
        assert_eq!(adapter.current_time().as_millis(), 1_250);
        assert_eq!(log.calls()[0].args, vec![json!(300)]);
    }

    #[test]
    fn test_nested_current_time() {
        let handle = ScriptedHandle::new()
            .returns("play", Value::Null)
            .child("player", ScriptedHandle::new().returns("getCurrentTime", json!(900)));
        let mut adapter = attach(handle);

        assert_eq!(adapter.current_time().as_millis(), 900);
        assert_eq!(adapter.locate("getCurrentTime"), Some(Resolution::Nested("player")));
    }

    #[test]
    fn test_nested_candidates_are_ranked() {
        let handle = ScriptedHandle::new()
            .child("player", ScriptedHandle::new().returns("pause", Value::Null))
            .child("replayer", ScriptedHandle::new().returns("pause", Value::Null));
        let log = handle.log();
        let mut adapter = attach(handle);

        assert_eq!(adapter.pause(), Ok(Resolution::Nested("replayer")));
        assert_eq!(log.names(), vec!["replayer.pause"]);
    }

    #[test]
    fn test_throwing_top_level_falls_through() {
        let handle = ScriptedHandle::new()
            .throws("setSpeed", "not ready")
            .child("replayer", ScriptedHandle::new().returns("setSpeed", Value::Null));
        let log = handle.log();
        let mut adapter = attach(handle);

        assert_eq!(adapter.set_speed(2.0), Ok(Resolution::Nested("replayer")));
        assert_eq!(log.names(), vec!["setSpeed", "replayer.setSpeed"]);
        assert_eq!(log.calls()[1].args, vec![json!(2.0)]);
    }

    #[test]
    fn test_scan_only_for_getters() {
        let inner = ScriptedHandle::new()
            .returns("getCurrentTime", json!(4_000))
            .returns("play", Value::Null);
        let handle = ScriptedHandle::new().child("$$", inner);
        let mut adapter = attach(handle);

        assert_eq!(adapter.current_time().as_millis(), 4_000);

        let err = adapter.play(None).unwrap_err();
        let AdapterError::Unavailable { method, attempts } = err;
        assert_eq!(method, "play");
        assert_eq!(attempts.len(), 1 + NESTED_CANDIDATES.len());
    }

    #[test]
    fn test_incompatible_time_falls_back_to_zero() {
        let handle = ScriptedHandle::new().returns("getCurrentTime", json!("soon"));
        let mut adapter = attach(handle);

        assert_eq!(adapter.current_time(), Timestamp::zero());
        assert!(matches!(
            adapter.try_current_time(),
            Err(AdapterError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_metadata_falls_back_to_last_known() {
        let seed = Metadata {
            session_id: Some("sess-9".to_string()),
            total_time: Some(Timestamp::from_millis(10_000)),
            ..Metadata::default()
        };
        let handle = ScriptedHandle::new()
            .throws("getMetaData", "detached")
            .returns("pause", Value::Null);
        let mut adapter = PlaybackAdapter::attach(Box::new(handle), seed.clone()).unwrap();

        assert_eq!(adapter.metadata(), &seed);
    }

    #[test]
    fn test_metadata_absorbs_engine_report() {
        let handle = ScriptedHandle::new().returns(
            "getMetaData",
            json!({ "startTime": 100, "endTime": 5100, "totalTime": 5000 }),
        );
        let mut adapter = attach(handle);

        assert_eq!(adapter.metadata().total_time, Some(Timestamp::from_millis(5_000)));
    }

    #[test]
    fn test_attach_requires_a_control() {
        let handle = ScriptedHandle::new().returns("destroy", Value::Null);
        let log = handle.log();
        let result = PlaybackAdapter::attach(Box::new(handle), Metadata::default());

        assert_eq!(result.unwrap_err(), EngineInitError::NoControlSurface);
        // The rejected handle is still torn down.
        assert_eq!(log.names(), vec!["destroy"]);
    }

    #[test]
    fn test_dispose_prefers_destroy() {
        let handle = ScriptedHandle::new()
            .returns("play", Value::Null)
            .returns("destroy", Value::Null)
            .returns("$destroy", Value::Null);
        let log = handle.log();
        attach(handle).dispose();

        assert_eq!(log.names(), vec!["destroy"]);
    }

    #[test]
    fn test_drop_uses_teardown_hook() {
        let handle = ScriptedHandle::new()
            .returns("play", Value::Null)
            .returns("$destroy", Value::Null);
        let log = handle.log();
        drop(attach(handle));

        assert_eq!(log.names(), vec!["$destroy"]);
    }
}
