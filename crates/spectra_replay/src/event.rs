//! Session data model.
//!
//! A session payload arrives as `{ events, metadata? }`. Events are handed to
//! the [`EventDecoder`](crate::decode::EventDecoder) and come out as
//! [`NormalizedEvent`]s; metadata carries the application-level annotations
//! ([`CustomEvent`]) and error records the timeline is built from.

use crate::time::Timestamp;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// JSON object used for free-form event payloads.
pub type JsonMap = Map<String, Value>;

/// One element of the payload's `events` array, before decoding.
#[derive(Clone, Debug, PartialEq)]
pub enum RawEvent {
    /// An engine-native event object.
    Structured(JsonMap),
    /// Text that encodes one event (JSON, compressed bytes, or base64 of those).
    Encoded(String),
    /// Anything else the producer wrote (numbers, arrays, null).
    Other(Value),
}

impl From<Value> for RawEvent {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RawEvent::Structured(map),
            Value::String(text) => RawEvent::Encoded(text),
            other => RawEvent::Other(other),
        }
    }
}

impl From<&str> for RawEvent {
    fn from(text: &str) -> Self {
        RawEvent::Encoded(text.to_string())
    }
}

/// The `type` of a normalized event.
///
/// Engines use numeric codes for low-level frames and names for
/// application events; anything else a producer wrote is kept as-is.
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    Named(String),
    Code(u64),
    Other(Value),
}

impl From<&Value> for EventKind {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(name) => EventKind::Named(name.clone()),
            Value::Number(n) => match n.as_u64() {
                Some(code) => EventKind::Code(code),
                None => EventKind::Other(value.clone()),
            },
            other => EventKind::Other(other.clone()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Named(name) => f.write_str(name),
            EventKind::Code(code) => write!(f, "{code}"),
            EventKind::Other(value) => write!(f, "{value}"),
        }
    }
}

/// The canonical event unit consumed by the engine and the clock.
///
/// The object is kept exactly as the producer wrote it and serializes back
/// to the same JSON. `timestamp` is the position resolved from its
/// `timestamp` field: numbers and numeric strings are read, anything else
/// is zero.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedEvent {
    pub timestamp: Timestamp,
    fields: JsonMap,
}

impl NormalizedEvent {
    pub fn new(timestamp: Timestamp, kind: impl Into<String>) -> Self {
        let mut fields = JsonMap::new();
        fields.insert("timestamp".to_string(), Value::from(timestamp.as_millis()));
        fields.insert("type".to_string(), Value::String(kind.into()));
        Self { timestamp, fields }
    }

    /// Take an object as-is.
    pub fn from_object(fields: JsonMap) -> Self {
        let timestamp = fields
            .get("timestamp")
            .and_then(parse_timestamp)
            .unwrap_or_default();
        Self { timestamp, fields }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.fields.insert("data".to_string(), data);
        self
    }

    /// The event's `type`, if it has one.
    pub fn kind(&self) -> Option<EventKind> {
        self.fields.get("type").map(EventKind::from)
    }

    /// The event's `data`, including an explicit `null`.
    pub fn data(&self) -> Option<&Value> {
        self.fields.get("data")
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &JsonMap {
        &self.fields
    }

    /// The stand-in for an element no decoding strategy understood.
    pub fn placeholder(raw: Value, now: Timestamp) -> Self {
        let mut data = JsonMap::new();
        data.insert("raw".to_string(), raw);
        Self::new(now, PLACEHOLDER_KIND).with_data(Value::Object(data))
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind(), Some(EventKind::Named(name)) if name == PLACEHOLDER_KIND)
            && self.data().and_then(|d| d.get("raw")).is_some()
    }
}

/// Read a millisecond timestamp from a number or a numeric string.
fn parse_timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(Timestamp::from_millis)
            .or_else(|| n.as_f64().map(Timestamp::from_millis_f64)),
        Value::String(text) => text.trim().parse::<f64>().ok().map(Timestamp::from_millis_f64),
        _ => None,
    }
}

impl Serialize for NormalizedEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NormalizedEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonMap::deserialize(deserializer).map(Self::from_object)
    }
}

/// `type` given to placeholder events.
pub const PLACEHOLDER_KIND: &str = "Custom";

/// Attribution attached to a custom event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// An application-level annotation (click, network call, console log,
/// navigation, error) layered over the raw replay stream.
///
/// Reading one never fails on a malformed field: `data` that is not an
/// object reads as empty, and an unreadable `timestamp` as absent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEvent {
    #[serde(rename = "type", default = "custom_kind", deserialize_with = "lenient::kind")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub event_type: String,
    #[serde(default, deserialize_with = "lenient::map")]
    pub data: JsonMap,
    #[serde(
        default,
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<Timestamp>,
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub session_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::context",
        skip_serializing_if = "Option::is_none"
    )]
    pub context: Option<EventContext>,
}

fn custom_kind() -> String {
    CUSTOM_KIND.to_string()
}

/// `type` carried by every custom event.
pub const CUSTOM_KIND: &str = "custom";

impl CustomEvent {
    pub fn new(event_type: impl Into<String>, data: JsonMap) -> Self {
        Self {
            kind: custom_kind(),
            event_type: event_type.into(),
            data,
            timestamp: None,
            session_id: None,
            context: None,
        }
    }

    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// An error reported for the session, before it is reshaped into a
/// timeline entry.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorRecord {
    pub message: String,
    pub timestamp: Option<Timestamp>,
}

impl ErrorRecord {
    /// Read one element of `metadata.errors`.
    ///
    /// The message is the element's own `message` string when it has one,
    /// otherwise the whole element serialized as JSON.
    pub fn from_value(value: &Value) -> Self {
        let message = match value.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => value.to_string(),
        };
        let timestamp = value
            .get("timestamp")
            .filter(|ts| ts.is_number())
            .and_then(|ts| serde_json::from_value(ts.clone()).ok());
        Self { message, timestamp }
    }
}

/// Descriptive session metadata.
///
/// Each field is read on its own: a malformed field reads as absent and an
/// unreadable custom event is skipped, without losing the rest.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub session_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub app_id: Option<String>,
    /// Absolute epoch time the recording started at.
    #[serde(
        default,
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<Timestamp>,
    #[serde(
        default,
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_time: Option<Timestamp>,
    #[serde(
        default,
        deserialize_with = "lenient::count",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_count: Option<u64>,
    #[serde(default, deserialize_with = "lenient::custom_events")]
    pub custom_events: Vec<CustomEvent>,
    /// Raw `errors` value; only an array contributes to the timeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl Metadata {
    /// Parse metadata without failing the load: metadata that is not an
    /// object becomes empty metadata.
    pub fn from_value_lenient(value: Value) -> Self {
        match serde_json::from_value(value) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!("Ignoring unreadable session metadata: {}", err);
                Metadata::default()
            }
        }
    }

    /// Error records, when `errors` is array-shaped.
    pub fn error_records(&self) -> Vec<ErrorRecord> {
        match &self.errors {
            Some(Value::Array(items)) => items.iter().map(ErrorRecord::from_value).collect(),
            _ => Vec::new(),
        }
    }

    /// Fold in metadata reported by the engine.
    ///
    /// Reported fields win where present; session attribution and
    /// annotations the engine knows nothing about are kept.
    pub fn absorb(&mut self, reported: Metadata) {
        let Metadata {
            session_id,
            user_id,
            app_id,
            start_time,
            total_time,
            event_count,
            custom_events,
            errors,
            extra,
        } = reported;

        self.session_id = session_id.or(self.session_id.take());
        self.user_id = user_id.or(self.user_id.take());
        self.app_id = app_id.or(self.app_id.take());
        self.start_time = start_time.or(self.start_time);
        self.total_time = total_time.or(self.total_time);
        self.event_count = event_count.or(self.event_count);
        if !custom_events.is_empty() {
            self.custom_events = custom_events;
        }
        self.errors = errors.or(self.errors.take());
        self.extra.extend(extra);
    }

    /// Total time, treating an absent value as zero.
    pub fn total_time_or_zero(&self) -> Timestamp {
        self.total_time.unwrap_or_default()
    }
}

/// Field readers that never fail: a malformed value reads as absent.
mod lenient {
    use super::{CustomEvent, EventContext, JsonMap, Timestamp, CUSTOM_KIND};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(text) => Some(text),
            _ => None,
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        string(d).map(Option::unwrap_or_default)
    }

    pub fn kind<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        string(d).map(|kind| kind.unwrap_or_else(|| CUSTOM_KIND.to_string()))
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Timestamp>, D::Error> {
        Value::deserialize(d).map(|value| super::parse_timestamp(&value))
    }

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Value::deserialize(d).map(|value| value.as_u64())
    }

    pub fn map<'de, D: Deserializer<'de>>(d: D) -> Result<JsonMap, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Object(map) => map,
            _ => JsonMap::new(),
        })
    }

    pub fn context<'de, D: Deserializer<'de>>(d: D) -> Result<Option<EventContext>, D::Error> {
        Ok(match Value::deserialize(d)? {
            value @ Value::Object(_) => serde_json::from_value(value).ok(),
            _ => None,
        })
    }

    pub fn custom_events<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<CustomEvent>, D::Error> {
        let items = match Value::deserialize(d)? {
            Value::Array(items) => items,
            Value::Null => return Ok(Vec::new()),
            other => {
                tracing::warn!("Ignoring non-array customEvents: {}", other);
                return Ok(Vec::new());
            }
        };

        Ok(items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value(item) {
                Ok(event) => Some(event),
                Err(err) => {
                    tracing::warn!(index, "Skipping unreadable custom event: {}", err);
                    None
                }
            })
            .collect())
    }
}

/// The body of one session read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionPayload {
    pub events: Vec<RawEvent>,
    pub metadata: Option<Metadata>,
}

impl SessionPayload {
    /// Parse a payload from response bytes.
    ///
    /// Only a body that is not JSON is an error; a missing or non-array
    /// `events` field yields no events.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut body) = value else {
            return Self::default();
        };

        let events = match body.remove("events") {
            Some(Value::Array(items)) => items.into_iter().map(RawEvent::from).collect(),
            _ => Vec::new(),
        };
        let metadata = match body.remove("metadata") {
            None | Some(Value::Null) => None,
            Some(value) => Some(Metadata::from_value_lenient(value)),
        };

        Self { events, metadata }
    }
}
