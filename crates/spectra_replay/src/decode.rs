//! Event decoding pipeline.
//!
//! Producers emit the same logical events in several encodings: native
//! objects, JSON text, deflate-compressed bytes packed one byte per
//! character, and base64 of the compressed bytes. [`EventDecoder`] tries
//! each tier in a fixed order and never drops an element: whatever no tier
//! understands becomes a placeholder event, so output index `i` always
//! comes from input index `i`.

use crate::event::{Metadata, NormalizedEvent, RawEvent, SessionPayload};
use crate::time::Timestamp;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use serde_json::Value;
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

/// Base64 that, like browser `atob`, does not insist on padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Which strategy produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecodeTier {
    /// Already a structured object.
    Structured,
    /// Plain JSON text with a `timestamp` field.
    Json,
    /// Compressed bytes carried one byte per character.
    Compressed,
    /// Base64 of compressed bytes.
    Base64Compressed,
    /// Nothing worked; a placeholder stands in.
    Placeholder,
}

/// Per-tier counts for one decoded batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub structured: usize,
    pub json: usize,
    pub compressed: usize,
    pub base64_compressed: usize,
    pub placeholders: usize,
}

impl DecodeReport {
    fn record(&mut self, tier: DecodeTier) {
        match tier {
            DecodeTier::Structured => self.structured += 1,
            DecodeTier::Json => self.json += 1,
            DecodeTier::Compressed => self.compressed += 1,
            DecodeTier::Base64Compressed => self.base64_compressed += 1,
            DecodeTier::Placeholder => self.placeholders += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.structured + self.json + self.compressed + self.base64_compressed + self.placeholders
    }
}

/// A payload after decoding: immutable from here on.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedSession {
    pub events: Vec<NormalizedEvent>,
    pub metadata: Metadata,
    pub report: DecodeReport,
}

/// Turns raw payload elements into [`NormalizedEvent`]s.
#[derive(Clone, Debug)]
pub struct EventDecoder {
    now: fn() -> Timestamp,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder {
    /// Create a decoder that stamps placeholders with the wall clock.
    pub fn new() -> Self {
        Self { now: wall_clock }
    }

    /// Create a decoder with a fixed time source for placeholders.
    pub fn with_time_source(now: fn() -> Timestamp) -> Self {
        Self { now }
    }

    /// Decode a batch, preserving length and order.
    pub fn decode(&self, events: &[RawEvent]) -> Vec<NormalizedEvent> {
        self.decode_with_report(events).0
    }

    pub fn decode_with_report(&self, events: &[RawEvent]) -> (Vec<NormalizedEvent>, DecodeReport) {
        let mut report = DecodeReport::default();
        let decoded = events
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                let (event, tier) = self.decode_one(raw);
                if tier == DecodeTier::Placeholder {
                    tracing::debug!(index, "Event could not be decoded, substituting placeholder");
                }
                report.record(tier);
                event
            })
            .collect();
        (decoded, report)
    }

    /// Decode a whole payload and fill in `startTime` and `totalTime` when
    /// they are missing.
    pub fn decode_payload(&self, payload: SessionPayload) -> DecodedSession {
        let (events, report) = self.decode_with_report(&payload.events);
        let mut metadata = payload.metadata.unwrap_or_default();
        if metadata.start_time.is_none() {
            metadata.start_time = derive_start_time(&events);
        }
        if metadata.total_time.is_none() {
            metadata.total_time = Some(derive_total_time(&events));
        }
        DecodedSession {
            events,
            metadata,
            report,
        }
    }

    /// Decode one element, reporting the tier that accepted it.
    pub fn decode_one(&self, raw: &RawEvent) -> (NormalizedEvent, DecodeTier) {
        match raw {
            RawEvent::Structured(map) => (
                NormalizedEvent::from_object(map.clone()),
                DecodeTier::Structured,
            ),
            RawEvent::Encoded(text) => self.decode_text(text),
            RawEvent::Other(value) => (self.placeholder(value.clone()), DecodeTier::Placeholder),
        }
    }

    fn decode_text(&self, text: &str) -> (NormalizedEvent, DecodeTier) {
        if let Some(event) = parse_json_event(text) {
            return (event, DecodeTier::Json);
        }

        if let Some(event) = inflate_event(&latin1_bytes(text)) {
            return (event, DecodeTier::Compressed);
        }

        if let Ok(bytes) = LENIENT_BASE64.decode(text.trim()) {
            if let Some(event) = inflate_event(&bytes) {
                return (event, DecodeTier::Base64Compressed);
            }
        }

        (
            self.placeholder(Value::String(text.to_string())),
            DecodeTier::Placeholder,
        )
    }

    fn placeholder(&self, raw: Value) -> NormalizedEvent {
        NormalizedEvent::placeholder(raw, (self.now)())
    }
}

/// Earliest strictly positive timestamp, where the recording starts.
pub fn derive_start_time(events: &[NormalizedEvent]) -> Option<Timestamp> {
    events
        .iter()
        .map(|e| e.timestamp)
        .filter(|ts| !ts.is_zero())
        .min()
}

/// Span between the earliest and latest strictly positive timestamps.
pub fn derive_total_time(events: &[NormalizedEvent]) -> Timestamp {
    let mut positive = events
        .iter()
        .map(|e| e.timestamp)
        .filter(|ts| !ts.is_zero());

    let Some(first) = positive.next() else {
        return Timestamp::zero();
    };
    let (min, max) = positive.fold((first, first), |(min, max), ts| (min.min(ts), max.max(ts)));
    max.saturating_sub(min)
}

fn wall_clock() -> Timestamp {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    Timestamp::from_millis(millis)
}

/// JSON text is only an event if it is an object with a `timestamp`.
fn parse_json_event(text: &str) -> Option<NormalizedEvent> {
    let Value::Object(fields) = serde_json::from_str(text).ok()? else {
        return None;
    };
    if !fields.contains_key("timestamp") {
        return None;
    }
    Some(NormalizedEvent::from_object(fields))
}

/// One byte per character, keeping the low 8 bits of each code point.
fn latin1_bytes(text: &str) -> Vec<u8> {
    text.chars().map(|c| (u32::from(c) & 0xff) as u8).collect()
}

/// Inflate as zlib, gzip, then raw deflate, and parse the first text that
/// is a JSON event.
fn inflate_event(bytes: &[u8]) -> Option<NormalizedEvent> {
    if bytes.is_empty() {
        return None;
    }

    let inflaters: [fn(&[u8]) -> std::io::Result<String>; 3] = [
        |b| read_all(ZlibDecoder::new(b)),
        |b| read_all(GzDecoder::new(b)),
        |b| read_all(DeflateDecoder::new(b)),
    ];

    inflaters.iter().find_map(|inflate| {
        let text = inflate(bytes).ok()?;
        serde_json::from_str::<NormalizedEvent>(&text).ok()
    })
}

fn read_all(mut reader: impl Read) -> std::io::Result<String> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, PLACEHOLDER_KIND};
    use base64::engine::general_purpose::STANDARD;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;

    const SAMPLE: &str = r#"{"timestamp":1000,"type":"x"}"#;

    fn fixed_now() -> Timestamp {
        Timestamp::from_millis(42)
    }

    fn decoder() -> EventDecoder {
        EventDecoder::with_time_source(fixed_now)
    }

    fn zlib(text: &str) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn as_byte_string(bytes: &[u8]) -> String {
        bytes.iter().map(|&b| char::from(b)).collect()
    }

    fn assert_sample(event: &NormalizedEvent) {
        assert_eq!(event.timestamp.as_millis(), 1000);
        assert_eq!(event.kind(), Some(EventKind::Named("x".to_string())));
    }

    #[test]
    fn test_json_text_tier() {
        let (event, tier) = decoder().decode_one(&RawEvent::from(SAMPLE));
        assert_eq!(tier, DecodeTier::Json);
        assert_sample(&event);
    }

    #[test]
    fn test_compressed_byte_string_tier() {
        let raw = RawEvent::Encoded(as_byte_string(&zlib(SAMPLE)));
        let (event, tier) = decoder().decode_one(&raw);
        assert_eq!(tier, DecodeTier::Compressed);
        assert_sample(&event);
    }

    #[test]
    fn test_base64_compressed_tier() {
        let raw = RawEvent::Encoded(STANDARD.encode(zlib(SAMPLE)));
        let (event, tier) = decoder().decode_one(&raw);
        assert_eq!(tier, DecodeTier::Base64Compressed);
        assert_sample(&event);
    }

    #[test]
    fn test_gzip_container_is_accepted() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        let raw = RawEvent::Encoded(STANDARD.encode(encoder.finish().unwrap()));
        let (event, _) = decoder().decode_one(&raw);
        assert_sample(&event);
    }

    #[test]
    fn test_json_without_timestamp_is_not_an_event() {
        let (event, tier) = decoder().decode_one(&RawEvent::from(r#"{"type":"x"}"#));
        assert_eq!(tier, DecodeTier::Placeholder);
        assert_eq!(event.data(), Some(&json!({ "raw": r#"{"type":"x"}"# })));
    }

    #[test]
    fn test_unparseable_string_becomes_placeholder() {
        let (event, tier) = decoder().decode_one(&RawEvent::from("definitely not an event"));
        assert_eq!(tier, DecodeTier::Placeholder);
        assert!(event.is_placeholder());
        assert_eq!(event.kind(), Some(EventKind::Named(PLACEHOLDER_KIND.to_string())));
        assert_eq!(event.timestamp, fixed_now());
    }

    #[test]
    fn test_structured_event_is_unchanged() {
        let original = json!({ "timestamp": 7, "type": 3, "data": { "source": 1 } });
        let raw = RawEvent::from(original.clone());
        let (event, tier) = decoder().decode_one(&raw);
        assert_eq!(tier, DecodeTier::Structured);
        assert_eq!(serde_json::to_value(&event).unwrap(), original);
    }

    #[test]
    fn test_structured_event_with_unusual_fields_is_kept() {
        for original in [
            json!({ "timestamp": 1, "type": true }),
            json!({ "timestamp": 1, "type": 2, "data": null }),
            json!({ "timestamp": "9", "type": { "nested": 1 }, "delay": [1, 2] }),
            json!({ "type": "no-time" }),
        ] {
            let (event, tier) = decoder().decode_one(&RawEvent::from(original.clone()));
            assert_eq!(tier, DecodeTier::Structured);
            assert!(!event.is_placeholder());
            assert_eq!(serde_json::to_value(&event).unwrap(), original);
        }
    }

    #[test]
    fn test_structured_event_timestamp_resolution() {
        let decode = |value: serde_json::Value| decoder().decode_one(&RawEvent::from(value)).0;

        assert_eq!(decode(json!({ "timestamp": 1, "type": true })).timestamp.as_millis(), 1);
        assert_eq!(decode(json!({ "timestamp": "9" })).timestamp.as_millis(), 9);
        assert_eq!(decode(json!({ "timestamp": 12.7 })).timestamp.as_millis(), 12);
        assert_eq!(decode(json!({ "timestamp": "later" })).timestamp, Timestamp::zero());
        assert_eq!(decode(json!({ "type": "x" })).timestamp, Timestamp::zero());
    }

    #[test]
    fn test_explicit_null_data_survives() {
        let (event, _) =
            decoder().decode_one(&RawEvent::from(json!({ "timestamp": 1, "type": 2, "data": null })));
        assert_eq!(event.data(), Some(&serde_json::Value::Null));
        assert_eq!(event.kind(), Some(EventKind::Code(2)));
    }

    #[test]
    fn test_json_text_with_string_timestamp() {
        let text = r#"{"timestamp":"5","type":"x"}"#;
        let (event, tier) = decoder().decode_one(&RawEvent::from(text));
        assert_eq!(tier, DecodeTier::Json);
        assert_eq!(event.timestamp.as_millis(), 5);
        assert_eq!(serde_json::to_string(&event).unwrap(), text);
    }

    #[test]
    fn test_json_text_with_odd_type_is_accepted() {
        let (event, tier) = decoder().decode_one(&RawEvent::from(r#"{"timestamp":3,"type":null}"#));
        assert_eq!(tier, DecodeTier::Json);
        assert_eq!(event.kind(), Some(EventKind::Other(serde_json::Value::Null)));
    }

    #[test]
    fn test_non_object_element_degrades() {
        let (event, tier) = decoder().decode_one(&RawEvent::from(json!(12)));
        assert_eq!(tier, DecodeTier::Placeholder);
        assert_eq!(event.data(), Some(&json!({ "raw": 12 })));
    }

    #[test]
    fn test_batch_preserves_length_and_order() {
        let raws = vec![
            RawEvent::from(r#"{"timestamp":3,"type":"c"}"#),
            RawEvent::from("garbage"),
            RawEvent::from(json!({ "timestamp": 1, "type": "a" })),
            RawEvent::Encoded(STANDARD.encode(zlib(r#"{"timestamp":2,"type":"b"}"#))),
        ];
        let (events, report) = decoder().decode_with_report(&raws);

        assert_eq!(events.len(), raws.len());
        assert_eq!(events[0].timestamp.as_millis(), 3);
        assert!(events[1].is_placeholder());
        assert_eq!(events[2].timestamp.as_millis(), 1);
        assert_eq!(events[3].timestamp.as_millis(), 2);
        assert_eq!(report.placeholders, 1);
        assert_eq!(report.total(), 4);
    }

    #[test]
    fn test_derive_total_time_ignores_zero() {
        let events = vec![
            NormalizedEvent::new(Timestamp::zero(), "a"),
            NormalizedEvent::new(Timestamp::from_millis(1_500), "b"),
            NormalizedEvent::new(Timestamp::from_millis(500), "c"),
        ];
        assert_eq!(derive_total_time(&events).as_millis(), 1_000);
        assert_eq!(derive_total_time(&[]), Timestamp::zero());
    }

    #[test]
    fn test_single_event_payload_has_zero_total() {
        let payload = SessionPayload::from_value(json!({
            "events": [r#"{"timestamp":500,"type":"click"}"#],
            "metadata": {}
        }));
        let session = decoder().decode_payload(payload);
        assert_eq!(session.events.len(), 1);
        assert_eq!(session.events[0].timestamp.as_millis(), 500);
        assert_eq!(session.metadata.total_time, Some(Timestamp::zero()));
    }

    #[test]
    fn test_start_time_derived_when_missing() {
        let payload = SessionPayload::from_value(json!({
            "events": [{ "timestamp": 3_000 }, { "timestamp": 0 }, { "timestamp": 1_000 }]
        }));
        let session = decoder().decode_payload(payload);
        assert_eq!(session.metadata.start_time, Some(Timestamp::from_millis(1_000)));

        let payload = SessionPayload::from_value(json!({
            "events": [{ "timestamp": 3_000 }],
            "metadata": { "startTime": 2_000 }
        }));
        let session = decoder().decode_payload(payload);
        assert_eq!(session.metadata.start_time, Some(Timestamp::from_millis(2_000)));

        let empty = decoder().decode_payload(SessionPayload::default());
        assert_eq!(empty.metadata.start_time, None);
    }

    #[test]
    fn test_supplied_total_time_is_kept() {
        let payload = SessionPayload::from_value(json!({
            "events": [{ "timestamp": 10 }, { "timestamp": 20 }],
            "metadata": { "totalTime": 9000 }
        }));
        let session = decoder().decode_payload(payload);
        assert_eq!(session.metadata.total_time, Some(Timestamp::from_millis(9_000)));
    }
}
