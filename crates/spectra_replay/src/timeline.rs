//! Event timeline.
//!
//! The timeline is built from session metadata only: the application's
//! custom events plus any reported errors, merged into one list ordered by
//! timestamp. A category filter and a free-text search narrow it down.

use crate::adapter::PlaybackAdapter;
use crate::event::{CustomEvent, EventContext, JsonMap, Metadata};
use crate::replay::PlaybackClock;
use crate::time::Timestamp;
use serde::Serialize;
use serde_json::Value;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// `eventType` given to entries built from error records.
pub const ERROR_EVENT_TYPE: &str = "error";

/// Filter categories offered to users, with display labels.
pub const FILTER_PRESETS: [(&str, &str); 6] = [
    ("all", "All"),
    ("click", "Clicks"),
    ("network", "Network"),
    ("console", "Console"),
    ("navigation", "Navigation"),
    (ERROR_EVENT_TYPE, "Errors"),
];

/// Which categories the timeline shows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TimelineFilter {
    #[default]
    All,
    /// Entries whose `eventType` equals this exactly.
    Only(String),
}

impl TimelineFilter {
    pub fn only(event_type: impl Into<String>) -> Self {
        TimelineFilter::Only(event_type.into())
    }

    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            TimelineFilter::All => true,
            TimelineFilter::Only(wanted) => wanted == event_type,
        }
    }

    /// Display label for preset filters.
    pub fn label(&self) -> Option<&'static str> {
        let key = match self {
            TimelineFilter::All => "all",
            TimelineFilter::Only(event_type) => event_type.as_str(),
        };
        FILTER_PRESETS
            .iter()
            .find(|(value, _)| *value == key)
            .map(|(_, label)| *label)
    }

    pub fn presets() -> impl Iterator<Item = TimelineFilter> {
        FILTER_PRESETS.iter().map(|(value, _)| match *value {
            "all" => TimelineFilter::All,
            other => TimelineFilter::only(other),
        })
    }
}

impl FromStr for TimelineFilter {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(if s.is_empty() || s.eq_ignore_ascii_case("all") {
            TimelineFilter::All
        } else {
            TimelineFilter::only(s)
        })
    }
}

impl fmt::Display for TimelineFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineFilter::All => f.write_str("all"),
            TimelineFilter::Only(event_type) => f.write_str(event_type),
        }
    }
}

/// A custom event prepared for display and seeking.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimelineEntry {
    /// Resolved timestamp; `0` when the event carried none.
    pub timestamp: Timestamp,
    /// Seek target within the recording.
    pub offset: Timestamp,
    pub event: CustomEvent,
}

impl TimelineEntry {
    fn new(mut event: CustomEvent, start_time: Option<Timestamp>) -> Self {
        let timestamp = event.timestamp.unwrap_or_default();
        event.timestamp = Some(timestamp);
        let offset = match start_time {
            Some(start) if !start.is_zero() && timestamp >= start => {
                timestamp.saturating_sub(start)
            }
            _ => timestamp,
        };
        Self {
            timestamp,
            offset,
            event,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event.event_type
    }

    /// Heading shown for the entry.
    pub fn label(&self) -> &str {
        if self.event.kind == crate::event::CUSTOM_KIND {
            &self.event.event_type
        } else {
            "Error"
        }
    }

    /// One-line description of the entry's payload.
    pub fn summary(&self) -> String {
        let field = |name: &str| display_field(&self.event.data, name);
        let text = match self.event.event_type.as_str() {
            "click" => field("text"),
            "network" => format!("{} {}", field("method"), field("url")),
            "console" => format!("{} {}", field("level"), field("message")),
            "navigation" => field("url"),
            _ => return "Error event".to_string(),
        };
        text.trim().to_string()
    }

    /// Case-insensitive match against the entry's JSON form.
    pub fn matches_search(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        match serde_json::to_string(&self.event) {
            Ok(json) => json.to_lowercase().contains(&needle.to_lowercase()),
            Err(_) => false,
        }
    }
}

fn display_field(data: &JsonMap, name: &str) -> String {
    match data.get(name) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Build the timeline for `metadata`, narrowed by `filter` and `search`.
///
/// Pure: equal inputs give equal output. Entries with equal timestamps keep
/// their relative order, custom events ahead of errors.
pub fn aggregate(metadata: &Metadata, filter: &TimelineFilter, search: &str) -> Vec<TimelineEntry> {
    let start_time = metadata.start_time;

    let custom = metadata
        .custom_events
        .iter()
        .cloned()
        .map(|event| TimelineEntry::new(event, start_time));

    let errors = metadata.error_records().into_iter().map(|record| {
        let mut data = JsonMap::new();
        data.insert("message".to_string(), Value::String(record.message));
        data.insert("myError".to_string(), Value::Bool(true));

        let mut event = CustomEvent::new(ERROR_EVENT_TYPE, data);
        event.timestamp = record.timestamp;
        event.session_id = metadata.session_id.clone();
        event.context = Some(EventContext {
            user_id: metadata.user_id.clone(),
            extra: JsonMap::new(),
        });
        TimelineEntry::new(event, start_time)
    });

    let mut entries: Vec<TimelineEntry> = custom.chain(errors).collect();
    entries.sort_by_key(|entry| entry.timestamp);

    entries.retain(|entry| filter.matches(entry.event_type()) && entry.matches_search(search));
    entries
}

/// Jump playback to `entry`: pause, then seek to its offset.
///
/// Both steps are best effort.
pub fn select(
    entry: &TimelineEntry,
    clock: &mut PlaybackClock,
    mut adapter: Option<&mut PlaybackAdapter>,
) -> bool {
    clock.pause(adapter.as_deref_mut());
    clock.seek_to(adapter, entry.offset)
}

/// Timeline state for one viewer: the active filter and search, and the
/// entries computed for them.
///
/// Entries are recomputed lazily, only after the metadata, filter or search
/// changed.
#[derive(Debug)]
pub struct TimelineView {
    filter: TimelineFilter,
    search: String,
    entries: Vec<TimelineEntry>,
    stale: bool,
}

impl TimelineView {
    pub fn new() -> Self {
        Self {
            filter: TimelineFilter::All,
            search: String::new(),
            entries: Vec::new(),
            stale: true,
        }
    }

    pub fn filter(&self) -> &TimelineFilter {
        &self.filter
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_filter(&mut self, filter: TimelineFilter) {
        if self.filter != filter {
            self.filter = filter;
            self.stale = true;
        }
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        let search = search.into();
        if self.search != search {
            self.search = search;
            self.stale = true;
        }
    }

    /// Mark the metadata as changed.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Entries for `metadata`, recomputed if anything changed since the
    /// last call.
    pub fn entries(&mut self, metadata: &Metadata) -> &[TimelineEntry] {
        if self.stale {
            self.entries = aggregate(metadata, &self.filter, &self.search);
            self.stale = false;
            tracing::trace!(
                "Timeline rebuilt: {} entries (filter {}, search {:?})",
                self.entries.len(),
                self.filter,
                self.search
            );
        }
        &self.entries
    }
}

impl Default for TimelineView {
    fn default() -> Self {
        Self::new()
    }
}
