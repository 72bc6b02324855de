//! Terminal rendering for timelines and transport status.

use spectra_replay::{ClockMode, TimelineEntry, ViewerSnapshot};

/// One line per timeline entry: index, offset, heading, summary.
pub fn entry_line(index: usize, entry: &TimelineEntry) -> String {
    format!(
        "{index:>4}  {:>6}  {:<12} {}",
        entry.offset.format_clock(),
        entry.label(),
        entry.summary()
    )
}

/// Transport status line.
pub fn status_line(snapshot: &ViewerSnapshot) -> String {
    let requested = snapshot
        .requested
        .as_deref()
        .or(snapshot.session_id.as_deref())
        .unwrap_or("-");

    if snapshot.status.loading {
        return format!("[{requested}] loading...");
    }
    if let Some(message) = &snapshot.status.load_error {
        return format!("[{requested}] {message}");
    }

    let session = snapshot.session_id.as_deref().unwrap_or("-");
    if let Some(message) = &snapshot.status.engine_error {
        return format!("[{session}] {message}; timeline only");
    }
    if !snapshot.engine_ready {
        return format!("[{session}] no playable events");
    }

    let state = if snapshot.playing { "playing" } else { "paused" };
    // `~` marks an estimated position.
    let source = if snapshot.mode == Some(ClockMode::Interpolated) {
        " ~"
    } else {
        ""
    };
    format!(
        "[{session}] {state} {}{source} / {}  x{}",
        snapshot.current.format_clock(),
        snapshot.total.format_clock(),
        snapshot.speed
    )
}
