//! Interactive player commands read from stdin.

use spectra_replay::{TimelineFilter, Timestamp, ViewerCommand};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),

    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),

    #[error("`{command}`: invalid argument `{value}`")]
    InvalidArgument { command: &'static str, value: String },

    #[error("speed {speed} is not offered (choose from {offered})")]
    UnsupportedSpeed { speed: f64, offered: String },
}

const HELP: &str = "\
commands:
  p, play            resume playback
  pause              pause playback
  t, toggle          play/pause
  f, forward         skip forward
  b, back            skip back
  r, restart         play from the beginning
  seek <ms>          jump to a position
  goto <0..1>        jump to a fraction of the recording
  speed <n>          set the playback speed ({speeds})
  fullscreen         toggle fullscreen
  filter <category>  all, click, network, console, navigation, error
  search [text]      filter the timeline by text
  select <index>     jump to a timeline entry
  load <id>          open another session
  q, quit            exit";

/// Command reference, listing the offered speeds.
pub fn help(speeds: &[f64]) -> String {
    let offered = if speeds.is_empty() {
        "any".to_string()
    } else {
        list_speeds(speeds)
    };
    HELP.replace("{speeds}", &offered)
}

/// Check `speed` against the offered presets. An empty list offers any speed.
pub fn check_speed(speed: f64, speeds: &[f64]) -> Result<f64, CommandError> {
    if speeds.is_empty() || speeds.iter().any(|s| (s - speed).abs() < 1e-9) {
        Ok(speed)
    } else {
        Err(CommandError::UnsupportedSpeed {
            speed,
            offered: list_speeds(speeds),
        })
    }
}

fn list_speeds(speeds: &[f64]) -> String {
    speeds
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse one input line. Blank lines and `help` yield `None`.
///
/// `speeds` are the presets the `speed` command accepts.
pub fn parse(line: &str, speeds: &[f64]) -> Result<Option<ViewerCommand>, CommandError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "" | "help" | "?" => return Ok(None),
        "p" | "play" => ViewerCommand::Play,
        "pause" => ViewerCommand::Pause,
        "t" | "toggle" => ViewerCommand::Toggle,
        "f" | "forward" => ViewerCommand::SkipForward,
        "b" | "back" => ViewerCommand::SkipBack,
        "r" | "restart" => ViewerCommand::Restart,
        "fullscreen" => ViewerCommand::ToggleFullscreen,
        "q" | "quit" | "exit" => ViewerCommand::Close,
        "seek" => ViewerCommand::SeekTo(Timestamp::from_millis(number("seek", rest)?)),
        "goto" => ViewerCommand::SeekFraction(number("goto", rest)?),
        "speed" => ViewerCommand::SetSpeed(check_speed(number("speed", rest)?, speeds)?),
        "select" => ViewerCommand::Select(number("select", rest)?),
        "filter" => ViewerCommand::SetFilter(
            required("filter", rest)?
                .parse::<TimelineFilter>()
                .unwrap_or_default(),
        ),
        "search" => ViewerCommand::SetSearch(rest.to_string()),
        "load" => ViewerCommand::Load(required("load", rest)?.to_string()),
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn required<'a>(command: &'static str, rest: &'a str) -> Result<&'a str, CommandError> {
    if rest.is_empty() {
        Err(CommandError::MissingArgument(command))
    } else {
        Ok(rest)
    }
}

fn number<T: std::str::FromStr>(command: &'static str, rest: &str) -> Result<T, CommandError> {
    required(command, rest)?
        .parse()
        .map_err(|_| CommandError::InvalidArgument {
            command,
            value: rest.to_string(),
        })
}
