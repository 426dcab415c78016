//! HyperDeck command line builders.
//!
//! All functions are pure: they return the command text without the line
//! terminator, which the IO task appends when writing. Builders that take
//! caller-supplied text validate it so one call always produces exactly one
//! protocol line.
//!
//! Transport commands (`play`, `stop`, `goto`) are answered with `200 ok`
//! like any other command, but their effect is only visible through the
//! transport notifications that follow.

use deckctl_core::{Error, Result};

use crate::protocol::is_timecode;

/// Playback speed limits in percent of normal speed.
pub const MIN_SPEED: i32 = -1600;
pub const MAX_SPEED: i32 = 1600;

// ---------------------------------------------------------------
// Session and queries
// ---------------------------------------------------------------

/// Subscribe to the push notifications the state aggregate tracks.
pub fn cmd_notify() -> String {
    "notify: transport: true slot: true display timecode: true timeline position: true".into()
}

pub fn cmd_device_info() -> String {
    "device info".into()
}

pub fn cmd_transport_info() -> String {
    "transport info".into()
}

/// Query the playback timeline (`205 clips info:`).
pub fn cmd_clips_get() -> String {
    "clips get".into()
}

/// Query the active slot's clip catalog (`206 disk list:`).
pub fn cmd_disk_list() -> String {
    "disk list".into()
}

/// Ask the device to close the session.
pub fn cmd_quit() -> String {
    "quit".into()
}

/// Check that `line` is a single non-empty protocol line.
pub fn validate_line(line: &str) -> Result<()> {
    if line.trim().is_empty() {
        return Err(Error::InvalidParameter("empty command".into()));
    }
    if line.contains(['\r', '\n']) {
        return Err(Error::InvalidParameter(format!(
            "command contains a line break: {line:?}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------
// Transport
// ---------------------------------------------------------------

/// Parameters of a `play` command. `Default` plays the current clip at
/// normal speed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayOptions {
    /// Cue this clip first (sent as a separate `goto`).
    pub clip_id: Option<u32>,
    /// Percent of normal speed, negative for reverse.
    pub speed: Option<i32>,
    pub looping: Option<bool>,
    pub single_clip: Option<bool>,
}

impl PlayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clip(mut self, clip_id: u32) -> Self {
        self.clip_id = Some(clip_id);
        self
    }

    pub fn speed(mut self, speed: i32) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = Some(looping);
        self
    }

    pub fn single_clip(mut self, single_clip: bool) -> Self {
        self.single_clip = Some(single_clip);
        self
    }
}

/// Build `play` or `play: speed: S loop: L single clip: C`.
///
/// `clip_id` is not part of this line; see [`cmd_goto`].
pub fn cmd_play(options: &PlayOptions) -> Result<String> {
    let mut params = Vec::new();
    if let Some(speed) = options.speed {
        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(Error::InvalidParameter(format!(
                "speed {speed} outside {MIN_SPEED}..={MAX_SPEED}"
            )));
        }
        params.push(format!("speed: {speed}"));
    }
    if let Some(looping) = options.looping {
        params.push(format!("loop: {looping}"));
    }
    if let Some(single) = options.single_clip {
        params.push(format!("single clip: {single}"));
    }

    if params.is_empty() {
        Ok("play".into())
    } else {
        Ok(format!("play: {}", params.join(" ")))
    }
}

pub fn cmd_stop() -> String {
    "stop".into()
}

/// Where a `goto` moves the playhead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GotoTarget {
    ClipId(u32),
    /// Relative clip jump, e.g. `+1` or `-2`.
    ClipIdDelta(i32),
    Timecode(String),
    TimelineStart,
    TimelineEnd,
    /// Absolute frame position on the timeline.
    Timeline(u64),
}

impl GotoTarget {
    /// Build a target from the `(kind, value)` pair a script passes.
    ///
    /// `kind` is one of `clip id`, `timecode` or `timeline`.
    pub fn parse(kind: &str, value: &str) -> Result<GotoTarget> {
        let value = value.trim();
        let invalid = || Error::InvalidParameter(format!("invalid goto {kind}: {value:?}"));

        match kind.trim() {
            "clip id" | "clip" => {
                if value.starts_with(['+', '-']) {
                    value.parse().map(GotoTarget::ClipIdDelta).map_err(|_| invalid())
                } else {
                    value.parse().map(GotoTarget::ClipId).map_err(|_| invalid())
                }
            }
            "timecode" if is_timecode(value) => Ok(GotoTarget::Timecode(value.to_string())),
            "timecode" => Err(invalid()),
            "timeline" => match value {
                "start" => Ok(GotoTarget::TimelineStart),
                "end" => Ok(GotoTarget::TimelineEnd),
                n => n.parse().map(GotoTarget::Timeline).map_err(|_| invalid()),
            },
            other => Err(Error::InvalidParameter(format!(
                "unknown goto kind: {other:?}"
            ))),
        }
    }
}

pub fn cmd_goto(target: &GotoTarget) -> String {
    match target {
        GotoTarget::ClipId(id) => format!("goto: clip id: {id}"),
        GotoTarget::ClipIdDelta(delta) => format!("goto: clip id: {delta:+}"),
        GotoTarget::Timecode(tc) => format!("goto: timecode: {tc}"),
        GotoTarget::TimelineStart => "goto: timeline: start".into(),
        GotoTarget::TimelineEnd => "goto: timeline: end".into(),
        GotoTarget::Timeline(frame) => format!("goto: timeline: {frame}"),
    }
}

// ---------------------------------------------------------------
// Timeline editing
// ---------------------------------------------------------------

/// A clip to append to the timeline, by file name or catalog id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipRef {
    Name(String),
    Id(u32),
}

impl From<&str> for ClipRef {
    fn from(name: &str) -> Self {
        ClipRef::Name(name.to_string())
    }
}

impl From<String> for ClipRef {
    fn from(name: String) -> Self {
        ClipRef::Name(name)
    }
}

impl From<u32> for ClipRef {
    fn from(id: u32) -> Self {
        ClipRef::Id(id)
    }
}

pub fn cmd_clips_clear() -> String {
    "clips clear".into()
}

/// Build `clips add: name: X` or `clips add: clip id: N`.
pub fn cmd_clips_add(clip: &ClipRef) -> Result<String> {
    match clip {
        ClipRef::Name(name) => {
            if name.trim().is_empty() {
                return Err(Error::InvalidParameter("empty clip name".into()));
            }
            let line = format!("clips add: name: {name}");
            validate_line(&line)?;
            Ok(line)
        }
        ClipRef::Id(id) => Ok(format!("clips add: clip id: {id}")),
    }
}
