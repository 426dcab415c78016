//! Per-topic block parsers.
//!
//! One [`BlockParser`] variant exists per [`ReadState`] other than `None`.
//! Each carries its own scratch accumulator, seeded from the committed
//! [`DeckState`] in [`start`](BlockParser::start), fed lines through
//! [`process_line`](BlockParser::process_line), and written back in
//! [`finish`](BlockParser::finish). A line that does not parse is logged and
//! skipped; it never aborts the block.

use deckctl_core::events::DeckEvent;
use deckctl_core::types::TransportStatus;
use tracing::{debug, trace, warn};

use crate::protocol::{ReadState, is_timecode, parse_bool, split_field};
use crate::state::{
    ClipEntry, ClipInfo, ClipTimelineInfo, DeckState, DeviceInfo, TransportInfo,
};

/// The parser for the block currently being received.
#[derive(Debug)]
pub enum BlockParser {
    TransportInfo(TransportScratch),
    ClipsInfo(ClipListScratch<ClipTimelineInfo>),
    ConnectionInfo(ConnectionScratch),
    DeviceInfo(DeviceScratch),
    TimelinePosition(PositionScratch),
    DisplayTimecode(DisplayScratch),
    DiskList(ClipListScratch<ClipInfo>),
}

impl BlockParser {
    /// Begin a block for `read_state`. Returns `None` for [`ReadState::None`].
    pub fn start(read_state: ReadState, state: &DeckState) -> Option<Self> {
        let parser = match read_state {
            ReadState::None => return None,
            ReadState::TransportInfo => BlockParser::TransportInfo(TransportScratch::seed(state)),
            ReadState::ClipsInfo => {
                BlockParser::ClipsInfo(ClipListScratch::new(&state.timeline.clips))
            }
            ReadState::ConnectionInfo => BlockParser::ConnectionInfo(ConnectionScratch::default()),
            ReadState::DeviceInfo => BlockParser::DeviceInfo(DeviceScratch::default()),
            ReadState::TimelinePosition => {
                BlockParser::TimelinePosition(PositionScratch::default())
            }
            ReadState::DisplayTimecode => BlockParser::DisplayTimecode(DisplayScratch::default()),
            ReadState::DiskList => BlockParser::DiskList(ClipListScratch::new(&state.device.clips)),
        };
        debug!(topic = ?read_state, "block started");
        Some(parser)
    }

    /// The state this parser represents.
    pub fn read_state(&self) -> ReadState {
        match self {
            BlockParser::TransportInfo(_) => ReadState::TransportInfo,
            BlockParser::ClipsInfo(_) => ReadState::ClipsInfo,
            BlockParser::ConnectionInfo(_) => ReadState::ConnectionInfo,
            BlockParser::DeviceInfo(_) => ReadState::DeviceInfo,
            BlockParser::TimelinePosition(_) => ReadState::TimelinePosition,
            BlockParser::DisplayTimecode(_) => ReadState::DisplayTimecode,
            BlockParser::DiskList(_) => ReadState::DiskList,
        }
    }

    /// Feed one non-empty line of the block.
    pub fn process_line(&mut self, line: &str) {
        let topic = self.read_state();
        let Some((key, value)) = split_field(line) else {
            warn!(?topic, line, "skipping line without key");
            return;
        };

        let accepted = match self {
            BlockParser::TransportInfo(s) => s.apply(key, value),
            BlockParser::ClipsInfo(s) => s.apply(key, value, parse_timeline_clip),
            BlockParser::ConnectionInfo(s) => s.apply(key, value),
            BlockParser::DeviceInfo(s) => s.apply(key, value),
            BlockParser::TimelinePosition(s) => s.apply(key, value),
            BlockParser::DisplayTimecode(s) => s.apply(key, value),
            BlockParser::DiskList(s) => s.apply(key, value, parse_disk_clip),
        };

        match accepted {
            Field::Applied => {}
            Field::Unknown => trace!(?topic, key, "ignoring unknown key"),
            Field::Malformed => warn!(?topic, line, "skipping malformed line"),
        }
    }

    /// Commit the block into `state`, appending the resulting events.
    pub fn finish(self, state: &mut DeckState, events: &mut Vec<DeckEvent>) {
        debug!(topic = ?self.read_state(), "block finished");
        match self {
            BlockParser::TransportInfo(s) => s.commit(state, events),
            BlockParser::ClipsInfo(s) => {
                state.timeline.clips = s.into_entries();
                events.push(DeckEvent::TimelineChanged {
                    clips: state.timeline.clips.len(),
                });
            }
            BlockParser::ConnectionInfo(s) => s.commit(state, events),
            BlockParser::DeviceInfo(s) => s.commit(state, events),
            BlockParser::TimelinePosition(s) => s.commit(state, events),
            BlockParser::DisplayTimecode(s) => s.commit(state, events),
            BlockParser::DiskList(s) => {
                state.device.clips = s.into_entries();
                events.push(DeckEvent::ClipListChanged {
                    count: state.device.clips.len(),
                });
            }
        }
    }
}

/// What a scratch accumulator did with one `key: value` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Applied,
    Unknown,
    Malformed,
}

fn set<T>(slot: &mut T, parsed: Option<T>) -> Field {
    match parsed {
        Some(v) => {
            *slot = v;
            Field::Applied
        }
        None => Field::Malformed,
    }
}

// ---------------------------------------------------------------------------
// Transport info
// ---------------------------------------------------------------------------

/// Accumulator for `transport info` blocks.
///
/// Push notifications carry only the fields that changed, so the scratch
/// starts as a copy of the committed values.
#[derive(Debug)]
pub struct TransportScratch {
    transport: TransportInfo,
    timecode: String,
    position: u64,
    speed: i32,
    looping: bool,
    active_clip: Option<u32>,
}

impl TransportScratch {
    fn seed(state: &DeckState) -> Self {
        TransportScratch {
            transport: state.transport.clone(),
            timecode: state.timeline.timecode.clone(),
            position: state.timeline.position,
            speed: state.timeline.speed,
            looping: state.timeline.looping,
            active_clip: state.timeline.active_clip,
        }
    }

    fn apply(&mut self, key: &str, value: &str) -> Field {
        let t = &mut self.transport;
        match key {
            "status" => set(&mut t.status, value.parse::<TransportStatus>().ok()),
            "speed" => set(&mut self.speed, value.parse().ok()),
            "slot id" => set(&mut t.slot_id, optional(value, |v| v.parse().ok())),
            "slot name" => set(&mut t.slot_name, optional(value, |v| Some(v.to_string()))),
            "device name" => set(&mut t.device_name, Some(Some(value.to_string()))),
            "clip id" => {
                let parsed = optional(value, |v| v.parse().ok());
                self.active_clip = parsed.unwrap_or(self.active_clip);
                set(&mut t.clip_id, parsed)
            }
            "single clip" => set(&mut t.single_clip, parse_bool(value).map(Some)),
            "display timecode" => set(&mut t.display_timecode, Some(Some(value.to_string()))),
            "timecode" => {
                self.timecode = value.to_string();
                set(&mut t.timecode, Some(Some(value.to_string())))
            }
            "video format" => set(&mut t.video_format, optional(value, |v| Some(v.to_string()))),
            "loop" => set(&mut self.looping, parse_bool(value)),
            "timeline" => set(&mut self.position, value.parse().ok()),
            _ => Field::Unknown,
        }
    }

    fn commit(self, state: &mut DeckState, events: &mut Vec<DeckEvent>) {
        let timecode_changed = state.timeline.timecode != self.timecode;
        let display_changed = state.transport.display_timecode != self.transport.display_timecode;

        state.transport = self.transport;
        state.timeline.timecode = self.timecode;
        state.timeline.position = self.position;
        state.timeline.speed = self.speed;
        state.timeline.looping = self.looping;
        state.timeline.active_clip = self.active_clip;

        events.push(DeckEvent::TransportChanged {
            status: state.transport.status,
        });
        if timecode_changed {
            events.push(DeckEvent::TimecodeChanged {
                timecode: state.timeline.timecode.clone(),
            });
        }
        if let (true, Some(tc)) = (display_changed, &state.transport.display_timecode) {
            events.push(DeckEvent::DisplayTimecodeChanged {
                timecode: tc.clone(),
            });
        }
    }
}

/// `none` is how the deck spells an absent optional value.
fn optional<T>(value: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<Option<T>> {
    if value == "none" {
        Some(None)
    } else {
        parse(value).map(Some)
    }
}

// ---------------------------------------------------------------------------
// Connection info (handshake)
// ---------------------------------------------------------------------------

/// Accumulator for the `connection info` greeting.
#[derive(Debug, Default)]
pub struct ConnectionScratch {
    protocol_version: Option<String>,
    model: Option<String>,
}

impl ConnectionScratch {
    fn apply(&mut self, key: &str, value: &str) -> Field {
        match key {
            "protocol version" => set(&mut self.protocol_version, Some(Some(value.to_string()))),
            "model" => set(&mut self.model, Some(Some(value.to_string()))),
            _ => Field::Unknown,
        }
    }

    fn commit(self, state: &mut DeckState, events: &mut Vec<DeckEvent>) {
        if let Some(v) = self.protocol_version {
            state.device.protocol_version = v;
        }
        if let Some(m) = self.model {
            state.device.model = m;
        }
        events.push(DeckEvent::DeviceInfoChanged);
        if !state.ready {
            state.ready = true;
            events.push(DeckEvent::Ready);
        }
    }
}

// ---------------------------------------------------------------------------
// Device info
// ---------------------------------------------------------------------------

/// Accumulator for `device info` blocks. Only the fields present overwrite
/// the committed identity; the clip catalog is untouched.
#[derive(Debug, Default)]
pub struct DeviceScratch {
    protocol_version: Option<String>,
    model: Option<String>,
    unique_id: Option<String>,
    slot_count: Option<u32>,
    software_version: Option<String>,
    name: Option<String>,
}

impl DeviceScratch {
    fn apply(&mut self, key: &str, value: &str) -> Field {
        let text = Some(Some(value.to_string()));
        match key {
            "protocol version" => set(&mut self.protocol_version, text),
            "model" => set(&mut self.model, text),
            "unique id" => set(&mut self.unique_id, text),
            "slot count" => set(&mut self.slot_count, value.parse().ok().map(Some)),
            "software version" => set(&mut self.software_version, text),
            "name" => set(&mut self.name, text),
            _ => Field::Unknown,
        }
    }

    fn commit(self, state: &mut DeckState, events: &mut Vec<DeckEvent>) {
        let d: &mut DeviceInfo = &mut state.device;
        if let Some(v) = self.protocol_version {
            d.protocol_version = v;
        }
        if let Some(v) = self.model {
            d.model = v;
        }
        if let Some(v) = self.unique_id {
            d.unique_id = v;
        }
        if let Some(v) = self.slot_count {
            d.slot_count = v;
        }
        if let Some(v) = self.software_version {
            d.software_version = v;
        }
        if let Some(v) = self.name {
            d.name = v;
        }
        events.push(DeckEvent::DeviceInfoChanged);
    }
}

// ---------------------------------------------------------------------------
// Timeline position / display timecode notifications
// ---------------------------------------------------------------------------

/// Accumulator for `timeline position` notifications.
#[derive(Debug, Default)]
pub struct PositionScratch {
    position: Option<u64>,
    timecode: Option<String>,
}

impl PositionScratch {
    fn apply(&mut self, key: &str, value: &str) -> Field {
        match key {
            "timeline" => set(&mut self.position, value.parse().ok().map(Some)),
            "timecode" => set(&mut self.timecode, Some(Some(value.to_string()))),
            _ => Field::Unknown,
        }
    }

    fn commit(self, state: &mut DeckState, events: &mut Vec<DeckEvent>) {
        if let Some(p) = self.position {
            state.timeline.position = p;
        }
        if let Some(tc) = self.timecode {
            if tc != state.timeline.timecode {
                state.timeline.timecode = tc.clone();
                state.transport.timecode = Some(tc.clone());
                events.push(DeckEvent::TimecodeChanged { timecode: tc });
            }
        }
    }
}

/// Accumulator for `display timecode` notifications.
#[derive(Debug, Default)]
pub struct DisplayScratch {
    display_timecode: Option<String>,
}

impl DisplayScratch {
    fn apply(&mut self, key: &str, value: &str) -> Field {
        match key {
            "display timecode" => set(&mut self.display_timecode, Some(Some(value.to_string()))),
            _ => Field::Unknown,
        }
    }

    fn commit(self, state: &mut DeckState, events: &mut Vec<DeckEvent>) {
        if let Some(tc) = self.display_timecode {
            state.transport.display_timecode = Some(tc.clone());
            events.push(DeckEvent::DisplayTimecodeChanged { timecode: tc });
        }
    }
}

// ---------------------------------------------------------------------------
// Clip lists (disk list, clips info)
// ---------------------------------------------------------------------------

/// Accumulator shared by the two clip-list topics.
///
/// `update type: snapshot` (or no update type at all) means the block is the
/// complete list. Any other update type means the block carries only changed
/// entries, which are upserted by clip id into the committed list. The
/// marker may appear anywhere in the block.
#[derive(Debug)]
pub struct ClipListScratch<T> {
    committed: Vec<T>,
    received: Vec<T>,
    incremental: bool,
}

impl<T: ClipEntry> ClipListScratch<T> {
    fn new(committed: &[T]) -> Self {
        ClipListScratch {
            committed: committed.to_vec(),
            received: Vec::new(),
            incremental: false,
        }
    }

    fn apply(&mut self, key: &str, value: &str, parse: fn(u32, &str) -> Option<T>) -> Field {
        if key.bytes().all(|b| b.is_ascii_digit()) {
            let Some(entry) = key.parse().ok().and_then(|id| parse(id, value)) else {
                return Field::Malformed;
            };
            upsert(&mut self.received, entry);
            return Field::Applied;
        }

        match key {
            "update type" => {
                self.incremental = value != "snapshot";
                Field::Applied
            }
            // Informational; the clip lines themselves are authoritative.
            "clip count" | "slot id" => Field::Applied,
            _ => Field::Unknown,
        }
    }

    fn into_entries(self) -> Vec<T> {
        if !self.incremental {
            return self.received;
        }
        let mut entries = self.committed;
        for entry in self.received {
            upsert(&mut entries, entry);
        }
        entries
    }
}

fn upsert<T: ClipEntry>(entries: &mut Vec<T>, entry: T) {
    match entries.iter_mut().find(|e| e.clip_id() == entry.clip_id()) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

/// `<name> <format> <video format> [<start tc>] <duration>`, split from the
/// right so names may contain spaces.
fn parse_disk_clip(id: u32, value: &str) -> Option<ClipInfo> {
    let mut fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() < 4 {
        return None;
    }
    let duration = fields.pop()?.to_string();
    let timecode = if fields.len() >= 4 && fields.last().is_some_and(|tc| is_timecode(tc)) {
        fields.pop().map(str::to_string)
    } else {
        None
    };
    let video_format = fields.pop()?.to_string();
    let format = fields.pop()?.to_string();
    let name = fields.join(" ");
    if name.is_empty() {
        return None;
    }

    Some(ClipInfo {
        id,
        name,
        format,
        video_format,
        duration,
        timecode,
    })
}

/// `<name> <start tc> <duration>`, split from the right.
fn parse_timeline_clip(id: u32, value: &str) -> Option<ClipTimelineInfo> {
    let mut fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }
    let duration = fields.pop()?.to_string();
    let start_timecode = fields.pop()?.to_string();
    let name = fields.join(" ");
    if name.is_empty() {
        return None;
    }

    Some(ClipTimelineInfo {
        id,
        name,
        start_timecode,
        duration,
    })
}
