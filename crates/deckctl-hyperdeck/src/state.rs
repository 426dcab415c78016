//! Cached deck state built from status blocks.
//!
//! The deck pushes transport, timecode and clip changes after the notify
//! subscription, so accessors read these cached values instead of querying.
//! Each block parser accumulates privately and writes here only when its
//! block terminates; a half-received block never shows up in a
//! [`DeckState`].

use std::sync::{Arc, Mutex, MutexGuard};

use deckctl_core::types::{ConnectionState, TransportStatus};
use tracing::debug;

/// Complete cached state of one deck connection.
///
/// Shared between the IO task, which is the only writer, and the
/// [`HyperDeck`](crate::device::HyperDeck) accessors.
#[derive(Debug, Clone, Default)]
pub struct DeckState {
    /// Socket lifecycle.
    pub connection: ConnectionState,
    /// Set once the `connection info` handshake block has finished.
    pub ready: bool,
    /// Latest transport status.
    pub transport: TransportInfo,
    /// Identity and disk clip catalog.
    pub device: DeviceInfo,
    /// Playhead and timeline clip list.
    pub timeline: TimelineInfo,
}

impl DeckState {
    /// Move to `next`, logging the transition.
    pub fn set_connection(&mut self, next: ConnectionState) {
        if self.connection != next {
            debug!(from = %self.connection, to = %next, "connection state");
            self.connection = next;
        }
    }

    /// Display name, preferring the identity block over transport info.
    pub fn name(&self) -> Option<&str> {
        if !self.device.name.is_empty() {
            Some(&self.device.name)
        } else {
            self.transport.device_name.as_deref()
        }
    }
}

/// Transport status block contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportInfo {
    pub status: TransportStatus,
    pub slot_id: Option<u32>,
    pub slot_name: Option<String>,
    pub device_name: Option<String>,
    pub clip_id: Option<u32>,
    pub single_clip: Option<bool>,
    pub display_timecode: Option<String>,
    pub timecode: Option<String>,
    pub video_format: Option<String>,
}

/// Device identity plus the clip catalog of the active disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub model: String,
    pub protocol_version: String,
    pub unique_id: String,
    pub slot_count: u32,
    pub software_version: String,
    pub name: String,
    /// Clips on the disk, in the order the deck listed them.
    pub clips: Vec<ClipInfo>,
}

/// One clip from a `disk list` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipInfo {
    pub id: u32,
    pub name: String,
    /// Container/codec, e.g. `ProRes` or `QuickTimeDNxHD`.
    pub format: String,
    /// Raster and rate, e.g. `1080p60`.
    pub video_format: String,
    /// Clip length as `HH:MM:SS:FF`.
    pub duration: String,
    /// Start timecode, when the deck reports one.
    pub timecode: Option<String>,
}

/// Playhead state and the clips loaded on the playback timeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineInfo {
    pub timecode: String,
    /// Frame position on the timeline.
    pub position: u64,
    /// Playback speed in percent of normal; negative is reverse.
    pub speed: i32,
    pub looping: bool,
    pub active_clip: Option<u32>,
    pub clips: Vec<ClipTimelineInfo>,
}

/// One clip from a `clips info` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipTimelineInfo {
    pub id: u32,
    pub name: String,
    pub start_timecode: String,
    pub duration: String,
}

/// Something with a clip id, so list blocks can upsert by id.
pub trait ClipEntry: Clone {
    fn clip_id(&self) -> u32;
}

impl ClipEntry for ClipInfo {
    fn clip_id(&self) -> u32 {
        self.id
    }
}

impl ClipEntry for ClipTimelineInfo {
    fn clip_id(&self) -> u32 {
        self.id
    }
}

/// State handle shared between the IO task and accessors.
pub type SharedState = Arc<Mutex<DeckState>>;

/// Lock the shared state.
///
/// Nothing holding the lock can panic halfway through a mutation that
/// matters, so a poisoned lock is recovered rather than propagated.
pub fn lock(state: &SharedState) -> MutexGuard<'_, DeckState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}
