//! Asynchronous device event types.
//!
//! Events are emitted through a [`tokio::sync::broadcast`] channel each time
//! a status block is committed into the device state, plus connection
//! lifecycle transitions. Playout automation and monitoring UIs subscribe to
//! these instead of polling the state accessors.

use crate::types::TransportStatus;

/// An event emitted when device state changes.
///
/// Delivered best-effort through a bounded broadcast channel; a slow
/// subscriber may observe `RecvError::Lagged` and miss intermediate events.
#[derive(Debug, Clone, PartialEq)]
pub enum DeckEvent {
    /// The TCP connection is established.
    Connected,

    /// The device finished its connection handshake block.
    Ready,

    /// A transport info block was committed.
    TransportChanged {
        /// Status after the update.
        status: TransportStatus,
    },

    /// The playhead timecode changed.
    TimecodeChanged {
        /// New timecode, `HH:MM:SS:FF`.
        timecode: String,
    },

    /// The display timecode changed.
    DisplayTimecodeChanged {
        /// New display timecode, `HH:MM:SS:FF`.
        timecode: String,
    },

    /// The disk clip catalog was replaced or updated.
    ClipListChanged {
        /// Number of clips now in the catalog.
        count: usize,
    },

    /// The playback timeline's clip list was replaced.
    TimelineChanged {
        /// Number of clips on the timeline.
        clips: usize,
    },

    /// Model, protocol version or slot information changed.
    DeviceInfoChanged,

    /// The connection was closed or lost.
    Disconnected,
}
