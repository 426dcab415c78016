//! HyperDeck Ethernet protocol client for deckctl.
//!
//! This crate implements the line-oriented text protocol spoken by
//! HyperDeck disk recorders on TCP port 9993. It provides:
//!
//! - **Framing and headers** ([`protocol`]) -- CRLF line framing, response
//!   codes, header parsing and the topic table.
//! - **Topic parsers** ([`parsers`]) -- one accumulator per multi-line
//!   block (transport info, clips info, connection info, device info,
//!   timeline position, display timecode, disk list).
//! - **Block dispatcher** ([`dispatcher`]) -- the per-line state machine
//!   that routes headers, block bodies and terminators.
//! - **Response correlator** ([`correlator`]) -- FIFO matching of command
//!   outcomes to waiting callers.
//! - **Device state** ([`state`]) -- the aggregate the parsers commit into.
//! - **Command builders** ([`commands`]) -- `play`, `goto`, `clips add` and
//!   friends.
//! - **IO task** ([`io`]) -- the single task that owns the socket.
//! - **Device handle** ([`device`]) and **builder** ([`builder`]).
//! - **Host bridge** ([`host`]) -- the same surface for hosts that resume
//!   suspended callers through continuation tokens.
//!
//! # Protocol shape
//!
//! Every reply or notification starts with a header line
//! `<3-digit code> <text>[:]`. A trailing colon announces a block of
//! `key: value` lines closed by an empty line. Replies arrive in command
//! order and carry no request id, so outcomes are matched to commands
//! purely by position; `5xx` topic blocks are push notifications and never
//! consume a waiting caller.
//!
//! # Example
//!
//! ```no_run
//! use deckctl_hyperdeck::{HyperDeck, PlayOptions};
//!
//! # async fn example() -> deckctl_core::Result<()> {
//! let deck = HyperDeck::connect("192.168.10.50").await?;
//! println!("{} has {} clips", deck.model(), deck.clips().len());
//!
//! deck.clear_clips().await?;
//! deck.add_clip("Intro.mov").await?;
//! deck.play(&PlayOptions::new().looping(true))?;
//!
//! deck.close().await;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod commands;
pub mod correlator;
pub mod device;
pub mod dispatcher;
pub mod host;
pub mod io;
pub mod parsers;
pub mod protocol;
pub mod state;

pub use builder::{DeckOptions, HyperDeckBuilder};
pub use commands::{ClipRef, GotoTarget, PlayOptions};
pub use device::HyperDeck;
pub use host::HostBridge;
pub use protocol::{CommandReply, ReadState, ResponseCode};
pub use state::{ClipInfo, ClipTimelineInfo, DeckState, DeviceInfo, TimelineInfo, TransportInfo};
