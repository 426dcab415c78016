//! # deckctl -- Asynchronous control of broadcast disk recorders
//!
//! `deckctl` drives playout and record decks over their Ethernet control
//! protocol from async Rust. It keeps a live mirror of the deck's transport,
//! clip catalog and timeline, updated from push notifications, and exposes
//! commands both as `async` methods and as continuation-token calls for
//! single-threaded scripting hosts.
//!
//! ## Quick Start
//!
//! ```no_run
//! use deckctl::hyperdeck::{HyperDeck, PlayOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let deck = HyperDeck::connect("192.168.10.50").await?;
//!     println!("{} ({:?})", deck.model(), deck.status());
//!
//!     deck.clear_clips().await?;
//!     deck.add_clip("Intro.mov").await?;
//!     deck.play(&PlayOptions::new())?;
//!
//!     deck.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                  | Purpose                                          |
//! |------------------------|--------------------------------------------------|
//! | `deckctl-core`         | Errors, events, the `Transport` trait, continuations |
//! | `deckctl-transport`    | TCP transport                                    |
//! | `deckctl-hyperdeck`    | HyperDeck protocol client                        |
//! | **`deckctl`**          | This facade crate -- re-exports everything       |
//!
//! ## Feature Flags
//!
//! | Feature     | Enables                               | Default |
//! |-------------|---------------------------------------|---------|
//! | `hyperdeck` | [`hyperdeck`] module (port 9993 protocol) | yes |
//!
//! ## Event Subscription
//!
//! ```no_run
//! use deckctl::DeckEvent;
//! # async fn example(deck: &deckctl::hyperdeck::HyperDeck) {
//! let mut events = deck.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let DeckEvent::TimecodeChanged { timecode } = event {
//!         println!("{timecode}");
//!     }
//! }
//! # }
//! ```

pub use deckctl_core::*;

/// TCP transport ([`TcpTransport`](tcp::TcpTransport)).
pub mod tcp {
    pub use deckctl_transport::*;
}

/// HyperDeck Ethernet protocol backend.
///
/// Provides [`HyperDeck`](hyperdeck::HyperDeck),
/// [`HyperDeckBuilder`](hyperdeck::HyperDeckBuilder) and
/// [`HostBridge`](hyperdeck::HostBridge).
#[cfg(feature = "hyperdeck")]
pub mod hyperdeck {
    pub use deckctl_hyperdeck::*;
}
