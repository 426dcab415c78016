//! deckctl-core: Core traits, types, and error definitions for deckctl.
//!
//! This crate holds the device-agnostic pieces that the protocol driver and
//! its consumers share, so applications can depend on these types without
//! pulling in a specific driver.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`DeckEvent`] -- asynchronous state change notifications
//! - [`Continuation`] -- resume handle for a suspended caller
//! - [`Error`] / [`Result`] -- error handling

pub mod continuation;
pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use continuation::{BoxContinuation, Continuation, Resumption};
pub use error::{Error, Result};
pub use events::DeckEvent;
pub use transport::Transport;
pub use types::*;
