//! deckctl-test-harness: Test utilities for deckctl.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the protocol engine without a network, [`MockDeckServer`] for end-to-end
//! tests over a real localhost socket, and canned protocol [`fixtures`].

pub mod fixtures;
pub mod mock_tcp;
pub mod mock_transport;

pub use mock_tcp::MockDeckServer;
pub use mock_transport::{MockTransport, SentLog};
