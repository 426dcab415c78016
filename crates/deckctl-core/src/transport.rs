//! Transport trait for device communication.
//!
//! The [`Transport`] trait abstracts over the byte stream to a deck. The
//! production implementation is `TcpTransport` in `deckctl-transport`;
//! tests use `MockTransport` from `deckctl-test-harness` so the protocol
//! engine can be driven deterministically.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a device.
///
/// Line framing and protocol parsing happen above this trait. A transport
/// only moves bytes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes, returning once all of them are written.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes into `buf`.
    ///
    /// Returns the number of bytes read. Waits up to `timeout`; returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if nothing arrives and
    /// [`Error::ConnectionLost`](crate::error::Error::ConnectionLost) once the
    /// peer has closed the connection.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport. Closing twice is not an error.
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
