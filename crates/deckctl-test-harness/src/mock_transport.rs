//! Mock transport for deterministic testing of the protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs plus a queue of unsolicited bytes, which is how a
//! deck's push notifications look from the client side.
//!
//! # Example
//!
//! ```
//! use deckctl_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! mock.push_unsolicited(b"500 connection info:\r\nmodel: HyperDeck Studio\r\n\r\n");
//! mock.expect_line("clips clear", b"200 ok\r\n");
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use deckctl_core::error::{Error, Result};
use deckctl_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

/// Shared record of every `send()` made through a [`MockTransport`].
///
/// Cloneable so a test can keep a handle after the transport has been moved
/// into an IO task.
#[derive(Debug, Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<Vec<u8>>>>);

impl SentLog {
    fn push(&self, data: &[u8]) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(data.to_vec());
    }

    /// Every send so far, decoded as text with the line terminator removed.
    pub fn lines(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|d| String::from_utf8_lossy(d).trim_end_matches("\r\n").to_string())
            .collect()
    }

    /// Number of sends recorded.
    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing has been sent yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A mock [`Transport`] for testing the protocol engine without a network.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation; the matching
/// response is returned by subsequent `receive()` calls. Unsolicited bytes
/// queued with [`push_unsolicited`](MockTransport::push_unsolicited) are
/// delivered before any pending response.
#[derive(Debug)]
pub struct MockTransport {
    expectations: VecDeque<Expectation>,
    unsolicited: VecDeque<Vec<u8>>,
    pending_response: Option<Vec<u8>>,
    response_cursor: usize,
    connected: bool,
    hang_up_when_idle: bool,
    max_chunk: usize,
    sent_log: SentLog,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            unsolicited: VecDeque::new(),
            pending_response: None,
            response_cursor: 0,
            connected: true,
            hang_up_when_idle: false,
            max_chunk: usize::MAX,
            sent_log: SentLog::default(),
        }
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Add an expectation for one command line; the CRLF is appended.
    pub fn expect_line(&mut self, command: &str, response: &[u8]) {
        self.expect(format!("{command}\r\n").as_bytes(), response);
    }

    /// Queue bytes the "device" sends without being asked.
    pub fn push_unsolicited(&mut self, data: &[u8]) {
        self.unsolicited.push_back(data.to_vec());
    }

    /// Report `ConnectionLost` once every queued byte has been read and no
    /// expectation is left, as if the peer closed the socket.
    pub fn hang_up_when_idle(&mut self) {
        self.hang_up_when_idle = true;
    }

    /// Limit how many bytes a single `receive()` returns, to exercise
    /// reassembly of lines split across reads.
    pub fn max_chunk(&mut self, n: usize) {
        self.max_chunk = n.max(1);
    }

    /// A handle onto the send log that outlives the transport's move.
    pub fn sent_log(&self) -> SentLog {
        self.sent_log.clone()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Set the connected state of the mock transport.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    fn copy_out(&self, src: &[u8], buf: &mut [u8]) -> usize {
        let n = src.len().min(buf.len()).min(self.max_chunk);
        buf[..n].copy_from_slice(&src[..n]);
        n
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        self.sent_log.push(data);

        let expectation = self
            .expectations
            .pop_front()
            .ok_or_else(|| Error::Protocol("no more expectations in mock transport".into()))?;

        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            )));
        }

        // A response still being read is delivered before the new one.
        match self.pending_response.take() {
            Some(mut rest) => {
                rest.drain(..self.response_cursor);
                rest.extend_from_slice(&expectation.response);
                self.pending_response = Some(rest);
            }
            None => self.pending_response = Some(expectation.response),
        }
        self.response_cursor = 0;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        if let Some(mut chunk) = self.unsolicited.pop_front() {
            let n = self.copy_out(&chunk, buf);
            if n < chunk.len() {
                chunk.drain(..n);
                self.unsolicited.push_front(chunk);
            }
            return Ok(n);
        }

        if let Some(response) = self.pending_response.take() {
            let remaining = &response[self.response_cursor..];
            if !remaining.is_empty() {
                let n = self.copy_out(remaining, buf);
                self.response_cursor += n;
                if self.response_cursor < response.len() {
                    self.pending_response = Some(response);
                } else {
                    self.response_cursor = 0;
                }
                return Ok(n);
            }
            self.response_cursor = 0;
        }

        if self.hang_up_when_idle && self.expectations.is_empty() {
            self.connected = false;
            return Err(Error::ConnectionLost);
        }

        Err(Error::Timeout)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending_response = None;
        self.response_cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn mock_transport_basic_send_receive() {
        let mut mock = MockTransport::new();
        mock.expect_line("clips clear", b"200 ok\r\n");

        mock.send(b"clips clear\r\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, T).await.unwrap();
        assert_eq!(&buf[..n], b"200 ok\r\n");
        assert!(matches!(mock.receive(&mut buf, T).await, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn unsolicited_data_comes_first() {
        let mut mock = MockTransport::new();
        mock.push_unsolicited(b"508 transport info:\r\n");
        mock.expect_line("stop", b"200 ok\r\n");
        mock.send(b"stop\r\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, T).await.unwrap();
        assert_eq!(&buf[..n], b"508 transport info:\r\n");
        let n = mock.receive(&mut buf, T).await.unwrap();
        assert_eq!(&buf[..n], b"200 ok\r\n");
    }

    #[tokio::test]
    async fn back_to_back_sends_queue_both_responses() {
        let mut mock = MockTransport::new();
        mock.expect_line("clips clear", b"200 ok\r\n");
        mock.expect_line("stop", b"200 ok\r\n");
        mock.send(b"clips clear\r\n").await.unwrap();
        mock.send(b"stop\r\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, T).await.unwrap();
        assert_eq!(&buf[..n], b"200 ok\r\n200 ok\r\n");
    }

    #[tokio::test]
    async fn max_chunk_splits_reads() {
        let mut mock = MockTransport::new();
        mock.max_chunk(3);
        mock.push_unsolicited(b"200 ok\r\n");

        let mut buf = [0u8; 64];
        let mut collected = Vec::new();
        while let Ok(n) = mock.receive(&mut buf, T).await {
            assert!(n <= 3);
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, b"200 ok\r\n");
    }

    #[tokio::test]
    async fn sent_log_survives_move() {
        let mut mock = MockTransport::new();
        mock.expect_line("play", b"");
        let log = mock.sent_log();

        let mut boxed: Box<dyn Transport> = Box::new(mock);
        boxed.send(b"play\r\n").await.unwrap();
        assert_eq!(log.lines(), vec!["play".to_string()]);
    }

    #[tokio::test]
    async fn wrong_data_and_exhaustion_error() {
        let mut mock = MockTransport::new();
        mock.expect_line("stop", b"200 ok\r\n");
        assert!(matches!(
            mock.send(b"play\r\n").await,
            Err(Error::Protocol(_))
        ));
        assert!(matches!(
            mock.send(b"play\r\n").await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn hang_up_reports_connection_lost_after_drain() {
        let mut mock = MockTransport::new();
        mock.push_unsolicited(b"200 ok\r\n");
        mock.hang_up_when_idle();

        let mut buf = [0u8; 64];
        assert!(mock.receive(&mut buf, T).await.is_ok());
        assert!(matches!(
            mock.receive(&mut buf, T).await,
            Err(Error::ConnectionLost)
        ));
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn closed_mock_rejects_io() {
        let mut mock = MockTransport::new();
        mock.close().await.unwrap();
        assert!(!mock.is_connected());
        assert!(matches!(
            mock.send(b"stop\r\n").await,
            Err(Error::NotConnected)
        ));
    }
}
