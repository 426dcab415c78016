//! Mock deck server for protocol-level testing over TCP.
//!
//! [`MockDeckServer`] listens on a random localhost port and runs a script
//! against the single client that connects: push bytes unprompted, wait for
//! an exact request and answer it, pause, or hang up. Once the script is
//! exhausted the server keeps reading (and discarding) until the client
//! disconnects, so a polite `quit` needs no expectation.
//!
//! # Example
//!
//! ```
//! use deckctl_test_harness::MockDeckServer;
//! use deckctl_test_harness::fixtures;
//!
//! # async fn example() -> deckctl_core::Result<()> {
//! let mut server = MockDeckServer::new().await?;
//! fixtures::script_handshake(&mut server);
//! server.expect_line("clips clear", b"200 ok\r\n");
//!
//! let addr = server.addr().to_string();
//! server.start();
//! // ... connect to `addr` and test ...
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use deckctl_core::error::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One step of the server script.
#[derive(Debug, Clone)]
enum Step {
    /// Read exactly `request`, then write `response`.
    Expect { request: Vec<u8>, response: Vec<u8> },
    /// Write bytes without waiting for the client.
    Push(Vec<u8>),
    /// Sleep before the next step.
    Pause(Duration),
    /// Close the connection.
    HangUp,
}

/// A scripted TCP server standing in for a deck.
pub struct MockDeckServer {
    addr: String,
    listener: Option<TcpListener>,
    steps: VecDeque<Step>,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockDeckServer {
    /// Bind a new server on a random localhost port.
    ///
    /// The listener is bound immediately, so a client may connect before
    /// [`start`](MockDeckServer::start) is called; the connection is
    /// accepted once the script starts.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock deck server: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            addr,
            listener: Some(listener),
            steps: VecDeque::new(),
            server_handle: None,
        })
    }

    /// Expect `request` from the client and answer with `response`.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.steps.push_back(Step::Expect {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Expect one command line (CRLF appended) and answer with `response`.
    pub fn expect_line(&mut self, command: &str, response: &[u8]) {
        self.expect(format!("{command}\r\n").as_bytes(), response);
    }

    /// Send `data` to the client at this point in the script.
    pub fn push(&mut self, data: &[u8]) {
        self.steps.push_back(Step::Push(data.to_vec()));
    }

    /// Sleep for `duration` at this point in the script.
    pub fn pause(&mut self, duration: Duration) {
        self.steps.push_back(Step::Pause(duration));
    }

    /// Close the connection at this point in the script.
    pub fn hang_up(&mut self) {
        self.steps.push_back(Step::HangUp);
    }

    /// The `host:port` address the server is listening on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Spawn the script. Calling `start` twice has no further effect.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let steps: Vec<Step> = self.steps.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (mut stream, peer) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;
            tracing::debug!(peer = %peer, steps = steps.len(), "mock deck accepted client");

            for (i, step) in steps.into_iter().enumerate() {
                match step {
                    Step::Expect { request, response } => {
                        read_exact_request(&mut stream, &request, i).await?;
                        write_all(&mut stream, &response, i).await?;
                    }
                    Step::Push(data) => write_all(&mut stream, &data, i).await?,
                    Step::Pause(duration) => tokio::time::sleep(duration).await,
                    Step::HangUp => {
                        let _ = stream.shutdown().await;
                        return Ok(());
                    }
                }
            }

            // Script done: drain until the client goes away.
            let mut sink = [0u8; 512];
            loop {
                match stream.read(&mut sink).await {
                    Ok(0) | Err(_) => return Ok(()),
                    Ok(_) => {}
                }
            }
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the script to finish and return any mismatch.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?,
            None => Ok(()),
        }
    }
}

async fn read_exact_request(
    stream: &mut TcpStream,
    request: &[u8],
    step: usize,
) -> std::result::Result<(), String> {
    let mut buf = vec![0u8; request.len()];
    let mut total_read = 0;

    while total_read < request.len() {
        let n = stream
            .read(&mut buf[total_read..])
            .await
            .map_err(|e| format!("step {}: read error: {}", step, e))?;
        if n == 0 {
            return Err(format!(
                "step {}: client disconnected after {} bytes (expected {:?})",
                step,
                total_read,
                String::from_utf8_lossy(request)
            ));
        }
        total_read += n;
    }

    if buf != request {
        return Err(format!(
            "step {}: request mismatch: expected {:?}, got {:?}",
            step,
            String::from_utf8_lossy(request),
            String::from_utf8_lossy(&buf)
        ));
    }
    Ok(())
}

async fn write_all(
    stream: &mut TcpStream,
    data: &[u8],
    step: usize,
) -> std::result::Result<(), String> {
    stream
        .write_all(data)
        .await
        .map_err(|e| format!("step {}: write error: {}", step, e))?;
    stream
        .flush()
        .await
        .map_err(|e| format!("step {}: flush error: {}", step, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_exchange_and_push() {
        let mut server = MockDeckServer::new().await.unwrap();
        server.push(b"500 connection info:\r\n\r\n");
        server.expect_line("stop", b"200 ok\r\n");
        let addr = server.addr().to_string();
        server.start();

        let mut client = TcpStream::connect(&addr).await.unwrap();
        let mut buf = [0u8; 64];
        let mut got = Vec::new();
        while !got.ends_with(b"\r\n\r\n") {
            let n = client.read(&mut buf).await.unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, b"500 connection info:\r\n\r\n");

        client.write_all(b"stop\r\n").await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"200 ok\r\n");

        drop(client);
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn mismatch_is_reported() {
        let mut server = MockDeckServer::new().await.unwrap();
        server.expect_line("stop", b"200 ok\r\n");
        let addr = server.addr().to_string();
        server.start();

        let mut client = TcpStream::connect(&addr).await.unwrap();
        client.write_all(b"play\r\n").await.unwrap();

        let err = server.wait().await.unwrap_err();
        assert!(err.contains("request mismatch"), "got: {err}");
    }

    #[tokio::test]
    async fn hang_up_closes_socket() {
        let mut server = MockDeckServer::new().await.unwrap();
        server.hang_up();
        let addr = server.addr().to_string();
        server.start();

        let mut client = TcpStream::connect(&addr).await.unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
        server.wait().await.unwrap();
    }
}
