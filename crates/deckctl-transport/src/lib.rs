//! Transport implementations for deckctl.
//!
//! Decks are controlled over a plain TCP socket, so this crate provides a
//! single [`Transport`](deckctl_core::Transport) implementation:
//!
//! - [`TcpTransport`]: a resolved, connected `tokio::net::TcpStream`
//!
//! # Example
//!
//! ```no_run
//! use deckctl_transport::TcpTransport;
//! use deckctl_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> deckctl_core::Result<()> {
//! let mut transport = TcpTransport::connect("192.168.10.50:9993").await?;
//! transport.send(b"device info\r\n").await?;
//!
//! let mut buf = [0u8; 1024];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod tcp;

pub use tcp::TcpTransport;
