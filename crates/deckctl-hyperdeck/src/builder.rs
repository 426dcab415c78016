//! HyperDeckBuilder -- fluent builder for connecting [`HyperDeck`] handles.
//!
//! Separates configuration from construction so that callers can set the
//! port, timeouts and startup behavior before the socket is opened.
//!
//! # Example
//!
//! ```no_run
//! use deckctl_hyperdeck::HyperDeckBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> deckctl_core::Result<()> {
//! let deck = HyperDeckBuilder::new()
//!     .host("192.168.10.50")
//!     .connect_timeout(Duration::from_secs(2))
//!     .command_timeout(Duration::from_secs(1))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::net::Ipv6Addr;
use std::time::Duration;

use deckctl_core::error::{Error, Result};
use deckctl_core::transport::Transport;

use crate::device::HyperDeck;
use crate::state::SharedState;

/// TCP control port of HyperDeck recorders.
pub const DEFAULT_PORT: u16 = 9993;

/// Connection and startup settings.
#[derive(Debug, Clone)]
pub struct DeckOptions {
    /// Port appended to addresses that do not carry one.
    pub port: u16,
    /// Bound on the TCP connect and, separately, on the initial query batch.
    pub connect_timeout: Duration,
    /// Optional deadline for the async command methods. The protocol has
    /// none of its own.
    pub command_timeout: Option<Duration>,
    /// Subscribe to transport, slot, display timecode and timeline
    /// position notifications on connect.
    pub notifications: bool,
    /// Query device info, transport info, the timeline and the disk list on
    /// connect.
    pub initial_queries: bool,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// How long one idle read waits before the IO task re-checks requests.
    pub read_poll: Duration,
}

impl Default for DeckOptions {
    fn default() -> Self {
        DeckOptions {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            command_timeout: None,
            notifications: true,
            initial_queries: true,
            event_capacity: 256,
            read_poll: Duration::from_millis(100),
        }
    }
}

/// Fluent builder for [`HyperDeck`].
///
/// Only the host is required:
///
/// ```ignore
/// let deck = HyperDeckBuilder::new().host("deck-a.local").build().await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct HyperDeckBuilder {
    host: Option<String>,
    options: DeckOptions,
}

impl HyperDeckBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device address: `host`, `host:port`, `[v6]:port` or a bare IPv6
    /// literal.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = Some(timeout);
        self
    }

    pub fn notifications(mut self, enabled: bool) -> Self {
        self.options.notifications = enabled;
        self
    }

    pub fn initial_queries(mut self, enabled: bool) -> Self {
        self.options.initial_queries = enabled;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.options.event_capacity = capacity.max(1);
        self
    }

    /// Replace every setting at once.
    pub fn options(mut self, options: DeckOptions) -> Self {
        self.options = options;
        self
    }

    /// Start a session over an already connected transport.
    ///
    /// Used with mock transports in tests, or with a transport the caller
    /// connected itself.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<HyperDeck> {
        let addr = self
            .host
            .as_deref()
            .map(|h| socket_address(h, self.options.port))
            .transpose()?;
        HyperDeck::start(transport, addr, &self.options, SharedState::default()).await
    }

    /// Resolve and connect to the configured host.
    pub async fn build(self) -> Result<HyperDeck> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| Error::InvalidParameter("host is required for build()".into()))?;
        HyperDeck::connect_with_options(host, &self.options).await
    }
}

/// Normalize a user-supplied address to `host:port`, appending
/// `default_port` when none is given.
pub fn socket_address(host: &str, default_port: u16) -> Result<String> {
    let host = host.trim();
    let invalid = || Error::InvalidParameter(format!("invalid address: {host:?}"));

    if host.is_empty() {
        return Err(Error::InvalidParameter("host is required".into()));
    }

    if let Some(rest) = host.strip_prefix('[') {
        let (ip, port) = rest.split_once(']').ok_or_else(invalid)?;
        ip.parse::<Ipv6Addr>().map_err(|_| invalid())?;
        return match port {
            "" => Ok(format!("[{ip}]:{default_port}")),
            p => {
                let p = p.strip_prefix(':').ok_or_else(invalid)?;
                p.parse::<u16>().map_err(|_| invalid())?;
                Ok(host.to_string())
            }
        };
    }

    if host.parse::<Ipv6Addr>().is_ok() {
        return Ok(format!("[{host}]:{default_port}"));
    }

    match host.rsplit_once(':') {
        Some((name, port)) => {
            if name.is_empty() || port.parse::<u16>().is_err() {
                return Err(invalid());
            }
            Ok(host.to_string())
        }
        None => Ok(format!("{host}:{default_port}")),
    }
}
