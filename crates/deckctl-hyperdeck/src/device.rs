//! HyperDeck -- a connected disk recorder.
//!
//! [`HyperDeck`] is a cheap, cloneable handle onto one control session. The
//! session itself lives in the IO task ([`crate::io`]); the handle queues
//! command lines to it and reads the shared [`DeckState`] the task keeps
//! current from replies and push notifications.
//!
//! Commands come in two shapes. Queue-editing commands (`clips clear`,
//! `clips add`) and queries are *confirmable*: the caller waits for the
//! device's outcome. Transport commands (`play`, `stop`, `goto`) are fire
//! and forget; their effect shows up later as a transport notification.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use deckctl_core::continuation::{self, BoxContinuation, Resumption};
use deckctl_core::error::{Error, Result};
use deckctl_core::events::DeckEvent;
use deckctl_core::transport::Transport;
use deckctl_core::types::{ConnectionState, TransportStatus};
use deckctl_transport::TcpTransport;

use crate::builder::{DeckOptions, socket_address};
use crate::commands::{self, ClipRef, GotoTarget, PlayOptions};
use crate::io::{DeckIo, IoConfig, spawn_io_task};
use crate::protocol::CommandReply;
use crate::state::{
    ClipInfo, DeckState, DeviceInfo, SharedState, TimelineInfo, TransportInfo, lock,
};

/// A connected HyperDeck.
///
/// Constructed via [`HyperDeck::connect`] or
/// [`HyperDeckBuilder`](crate::builder::HyperDeckBuilder). Clones share the
/// same session; the session ends on [`close`](HyperDeck::close) or when the
/// last clone is dropped.
#[derive(Clone)]
pub struct HyperDeck {
    inner: Arc<Inner>,
}

struct Inner {
    io: DeckIo,
    state: SharedState,
    event_tx: broadcast::Sender<DeckEvent>,
    command_timeout: Option<Duration>,
    addr: Option<String>,
}

impl HyperDeck {
    // -----------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------

    /// Connect with default options.
    ///
    /// `address` may be `host`, `host:port`, `[v6]:port` or a bare IPv6
    /// literal; port 9993 is used when none is given. Returns once the
    /// notification subscription and the initial status queries have been
    /// answered, so the accessors already reflect the device.
    pub async fn connect(address: &str) -> Result<HyperDeck> {
        Self::connect_with_options(address, &DeckOptions::default()).await
    }

    /// Connect with explicit options.
    pub async fn connect_with_options(address: &str, options: &DeckOptions) -> Result<HyperDeck> {
        let addr = socket_address(address, options.port)?;
        let state = SharedState::default();
        lock(&state).set_connection(ConnectionState::Connecting);

        info!(addr = %addr, "connecting to deck");
        let transport = match TcpTransport::connect_with_timeout(&addr, options.connect_timeout)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                lock(&state).set_connection(ConnectionState::Error);
                warn!(addr = %addr, error = %e, "deck connect failed");
                return Err(e);
            }
        };

        Self::start(Box::new(transport), Some(addr), options, state).await
    }

    /// Start a session over a connected transport and run the startup
    /// batch.
    pub(crate) async fn start(
        transport: Box<dyn Transport>,
        addr: Option<String>,
        options: &DeckOptions,
        state: SharedState,
    ) -> Result<HyperDeck> {
        lock(&state).set_connection(ConnectionState::Connected);

        let (event_tx, _) = broadcast::channel(options.event_capacity.max(1));
        let _ = event_tx.send(DeckEvent::Connected);

        let io = spawn_io_task(
            transport,
            IoConfig {
                read_poll: options.read_poll,
                ..IoConfig::default()
            },
            Arc::clone(&state),
            event_tx.clone(),
        );

        let deck = HyperDeck {
            inner: Arc::new(Inner {
                io,
                state,
                event_tx,
                command_timeout: options.command_timeout,
                addr,
            }),
        };

        if let Err(e) = deck.initialize(options).await {
            warn!(addr = deck.log_addr(), error = %e, "deck startup failed");
            deck.close().await;
            return Err(e);
        }

        info!(
            addr = deck.log_addr(),
            model = %deck.model(),
            clips = deck.clips().len(),
            "deck connected"
        );
        Ok(deck)
    }

    /// Send the subscription and the initial queries together, then wait for
    /// all of them. A query the device refuses is logged and skipped.
    async fn initialize(&self, options: &DeckOptions) -> Result<()> {
        let mut lines = Vec::new();
        if options.notifications {
            lines.push(commands::cmd_notify());
        }
        if options.initial_queries {
            lines.extend([
                commands::cmd_device_info(),
                commands::cmd_transport_info(),
                commands::cmd_clips_get(),
                commands::cmd_disk_list(),
            ]);
        }
        if lines.is_empty() {
            return Ok(());
        }

        let waits: Vec<(String, Resumption<CommandReply>)> = lines
            .into_iter()
            .map(|line| {
                let (reply, resumed) = continuation::oneshot();
                self.inner.io.send_expecting(line.clone(), reply);
                (line, resumed)
            })
            .collect();

        let batch = async {
            for (line, resumed) in waits {
                match resumed.await {
                    Ok(reply) => debug!(command = %line, code = %reply.code, "startup reply"),
                    Err(Error::CommandFailed { code, message }) => {
                        warn!(command = %line, code, %message, "startup command refused");
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        };

        tokio::time::timeout(options.connect_timeout, batch)
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Close the session.
    ///
    /// Sends `quit`, closes the socket and fails every command still waiting
    /// with [`Error::Closed`]. Calling it again is a no-op.
    pub async fn close(&self) {
        if self.inner.io.is_running() {
            info!(addr = self.log_addr(), "closing deck connection");
        }
        self.inner.io.shutdown().await;
    }

    // -----------------------------------------------------------------
    // Raw commands
    // -----------------------------------------------------------------

    /// Send one command line without waiting for its outcome.
    pub fn send(&self, line: &str) -> Result<()> {
        commands::validate_line(line)?;
        self.inner.io.send_line(line.to_string())
    }

    /// Send one command line and resume `reply` with its outcome.
    ///
    /// A line that fails validation fails `reply` instead of being sent.
    pub fn send_with_callback(&self, line: &str, reply: BoxContinuation<CommandReply>) {
        match commands::validate_line(line) {
            Ok(()) => self.inner.io.send_expecting(line.to_string(), reply),
            Err(e) => reply.fail_with(e),
        }
    }

    /// Send one command line and wait for its outcome.
    ///
    /// Non-2xx outcomes become [`Error::CommandFailed`] carrying the
    /// device's message. When a reply opens a block, this returns after the
    /// block has been committed to the state.
    pub async fn command(&self, line: &str) -> Result<CommandReply> {
        commands::validate_line(line)?;
        self.with_timeout(self.inner.io.command(line.to_string()))
            .await
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.inner.command_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::Timeout)?,
            None => fut.await,
        }
    }

    // -----------------------------------------------------------------
    // Timeline editing (confirmable)
    // -----------------------------------------------------------------

    /// Remove every clip from the playback timeline.
    pub async fn clear_clips(&self) -> Result<()> {
        self.command(&commands::cmd_clips_clear()).await.map(drop)
    }

    /// Append a clip to the playback timeline by name or catalog id.
    pub async fn add_clip(&self, clip: impl Into<ClipRef>) -> Result<()> {
        let line = commands::cmd_clips_add(&clip.into())?;
        self.command(&line).await.map(drop)
    }

    // -----------------------------------------------------------------
    // Transport (fire and forget)
    // -----------------------------------------------------------------

    /// Start playback. With `clip_id` set, the clip is cued with a `goto`
    /// first.
    pub fn play(&self, options: &PlayOptions) -> Result<()> {
        let play = commands::cmd_play(options)?;
        if let Some(id) = options.clip_id {
            self.inner
                .io
                .send_line(commands::cmd_goto(&GotoTarget::ClipId(id)))?;
        }
        self.inner.io.send_line(play)
    }

    /// Stop playback.
    pub fn stop(&self) -> Result<()> {
        self.inner.io.send_line(commands::cmd_stop())
    }

    /// Move the playhead.
    pub fn goto(&self, target: &GotoTarget) -> Result<()> {
        self.inner.io.send_line(commands::cmd_goto(target))
    }

    // -----------------------------------------------------------------
    // Refresh queries
    // -----------------------------------------------------------------

    /// Re-query transport info and wait until it is committed.
    pub async fn refresh_transport(&self) -> Result<()> {
        self.command(&commands::cmd_transport_info()).await.map(drop)
    }

    /// Re-query the playback timeline's clip list.
    pub async fn refresh_clips(&self) -> Result<()> {
        self.command(&commands::cmd_clips_get()).await.map(drop)
    }

    /// Re-query the active slot's clip catalog.
    pub async fn refresh_disk_list(&self) -> Result<()> {
        self.command(&commands::cmd_disk_list()).await.map(drop)
    }

    /// Re-query model, versions and name.
    pub async fn refresh_device_info(&self) -> Result<()> {
        self.command(&commands::cmd_device_info()).await.map(drop)
    }

    // -----------------------------------------------------------------
    // State accessors
    // -----------------------------------------------------------------

    /// Snapshot of the whole state aggregate.
    pub fn state(&self) -> DeckState {
        lock(&self.inner.state).clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        lock(&self.inner.state).connection
    }

    pub fn transport_info(&self) -> TransportInfo {
        lock(&self.inner.state).transport.clone()
    }

    pub fn device_info(&self) -> DeviceInfo {
        lock(&self.inner.state).device.clone()
    }

    pub fn timeline(&self) -> TimelineInfo {
        lock(&self.inner.state).timeline.clone()
    }

    /// The active slot's clip catalog.
    pub fn clips(&self) -> Vec<ClipInfo> {
        lock(&self.inner.state).device.clips.clone()
    }

    pub fn status(&self) -> TransportStatus {
        lock(&self.inner.state).transport.status
    }

    pub fn model(&self) -> String {
        lock(&self.inner.state).device.model.clone()
    }

    pub fn name(&self) -> Option<String> {
        lock(&self.inner.state).name().map(str::to_string)
    }

    /// Whether the connection handshake block has been received.
    pub fn is_ready(&self) -> bool {
        lock(&self.inner.state).ready
    }

    /// Subscribe to state change events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeckEvent> {
        self.inner.event_tx.subscribe()
    }

    /// The `host:port` this session was opened to, if known.
    pub fn addr(&self) -> Option<&str> {
        self.inner.addr.as_deref()
    }

    fn log_addr(&self) -> &str {
        self.addr().unwrap_or("-")
    }
}

impl fmt::Debug for HyperDeck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperDeck")
            .field("addr", &self.inner.addr)
            .field("connection", &self.connection_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::HyperDeckBuilder;
    use deckctl_test_harness::fixtures::{self, OK};
    use deckctl_test_harness::{MockDeckServer, MockTransport};

    async fn connected(server: &mut MockDeckServer) -> HyperDeck {
        let addr = server.addr().to_string();
        server.start();
        HyperDeck::connect(&addr).await.unwrap()
    }

    #[tokio::test]
    async fn connect_populates_state_before_returning() {
        let mut server = MockDeckServer::new().await.unwrap();
        fixtures::script_handshake(&mut server);
        let deck = connected(&mut server).await;

        assert!(deck.is_ready());
        assert!(deck.connection_state().is_connected());
        assert_eq!(deck.model(), "HyperDeck Studio Mini");
        assert_eq!(deck.name().as_deref(), Some("Playout A"));
        assert_eq!(deck.device_info().slot_count, 2);
        assert_eq!(deck.status(), TransportStatus::Stopped);
        assert_eq!(deck.clips().len(), 2);
        assert_eq!(deck.clips()[0].name, "Intro.mov");
        assert_eq!(deck.timeline().clips.len(), 2);

        deck.close().await;
        assert_eq!(deck.connection_state(), ConnectionState::Disconnected);
        assert!(!deck.is_ready());
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn clear_clips_succeeds_on_ok() {
        let mut server = MockDeckServer::new().await.unwrap();
        fixtures::script_handshake(&mut server);
        server.expect_line("clips clear", OK);
        let deck = connected(&mut server).await;

        deck.clear_clips().await.unwrap();

        deck.close().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn clear_clips_fails_with_device_message() {
        let mut server = MockDeckServer::new().await.unwrap();
        fixtures::script_handshake(&mut server);
        server.expect_line("clips clear", b"504 clip in use\r\n");
        let deck = connected(&mut server).await;

        let err = deck.clear_clips().await.unwrap_err();
        assert!(matches!(err, Error::CommandFailed { code: 504, .. }));
        assert_eq!(err.device_message(), Some("clip in use"));

        deck.close().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn push_notification_between_replies() {
        let mut server = MockDeckServer::new().await.unwrap();
        fixtures::script_handshake(&mut server);
        server.expect_line(
            "clips add: name: Intro.mov",
            b"508 transport info:\r\nstatus: play\r\nspeed: 100\r\nloop: true\r\n\r\n200 ok\r\n",
        );
        let deck = connected(&mut server).await;
        let mut events = deck.subscribe();

        deck.add_clip("Intro.mov").await.unwrap();
        assert_eq!(deck.status(), TransportStatus::Play);
        assert!(deck.timeline().looping);

        let mut saw_play = false;
        while let Ok(event) = events.try_recv() {
            if event == (DeckEvent::TransportChanged { status: TransportStatus::Play }) {
                saw_play = true;
            }
        }
        assert!(saw_play);

        deck.close().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn transport_commands_do_not_wait() {
        let mut server = MockDeckServer::new().await.unwrap();
        fixtures::script_handshake(&mut server);
        server.expect_line("goto: clip id: 2", OK);
        server.expect_line("play: speed: 50", OK);
        server.expect_line("stop", OK);
        server.expect_line("goto: timeline: start", OK);
        server.expect_line("transport info", fixtures::TRANSPORT_INFO);
        let deck = connected(&mut server).await;

        deck.play(&PlayOptions::new().clip(2).speed(50)).unwrap();
        deck.stop().unwrap();
        deck.goto(&GotoTarget::TimelineStart).unwrap();
        // The query is answered after the four transport replies.
        deck.refresh_transport().await.unwrap();

        deck.close().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn close_fails_outstanding_commands_once() {
        let mut server = MockDeckServer::new().await.unwrap();
        fixtures::script_handshake(&mut server);
        server.expect_line("clips clear", b"");
        server.expect_line("clips add: clip id: 1", b"");
        let deck = connected(&mut server).await;

        let outcomes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let (first, first_rx) = continuation::oneshot();
        let counted = {
            let outcomes = Arc::clone(&outcomes);
            continuation::from_fn(move |r: Result<CommandReply>| {
                outcomes.lock().unwrap().push(matches!(r, Err(Error::Closed)));
            })
        };
        deck.send_with_callback("clips clear", first);
        deck.send_with_callback("clips add: clip id: 1", counted);

        // Let the IO task write both lines before closing.
        tokio::time::sleep(Duration::from_millis(100)).await;
        deck.close().await;
        deck.close().await;

        assert!(matches!(first_rx.await, Err(Error::Closed)));
        assert_eq!(*outcomes.lock().unwrap(), vec![true]);
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn commands_after_close_are_rejected() {
        let deck = HyperDeckBuilder::new()
            .notifications(false)
            .initial_queries(false)
            .build_with_transport(Box::new(MockTransport::new()))
            .await
            .unwrap();
        deck.close().await;

        assert!(matches!(deck.stop(), Err(Error::NotConnected)));
        assert!(matches!(deck.clear_clips().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn invalid_lines_never_reach_the_wire() {
        let mock = MockTransport::new();
        let log = mock.sent_log();
        let deck = HyperDeckBuilder::new()
            .notifications(false)
            .initial_queries(false)
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        assert!(matches!(deck.send("stop\r\nplay"), Err(Error::InvalidParameter(_))));
        let (reply, resumed) = continuation::oneshot();
        deck.send_with_callback("", reply);
        assert!(matches!(resumed.await, Err(Error::InvalidParameter(_))));
        assert!(deck.add_clip("").await.is_err());
        assert!(log.is_empty());

        deck.close().await;
    }

    #[tokio::test]
    async fn connect_refused_reports_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = HyperDeck::connect(&addr).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "{err}");
    }

    #[tokio::test]
    async fn startup_tolerates_refused_query() {
        let mut mock = MockTransport::new();
        mock.push_unsolicited(fixtures::GREETING);
        mock.expect_line(fixtures::NOTIFY_COMMAND, OK);
        mock.expect_line("device info", b"100 syntax error\r\n");
        mock.expect_line("transport info", fixtures::TRANSPORT_INFO);
        mock.expect_line("clips get", fixtures::CLIPS_INFO);
        mock.expect_line("disk list", fixtures::DISK_LIST);

        let deck = HyperDeckBuilder::new()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        assert!(deck.is_ready());
        assert_eq!(deck.clips().len(), 2);
        assert_eq!(deck.device_info().slot_count, 0);

        deck.close().await;
    }

    #[tokio::test]
    async fn connection_loss_during_startup_fails_connect() {
        let mut server = MockDeckServer::new().await.unwrap();
        server.push(fixtures::GREETING);
        server.expect_line(fixtures::NOTIFY_COMMAND, OK);
        server.hang_up();

        let addr = server.addr().to_string();
        server.start();
        let err = HyperDeck::connect(&addr).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionLost), "{err}");
        server.wait().await.unwrap();
    }
}
