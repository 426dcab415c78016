//! IO task for a HyperDeck connection.
//!
//! One tokio task owns the transport exclusively. It writes command lines,
//! reads and frames the byte stream, drives the block dispatcher, and owns
//! the response correlator. Callers talk to it through an unbounded request
//! channel, so a command can be queued from synchronous code without
//! blocking.
//!
//! The device state aggregate is the only thing shared with callers. The
//! task holds its lock while dispatching the lines of one read, then
//! releases it before broadcasting events and resuming callers, so a
//! continuation may freely call the state accessors.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use deckctl_core::continuation::{self, BoxContinuation};
use deckctl_core::error::{Error, Result};
use deckctl_core::events::DeckEvent;
use deckctl_core::transport::Transport;
use deckctl_core::types::ConnectionState;

use crate::commands::cmd_quit;
use crate::correlator::ResponseCorrelator;
use crate::dispatcher::{BlockDispatcher, Dispatched};
use crate::protocol::{CommandReply, LINE_TERMINATOR, LineFramer};
use crate::state::{SharedState, lock};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration for the IO task.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// How long one idle read waits before the loop re-checks for requests.
    pub read_poll: Duration,
    /// Send `quit` before closing the transport on an orderly shutdown.
    pub quit_on_shutdown: bool,
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig {
            read_poll: Duration::from_millis(100),
            quit_on_shutdown: true,
        }
    }
}

/// A request sent from the device handle to the IO task.
pub enum Request {
    /// Write one command line. `reply` is resumed with the outcome header;
    /// `None` still reserves the command's place in the reply order.
    Command {
        line: String,
        reply: Option<BoxContinuation<CommandReply>>,
    },
    /// Orderly shutdown; acknowledged once teardown has finished.
    Shutdown { reply: oneshot::Sender<()> },
}

impl Request {
    fn fail(self, error: Error) {
        match self {
            Request::Command {
                reply: Some(reply), ..
            } => reply.fail_with(error),
            Request::Command { reply: None, .. } => {}
            Request::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }
}

/// Handle to the IO task. Dropping it cancels the task.
pub struct DeckIo {
    tx: mpsc::UnboundedSender<Request>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DeckIo {
    /// Queue a command whose outcome nobody waits for.
    pub fn send_line(&self, line: String) -> Result<()> {
        self.tx
            .send(Request::Command { line, reply: None })
            .map_err(|_| Error::NotConnected)
    }

    /// Queue a command and resume `reply` with its outcome.
    ///
    /// If the task is gone, `reply` is failed with [`Error::NotConnected`]
    /// right away.
    pub fn send_expecting(&self, line: String, reply: BoxContinuation<CommandReply>) {
        if let Err(mpsc::error::SendError(request)) = self.tx.send(Request::Command {
            line,
            reply: Some(reply),
        }) {
            request.fail(Error::NotConnected);
        }
    }

    /// Send a command and wait for its outcome.
    pub async fn command(&self, line: String) -> Result<CommandReply> {
        let (reply, resumed) = continuation::oneshot();
        self.send_expecting(line, reply);
        resumed.await
    }

    /// Whether the task is still accepting requests.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Shut the task down and wait for it to exit. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Request::Shutdown { reply: reply_tx }).is_ok() {
            let _ = reply_rx.await;
        }

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for DeckIo {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task over an already connected transport.
pub fn spawn_io_task(
    transport: Box<dyn Transport>,
    config: IoConfig,
    state: SharedState,
    event_tx: broadcast::Sender<DeckEvent>,
) -> DeckIo {
    let (tx, rx) = mpsc::unbounded_channel::<Request>();
    let cancel = CancellationToken::new();

    let task = tokio::spawn(io_loop(
        transport,
        config,
        state,
        event_tx,
        rx,
        cancel.clone(),
    ));

    DeckIo {
        tx,
        cancel,
        task: Mutex::new(Some(task)),
    }
}

// ---------------------------------------------------------------------------
// IO loop
// ---------------------------------------------------------------------------

/// Why the loop stopped.
enum Exit {
    Shutdown(oneshot::Sender<()>),
    Cancelled,
    Failed,
}

/// Framing, dispatch and correlation state owned by the task.
#[derive(Default)]
struct Session {
    framer: LineFramer,
    dispatcher: BlockDispatcher,
    correlator: ResponseCorrelator,
}

impl Session {
    /// Write one command line and register it for the next outcome.
    ///
    /// Returns `false` if the transport is no longer usable.
    async fn write(
        &mut self,
        transport: &mut dyn Transport,
        line: String,
        reply: Option<BoxContinuation<CommandReply>>,
    ) -> bool {
        let mut bytes = Vec::with_capacity(line.len() + LINE_TERMINATOR.len());
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(LINE_TERMINATOR);

        match transport.send(&bytes).await {
            Ok(()) => {
                trace!(command = %line, pending = self.correlator.len() + 1, "sent");
                self.correlator.expect(line, reply);
                true
            }
            Err(e) => {
                warn!(command = %line, error = %e, "failed to send command");
                let fatal = e.is_fatal();
                if let Some(reply) = reply {
                    reply.fail_with(e);
                }
                !fatal
            }
        }
    }

    /// Frame and dispatch one read, then publish the results.
    fn on_bytes(
        &mut self,
        bytes: &[u8],
        state: &SharedState,
        event_tx: &broadcast::Sender<DeckEvent>,
    ) {
        let mut out = Dispatched::default();
        {
            let mut guard = lock(state);
            for line in self.framer.feed(bytes) {
                self.dispatcher
                    .process_line(&line, &mut guard, &mut self.correlator, &mut out);
            }
        }

        for event in out.events {
            let _ = event_tx.send(event);
        }
        for resolution in out.resolutions {
            resolution.deliver();
        }
    }
}

/// The main IO loop.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Queued requests
/// 3. Idle reads of replies and push notifications
async fn io_loop(
    mut transport: Box<dyn Transport>,
    config: IoConfig,
    state: SharedState,
    event_tx: broadcast::Sender<DeckEvent>,
    mut rx: mpsc::UnboundedReceiver<Request>,
    cancel: CancellationToken,
) {
    debug!("deck IO task started");
    let mut session = Session::default();

    let exit = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("deck IO task cancelled");
                break Exit::Cancelled;
            }

            req = rx.recv() => {
                match req {
                    Some(Request::Command { line, reply }) => {
                        if !session.write(&mut *transport, line, reply).await {
                            break Exit::Failed;
                        }
                    }
                    Some(Request::Shutdown { reply }) => {
                        debug!("deck IO task shutdown requested");
                        break Exit::Shutdown(reply);
                    }
                    None => {
                        debug!("request channel closed, exiting deck IO task");
                        break Exit::Cancelled;
                    }
                }
            }

            // Idle: read replies and notifications.
            lost = async {
                let mut buf = [0u8; 4096];
                match transport.receive(&mut buf, config.read_poll).await {
                    Ok(n) if n > 0 => {
                        session.on_bytes(&buf[..n], &state, &event_tx);
                        false
                    }
                    Err(e) if e.is_fatal() => {
                        warn!(error = %e, "deck connection lost");
                        true
                    }
                    _ => {
                        // Timeout: yield briefly so requests and
                        // cancellation are seen promptly.
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        false
                    }
                }
            } => {
                if lost {
                    break Exit::Failed;
                }
            }
        }
    };

    teardown(transport, session, &config, &state, &event_tx, rx, exit).await;
}

/// Close the transport and settle everything still outstanding.
///
/// Pending callers are failed with [`Error::Closed`] on a local close and
/// [`Error::ConnectionLost`] when the connection failed. Requests that were
/// queued but never written are failed with [`Error::NotConnected`].
async fn teardown(
    mut transport: Box<dyn Transport>,
    mut session: Session,
    config: &IoConfig,
    state: &SharedState,
    event_tx: &broadcast::Sender<DeckEvent>,
    mut rx: mpsc::UnboundedReceiver<Request>,
    exit: Exit,
) {
    let failed = matches!(exit, Exit::Failed);

    if matches!(exit, Exit::Shutdown(_)) && config.quit_on_shutdown && transport.is_connected() {
        let mut quit = cmd_quit().into_bytes();
        quit.extend_from_slice(LINE_TERMINATOR);
        if let Err(e) = transport.send(&quit).await {
            debug!(error = %e, "quit not delivered");
        }
    }
    if let Err(e) = transport.close().await {
        debug!(error = %e, "transport close failed");
    }

    {
        let mut guard = lock(state);
        guard.set_connection(if failed {
            ConnectionState::Error
        } else {
            ConnectionState::Disconnected
        });
        guard.ready = false;
    }

    let reason = || {
        if failed {
            Error::ConnectionLost
        } else {
            Error::Closed
        }
    };
    if let Some(deferred) = session.dispatcher.abort() {
        deferred.fail(reason());
    }
    session.framer.clear();
    let pending = session.correlator.fail_all(reason);

    rx.close();
    let mut unsent = 0usize;
    let mut waiting = Vec::new();
    while let Ok(req) = rx.try_recv() {
        match req {
            Request::Shutdown { reply } => waiting.push(reply),
            req => {
                unsent += 1;
                req.fail(Error::NotConnected);
            }
        }
    }

    info!(pending, unsent, failed, "deck connection closed");
    let _ = event_tx.send(DeckEvent::Disconnected);

    if let Exit::Shutdown(reply) = exit {
        waiting.push(reply);
    }
    for reply in waiting {
        let _ = reply.send(());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
