//! FIFO matching of command outcomes to waiting callers.
//!
//! The device answers commands strictly in the order they were sent and
//! carries no request id, so the oldest pending entry owns the next outcome
//! header. Asynchronous notifications never reach the correlator.

use std::collections::VecDeque;

use deckctl_core::{BoxContinuation, Error};
use tracing::{debug, warn};

use crate::protocol::{CommandReply, ResponseCode};

/// A command line awaiting its outcome.
///
/// `reply` is `None` for fire-and-forget commands, which still occupy a slot
/// so later replies line up with the right caller. Dropping an entry whose
/// caller was never answered fails that caller with
/// [`Error::ConnectionLost`].
pub struct PendingCommand {
    pub command: String,
    reply: Option<BoxContinuation<CommandReply>>,
}

impl PendingCommand {
    pub fn new(command: impl Into<String>, reply: Option<BoxContinuation<CommandReply>>) -> Self {
        PendingCommand {
            command: command.into(),
            reply,
        }
    }

    /// Whether a caller is waiting on this entry.
    pub fn has_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Fail the waiting caller, if any.
    pub fn fail(mut self, error: Error) {
        if let Some(reply) = self.reply.take() {
            reply.fail_with(error);
        }
    }

    fn complete(mut self, value: CommandReply) {
        if let Some(reply) = self.reply.take() {
            reply.complete_with(value);
        }
    }
}

impl Drop for PendingCommand {
    fn drop(&mut self) {
        if let Some(reply) = self.reply.take() {
            debug!(command = %self.command, "pending command dropped unanswered");
            reply.fail_with(Error::ConnectionLost);
        }
    }
}

impl std::fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCommand")
            .field("command", &self.command)
            .field("has_reply", &self.reply.is_some())
            .finish()
    }
}

/// An outcome matched to its command but not yet delivered.
///
/// Delivery is separated from matching so the caller can release the state
/// lock first, and so the outcome of a header that opens a block can wait
/// until the block is committed.
#[derive(Debug)]
pub struct Resolution {
    pub pending: PendingCommand,
    pub code: ResponseCode,
    pub message: String,
}

impl Resolution {
    /// Complete the caller on 2xx, fail it with
    /// [`Error::CommandFailed`] otherwise.
    pub fn deliver(self) {
        let Resolution {
            pending,
            code,
            message,
        } = self;

        if code.is_success() {
            debug!(command = %pending.command, %code, "command succeeded");
            pending.complete(CommandReply { code, message });
        } else {
            warn!(command = %pending.command, %code, %message, "command failed");
            pending.fail(Error::CommandFailed {
                code: code.value(),
                message,
            });
        }
    }

    /// Fail the caller with `error` instead of the matched outcome.
    pub fn fail(self, error: Error) {
        self.pending.fail(error);
    }
}

/// Outstanding commands in send order.
#[derive(Debug, Default)]
pub struct ResponseCorrelator {
    queue: VecDeque<PendingCommand>,
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command that was just written to the wire.
    pub fn expect(&mut self, command: impl Into<String>, reply: Option<BoxContinuation<CommandReply>>) {
        self.queue.push_back(PendingCommand::new(command, reply));
    }

    /// Match an outcome header to the oldest pending command.
    ///
    /// An outcome that arrives with nothing pending is logged and dropped.
    pub fn resolve(&mut self, code: ResponseCode, message: &str) -> Option<Resolution> {
        let Some(pending) = self.queue.pop_front() else {
            debug!(%code, message, "outcome with no pending command");
            return None;
        };
        Some(Resolution {
            pending,
            code,
            message: message.to_string(),
        })
    }

    /// Fail every pending caller, returning how many entries were dropped.
    pub fn fail_all(&mut self, error: impl Fn() -> Error) -> usize {
        let count = self.queue.len();
        for pending in self.queue.drain(..) {
            pending.fail(error());
        }
        count
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
