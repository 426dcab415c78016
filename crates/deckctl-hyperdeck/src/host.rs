//! Bridge for single-threaded scripting hosts.
//!
//! A host that runs scripts cooperatively cannot `.await`. Instead it hands
//! over a continuation token for the suspended script and resumes it when
//! the token is completed or failed. [`HostBridge`] exposes the deck
//! surface in that shape: suspending operations take a
//! [`BoxContinuation`], everything else returns immediately.
//!
//! Every token is resolved exactly once, from a runtime thread. Command
//! failures arrive as [`Error::CommandFailed`](deckctl_core::Error) with the
//! device's message text.

use tokio::runtime::Handle;
use tracing::debug;

use deckctl_core::continuation::BoxContinuation;
use deckctl_core::error::Result;

use crate::builder::DeckOptions;
use crate::commands::{self, ClipRef, GotoTarget, PlayOptions};
use crate::device::HyperDeck;
use crate::protocol::CommandReply;

/// Runs deck operations on a tokio runtime on behalf of a host.
#[derive(Debug, Clone)]
pub struct HostBridge {
    runtime: Handle,
    options: DeckOptions,
}

impl HostBridge {
    pub fn new(runtime: Handle) -> Self {
        Self::with_options(runtime, DeckOptions::default())
    }

    pub fn with_options(runtime: Handle, options: DeckOptions) -> Self {
        HostBridge { runtime, options }
    }

    /// Connect, resuming `token` with the handle once the startup queries
    /// have been answered.
    pub fn connect(&self, address: &str, token: BoxContinuation<HyperDeck>) {
        let address = address.to_string();
        let options = self.options.clone();
        self.runtime.spawn(async move {
            debug!(addr = %address, "host connect");
            token.resolve(HyperDeck::connect_with_options(&address, &options).await);
        });
    }

    /// Close without suspending the caller.
    pub fn close(&self, deck: &HyperDeck) {
        let deck = deck.clone();
        self.runtime.spawn(async move { deck.close().await });
    }

    pub fn send(&self, deck: &HyperDeck, line: &str) -> Result<()> {
        deck.send(line)
    }

    pub fn clear_clips(&self, deck: &HyperDeck, token: BoxContinuation<CommandReply>) {
        deck.send_with_callback(&commands::cmd_clips_clear(), token);
    }

    pub fn add_clip(
        &self,
        deck: &HyperDeck,
        clip: impl Into<ClipRef>,
        token: BoxContinuation<CommandReply>,
    ) {
        match commands::cmd_clips_add(&clip.into()) {
            Ok(line) => deck.send_with_callback(&line, token),
            Err(e) => token.fail_with(e),
        }
    }

    /// Start playback. `clip_id` overrides any clip set in `options`.
    pub fn play(
        &self,
        deck: &HyperDeck,
        clip_id: Option<u32>,
        options: Option<PlayOptions>,
    ) -> Result<()> {
        let mut options = options.unwrap_or_default();
        if clip_id.is_some() {
            options.clip_id = clip_id;
        }
        deck.play(&options)
    }

    pub fn stop(&self, deck: &HyperDeck) -> Result<()> {
        deck.stop()
    }

    /// `kind` is `clip id`, `timecode` or `timeline`; see
    /// [`GotoTarget::parse`].
    pub fn goto(&self, deck: &HyperDeck, kind: &str, value: &str) -> Result<()> {
        deck.goto(&GotoTarget::parse(kind, value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckctl_core::Error;
    use deckctl_core::continuation::oneshot;
    use deckctl_test_harness::MockDeckServer;
    use deckctl_test_harness::fixtures::{self, OK};

    async fn connect(bridge: &HostBridge, server: &mut MockDeckServer) -> HyperDeck {
        let addr = server.addr().to_string();
        server.start();
        let (token, resumed) = oneshot();
        bridge.connect(&addr, token);
        resumed.await.unwrap()
    }

    #[tokio::test]
    async fn suspending_calls_resume_with_outcome() {
        let mut server = MockDeckServer::new().await.unwrap();
        fixtures::script_handshake(&mut server);
        server.expect_line("clips clear", OK);
        server.expect_line("clips add: name: Outro.mov", b"504 clip in use\r\n");
        let bridge = HostBridge::new(Handle::current());
        let deck = connect(&bridge, &mut server).await;
        assert!(deck.is_ready());

        let (token, resumed) = oneshot();
        bridge.clear_clips(&deck, token);
        assert!(resumed.await.unwrap().code.is_success());

        let (token, resumed) = oneshot();
        bridge.add_clip(&deck, "Outro.mov", token);
        let err = resumed.await.unwrap_err();
        assert_eq!(err.device_message(), Some("clip in use"));

        deck.close().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn non_suspending_calls_return_immediately() {
        let mut server = MockDeckServer::new().await.unwrap();
        fixtures::script_handshake(&mut server);
        server.expect_line("goto: clip id: 1", OK);
        server.expect_line("play: loop: true", OK);
        server.expect_line("goto: timecode: 00:00:10:00", OK);
        server.expect_line("stop", OK);
        server.expect_line("transport info", fixtures::TRANSPORT_INFO);
        let bridge = HostBridge::new(Handle::current());
        let deck = connect(&bridge, &mut server).await;

        bridge
            .play(&deck, Some(1), Some(PlayOptions::new().looping(true)))
            .unwrap();
        bridge.goto(&deck, "timecode", "00:00:10:00").unwrap();
        bridge.stop(&deck).unwrap();
        assert!(matches!(
            bridge.goto(&deck, "chapter", "2"),
            Err(Error::InvalidParameter(_))
        ));
        // Answered only after the four transport replies have been read.
        deck.refresh_transport().await.unwrap();

        deck.close().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn failed_connect_fails_token() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let bridge = HostBridge::new(Handle::current());
        let (token, resumed) = oneshot();
        bridge.connect(&addr, token);
        assert!(matches!(resumed.await, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn invalid_clip_fails_token_without_sending() {
        let mut server = MockDeckServer::new().await.unwrap();
        fixtures::script_handshake(&mut server);
        let bridge = HostBridge::new(Handle::current());
        let deck = connect(&bridge, &mut server).await;

        let (token, resumed) = oneshot();
        bridge.add_clip(&deck, "", token);
        assert!(matches!(resumed.await, Err(Error::InvalidParameter(_))));

        bridge.close(&deck);
        server.wait().await.unwrap();
    }
}
