//! Line-level state machine: headers, block bodies and terminators.
//!
//! The dispatcher is pure. It mutates the [`DeckState`] and the
//! [`ResponseCorrelator`] it is handed and collects what must happen next
//! (events to broadcast, callers to resume) into a [`Dispatched`], which the
//! IO task acts on once the state lock has been released.

use deckctl_core::events::DeckEvent;
use tracing::{debug, trace};

use crate::correlator::{Resolution, ResponseCorrelator};
use crate::parsers::BlockParser;
use crate::protocol::{Header, OK_KEY, ReadState, parse_header};
use crate::state::DeckState;

/// Side effects collected while dispatching lines.
#[derive(Debug, Default)]
pub struct Dispatched {
    pub events: Vec<DeckEvent>,
    pub resolutions: Vec<Resolution>,
}

/// Whether `header` answers the oldest pending command.
///
/// Codes 100-499 always do. A 5xx header does too when it is a plain
/// message (`504 clip in use`) rather than a topic announcement
/// (`502 slot info:`), since push notifications share the 5xx range.
pub fn is_command_outcome(header: &Header, topic: Option<ReadState>) -> bool {
    if header.code.in_outcome_range() {
        return true;
    }
    header.code.value() >= 500 && topic.is_none() && !header.has_colon
}

/// Tracks the active block and the outcome waiting on it.
#[derive(Debug, Default)]
pub struct BlockDispatcher {
    active: Option<BlockParser>,
    /// Outcome whose header opened the active block; delivered after commit.
    deferred: Option<Resolution>,
}

impl BlockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// [`ReadState::None`] between blocks, otherwise the active topic.
    pub fn read_state(&self) -> ReadState {
        self.active
            .as_ref()
            .map_or(ReadState::None, BlockParser::read_state)
    }

    /// Dispatch one framed line (terminator already stripped).
    pub fn process_line(
        &mut self,
        line: &str,
        state: &mut DeckState,
        correlator: &mut ResponseCorrelator,
        out: &mut Dispatched,
    ) {
        trace!(line, read_state = ?self.read_state(), "line");

        if line.is_empty() {
            self.finish_block(state, out);
            return;
        }

        if let Some(parser) = self.active.as_mut() {
            parser.process_line(line);
            return;
        }

        let Some(header) = parse_header(line) else {
            debug!(line, "ignoring line outside a block");
            return;
        };

        let topic = ReadState::from_topic(&header.key);
        let resolution = if is_command_outcome(&header, topic) {
            correlator.resolve(header.code, &header.key)
        } else {
            None
        };

        match topic.and_then(|t| BlockParser::start(t, state)) {
            Some(parser) => {
                self.active = Some(parser);
                self.deferred = resolution;
            }
            None => {
                if topic.is_none() && header.key != OK_KEY && resolution.is_none() {
                    debug!(code = %header.code, key = %header.key, "unrecognized header");
                }
                out.resolutions.extend(resolution);
            }
        }
    }

    /// Drop the active block without committing it, returning the outcome
    /// that was waiting on it so the caller can fail it.
    pub fn abort(&mut self) -> Option<Resolution> {
        if let Some(parser) = self.active.take() {
            debug!(topic = ?parser.read_state(), "discarding partial block");
        }
        self.deferred.take()
    }

    fn finish_block(&mut self, state: &mut DeckState, out: &mut Dispatched) {
        if let Some(parser) = self.active.take() {
            parser.finish(state, &mut out.events);
        }
        out.resolutions.extend(self.deferred.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandReply, ResponseCode};
    use deckctl_core::continuation::from_fn;
    use deckctl_core::types::TransportStatus;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Fixture {
        dispatcher: BlockDispatcher,
        state: DeckState,
        correlator: ResponseCorrelator,
        log: Log,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                dispatcher: BlockDispatcher::new(),
                state: DeckState::default(),
                correlator: ResponseCorrelator::new(),
                log: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn expect(&mut self, command: &str) {
            let log = Arc::clone(&self.log);
            let tag = command.to_string();
            self.correlator.expect(
                command,
                Some(from_fn(move |r: deckctl_core::Result<CommandReply>| {
                    let entry = match r {
                        Ok(reply) => format!("{tag} -> {} {}", reply.code, reply.message),
                        Err(e) => format!("{tag} -> {}", e.device_message().unwrap_or("error")),
                    };
                    log.lock().unwrap().push(entry);
                })),
            );
        }

        fn feed(&mut self, lines: &[&str]) -> Vec<DeckEvent> {
            let mut out = Dispatched::default();
            for line in lines {
                self.dispatcher
                    .process_line(line, &mut self.state, &mut self.correlator, &mut out);
            }
            for r in out.resolutions {
                r.deliver();
            }
            out.events
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    fn header(line: &str) -> (Header, Option<ReadState>) {
        let h = parse_header(line).unwrap();
        let topic = ReadState::from_topic(&h.key);
        (h, topic)
    }

    #[test]
    fn outcome_classification() {
        let (h, t) = header("200 ok");
        assert!(is_command_outcome(&h, t));
        let (h, t) = header("102 invalid value");
        assert!(is_command_outcome(&h, t));
        let (h, t) = header("208 transport info:");
        assert!(is_command_outcome(&h, t));
        let (h, t) = header("504 clip in use");
        assert!(is_command_outcome(&h, t));

        let (h, t) = header("508 transport info:");
        assert!(!is_command_outcome(&h, t));
        let (h, t) = header("502 slot info:");
        assert!(!is_command_outcome(&h, t));
    }

    #[test]
    fn ok_resolves_and_stays_idle() {
        let mut f = Fixture::new();
        f.expect("clips clear");
        f.feed(&["200 ok"]);
        assert_eq!(f.log(), vec!["clips clear -> 200 ok"]);
        assert_eq!(f.dispatcher.read_state(), ReadState::None);
    }

    #[test]
    fn failure_message_reaches_caller() {
        let mut f = Fixture::new();
        f.expect("clips clear");
        f.feed(&["504 clip in use"]);
        assert_eq!(f.log(), vec!["clips clear -> clip in use"]);
    }

    #[test]
    fn notifications_never_consume_pending_callbacks() {
        let mut f = Fixture::new();
        f.expect("clips clear");
        f.expect("clips add: name: Intro.mov");
        f.expect("clips add: name: Outro.mov");

        f.feed(&[
            "508 transport info:",
            "status: play",
            "",
            "200 ok",
            "513 timeline position:",
            "timeline: 42",
            "",
            "510 display timecode:",
            "display timecode: 00:00:01:00",
            "",
            "200 ok",
            "509 clip in use",
        ]);

        assert_eq!(
            f.log(),
            vec![
                "clips clear -> 200 ok",
                "clips add: name: Intro.mov -> 200 ok",
                "clips add: name: Outro.mov -> clip in use",
            ]
        );
        assert_eq!(f.state.transport.status, TransportStatus::Play);
        assert_eq!(f.state.timeline.position, 42);
    }

    #[test]
    fn block_outcome_is_delivered_after_commit() {
        let mut f = Fixture::new();
        f.expect("transport info");

        let mut out = Dispatched::default();
        for line in ["208 transport info:", "status: record"] {
            f.dispatcher
                .process_line(line, &mut f.state, &mut f.correlator, &mut out);
        }
        assert!(out.resolutions.is_empty());
        assert!(f.correlator.is_empty());
        assert_eq!(f.dispatcher.read_state(), ReadState::TransportInfo);

        f.dispatcher
            .process_line("", &mut f.state, &mut f.correlator, &mut out);
        assert_eq!(out.resolutions.len(), 1);
        assert_eq!(f.state.transport.status, TransportStatus::Record);
        assert!(out.events.contains(&DeckEvent::TransportChanged {
            status: TransportStatus::Record
        }));
    }

    #[test]
    fn unrecognized_header_is_ignored() {
        let mut f = Fixture::new();
        f.expect("stop");
        let before = format!("{:?}", f.state);

        let events = f.feed(&["502 slot info:", "slot id: 1", "", "not a header"]);

        assert!(events.is_empty());
        assert_eq!(f.dispatcher.read_state(), ReadState::None);
        assert_eq!(format!("{:?}", f.state), before);
        assert_eq!(f.correlator.len(), 1);
    }

    #[test]
    fn outcome_with_nothing_pending_still_opens_block() {
        let mut f = Fixture::new();
        f.feed(&["208 transport info:", "speed: 200", ""]);
        assert_eq!(f.state.timeline.speed, 200);
    }

    #[test]
    fn abort_discards_partial_block() {
        let mut f = Fixture::new();
        f.expect("disk list");
        let mut out = Dispatched::default();
        for line in ["206 disk list:", "slot id: 1", "1: Intro.mov ProRes 1080p60 00:00:05:00"] {
            f.dispatcher
                .process_line(line, &mut f.state, &mut f.correlator, &mut out);
        }

        let deferred = f.dispatcher.abort().unwrap();
        assert_eq!(deferred.code, ResponseCode::new(206));
        assert!(f.state.device.clips.is_empty());
        assert_eq!(f.dispatcher.read_state(), ReadState::None);
    }
}
