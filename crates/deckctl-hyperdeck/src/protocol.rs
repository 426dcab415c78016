//! HyperDeck Ethernet protocol framing and header parsing.
//!
//! The protocol is CRLF-terminated ASCII over TCP port 9993. Every reply or
//! notification starts with a header line; known topics continue with
//! `key: value` lines and end at an empty line.
//!
//! # Line formats
//!
//! ```text
//! Header:     <3-digit code> <message-or-topic>[:]\r\n
//! Field:      <key>: <value>\r\n
//! Terminator: \r\n
//! ```
//!
//! Everything in this module is pure parsing; no I/O is performed.

use std::fmt;

use tracing::warn;

/// Line terminator used in both directions.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Header key of the synchronous acknowledgement. No block follows it.
pub const OK_KEY: &str = "ok";

/// Default cap on bytes buffered without seeing a terminator.
pub const DEFAULT_MAX_LINE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Line framer
// ---------------------------------------------------------------------------

/// Accumulates socket reads and yields complete CRLF-terminated lines.
///
/// Bytes after the last terminator stay buffered for the next
/// [`feed`](LineFramer::feed). A terminator split across two reads (`\r` at
/// the end of one, `\n` at the start of the next) is joined correctly; a lone
/// `\r` or `\n` is never a boundary.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_line: usize,
}

impl LineFramer {
    /// Create a framer with the default buffer cap.
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }

    /// Create a framer that discards its buffer once `max_line` bytes have
    /// accumulated without a terminator.
    pub fn with_max_line(max_line: usize) -> Self {
        LineFramer {
            buf: Vec::new(),
            max_line: max_line.max(LINE_TERMINATOR.len()),
        }
    }

    /// Append `bytes` and return the complete lines now available.
    ///
    /// The returned iterator is lazy and finite. Lines it does not get to
    /// before being dropped are returned by the next `feed`.
    pub fn feed(&mut self, bytes: &[u8]) -> Lines<'_> {
        self.buf.extend_from_slice(bytes);

        // A trailing CR may be the first half of a split terminator.
        let held = self.buf.len() - usize::from(self.buf.ends_with(b"\r"));
        if held > self.max_line && find_terminator(&self.buf).is_none() {
            warn!(
                len = self.buf.len(),
                max = self.max_line,
                "line buffer overflow without terminator, discarding"
            );
            self.buf.clear();
        }

        Lines {
            framer: self,
            consumed: 0,
        }
    }

    /// Number of bytes held back waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partially received line.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the complete lines produced by one [`LineFramer::feed`].
///
/// Consumed bytes are removed from the framer when the iterator is dropped.
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
    consumed: usize,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let rest = &self.framer.buf[self.consumed..];
        let pos = find_terminator(rest)?;
        let line = String::from_utf8_lossy(&rest[..pos]).into_owned();
        self.consumed += pos + LINE_TERMINATOR.len();
        Some(line)
    }
}

impl Drop for Lines<'_> {
    fn drop(&mut self) {
        self.framer.buf.drain(..self.consumed);
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(LINE_TERMINATOR.len())
        .position(|w| w == LINE_TERMINATOR)
}

// ---------------------------------------------------------------------------
// Response codes and headers
// ---------------------------------------------------------------------------

/// Three-digit code at the start of a header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResponseCode(u16);

impl ResponseCode {
    /// Wrap a raw code.
    pub const fn new(code: u16) -> Self {
        ResponseCode(code)
    }

    /// The numeric value.
    pub const fn value(self) -> u16 {
        self.0
    }

    /// 2xx: the command succeeded.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    /// 100-499: the range reserved for replies to commands.
    pub fn in_outcome_range(self) -> bool {
        (100..500).contains(&self.0)
    }

    /// 5xx: asynchronous notifications and device-side errors.
    pub fn is_async(self) -> bool {
        (500..600).contains(&self.0)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// A parsed header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Response code.
    pub code: ResponseCode,
    /// Message or topic text, without the trailing colon.
    pub key: String,
    /// Whether the line ended with `:` (the device announces a block).
    pub has_colon: bool,
}

/// Parse `<3-digit code> <key>[:]`.
///
/// Returns `None` for anything else, including codes that are not exactly
/// three digits and headers with an empty key.
pub fn parse_header(line: &str) -> Option<Header> {
    let (code, rest) = line.split_once(' ')?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code: u16 = code.parse().ok()?;

    let rest = rest.trim();
    let has_colon = rest.ends_with(':');
    let key = rest.trim_end_matches(':').trim_end();
    if key.is_empty() {
        return None;
    }

    Some(Header {
        code: ResponseCode(code),
        key: key.to_string(),
        has_colon,
    })
}

/// The reply a confirmable command resolves with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    /// Response code, always 2xx for a delivered reply.
    pub code: ResponseCode,
    /// Header text, e.g. `"ok"` or `"transport info"`.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// Which multi-line block, if any, is being accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReadState {
    #[default]
    None,
    TransportInfo,
    ClipsInfo,
    ConnectionInfo,
    DeviceInfo,
    TimelinePosition,
    DisplayTimecode,
    DiskList,
}

/// Header keys that open a block, matched case-sensitively.
const TOPICS: [(&str, ReadState); 7] = [
    ("transport info", ReadState::TransportInfo),
    ("clips info", ReadState::ClipsInfo),
    ("connection info", ReadState::ConnectionInfo),
    ("device info", ReadState::DeviceInfo),
    ("timeline position", ReadState::TimelinePosition),
    ("display timecode", ReadState::DisplayTimecode),
    ("disk list", ReadState::DiskList),
];

impl ReadState {
    /// Look up the block a header key opens.
    pub fn from_topic(key: &str) -> Option<ReadState> {
        TOPICS
            .iter()
            .find(|(topic, _)| *topic == key)
            .map(|(_, state)| *state)
    }

    /// The header key for this state, `None` for [`ReadState::None`].
    pub fn topic(self) -> Option<&'static str> {
        TOPICS
            .iter()
            .find(|(_, state)| *state == self)
            .map(|(topic, _)| *topic)
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Split a block line at its first colon into trimmed `(key, value)`.
pub fn split_field(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

/// Strict `true`/`false`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// `HH:MM:SS:FF`, accepting `;` or `.` as the frame separator.
pub fn is_timecode(value: &str) -> bool {
    let b = value.as_bytes();
    b.len() == 11
        && b.iter().enumerate().all(|(i, c)| match i {
            2 | 5 => *c == b':',
            8 => matches!(*c, b':' | b';' | b'.'),
            _ => c.is_ascii_digit(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(framer: &mut LineFramer, bytes: &[u8]) -> Vec<String> {
        framer.feed(bytes).collect()
    }

    #[test]
    fn framer_yields_complete_lines_and_keeps_remainder() {
        let mut framer = LineFramer::new();
        let lines = collect(&mut framer, b"200 ok\r\n208 transport info:\r\nstat");
        assert_eq!(lines, vec!["200 ok", "208 transport info:"]);
        assert_eq!(framer.pending(), 4);

        let lines = collect(&mut framer, b"us: play\r\n\r\n");
        assert_eq!(lines, vec!["status: play", ""]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn framer_joins_split_terminator() {
        let mut framer = LineFramer::new();
        assert!(collect(&mut framer, b"200 ok\r").is_empty());
        assert_eq!(collect(&mut framer, b"\n"), vec!["200 ok"]);
    }

    #[test]
    fn framer_ignores_bare_cr_and_lf() {
        let mut framer = LineFramer::new();
        assert!(collect(&mut framer, b"a\rb\nc").is_empty());
        assert_eq!(collect(&mut framer, b"\r\n"), vec!["a\rb\nc"]);
    }

    #[test]
    fn framer_is_chunk_size_independent() {
        let stream: &[u8] = b"500 connection info:\r\nprotocol version: 1.11\r\nmodel: HyperDeck Studio Mini\r\n\r\n\
206 disk list:\r\nslot id: 1\r\n1: Intro.mov ProRes 1080p60 00:00:05:00\r\n\r\n200 ok\r\npartial";

        let mut whole = LineFramer::new();
        let expected = collect(&mut whole, stream);
        assert_eq!(expected.len(), 9);

        for chunk in 1..=stream.len() {
            let mut framer = LineFramer::new();
            let mut lines = Vec::new();
            for piece in stream.chunks(chunk) {
                lines.extend(framer.feed(piece));
            }
            assert_eq!(lines, expected, "chunk size {chunk}");
            assert_eq!(framer.pending(), b"partial".len());
        }
    }

    #[test]
    fn dropped_iterator_keeps_unread_lines() {
        let mut framer = LineFramer::new();
        {
            let mut lines = framer.feed(b"one\r\ntwo\r\n");
            assert_eq!(lines.next().as_deref(), Some("one"));
        }
        assert_eq!(collect(&mut framer, b""), vec!["two"]);
    }

    #[test]
    fn framer_discards_oversized_garbage() {
        let mut framer = LineFramer::with_max_line(16);
        assert!(collect(&mut framer, &[b'x'; 32]).is_empty());
        assert_eq!(framer.pending(), 0);
        assert_eq!(collect(&mut framer, b"200 ok\r\n"), vec!["200 ok"]);
    }

    #[test]
    fn framer_keeps_split_terminator_at_cap() {
        let mut framer = LineFramer::with_max_line(8);
        assert!(collect(&mut framer, b"abcdefgh\r").is_empty());
        assert_eq!(framer.pending(), 9);
        assert_eq!(collect(&mut framer, b"\n"), vec!["abcdefgh"]);

        let mut framer = LineFramer::with_max_line(8);
        assert!(collect(&mut framer, b"abcdefghi\r").is_empty());
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn framer_decodes_invalid_utf8_lossily() {
        let mut framer = LineFramer::new();
        let lines = collect(&mut framer, b"1: caf\xe9.mov\r\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("1: caf"));
    }

    #[test]
    fn parse_header_variants() {
        let h = parse_header("200 ok").unwrap();
        assert_eq!(h.code, ResponseCode::new(200));
        assert_eq!(h.key, "ok");
        assert!(!h.has_colon);

        let h = parse_header("208 transport info:").unwrap();
        assert_eq!(h.code.value(), 208);
        assert_eq!(h.key, "transport info");
        assert!(h.has_colon);

        let h = parse_header("504 clip in use").unwrap();
        assert_eq!(h.key, "clip in use");
    }

    #[test]
    fn parse_header_rejects_malformed() {
        assert_eq!(parse_header("status: play"), None);
        assert_eq!(parse_header("20 ok"), None);
        assert_eq!(parse_header("2000 ok"), None);
        assert_eq!(parse_header("2x0 ok"), None);
        assert_eq!(parse_header("200"), None);
        assert_eq!(parse_header("200 :"), None);
        assert_eq!(parse_header("1: Intro.mov 00:00:00:00 00:00:05:00"), None);
    }

    #[test]
    fn response_code_ranges() {
        assert!(ResponseCode::new(200).is_success());
        assert!(ResponseCode::new(299).is_success());
        assert!(!ResponseCode::new(100).is_success());
        assert!(ResponseCode::new(100).in_outcome_range());
        assert!(ResponseCode::new(499).in_outcome_range());
        assert!(!ResponseCode::new(500).in_outcome_range());
        assert!(ResponseCode::new(508).is_async());
        assert_eq!(ResponseCode::new(5).to_string(), "005");
    }

    #[test]
    fn topic_table_is_case_sensitive_and_closed() {
        assert_eq!(
            ReadState::from_topic("transport info"),
            Some(ReadState::TransportInfo)
        );
        assert_eq!(ReadState::from_topic("Transport Info"), None);
        assert_eq!(ReadState::from_topic("slot info"), None);
        assert_eq!(ReadState::from_topic(OK_KEY), None);
        assert_eq!(ReadState::DiskList.topic(), Some("disk list"));
        assert_eq!(ReadState::None.topic(), None);
    }

    #[test]
    fn split_field_uses_first_colon() {
        assert_eq!(
            split_field("timecode: 01:00:00:00"),
            Some(("timecode", "01:00:00:00"))
        );
        assert_eq!(split_field("loop:true"), Some(("loop", "true")));
        assert_eq!(split_field("no colon here"), None);
        assert_eq!(split_field(": value"), None);
    }

    #[test]
    fn scalar_helpers() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("True"), None);
        assert!(is_timecode("01:00:00:00"));
        assert!(is_timecode("00:59:59;29"));
        assert!(!is_timecode("1:00:00:00"));
        assert!(!is_timecode("ProRes"));
    }
}
