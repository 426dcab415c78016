//! Canned protocol traffic shared by tests and the `--mock` test app.
//!
//! The blocks mirror what a HyperDeck Studio sends: a header line, `key: value`
//! lines, and a terminating empty line, all CRLF-terminated.

use crate::mock_tcp::MockDeckServer;
use crate::mock_transport::MockTransport;

/// Handshake block sent by the deck as soon as the socket is accepted.
pub const GREETING: &[u8] = b"500 connection info:\r\n\
protocol version: 1.11\r\n\
model: HyperDeck Studio Mini\r\n\
\r\n";

/// Subscription sent first after connect.
pub const NOTIFY_COMMAND: &str =
    "notify: transport: true slot: true display timecode: true timeline position: true";

/// Initial status queries, in the order the client sends them.
pub const INITIAL_QUERIES: [&str; 4] = ["device info", "transport info", "clips get", "disk list"];

/// Reply to the subscription command.
pub const OK: &[u8] = b"200 ok\r\n";

/// Reply to `device info`.
pub const DEVICE_INFO: &[u8] = b"204 device info:\r\n\
protocol version: 1.11\r\n\
model: HyperDeck Studio Mini\r\n\
unique id: 7c2e0d021714\r\n\
slot count: 2\r\n\
software version: 8.1\r\n\
name: Playout A\r\n\
\r\n";

/// Reply to `transport info`.
pub const TRANSPORT_INFO: &[u8] = b"208 transport info:\r\n\
status: stopped\r\n\
speed: 0\r\n\
slot id: 1\r\n\
slot name: SD1\r\n\
device name: Playout A\r\n\
clip id: 1\r\n\
single clip: false\r\n\
display timecode: 00:00:00:00\r\n\
timecode: 00:00:00:00\r\n\
video format: 1080p60\r\n\
loop: false\r\n\
timeline: 0\r\n\
\r\n";

/// Reply to `clips get`.
pub const CLIPS_INFO: &[u8] = b"205 clips info:\r\n\
clip count: 2\r\n\
1: Intro.mov 00:00:00:00 00:00:05:00\r\n\
2: Outro.mov 00:00:05:00 00:00:03:00\r\n\
\r\n";

/// Reply to `disk list`.
pub const DISK_LIST: &[u8] = b"206 disk list:\r\n\
slot id: 1\r\n\
update type: snapshot\r\n\
clip count: 2\r\n\
1: Intro.mov ProRes 1080p60 00:00:05:00\r\n\
2: Outro.mov ProRes 1080p60 00:00:03:00\r\n\
\r\n";

/// Responses to the initial queries, aligned with [`INITIAL_QUERIES`].
pub const INITIAL_RESPONSES: [&[u8]; 4] = [DEVICE_INFO, TRANSPORT_INFO, CLIPS_INFO, DISK_LIST];

/// Script the full connect sequence on a mock server.
pub fn script_handshake(server: &mut MockDeckServer) {
    server.push(GREETING);
    server.expect_line(NOTIFY_COMMAND, OK);
    for (query, response) in INITIAL_QUERIES.iter().zip(INITIAL_RESPONSES) {
        server.expect_line(query, response);
    }
}

/// Script the full connect sequence on a mock transport.
pub fn mock_handshake(mock: &mut MockTransport) {
    mock.push_unsolicited(GREETING);
    mock.expect_line(NOTIFY_COMMAND, OK);
    for (query, response) in INITIAL_QUERIES.iter().zip(INITIAL_RESPONSES) {
        mock.expect_line(query, response);
    }
}
