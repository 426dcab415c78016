//! Core types shared by device drivers and their consumers.

use std::fmt;
use std::str::FromStr;

/// Lifecycle of a device connection.
///
/// `Disconnected -> Connecting -> Connected`, with `Error` reached from
/// either of the latter two when the socket fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    /// Whether commands can currently be written.
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Transport (playback/record) status reported by the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportStatus {
    Preview,
    #[default]
    Stopped,
    Play,
    Forward,
    Rewind,
    Jog,
    Shuttle,
    Record,
}

impl TransportStatus {
    /// The wire spelling used in `status:` fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportStatus::Preview => "preview",
            TransportStatus::Stopped => "stopped",
            TransportStatus::Play => "play",
            TransportStatus::Forward => "forward",
            TransportStatus::Rewind => "rewind",
            TransportStatus::Jog => "jog",
            TransportStatus::Shuttle => "shuttle",
            TransportStatus::Record => "record",
        }
    }
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a string cannot be parsed into a [`TransportStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(String);

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown transport status: {}", self.0)
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for TransportStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "preview" => Ok(TransportStatus::Preview),
            "stopped" => Ok(TransportStatus::Stopped),
            "play" => Ok(TransportStatus::Play),
            "forward" => Ok(TransportStatus::Forward),
            "rewind" => Ok(TransportStatus::Rewind),
            "jog" => Ok(TransportStatus::Jog),
            "shuttle" => Ok(TransportStatus::Shuttle),
            "record" => Ok(TransportStatus::Record),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(!ConnectionState::default().is_connected());
        assert!(ConnectionState::Connected.is_connected());
    }

    #[test]
    fn transport_status_parses_every_wire_value() {
        for s in [
            "preview", "stopped", "play", "forward", "rewind", "jog", "shuttle", "record",
        ] {
            let status: TransportStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
    }

    #[test]
    fn transport_status_rejects_unknown() {
        let err = "Play".parse::<TransportStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown transport status: Play");
    }
}
