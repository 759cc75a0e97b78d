//! Protocol error
use std::fmt;

/// An error when translating buffer from the server.
pub enum ProtocolError {
    /// Leading payload byte does not match any packet valid for the current phase.
    UnexpectedByte {
        found: u8,
        phase: &'static str,
    },
    /// Payload is shorter than its declared layout.
    Truncated {
        packet: &'static str,
    },
    /// Packet header carries a non consecutive sequence id.
    OutOfSync {
        expect: u8,
        found: u8,
    },
    /// Connection closed in the middle of a packet.
    UnexpectedEof,
    /// Server protocol version is not 10.
    UnsupportedVersion {
        version: u8,
    },
    /// Server replied with a non utf8 identifier.
    Utf8(std::str::Utf8Error),
}

impl ProtocolError {
    pub(crate) const fn unexpected_byte(found: u8, phase: &'static str) -> ProtocolError {
        Self::UnexpectedByte { found, phase }
    }

    pub(crate) const fn truncated(packet: &'static str) -> ProtocolError {
        Self::Truncated { packet }
    }

    pub(crate) const fn out_of_sync(expect: u8, found: u8) -> ProtocolError {
        Self::OutOfSync { expect, found }
    }

    pub(crate) const fn eof() -> ProtocolError {
        Self::UnexpectedEof
    }
}

impl From<std::str::Utf8Error> for ProtocolError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Utf8(err)
    }
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::UnexpectedByte { found, phase } => {
                write!(f, "unexpected packet `{found:#04x}` in `{phase}`")
            },
            Self::Truncated { packet } => {
                write!(f, "truncated `{packet}` packet")
            },
            Self::OutOfSync { expect, found } => {
                write!(f, "packets out of sync, expected sequence {expect} found {found}")
            },
            Self::UnexpectedEof => {
                write!(f, "connection closed in the middle of a packet")
            },
            Self::UnsupportedVersion { version } => {
                write!(f, "unsupported protocol version {version}")
            },
            Self::Utf8(ref err) => err.fmt(f),
        }
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
