//! `mystro` error types.
use std::{backtrace::Backtrace, fmt, io, str::Utf8Error};

use crate::{
    common::unit_error,
    connection::ParseError,
    mysql::{ProtocolError, auth::UnsupportedAuth, backend::SqlError},
    net::TlsUnsupported,
    row::{DecodeError, RowNotFound},
};

/// A specialized [`Result`] type for `mystro` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `mystro` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Mark a database error raised during the handshake as an
    /// authentication failure.
    pub(crate) fn into_auth(mut self) -> Self {
        if let ErrorKind::Database(err) = self.kind {
            self.kind = ErrorKind::Auth(AuthError(err));
        }
        self
    }
}

/// All possible error kind from `mystro` library.
pub enum ErrorKind {
    Config(ParseError),
    Protocol(ProtocolError),
    Io(io::Error),
    Database(SqlError),
    Auth(AuthError),
    Tls(TlsUnsupported),
    Timeout(TimeoutError),
    Utf8(Utf8Error),
    RowNotFound(RowNotFound),
    UnsupportedAuth(UnsupportedAuth),
    Decode(DecodeError),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<io::Error>e => ErrorKind::Io(e));
from!(<SqlError>e => ErrorKind::Database(e));
from!(<AuthError>e => ErrorKind::Auth(e));
from!(<TlsUnsupported>e => ErrorKind::Tls(e));
from!(<TimeoutError>e => ErrorKind::Timeout(e));
from!(<Utf8Error>e => ErrorKind::Utf8(e));
from!(<RowNotFound>e => ErrorKind::RowNotFound(e));
from!(<UnsupportedAuth>e => ErrorKind::UnsupportedAuth(e));

from!(<DecodeError>e => ErrorKind::Decode(e));

unit_error! {
    /// A read deadline elapsed, the connection is left unusable.
    pub struct TimeoutError("operation timed out waiting for the server");
}

/// The server rejected the offered credentials.
pub struct AuthError(SqlError);

impl AuthError {
    pub fn sql_error(&self) -> &SqlError {
        &self.0
    }
}

impl std::error::Error for AuthError { }

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "authentication failed: {}", self.0)
    }
}

impl fmt::Debug for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::Auth(e) => e.fmt(f),
            Self::Tls(e) => e.fmt(f),
            Self::Timeout(e) => e.fmt(f),
            Self::UnsupportedAuth(e) => e.fmt(f),
            Self::RowNotFound(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
