//! TLS integration seam.
//!
//! The driver does not link a TLS implementation. Callers provide a
//! [`TlsUpgrader`] that wraps the plain stream after the ssl request
//! packet has been sent, typically backed by `rustls` or `native-tls`.
use std::{future::Future, io, pin::Pin};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::common::unit_error;

/// Object safe byte stream.
pub trait TlsStream: AsyncRead + AsyncWrite + Unpin + Send { }

impl<S> TlsStream for S where S: AsyncRead + AsyncWrite + Unpin + Send { }

/// Performs the TLS handshake over an established connection.
pub trait TlsUpgrader: Send + Sync {
    /// Wrap `stream` in TLS, verifying against `host`.
    fn upgrade<'a>(
        &'a self,
        stream: Box<dyn TlsStream>,
        host: &'a str,
    ) -> Pin<Box<dyn Future<Output = io::Result<Box<dyn TlsStream>>> + Send + 'a>>;
}

unit_error! {
    /// TLS was required but the server does not advertise support.
    pub struct TlsUnsupported("server does not support TLS");
}
