//! Network io.
mod socket;
mod tls;

pub use socket::Socket;
pub use tls::{TlsStream, TlsUnsupported, TlsUpgrader};
