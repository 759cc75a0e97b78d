//! MySQL wire protocol.
//!
//! Framing, capability negotiation, authentication scrambles and the
//! client/server packet types of the text and binary protocols.
pub mod auth;
pub mod backend;
pub mod capability;
pub mod error;
pub mod frontend;
pub mod packet;

mod types;

pub use capability::{Capabilities, status};
pub use error::ProtocolError;
pub use types::MySqlType;
