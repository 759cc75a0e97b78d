//! Server response packets.
//!
//! The wire carries no packet type byte, what a payload means depends on
//! the phase of the exchange. Each expected packet type therefore decodes
//! itself from the payload, validating its leading byte where one exists.
use bytes::{Buf, Bytes};

use super::{
    MySqlType,
    capability::{self, Capabilities},
    error::ProtocolError,
};
use crate::{common::ByteStr, ext::BytesExt};

/// A type that can be decoded from a server packet payload.
pub trait BackendPacket: Sized {
    fn decode(payload: Bytes) -> Result<Self, ProtocolError>;
}

/// Returns `true` if the payload is an EOF packet.
///
/// The `0xfe` byte also prefixes 8-byte length-encoded integers, the two
/// are distinguished by the payload being shorter than 9 bytes.
pub(crate) fn is_eof(payload: &[u8]) -> bool {
    payload.first() == Some(&0xfe) && payload.len() < 9
}

/// Initial handshake packet sent by the server on connect.
#[derive(Debug)]
pub struct Greeting {
    pub server_version: ByteStr,
    pub connection_id: u32,
    pub capabilities: Capabilities,
    pub charset: u8,
    pub status: u16,
    /// Auth challenge, both parts joined with the trailing nul removed.
    pub auth_data: Vec<u8>,
    pub auth_plugin: ByteStr,
}

impl BackendPacket for Greeting {
    fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        if payload.remaining() < 1 {
            return Err(ProtocolError::truncated("Greeting"));
        }
        let version = payload.get_u8();
        if version != 10 {
            return Err(ProtocolError::UnsupportedVersion { version });
        }

        let server_version = payload.get_nul_bytestr()?;

        if payload.remaining() < 4 + 8 + 1 + 2 {
            return Err(ProtocolError::truncated("Greeting"));
        }
        let connection_id = payload.get_u32_le();
        let mut auth_data = payload.split_to(8).to_vec();
        payload.advance(1); // filler
        let cap_lower = payload.get_u16_le();

        if payload.remaining() < 1 + 2 + 2 + 1 + 10 {
            return Err(ProtocolError::truncated("Greeting"));
        }
        let charset = payload.get_u8();
        let status = payload.get_u16_le();
        let cap_upper = payload.get_u16_le();
        let auth_data_len = payload.get_u8();
        payload.advance(10); // reserved

        let capabilities =
            Capabilities::new(u32::from(cap_lower) | (u32::from(cap_upper) << 16));

        if capabilities.contains(capability::CLIENT_SECURE_CONNECTION) {
            let part2_len = usize::max(13, usize::from(auth_data_len).saturating_sub(8));
            let part2 = payload.split_to(usize::min(part2_len, payload.remaining()));
            auth_data.extend(part2.iter().copied().take_while(|&b| b != 0));
        }

        let auth_plugin = match capabilities.contains(capability::CLIENT_PLUGIN_AUTH)
            && payload.has_remaining()
        {
            true => payload.get_nul_bytestr()?,
            false => ByteStr::from_static("mysql_native_password"),
        };

        Ok(Self {
            server_version,
            connection_id,
            capabilities,
            charset,
            status,
            auth_data,
            auth_plugin,
        })
    }
}

/// Successful command completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status: u16,
    pub warnings: u16,
}

impl OkPacket {
    /// Parse the body after the `0x00` header byte.
    pub(crate) fn parse(mut body: Bytes) -> Result<Self, ProtocolError> {
        let affected_rows = body.get_lenenc_int()?;
        let last_insert_id = body.get_lenenc_int()?;
        if body.remaining() < 4 {
            return Err(ProtocolError::truncated("OK"));
        }
        let status = body.get_u16_le();
        let warnings = body.get_u16_le();
        // session state info may follow, not requested
        Ok(Self { affected_rows, last_insert_id, status, warnings })
    }
}

impl BackendPacket for OkPacket {
    fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        match payload.first() {
            Some(0x00) => {
                payload.advance(1);
                Self::parse(payload)
            },
            Some(&found) => Err(ProtocolError::unexpected_byte(found, "OK")),
            None => Err(ProtocolError::truncated("OK")),
        }
    }
}

/// Result set or row phase terminator.
#[derive(Debug, Clone, Copy)]
pub struct EofPacket {
    pub warnings: u16,
    pub status: u16,
}

impl BackendPacket for EofPacket {
    fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        if !is_eof(&payload) {
            return match payload.first() {
                Some(&found) => Err(ProtocolError::unexpected_byte(found, "EOF")),
                None => Err(ProtocolError::truncated("EOF")),
            };
        }
        payload.advance(1);
        if payload.remaining() < 4 {
            return Err(ProtocolError::truncated("EOF"));
        }
        Ok(Self {
            warnings: payload.get_u16_le(),
            status: payload.get_u16_le(),
        })
    }
}

/// Error reported by the server.
///
/// Code, 5 character SQLSTATE and message are preserved verbatim.
#[derive(Clone)]
pub struct SqlError {
    code: u16,
    state: [u8; 5],
    message: ByteStr,
}

impl SqlError {
    pub(crate) fn parse(mut payload: Bytes) -> Result<Self, ProtocolError> {
        if payload.remaining() < 3 {
            return Err(ProtocolError::truncated("ERR"));
        }
        payload.advance(1); // 0xff header
        let code = payload.get_u16_le();

        let mut state = *b"HY000";
        if payload.first() == Some(&b'#') {
            if payload.remaining() < 6 {
                return Err(ProtocolError::truncated("ERR"));
            }
            payload.advance(1);
            state.copy_from_slice(&payload.split_to(5));
        }

        let message = ByteStr::from_utf8(payload)?;
        Ok(Self { code, state, message })
    }

    /// Server error code, e.g. `1062` for a duplicate key.
    pub const fn code(&self) -> u16 {
        self.code
    }

    /// Five character SQLSTATE.
    pub fn sql_state(&self) -> &str {
        // SAFETY: parsed from a utf8 checked payload or the ascii default
        unsafe { std::str::from_utf8_unchecked(&self.state) }
    }

    /// Human readable error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` if the connection is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.code,
            // too many connections | access denied | host blocked | host not allowed
            1040 | 1045 | 1129 | 1130
            // aborting connection | server shutdown
            | 1152 | 1053
        ) || self.state.starts_with(b"08")
    }

    /// Returns `true` if retrying the statement may succeed.
    pub fn is_transient(&self) -> bool {
        // lock wait timeout | deadlock
        matches!(self.code, 1205 | 1213) || &self.state == b"40001"
    }
}

impl std::error::Error for SqlError { }

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}) [{}] {}", self.code, self.sql_state(), self.message)
    }
}

impl std::fmt::Debug for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Reply within the authentication exchange.
#[derive(Debug)]
pub enum AuthReply {
    Ok(OkPacket),
    /// Server requests a different plugin with a fresh challenge.
    Switch(AuthSwitch),
    /// Plugin specific continuation data.
    MoreData(Bytes),
}

#[derive(Debug)]
pub struct AuthSwitch {
    pub plugin: ByteStr,
    pub data: Bytes,
}

impl BackendPacket for AuthReply {
    fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        match payload.first() {
            Some(0x00) => {
                payload.advance(1);
                Ok(Self::Ok(OkPacket::parse(payload)?))
            },
            Some(0xfe) => {
                payload.advance(1);
                let plugin = payload.get_nul_bytestr()?;
                Ok(Self::Switch(AuthSwitch { plugin, data: payload }))
            },
            Some(0x01) => {
                payload.advance(1);
                Ok(Self::MoreData(payload))
            },
            Some(&found) => Err(ProtocolError::unexpected_byte(found, "authentication")),
            None => Err(ProtocolError::truncated("authentication reply")),
        }
    }
}

/// First packet of a statement response.
#[derive(Debug)]
pub enum QueryResponse {
    /// The statement produced no result set.
    Ok(OkPacket),
    /// A result set follows, with this many column definitions.
    ResultSet(u64),
}

impl BackendPacket for QueryResponse {
    fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        match payload.first() {
            Some(0x00) => {
                payload.advance(1);
                Ok(Self::Ok(OkPacket::parse(payload)?))
            },
            // LOCAL INFILE is a client file disclosure vector, never enabled
            Some(0xfb) => Err(ProtocolError::unexpected_byte(0xfb, "query response")),
            Some(_) => Ok(Self::ResultSet(payload.get_lenenc_int()?)),
            None => Err(ProtocolError::truncated("query response")),
        }
    }
}

/// First packet of a prepare response.
#[derive(Debug, Clone, Copy)]
pub struct PrepareOk {
    pub statement_id: u32,
    pub columns: u16,
    pub params: u16,
    pub warnings: u16,
}

impl BackendPacket for PrepareOk {
    fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        match payload.first() {
            Some(0x00) => { },
            Some(&found) => return Err(ProtocolError::unexpected_byte(found, "prepare")),
            None => return Err(ProtocolError::truncated("PrepareOk")),
        }
        if payload.remaining() < 12 {
            return Err(ProtocolError::truncated("PrepareOk"));
        }
        payload.advance(1);
        let statement_id = payload.get_u32_le();
        let columns = payload.get_u16_le();
        let params = payload.get_u16_le();
        payload.advance(1); // filler
        let warnings = payload.get_u16_le();
        Ok(Self { statement_id, columns, params, warnings })
    }
}

/// Column metadata within a result set or prepare response.
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub name: ByteStr,
    pub charset: u16,
    pub column_length: u32,
    pub ty: MySqlType,
    pub flags: u16,
    pub decimals: u8,
}

impl ColumnDefinition {
    pub(crate) const UNSIGNED_FLAG: u16 = 32;

    pub const fn is_unsigned(&self) -> bool {
        self.flags & Self::UNSIGNED_FLAG != 0
    }
}

impl BackendPacket for ColumnDefinition {
    fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        payload.get_lenenc_bytes()?; // catalog
        payload.get_lenenc_bytes()?; // schema
        payload.get_lenenc_bytes()?; // table
        payload.get_lenenc_bytes()?; // org_table
        let name = payload.get_lenenc_bytestr()?;
        payload.get_lenenc_bytes()?; // org_name

        payload.get_lenenc_int()?; // fixed fields length, always 0x0c
        if payload.remaining() < 2 + 4 + 1 + 2 + 1 {
            return Err(ProtocolError::truncated("ColumnDefinition"));
        }
        let charset = payload.get_u16_le();
        let column_length = payload.get_u32_le();
        let ty = MySqlType::from_code(payload.get_u8())?;
        let flags = payload.get_u16_le();
        let decimals = payload.get_u8();

        Ok(Self { name, charset, column_length, ty, flags, decimals })
    }
}

/// A row packet or the terminator ending the row phase.
#[derive(Debug)]
pub enum RowPacket {
    Row(Bytes),
    Eof(EofPacket),
}

impl BackendPacket for RowPacket {
    fn decode(payload: Bytes) -> Result<Self, ProtocolError> {
        if payload.is_empty() {
            return Err(ProtocolError::truncated("row"));
        }
        match is_eof(&payload) {
            true => Ok(Self::Eof(EofPacket::decode(payload)?)),
            false => Ok(Self::Row(payload)),
        }
    }
}
