//! Client command packets.
use bytes::{BufMut, BytesMut};

use super::packet::{self, HEADER_LEN, MAX_PAYLOAD_LEN, PacketCodec};
use crate::{encode::Encoded, ext::{BufMutExt, lenenc_int_len}};

/// Write a client packet to `buf`, continuing the exchange in `codec`.
pub fn write<F: FrontendPacket>(msg: F, codec: &mut PacketCodec, buf: &mut BytesMut) {
    let size_hint = msg.size_hint();

    if size_hint >= MAX_PAYLOAD_LEN {
        // oversized payloads go through a scratch buffer for splitting
        let mut payload = BytesMut::with_capacity(size_hint);
        msg.encode(&mut payload);
        let mut seq = codec.seq();
        packet::encode(&payload, &mut seq, buf);
        codec.set_seq(seq);
        return;
    }

    buf.reserve(HEADER_LEN + size_hint);

    let offset = buf.len();
    buf.put_uint_le(size_hint as u64, 3);
    buf.put_u8(codec.next_seq());

    msg.encode(&mut *buf);

    assert_eq!(
        buf.len() - offset,
        HEADER_LEN + size_hint,
        "packet body size not equal to size hint"
    );
}

/// Write a client packet as its own exchange, sequence starting at zero.
///
/// Used for commands that have no server response and may be buffered in
/// the middle of another exchange, such as closing an evicted statement.
pub fn write_detached<F: FrontendPacket>(msg: F, buf: &mut BytesMut) {
    let mut seq = 0;
    let size_hint = msg.size_hint();

    if size_hint >= MAX_PAYLOAD_LEN {
        let mut payload = BytesMut::with_capacity(size_hint);
        msg.encode(&mut payload);
        packet::encode(&payload, &mut seq, buf);
        return;
    }

    buf.reserve(HEADER_LEN + size_hint);
    buf.put_uint_le(size_hint as u64, 3);
    buf.put_u8(seq);
    msg.encode(&mut *buf);
}

/// A type which can be encoded into a client packet payload.
pub trait FrontendPacket {
    /// Size of the payload.
    fn size_hint(&self) -> usize;

    /// Write the payload.
    ///
    /// The length of body written must be equal to the length returned by
    /// [`size_hint`][FrontendPacket::size_hint].
    fn encode(self, buf: impl BufMut);
}

/// Execute a statement with the text protocol.
pub struct ComQuery<'a> {
    pub sql: &'a str,
}

impl FrontendPacket for ComQuery<'_> {
    fn size_hint(&self) -> usize {
        1 + self.sql.len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(0x03);
        buf.put(self.sql.as_bytes());
    }
}

/// Prepare a statement on the server.
pub struct ComStmtPrepare<'a> {
    pub sql: &'a str,
}

impl FrontendPacket for ComStmtPrepare<'_> {
    fn size_hint(&self) -> usize {
        1 + self.sql.len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(0x16);
        buf.put(self.sql.as_bytes());
    }
}

/// Execute a prepared statement with bound parameters.
pub struct ComStmtExecute<'a, 'q> {
    pub statement_id: u32,
    /// Request a read only server side cursor instead of streaming all rows.
    pub cursor: bool,
    pub params: &'a [Encoded<'q>],
}

impl FrontendPacket for ComStmtExecute<'_, '_> {
    fn size_hint(&self) -> usize {
        let mut size = 1 + 4 + 1 + 4;
        if !self.params.is_empty() {
            // null bitmap + new-params-bound flag + type/flag pairs
            size += self.params.len().div_ceil(8) + 1 + 2 * self.params.len();
            size += self.params.iter().map(Encoded::value_len).sum::<usize>();
        }
        size
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(0x17);
        buf.put_u32_le(self.statement_id);
        buf.put_u8(if self.cursor { 0x01 } else { 0x00 }); // CURSOR_TYPE_READ_ONLY
        buf.put_u32_le(1); // iteration count

        if self.params.is_empty() {
            return;
        }

        let mut bitmap = vec![0u8; self.params.len().div_ceil(8)];
        for (i, param) in self.params.iter().enumerate() {
            if param.is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        buf.put(&bitmap[..]);

        buf.put_u8(1); // new params bound
        for param in self.params {
            buf.put_u8(param.mysql_type().code());
            buf.put_u8(if param.is_unsigned() { 0x80 } else { 0x00 });
        }

        for param in self.params {
            param.encode_value(&mut buf);
        }
    }
}

/// Deallocate a prepared statement, the server sends no response.
pub struct ComStmtClose {
    pub statement_id: u32,
}

impl FrontendPacket for ComStmtClose {
    fn size_hint(&self) -> usize {
        1 + 4
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(0x19);
        buf.put_u32_le(self.statement_id);
    }
}

/// Pull the next batch of rows from a server side cursor.
pub struct ComStmtFetch {
    pub statement_id: u32,
    pub rows: u32,
}

impl FrontendPacket for ComStmtFetch {
    fn size_hint(&self) -> usize {
        1 + 4 + 4
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(0x1c);
        buf.put_u32_le(self.statement_id);
        buf.put_u32_le(self.rows);
    }
}

/// Liveness check, the server answers with an OK packet.
pub struct ComPing;

impl FrontendPacket for ComPing {
    fn size_hint(&self) -> usize {
        1
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(0x0e);
    }
}

/// Orderly shutdown, the server closes the connection.
pub struct ComQuit;

impl FrontendPacket for ComQuit {
    fn size_hint(&self) -> usize {
        1
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(0x01);
    }
}

/// Abbreviated handshake response requesting a TLS upgrade.
///
/// Sent before any credentials, the full [`HandshakeResponse`] follows on
/// the encrypted stream.
pub struct SslRequest {
    pub capabilities: u32,
    pub charset: u8,
}

impl FrontendPacket for SslRequest {
    fn size_hint(&self) -> usize {
        4 + 4 + 1 + 23
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u32_le(self.capabilities);
        buf.put_u32_le(MAX_PAYLOAD_LEN as u32);
        buf.put_u8(self.charset);
        buf.put_bytes(0, 23);
    }
}

/// Reply to the server greeting carrying credentials.
pub struct HandshakeResponse<'a> {
    pub capabilities: u32,
    pub charset: u8,
    pub user: &'a str,
    pub auth_response: &'a [u8],
    pub database: Option<&'a str>,
    pub auth_plugin: &'a str,
}

impl FrontendPacket for HandshakeResponse<'_> {
    fn size_hint(&self) -> usize {
        4 + 4 + 1 + 23
            + self.user.len() + 1
            + lenenc_int_len(self.auth_response.len() as u64) + self.auth_response.len()
            + self.database.map_or(0, |db| db.len() + 1)
            + self.auth_plugin.len() + 1
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u32_le(self.capabilities);
        buf.put_u32_le(MAX_PAYLOAD_LEN as u32);
        buf.put_u8(self.charset);
        buf.put_bytes(0, 23);
        buf.put_nul_string(self.user);
        buf.put_lenenc_bytes(self.auth_response);
        if let Some(db) = self.database {
            buf.put_nul_string(db);
        }
        buf.put_nul_string(self.auth_plugin);
    }
}

/// Raw continuation data within the authentication exchange.
///
/// Carries the response to an auth switch request, or the clear password
/// for `caching_sha2_password` full authentication over TLS.
pub struct AuthData<'a> {
    pub data: &'a [u8],
}

impl FrontendPacket for AuthData<'_> {
    fn size_hint(&self) -> usize {
        self.data.len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put(self.data);
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use super::*;
    use crate::encode::Encode;

    fn payload<F: FrontendPacket>(msg: F) -> Vec<u8> {
        let hint = msg.size_hint();
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        assert_eq!(buf.len(), hint, "size hint mismatch");
        buf.to_vec()
    }

    #[test]
    fn com_query() {
        assert_eq!(payload(ComQuery { sql: "SELECT 1" }), b"\x03SELECT 1");
    }

    #[test]
    fn com_stmt_close() {
        assert_eq!(payload(ComStmtClose { statement_id: 7 }), [0x19, 7, 0, 0, 0]);
    }

    #[test]
    fn stmt_execute_null_bitmap_and_types() {
        let params = vec![1_i32.encode(), Option::<i32>::None.encode(), "x".encode()];
        let body = payload(ComStmtExecute { statement_id: 3, cursor: false, params: &params });

        assert_eq!(body[0], 0x17);
        assert_eq!(&body[1..5], [3, 0, 0, 0]);
        assert_eq!(body[5], 0x00); // no cursor
        assert_eq!(&body[6..10], [1, 0, 0, 0]);
        assert_eq!(body[10], 0b0000_0010); // second param null
        assert_eq!(body[11], 1); // new params bound
        // type/flag pairs: Long, Null, VarString
        assert_eq!(&body[12..18], [0x03, 0x00, 0x06, 0x00, 0xfd, 0x00]);
        // values: i32 le, then lenenc "x"
        assert_eq!(&body[18..22], [1, 0, 0, 0]);
        assert_eq!(&body[22..], [1, b'x']);
    }

    #[test]
    fn ssl_request_carries_no_credentials() {
        let body = payload(SslRequest { capabilities: 0x0800, charset: 33 });
        assert_eq!(body.len(), 32);
        assert_eq!(&body[..4], [0x00, 0x08, 0, 0]);
    }

    #[test]
    fn handshake_response_layout() {
        let body = payload(HandshakeResponse {
            capabilities: 0x0200,
            charset: 33,
            user: "root",
            auth_response: &[0xaa; 20],
            database: Some("db"),
            auth_plugin: "mysql_native_password",
        });
        assert_eq!(&body[..4], [0x00, 0x02, 0, 0]);
        assert_eq!(&body[32..37], b"root\0");
        assert_eq!(body[37], 20);
        assert_eq!(&body[58..61], b"db\0");
        assert_eq!(&body[61..], b"mysql_native_password\0");
    }
}
