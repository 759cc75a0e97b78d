//! Connection tests against a scripted server on an in memory duplex pipe.
use std::{
    num::NonZeroUsize,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::Poll,
    time::Duration,
};

use futures_core::Stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

use crate::{
    Config, Connection, ErrorKind,
    common::ByteStr,
    connection::TlsMode,
    fetch::sql_hash,
    mysql::{auth, capability, status},
    net::{Socket, TlsStream, TlsUpgrader},
    statement::StatementHandle,
};

const SERVER_CAPS: u32 = capability::CLIENT_LONG_PASSWORD
    | capability::CLIENT_PROTOCOL_41
    | capability::CLIENT_CONNECT_WITH_DB
    | capability::CLIENT_TRANSACTIONS
    | capability::CLIENT_SECURE_CONNECTION
    | capability::CLIENT_PLUGIN_AUTH
    | capability::CLIENT_MULTI_RESULTS
    | capability::CLIENT_PS_MULTI_RESULTS;

const NONCE: [u8; 20] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20,
];

// ===== wire helpers =====

async fn read_packet(io: &mut DuplexStream) -> (u8, Vec<u8>) {
    let mut header = [0u8; 4];
    io.read_exact(&mut header).await.unwrap();
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut payload = vec![0u8; len];
    io.read_exact(&mut payload).await.unwrap();
    (header[3], payload)
}

async fn write_packet(io: &mut DuplexStream, seq: u8, payload: &[u8]) {
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
    buf.push(seq);
    buf.extend_from_slice(payload);
    io.write_all(&buf).await.unwrap();
}

fn greeting(plugin: &str, caps: u32) -> Vec<u8> {
    let mut p = vec![10];
    p.extend_from_slice(b"8.0.36\0");
    p.extend_from_slice(&77u32.to_le_bytes());
    p.extend_from_slice(&NONCE[..8]);
    p.push(0);
    p.extend_from_slice(&(caps as u16).to_le_bytes());
    p.push(45);
    p.extend_from_slice(&2u16.to_le_bytes());
    p.extend_from_slice(&((caps >> 16) as u16).to_le_bytes());
    p.push(21);
    p.extend_from_slice(&[0; 10]);
    p.extend_from_slice(&NONCE[8..]);
    p.push(0);
    p.extend_from_slice(plugin.as_bytes());
    p.push(0);
    p
}

fn ok_packet(affected: u8, stat: u16) -> Vec<u8> {
    let mut p = vec![0x00, affected, 0x00];
    p.extend_from_slice(&stat.to_le_bytes());
    p.extend_from_slice(&0u16.to_le_bytes());
    p
}

fn eof_packet(stat: u16) -> Vec<u8> {
    let mut p = vec![0xfe, 0, 0];
    p.extend_from_slice(&stat.to_le_bytes());
    p
}

fn lenenc_str(p: &mut Vec<u8>, s: &str) {
    p.push(s.len() as u8);
    p.extend_from_slice(s.as_bytes());
}

fn column_def(name: &str, ty: u8) -> Vec<u8> {
    let mut p = Vec::new();
    for s in ["def", "", "t", "t", name, name] {
        lenenc_str(&mut p, s);
    }
    p.push(0x0c);
    p.extend_from_slice(&45u16.to_le_bytes());
    p.extend_from_slice(&255u32.to_le_bytes());
    p.push(ty);
    p.extend_from_slice(&0u16.to_le_bytes());
    p.push(0);
    p.extend_from_slice(&[0, 0]);
    p
}

fn text_row(values: &[&str]) -> Vec<u8> {
    let mut p = Vec::new();
    for value in values {
        lenenc_str(&mut p, value);
    }
    p
}

fn prepare_ok(id: u32, params: u16, columns: u16) -> Vec<u8> {
    let mut p = vec![0x00];
    p.extend_from_slice(&id.to_le_bytes());
    p.extend_from_slice(&columns.to_le_bytes());
    p.extend_from_slice(&params.to_le_bytes());
    p.push(0);
    p.extend_from_slice(&0u16.to_le_bytes());
    p
}

/// Scramble bytes out of a handshake response payload.
fn parse_auth_response(payload: &[u8]) -> (String, Vec<u8>) {
    let rest = &payload[32..];
    let nul = rest.iter().position(|&b| b == 0).unwrap();
    let user = String::from_utf8(rest[..nul].to_vec()).unwrap();
    let rest = &rest[nul + 1..];
    let len = rest[0] as usize;
    (user, rest[1..1 + len].to_vec())
}

/// Greeting, handshake response and OK for `mysql_native_password`.
async fn accept_native(io: &mut DuplexStream, user: &str, password: &str) {
    write_packet(io, 0, &greeting("mysql_native_password", SERVER_CAPS)).await;
    let (seq, payload) = read_packet(io).await;
    assert_eq!(seq, 1);
    let (got_user, scramble) = parse_auth_response(&payload);
    assert_eq!(got_user, user);
    assert_eq!(scramble, auth::native_scramble(password, &NONCE));
    write_packet(io, 2, &ok_packet(0, status::SERVER_STATUS_AUTOCOMMIT)).await;
}

fn config() -> Config {
    Config {
        user: "root".into(),
        pass: "secret".into(),
        ..Config::default()
    }
}

async fn connect(client: DuplexStream, config: &Config) -> crate::Result<Connection> {
    Connection::connect_socket(Socket::from_stream(Box::new(client)), config).await
}

// ===== tests =====

#[tokio::test]
async fn native_handshake_and_text_query() {
    let (client, mut server) = duplex(8192);

    let server = tokio::spawn(async move {
        accept_native(&mut server, "root", "secret").await;

        let (seq, payload) = read_packet(&mut server).await;
        assert_eq!(seq, 0);
        assert_eq!(payload, b"\x03SELECT 1");

        write_packet(&mut server, 1, &[0x01]).await;
        write_packet(&mut server, 2, &column_def("1", 0x08)).await;
        write_packet(&mut server, 3, &eof_packet(0)).await;
        write_packet(&mut server, 4, &text_row(&["1"])).await;
        write_packet(&mut server, 5, &eof_packet(0)).await;
    });

    let mut conn = connect(client, &config()).await.unwrap();
    assert_eq!(conn.server_version(), "8.0.36");
    assert_eq!(conn.connection_id(), 77);

    let (one,) = crate::query::<_, _, (i64,)>("SELECT 1", &mut conn)
        .fetch_one()
        .await
        .unwrap();
    assert_eq!(one, 1);

    server.await.unwrap();
}

#[tokio::test]
async fn auth_switch_once_succeeds() {
    let (client, mut server) = duplex(8192);

    let server = tokio::spawn(async move {
        write_packet(&mut server, 0, &greeting("caching_sha2_password", SERVER_CAPS)).await;
        let (seq, _) = read_packet(&mut server).await;
        assert_eq!(seq, 1);

        let mut switch = vec![0xfe];
        switch.extend_from_slice(b"mysql_native_password\0");
        switch.extend_from_slice(&NONCE);
        switch.push(0);
        write_packet(&mut server, 2, &switch).await;

        let (seq, scramble) = read_packet(&mut server).await;
        assert_eq!(seq, 3);
        assert_eq!(scramble, auth::native_scramble("secret", &NONCE));
        write_packet(&mut server, 4, &ok_packet(0, 0)).await;

        // liveness check after the switched auth
        let (seq, payload) = read_packet(&mut server).await;
        assert_eq!((seq, payload.as_slice()), (0, &[0x0e_u8][..]));
        write_packet(&mut server, 1, &ok_packet(0, 0)).await;
    });

    let mut conn = connect(client, &config()).await.unwrap();
    conn.ping().await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn second_auth_switch_is_rejected() {
    let (client, mut server) = duplex(8192);

    let server = tokio::spawn(async move {
        write_packet(&mut server, 0, &greeting("mysql_native_password", SERVER_CAPS)).await;
        read_packet(&mut server).await;

        let mut switch = vec![0xfe];
        switch.extend_from_slice(b"mysql_native_password\0");
        switch.extend_from_slice(&NONCE);
        switch.push(0);
        write_packet(&mut server, 2, &switch).await;
        read_packet(&mut server).await;
        write_packet(&mut server, 4, &switch).await;
    });

    let err = connect(client, &config()).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Protocol(_)), "{err:?}");

    server.await.unwrap();
}

#[tokio::test]
async fn abandoned_rows_are_drained_before_next_query() {
    let (client, mut server) = duplex(8192);

    let server = tokio::spawn(async move {
        accept_native(&mut server, "root", "secret").await;

        let (_, payload) = read_packet(&mut server).await;
        assert_eq!(payload, b"\x03SELECT id FROM t");
        write_packet(&mut server, 1, &[0x01]).await;
        write_packet(&mut server, 2, &column_def("id", 0x08)).await;
        write_packet(&mut server, 3, &eof_packet(0)).await;
        write_packet(&mut server, 4, &text_row(&["1"])).await;
        write_packet(&mut server, 5, &text_row(&["2"])).await;
        write_packet(&mut server, 6, &text_row(&["3"])).await;
        write_packet(&mut server, 7, &eof_packet(0)).await;

        // second query only arrives once the first response was eaten
        let (seq, payload) = read_packet(&mut server).await;
        assert_eq!(seq, 0);
        assert_eq!(payload, b"\x03SELECT 9");
        write_packet(&mut server, 1, &[0x01]).await;
        write_packet(&mut server, 2, &column_def("9", 0x08)).await;
        write_packet(&mut server, 3, &eof_packet(0)).await;
        write_packet(&mut server, 4, &text_row(&["9"])).await;
        write_packet(&mut server, 5, &eof_packet(0)).await;
    });

    let mut conn = connect(client, &config()).await.unwrap();

    let mut rows = crate::query::<_, _, (i64,)>("SELECT id FROM t", &mut conn).fetch();
    let first = std::future::poll_fn(|cx| Pin::new(&mut rows).poll_next(cx))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.0, 1);
    drop(rows);

    let (nine,) = crate::query::<_, _, (i64,)>("SELECT 9", &mut conn)
        .fetch_one()
        .await
        .unwrap();
    assert_eq!(nine, 9);

    server.await.unwrap();
}

#[tokio::test]
async fn prepared_query_decodes_binary_rows() {
    let (client, mut server) = duplex(8192);

    let server = tokio::spawn(async move {
        accept_native(&mut server, "root", "secret").await;

        let (_, payload) = read_packet(&mut server).await;
        assert_eq!(payload, b"\x16SELECT ?");
        write_packet(&mut server, 1, &prepare_ok(9, 1, 1)).await;
        write_packet(&mut server, 2, &column_def("?", 0xfd)).await;
        write_packet(&mut server, 3, &eof_packet(0)).await;
        write_packet(&mut server, 4, &column_def("v", 0x03)).await;
        write_packet(&mut server, 5, &eof_packet(0)).await;

        let (seq, payload) = read_packet(&mut server).await;
        assert_eq!(seq, 0);
        assert_eq!(payload[0], 0x17);
        assert_eq!(&payload[1..5], 9u32.to_le_bytes());
        assert_eq!(payload[5], 0x00); // no cursor

        write_packet(&mut server, 1, &[0x01]).await;
        write_packet(&mut server, 2, &column_def("v", 0x03)).await;
        write_packet(&mut server, 3, &eof_packet(0)).await;
        write_packet(&mut server, 4, &[0x00, 0x00, 7, 0, 0, 0]).await;
        write_packet(&mut server, 5, &eof_packet(0)).await;
    });

    let mut conn = connect(client, &config()).await.unwrap();

    let (v,) = crate::query::<_, _, (i32,)>("SELECT ?", &mut conn)
        .bind(7)
        .fetch_one()
        .await
        .unwrap();
    assert_eq!(v, 7);

    server.await.unwrap();
}

#[tokio::test]
async fn cursor_fetch_pulls_rows_in_batches() {
    let (client, mut server) = duplex(8192);

    let server = tokio::spawn(async move {
        accept_native(&mut server, "root", "secret").await;

        let (_, payload) = read_packet(&mut server).await;
        assert_eq!(payload[0], 0x16);
        write_packet(&mut server, 1, &prepare_ok(4, 1, 1)).await;
        write_packet(&mut server, 2, &column_def("?", 0xfd)).await;
        write_packet(&mut server, 3, &eof_packet(0)).await;
        write_packet(&mut server, 4, &column_def("id", 0x03)).await;
        write_packet(&mut server, 5, &eof_packet(0)).await;

        let (_, payload) = read_packet(&mut server).await;
        assert_eq!(payload[0], 0x17);
        assert_eq!(payload[5], 0x01); // CURSOR_TYPE_READ_ONLY

        // cursor opened, no rows inline
        write_packet(&mut server, 1, &[0x01]).await;
        write_packet(&mut server, 2, &column_def("id", 0x03)).await;
        write_packet(&mut server, 3, &eof_packet(status::SERVER_STATUS_CURSOR_EXISTS)).await;

        let (_, payload) = read_packet(&mut server).await;
        assert_eq!(payload, [0x1c, 4, 0, 0, 0, 2, 0, 0, 0]);
        write_packet(&mut server, 1, &[0x00, 0x00, 1, 0, 0, 0]).await;
        write_packet(&mut server, 2, &[0x00, 0x00, 2, 0, 0, 0]).await;
        write_packet(&mut server, 3, &eof_packet(status::SERVER_STATUS_CURSOR_EXISTS)).await;

        let (_, payload) = read_packet(&mut server).await;
        assert_eq!(payload, [0x1c, 4, 0, 0, 0, 2, 0, 0, 0]);
        write_packet(&mut server, 1, &[0x00, 0x00, 3, 0, 0, 0]).await;
        write_packet(
            &mut server,
            2,
            &eof_packet(status::SERVER_STATUS_CURSOR_EXISTS | status::SERVER_STATUS_LAST_ROW_SENT),
        )
        .await;
    });

    let mut conn = connect(client, &config()).await.unwrap();

    let rows = crate::query::<_, _, (i32,)>("SELECT id FROM big", &mut conn)
        .bind(0)
        .fetch_size(2)
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(rows, [(1,), (2,), (3,)]);

    server.await.unwrap();
}

#[tokio::test]
async fn evicted_statement_is_closed_exactly_once() {
    let (client, mut server) = duplex(8192);

    let server = tokio::spawn(async move {
        accept_native(&mut server, "root", "secret").await;

        // statements a and b fill the capacity 2 cache
        for id in [1u32, 2] {
            let (_, payload) = read_packet(&mut server).await;
            assert_eq!(payload[0], 0x16);
            write_packet(&mut server, 1, &prepare_ok(id, 1, 0)).await;
            write_packet(&mut server, 2, &column_def("?", 0xfd)).await;
            write_packet(&mut server, 3, &eof_packet(0)).await;

            let (_, payload) = read_packet(&mut server).await;
            assert_eq!(payload[0], 0x17);
            write_packet(&mut server, 1, &ok_packet(1, 0)).await;
        }

        // preparing c evicts a, whose close travels with c's execute
        let (_, payload) = read_packet(&mut server).await;
        assert_eq!(payload[0], 0x16);
        write_packet(&mut server, 1, &prepare_ok(3, 1, 0)).await;
        write_packet(&mut server, 2, &column_def("?", 0xfd)).await;
        write_packet(&mut server, 3, &eof_packet(0)).await;

        let (seq, payload) = read_packet(&mut server).await;
        assert_eq!((seq, payload.as_slice()), (0, &[0x19, 1, 0, 0, 0][..]));

        let (_, payload) = read_packet(&mut server).await;
        assert_eq!(payload[0], 0x17);
        assert_eq!(&payload[1..5], 3u32.to_le_bytes());
        write_packet(&mut server, 1, &ok_packet(1, 0)).await;
    });

    let cfg = Config {
        statement_cache_capacity: NonZeroUsize::new(2).unwrap(),
        ..config()
    };
    let mut conn = connect(client, &cfg).await.unwrap();

    for sql in ["INSERT INTO a VALUES(?)", "INSERT INTO b VALUES(?)", "INSERT INTO c VALUES(?)"] {
        let res = crate::execute(sql, &mut conn).bind(1).await.unwrap();
        assert_eq!(res.rows_affected, 1);
    }

    server.await.unwrap();
}

#[tokio::test]
async fn abandoned_prepare_closes_the_statement() {
    let (client, mut server) = duplex(8192);

    let server = tokio::spawn(async move {
        accept_native(&mut server, "root", "secret").await;

        let (_, payload) = read_packet(&mut server).await;
        assert_eq!(payload[0], 0x16);
        write_packet(&mut server, 1, &prepare_ok(42, 1, 0)).await;
        write_packet(&mut server, 2, &column_def("?", 0xfd)).await;
        write_packet(&mut server, 3, &eof_packet(0)).await;

        // the orphaned statement is closed before anything else runs
        let (_, payload) = read_packet(&mut server).await;
        assert_eq!(payload, [0x19, 42, 0, 0, 0]);

        let (seq, payload) = read_packet(&mut server).await;
        assert_eq!((seq, payload.as_slice()), (0, &[0x0e_u8][..]));
        write_packet(&mut server, 1, &ok_packet(0, 0)).await;
    });

    let mut conn = connect(client, &config()).await.unwrap();

    let mut rows = crate::query::<_, _, (i64,)>("SELECT ?", &mut conn).bind(1).fetch();
    // one poll sends the prepare, its response is never consumed
    std::future::poll_fn(|cx| {
        assert!(Pin::new(&mut rows).poll_next(cx).is_pending());
        Poll::Ready(())
    })
    .await;
    drop(rows);

    conn.ping().await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn cache_hit_requires_matching_text() {
    let (client, mut server) = duplex(8192);

    let server = tokio::spawn(async move {
        accept_native(&mut server, "root", "secret").await;

        // the poisoned slot may not be reused, a prepare must arrive
        let (_, payload) = read_packet(&mut server).await;
        assert_eq!(payload, b"\x16INSERT INTO t VALUES(?)");
        write_packet(&mut server, 1, &prepare_ok(8, 1, 0)).await;
        write_packet(&mut server, 2, &column_def("?", 0xfd)).await;
        write_packet(&mut server, 3, &eof_packet(0)).await;

        // the displaced entry is closed alongside the execute
        let (_, payload) = read_packet(&mut server).await;
        assert_eq!(payload, [0x19, 99, 0, 0, 0]);

        let (_, payload) = read_packet(&mut server).await;
        assert_eq!(payload[0], 0x17);
        assert_eq!(&payload[1..5], 8u32.to_le_bytes());
        write_packet(&mut server, 1, &ok_packet(1, 0)).await;
    });

    let mut conn = connect(client, &config()).await.unwrap();

    // another statement whose hash landed on the same slot
    let sql = "INSERT INTO t VALUES(?)";
    conn.stmt_cache.put(
        sql_hash(sql),
        (ByteStr::from("SELECT something_else"), StatementHandle::new(99, 1, 0)),
    );

    let res = crate::execute(sql, &mut conn).bind(1).await.unwrap();
    assert_eq!(res.rows_affected, 1);

    server.await.unwrap();
}

#[tokio::test]
async fn multi_statements_requested_only_when_enabled() {
    for enabled in [false, true] {
        let (client, mut server) = duplex(8192);

        let server = tokio::spawn(async move {
            write_packet(
                &mut server,
                0,
                &greeting(
                    "mysql_native_password",
                    SERVER_CAPS | capability::CLIENT_MULTI_STATEMENTS,
                ),
            )
            .await;

            let (_, payload) = read_packet(&mut server).await;
            let caps = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
            assert_eq!(caps & capability::CLIENT_MULTI_STATEMENTS != 0, enabled);
            write_packet(&mut server, 2, &ok_packet(0, 0)).await;
        });

        let cfg = Config { multi_statements: enabled, ..config() };
        let conn = connect(client, &cfg).await.unwrap();
        assert_eq!(
            conn.capabilities().contains(capability::CLIENT_MULTI_STATEMENTS),
            enabled,
        );

        server.await.unwrap();
    }
}

struct Passthrough(Arc<AtomicBool>);

impl TlsUpgrader for Passthrough {
    fn upgrade<'a>(
        &'a self,
        stream: Box<dyn TlsStream>,
        host: &'a str,
    ) -> Pin<Box<dyn Future<Output = std::io::Result<Box<dyn TlsStream>>> + Send + 'a>> {
        assert_eq!(host, "localhost");
        self.0.store(true, Ordering::SeqCst);
        Box::pin(std::future::ready(Ok(stream)))
    }
}

#[tokio::test]
async fn tls_request_precedes_credentials() {
    let (client, mut server) = duplex(8192);

    let server = tokio::spawn(async move {
        write_packet(
            &mut server,
            0,
            &greeting("mysql_native_password", SERVER_CAPS | capability::CLIENT_SSL),
        )
        .await;

        let (seq, payload) = read_packet(&mut server).await;
        assert_eq!(seq, 1);
        assert_eq!(payload.len(), 32, "ssl request must carry no credentials");
        let caps = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        assert_ne!(caps & capability::CLIENT_SSL, 0);

        let (seq, payload) = read_packet(&mut server).await;
        assert_eq!(seq, 2);
        let (user, scramble) = parse_auth_response(&payload);
        assert_eq!(user, "root");
        assert_eq!(scramble, auth::native_scramble("secret", &NONCE));
        write_packet(&mut server, 3, &ok_packet(0, 0)).await;
    });

    let upgraded = Arc::new(AtomicBool::new(false));
    let cfg = Config {
        tls: TlsMode::Required(Arc::new(Passthrough(upgraded.clone()))),
        ..config()
    };
    connect(client, &cfg).await.unwrap();
    assert!(upgraded.load(Ordering::SeqCst));

    server.await.unwrap();
}

#[tokio::test]
async fn required_tls_fails_without_server_support() {
    let (client, mut server) = duplex(8192);

    let server = tokio::spawn(async move {
        write_packet(&mut server, 0, &greeting("mysql_native_password", SERVER_CAPS)).await;
    });

    let cfg = Config {
        tls: TlsMode::Required(Arc::new(Passthrough(Arc::new(AtomicBool::new(false))))),
        ..config()
    };
    let err = connect(client, &cfg).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Tls(_)), "{err:?}");

    server.await.unwrap();
}

#[tokio::test]
async fn read_timeout_poisons_the_connection() {
    let (client, mut server) = duplex(8192);

    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        accept_native(&mut server, "root", "secret").await;
        // swallow the ping and go silent
        read_packet(&mut server).await;
        let _ = done_rx.await;
    });

    let cfg = Config {
        read_timeout: Some(Duration::from_millis(50)),
        ..config()
    };
    let mut conn = connect(client, &cfg).await.unwrap();

    let err = conn.ping().await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Timeout(_)), "{err:?}");

    // any further use fails without touching the socket
    let err = conn.ping().await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Io(_)), "{err:?}");

    let _ = done_tx.send(());
    server.await.unwrap();
}

#[tokio::test]
async fn server_error_maps_to_database_kind() {
    let (client, mut server) = duplex(8192);

    let server = tokio::spawn(async move {
        accept_native(&mut server, "root", "secret").await;

        read_packet(&mut server).await;
        let mut err = vec![0xff, 0x7a, 0x04, b'#'];
        err.extend_from_slice(b"42S02");
        err.extend_from_slice(b"Table 't.missing' doesn't exist");
        write_packet(&mut server, 1, &err).await;

        // connection stays usable
        let (seq, payload) = read_packet(&mut server).await;
        assert_eq!((seq, payload.as_slice()), (0, &[0x0e_u8][..]));
        write_packet(&mut server, 1, &ok_packet(0, 0)).await;
    });

    let mut conn = connect(client, &config()).await.unwrap();

    let err = crate::execute("SELECT * FROM missing", &mut conn).await.unwrap_err();
    match err.kind() {
        ErrorKind::Database(db) => {
            assert_eq!(db.code(), 1146);
            assert_eq!(db.sql_state(), "42S02");
            assert!(!db.is_fatal());
        },
        other => panic!("{other:?}"),
    }

    conn.ping().await.unwrap();

    server.await.unwrap();
}
