//! Buffered MySQL connection io.
use std::{
    io,
    pin::Pin,
    task::{Context, Poll, ready},
    time::Duration,
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    time::Sleep,
};

use crate::{
    Result,
    common::verbose,
    connection::Config,
    error::TimeoutError,
    mysql::{
        ProtocolError, backend,
        backend::{BackendPacket, EofPacket, OkPacket, PrepareOk, SqlError},
        frontend::{self, FrontendPacket},
        packet::PacketCodec,
        status,
    },
    net::{Socket, TlsUpgrader},
};

const DEFAULT_BUF_CAPACITY: usize = 1024;

/// Buffered connection to mysql.
#[derive(Debug)]
pub struct MySqlStream {
    socket: Socket,
    read_buf: BytesMut,
    write_buf: BytesMut,
    codec: PacketCodec,
    drain: Drain,
    read_timeout: Option<Duration>,
    deadline: Option<Pin<Box<Sleep>>>,
    broken: bool,
}

/// Remaining server packets of an abandoned exchange.
///
/// Set when a caller stops consuming a response mid way. The stream eats
/// packets through these states before the next command may start, so the
/// sequence validation of the old exchange stays intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    None,
    /// First response packet of a statement.
    Head,
    /// Column definitions of a result set.
    Columns,
    /// Row packets until the terminating EOF.
    Rows,
    /// First response packet of a prepare.
    PrepareHead,
    /// Parameter and column definition blocks of a prepare response,
    /// counted by their terminating EOF packets.
    PrepareBody { eofs: u8 },
}

impl MySqlStream {
    pub async fn connect(config: &Config) -> Result<Self> {
        let socket = Socket::connect_tcp(&config.host, config.port).await?;
        Ok(Self::from_socket(socket, config.read_timeout))
    }

    pub fn from_socket(socket: Socket, read_timeout: Option<Duration>) -> Self {
        Self {
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            codec: PacketCodec::new(),
            drain: Drain::None,
            read_timeout,
            deadline: None,
            broken: false,
        }
    }

    /// Swap the plain socket for a TLS wrapped one.
    ///
    /// The handshake exchange continues over the new stream with the same
    /// sequence counter, per the protocol's ssl upgrade rules.
    pub async fn upgrade_tls(&mut self, upgrader: &dyn TlsUpgrader, host: &str) -> io::Result<()> {
        let plain = std::mem::replace(
            &mut self.socket,
            Socket::from_stream(Box::new(tokio::io::empty())),
        );
        let tls = upgrader.upgrade(plain.into_stream(), host).await?;
        self.socket = Socket::from_stream(tls);
        Ok(())
    }

    /// Start a new command exchange.
    ///
    /// The caller must have consumed or drained any previous response.
    pub fn begin_command(&mut self) {
        debug_assert_eq!(self.drain, Drain::None, "command started with response pending");
        self.codec.reset();
    }

    /// Buffer a client packet, continuing the current exchange.
    pub fn send<F: FrontendPacket>(&mut self, msg: F) {
        frontend::write(msg, &mut self.codec, &mut self.write_buf);
    }

    /// Buffer a statement close as its own fire-and-forget exchange.
    ///
    /// Written without touching the current sequence counter, flushed
    /// together with the next command.
    pub fn send_stmt_close(&mut self, statement_id: u32) {
        verbose!(statement_id, "closing statement");
        frontend::write_detached(frontend::ComStmtClose { statement_id }, &mut self.write_buf);
    }

    /// Mark the rest of the current response to be discarded.
    pub fn drain_request(&mut self, drain: Drain) {
        self.drain = drain;
    }

    pub fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        while !self.write_buf.is_empty() {
            let n = ready!(Pin::new(&mut self.socket).poll_write(cx, &self.write_buf))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.write_buf.advance(n);
        }
        Pin::new(&mut self.socket).poll_flush(cx)
    }

    /// Poll until the connection is ready to receive.
    ///
    /// Flushes buffered packets first, then eats any abandoned response
    /// to completion.
    pub fn poll_ready(&mut self, cx: &mut Context) -> Poll<Result<()>> {
        ready!(self.poll_flush(cx))?;
        while self.drain != Drain::None {
            let payload = ready!(self.poll_packet(cx))?;
            self.step_drain(payload)?;
        }
        Poll::Ready(Ok(()))
    }

    /// Receive and decode the next response packet.
    ///
    /// An ERR payload is parsed and returned as [`Err`] instead of being
    /// handed to `B`.
    pub fn poll_recv<B: BackendPacket>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        ready!(self.poll_ready(cx))?;
        let payload = ready!(self.poll_packet(cx))?;
        if payload.first() == Some(&0xff) {
            return Poll::Ready(Err(SqlError::parse(payload)?.into()));
        }
        Poll::Ready(Ok(B::decode(payload)?))
    }

    /// Orderly shutdown of the underlying socket.
    pub fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        Pin::new(&mut self.socket).poll_shutdown(cx)
    }

    fn poll_packet(&mut self, cx: &mut Context) -> Poll<Result<Bytes>> {
        if self.broken {
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe).into()));
        }

        loop {
            if let Some(payload) = self.codec.decode(&mut self.read_buf)? {
                self.deadline = None;
                return Poll::Ready(Ok(payload));
            }

            match self.poll_read_socket(cx) {
                Poll::Ready(Ok(0)) => {
                    self.broken = true;
                    return Poll::Ready(Err(ProtocolError::eof().into()));
                },
                Poll::Ready(Ok(_)) => continue,
                Poll::Ready(Err(err)) => {
                    self.broken = true;
                    return Poll::Ready(Err(err.into()));
                },
                Poll::Pending => {
                    if let Some(timeout) = self.read_timeout {
                        let deadline = self
                            .deadline
                            .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
                        if deadline.as_mut().poll(cx).is_ready() {
                            self.broken = true;
                            self.deadline = None;
                            return Poll::Ready(Err(TimeoutError.into()));
                        }
                    }
                    return Poll::Pending;
                },
            }
        }
    }

    fn poll_read_socket(&mut self, cx: &mut Context) -> Poll<io::Result<usize>> {
        let n = {
            let dst = self.read_buf.chunk_mut();
            let dst = unsafe { dst.as_uninit_slice_mut() };
            let mut buf = ReadBuf::uninit(dst);
            let ptr = buf.filled().as_ptr();
            ready!(Pin::new(&mut self.socket).poll_read(cx, &mut buf)?);

            // Ensure the pointer does not change from under us
            assert_eq!(ptr, buf.filled().as_ptr());
            buf.filled().len()
        };

        // Safety: This is guaranteed to be the number of initialized (and read)
        // bytes due to the invariants provided by `ReadBuf::filled`.
        unsafe {
            self.read_buf.advance_mut(n);
        }

        Poll::Ready(Ok(n))
    }

    fn step_drain(&mut self, payload: Bytes) -> Result<()> {
        self.drain = match self.drain {
            Drain::None => Drain::None,
            Drain::Head => match payload.first() {
                Some(0xff) => Drain::None,
                Some(0x00) => {
                    let ok = OkPacket::decode(payload)?;
                    match ok.status & status::SERVER_MORE_RESULTS_EXISTS != 0 {
                        true => Drain::Head,
                        false => Drain::None,
                    }
                },
                _ => Drain::Columns,
            },
            Drain::Columns => match backend::is_eof(&payload) {
                true => Drain::Rows,
                false => Drain::Columns,
            },
            Drain::Rows => match payload.first() {
                Some(0xff) => Drain::None,
                _ if backend::is_eof(&payload) => {
                    let eof = EofPacket::decode(payload)?;
                    match eof.status & status::SERVER_MORE_RESULTS_EXISTS != 0 {
                        true => Drain::Head,
                        false => Drain::None,
                    }
                },
                _ => Drain::Rows,
            },
            Drain::PrepareHead => match payload.first() {
                Some(0xff) => Drain::None,
                _ => {
                    let ok = PrepareOk::decode(payload)?;
                    // the handle never reached the caller or the cache,
                    // close it or it stays allocated until disconnect
                    self.send_stmt_close(ok.statement_id);
                    let eofs = u8::from(ok.params > 0) + u8::from(ok.columns > 0);
                    match eofs {
                        0 => Drain::None,
                        eofs => Drain::PrepareBody { eofs },
                    }
                },
            },
            Drain::PrepareBody { eofs } => match backend::is_eof(&payload) {
                true if eofs == 1 => Drain::None,
                true => Drain::PrepareBody { eofs: eofs - 1 },
                false => Drain::PrepareBody { eofs },
            },
        };
        Ok(())
    }
}
