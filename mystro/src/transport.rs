//! The [`MySqlTransport`] trait.
use std::{
    io,
    task::{Context, Poll},
};

use crate::{
    Result,
    mysql::{backend::BackendPacket, frontend::FrontendPacket},
    statement::StatementHandle,
};

pub use crate::stream::Drain;

/// A buffered stream which can send and receive mysql packets.
pub trait MySqlTransport: Unpin {
    /// Poll to flush the underlying io.
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>>;

    /// Poll until a new command may start, draining any abandoned response.
    fn poll_ready(&mut self, cx: &mut Context) -> Poll<Result<()>>;

    /// Poll to receive a response packet.
    ///
    /// Implementor should handle an ERR payload and return it as [`Err`].
    fn poll_recv<B: BackendPacket>(&mut self, cx: &mut Context) -> Poll<Result<B>>;

    /// Start a new command exchange, restarting the sequence counter.
    fn begin_command(&mut self);

    /// Send a packet to the server.
    ///
    /// Note that this send is buffered, caller must also call
    /// [`poll_flush`][1] or [`flush`][2] afterwards.
    ///
    /// [1]: MySqlTransport::poll_flush
    /// [2]: MySqlTransportExt::flush
    fn send<F: FrontendPacket>(&mut self, message: F);

    /// Request the rest of the current response to be discarded.
    fn drain_request(&mut self, drain: Drain);

    /// Check for an already prepared statement.
    ///
    /// `sqlid` is a hash of `sql`, a hit requires the text itself to match.
    fn get_stmt(&mut self, sqlid: u64, sql: &str) -> Option<StatementHandle>;

    /// Add a newly prepared statement.
    fn add_stmt(&mut self, sqlid: u64, sql: &str, handle: StatementHandle);

    /// Deallocate a statement on the server and forget it.
    fn close_stmt(&mut self, sqlid: u64, handle: StatementHandle);

    /// Whether an abandoned server side cursor should close its statement.
    fn close_cursor_on_cancel(&mut self) -> bool;
}

impl<P> MySqlTransport for &mut P where P: MySqlTransport {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        P::poll_flush(self, cx)
    }

    fn poll_ready(&mut self, cx: &mut Context) -> Poll<Result<()>> {
        P::poll_ready(self, cx)
    }

    fn poll_recv<B: BackendPacket>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        P::poll_recv(self, cx)
    }

    fn begin_command(&mut self) {
        P::begin_command(self);
    }

    fn send<F: FrontendPacket>(&mut self, message: F) {
        P::send(self, message);
    }

    fn drain_request(&mut self, drain: Drain) {
        P::drain_request(self, drain);
    }

    fn get_stmt(&mut self, sqlid: u64, sql: &str) -> Option<StatementHandle> {
        P::get_stmt(self, sqlid, sql)
    }

    fn add_stmt(&mut self, sqlid: u64, sql: &str, handle: StatementHandle) {
        P::add_stmt(self, sqlid, sql, handle);
    }

    fn close_stmt(&mut self, sqlid: u64, handle: StatementHandle) {
        P::close_stmt(self, sqlid, handle);
    }

    fn close_cursor_on_cancel(&mut self) -> bool {
        P::close_cursor_on_cancel(self)
    }
}

/// An extension trait to provide `Future` API for [`MySqlTransport`].
pub trait MySqlTransportExt: MySqlTransport {
    /// Flush the underlying io.
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> {
        std::future::poll_fn(|cx| self.poll_flush(cx))
    }

    /// Wait until a new command may start.
    fn ready(&mut self) -> impl Future<Output = Result<()>> {
        std::future::poll_fn(|cx| self.poll_ready(cx))
    }

    /// Receive a response packet.
    fn recv<B: BackendPacket>(&mut self) -> impl Future<Output = Result<B>> {
        std::future::poll_fn(|cx| self.poll_recv(cx))
    }
}

impl<T> MySqlTransportExt for T where T: MySqlTransport { }
