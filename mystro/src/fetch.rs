use futures_core::Stream;
use std::{
    hash::{DefaultHasher, Hash, Hasher},
    marker::PhantomData,
    mem,
    pin::Pin,
    sync::Arc,
    task::{
        Context,
        Poll::{self, *},
        ready,
    },
};

use crate::{
    FromRow, Result, Row,
    encode::Encoded,
    mysql::{
        backend::{self, ColumnDefinition, RowPacket},
        frontend, status,
    },
    row::{RowFormat, RowNotFound, RowResult},
    sql::Sql,
    statement::StatementHandle,
    stream::Drain,
    transport::MySqlTransport,
};

pub(crate) fn sql_hash(sql: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    sql.hash(&mut hasher);
    hasher.finish()
}

/// Streaming result of a statement.
///
/// Statements without parameters and without a fetch size run on the text
/// protocol in one round trip. Everything else is prepared and executed on
/// the binary protocol, reusing the connection's statement cache.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchStream<'val, SQL, ExeFut, IO, R>
where
    IO: MySqlTransport,
{
    sql: SQL,
    io: Option<IO>,
    stmt: Option<StatementHandle>,
    sqlid: u64,
    persistent: bool,
    columns: Vec<ColumnDefinition>,
    shared: Option<Arc<[ColumnDefinition]>>,
    phase: Phase<ExeFut>,
    params: Vec<Encoded<'val>>,
    fetch_size: u32,
    format: RowFormat,
    result: RowResult,
    _p: PhantomData<R>,
}

#[derive(Debug)]
enum Phase<ExeFut> {
    Connect { f: ExeFut },
    Ready,
    PrepareRecv,
    PrepareParam { remaining: u16 },
    PrepareColumn { remaining: u16 },
    Execute,
    Head,
    Column { remaining: u64 },
    Row,
    Fetch,
    FetchRow,
    Complete,
}

impl<'val, SQL, ExeFut, IO, R> FetchStream<'val, SQL, ExeFut, IO, R>
where
    IO: MySqlTransport,
{
    pub fn new(sql: SQL, exe: ExeFut, params: Vec<Encoded<'val>>, fetch_size: u32) -> Self {
        Self {
            sql,
            io: None,
            stmt: None,
            sqlid: 0,
            persistent: false,
            columns: Vec::new(),
            shared: None,
            phase: Phase::Connect { f: exe },
            params,
            fetch_size,
            format: RowFormat::Text,
            result: RowResult::default(),
            _p: PhantomData,
        }
    }

    /// Deallocate a statement that was prepared for this call only.
    fn finish_statement(&mut self) {
        if !self.persistent && self.format == RowFormat::Binary {
            if let (Some(io), Some(stmt)) = (self.io.as_mut(), self.stmt.take()) {
                io.close_stmt(self.sqlid, stmt);
            }
        }
    }

    /// Abandon the in flight exchange.
    ///
    /// The rest of the server response is left with the transport to be
    /// drained before its next command.
    fn cancel(&mut self) {
        let Some(io) = self.io.as_mut() else { return };

        let drain = match self.phase {
            Phase::PrepareRecv => Drain::PrepareHead,
            Phase::PrepareParam { .. } => Drain::PrepareBody {
                eofs: 1 + u8::from(self.stmt.is_some_and(|s| s.columns() > 0)),
            },
            Phase::PrepareColumn { .. } => Drain::PrepareBody { eofs: 1 },
            Phase::Head => Drain::Head,
            Phase::Column { .. } => Drain::Columns,
            Phase::Row | Phase::FetchRow => Drain::Rows,
            _ => Drain::None,
        };
        if drain != Drain::None {
            io.drain_request(drain);
        }

        // an abandoned cursor stays open server side until the statement
        // closes, the policy decides whether to pay the close round trip
        if self.fetch_size > 0
            && matches!(self.phase, Phase::Fetch | Phase::FetchRow)
            && io.close_cursor_on_cancel()
        {
            if let Some(stmt) = self.stmt.take() {
                io.close_stmt(self.sqlid, stmt);
            }
        }

        self.finish_statement();
        self.phase = Phase::Complete;
    }
}

impl<SQL, ExeFut, IO, R> Stream for FetchStream<'_, SQL, ExeFut, IO, R>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: MySqlTransport + Unpin,
    R: FromRow + Unpin,
{
    type Item = Result<R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let me = self.get_mut();

        let poll = me.poll_next_inner(cx);

        // an ERR payload or a broken stream terminates the exchange,
        // there is nothing left to drain
        if let Ready(Some(Err(_))) = &poll {
            if !matches!(me.phase, Phase::Complete) {
                me.finish_statement();
                me.phase = Phase::Complete;
            }
        }

        poll
    }
}

impl<SQL, ExeFut, IO, R> FetchStream<'_, SQL, ExeFut, IO, R>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: MySqlTransport + Unpin,
    R: FromRow + Unpin,
{
    fn poll_next_inner(&mut self, cx: &mut Context) -> Poll<Option<Result<R>>> {
        let me = self;

        loop {
            match &mut me.phase {
                Phase::Connect { f } => {
                    let io = ready!(Pin::new(f).poll(cx)?);
                    me.io = Some(io);
                    me.phase = Phase::Ready;
                },
                Phase::Ready => {
                    let io = me.io.as_mut().unwrap();
                    ready!(io.poll_ready(cx)?);

                    let sql = me.sql.sql().trim();
                    me.sqlid = sql_hash(sql);
                    me.persistent = me.sql.persistent();

                    if me.params.is_empty() && me.fetch_size == 0 {
                        me.format = RowFormat::Text;
                        io.begin_command();
                        io.send(frontend::ComQuery { sql });
                        me.phase = Phase::Head;
                    } else {
                        me.format = RowFormat::Binary;
                        match me.persistent.then(|| io.get_stmt(me.sqlid, sql)).flatten() {
                            Some(stmt) => {
                                me.stmt = Some(stmt);
                                me.phase = Phase::Execute;
                            },
                            None => {
                                io.begin_command();
                                io.send(frontend::ComStmtPrepare { sql });
                                me.phase = Phase::PrepareRecv;
                            },
                        }
                    }
                },
                Phase::PrepareRecv => {
                    let io = me.io.as_mut().unwrap();
                    let ok = ready!(io.poll_recv::<backend::PrepareOk>(cx)?);
                    let stmt = StatementHandle::new(ok.statement_id, ok.params, ok.columns);
                    if me.persistent {
                        io.add_stmt(me.sqlid, me.sql.sql().trim(), stmt);
                    }
                    me.stmt = Some(stmt);
                    me.phase = match (ok.params, ok.columns) {
                        (0, 0) => Phase::Execute,
                        (0, _) => Phase::PrepareColumn { remaining: ok.columns },
                        (params, _) => Phase::PrepareParam { remaining: params },
                    };
                },
                // parameter and column definitions of the prepare response
                // are discarded, execution resends the authoritative ones
                Phase::PrepareParam { remaining } => match *remaining {
                    0 => {
                        ready!(me.io.as_mut().unwrap().poll_recv::<backend::EofPacket>(cx)?);
                        me.phase = match me.stmt.as_ref().unwrap().columns() {
                            0 => Phase::Execute,
                            columns => Phase::PrepareColumn { remaining: columns },
                        };
                    },
                    _ => {
                        ready!(me.io.as_mut().unwrap().poll_recv::<ColumnDefinition>(cx)?);
                        *remaining -= 1;
                    },
                },
                Phase::PrepareColumn { remaining } => match *remaining {
                    0 => {
                        ready!(me.io.as_mut().unwrap().poll_recv::<backend::EofPacket>(cx)?);
                        me.phase = Phase::Execute;
                    },
                    _ => {
                        ready!(me.io.as_mut().unwrap().poll_recv::<ColumnDefinition>(cx)?);
                        *remaining -= 1;
                    },
                },
                Phase::Execute => {
                    let io = me.io.as_mut().unwrap();
                    io.begin_command();
                    io.send(frontend::ComStmtExecute {
                        statement_id: me.stmt.as_ref().unwrap().id(),
                        cursor: me.fetch_size > 0,
                        params: &me.params,
                    });
                    me.phase = Phase::Head;
                },
                Phase::Head => {
                    let response =
                        ready!(me.io.as_mut().unwrap().poll_recv::<backend::QueryResponse>(cx)?);
                    match response {
                        backend::QueryResponse::Ok(ok) => {
                            me.result.rows_affected += ok.affected_rows;
                            me.result.last_insert_id = ok.last_insert_id;
                            me.result.warnings += ok.warnings;
                            if ok.status & status::SERVER_MORE_RESULTS_EXISTS == 0 {
                                me.finish_statement();
                                me.phase = Phase::Complete;
                            }
                        },
                        backend::QueryResponse::ResultSet(count) => {
                            me.columns = Vec::with_capacity(usize::min(count as usize, 1024));
                            me.shared = None;
                            me.phase = Phase::Column { remaining: count };
                        },
                    }
                },
                Phase::Column { remaining } => match *remaining {
                    0 => {
                        let eof =
                            ready!(me.io.as_mut().unwrap().poll_recv::<backend::EofPacket>(cx)?);
                        me.result.warnings += eof.warnings;
                        me.shared = Some(Arc::from(mem::take(&mut me.columns)));
                        me.phase = match me.fetch_size > 0
                            && eof.status & status::SERVER_STATUS_CURSOR_EXISTS != 0
                        {
                            true => Phase::Fetch,
                            false => Phase::Row,
                        };
                    },
                    _ => {
                        let def =
                            ready!(me.io.as_mut().unwrap().poll_recv::<ColumnDefinition>(cx)?);
                        me.columns.push(def);
                        *remaining -= 1;
                    },
                },
                Phase::Row => {
                    match ready!(me.io.as_mut().unwrap().poll_recv::<RowPacket>(cx)?) {
                        RowPacket::Row(payload) => {
                            let columns = me.shared.as_ref().unwrap();
                            let result = match Row::parse(payload, columns, me.format) {
                                Ok(row) => row.decode::<R>().map_err(Into::into),
                                Err(err) => Err(err.into()),
                            };
                            if result.is_err() {
                                me.cancel();
                            }
                            return Ready(Some(result));
                        },
                        RowPacket::Eof(eof) => {
                            me.result.warnings += eof.warnings;
                            match eof.status & status::SERVER_MORE_RESULTS_EXISTS != 0 {
                                true => me.phase = Phase::Head,
                                false => {
                                    me.finish_statement();
                                    me.phase = Phase::Complete;
                                },
                            }
                        },
                    }
                },
                // each batch is pulled on demand, rows that are never
                // polled never leave the server
                Phase::Fetch => {
                    let io = me.io.as_mut().unwrap();
                    io.begin_command();
                    io.send(frontend::ComStmtFetch {
                        statement_id: me.stmt.as_ref().unwrap().id(),
                        rows: me.fetch_size,
                    });
                    me.phase = Phase::FetchRow;
                },
                Phase::FetchRow => {
                    match ready!(me.io.as_mut().unwrap().poll_recv::<RowPacket>(cx)?) {
                        RowPacket::Row(payload) => {
                            let columns = me.shared.as_ref().unwrap();
                            let result = match Row::parse(payload, columns, me.format) {
                                Ok(row) => row.decode::<R>().map_err(Into::into),
                                Err(err) => Err(err.into()),
                            };
                            if result.is_err() {
                                me.cancel();
                            }
                            return Ready(Some(result));
                        },
                        RowPacket::Eof(eof) => {
                            me.result.warnings += eof.warnings;
                            match eof.status & status::SERVER_STATUS_LAST_ROW_SENT != 0 {
                                true => {
                                    me.finish_statement();
                                    me.phase = Phase::Complete;
                                },
                                false => me.phase = Phase::Fetch,
                            }
                        },
                    }
                },
                Phase::Complete => return Ready(None),
            }
        }
    }
}

impl<SQL, ExeFut, IO, R> Drop for FetchStream<'_, SQL, ExeFut, IO, R>
where
    IO: MySqlTransport,
{
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchAll<'val, SQL, ExeFut, IO, R>
where
    IO: MySqlTransport,
{
    fetch: FetchStream<'val, SQL, ExeFut, IO, R>,
    output: Vec<R>,
}

impl<'val, SQL, ExeFut, IO, R> FetchAll<'val, SQL, ExeFut, IO, R>
where
    IO: MySqlTransport,
{
    pub fn new(sql: SQL, exe: ExeFut, params: Vec<Encoded<'val>>, fetch_size: u32) -> Self {
        Self {
            fetch: FetchStream::new(sql, exe, params, fetch_size),
            output: vec![],
        }
    }
}

impl<SQL, ExeFut, IO, R> Future for FetchAll<'_, SQL, ExeFut, IO, R>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: MySqlTransport + Unpin,
    R: FromRow + Unpin,
{
    type Output = Result<Vec<R>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while let Some(r) = ready!(Pin::new(&mut me.fetch).poll_next(cx)?) {
            me.output.push(r);
        }

        Ready(Ok(std::mem::take(&mut me.output)))
    }
}

#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchOne<'val, SQL, ExeFut, IO, R>
where
    IO: MySqlTransport,
{
    fetch: FetchStream<'val, SQL, ExeFut, IO, R>,
    output: Option<R>,
}

impl<'val, SQL, ExeFut, IO, R> FetchOne<'val, SQL, ExeFut, IO, R>
where
    IO: MySqlTransport,
{
    pub fn new(sql: SQL, exe: ExeFut, params: Vec<Encoded<'val>>) -> Self {
        Self {
            fetch: FetchStream::new(sql, exe, params, 0),
            output: None,
        }
    }
}

impl<SQL, ExeFut, IO, R> Future for FetchOne<'_, SQL, ExeFut, IO, R>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: MySqlTransport + Unpin,
    R: FromRow + Unpin,
{
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while let Some(r) = ready!(Pin::new(&mut me.fetch).poll_next(cx)?) {
            if me.output.is_none() {
                me.output = Some(r);
                // remaining rows are never decoded
                me.fetch.cancel();
            }
        }

        match me.output.take() {
            Some(row) => Ready(Ok(row)),
            None => Ready(Err(RowNotFound.into())),
        }
    }
}

#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchOptional<'val, SQL, ExeFut, IO, R>
where
    IO: MySqlTransport,
{
    fetch: FetchStream<'val, SQL, ExeFut, IO, R>,
    output: Option<R>,
}

impl<'val, SQL, ExeFut, IO, R> FetchOptional<'val, SQL, ExeFut, IO, R>
where
    IO: MySqlTransport,
{
    pub fn new(sql: SQL, exe: ExeFut, params: Vec<Encoded<'val>>) -> Self {
        Self {
            fetch: FetchStream::new(sql, exe, params, 0),
            output: None,
        }
    }
}

impl<SQL, ExeFut, IO, R> Future for FetchOptional<'_, SQL, ExeFut, IO, R>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: MySqlTransport + Unpin,
    R: FromRow + Unpin,
{
    type Output = Result<Option<R>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while let Some(r) = ready!(Pin::new(&mut me.fetch).poll_next(cx)?) {
            if me.output.is_none() {
                me.output = Some(r);
                me.fetch.cancel();
            }
        }

        Ready(Ok(me.output.take()))
    }
}

#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Execute<'val, SQL, ExeFut, IO>
where
    IO: MySqlTransport,
{
    fetch: FetchStream<'val, SQL, ExeFut, IO, ()>,
}

impl<'val, SQL, ExeFut, IO> Execute<'val, SQL, ExeFut, IO>
where
    IO: MySqlTransport,
{
    pub fn new(sql: SQL, exe: ExeFut, params: Vec<Encoded<'val>>) -> Self {
        Self {
            fetch: FetchStream::new(sql, exe, params, 0),
        }
    }
}

impl<SQL, ExeFut, IO> Future for Execute<'_, SQL, ExeFut, IO>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: MySqlTransport + Unpin,
{
    type Output = Result<RowResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while ready!(Pin::new(&mut me.fetch).poll_next(cx)?).is_some() { }

        Ready(Ok(me.fetch.result))
    }
}
