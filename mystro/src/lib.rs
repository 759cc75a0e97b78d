//! MySQL Driver
//!
//! # Examples
//!
//! ```no_run
//! use mystro::Connection;
//!
//! # async fn app() -> mystro::Result<()> {
//! let mut conn = Connection::connect_env().await?;
//!
//! let res = mystro::query::<_, _, (i32,String)>("SELECT 420,?", &mut conn)
//!     .bind("Foo")
//!     .fetch_one()
//!     .await?;
//!
//! assert_eq!(res.0,420);
//! assert_eq!(res.1.as_str(),"Foo");
//! # Ok(())
//! # }
//! ```
//!
//! Statements without bound parameters run on the text protocol in a single
//! round trip. Binding a parameter switches to the prepared binary protocol,
//! backed by a per connection statement cache:
//!
//! ```no_run
//! # async fn app(conn: &mut mystro::Connection) -> mystro::Result<()> {
//! let res = mystro::execute("INSERT INTO foo(id) VALUES(?)", conn)
//!     .bind(7)
//!     .await?;
//!
//! assert_eq!(res.rows_affected, 1);
//! # Ok(())
//! # }
//! ```

pub mod common;
mod ext;
mod net;

// Protocol
pub mod mysql;

// Encoding
mod value;
pub mod encode;

// Component
mod statement;
pub mod sql;
pub mod row;

// Io
mod stream;
mod handshake;

// Operation
pub mod transport;
pub mod executor;
pub mod query;
pub mod fetch;

// Connection
pub mod connection;

mod error;


pub use encode::Encode;
pub use net::{TlsStream, TlsUpgrader};
pub use row::{Row, FromRow, Decode, DecodeError, RowResult};
pub use sql::SqlExt;

pub use executor::Executor;
pub use connection::{Connection, Config, TlsMode};
pub use statement::StatementHandle;
pub use mysql::backend::SqlError;
#[doc(inline)]
pub use query::{query, execute};
pub use error::{Error, ErrorKind, Result};
