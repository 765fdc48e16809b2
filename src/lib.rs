//! Asynchronous pooled client for Tarantool.
//!
//! Requests are sent over [`Connection`]s: each connection is single TCP
//! socket, multiplexing any number of concurrent requests. Connections are
//! grouped into per-endpoint [`ConnectionPool`]s, which create connections
//! on demand and reuse released ones.
//!
//! Most of the time [`Client`] is used: it checks out connection from pool
//! for each request. Spaces and indices can be referenced by name, names are
//! resolved into ids on first use and cached:
//!
//! ```no_run
//! use tarantool_pool::{Client, ExecutorExt, IteratorType, UpdateOperation};
//!
//! # async fn f() -> tarantool_pool::Result<()> {
//! let client = Client::new("guest@127.0.0.1:3301")?;
//! let clients = client.space("clients");
//!
//! clients.insert((566u32, "John", 5u32)).await?;
//! clients
//!     .update((566u32,), vec![UpdateOperation::assign(2, 1666)])
//!     .await?;
//! let rows: Vec<(u32, String, u32)> = clients
//!     .index("by_name")
//!     .select(None, None, Some(IteratorType::Eq), ("John",))
//!     .await?;
//!
//! let sum: u32 = client.eval("return ... + 1", (41,)).await?.decode_first()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Deserializing Lua responses in `call` and `eval`
//!
//! Lua functions return several values, which are received as single tuple.
//! [`TupleResponse::decode_first`] takes first value,
//! [`TupleResponse::decode_result`] follows `value, err` convention and
//! [`TupleResponse::decode_full`] decodes whole tuple.

pub use rmpv::Value;

#[doc(inline)]
pub use self::{
    builder::{ConnectionBuilder, ReconnectInterval},
    client::{
        schema, Cancellable, Client, DmoResponse, Executor, ExecutorExt, TupleResponse,
        UpdateArgument, UpdateOperation, UpdateOperationKind,
    },
    codec::consts::IteratorType,
    endpoint::Endpoint,
    errors::Error,
    pool::{ConnectionPool, Connector, PoolBuilder, PoolRegistry, PooledConnection, TcpConnector},
    transport::{Connection, ConnectionOptions, ConnectionState},
    tuple::{Tuple, TupleElement},
};

pub mod errors;
pub mod utils;

mod builder;
mod client;
mod codec;
mod endpoint;
mod pool;
mod transport;
mod tuple;

/// Alias for [`std::result::Result<T, crate::Error>`].
pub type Result<T> = std::result::Result<T, Error>;
