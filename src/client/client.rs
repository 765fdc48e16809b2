use std::{fmt, sync::Arc};

use async_trait::async_trait;
use rmpv::Value;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::Executor;
use crate::{
    codec::request::EncodedRequest,
    endpoint::Endpoint,
    pool::{ConnectionPool, PoolRegistry, PooledConnection},
    Result,
};

/// Client of single Tarantool instance, backed by connection pool.
///
/// Each request checks out connection from pool, sends request and returns
/// connection back.
///
/// ```no_run
/// # use tarantool_pool::{Client, ExecutorExt, UpdateOperation};
/// # async fn f() -> tarantool_pool::Result<()> {
/// let client = Client::new("guest@localhost:3301")?;
/// let space = client.space("clients");
/// space.insert((566u32, "Name", 1u32)).await?;
/// space.update((566u32,), vec![UpdateOperation::assign(2, 1666)]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    pool: Arc<ConnectionPool>,
}

impl Client {
    /// Create client for connection string `[user[:password]@]host[:port]`,
    /// using pool from [`PoolRegistry::global`].
    pub fn new(connection_string: &str) -> Result<Self> {
        Ok(Self::from_pool(
            PoolRegistry::global().get_pool_by_str(connection_string)?,
        ))
    }

    pub fn from_pool(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.pool.endpoint()
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Check out connection, for sending several requests through it.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.pool.acquire().await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").field("pool", &self.pool).finish()
    }
}

#[async_trait]
impl Executor for Client {
    async fn send_encoded_request(
        &self,
        request: EncodedRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        let conn = self.pool.acquire_cancellable(cancel).await?;
        trace!("Sending request through connection #{}", conn.id());
        conn.send_encoded(request, cancel).await
    }
}
