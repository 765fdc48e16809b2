//! Pools of connections to Tarantool.
//!
//! Pool keeps every connection it has created. [`ConnectionPool::acquire`]
//! returns connection, which is not checked out, or creates a new one if all
//! are busy. Connection returns to pool when [`PooledConnection`] is dropped.
//!
//! Checked out connection is still multiplexed and can be used concurrently
//! by its holder.

use std::{
    fmt,
    ops::Deref,
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub use self::{
    connector::{Connector, TcpConnector},
    registry::PoolRegistry,
};

use crate::{
    builder::{ConnectionBuilder, ReconnectInterval},
    endpoint::Endpoint,
    errors::Error,
    transport::Connection,
    utils::CancellableFuture,
};

mod connector;
mod registry;

struct Slot {
    conn: Connection,
    checked_out: bool,
}

/// Connections to single endpoint.
pub struct ConnectionPool {
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    slots: Mutex<Vec<Slot>>,
    limit: Option<Arc<Semaphore>>,
    acquire_timeout: Option<Duration>,
}

impl ConnectionPool {
    /// Unbounded pool, which uses provided connector to create connections.
    pub fn new(endpoint: Endpoint, connector: Arc<dyn Connector>) -> Arc<Self> {
        PoolBuilder::default().build_with_connector(endpoint, connector)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Number of connections in pool, including checked out.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Number of connections, which are not checked out.
    pub fn available(&self) -> usize {
        self.slots.lock().iter().filter(|x| !x.checked_out).count()
    }

    /// Get connection from pool or create new one.
    ///
    /// If pool has maximum size and it is reached, waits for any connection to
    /// be released, failing with [`Error::PoolTimeout`] after acquire timeout.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, Error> {
        self.acquire_cancellable(None).await
    }

    /// Same as [`acquire`](Self::acquire), but fails with [`Error::Cancelled`] when
    /// token is cancelled.
    pub async fn acquire_cancellable(
        self: &Arc<Self>,
        cancel: Option<&CancellationToken>,
    ) -> Result<PooledConnection, Error> {
        let permit = match self.limit.clone() {
            Some(limit) => Some(self.wait_permit(limit, cancel).await?),
            None => None,
        };

        if let Some(conn) = self.take_available() {
            trace!("Reusing connection #{} to {}", conn.id(), self.endpoint);
            return Ok(PooledConnection::new(self.clone(), conn, permit));
        }

        let conn = CancellableFuture::new(self.connector.connect(&self.endpoint), cancel)
            .await
            .map_err(|()| Error::Cancelled)??;
        debug!("New connection #{} to {} added to pool", conn.id(), self.endpoint);
        self.slots.lock().push(Slot {
            conn: conn.clone(),
            checked_out: true,
        });
        Ok(PooledConnection::new(self.clone(), conn, permit))
    }

    async fn wait_permit(
        &self,
        limit: Arc<Semaphore>,
        cancel: Option<&CancellationToken>,
    ) -> Result<OwnedSemaphorePermit, Error> {
        let fut = CancellableFuture::new(limit.acquire_owned(), cancel);
        let permit = match self.acquire_timeout {
            Some(dur) => tokio::time::timeout(dur, fut)
                .await
                .map_err(|_| Error::PoolTimeout)?,
            None => fut.await,
        };
        // Semaphore is never closed
        permit
            .map_err(|()| Error::Cancelled)?
            .map_err(|_| Error::PoolTimeout)
    }

    /// Find connection, which is not checked out, and mark it.
    ///
    /// Connections, which are not usable anymore, are dropped from pool.
    fn take_available(&self) -> Option<Connection> {
        let mut slots = self.slots.lock();
        slots.retain(|slot| {
            let keep = slot.checked_out || slot.conn.is_ready();
            if !keep {
                debug!(
                    "Discarding connection #{} in state {:?}",
                    slot.conn.id(),
                    slot.conn.state()
                );
            }
            keep
        });
        let slot = slots.iter_mut().find(|slot| !slot.checked_out)?;
        slot.checked_out = true;
        Some(slot.conn.clone())
    }

    fn release(&self, id: u64) {
        let mut slots = self.slots.lock();
        let Some(pos) = slots.iter().position(|slot| slot.conn.id() == id) else {
            return;
        };
        if slots[pos].conn.is_ready() {
            trace!("Connection #{} returned to pool", id);
            slots[pos].checked_out = false;
        } else {
            debug!(
                "Discarding connection #{} in state {:?} on release",
                id,
                slots[pos].conn.state()
            );
            slots.remove(pos);
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("endpoint", &self.endpoint)
            .field("len", &self.len())
            .field("available", &self.available())
            .finish()
    }
}

/// Connection, checked out from pool.
///
/// Returned to pool on drop.
pub struct PooledConnection {
    pool: Arc<ConnectionPool>,
    conn: Connection,
    _permit: Option<OwnedSemaphorePermit>,
}

impl PooledConnection {
    fn new(pool: Arc<ConnectionPool>, conn: Connection, permit: Option<OwnedSemaphorePermit>) -> Self {
        Self {
            pool,
            conn,
            _permit: permit,
        }
    }

    /// Pool this connection belongs to.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.pool.release(self.conn.id());
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledConnection").field(&self.conn).finish()
    }
}

/// Build connection pools.
#[derive(Clone, Debug, Default)]
pub struct PoolBuilder {
    connection: ConnectionBuilder,
    max_size: Option<usize>,
    acquire_timeout: Option<Duration>,
    reconnect_interval: Option<ReconnectInterval>,
    connect_attempts: usize,
}

impl PoolBuilder {
    /// Create pool for endpoint, connecting over TCP.
    pub fn build(&self, endpoint: Endpoint) -> Arc<ConnectionPool> {
        let mut connector = TcpConnector::new(self.connection.options().clone());
        if let Some(interval) = self.reconnect_interval.clone() {
            connector = connector.with_retries(interval, self.connect_attempts);
        }
        self.build_with_connector(endpoint, Arc::new(connector))
    }

    /// Create pool for endpoint, using custom connector.
    pub fn build_with_connector(
        &self,
        endpoint: Endpoint,
        connector: Arc<dyn Connector>,
    ) -> Arc<ConnectionPool> {
        Arc::new(ConnectionPool {
            endpoint,
            connector,
            slots: Mutex::new(Vec::new()),
            limit: self.max_size.map(|x| Arc::new(Semaphore::new(x))),
            acquire_timeout: self.acquire_timeout,
        })
    }

    /// Settings of each connection (credentials and timeouts).
    ///
    /// Credentials from endpoint, if present, take precedence.
    pub fn connection(&mut self, connection: ConnectionBuilder) -> &mut Self {
        self.connection = connection;
        self
    }

    /// Maximum number of checked out connections.
    ///
    /// By default pool is unbounded.
    pub fn max_size(&mut self, max_size: Option<usize>) -> &mut Self {
        self.max_size = max_size;
        self
    }

    /// How long to wait for free connection if maximum size reached.
    ///
    /// By default waits forever.
    pub fn acquire_timeout(&mut self, acquire_timeout: Option<Duration>) -> &mut Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Retry failed connects up to `attempts` times.
    ///
    /// By default failed connect is returned immediately.
    pub fn reconnect(&mut self, interval: ReconnectInterval, attempts: usize) -> &mut Self {
        self.reconnect_interval = Some(interval);
        self.connect_attempts = attempts;
        self
    }
}
