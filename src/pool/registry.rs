use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use parking_lot::Mutex;
use tracing::debug;

use super::{ConnectionPool, PoolBuilder};
use crate::{endpoint::Endpoint, errors::Error};

/// Pools, keyed by [`Endpoint`].
///
/// Pool for endpoint is created on first request and lives as long as registry.
pub struct PoolRegistry {
    builder: PoolBuilder,
    pools: Mutex<HashMap<Endpoint, Arc<ConnectionPool>>>,
}

impl PoolRegistry {
    pub fn new(builder: PoolBuilder) -> Self {
        Self {
            builder,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide registry with default settings.
    pub fn global() -> &'static PoolRegistry {
        static GLOBAL: OnceLock<PoolRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| PoolRegistry::new(PoolBuilder::default()))
    }

    /// Get pool for endpoint, creating it if needed.
    pub fn get_pool(&self, endpoint: &Endpoint) -> Arc<ConnectionPool> {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get(endpoint) {
            return pool.clone();
        }
        debug!("Creating pool for {}", endpoint);
        let pool = self.builder.build(endpoint.clone());
        pools.insert(endpoint.clone(), pool.clone());
        pool
    }

    /// Parse connection string and get pool for it.
    pub fn get_pool_by_str(&self, connection_string: &str) -> Result<Arc<ConnectionPool>, Error> {
        Ok(self.get_pool(&connection_string.parse()?))
    }

    /// Number of pools in registry.
    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.lock().is_empty()
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new(PoolBuilder::default())
    }
}
