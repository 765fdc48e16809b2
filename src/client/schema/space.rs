use std::{fmt, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use super::{batch_script, Index, SchemaEntityKey, PRIMARY_INDEX_ID};
use crate::{
    client::{DmoResponse, Executor, ExecutorExt},
    tuple::Tuple,
    Error, IteratorType, Result,
};

/// Tarantool space.
///
/// Space can be created by id or by name. Name is resolved into id with `_vspace`
/// lookup on first request; resolved id is cached in this object (and all its
/// clones and indices). Concurrent first requests share single lookup.
/// If space is not found, nothing is cached and the next request tries again.
pub struct Space<E> {
    executor: E,
    inner: Arc<SpaceInner>,
}

struct SpaceInner {
    key: SchemaEntityKey,
    id: OnceCell<u32>,
}

impl<E: Clone> Clone for Space<E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<E> fmt::Debug for Space<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Space")
            .field("key", &self.inner.key)
            .field("id", &self.inner.id.get())
            .finish()
    }
}

impl<E> Space<E> {
    pub fn new(executor: E, key: impl Into<SchemaEntityKey>) -> Self {
        let key = key.into();
        let id = match key.id() {
            Some(x) => OnceCell::from(x),
            None => OnceCell::new(),
        };
        Self {
            executor,
            inner: Arc::new(SpaceInner { key, id }),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Key, this space was created with.
    pub fn key(&self) -> &SchemaEntityKey {
        &self.inner.key
    }

    /// Id of space, if already known.
    pub fn cached_id(&self) -> Option<u32> {
        self.inner.id.get().copied()
    }

    /// Lua path of the space: `box.space.NAME` or `box.space[ID]`.
    pub fn box_path(&self) -> String {
        self.inner.key.lua_path("box.space")
    }

    /// Index of this space by id or name.
    pub fn index(&self, key: impl Into<SchemaEntityKey>) -> Index<E>
    where
        E: Clone,
    {
        Index::new(self.clone(), key)
    }

    pub fn primary_index(&self) -> Index<E>
    where
        E: Clone,
    {
        self.index(PRIMARY_INDEX_ID)
    }
}

impl<E: Executor> Space<E> {
    /// Resolve id of space, if it is not known yet.
    pub async fn ensure_id(&self) -> Result<u32> {
        self.inner
            .id
            .get_or_try_init(|| async {
                match &self.inner.key {
                    SchemaEntityKey::Id(x) => Ok(*x),
                    SchemaEntityKey::Name(name) => {
                        debug!("Resolving id of space '{}'", name);
                        self.executor
                            .find_space_by_name(name)
                            .await?
                            .ok_or_else(|| Error::SpaceNotFound(self.inner.key.clone()))
                    }
                }
            })
            .await
            .copied()
    }

    /// Select tuples by primary key.
    pub async fn select<T, K>(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
        iterator: Option<IteratorType>,
        keys: K,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        K: Tuple + Send,
    {
        let id = self.ensure_id().await?;
        self.executor
            .select(id, PRIMARY_INDEX_ID, limit, offset, iterator, keys)
            .await
    }

    /// Insert tuple.
    pub async fn insert<T>(&self, tuple: T) -> Result<DmoResponse>
    where
        T: Tuple + Send,
    {
        let id = self.ensure_id().await?;
        self.executor.insert(id, tuple).await
    }

    /// Insert or replace tuple.
    pub async fn replace<T>(&self, tuple: T) -> Result<DmoResponse>
    where
        T: Tuple + Send,
    {
        let id = self.ensure_id().await?;
        self.executor.replace(id, tuple).await
    }

    /// Insert tuple or update existing one with the same primary key.
    pub async fn upsert<T, O>(&self, tuple: T, ops: O) -> Result<()>
    where
        T: Tuple + Send,
        O: Tuple + Send,
    {
        let id = self.ensure_id().await?;
        self.executor.upsert(id, tuple, ops).await
    }

    /// Update tuple by primary key.
    pub async fn update<K, O>(&self, keys: K, ops: O) -> Result<DmoResponse>
    where
        K: Tuple + Send,
        O: Tuple + Send,
    {
        let id = self.ensure_id().await?;
        self.executor.update(id, PRIMARY_INDEX_ID, keys, ops).await
    }

    /// Delete tuple by primary key.
    pub async fn delete<K>(&self, keys: K) -> Result<DmoResponse>
    where
        K: Tuple + Send,
    {
        let id = self.ensure_id().await?;
        self.executor.delete(id, PRIMARY_INDEX_ID, keys).await
    }

    /// Insert all tuples with single `eval` request.
    ///
    /// If `in_transaction` is set, either all tuples inserted or none of them.
    pub async fn insert_many<T>(&self, tuples: &[T], in_transaction: bool) -> Result<()>
    where
        T: Serialize + Sync,
    {
        self.apply_many("insert", tuples, in_transaction).await
    }

    /// Replace all tuples with single `eval` request.
    ///
    /// If `in_transaction` is set, either all tuples replaced or none of them.
    pub async fn replace_many<T>(&self, tuples: &[T], in_transaction: bool) -> Result<()>
    where
        T: Serialize + Sync,
    {
        self.apply_many("replace", tuples, in_transaction).await
    }

    async fn apply_many<T>(&self, method: &str, tuples: &[T], in_transaction: bool) -> Result<()>
    where
        T: Serialize + Sync,
    {
        if tuples.is_empty() {
            return Ok(());
        }
        let id = self.ensure_id().await?;
        let script = batch_script(&format!("box.space[{id}]"), method, in_transaction, false);
        let _ = self.executor.eval(script, (tuples,)).await?;
        Ok(())
    }
}
