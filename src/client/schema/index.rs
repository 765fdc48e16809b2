use std::{fmt, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use super::{batch_script, SchemaEntityKey, Space};
use crate::{
    client::{DmoResponse, Executor, ExecutorExt},
    tuple::Tuple,
    Error, IteratorType, Result,
};

/// Index of Tarantool space.
///
/// Like [`Space`], index can be created by id or by name; name is resolved with
/// `_vindex` lookup (after resolving id of space) and cached in this object.
pub struct Index<E> {
    space: Space<E>,
    inner: Arc<IndexInner>,
}

struct IndexInner {
    key: SchemaEntityKey,
    id: OnceCell<u32>,
}

impl<E: Clone> Clone for Index<E> {
    fn clone(&self) -> Self {
        Self {
            space: self.space.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<E> fmt::Debug for Index<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("space", &self.space)
            .field("key", &self.inner.key)
            .field("id", &self.inner.id.get())
            .finish()
    }
}

impl<E> Index<E> {
    pub(super) fn new(space: Space<E>, key: impl Into<SchemaEntityKey>) -> Self {
        let key = key.into();
        let id = match key.id() {
            Some(x) => OnceCell::from(x),
            None => OnceCell::new(),
        };
        Self {
            space,
            inner: Arc::new(IndexInner { key, id }),
        }
    }

    pub fn space(&self) -> &Space<E> {
        &self.space
    }

    pub fn key(&self) -> &SchemaEntityKey {
        &self.inner.key
    }

    /// Id of index, if already known.
    pub fn cached_id(&self) -> Option<u32> {
        self.inner.id.get().copied()
    }

    /// Lua path of the index: `<space path>.index.NAME` or `<space path>.index[ID]`.
    pub fn box_path(&self) -> String {
        self.inner
            .key
            .lua_path(&format!("{}.index", self.space.box_path()))
    }
}

impl<E: Executor> Index<E> {
    /// Resolve id of index (and id of its space), if it is not known yet.
    pub async fn ensure_id(&self) -> Result<u32> {
        let space_id = self.space.ensure_id().await?;
        self.inner
            .id
            .get_or_try_init(|| async {
                match &self.inner.key {
                    SchemaEntityKey::Id(x) => Ok(*x),
                    SchemaEntityKey::Name(name) => {
                        debug!("Resolving id of index '{}' in space {}", name, space_id);
                        self.space
                            .executor()
                            .find_index_by_name(space_id, name)
                            .await?
                            .ok_or_else(|| Error::IndexNotFound {
                                space_id,
                                index: self.inner.key.clone(),
                            })
                    }
                }
            })
            .await
            .copied()
    }

    async fn ensure_ids(&self) -> Result<(u32, u32)> {
        let index_id = self.ensure_id().await?;
        let space_id = self.space.ensure_id().await?;
        Ok((space_id, index_id))
    }

    /// Select tuples by key.
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
        let (space_id, index_id) = self.ensure_ids().await?;
        self.space
            .executor()
            .select(space_id, index_id, limit, offset, iterator, keys)
            .await
    }

    /// Select all tuples in order of this index.
    pub async fn select_all<T>(&self) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.select(None, None, Some(IteratorType::All), ()).await
    }

    /// Update tuple by key of this index.
    pub async fn update<K, O>(&self, keys: K, ops: O) -> Result<DmoResponse>
    where
        K: Tuple + Send,
        O: Tuple + Send,
    {
        let (space_id, index_id) = self.ensure_ids().await?;
        self.space
            .executor()
            .update(space_id, index_id, keys, ops)
            .await
    }

    /// Delete tuple by key of this index.
    pub async fn delete<K>(&self, keys: K) -> Result<DmoResponse>
    where
        K: Tuple + Send,
    {
        let (space_id, index_id) = self.ensure_ids().await?;
        self.space.executor().delete(space_id, index_id, keys).await
    }

    /// Delete tuples by list of keys with single `eval` request.
    ///
    /// If `in_transaction` is set, either all tuples deleted or none of them.
    pub async fn delete_many<K>(&self, keys: &[K], in_transaction: bool) -> Result<()>
    where
        K: Serialize + Sync,
    {
        if keys.is_empty() {
            return Ok(());
        }
        let script = self.delete_script(in_transaction, false).await?;
        let _ = self.space.executor().eval(script, (keys,)).await?;
        Ok(())
    }

    /// Delete tuples by list of keys with single `eval` request, returning deleted tuples.
    ///
    /// Keys, for which nothing was found, are skipped.
    pub async fn delete_many_and_return<T, K>(
        &self,
        keys: &[K],
        in_transaction: bool,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        K: Serialize + Sync,
    {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let script = self.delete_script(in_transaction, true).await?;
        let resp = self.space.executor().eval(script, (keys,)).await?;
        Ok(resp.decode_first()?)
    }

    async fn delete_script(&self, in_transaction: bool, collect: bool) -> Result<String> {
        let (space_id, index_id) = self.ensure_ids().await?;
        Ok(batch_script(
            &format!("box.space[{space_id}].index[{index_id}]"),
            "delete",
            in_transaction,
            collect,
        ))
    }
}
