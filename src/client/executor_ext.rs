use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt};
use rmpv::Value;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::{
    schema::{SchemaEntityKey, Space, SystemSpacesId, INDEX_BY_NAME_ID},
    Cancellable, DmoResponse, Executor, TupleResponse,
};
use crate::{
    codec::request::{
        Call, Delete, EncodedRequest, Eval, Insert, Ping, Replace, Request, Select, Update, Upsert,
    },
    tuple::Tuple,
    utils::extract_and_deserialize_iproto_data,
    IteratorType, Result,
};

/// Helper trait around [`Executor`] trait, which allows to send specific requests
/// with any type, implementing `Executor` trait.
#[async_trait]
pub trait ExecutorExt: Executor {
    /// Send request, receiving raw response body.
    fn send_request<R>(&self, body: R) -> BoxFuture<Result<Value>>
    where
        R: Request;

    /// Ping tarantool instance.
    async fn ping(&self) -> Result<()> {
        self.send_request(Ping {}).await.map(drop)
    }

    /// Evaluate Lua expression.
    ///
    /// Arguments are available in expression as `...`.
    async fn eval<A, I>(&self, expr: I, args: A) -> Result<TupleResponse>
    where
        A: Tuple + Send,
        I: AsRef<str> + Send + Sync,
    {
        Ok(TupleResponse(
            self.send_request(Eval::new(expr.as_ref(), args)).await?,
        ))
    }

    /// Remotely call function in Tarantool.
    async fn call<A, I>(&self, function_name: I, args: A) -> Result<TupleResponse>
    where
        A: Tuple + Send,
        I: AsRef<str> + Send + Sync,
    {
        Ok(TupleResponse(
            self.send_request(Call::new(function_name.as_ref(), args))
                .await?,
        ))
    }

    /// Select tuples from space.
    ///
    /// By default `limit` is unbounded, `offset` is 0 and `iterator` is [`IteratorType::Eq`].
    async fn select<T, A>(
        &self,
        space_id: u32,
        index_id: u32,
        limit: Option<u32>,
        offset: Option<u32>,
        iterator: Option<IteratorType>,
        keys: A,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        A: Tuple + Send,
    {
        let body = self
            .send_request(Select::new(
                space_id,
                index_id,
                limit.unwrap_or(u32::MAX),
                offset.unwrap_or(0),
                iterator.unwrap_or_default(),
                keys,
            ))
            .await?;
        extract_and_deserialize_iproto_data(body).map_err(Into::into)
    }

    /// Insert tuple, returning inserted row.
    async fn insert<T>(&self, space_id: u32, tuple: T) -> Result<DmoResponse>
    where
        T: Tuple + Send,
    {
        Ok(DmoResponse(
            self.send_request(Insert::new(space_id, tuple)).await?,
        ))
    }

    /// Insert a tuple into a space. If a tuple with the same primary key already exists,
    /// replaces the existing tuple with a new one.
    async fn replace<T>(&self, space_id: u32, tuple: T) -> Result<DmoResponse>
    where
        T: Tuple + Send,
    {
        Ok(DmoResponse(
            self.send_request(Replace::new(space_id, tuple)).await?,
        ))
    }

    /// Update tuple, returning updated row (or nothing, if key not found).
    async fn update<K, O>(
        &self,
        space_id: u32,
        index_id: u32,
        keys: K,
        ops: O,
    ) -> Result<DmoResponse>
    where
        K: Tuple + Send,
        O: Tuple + Send,
    {
        Ok(DmoResponse(
            self.send_request(Update::new(space_id, index_id, keys, ops))
                .await?,
        ))
    }

    /// Insert tuple if there is no tuple with the same primary key, otherwise apply
    /// update operations to existing tuple.
    async fn upsert<T, O>(&self, space_id: u32, tuple: T, ops: O) -> Result<()>
    where
        T: Tuple + Send,
        O: Tuple + Send,
    {
        let _ = self.send_request(Upsert::new(space_id, tuple, ops)).await?;
        Ok(())
    }

    /// Delete a tuple by key in index, returning deleted row.
    async fn delete<T>(&self, space_id: u32, index_id: u32, keys: T) -> Result<DmoResponse>
    where
        T: Tuple + Send,
    {
        Ok(DmoResponse(
            self.send_request(Delete::new(space_id, index_id, keys))
                .await?,
        ))
    }

    /// Find id of space by its name in `_vspace` system view.
    async fn find_space_by_name(&self, name: &str) -> Result<Option<u32>> {
        let rows: Vec<Vec<Value>> = self
            .select(
                SystemSpacesId::VSpace as u32,
                INDEX_BY_NAME_ID,
                Some(1),
                None,
                None,
                (name,),
            )
            .await?;
        Ok(first_field_u32(rows, 0))
    }

    /// Find id of index by space id and index name in `_vindex` system view.
    async fn find_index_by_name(&self, space_id: u32, name: &str) -> Result<Option<u32>> {
        let rows: Vec<Vec<Value>> = self
            .select(
                SystemSpacesId::VIndex as u32,
                INDEX_BY_NAME_ID,
                Some(1),
                None,
                None,
                (space_id, name),
            )
            .await?;
        Ok(first_field_u32(rows, 1))
    }

    /// Get space by key, using reference to current executor.
    ///
    /// Can be called with space's id (if passed unsigned integer) or name (if passed `&str`).
    /// Name is resolved to id on first request.
    fn space<K>(&self, key: K) -> Space<&Self>
    where
        Self: Sized,
        K: Into<SchemaEntityKey>,
    {
        Space::new(self, key)
    }

    /// Get space by key, moving current executor into [`Space`].
    fn into_space<K>(self, key: K) -> Space<Self>
    where
        Self: Sized,
        K: Into<SchemaEntityKey>,
    {
        Space::new(self, key)
    }

    /// Wrap executor, so all requests, sent through it, are cancelled with token.
    fn with_cancellation(self, token: CancellationToken) -> Cancellable<Self>
    where
        Self: Sized,
    {
        Cancellable::new(self, token)
    }
}

#[async_trait]
impl<E: Executor + ?Sized> ExecutorExt for E {
    fn send_request<R>(&self, body: R) -> BoxFuture<Result<Value>>
    where
        R: Request,
    {
        let req = EncodedRequest::new(body);
        async move { self.send_encoded_request(req?, None).await }.boxed()
    }
}

fn first_field_u32(rows: Vec<Vec<Value>>, field: usize) -> Option<u32> {
    rows.into_iter()
        .next()?
        .get(field)?
        .as_u64()
        .and_then(|x| u32::try_from(x).ok())
}
