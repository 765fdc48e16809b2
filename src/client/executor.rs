use async_trait::async_trait;
use rmpv::Value;
use tokio_util::sync::CancellationToken;

use super::private::Sealed;
use crate::{codec::request::EncodedRequest, pool::PooledConnection, Connection, Result};

/// Type, which can send requests to Tarantool.
///
/// Implemented by [`Connection`], [`PooledConnection`], [`Client`](crate::Client)
/// and references to them. Requests themselves are built by
/// [`ExecutorExt`](crate::ExecutorExt).
#[async_trait]
pub trait Executor: Sealed + Send + Sync {
    /// Send encoded request.
    ///
    /// If `cancel` is triggered before response arrives, fails with
    /// [`Error::Cancelled`](crate::Error::Cancelled).
    async fn send_encoded_request(
        &self,
        request: EncodedRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value>;
}

#[async_trait]
impl Executor for Connection {
    async fn send_encoded_request(
        &self,
        request: EncodedRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        self.send_encoded(request, cancel).await
    }
}

#[async_trait]
impl Executor for PooledConnection {
    async fn send_encoded_request(
        &self,
        request: EncodedRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        self.send_encoded(request, cancel).await
    }
}

#[async_trait]
impl<E: Executor + Sealed + Sync + ?Sized> Executor for &E {
    async fn send_encoded_request(
        &self,
        request: EncodedRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        (**self).send_encoded_request(request, cancel).await
    }
}

/// Executor, which cancels all its requests when token is cancelled.
///
/// Created with [`ExecutorExt::with_cancellation`](crate::ExecutorExt::with_cancellation).
#[derive(Clone, Debug)]
pub struct Cancellable<E> {
    executor: E,
    token: CancellationToken,
}

impl<E> Cancellable<E> {
    pub(crate) fn new(executor: E, token: CancellationToken) -> Self {
        Self { executor, token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn into_inner(self) -> E {
        self.executor
    }
}

#[async_trait]
impl<E: Executor> Executor for Cancellable<E> {
    async fn send_encoded_request(
        &self,
        request: EncodedRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        let response = self.executor.send_encoded_request(request, Some(&self.token));
        match cancel {
            Some(cancel) => tokio::select! {
                res = response => res,
                _ = cancel.cancelled() => Err(crate::Error::Cancelled),
            },
            None => response.await,
        }
    }
}
