use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{SinkExt, TryStreamExt};
use parking_lot::Mutex;
use rmpv::Value;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    net::{TcpStream, ToSocketAddrs},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::{codec::FramedRead, codec::FramedWrite, sync::CancellationToken};
use tracing::{debug, trace, warn, Instrument};

use crate::{
    codec::{
        request::{Auth, EncodedRequest, Ping},
        response::{Response, ResponseBody},
        ClientCodec, Greeting,
    },
    errors::{CodecDecodeError, CodecEncodeError, Error},
    utils::CancellableFuture,
};

type ResponseResult = Result<Value, Error>;

/// Capacity of queue between senders and writer task.
const WRITE_QUEUE_SIZE: usize = 128;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// State of single connection.
///
/// `Connecting` and `AwaitingGreeting` are passed inside
/// [`Connection::connect`], so any live [`Connection`] is either `Ready`
/// or already unusable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    AwaitingGreeting,
    Ready,
    /// I/O or protocol error happened, all in-flight requests failed.
    Faulted,
    /// Closed by client.
    Closed,
}

/// Parameters of single connection.
#[derive(Clone, Debug, Default)]
pub struct ConnectionOptions {
    pub user: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Option<Duration>,
    /// Default timeout of each request.
    pub timeout: Option<Duration>,
}

struct ConnectionData {
    in_flights: HashMap<u32, oneshot::Sender<ResponseResult>>,
    next_sync: u32,
    state: ConnectionState,
    schema_version: Option<u32>,
}

impl ConnectionData {
    fn new(next_sync: u32) -> Self {
        Self {
            in_flights: HashMap::with_capacity(5),
            next_sync,
            state: ConnectionState::Ready,
            schema_version: None,
        }
    }

    /// Get next sync, which is not used by any in-flight request.
    #[inline]
    fn next_sync(&mut self) -> u32 {
        loop {
            let next = self.next_sync;
            self.next_sync = self.next_sync.wrapping_add(1);
            if !self.in_flights.contains_key(&next) {
                return next;
            }
        }
    }

    /// Assign sync to request and store completion slot for it.
    #[inline]
    fn try_prepare_request(
        &mut self,
        request: &mut EncodedRequest,
        tx: oneshot::Sender<ResponseResult>,
    ) -> Result<(), Error> {
        if self.state != ConnectionState::Ready {
            return Err(Error::ConnectionClosed);
        }
        let sync = self.next_sync();
        *request.sync_mut() = sync;
        self.in_flights.insert(sync, tx);
        Ok(())
    }

    /// Send result of processing request (by sync) to client.
    #[inline]
    fn respond_to_client(&mut self, sync: u32, result: ResponseResult) {
        if let Some(tx) = self.in_flights.remove(&sync) {
            if tx.send(result).is_err() {
                warn!("Failed to pass response sync {}, receiver dropped", sync);
            }
        } else {
            warn!("Unknown sync {}, response dropped", sync);
        }
    }

    fn handle_response(&mut self, response: Response) {
        trace!(
            "Received response for sync {}, schema version {:?}",
            response.sync,
            response.schema_version
        );
        if response.schema_version.is_some() {
            self.schema_version = response.schema_version;
        }
        let result = match response.body {
            ResponseBody::Ok(x) => Ok(x),
            ResponseBody::Error(err) => Err(Error::Response(err)),
            ResponseBody::Push(_) => {
                debug!("Ignoring out-of-band push for sync {}", response.sync);
                return;
            }
        };
        self.respond_to_client(response.sync, result);
    }

    /// Move connection to final state and fail all in-flight requests.
    #[inline]
    fn finish_with_error(&mut self, state: ConnectionState, err: Error) {
        if matches!(self.state, ConnectionState::Ready) {
            self.state = state;
        }
        for (_, tx) in self.in_flights.drain() {
            let _ = tx.send(Err(err.clone()));
        }
    }
}

/// Removes completion slot when caller stops waiting for response.
struct InFlightGuard<'a> {
    data: &'a Mutex<ConnectionData>,
    sync: u32,
    armed: bool,
}

impl<'a> InFlightGuard<'a> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<'a> Drop for InFlightGuard<'a> {
    fn drop(&mut self) {
        if self.armed && self.data.lock().in_flights.remove(&self.sync).is_some() {
            trace!("Request with sync {} abandoned", self.sync);
        }
    }
}

/// Single multiplexed connection to Tarantool.
///
/// Many requests can be in flight on the same connection at once: each request
/// gets its own `sync` and is matched with its response by a background reader
/// task, so responses can arrive in any order. Frames are written by a background
/// writer task, one at a time.
///
/// Connection does not reconnect. When socket is closed or broken, every pending
/// request fails with [`Error::ConnectionLost`] and connection becomes
/// [`ConnectionState::Faulted`].
///
/// Cloning is cheap, all clones share the same socket.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    id: u64,
    peer: String,
    data: Arc<Mutex<ConnectionData>>,
    writer_tx: mpsc::Sender<EncodedRequest>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
    timeout: Option<Duration>,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        debug!("Dropping connection #{} to {}", self.id, self.peer);
        self.reader_handle.abort();
        self.writer_handle.abort();
        self.data
            .lock()
            .finish_with_error(ConnectionState::Closed, Error::ConnectionClosed);
    }
}

impl Connection {
    /// Establish TCP connection, read greeting and authenticate, if user provided.
    pub async fn connect<A>(addr: A, options: &ConnectionOptions) -> Result<Self, Error>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        match options.connect_timeout {
            Some(dur) => tokio::time::timeout(dur, Self::connect_inner(addr, options))
                .await
                .map_err(|_| Error::ConnectTimeout)
                .and_then(|x| x),
            None => Self::connect_inner(addr, options).await,
        }
    }

    async fn connect_inner<A>(addr: A, options: &ConnectionOptions) -> Result<Self, Error>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        debug!(state = ?ConnectionState::Connecting, "Starting connection to Tarantool {}", addr);
        let tcp = TcpStream::connect(&addr).await?;
        if let Err(err) = tcp.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY on connection to {}: {}", addr, err);
        }
        trace!("Connection established to {}", addr);
        Self::handshake(tcp, addr.to_string(), options).await
    }

    /// Perform handshake on already established stream.
    ///
    /// Useful for non-TCP transports and for testing.
    pub async fn from_stream<S>(stream: S, options: &ConnectionOptions) -> Result<Self, Error>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::handshake(stream, "<stream>".into(), options).await
    }

    async fn handshake<S>(stream: S, peer: String, options: &ConnectionOptions) -> Result<Self, Error>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut read_half, write_half) = tokio::io::split(stream);

        trace!(state = ?ConnectionState::AwaitingGreeting, "Waiting greeting from {}", peer);
        let mut greeting_buffer = [0u8; Greeting::SIZE];
        read_half.read_exact(&mut greeting_buffer).await?;
        let greeting = Greeting::decode(&greeting_buffer)?;
        debug!("Server: {}", greeting.server);
        trace!("Salt: {:?}", greeting.salt);

        let mut read_stream = FramedRead::new(read_half, ClientCodec);
        let mut write_stream = FramedWrite::new(write_half, ClientCodec);

        let mut next_sync = 0;
        if let Some(user) = options.user.as_deref() {
            Self::auth(
                &mut read_stream,
                &mut write_stream,
                next_sync,
                user,
                options.password.as_deref(),
                &greeting.salt,
            )
            .await?;
            next_sync += 1;
        }

        let data = Arc::new(Mutex::new(ConnectionData::new(next_sync)));
        let (writer_tx, writer_rx) = mpsc::channel(WRITE_QUEUE_SIZE);
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let reader_handle =
            tokio::spawn(reader_task(id, read_stream, data.clone()).in_current_span());
        let writer_handle = tokio::spawn(
            writer_task(id, writer_rx, write_stream, data.clone()).in_current_span(),
        );
        debug!(state = ?ConnectionState::Ready, "Connection #{} to {} is ready", id, peer);

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                id,
                peer,
                data,
                writer_tx,
                reader_handle,
                writer_handle,
                timeout: options.timeout,
            }),
        })
    }

    async fn auth<S>(
        read_stream: &mut FramedRead<ReadHalf<S>, ClientCodec>,
        write_stream: &mut FramedWrite<WriteHalf<S>, ClientCodec>,
        sync: u32,
        user: &str,
        password: Option<&str>,
        salt: &[u8],
    ) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite,
    {
        let mut request = EncodedRequest::new(Auth::new(user, password, salt))?;
        *request.sync_mut() = sync;

        trace!("Sending auth request for user '{}'", user);
        write_stream.send(request).await.map_err(|err| match err {
            CodecEncodeError::Io(err) => Error::from(err),
            CodecEncodeError::Encode(err) => Error::from(err),
        })?;

        let resp = match read_stream.try_next().await {
            Ok(Some(x)) => x,
            Ok(None) => return Err(Error::ConnectionLost(CodecDecodeError::Closed)),
            Err(err) => return Err(Error::ConnectionLost(err)),
        };
        match resp.body {
            ResponseBody::Ok(_) => Ok(()),
            ResponseBody::Error(err) => Err(Error::Auth(err)),
            ResponseBody::Push(_) => Err(Error::ConnectionLost(CodecDecodeError::Decode(
                crate::errors::DecodingError::message("unexpected push in response to AUTH"),
            ))),
        }
    }

    /// Unique (within process) id of this connection.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Address this connection was established to.
    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.data.lock().state
    }

    /// Whether connection can accept new requests.
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Number of requests, waiting for response.
    pub fn in_flight_count(&self) -> usize {
        self.inner.data.lock().in_flights.len()
    }

    /// Last schema version, reported by server.
    pub fn schema_version(&self) -> Option<u32> {
        self.inner.data.lock().schema_version
    }

    /// Close connection, failing all in-flight requests.
    pub fn close(&self) {
        debug!("Closing connection #{}", self.inner.id);
        self.inner.reader_handle.abort();
        self.inner.writer_handle.abort();
        self.inner
            .data
            .lock()
            .finish_with_error(ConnectionState::Closed, Error::ConnectionClosed);
    }

    /// Send PING request.
    pub async fn ping(&self) -> Result<(), Error> {
        self.send_encoded(EncodedRequest::new(Ping {})?, None)
            .await
            .map(drop)
    }

    /// Send request and wait for response.
    ///
    /// If `cancel` is triggered before response arrives, [`Error::Cancelled`] is
    /// returned. If connection has default timeout, [`Error::Timeout`] is returned
    /// after it passes. In both cases response, if it arrives later, is dropped.
    pub async fn send_encoded(
        &self,
        mut request: EncodedRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value, Error> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .data
            .lock()
            .try_prepare_request(&mut request, tx)?;
        let sync = request.sync;
        trace!(
            "Sending request {:?} with sync {} on connection #{}",
            request.request_type,
            sync,
            self.inner.id
        );
        let guard = InFlightGuard {
            data: &self.inner.data,
            sync,
            armed: true,
        };

        let response = async {
            self.inner
                .writer_tx
                .send(request)
                .await
                .map_err(|_| Error::ConnectionClosed)?;
            rx.await.unwrap_or(Err(Error::ConnectionClosed))
        };
        let response = CancellableFuture::new(response, cancel);
        let result = match self.inner.timeout {
            Some(dur) => tokio::time::timeout(dur, response).await.map_err(Error::from),
            None => Ok(response.await),
        };
        match result {
            Ok(Ok(x)) => {
                guard.disarm();
                x
            }
            Ok(Err(())) => Err(Error::Cancelled),
            Err(err) => Err(err),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("state", &self.state())
            .finish()
    }
}

async fn reader_task<R>(
    id: u64,
    mut stream: FramedRead<R, ClientCodec>,
    data: Arc<Mutex<ConnectionData>>,
) where
    R: AsyncRead + Unpin,
{
    let mut guard = ReaderGuard {
        id,
        data,
        err: None,
    };
    let err = loop {
        match stream.try_next().await {
            Ok(Some(x)) => guard.data.lock().handle_response(x),
            Ok(None) => break CodecDecodeError::Closed,
            Err(err) => break err,
        }
    };
    guard.err = Some(err);
}

/// Faults connection when reader task stops, whether it returned, panicked
/// or was aborted.
struct ReaderGuard {
    id: u64,
    data: Arc<Mutex<ConnectionData>>,
    err: Option<CodecDecodeError>,
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        let err = self.err.take().unwrap_or(CodecDecodeError::Closed);
        let mut data = self.data.lock();
        if data.state == ConnectionState::Ready {
            warn!("Connection #{} faulted: {}", self.id, err);
        }
        data.finish_with_error(ConnectionState::Faulted, Error::ConnectionLost(err));
    }
}

async fn writer_task<W>(
    id: u64,
    mut rx: mpsc::Receiver<EncodedRequest>,
    mut stream: FramedWrite<W, ClientCodec>,
    data: Arc<Mutex<ConnectionData>>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(request) = rx.recv().await {
        let sync = request.sync;
        // Check whether request was cancelled while it was in queue
        if !data.lock().in_flights.contains_key(&sync) {
            trace!("Skipping abandoned request with sync {}", sync);
            continue;
        }
        match stream.send(request).await {
            Ok(()) => {}
            Err(CodecEncodeError::Encode(err)) => {
                data.lock().respond_to_client(sync, Err(err.into()));
            }
            Err(CodecEncodeError::Io(err)) => {
                warn!("Connection #{} faulted on write: {}", id, err);
                data.lock().finish_with_error(
                    ConnectionState::Faulted,
                    Error::ConnectionLost(CodecDecodeError::from(err)),
                );
                return;
            }
        }
    }

    debug!("All senders of connection #{} dropped", id);
    if let Err(err) = stream.into_inner().shutdown().await {
        warn!("Failed to shutdown stream cleanly: {err}");
    }
}
