use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    builder::{ReconnectInterval, ReconnectIntervalState},
    endpoint::Endpoint,
    errors::Error,
    transport::{Connection, ConnectionOptions},
};

/// Creates new connections for pool.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection, Error>;
}

/// Connect over TCP, optionally retrying failed attempts.
///
/// Credentials from [`Endpoint`] take precedence over ones in options.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    options: ConnectionOptions,
    reconnect_interval: Option<ReconnectInterval>,
    max_attempts: usize,
}

impl TcpConnector {
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            options,
            reconnect_interval: None,
            max_attempts: 1,
        }
    }

    /// Retry failed connects up to `max_attempts` times in total, waiting
    /// `interval` between attempts.
    pub fn with_retries(mut self, interval: ReconnectInterval, max_attempts: usize) -> Self {
        self.reconnect_interval = Some(interval);
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn options_for(&self, endpoint: &Endpoint) -> ConnectionOptions {
        let mut options = self.options.clone();
        if let Some(user) = endpoint.user() {
            options.user = Some(user.into());
            options.password = endpoint.password().map(Into::into);
        }
        options
    }

    fn next_interval(state: &mut Option<ReconnectIntervalState>) -> Duration {
        state
            .as_mut()
            .map(ReconnectIntervalState::next_timeout)
            .unwrap_or_default()
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(ConnectionOptions::default())
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection, Error> {
        let options = self.options_for(endpoint);
        let mut interval = self.reconnect_interval.as_ref().map(ReconnectIntervalState::from);
        let mut attempt = 1;
        loop {
            let err = match Connection::connect(endpoint.address(), &options).await {
                Ok(conn) => {
                    debug!("Connected to {} on attempt {}", endpoint, attempt);
                    return Ok(conn);
                }
                Err(err) => err,
            };
            // Wrong credentials won't become right on next attempt
            if attempt >= self.max_attempts || matches!(err, Error::Auth(_)) {
                return Err(err);
            }
            let wait = Self::next_interval(&mut interval);
            warn!(
                "Failed to connect to {} (attempt {}): {}, next attempt in {:?}",
                endpoint, attempt, err, wait
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}
