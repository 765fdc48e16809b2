use std::{fmt::Display, time::Duration};

use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use tokio::net::ToSocketAddrs;

use crate::{
    errors::Error,
    transport::{Connection, ConnectionOptions},
};

/// Interval between connect attempts, made by pool.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconnectInterval {
    Fixed(Duration),
    ExponentialBackoff {
        min: Duration,
        max: Duration,
        randomization_factor: f64,
        multiplier: f64,
    },
}

impl Default for ReconnectInterval {
    fn default() -> Self {
        Self::exponential_backoff(Duration::from_millis(1), Duration::from_secs(1), 0.5, 5.0)
    }
}

impl ReconnectInterval {
    /// Fixed interval between reconnection attempts.
    pub fn fixed(interval: Duration) -> Self {
        Self::Fixed(interval)
    }

    /// Interval between reconnection attempts calculated as
    /// exponentially growing period.
    ///
    /// For details on this values check [`backoff::ExponentialBackoff`] docs.
    pub fn exponential_backoff(
        min_interval: Duration,
        max_interval: Duration,
        randomization_factor: f64,
        multiplier: f64,
    ) -> Self {
        Self::ExponentialBackoff {
            min: min_interval.max(Duration::from_micros(1)),
            max: max_interval,
            randomization_factor,
            multiplier,
        }
    }
}

/// Interval before next reconnect attempt.
#[derive(Debug)]
pub(crate) enum ReconnectIntervalState {
    Fixed(Duration),
    ExponentialBackoff {
        state: ExponentialBackoff,
        max: Duration,
    },
}

impl ReconnectIntervalState {
    pub(crate) fn next_timeout(&mut self) -> Duration {
        match self {
            ReconnectIntervalState::Fixed(x) => *x,
            ReconnectIntervalState::ExponentialBackoff { ref mut state, max } => {
                state.next_backoff().unwrap_or(*max)
            }
        }
    }
}

impl From<&ReconnectInterval> for ReconnectIntervalState {
    fn from(value: &ReconnectInterval) -> Self {
        match value {
            ReconnectInterval::Fixed(x) => Self::Fixed(*x),
            ReconnectInterval::ExponentialBackoff {
                min,
                max,
                randomization_factor,
                multiplier,
            } => {
                let state = ExponentialBackoffBuilder::new()
                    .with_initial_interval(*min)
                    .with_max_interval(*max)
                    .with_randomization_factor(*randomization_factor)
                    .with_multiplier(*multiplier)
                    .with_max_elapsed_time(None)
                    .build();
                Self::ExponentialBackoff { state, max: *max }
            }
        }
    }
}

/// Build connection to Tarantool.
#[derive(Clone, Debug, Default)]
pub struct ConnectionBuilder {
    options: ConnectionOptions,
}

impl ConnectionBuilder {
    /// Create connection to Tarantool using provided address.
    pub async fn build<A>(&self, addr: A) -> Result<Connection, Error>
    where
        A: ToSocketAddrs + Display,
    {
        Connection::connect(addr, &self.options).await
    }

    /// Sets user login and, optionally, password, used for this connection.
    ///
    /// AUTH message sent upon connecting to server.
    pub fn auth(&mut self, user: &str, password: Option<&str>) -> &mut Self {
        self.options.user = Some(user.into());
        self.options.password = password.map(Into::into);
        self
    }

    /// Sets timeout of establishing connection, including greeting and authentication.
    ///
    /// By default disabled.
    pub fn connect_timeout(&mut self, connect_timeout: Option<Duration>) -> &mut Self {
        self.options.connect_timeout = connect_timeout;
        self
    }

    /// Sets default timeout of each request.
    ///
    /// By default disabled.
    pub fn timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.options.timeout = timeout;
        self
    }

    pub(crate) fn options(&self) -> &ConnectionOptions {
        &self.options
    }
}
