use std::{fmt, str::FromStr};

use crate::errors::Error;

/// Default port of Tarantool's binary protocol.
pub const DEFAULT_PORT: u16 = 3301;

/// Address and credentials of Tarantool instance.
///
/// Used as key of connection pools, so two endpoints with the same host, port
/// and credentials always share the same pool. Host is stored lowercased.
///
/// Parsed from connection string `[user[:password]@]host[:port]`:
///
/// ```
/// # use tarantool_pool::Endpoint;
/// let endpoint: Endpoint = "guest@localhost:3301".parse().unwrap();
/// assert_eq!(endpoint.host(), "localhost");
/// assert_eq!(endpoint.user(), Some("guest"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
    user: Option<String>,
    password: Option<String>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into().to_lowercase(),
            port,
            user: None,
            password: None,
        }
    }

    /// Set user and, optionally, password.
    pub fn with_auth(mut self, user: impl Into<String>, password: Option<String>) -> Self {
        self.user = Some(user.into());
        self.password = password;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Address in form, accepted by [`tokio::net::TcpStream::connect`].
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| Error::InvalidConnectionString {
            input: s.to_owned(),
            reason,
        };

        let (credentials, address) = match s.rsplit_once('@') {
            Some((credentials, address)) => (Some(credentials), address),
            None => (None, s),
        };

        let (host, port) = if let Some(rest) = address.strip_prefix('[') {
            let (host, rest) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unclosed '[' in host"))?;
            match rest {
                "" => (host, None),
                x => (
                    host,
                    Some(x.strip_prefix(':').ok_or_else(|| invalid("expected ':' after host"))?),
                ),
            }
        } else {
            match address.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (address, None),
            }
        };
        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        let port = match port {
            Some(x) => x.parse().map_err(|_| invalid("port is not a valid number"))?,
            None => DEFAULT_PORT,
        };

        let mut endpoint = Endpoint::new(host, port);
        if let Some(credentials) = credentials {
            let (user, password) = match credentials.split_once(':') {
                Some((user, password)) => (user, Some(password.to_owned())),
                None => (credentials, None),
            };
            if user.is_empty() {
                return Err(invalid("user is empty"));
            }
            endpoint = endpoint.with_auth(user, password);
        }
        Ok(endpoint)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.user, &self.password) {
            (Some(user), Some(_)) => write!(f, "{}:***@{}", user, self.address()),
            (Some(user), None) => write!(f, "{}@{}", user, self.address()),
            (None, _) => f.write_str(&self.address()),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({})", self)
    }
}
