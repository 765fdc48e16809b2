//! Single multiplexed connection to Tarantool.

pub use self::connection::{Connection, ConnectionOptions, ConnectionState};

mod connection;
