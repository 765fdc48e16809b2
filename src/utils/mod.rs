//! Various helpers.

pub use self::deser::{extract_and_deserialize_iproto_data, extract_iproto_data, value_to_map};

pub(crate) use self::{cancellable_future::CancellableFuture, deser::find_and_take_single_key_in_map};

mod cancellable_future;
mod deser;
