//! Bodies of IPROTO requests.
//!
//! Each body knows its request type and how to write itself as MessagePack map.
//! Header is written separately by [`ClientCodec`](super::ClientCodec), after
//! the connection assigns `sync` to the request.

pub(crate) use self::{
    auth::Auth, call::Call, delete::Delete, eval::Eval, insert::Insert, ping::Ping,
    replace::Replace, select::Select, update::Update, upsert::Upsert,
};

use std::io::Write;

use bytes::Bytes;

use super::consts::{keys, RequestType};
use crate::errors::EncodingError;

mod auth;
mod call;
mod delete;
mod eval;
mod insert;
mod ping;
mod replace;
mod select;
mod update;
mod upsert;

/// Field numbers in update operations are zero-based.
pub(crate) const INDEX_BASE_VALUE: u32 = 0;

pub trait Request: Send {
    /// Return type of this request.
    fn request_type() -> RequestType
    where
        Self: Sized;

    /// Encode body into MessagePack and write it to provided [`Write`].
    fn encode(&self, buf: &mut dyn Write) -> Result<(), EncodingError>;
}

/// Request with already encoded body.
///
/// Body is encoded in the caller's task, so encoding errors are reported
/// to the caller and writer task only copies bytes into socket.
#[derive(Clone, Debug)]
pub struct EncodedRequest {
    pub request_type: RequestType,
    pub sync: u32,
    pub body: Bytes,
}

impl EncodedRequest {
    pub fn new<R: Request>(body: R) -> Result<Self, EncodingError> {
        let mut buf = Vec::new();
        body.encode(&mut buf)?;
        Ok(Self {
            request_type: R::request_type(),
            sync: 0,
            body: buf.into(),
        })
    }

    pub(crate) fn sync_mut(&mut self) -> &mut u32 {
        &mut self.sync
    }

    /// Write header and body.
    pub(crate) fn encode(&self, mut buf: impl Write) -> Result<(), EncodingError> {
        rmp::encode::write_map_len(&mut buf, 2)?;
        rmp::encode::write_pfix(&mut buf, keys::REQUEST_TYPE)?;
        rmp::encode::write_pfix(&mut buf, self.request_type as u8)?;
        rmp::encode::write_pfix(&mut buf, keys::SYNC)?;
        rmp::encode::write_u32(&mut buf, self.sync)?;
        buf.write_all(&self.body)?;
        Ok(())
    }
}
