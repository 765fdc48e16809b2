use std::io::Write;

use crate::{
    codec::{
        consts::{keys, RequestType},
        utils::{write_kv_tuple, write_kv_u32},
    },
    errors::EncodingError,
    tuple::Tuple,
};

use super::{Request, INDEX_BASE_VALUE};

#[derive(Clone, Debug)]
pub(crate) struct Upsert<T, O> {
    pub space_id: u32,
    pub tuple: T,
    pub ops: O,
}

impl<T, O> Upsert<T, O> {
    pub(crate) fn new(space_id: u32, tuple: T, ops: O) -> Self {
        Self {
            space_id,
            tuple,
            ops,
        }
    }
}

impl<T: Tuple + Send, O: Tuple + Send> Request for Upsert<T, O> {
    fn request_type() -> RequestType
    where
        Self: Sized,
    {
        RequestType::Upsert
    }

    fn encode(&self, mut buf: &mut dyn Write) -> Result<(), EncodingError> {
        rmp::encode::write_map_len(&mut buf, 4)?;
        write_kv_u32(buf, keys::SPACE_ID, self.space_id)?;
        write_kv_u32(buf, keys::INDEX_BASE, INDEX_BASE_VALUE)?;
        write_kv_tuple(buf, keys::OPS, &self.ops)?;
        write_kv_tuple(buf, keys::TUPLE, &self.tuple)?;
        Ok(())
    }
}
