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
pub(crate) struct Update<K, O> {
    pub space_id: u32,
    pub index_id: u32,
    pub keys: K,
    pub ops: O,
}

impl<K, O> Update<K, O> {
    pub(crate) fn new(space_id: u32, index_id: u32, keys: K, ops: O) -> Self {
        Self {
            space_id,
            index_id,
            keys,
            ops,
        }
    }
}

impl<K: Tuple + Send, O: Tuple + Send> Request for Update<K, O> {
    fn request_type() -> RequestType
    where
        Self: Sized,
    {
        RequestType::Update
    }

    // Operations of UPDATE are sent under TUPLE key, unlike UPSERT
    fn encode(&self, mut buf: &mut dyn Write) -> Result<(), EncodingError> {
        rmp::encode::write_map_len(&mut buf, 5)?;
        write_kv_u32(buf, keys::SPACE_ID, self.space_id)?;
        write_kv_u32(buf, keys::INDEX_ID, self.index_id)?;
        write_kv_u32(buf, keys::INDEX_BASE, INDEX_BASE_VALUE)?;
        write_kv_tuple(buf, keys::KEY, &self.keys)?;
        write_kv_tuple(buf, keys::TUPLE, &self.ops)?;
        Ok(())
    }
}
