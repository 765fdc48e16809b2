use std::io::Read;

use rmpv::Value;
use tracing::debug;

use super::consts::{
    keys,
    response_codes::{CHUNK, ERROR_RANGE_END, ERROR_RANGE_START, OK},
};
use crate::errors::{DecodingError, DecodingErrorDetails, ErrorResponse};

#[derive(Clone, Debug)]
pub enum ResponseBody {
    /// Successful response. Body is a map, usually with `IPROTO_DATA` key.
    Ok(Value),
    /// Error reported by server for this request.
    Error(ErrorResponse),
    /// Out-of-band message, final response for same sync will follow.
    Push(Value),
}

#[derive(Clone, Debug)]
pub struct Response {
    pub sync: u32,
    pub schema_version: Option<u32>,
    pub body: ResponseBody,
}

impl Response {
    /// Decode single frame (without length prefix).
    pub fn decode(mut buf: impl Read) -> Result<Self, DecodingError> {
        let map_len = rmp::decode::read_map_len(&mut buf)?;
        let mut response_code: Option<u32> = None;
        let mut sync: Option<u32> = None;
        let mut schema_version: Option<u32> = None;
        for _ in 0..map_len {
            let key: u8 = rmp::decode::read_int(&mut buf)?;
            match key {
                keys::RESPONSE_CODE => {
                    response_code = Some(rmp::decode::read_int(&mut buf)?);
                }
                keys::SYNC => {
                    sync = Some(rmp::decode::read_int(&mut buf)?);
                }
                keys::SCHEMA_VERSION => {
                    schema_version = Some(rmp::decode::read_int(&mut buf)?);
                }
                rest => {
                    debug!("Unexpected key encountered in response header: {}", rest);
                    let _ = rmpv::decode::read_value(&mut buf)?;
                }
            }
        }
        let response_code = response_code
            .ok_or_else(|| DecodingError::missing_key("RESPONSE_CODE").in_other("header"))?;
        let sync = sync.ok_or_else(|| DecodingError::missing_key("SYNC").in_other("header"))?;
        let body = match response_code {
            OK => ResponseBody::Ok(read_body(&mut buf)?),
            CHUNK => ResponseBody::Push(read_body(&mut buf)?),
            code @ ERROR_RANGE_START..=ERROR_RANGE_END => {
                ResponseBody::Error(decode_error(code - ERROR_RANGE_START, &mut buf)?)
            }
            rest => {
                return Err(DecodingError::new(
                    DecodingErrorDetails::UnknownResponseCode(rest),
                ))
            }
        };
        Ok(Self {
            sync,
            schema_version,
            body,
        })
    }
}

/// Body is optional, i.e. PING response has only header.
fn read_body(buf: &mut impl Read) -> Result<Value, DecodingError> {
    let mut rest = Vec::new();
    buf.read_to_end(&mut rest)?;
    if rest.is_empty() {
        return Ok(Value::Map(Vec::new()));
    }
    Ok(rmpv::decode::read_value(&mut rest.as_slice())?)
}

fn decode_error(code: u32, buf: &mut impl Read) -> Result<ErrorResponse, DecodingError> {
    let body = read_body(buf)?;
    let map = match body {
        Value::Map(x) => x,
        rest => {
            return Err(DecodingError::type_mismatch("map", rest.to_string()).in_other("error body"))
        }
    };
    let mut description = None;
    let mut extra = None;
    for (k, v) in map {
        match k.as_u64() {
            Some(x) if x == keys::ERROR_24 as u64 => match v {
                Value::String(s) => description = s.into_str(),
                rest => debug!("Unexpected ERROR_24 value in error description: {}", rest),
            },
            Some(x) if x == keys::ERROR as u64 => extra = Some(v),
            _ => debug!("Unexpected key encountered in error description: {}", k),
        }
    }
    let description = description
        .or_else(|| extra.as_ref().and_then(error_stack_message))
        .unwrap_or_else(|| format!("Unknown error (code {code})"));
    Ok(ErrorResponse {
        code,
        description,
        extra,
    })
}

/// Message of the first entry of `IPROTO_ERROR` stack: `{0x00: [{0x03: message, ..}, ..]}`.
fn error_stack_message(error: &Value) -> Option<String> {
    let find = |map: &Value, key: u64| {
        map.as_map()?
            .iter()
            .find(|(k, _)| k.as_u64() == Some(key))
            .map(|(_, v)| v.clone())
    };
    let stack = find(error, 0x00)?;
    let first = stack.as_array()?.first()?;
    find(first, 0x03)?.as_str().map(Into::into)
}
