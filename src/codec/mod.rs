use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::{Buf, BufMut, BytesMut};
use rmp::Marker;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use self::{request::EncodedRequest, response::Response};
use crate::errors::{CodecDecodeError, CodecEncodeError, DecodingError};

pub mod consts;
pub mod request;
pub mod response;
pub mod utils;

/// Size of length prefix, written by this codec (`0xce` + `u32`).
const LENGTH_PREFIX_SIZE: usize = 5;

/// Frames with bigger length are treated as garbage.
pub(crate) const MAX_FRAME_LENGTH: usize = 256 * 1024 * 1024;

/// Upper bound of buffer growth while waiting for the rest of frame.
const MAX_RESERVE: usize = 1024 * 1024;

/// Read MessagePack unsigned integer, which prefixes every frame.
///
/// `Ok(None)` means not enough data yet, nothing is consumed from `src`
/// in that case.
pub(crate) fn peek_frame_length(src: &[u8]) -> Result<Option<(usize, usize)>, DecodingError> {
    let Some(first) = src.first() else {
        return Ok(None);
    };
    let (header_size, marker) = match Marker::from_u8(*first) {
        Marker::FixPos(x) => return Ok(Some((1, x as usize))),
        Marker::U8 => (2, Marker::U8),
        Marker::U16 => (3, Marker::U16),
        Marker::U32 => (5, Marker::U32),
        Marker::U64 => (9, Marker::U64),
        rest => {
            return Err(DecodingError::type_mismatch(
                "unsigned integer",
                format!("{:?}", rest),
            )
            .in_other("frame length"))
        }
    };
    if src.len() < header_size {
        return Ok(None);
    }
    let mut value = &src[1..header_size];
    let length = match marker {
        Marker::U8 => value.get_u8() as u64,
        Marker::U16 => value.get_u16() as u64,
        Marker::U32 => value.get_u32() as u64,
        _ => value.get_u64(),
    };
    let length = usize::try_from(length)
        .ok()
        .filter(|x| *x <= MAX_FRAME_LENGTH)
        .ok_or_else(|| {
            DecodingError::message(format!("frame length {length} is too big"))
                .in_other("frame length")
        })?;
    Ok(Some((header_size, length)))
}

/// Codec of IPROTO frames: `length || header || body`.
#[derive(Default)]
pub(crate) struct ClientCodec;

impl Decoder for ClientCodec {
    type Item = Response;

    type Error = CodecDecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((prefix_size, frame_length)) =
            peek_frame_length(&src[..]).map_err(CodecDecodeError::Decode)?
        else {
            return Ok(None);
        };
        let total = prefix_size.checked_add(frame_length).ok_or_else(|| {
            CodecDecodeError::Decode(DecodingError::message(format!(
                "frame length {frame_length} is too big"
            )))
        })?;
        if src.len() < total {
            src.reserve((total - src.len()).min(MAX_RESERVE));
            return Ok(None);
        }
        trace!("decoded frame length: {}", frame_length);
        src.advance(prefix_size);
        let frame_bytes = src.split_to(frame_length);
        Response::decode(frame_bytes.reader())
            .map(Some)
            .map_err(CodecDecodeError::Decode)
    }
}

impl Encoder<EncodedRequest> for ClientCodec {
    type Error = CodecEncodeError;

    // To omit creating intermediate BytesMut, encode message with 0 as length,
    // and after encoding calculate size of the encoded messages and overwrite
    // length field (0) with new data.
    fn encode(&mut self, item: EncodedRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let begin_idx = dst.len();

        let mut writer = dst.writer();
        rmp::encode::write_u32(&mut writer, 0)
            .map_err(|err| CodecEncodeError::Encode(err.into()))?;
        item.encode(&mut writer)?;

        let dst = writer.into_inner();
        let data_len = dst.len() - begin_idx - LENGTH_PREFIX_SIZE;
        let data_len = u32::try_from(data_len).map_err(|_| {
            CodecEncodeError::Encode(crate::errors::EncodingError::new(anyhow::anyhow!(
                "request of {data_len} bytes is too big"
            )))
        })?;
        dst[begin_idx + 1..begin_idx + LENGTH_PREFIX_SIZE].copy_from_slice(&data_len.to_be_bytes());

        Ok(())
    }
}

/// Greeting message from server.
///
/// [Docs](https://www.tarantool.io/en/doc/latest/dev_guide/internals/box_protocol/#greeting-message).
#[derive(Debug)]
pub struct Greeting {
    pub server: String,
    pub salt: Vec<u8>,
}

impl Greeting {
    /// Size of the full message from server in bytes.
    pub const SIZE: usize = 128;

    /// Size of each of two lines, including trailing `\n`.
    const LINE_SIZE: usize = 64;

    pub fn decode(buffer: &[u8; Self::SIZE]) -> Result<Self, DecodingError> {
        let (line1, line2) = buffer.split_at(Self::LINE_SIZE);
        let server = String::from_utf8_lossy(line1).trim_end().to_owned();
        if !server.starts_with("Tarantool") {
            return Err(DecodingError::message(format!(
                "unexpected server in greeting: '{server}'"
            )));
        }
        let salt_b64 = std::str::from_utf8(line2)
            .map_err(|_| DecodingError::message("salt is not valid UTF-8").in_other("greeting"))?
            .trim_end();
        let salt = STANDARD.decode(salt_b64).map_err(|err| {
            DecodingError::message(format!("failed to decode salt from base64: {err}"))
                .in_other("greeting")
        })?;
        Ok(Self { server, salt })
    }
}
