use rmpv::Value;
use serde::de::DeserializeOwned;

use crate::{errors::DecodingError, utils::extract_iproto_data, Error};

/// Values, returned from `call` and `eval` requests.
///
/// Lua function can return several values, they are sent as single tuple.
#[derive(Clone, Debug, PartialEq)]
pub struct TupleResponse(pub(crate) Value);

impl TupleResponse {
    /// Decode first returned value, dropping everything else.
    pub fn decode_first<T>(self) -> Result<T, DecodingError>
    where
        T: DeserializeOwned,
    {
        match self.into_values()?.into_iter().next() {
            Some(x) => Ok(rmpv::ext::from_value(x)?),
            None => Err(DecodingError::invalid_tuple_length(1, 0)),
        }
    }

    /// Decode returned values, following `value, err` convention of Lua.
    ///
    /// If second value is `nil` or absent, first value is decoded into `T`,
    /// otherwise second value is returned as [`Error::CallEval`].
    pub fn decode_result<T>(self) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let mut values = self.into_values()?.into_iter();
        let first = values
            .next()
            .ok_or_else(|| DecodingError::invalid_tuple_length(1, 0))?;
        match values.next() {
            None | Some(Value::Nil) => {
                Ok(rmpv::ext::from_value(first).map_err(DecodingError::from)?)
            }
            Some(err) => Err(Error::CallEval(err)),
        }
    }

    /// Decode all returned values into type (usually tuple or vector).
    pub fn decode_full<T>(self) -> Result<T, DecodingError>
    where
        T: DeserializeOwned,
    {
        Ok(rmpv::ext::from_value(extract_iproto_data(self.0)?)?)
    }

    /// Returned values without decoding.
    pub fn into_values(self) -> Result<Vec<Value>, DecodingError> {
        match extract_iproto_data(self.0)? {
            Value::Array(x) => Ok(x),
            rest => Err(DecodingError::type_mismatch("array", rest.to_string()).in_key("DATA")),
        }
    }
}
