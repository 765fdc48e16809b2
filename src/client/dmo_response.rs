use rmpv::Value;
use serde::de::DeserializeOwned;

use crate::{errors::DecodingError, utils::extract_iproto_data};

/// Rows, returned from data-manipulation requests (insert, replace, update, delete).
///
/// Usually contains zero or one row. Result of `upsert` is always empty.
#[derive(Clone, Debug, PartialEq)]
pub struct DmoResponse(pub(crate) Value);

impl DmoResponse {
    /// Decode single row.
    ///
    /// Fails if no rows returned.
    pub fn decode<T>(self) -> Result<T, DecodingError>
    where
        T: DeserializeOwned,
    {
        self.decode_opt()?
            .ok_or_else(|| DecodingError::invalid_tuple_length(1, 0))
    }

    /// Decode single row, or return `None` if no rows returned (e.g. nothing
    /// was updated).
    pub fn decode_opt<T>(self) -> Result<Option<T>, DecodingError>
    where
        T: DeserializeOwned,
    {
        self.into_rows()?
            .into_iter()
            .next()
            .map(rmpv::ext::from_value::<T>)
            .transpose()
            .map_err(Into::into)
    }

    /// Decode all rows.
    pub fn decode_all<T>(self) -> Result<Vec<T>, DecodingError>
    where
        T: DeserializeOwned,
    {
        self.into_rows()?
            .into_iter()
            .map(|x| rmpv::ext::from_value(x).map_err(DecodingError::from))
            .collect()
    }

    /// Rows without decoding.
    pub fn into_rows(self) -> Result<Vec<Value>, DecodingError> {
        match extract_iproto_data(self.0)? {
            Value::Array(x) => Ok(x),
            rest => Err(DecodingError::type_mismatch("array", rest.to_string()).in_key("DATA")),
        }
    }
}
