use std::{fmt, io::Write};

use rmpv::Value;
use serde::{Serialize, Serializer};

use crate::{
    errors::{DecodingError, EncodingError},
    tuple::{Tuple, TupleElement},
};

/// Kind of update operation.
///
/// See [docs](https://www.tarantool.io/en/doc/latest/reference/reference_lua/box_space/update/).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateOperationKind {
    Assign,
    Add,
    Subtract,
    BitAnd,
    BitOr,
    BitXor,
    Splice,
    Insert,
    Delete,
}

impl UpdateOperationKind {
    /// Single-character opcode, sent to server.
    pub fn opcode(self) -> &'static str {
        match self {
            Self::Assign => "=",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Splice => ":",
            Self::Insert => "!",
            Self::Delete => "#",
        }
    }

    pub fn from_opcode(opcode: &str) -> Option<Self> {
        Some(match opcode {
            "=" => Self::Assign,
            "+" => Self::Add,
            "-" => Self::Subtract,
            "&" => Self::BitAnd,
            "|" => Self::BitOr,
            "^" => Self::BitXor,
            ":" => Self::Splice,
            "!" => Self::Insert,
            "#" => Self::Delete,
            _ => return None,
        })
    }
}

impl fmt::Display for UpdateOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode())
    }
}

/// Argument of update operation.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateArgument {
    Value(Value),
    Splice {
        offset: i64,
        length: i64,
        replacement: String,
    },
}

/// Operation in `update` or `upsert` request.
///
/// Encoded as `[opcode, field, argument]`, or `[":", field, offset, length, replacement]`
/// for splice. Field numbers are zero-based.
///
/// ```
/// # use tarantool_pool::UpdateOperation;
/// let ops = vec![UpdateOperation::assign(2, 1666), UpdateOperation::add(3, 1)];
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateOperation {
    kind: UpdateOperationKind,
    field: u32,
    argument: UpdateArgument,
}

impl UpdateOperation {
    fn new(kind: UpdateOperationKind, field: u32, value: impl Into<Value>) -> Self {
        Self {
            kind,
            field,
            argument: UpdateArgument::Value(value.into()),
        }
    }

    /// Set field to value.
    pub fn assign(field: u32, value: impl Into<Value>) -> Self {
        Self::new(UpdateOperationKind::Assign, field, value)
    }

    /// Add number to field.
    pub fn add(field: u32, value: impl Into<Value>) -> Self {
        Self::new(UpdateOperationKind::Add, field, value)
    }

    /// Subtract number from field.
    pub fn subtract(field: u32, value: impl Into<Value>) -> Self {
        Self::new(UpdateOperationKind::Subtract, field, value)
    }

    pub fn bit_and(field: u32, value: u64) -> Self {
        Self::new(UpdateOperationKind::BitAnd, field, value)
    }

    pub fn bit_or(field: u32, value: u64) -> Self {
        Self::new(UpdateOperationKind::BitOr, field, value)
    }

    pub fn bit_xor(field: u32, value: u64) -> Self {
        Self::new(UpdateOperationKind::BitXor, field, value)
    }

    /// Insert value before field, shifting following fields.
    pub fn insert(field: u32, value: impl Into<Value>) -> Self {
        Self::new(UpdateOperationKind::Insert, field, value)
    }

    /// Delete `count` fields, starting from `field`.
    pub fn delete(field: u32, count: u32) -> Self {
        Self::new(UpdateOperationKind::Delete, field, count)
    }

    /// Replace `length` characters of string field, starting from `offset`, with `replacement`.
    ///
    /// Negative offset counts from the end of string.
    pub fn splice(field: u32, offset: i64, length: i64, replacement: impl Into<String>) -> Self {
        Self {
            kind: UpdateOperationKind::Splice,
            field,
            argument: UpdateArgument::Splice {
                offset,
                length,
                replacement: replacement.into(),
            },
        }
    }

    pub fn kind(&self) -> UpdateOperationKind {
        self.kind
    }

    pub fn field(&self) -> u32 {
        self.field
    }

    pub fn argument(&self) -> &UpdateArgument {
        &self.argument
    }

    /// Encode operation as MessagePack array.
    pub fn to_value(&self) -> Value {
        let mut items = vec![Value::from(self.kind.opcode()), Value::from(self.field)];
        match &self.argument {
            UpdateArgument::Value(x) => items.push(x.clone()),
            UpdateArgument::Splice {
                offset,
                length,
                replacement,
            } => items.extend([
                Value::from(*offset),
                Value::from(*length),
                Value::from(replacement.as_str()),
            ]),
        }
        Value::Array(items)
    }

    /// Decode operation from MessagePack array.
    pub fn from_value(value: Value) -> Result<Self, DecodingError> {
        let items = match value {
            Value::Array(x) => x,
            rest => {
                return Err(
                    DecodingError::type_mismatch("array", rest.to_string()).in_other("update operation")
                )
            }
        };
        let mut items = items.into_iter();
        let kind = match items.next() {
            Some(Value::String(x)) => x
                .as_str()
                .and_then(UpdateOperationKind::from_opcode)
                .ok_or_else(|| DecodingError::message(format!("unknown update opcode {:?}", x)))?,
            Some(rest) => return Err(DecodingError::type_mismatch("string", rest.to_string())),
            None => return Err(DecodingError::invalid_tuple_length(3, 0)),
        };
        let field = match items.next() {
            Some(x) => x
                .as_u64()
                .and_then(|x| u32::try_from(x).ok())
                .ok_or_else(|| DecodingError::type_mismatch("u32", x.to_string()))?,
            None => return Err(DecodingError::invalid_tuple_length(3, 1)),
        };
        let rest: Vec<Value> = items.collect();
        let argument = match (kind, rest.as_slice()) {
            (UpdateOperationKind::Splice, [offset, length, replacement]) => UpdateArgument::Splice {
                offset: offset
                    .as_i64()
                    .ok_or_else(|| DecodingError::type_mismatch("integer", offset.to_string()))?,
                length: length
                    .as_i64()
                    .ok_or_else(|| DecodingError::type_mismatch("integer", length.to_string()))?,
                replacement: replacement
                    .as_str()
                    .ok_or_else(|| DecodingError::type_mismatch("string", replacement.to_string()))?
                    .to_owned(),
            },
            (UpdateOperationKind::Splice, _) => {
                return Err(DecodingError::invalid_tuple_length(5, rest.len() + 2))
            }
            (_, [x]) => UpdateArgument::Value(x.clone()),
            (_, _) => return Err(DecodingError::invalid_tuple_length(3, rest.len() + 2)),
        };
        Ok(Self {
            kind,
            field,
            argument,
        })
    }
}

impl Serialize for UpdateOperation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

/// Single operation can be passed where list of operations expected.
impl Tuple for UpdateOperation {
    fn encode_into_writer<W: Write>(&self, mut buf: W) -> Result<(), EncodingError> {
        rmp::encode::write_array_len(&mut buf, 1)?;
        TupleElement::encode_into_writer(self, &mut buf)?;
        Ok(())
    }
}
