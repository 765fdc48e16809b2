/// IPROTO map keys.
///
/// Describes only keys, used in this crate.
///
/// See details [here](https://github.com/tarantool/tarantool/blob/master/src/box/iproto_constants.h#L62).
pub mod keys {
    pub const REQUEST_TYPE: u8 = 0x00;
    pub const RESPONSE_CODE: u8 = 0x00;
    pub const SYNC: u8 = 0x01;
    pub const SCHEMA_VERSION: u8 = 0x05;
    pub const SPACE_ID: u8 = 0x10;
    pub const INDEX_ID: u8 = 0x11;
    pub const LIMIT: u8 = 0x12;
    pub const OFFSET: u8 = 0x13;
    pub const ITERATOR: u8 = 0x14;
    pub const INDEX_BASE: u8 = 0x15;
    pub const KEY: u8 = 0x20;
    pub const TUPLE: u8 = 0x21;
    pub const FUNCTION_NAME: u8 = 0x22;
    pub const USER_NAME: u8 = 0x23;
    pub const EXPR: u8 = 0x27;
    pub const OPS: u8 = 0x28;
    pub const DATA: u8 = 0x30;
    pub const ERROR_24: u8 = 0x31;
    pub const ERROR: u8 = 0x52;
}

/// Request type constants.
///
/// Describes only types, used in this crate.
///
/// See details [here](https://github.com/tarantool/tarantool/blob/master/src/box/iproto_constants.h).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestType {
    Select = 1,
    Insert = 2,
    Replace = 3,
    Update = 4,
    Delete = 5,
    Auth = 7,
    Eval = 8,
    Upsert = 9,
    /// CALL request - returns arbitrary MessagePack
    Call = 10,
    Ping = 64,
}

pub mod response_codes {
    pub const OK: u32 = 0x0;
    /// Out-of-band message (`box.session.push`), not final response for sync.
    pub const CHUNK: u32 = 0x80;
    pub const ERROR_RANGE_START: u32 = 0x8000;
    pub const ERROR_RANGE_END: u32 = 0x8FFF;
}

/// Iterator type of `select` request.
///
/// Passed to server as is, semantics are defined by the index type.
/// See [docs](https://www.tarantool.io/en/doc/latest/reference/reference_lua/box_index/pairs/#box-index-iterator-types).
///
/// There is no `BitsAnyNotSet`: Tarantool does not define such iterator.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IteratorType {
    /// Tuples with key equal to search key.
    #[default]
    Eq = 0,
    /// Same as `Eq`, but in reverse order.
    Req = 1,
    /// All tuples.
    All = 2,
    Lt = 3,
    Le = 4,
    Ge = 5,
    Gt = 6,
    BitsAllSet = 7,
    BitsAnySet = 8,
    BitsAllNotSet = 9,
    /// Rectangles or boxes overlapping with search key (RTREE only).
    Overlaps = 10,
    /// Nearest points (RTREE only).
    Neighbor = 11,
}

impl From<IteratorType> for u32 {
    fn from(value: IteratorType) -> Self {
        value as u32
    }
}
