//! Spaces and indices with lazily resolved ids.

pub use self::{index::Index, space::Space};

use std::fmt;

use serde::{Deserialize, Serialize};

mod index;
mod space;

/// Id of the primary index in space.
pub const PRIMARY_INDEX_ID: u32 = 0;

/// Id of index by name in `_vspace` and by `(space_id, name)` in `_vindex`.
pub(crate) const INDEX_BY_NAME_ID: u32 = 2;

/// Ids of system spaces and views.
///
/// According to Tarantool [sources](https://github.com/tarantool/tarantool/blob/00a9e59927399c91158aa2bf9698c4bfa6e11322/src/box/schema_def.h#L66)
/// this values are fixed and all have an id in reserved range `[256, 511]`.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SystemSpacesId {
    /// View of spaces, available to current user.
    VSpace = 281,
    /// View of indices, available to current user.
    VIndex = 289,
}

/// Key of space or index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SchemaEntityKey {
    /// Schema entity symbolic name.
    Name(String),
    /// Internal id of entity.
    Id(u32),
}

impl fmt::Display for SchemaEntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaEntityKey::Name(x) => write!(f, "name '{x}'"),
            SchemaEntityKey::Id(x) => write!(f, "id '{x}'"),
        }
    }
}

impl From<&str> for SchemaEntityKey {
    fn from(value: &str) -> Self {
        Self::Name(value.to_owned())
    }
}

impl From<String> for SchemaEntityKey {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<u32> for SchemaEntityKey {
    fn from(value: u32) -> Self {
        Self::Id(value)
    }
}

impl SchemaEntityKey {
    /// Id, if entity is referenced by id.
    pub fn id(&self) -> Option<u32> {
        match self {
            SchemaEntityKey::Name(_) => None,
            SchemaEntityKey::Id(x) => Some(*x),
        }
    }

    /// Lua accessor of this entity in table `parent` (e.g. `box.space`).
    pub(crate) fn lua_path(&self, parent: &str) -> String {
        match self {
            SchemaEntityKey::Name(x) => format!("{parent}.{x}"),
            SchemaEntityKey::Id(x) => format!("{parent}[{x}]"),
        }
    }
}

/// Script, applying `method` of Lua object `target` to each element of
/// first argument, optionally inside transaction.
///
/// If `collect` is set, script returns table with non-nil results.
pub(crate) fn batch_script(target: &str, method: &str, in_transaction: bool, collect: bool) -> String {
    let mut script = String::from("local items = ...\n");
    if collect {
        script.push_str("local results = {}\n");
    }
    if in_transaction {
        script.push_str("box.begin()\n");
    }
    script.push_str("for _, item in ipairs(items) do\n");
    if collect {
        script.push_str(&format!(
            "    local t = {target}:{method}(item)\n    if t ~= nil then\n        table.insert(results, t)\n    end\n"
        ));
    } else {
        script.push_str(&format!("    {target}:{method}(item)\n"));
    }
    script.push_str("end\n");
    if in_transaction {
        script.push_str("box.commit()\n");
    }
    if collect {
        script.push_str("return results\n");
    }
    script
}
