// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Fixed entids in the `db` partition, seeded by the bootstrapper. These
//! never change: the store describes itself in terms of them, so they are
//! compiled in rather than looked up.

use palimpsest_core::{
    Entid,
    Unique,
    ValueType,
};

// System attributes.
pub const DB_IDENT: Entid = 1;
pub const DB_VALUE_TYPE: Entid = 2;
pub const DB_CARDINALITY: Entid = 3;
pub const DB_UNIQUE: Entid = 4;
pub const DB_DOC: Entid = 5;
pub const DB_VIEW_IDENT: Entid = 10;
pub const DB_VIEW_ATTRIBUTES: Entid = 11;
pub const DB_VIEW_DOC: Entid = 12;
pub const DB_VIEW_OPTIONAL_ATTRIBUTES: Entid = 13;

// Value type enum entities, `db.type/*`.
pub const DB_TYPE_TEXT: Entid = 100;
pub const DB_TYPE_INT4: Entid = 101;
pub const DB_TYPE_INT8: Entid = 102;
pub const DB_TYPE_FLOAT4: Entid = 103;
pub const DB_TYPE_FLOAT8: Entid = 104;
pub const DB_TYPE_NUMERIC: Entid = 105;
pub const DB_TYPE_BOOL: Entid = 106;
pub const DB_TYPE_TIMESTAMPTZ: Entid = 107;
pub const DB_TYPE_DATE: Entid = 108;
pub const DB_TYPE_UUID: Entid = 109;
pub const DB_TYPE_BYTEA: Entid = 110;
pub const DB_TYPE_JSONB: Entid = 111;
pub const DB_TYPE_REF: Entid = 112;

// Cardinality enum entities.
pub const DB_CARDINALITY_ONE: Entid = 200;
pub const DB_CARDINALITY_MANY: Entid = 201;

// Uniqueness enum entities.
pub const DB_UNIQUE_IDENTITY: Entid = 210;
pub const DB_UNIQUE_VALUE: Entid = 211;

/// The bootstrap transaction, which carries every system datom.
pub const TX0: Entid = 0;

pub fn value_type_entid(value_type: ValueType) -> Entid {
    match value_type {
        ValueType::Text => DB_TYPE_TEXT,
        ValueType::Int4 => DB_TYPE_INT4,
        ValueType::Int8 => DB_TYPE_INT8,
        ValueType::Float4 => DB_TYPE_FLOAT4,
        ValueType::Float8 => DB_TYPE_FLOAT8,
        ValueType::Numeric => DB_TYPE_NUMERIC,
        ValueType::Boolean => DB_TYPE_BOOL,
        ValueType::Instant => DB_TYPE_TIMESTAMPTZ,
        ValueType::Date => DB_TYPE_DATE,
        ValueType::Uuid => DB_TYPE_UUID,
        ValueType::Bytes => DB_TYPE_BYTEA,
        ValueType::Json => DB_TYPE_JSONB,
        ValueType::Ref => DB_TYPE_REF,
    }
}

pub fn entid_value_type(entid: Entid) -> Option<ValueType> {
    match entid {
        DB_TYPE_TEXT => Some(ValueType::Text),
        DB_TYPE_INT4 => Some(ValueType::Int4),
        DB_TYPE_INT8 => Some(ValueType::Int8),
        DB_TYPE_FLOAT4 => Some(ValueType::Float4),
        DB_TYPE_FLOAT8 => Some(ValueType::Float8),
        DB_TYPE_NUMERIC => Some(ValueType::Numeric),
        DB_TYPE_BOOL => Some(ValueType::Boolean),
        DB_TYPE_TIMESTAMPTZ => Some(ValueType::Instant),
        DB_TYPE_DATE => Some(ValueType::Date),
        DB_TYPE_UUID => Some(ValueType::Uuid),
        DB_TYPE_BYTEA => Some(ValueType::Bytes),
        DB_TYPE_JSONB => Some(ValueType::Json),
        DB_TYPE_REF => Some(ValueType::Ref),
        _ => None,
    }
}

pub fn cardinality_entid(multival: bool) -> Entid {
    if multival { DB_CARDINALITY_MANY } else { DB_CARDINALITY_ONE }
}

pub fn unique_entid(unique: Unique) -> Entid {
    match unique {
        Unique::Identity => DB_UNIQUE_IDENTITY,
        Unique::Value => DB_UNIQUE_VALUE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_entids_are_dense() {
        for (i, vt) in ValueType::all().iter().enumerate() {
            assert_eq!(value_type_entid(*vt), 100 + i as Entid);
            assert_eq!(entid_value_type(100 + i as Entid), Some(*vt));
        }
        assert_eq!(entid_value_type(113), None);
    }
}
