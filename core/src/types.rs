// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use std::fmt;

/// The id of an entity in the store: a 64-bit signed integer whose high 16
/// bits name the partition it was allocated from and whose low 48 bits are
/// the partition-local counter.
pub type Entid = i64;

/// A partition id occupies the high 16 bits of an entid.
pub type PartitionId = u16;

const COUNTER_BITS: u32 = 48;
const COUNTER_MASK: i64 = (1 << COUNTER_BITS) - 1;

/// Compose an entid from a partition id and a partition-local counter.
pub fn entid_from_parts(partition: PartitionId, counter: i64) -> Entid {
    debug_assert!(counter >= 0 && counter <= COUNTER_MASK);
    ((partition as i64) << COUNTER_BITS) | (counter & COUNTER_MASK)
}

/// The partition id encoded in the high bits of `entid`.
pub fn partition_of(entid: Entid) -> PartitionId {
    (entid >> COUNTER_BITS) as PartitionId
}

/// The partition-local counter encoded in the low bits of `entid`.
pub fn counter_of(entid: Entid) -> i64 {
    entid & COUNTER_MASK
}

/// The closed set of logical value types an attribute can be declared with.
///
/// The names mirror the `db.type/*` idents seeded at bootstrap. The set is
/// closed and stable: adding a member means a new bootstrap entity, a new
/// stored representation, and a new typed-column kind, so everything
/// dispatches on this enum rather than on strings.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub enum ValueType {
    Text,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Boolean,
    Instant,
    Date,
    Uuid,
    Bytes,
    Json,
    Ref,
}

impl ValueType {
    /// All members, in bootstrap entity order.
    pub fn all() -> &'static [ValueType] {
        &[
            ValueType::Text,
            ValueType::Int4,
            ValueType::Int8,
            ValueType::Float4,
            ValueType::Float8,
            ValueType::Numeric,
            ValueType::Boolean,
            ValueType::Instant,
            ValueType::Date,
            ValueType::Uuid,
            ValueType::Bytes,
            ValueType::Json,
            ValueType::Ref,
        ]
    }

    /// The short name, as accepted by `define_attribute`.
    pub fn name(&self) -> &'static str {
        match *self {
            ValueType::Text => "text",
            ValueType::Int4 => "int4",
            ValueType::Int8 => "int8",
            ValueType::Float4 => "float4",
            ValueType::Float8 => "float8",
            ValueType::Numeric => "numeric",
            ValueType::Boolean => "bool",
            ValueType::Instant => "timestamptz",
            ValueType::Date => "date",
            ValueType::Uuid => "uuid",
            ValueType::Bytes => "bytea",
            ValueType::Json => "jsonb",
            ValueType::Ref => "ref",
        }
    }

    /// The full `db.type/*` ident of the bootstrap entity for this type.
    pub fn ident(&self) -> String {
        format!("db.type/{}", self.name())
    }

    /// Parse either a short name (`text`) or a full ident (`db.type/text`).
    pub fn from_keyword(s: &str) -> Result<ValueType, ValueTypeError> {
        let name = s.strip_prefix("db.type/").unwrap_or(s);
        ValueType::all()
            .iter()
            .find(|vt| vt.name() == name)
            .cloned()
            .ok_or_else(|| ValueTypeError(s.to_string()))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.ident())
    }
}

/// Raised when a string names no member of the closed `ValueType` set.
#[derive(Debug, Fail)]
#[fail(display = "no such value type: {}", _0)]
pub struct ValueTypeError(pub String);

/// A uniqueness declaration on an attribute. Declared metadata only: the
/// store records it and clients may enforce it.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub enum Unique {
    Identity,
    Value,
}

impl Unique {
    pub fn name(&self) -> &'static str {
        match *self {
            Unique::Identity => "identity",
            Unique::Value => "value",
        }
    }

    pub fn ident(&self) -> String {
        format!("db.unique/{}", self.name())
    }

    pub fn from_keyword(s: &str) -> Option<Unique> {
        match s.strip_prefix("db.unique/").unwrap_or(s) {
            "identity" => Some(Unique::Identity),
            "value" => Some(Unique::Value),
            _ => None,
        }
    }
}

/// The flags carried by an attribute definition.
///
/// `multival` is the cardinality flag: `false` is `db.cardinality/one`,
/// `true` is `db.cardinality/many`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub struct Attribute {
    pub value_type: ValueType,
    pub multival: bool,
    pub unique: Option<Unique>,
}

impl Attribute {
    pub fn new(value_type: ValueType, multival: bool) -> Attribute {
        Attribute {
            value_type: value_type,
            multival: multival,
            unique: None,
        }
    }

    pub fn cardinality_ident(&self) -> &'static str {
        if self.multival {
            "db.cardinality/many"
        } else {
            "db.cardinality/one"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entid_round_trip() {
        let e = entid_from_parts(2, 1);
        assert_eq!(e, (2 << 48) | 1);
        assert_eq!(partition_of(e), 2);
        assert_eq!(counter_of(e), 1);
    }

    #[test]
    fn test_db_partition_ids_are_bare_counters() {
        // Partition 0 encodes to the counter itself, so bootstrap entids
        // read as small integers.
        assert_eq!(entid_from_parts(0, 1), 1);
        assert_eq!(entid_from_parts(0, 112), 112);
    }

    #[test]
    fn test_value_type_keywords() {
        assert_eq!(ValueType::from_keyword("text").unwrap(), ValueType::Text);
        assert_eq!(ValueType::from_keyword("db.type/jsonb").unwrap(), ValueType::Json);
        assert_eq!(ValueType::from_keyword("timestamptz").unwrap(), ValueType::Instant);
        assert!(ValueType::from_keyword("db.type/varchar").is_err());
        assert_eq!(ValueType::all().len(), 13);
    }

    #[test]
    fn test_unique_keywords() {
        assert_eq!(Unique::from_keyword("identity"), Some(Unique::Identity));
        assert_eq!(Unique::from_keyword("db.unique/value"), Some(Unique::Value));
        assert_eq!(Unique::from_keyword("primary"), None);
    }
}
