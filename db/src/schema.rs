// Copyright 2016 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Validation of attribute declarations. A declaration arrives as loosely
//! typed keywords (`"text"`, `"many"`, `"db.unique/identity"`); this module
//! turns them into an `Attribute` or refuses with the matching error kind.

use palimpsest_core::{
    Attribute,
    Unique,
    ValueType,
};

use errors::{
    DbError,
    Result,
};

/// Accepts `one`, `many`, or the full `db.cardinality/*` idents; anything
/// else is `UnknownCardinality`.
pub fn cardinality_from_keyword(s: &str) -> Result<bool> {
    match s.strip_prefix("db.cardinality/").unwrap_or(s) {
        "one" => Ok(false),
        "many" => Ok(true),
        _ => Err(DbError::UnknownCardinality(s.to_string())),
    }
}

/// Accepts `identity`, `value`, or the full `db.unique/*` idents.
pub fn unique_from_keyword(s: &str) -> Result<Unique> {
    Unique::from_keyword(s)
        .ok_or_else(|| DbError::BadSchemaAssertion(format!("expected db.unique/identity or db.unique/value, got {}", s)))
}

pub fn value_type_from_keyword(s: &str) -> Result<ValueType> {
    ValueType::from_keyword(s).map_err(|_| DbError::UnknownValueType(s.to_string()))
}

/// Accumulates the facts of one attribute definition and validates the
/// combination before anything touches the store.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AttributeBuilder {
    pub value_type: Option<ValueType>,
    pub multival: Option<bool>,
    pub unique: Option<Unique>,
}

impl AttributeBuilder {
    pub fn value_type(&mut self, value_type: ValueType) -> &mut Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn multival(&mut self, multival: bool) -> &mut Self {
        self.multival = Some(multival);
        self
    }

    pub fn unique(&mut self, unique: Unique) -> &mut Self {
        self.unique = Some(unique);
        self
    }

    pub fn build(&self) -> Result<Attribute> {
        let value_type = match self.value_type {
            Some(vt) => vt,
            None => return Err(DbError::BadSchemaAssertion("attribute definition does not set db/valueType".to_string())),
        };
        let multival = match self.multival {
            Some(m) => m,
            None => return Err(DbError::BadSchemaAssertion("attribute definition does not set db/cardinality".to_string())),
        };
        let mut attribute = Attribute::new(value_type, multival);
        attribute.unique = self.unique;
        Ok(attribute)
    }
}
