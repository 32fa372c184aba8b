// Copyright 2016 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use std::collections::BTreeMap;

use palimpsest_core::idents;

pub use palimpsest_core::{
    Attribute,
    Entid,
    PartitionId,
    TypedValue,
    Unique,
    ValueType,
};

use errors::{
    DbError,
    Result,
};

/// Represents one partition of the entid space.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub struct Partition {
    /// The partition id, which occupies the high 16 bits of allocated entids.
    pub id: PartitionId,
    pub ident: String,
    /// The next partition-local counter to be handed out.
    pub next_id: i64,
}

/// Map partition idents to `Partition` instances.
pub type PartitionMap = BTreeMap<String, Partition>;

/// An attribute definition materialised from the store, carrying the derived
/// name of the child relation that stores its datoms.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KnownAttribute {
    pub entid: Entid,
    pub ident: String,
    pub attribute: Attribute,
    pub doc: Option<String>,
    pub table: String,
}

impl KnownAttribute {
    pub fn new(entid: Entid, ident: String, attribute: Attribute, doc: Option<String>) -> KnownAttribute {
        let table = idents::attr_table_name(&ident);
        KnownAttribute {
            entid: entid,
            ident: ident,
            attribute: attribute,
            doc: doc,
            table: table,
        }
    }
}

/// Map ident to known attribute. Ordered, so that iteration (and therefore
/// any SQL generated from it) is deterministic across regenerations.
pub type AttributeMap = BTreeMap<String, KnownAttribute>;

/// A view definition materialised from the store.
///
/// `required` and `optional` are kept sorted by ident; the first required
/// attribute anchors the generated join chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ViewDefinition {
    pub entity: Entid,
    pub name: String,
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub doc: Option<String>,
}

/// Map view name to definition.
pub type ViewMap = BTreeMap<String, ViewDefinition>;

/// The schema of the store, materialised once at open and kept current by
/// the admin operations, so the compilers never re-read schema datoms.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Metadata {
    pub attributes: AttributeMap,
    pub views: ViewMap,
}

impl Metadata {
    pub fn require_attribute(&self, ident: &str) -> Result<&KnownAttribute> {
        self.attributes
            .get(ident)
            .ok_or_else(|| DbError::UnknownAttribute(ident.to_string()))
    }

    pub fn attribute_by_entid(&self, entid: Entid) -> Option<&KnownAttribute> {
        self.attributes.values().find(|a| a.entid == entid)
    }

    /// The child relations backing every known attribute, in table-name
    /// order. This is the membership registry for the `datoms` union view.
    pub fn attribute_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.attributes.values().map(|a| a.table.as_str()).collect();
        tables.sort();
        tables
    }
}
