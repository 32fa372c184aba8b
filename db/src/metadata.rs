// Copyright 2016 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Materialises the in-memory `Metadata` from the schema datoms.
//!
//! The store is self-describing: attribute definitions are datoms on the
//! `db/*` attributes and view definitions are datoms on the `db.view/*`
//! attributes. Rather than walking child tables by hand this module reads
//! the introspection views the bootstrapper creates over them, then
//! validates each definition through the same builder the registry uses on
//! the way in.

use rusqlite;

use errors::{
    DbError,
    Result,
};
use schema::{
    AttributeBuilder,
    cardinality_from_keyword,
    value_type_from_keyword,
};
use types::{
    AttributeMap,
    KnownAttribute,
    Metadata,
    ViewDefinition,
    ViewMap,
};

use palimpsest_core::Unique;

pub fn read_metadata(conn: &rusqlite::Connection) -> Result<Metadata> {
    Ok(Metadata {
        attributes: read_attribute_map(conn)?,
        views: read_view_map(conn)?,
    })
}

/// Read every attribute definition visible in the current state.
pub fn read_attribute_map(conn: &rusqlite::Connection) -> Result<AttributeMap> {
    let mut stmt = conn.prepare(
        "SELECT id, ident, value_type, cardinality, \"unique\", doc FROM attributes ORDER BY ident")?;

    let mut map = AttributeMap::new();
    let rows = stmt.query_and_then([], |row| -> Result<KnownAttribute> {
        let ident: String = row.get(1)?;
        let value_type: String = row.get(2)?;
        let cardinality: String = row.get(3)?;
        let unique: Option<String> = row.get(4)?;

        let mut builder = AttributeBuilder::default();
        builder.value_type(value_type_from_keyword(&value_type)?);
        builder.multival(cardinality_from_keyword(&cardinality)?);
        if let Some(ref u) = unique {
            match Unique::from_keyword(u) {
                Some(u) => { builder.unique(u); },
                None => return Err(DbError::BadSchemaAssertion(
                    format!("attribute {} has unrecognised db/unique {}", ident, u))),
            }
        }

        Ok(KnownAttribute::new(row.get(0)?, ident, builder.build()?, row.get(5)?))
    })?;

    for attribute in rows {
        let attribute = attribute?;
        map.insert(attribute.ident.clone(), attribute);
    }
    Ok(map)
}

/// Read every view definition visible in the current state.
pub fn read_view_map(conn: &rusqlite::Connection) -> Result<ViewMap> {
    let mut map = ViewMap::new();

    let mut stmt = conn.prepare("SELECT id, name, doc FROM views ORDER BY name")?;
    let rows = stmt.query_and_then([], |row| -> Result<(i64, String, Option<String>)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })?;

    let mut heads = vec![];
    for head in rows {
        heads.push(head?);
    }

    for (entity, name, doc) in heads {
        let required = view_attribute_idents(conn, entity, true)?;
        let optional = view_attribute_idents(conn, entity, false)?;
        map.insert(name.clone(), ViewDefinition {
            entity: entity,
            name: name,
            required: required,
            optional: optional,
            doc: doc,
        });
    }
    Ok(map)
}

fn view_attribute_idents(conn: &rusqlite::Connection, view: i64, required: bool) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT attribute FROM view_attributes \
         WHERE view_id = ? AND required = ? ORDER BY attribute")?;
    let rows = stmt.query_and_then(rusqlite::params![view, required], |row| -> Result<String> {
        Ok(row.get(0)?)
    })?;
    let mut idents = vec![];
    for ident in rows {
        idents.push(ident?);
    }
    Ok(idents)
}
