// Copyright 2016 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Seeds a fresh store so that it describes itself.
//!
//! Fixed ids in the `db` partition: the system attributes at 1..13, the
//! value-type enum entities at 100..112, cardinality at 200..201 and
//! uniqueness at 210..211. Every system datom is written with transaction
//! 0. After seeding, the `db` partition counter stands at 300, so the
//! first declared attribute is entity 300.

use rusqlite;

use palimpsest_core::{
    Attribute,
    Entid,
    Unique,
    ValueType,
};

use db;
use entids;
use errors::Result;
use metadata;
use registry::{
    RelationSpec,
    assert_attribute_definition,
    create_attribute_relation,
};
use types::Metadata;

pub use entids::TX0;

/// One system attribute: entid, ident, type, multival, unique, doc.
type SystemAttribute = (Entid, &'static str, ValueType, bool, Option<Unique>, &'static str);

lazy_static! {
    static ref SYSTEM_ATTRIBUTES: Vec<SystemAttribute> = {
        vec![
            (entids::DB_IDENT, "db/ident", ValueType::Text, false, Some(Unique::Identity),
             "unique programmatic name of an entity"),
            (entids::DB_VALUE_TYPE, "db/valueType", ValueType::Ref, false, None,
             "logical type of an attribute's values"),
            (entids::DB_CARDINALITY, "db/cardinality", ValueType::Ref, false, None,
             "whether an attribute holds one value or a set"),
            (entids::DB_UNIQUE, "db/unique", ValueType::Ref, false, None,
             "declared uniqueness of an attribute's values"),
            (entids::DB_DOC, "db/doc", ValueType::Text, false, None,
             "documentation string of an entity"),
            (entids::DB_VIEW_IDENT, "db.view/ident", ValueType::Text, false, Some(Unique::Identity),
             "table-shaped name of a derived view"),
            (entids::DB_VIEW_ATTRIBUTES, "db.view/attributes", ValueType::Ref, true,
             None, "attributes a view row must possess"),
            (entids::DB_VIEW_DOC, "db.view/doc", ValueType::Text, false, None,
             "documentation string of a view"),
            (entids::DB_VIEW_OPTIONAL_ATTRIBUTES, "db.view/optional-attributes", ValueType::Ref, true,
             None, "attributes a view row may possess"),
        ]
    };
}

/// The idents of the enum entities: value types, cardinalities, uniqueness.
fn enum_entities() -> Vec<(Entid, String)> {
    let mut entities = vec![];
    for vt in ValueType::all() {
        entities.push((entids::value_type_entid(*vt), vt.ident()));
    }
    entities.push((entids::DB_CARDINALITY_ONE, "db.cardinality/one".to_string()));
    entities.push((entids::DB_CARDINALITY_MANY, "db.cardinality/many".to_string()));
    entities.push((entids::DB_UNIQUE_IDENTITY, Unique::Identity.ident()));
    entities.push((entids::DB_UNIQUE_VALUE, Unique::Value.ident()));
    entities
}

/// Seed an empty store. The caller provides the transaction envelope.
pub fn bootstrap(conn: &rusqlite::Connection) -> Result<()> {
    // The three system partitions. The db counter lands at 300 so that the
    // fixed id blocks above stay clear of allocation.
    conn.execute_batch("
        INSERT INTO partitions (id, ident, next_id) VALUES (0, 'db', 300);
        INSERT INTO partitions (id, ident, next_id) VALUES (1, 'tx', 1);
        INSERT INTO partitions (id, ident, next_id) VALUES (2, 'user', 1);
        INSERT INTO transactions (id, instant) VALUES (0, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'));
        INSERT INTO as_of_tx (tx) VALUES (NULL);
    ")?;

    // Child relations for the system attributes come first: the definition
    // datoms live in them.
    for &(entid, ident, value_type, _, _, _) in SYSTEM_ATTRIBUTES.iter() {
        let spec = RelationSpec::new(ident, entid, value_type);
        create_attribute_relation(conn, &spec)?;
    }

    for &(entid, ident, value_type, multival, unique, doc) in SYSTEM_ATTRIBUTES.iter() {
        let mut attribute = Attribute::new(value_type, multival);
        attribute.unique = unique;
        assert_attribute_definition(conn, entid, ident, &attribute, Some(doc), TX0)?;
    }

    for (entid, ident) in enum_entities() {
        conn.execute(
            "INSERT INTO attr_db_ident (e, a, v_raw, tx) VALUES (?, ?, ?, ?)",
            rusqlite::params![entid, entids::DB_IDENT, ident, TX0])?;
    }

    let metadata = Metadata {
        attributes: metadata_from_system_attributes(),
        views: Default::default(),
    };
    db::regenerate_datoms_view(conn, &metadata)?;
    create_introspection_views(conn)?;
    Ok(())
}

fn metadata_from_system_attributes() -> ::types::AttributeMap {
    let mut map = ::types::AttributeMap::new();
    for &(entid, ident, value_type, multival, unique, doc) in SYSTEM_ATTRIBUTES.iter() {
        let mut attribute = Attribute::new(value_type, multival);
        attribute.unique = unique;
        map.insert(ident.to_string(),
                   ::types::KnownAttribute::new(entid, ident.to_string(), attribute,
                                                Some(doc.to_string())));
    }
    map
}

/// The fixed introspection views over the schema datoms. Everything else
/// in the system (metadata materialisation included) reads the store
/// through these.
fn create_introspection_views(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute_batch("
        CREATE VIEW attributes AS
        SELECT i.e AS id,
               i.v_typed AS ident,
               (SELECT ti.v_typed FROM attr_db_ident ti
                 WHERE ti.e = vt.v_typed AND ti.retracted_by IS NULL) AS value_type,
               (SELECT ci.v_typed FROM attr_db_ident ci
                 WHERE ci.e = c.v_typed AND ci.retracted_by IS NULL) AS cardinality,
               (SELECT ui.v_typed FROM attr_db_ident ui
                 WHERE ui.e = u.v_typed AND ui.retracted_by IS NULL) AS \"unique\",
               d.v_typed AS doc
        FROM attr_db_ident i
        JOIN attr_db_valuetype vt ON vt.e = i.e AND vt.retracted_by IS NULL
        JOIN attr_db_cardinality c ON c.e = i.e AND c.retracted_by IS NULL
        LEFT JOIN attr_db_unique u ON u.e = i.e AND u.retracted_by IS NULL
        LEFT JOIN attr_db_doc d ON d.e = i.e AND d.retracted_by IS NULL
        WHERE i.retracted_by IS NULL;

        CREATE VIEW views AS
        SELECT n.e AS id,
               n.v_typed AS name,
               d.v_typed AS doc
        FROM attr_db_view_ident n
        LEFT JOIN attr_db_view_doc d ON d.e = n.e AND d.retracted_by IS NULL
        WHERE n.retracted_by IS NULL;

        CREATE VIEW view_attributes AS
        SELECT n.e AS view_id,
               n.v_typed AS view_name,
               r.v_typed AS attribute_id,
               (SELECT ai.v_typed FROM attr_db_ident ai
                 WHERE ai.e = r.v_typed AND ai.retracted_by IS NULL) AS attribute,
               1 AS required
        FROM attr_db_view_ident n
        JOIN attr_db_view_attributes r ON r.e = n.e AND r.retracted_by IS NULL
        WHERE n.retracted_by IS NULL
        UNION ALL
        SELECT n.e AS view_id,
               n.v_typed AS view_name,
               o.v_typed AS attribute_id,
               (SELECT ai.v_typed FROM attr_db_ident ai
                 WHERE ai.e = o.v_typed AND ai.retracted_by IS NULL) AS attribute,
               0 AS required
        FROM attr_db_view_ident n
        JOIN attr_db_view_optional_attributes o ON o.e = n.e AND o.retracted_by IS NULL
        WHERE n.retracted_by IS NULL;

        CREATE VIEW defined_attributes AS
        SELECT ident,
               substr(value_type, 9) AS value_type,
               substr(cardinality, 16) AS cardinality,
               substr(\"unique\", 11) AS \"unique\",
               doc
        FROM attributes;

        CREATE VIEW defined_views AS
        SELECT v.name AS name,
               (SELECT json_group_array(attribute) FROM
                 (SELECT attribute FROM view_attributes va
                   WHERE va.view_id = v.id AND va.required = 1 ORDER BY va.attribute))
                 AS required_attributes,
               (SELECT json_group_array(attribute) FROM
                 (SELECT attribute FROM view_attributes va
                   WHERE va.view_id = v.id AND va.required = 0 ORDER BY va.attribute))
                 AS optional_attributes,
               v.doc AS doc
        FROM views v;
    ")?;
    Ok(())
}
