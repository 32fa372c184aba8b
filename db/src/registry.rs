// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The attribute registry.
//!
//! Declaring an attribute writes its definition datoms and, in the same
//! step, provisions the typed child relation that will store its datoms:
//! one table per attribute, pinned to its attribute id by a check
//! constraint, with a stored typed projection of `v_raw` and the standard
//! index complement. Reference-typed attributes additionally carry the
//! reverse index for "what points at X" traversals.

use rusqlite;

use palimpsest_core::{
    Attribute,
    Entid,
    Unique,
    ValueType,
    idents,
};

use codec;
use db;
use entids;
use errors::{
    DbError,
    Result,
};
use schema::{
    cardinality_from_keyword,
    unique_from_keyword,
    value_type_from_keyword,
};
use types::{
    KnownAttribute,
    Metadata,
};

/// The structural description of one attribute's child relation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelationSpec {
    pub table: String,
    pub attribute: Entid,
    pub value_type: ValueType,
}

impl RelationSpec {
    pub fn new(ident: &str, attribute: Entid, value_type: ValueType) -> RelationSpec {
        RelationSpec {
            table: idents::attr_table_name(ident),
            attribute: attribute,
            value_type: value_type,
        }
    }

    /// The DDL for the relation: the table itself, the append-only guard
    /// triggers, and the index complement.
    ///
    /// Mirroring table inheritance, the child repeats the parent columns
    /// `(e, a, v_raw, tx, retracted_by)` and adds the stored typed
    /// projection. The check constraint keeps the union unambiguous: a
    /// child stores only datoms of its own attribute.
    pub fn ddl(&self) -> Vec<String> {
        let t = &self.table;
        let mut statements = vec![];

        statements.push(format!(
            "CREATE TABLE \"{t}\" (\n    \
                 e INTEGER NOT NULL,\n    \
                 a INTEGER NOT NULL CHECK (a = {a}),\n    \
                 v_raw NOT NULL,\n    \
                 v_typed {typed} GENERATED ALWAYS AS (v_raw) STORED,\n    \
                 tx INTEGER NOT NULL,\n    \
                 retracted_by INTEGER,\n    \
                 PRIMARY KEY (e, a, v_raw, tx)\n\
             )",
            t = t,
            a = self.attribute,
            typed = codec::typed_column_type(self.value_type)));

        // The one permitted mutation of a datom is setting retracted_by,
        // once, to a strictly later transaction.
        statements.push(format!(
            "CREATE TRIGGER \"{t}_retract_only\" BEFORE UPDATE ON \"{t}\"\n\
             BEGIN\n    \
                 SELECT RAISE(ABORT, 'datoms are immutable except for retraction')\n    \
                 WHERE NEW.e IS NOT OLD.e OR NEW.a IS NOT OLD.a\n       \
                    OR NEW.v_raw IS NOT OLD.v_raw OR NEW.tx IS NOT OLD.tx\n       \
                    OR OLD.retracted_by IS NOT NULL\n       \
                    OR (NEW.retracted_by IS NOT NULL AND NEW.retracted_by <= OLD.tx);\n\
             END",
            t = t));
        statements.push(format!(
            "CREATE TRIGGER \"{t}_no_delete\" BEFORE DELETE ON \"{t}\"\n\
             BEGIN\n    \
                 SELECT RAISE(ABORT, 'datoms are never deleted');\n\
             END",
            t = t));

        // Partial indexes gate on current-state visibility so history does
        // not bloat the hot working set.
        statements.push(format!(
            "CREATE INDEX \"idx_{t}_value\" ON \"{t}\" (v_typed) WHERE retracted_by IS NULL",
            t = t));
        statements.push(format!(
            "CREATE INDEX \"idx_{t}_entity\" ON \"{t}\" (e) WHERE retracted_by IS NULL",
            t = t));
        if self.value_type == ValueType::Ref {
            statements.push(format!(
                "CREATE INDEX \"idx_{t}_reverse\" ON \"{t}\" (v_typed, e) WHERE retracted_by IS NULL",
                t = t));
        }
        // History scans fall back to transaction order.
        statements.push(format!(
            "CREATE INDEX \"idx_{t}_tx\" ON \"{t}\" (tx)",
            t = t));

        statements
    }
}

/// Execute the DDL for a relation spec.
pub fn create_attribute_relation(conn: &rusqlite::Connection, spec: &RelationSpec) -> Result<()> {
    for statement in spec.ddl() {
        conn.execute(&statement, [])?;
    }
    Ok(())
}

/// Insert one definition datom into a system child relation.
fn assert_system_datom(conn: &rusqlite::Connection,
                       table: &str,
                       e: Entid,
                       a: Entid,
                       v: &dyn rusqlite::types::ToSql,
                       tx: Entid)
                       -> Result<()> {
    conn.execute(
        &format!("INSERT INTO \"{}\" (e, a, v_raw, tx) VALUES (?, ?, ?, ?)", table),
        rusqlite::params![e, a, v, tx])?;
    Ok(())
}

/// Write the definition datoms for an attribute entity.
pub fn assert_attribute_definition(conn: &rusqlite::Connection,
                                   e: Entid,
                                   ident: &str,
                                   attribute: &Attribute,
                                   doc: Option<&str>,
                                   tx: Entid)
                                   -> Result<()> {
    assert_system_datom(conn, "attr_db_ident", e, entids::DB_IDENT, &ident, tx)?;
    assert_system_datom(conn, "attr_db_valuetype", e, entids::DB_VALUE_TYPE,
                        &entids::value_type_entid(attribute.value_type), tx)?;
    assert_system_datom(conn, "attr_db_cardinality", e, entids::DB_CARDINALITY,
                        &entids::cardinality_entid(attribute.multival), tx)?;
    if let Some(unique) = attribute.unique {
        assert_system_datom(conn, "attr_db_unique", e, entids::DB_UNIQUE,
                            &entids::unique_entid(unique), tx)?;
    }
    if let Some(doc) = doc {
        assert_system_datom(conn, "attr_db_doc", e, entids::DB_DOC, &doc, tx)?;
    }
    Ok(())
}

/// Declare a new attribute: validate, write its definition datoms, and
/// provision its child relation, all inside one savepoint.
///
/// Unknown enum keywords fail before any table is created. The parent
/// `datoms` view is regenerated to include the new member.
pub fn define_attribute(conn: &rusqlite::Connection,
                        metadata: &mut Metadata,
                        ident: &str,
                        value_type: &str,
                        cardinality: &str,
                        unique: Option<&str>,
                        doc: Option<&str>)
                        -> Result<Entid> {
    if !idents::is_valid_ident(ident) {
        return Err(DbError::BadIdent(ident.to_string()));
    }
    if metadata.attributes.contains_key(ident) {
        return Err(DbError::AttributeAlreadyDefined(ident.to_string()));
    }

    let value_type = value_type_from_keyword(value_type)?;
    let multival = cardinality_from_keyword(cardinality)?;
    let unique: Option<Unique> = match unique {
        Some(u) => Some(unique_from_keyword(u)?),
        None => None,
    };

    let mut attribute = Attribute::new(value_type, multival);
    attribute.unique = unique;

    conn.execute_batch("SAVEPOINT define_attribute")?;
    let defined = define_attribute_inner(conn, metadata, ident, attribute, doc);
    match defined {
        Ok(entid) => {
            conn.execute_batch("RELEASE define_attribute")?;
            Ok(entid)
        },
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK TO define_attribute; RELEASE define_attribute");
            Err(e)
        },
    }
}

fn define_attribute_inner(conn: &rusqlite::Connection,
                          metadata: &mut Metadata,
                          ident: &str,
                          attribute: Attribute,
                          doc: Option<&str>)
                          -> Result<Entid> {
    let entid = db::allocate_entity(conn, "db")?;
    let tx = db::new_transaction(conn)?;

    assert_attribute_definition(conn, entid, ident, &attribute, doc, tx)?;

    let spec = RelationSpec::new(ident, entid, attribute.value_type);
    create_attribute_relation(conn, &spec)?;

    metadata.attributes.insert(
        ident.to_string(),
        KnownAttribute::new(entid, ident.to_string(), attribute, doc.map(|d| d.to_string())));
    db::regenerate_datoms_view(conn, metadata)?;

    info!("defined attribute {} as {} in {}", ident, entid, spec.table);
    Ok(entid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::{
        ensure_initialized,
        new_connection,
    };

    fn open_seeded() -> (rusqlite::Connection, Metadata) {
        let conn = new_connection("").expect("connection");
        let metadata = ensure_initialized(&conn).expect("initialized");
        (conn, metadata)
    }

    fn table_names(conn: &rusqlite::Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .expect("prepare");
        let rows = stmt.query_map([], |row| row.get(0)).expect("rows");
        rows.collect::<rusqlite::Result<Vec<String>>>().expect("names")
    }

    #[test]
    fn test_define_attribute_provisions_relation() {
        let (conn, mut metadata) = open_seeded();
        let entid = define_attribute(&conn, &mut metadata, "person/name", "text", "one", None, None)
            .expect("defined");
        assert!(entid >= 300);
        assert!(table_names(&conn).contains(&"attr_person_name".to_string()));

        // The typed column and the check constraint are live.
        conn.execute("INSERT INTO attr_person_name (e, a, v_raw, tx) VALUES (?, ?, 'x', 0)",
                     rusqlite::params![1i64 << 48, entid])
            .expect("insert");
        let typed: String = conn
            .query_row("SELECT v_typed FROM attr_person_name", [], |row| row.get(0))
            .expect("typed");
        assert_eq!(typed, "x");
        assert!(conn
            .execute("INSERT INTO attr_person_name (e, a, v_raw, tx) VALUES (2, 1, 'x', 0)", [])
            .is_err());
    }

    #[test]
    fn test_define_attribute_indexes() {
        let (conn, mut metadata) = open_seeded();
        define_attribute(&conn, &mut metadata, "person/friend", "ref", "many", None, None)
            .expect("defined");
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'attr_person_friend' ORDER BY name")
            .expect("prepare");
        let rows = stmt.query_map([], |row| row.get(0)).expect("rows");
        let names = rows.collect::<rusqlite::Result<Vec<String>>>().expect("names");
        assert!(names.contains(&"idx_attr_person_friend_value".to_string()));
        assert!(names.contains(&"idx_attr_person_friend_entity".to_string()));
        assert!(names.contains(&"idx_attr_person_friend_reverse".to_string()));
        assert!(names.contains(&"idx_attr_person_friend_tx".to_string()));
    }

    #[test]
    fn test_define_attribute_rejects_unknown_enums() {
        let (conn, mut metadata) = open_seeded();
        match define_attribute(&conn, &mut metadata, "person/name", "varchar", "one", None, None) {
            Err(DbError::UnknownValueType(_)) => {},
            x => panic!("expected UnknownValueType, got {:?}", x),
        }
        match define_attribute(&conn, &mut metadata, "person/name", "text", "several", None, None) {
            Err(DbError::UnknownCardinality(_)) => {},
            x => panic!("expected UnknownCardinality, got {:?}", x),
        }
        // Nothing was created on the failing paths.
        assert!(!table_names(&conn).contains(&"attr_person_name".to_string()));
    }

    #[test]
    fn test_datoms_are_immutable() {
        let (conn, mut metadata) = open_seeded();
        define_attribute(&conn, &mut metadata, "person/name", "text", "one", None, None)
            .expect("defined");
        conn.execute("INSERT INTO attr_person_name (e, a, v_raw, tx) \
                      SELECT (2 << 48) | 1, e, 'x', 0 FROM attr_db_ident WHERE v_typed = 'person/name'",
                     [])
            .expect("insert");

        // Retraction by a later transaction is permitted, once.
        conn.execute("UPDATE attr_person_name SET retracted_by = 5 WHERE retracted_by IS NULL", [])
            .expect("retract");
        assert!(conn
            .execute("UPDATE attr_person_name SET retracted_by = 6", [])
            .is_err());
        assert!(conn.execute("DELETE FROM attr_person_name", []).is_err());
    }

    #[test]
    fn test_retraction_must_be_later() {
        let (conn, mut metadata) = open_seeded();
        define_attribute(&conn, &mut metadata, "person/name", "text", "one", None, None)
            .expect("defined");
        conn.execute("INSERT INTO attr_person_name (e, a, v_raw, tx) \
                      SELECT (2 << 48) | 1, e, 'x', 7 FROM attr_db_ident WHERE v_typed = 'person/name'",
                     [])
            .expect("insert");
        assert!(conn
            .execute("UPDATE attr_person_name SET retracted_by = 7", [])
            .is_err());
    }
}
