// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The view compiler.
//!
//! A stored view definition names a set of required attributes and a set of
//! optional ones. From it the compiler synthesises three SQL views:
//!
//! - `V_current`: current state only, filtered on `retracted_by IS NULL`;
//! - `V_history`: the same shape with every visibility test replaced by the
//!   as-of predicate;
//! - `V`: a dispatcher that unions the two behind mutually exclusive
//!   filters on the as-of configuration row, so the planner prunes the
//!   branch that cannot produce rows.
//!
//! The join chain is anchored on the first required attribute (idents are
//! kept sorted, so "first" is deterministic); remaining required attributes
//! join with inner semantics and optional ones with left semantics.
//! Cardinality-many attributes fold their visible datoms into a JSON array
//! through a correlated aggregate instead of joining.
//!
//! INSTEAD-OF triggers generated by the DML translator are attached to both
//! `V` and `V_current`.

use rusqlite;

use itertools::Itertools;

use palimpsest_core::{
    Entid,
    ValueType,
    idents,
};
use palimpsest_sql::{
    QueryBuilder,
    SQLiteQueryBuilder,
};

use db;
use dml;
use entids;
use errors::{
    DbError,
    Result,
};
use types::{
    Metadata,
    ViewDefinition,
};
use visibility;

/// Which visibility test a generated view applies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VisibilityPredicate {
    Current,
    AsOf,
}

impl VisibilityPredicate {
    fn aliased(&self, alias: &str) -> String {
        match *self {
            VisibilityPredicate::Current => visibility::current_sql(Some(alias)),
            VisibilityPredicate::AsOf => visibility::visible_sql(Some(alias)),
        }
    }

    fn bare(&self) -> String {
        match *self {
            VisibilityPredicate::Current => visibility::current_sql(None),
            VisibilityPredicate::AsOf => visibility::visible_sql(None),
        }
    }
}

/// One attribute's place in a compiled view.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BoundAttribute {
    pub ident: String,
    pub column: String,
    pub table: String,
    pub entid: Entid,
    pub value_type: ValueType,
    pub multival: bool,
}

/// The join shape of a view: the anchor drives the plan and supplies the
/// entity id column; `inner` are the remaining required attributes and
/// `left` the optional ones.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JoinChain {
    pub anchor: BoundAttribute,
    pub inner: Vec<BoundAttribute>,
    pub left: Vec<BoundAttribute>,
}

fn bind(metadata: &Metadata, ident: &str) -> Result<BoundAttribute> {
    let known = metadata.require_attribute(ident)?;
    Ok(BoundAttribute {
        ident: known.ident.clone(),
        column: idents::column_name(&known.ident),
        table: known.table.clone(),
        entid: known.entid,
        value_type: known.attribute.value_type,
        multival: known.attribute.multival,
    })
}

impl JoinChain {
    /// Resolve a definition against the known attributes. Returns `None`
    /// when the definition has no required attributes and therefore no
    /// plan.
    pub fn plan(metadata: &Metadata, definition: &ViewDefinition) -> Result<Option<JoinChain>> {
        let mut required = definition.required.clone();
        required.sort();
        let mut optional = definition.optional.clone();
        optional.sort();

        let mut required = required.iter();
        let anchor = match required.next() {
            Some(ident) => bind(metadata, ident)?,
            None => return Ok(None),
        };
        let inner = required.map(|i| bind(metadata, i)).collect::<Result<Vec<_>>>()?;
        let left = optional.iter().map(|i| bind(metadata, i)).collect::<Result<Vec<_>>>()?;
        let chain = JoinChain { anchor: anchor, inner: inner, left: left };

        let mut columns: Vec<&str> = chain.attributes().into_iter().map(|b| b.column.as_str()).collect();
        columns.sort();
        columns.dedup();
        if columns.len() != 1 + chain.inner.len() + chain.left.len() {
            return Err(DbError::BadSchemaAssertion(
                format!("view {} projects two attributes onto the same column name",
                        definition.name)));
        }
        Ok(Some(chain))
    }

    /// Every bound attribute, in projection order.
    pub fn attributes(&self) -> Vec<&BoundAttribute> {
        let mut attributes = vec![&self.anchor];
        attributes.extend(self.inner.iter());
        attributes.extend(self.left.iter());
        attributes
    }

    /// The column names of the generated views, in projection order,
    /// starting with the entity id.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec!["id".to_string()];
        names.extend(self.attributes().into_iter().map(|b| b.column.clone()));
        names
    }
}

/// The correlated aggregate folding a many-valued attribute into an array.
fn fold_sql(bound: &BoundAttribute, visibility: VisibilityPredicate) -> String {
    format!("(SELECT json_group_array(m.v_typed) FROM \"{table}\" AS m \
             WHERE m.e = d0.e AND {vis}) AS \"{column}\"",
            table = bound.table,
            vis = visibility.aliased("m"),
            column = bound.column)
}

/// The SELECT shared by `V_current` and `V_history`; only the visibility
/// predicate differs.
fn projection_sql(chain: &JoinChain, visibility: VisibilityPredicate) -> String {
    let mut select_items = vec!["d0.e AS id".to_string()];
    let mut joins: Vec<String> = vec![];
    let mut outer_where: Option<String> = None;

    let from = if chain.anchor.multival {
        select_items.push(fold_sql(&chain.anchor, visibility));
        format!("(SELECT DISTINCT e FROM \"{}\" WHERE {}) AS d0",
                chain.anchor.table, visibility.bare())
    } else {
        select_items.push(format!("d0.v_typed AS \"{}\"", chain.anchor.column));
        outer_where = Some(visibility.aliased("d0"));
        format!("\"{}\" AS d0", chain.anchor.table)
    };

    let mut next_alias = 1;
    for bound in &chain.inner {
        if bound.multival {
            let alias = format!("d{}", next_alias);
            next_alias += 1;
            joins.push(format!("JOIN (SELECT DISTINCT e FROM \"{}\" WHERE {}) AS {alias} \
                                ON {alias}.e = d0.e",
                               bound.table, visibility.bare(), alias = alias));
            select_items.push(fold_sql(bound, visibility));
        } else {
            let alias = format!("d{}", next_alias);
            next_alias += 1;
            joins.push(format!("JOIN \"{}\" AS {alias} ON {alias}.e = d0.e AND {vis}",
                               bound.table,
                               alias = alias,
                               vis = visibility.aliased(&alias)));
            select_items.push(format!("{}.v_typed AS \"{}\"", alias, bound.column));
        }
    }

    for bound in &chain.left {
        if bound.multival {
            // No join: the fold is total, an entity without datoms gets [].
            select_items.push(fold_sql(bound, visibility));
        } else {
            let alias = format!("d{}", next_alias);
            next_alias += 1;
            joins.push(format!("LEFT JOIN \"{}\" AS {alias} ON {alias}.e = d0.e AND {vis}",
                               bound.table,
                               alias = alias,
                               vis = visibility.aliased(&alias)));
            select_items.push(format!("{}.v_typed AS \"{}\"", alias, bound.column));
        }
    }

    let mut builder = SQLiteQueryBuilder::new();
    builder.push_sql("SELECT ");
    builder.push_sql(&select_items.iter().join(", "));
    builder.push_sql(" FROM ");
    builder.push_sql(&from);
    for join in &joins {
        builder.push_sql(" ");
        builder.push_sql(join);
    }
    if let Some(w) = outer_where {
        builder.push_sql(" WHERE ");
        builder.push_sql(&w);
    }
    builder.finish().sql
}

/// The three CREATE VIEW statements for a view named `name`.
pub fn view_ddl(name: &str, chain: &JoinChain) -> Vec<String> {
    let columns = chain.column_names()
        .into_iter()
        .map(|c| format!("\"{}\"", c))
        .join(", ");

    vec![
        format!("CREATE VIEW \"{name}_current\" AS {body}",
                name = name,
                body = projection_sql(chain, VisibilityPredicate::Current)),
        format!("CREATE VIEW \"{name}_history\" AS {body}",
                name = name,
                body = projection_sql(chain, VisibilityPredicate::AsOf)),
        format!("CREATE VIEW \"{name}\" AS \
                 SELECT {columns} FROM \"{name}_current\" WHERE {current} \
                 UNION ALL \
                 SELECT {columns} FROM \"{name}_history\" WHERE {history}",
                name = name,
                columns = columns,
                current = visibility::dispatch_current_sql(),
                history = visibility::dispatch_history_sql()),
    ]
}

/// Drop the generated artifacts of a view. Triggers go down with their
/// views.
pub fn drop_generated(conn: &rusqlite::Connection, name: &str) -> Result<()> {
    for suffix in &["", "_current", "_history"] {
        conn.execute(&format!("DROP VIEW IF EXISTS \"{}{}\"", name, suffix), [])?;
    }
    Ok(())
}

/// Recompile one view from its definition: drop the prior artifacts and
/// re-emit views and triggers. A definition without required attributes
/// has no plan; regeneration is skipped with a notice.
pub fn regenerate_view(conn: &rusqlite::Connection,
                       metadata: &Metadata,
                       definition: &ViewDefinition)
                       -> Result<()> {
    drop_generated(conn, &definition.name)?;

    let chain = match JoinChain::plan(metadata, definition)? {
        Some(chain) => chain,
        None => {
            warn!("view {} has no required attributes; skipping regeneration",
                  definition.name);
            return Ok(());
        },
    };

    for statement in view_ddl(&definition.name, &chain) {
        conn.execute(&statement, [])?;
    }
    let current_target = format!("{}_current", definition.name);
    for target in &[definition.name.as_str(), current_target.as_str()] {
        for statement in dml::trigger_ddl(&definition.name, target, &chain) {
            conn.execute(&statement, [])?;
        }
    }
    info!("regenerated view {}", definition.name);
    Ok(())
}

/// A partial update of a view definition. `None` fields keep their current
/// value; `doc: Some(None)` retracts the doc.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ViewUpdate {
    pub name: Option<String>,
    pub required: Option<Vec<String>>,
    pub optional: Option<Vec<String>>,
    pub doc: Option<Option<String>>,
}

fn retract_current_datoms(conn: &rusqlite::Connection,
                          table: &str,
                          entity: Entid,
                          tx: Entid)
                          -> Result<()> {
    conn.execute(
        &format!("UPDATE \"{}\" SET retracted_by = ? WHERE e = ? AND retracted_by IS NULL", table),
        rusqlite::params![tx, entity])?;
    Ok(())
}

fn assert_view_datom(conn: &rusqlite::Connection,
                     table: &str,
                     entity: Entid,
                     a: Entid,
                     v: &dyn rusqlite::types::ToSql,
                     tx: Entid)
                     -> Result<()> {
    conn.execute(
        &format!("INSERT INTO \"{}\" (e, a, v_raw, tx) VALUES (?, ?, ?, ?)", table),
        rusqlite::params![entity, a, v, tx])?;
    Ok(())
}

fn assert_attribute_refs(conn: &rusqlite::Connection,
                         table: &str,
                         a: Entid,
                         entity: Entid,
                         metadata: &Metadata,
                         attribute_idents: &[String],
                         tx: Entid)
                         -> Result<()> {
    for ident in attribute_idents {
        let referenced = metadata.require_attribute(ident)?.entid;
        assert_view_datom(conn, table, entity, a, &referenced, tx)?;
    }
    Ok(())
}

fn in_savepoint<F>(conn: &rusqlite::Connection, name: &str, f: F) -> Result<()>
    where F: FnOnce() -> Result<()> {
    conn.execute_batch(&format!("SAVEPOINT {}", name))?;
    match f() {
        Ok(()) => {
            conn.execute_batch(&format!("RELEASE {}", name))?;
            Ok(())
        },
        Err(e) => {
            let _ = conn.execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", name));
            Err(e)
        },
    }
}

fn validated_attribute_list(metadata: &Metadata, idents: &[String]) -> Result<Vec<String>> {
    let mut sorted = idents.to_vec();
    sorted.sort();
    sorted.dedup();
    for ident in &sorted {
        metadata.require_attribute(ident)?;
    }
    Ok(sorted)
}

/// Declare a view. Fails fatally when `required` is empty; a view with no
/// required attributes would compile to an empty plan.
pub fn define_view(conn: &rusqlite::Connection,
                   metadata: &mut Metadata,
                   name: &str,
                   required: &[String],
                   optional: &[String],
                   doc: Option<&str>)
                   -> Result<Entid> {
    if !idents::is_valid_view_name(name) {
        return Err(DbError::BadViewName(name.to_string()));
    }
    if metadata.views.contains_key(name) {
        return Err(DbError::BadSchemaAssertion(format!("view already defined: {}", name)));
    }
    if required.is_empty() {
        return Err(DbError::ViewHasNoRequiredAttributes(name.to_string()));
    }
    let required = validated_attribute_list(metadata, required)?;
    let optional = validated_attribute_list(metadata, optional)?;

    let mut allocated = 0;
    {
        let metadata = &mut *metadata;
        in_savepoint(conn, "define_view", || {
            let entity = db::allocate_entity(conn, "db")?;
            let tx = db::new_transaction(conn)?;

            assert_view_datom(conn, "attr_db_view_ident", entity, entids::DB_VIEW_IDENT, &name, tx)?;
            assert_attribute_refs(conn, "attr_db_view_attributes", entids::DB_VIEW_ATTRIBUTES,
                                  entity, metadata, &required, tx)?;
            assert_attribute_refs(conn, "attr_db_view_optional_attributes",
                                  entids::DB_VIEW_OPTIONAL_ATTRIBUTES,
                                  entity, metadata, &optional, tx)?;
            if let Some(doc) = doc {
                assert_view_datom(conn, "attr_db_view_doc", entity, entids::DB_VIEW_DOC, &doc, tx)?;
            }

            let definition = ViewDefinition {
                entity: entity,
                name: name.to_string(),
                required: required.clone(),
                optional: optional.clone(),
                doc: doc.map(|d| d.to_string()),
            };
            regenerate_view(conn, metadata, &definition)?;
            metadata.views.insert(name.to_string(), definition);
            allocated = entity;
            Ok(())
        })?;
    }
    Ok(allocated)
}

/// Apply a partial update to a view definition, retracting superseded
/// facts and asserting the new ones, then recompile. An update that leaves
/// no required attributes keeps the definition but skips regeneration with
/// a notice.
pub fn update_view(conn: &rusqlite::Connection,
                   metadata: &mut Metadata,
                   name: &str,
                   update: ViewUpdate)
                   -> Result<()> {
    let old = match metadata.views.get(name) {
        Some(definition) => definition.clone(),
        None => return Err(DbError::UnknownView(name.to_string())),
    };

    let new_name = update.name.clone().unwrap_or_else(|| old.name.clone());
    if !idents::is_valid_view_name(&new_name) {
        return Err(DbError::BadViewName(new_name));
    }
    if new_name != old.name && metadata.views.contains_key(&new_name) {
        return Err(DbError::BadSchemaAssertion(format!("view already defined: {}", new_name)));
    }
    let required = match update.required {
        Some(ref r) => validated_attribute_list(metadata, r)?,
        None => old.required.clone(),
    };
    let optional = match update.optional {
        Some(ref o) => validated_attribute_list(metadata, o)?,
        None => old.optional.clone(),
    };
    let doc = match update.doc {
        Some(ref d) => d.clone(),
        None => old.doc.clone(),
    };

    in_savepoint(conn, "update_view", || {
        let tx = db::new_transaction(conn)?;

        if new_name != old.name {
            retract_current_datoms(conn, "attr_db_view_ident", old.entity, tx)?;
            assert_view_datom(conn, "attr_db_view_ident", old.entity,
                              entids::DB_VIEW_IDENT, &new_name, tx)?;
        }
        if required != old.required {
            retract_current_datoms(conn, "attr_db_view_attributes", old.entity, tx)?;
            assert_attribute_refs(conn, "attr_db_view_attributes", entids::DB_VIEW_ATTRIBUTES,
                                  old.entity, metadata, &required, tx)?;
        }
        if optional != old.optional {
            retract_current_datoms(conn, "attr_db_view_optional_attributes", old.entity, tx)?;
            assert_attribute_refs(conn, "attr_db_view_optional_attributes",
                                  entids::DB_VIEW_OPTIONAL_ATTRIBUTES,
                                  old.entity, metadata, &optional, tx)?;
        }
        if doc != old.doc {
            retract_current_datoms(conn, "attr_db_view_doc", old.entity, tx)?;
            if let Some(ref doc) = doc {
                assert_view_datom(conn, "attr_db_view_doc", old.entity,
                                  entids::DB_VIEW_DOC, doc, tx)?;
            }
        }

        if new_name != old.name {
            drop_generated(conn, &old.name)?;
        }
        let definition = ViewDefinition {
            entity: old.entity,
            name: new_name.clone(),
            required: required.clone(),
            optional: optional.clone(),
            doc: doc.clone(),
        };
        regenerate_view(conn, metadata, &definition)?;
        metadata.views.remove(&old.name);
        metadata.views.insert(new_name.clone(), definition);
        Ok(())
    })
}

/// Retract a view definition and drop its generated artifacts. The
/// definition datoms stay queryable as history.
pub fn delete_view(conn: &rusqlite::Connection, metadata: &mut Metadata, name: &str) -> Result<()> {
    let old = match metadata.views.get(name) {
        Some(definition) => definition.clone(),
        None => return Err(DbError::UnknownView(name.to_string())),
    };

    in_savepoint(conn, "delete_view", || {
        let tx = db::new_transaction(conn)?;
        for table in &["attr_db_view_ident",
                       "attr_db_view_attributes",
                       "attr_db_view_optional_attributes",
                       "attr_db_view_doc"] {
            retract_current_datoms(conn, table, old.entity, tx)?;
        }
        drop_generated(conn, &old.name)?;
        metadata.views.remove(&old.name);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry::define_attribute;

    fn open_with_person_schema() -> (rusqlite::Connection, Metadata) {
        let conn = db::new_connection("").expect("connection");
        let mut metadata = db::ensure_initialized(&conn).expect("initialized");
        define_attribute(&conn, &mut metadata, "person/name", "text", "one", None, None)
            .expect("person/name");
        define_attribute(&conn, &mut metadata, "person/email", "text", "one",
                         Some("identity"), None)
            .expect("person/email");
        define_attribute(&conn, &mut metadata, "person/tag", "text", "many", None, None)
            .expect("person/tag");
        (conn, metadata)
    }

    fn generated_sql(conn: &rusqlite::Connection, name: &str) -> Vec<(String, String)> {
        let mut stmt = conn
            .prepare("SELECT name, sql FROM sqlite_master \
                      WHERE type IN ('view', 'trigger') AND (name = ?1 OR name GLOB ?1 || '_*') \
                      ORDER BY name")
            .expect("prepare");
        let rows = stmt
            .query_map([name], |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("rows");
        rows.collect::<rusqlite::Result<Vec<(String, String)>>>().expect("sql")
    }

    #[test]
    fn test_define_view_creates_three_views_and_triggers() {
        let (conn, mut metadata) = open_with_person_schema();
        define_view(&conn, &mut metadata, "persons",
                    &["person/name".to_string(), "person/email".to_string()], &[], None)
            .expect("view");

        let names: Vec<String> = generated_sql(&conn, "persons").into_iter().map(|x| x.0).collect();
        assert!(names.contains(&"persons".to_string()));
        assert!(names.contains(&"persons_current".to_string()));
        assert!(names.contains(&"persons_history".to_string()));
        for trigger in &["persons_insert", "persons_update", "persons_delete",
                         "persons_current_insert", "persons_current_update",
                         "persons_current_delete"] {
            assert!(names.contains(&trigger.to_string()), "missing {}", trigger);
        }
    }

    #[test]
    fn test_regeneration_is_idempotent() {
        let (conn, mut metadata) = open_with_person_schema();
        define_view(&conn, &mut metadata, "persons",
                    &["person/name".to_string()], &["person/tag".to_string()], None)
            .expect("view");
        let before = generated_sql(&conn, "persons");
        let definition = metadata.views["persons"].clone();
        regenerate_view(&conn, &metadata, &definition).expect("regenerated");
        let after = generated_sql(&conn, "persons");
        assert_eq!(before, after);
    }

    #[test]
    fn test_unknown_attribute_fails() {
        let (conn, mut metadata) = open_with_person_schema();
        match define_view(&conn, &mut metadata, "persons",
                          &["person/name".to_string(), "person/shoe".to_string()], &[], None) {
            Err(DbError::UnknownAttribute(ref a)) => assert_eq!(a, "person/shoe"),
            x => panic!("expected UnknownAttribute, got {:?}", x),
        }
        // The failed definition left nothing behind.
        assert!(generated_sql(&conn, "persons").is_empty());
        assert!(metadata.views.get("persons").is_none());
    }

    #[test]
    fn test_define_view_requires_required_attributes() {
        let (conn, mut metadata) = open_with_person_schema();
        match define_view(&conn, &mut metadata, "persons", &[], &["person/tag".to_string()], None) {
            Err(DbError::ViewHasNoRequiredAttributes(_)) => {},
            x => panic!("expected ViewHasNoRequiredAttributes, got {:?}", x),
        }
    }

    #[test]
    fn test_update_view_renames_generated_artifacts() {
        let (conn, mut metadata) = open_with_person_schema();
        define_view(&conn, &mut metadata, "persons", &["person/name".to_string()], &[], None)
            .expect("view");
        update_view(&conn, &mut metadata, "persons", ViewUpdate {
            name: Some("people".to_string()),
            ..Default::default()
        }).expect("renamed");

        assert!(generated_sql(&conn, "persons").is_empty());
        assert!(!generated_sql(&conn, "people").is_empty());
        assert!(metadata.views.contains_key("people"));
        assert!(!metadata.views.contains_key("persons"));
    }

    #[test]
    fn test_delete_view_drops_artifacts_but_keeps_history() {
        let (conn, mut metadata) = open_with_person_schema();
        define_view(&conn, &mut metadata, "persons", &["person/name".to_string()], &[], None)
            .expect("view");
        delete_view(&conn, &mut metadata, "persons").expect("deleted");

        assert!(generated_sql(&conn, "persons").is_empty());
        let historical: i64 = conn
            .query_row("SELECT COUNT(*) FROM attr_db_view_ident WHERE v_typed = 'persons' \
                        AND retracted_by IS NOT NULL",
                       [], |row| row.get(0))
            .expect("count");
        assert_eq!(historical, 1);
    }
}
