// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The DML translator.
//!
//! Row operations against a generated view are rewritten into datom
//! operations by INSTEAD-OF triggers. SQLite trigger bodies are plain SQL,
//! so the translator is a code generator: for each view it emits three
//! trigger programs whose statements allocate ids by reading the partition
//! counters with scalar subqueries, write datoms into the attribute child
//! relations, and bump the counters as their final step. The programs run
//! once per affected row.
//!
//! Value comparison on update uses `IS NOT`, which treats NULL like a
//! value, and compares the coerced canonical form against the stored one,
//! so an update that does not change a value writes no datom.
//!
//! Many-valued columns travel as JSON arrays: an insert or update unfolds
//! the array with `json_each`, one datom per element.

use palimpsest_core::ValueType;

use codec;
use views::{
    BoundAttribute,
    JoinChain,
};

const ALLOCATE_ENTITY: &'static str =
    "(SELECT (id << 48) | next_id FROM partitions WHERE ident = 'user')";
const ALLOCATE_TX: &'static str =
    "(SELECT (id << 48) | next_id FROM partitions WHERE ident = 'tx')";

fn record_transaction() -> String {
    format!("    INSERT INTO transactions (id, instant)\n    \
             VALUES ({tx}, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'));",
            tx = ALLOCATE_TX)
}

fn bump_partition(partition: &str) -> String {
    format!("    UPDATE partitions SET next_id = next_id + 1 WHERE ident = '{}';", partition)
}

fn new_column(bound: &BoundAttribute) -> String {
    format!("NEW.\"{}\"", bound.column)
}

fn old_column(bound: &BoundAttribute) -> String {
    format!("OLD.\"{}\"", bound.column)
}

fn coerce_new(view: &str, bound: &BoundAttribute) -> String {
    codec::coercion_expr(bound.value_type,
                         &new_column(bound),
                         &format!("{}.{}", view, bound.column))
}

/// The `json_valid` guard preceding any statement that unfolds a
/// many-valued column.
fn array_guard(view: &str, bound: &BoundAttribute) -> String {
    format!("    SELECT RAISE(ABORT, 'value coercion: {view}.{column}: expected jsonb array')\n    \
             WHERE {new} IS NOT NULL AND NOT json_valid({new});",
            view = view,
            column = bound.column,
            new = new_column(bound))
}

/// `json_each` over the incoming array, or over nothing when the column is
/// NULL.
fn array_source(bound: &BoundAttribute) -> String {
    format!("json_each(CASE WHEN {new} IS NULL THEN '[]' ELSE {new} END) AS j",
            new = new_column(bound))
}

fn insert_stanza(view: &str, bound: &BoundAttribute, entity: &str) -> String {
    if bound.multival {
        let element = codec::coercion_expr(bound.value_type, "j.value",
                                           &format!("{}.{}", view, bound.column));
        format!("{guard}\n    \
                 INSERT INTO \"{table}\" (e, a, v_raw, tx)\n    \
                 SELECT {entity}, {attribute}, {element}, {tx}\n    \
                 FROM {source};",
                guard = array_guard(view, bound),
                table = bound.table,
                entity = entity,
                attribute = bound.entid,
                element = element,
                tx = ALLOCATE_TX,
                source = array_source(bound))
    } else {
        format!("    INSERT INTO \"{table}\" (e, a, v_raw, tx)\n    \
                 SELECT {entity}, {attribute}, {value}, {tx}\n    \
                 WHERE {new} IS NOT NULL;",
                table = bound.table,
                entity = entity,
                attribute = bound.entid,
                value = coerce_new(view, bound),
                tx = ALLOCATE_TX,
                new = new_column(bound))
    }
}

/// The change test for an update: coerced incoming value against the
/// projected stored one, NULL-aware.
fn changed_sql(view: &str, bound: &BoundAttribute) -> String {
    if bound.multival {
        // json() normalises spacing; element order still counts as change.
        format!("json({new}) IS NOT {old}", new = new_column(bound), old = old_column(bound))
    } else {
        format!("{value} IS NOT {old}", value = coerce_new(view, bound), old = old_column(bound))
    }
}

fn retract_stanza(bound: &BoundAttribute, condition: Option<&str>) -> String {
    let mut sql = format!("    UPDATE \"{table}\" SET retracted_by = {tx}\n    \
                           WHERE e = OLD.id AND retracted_by IS NULL",
                          table = bound.table,
                          tx = ALLOCATE_TX);
    if let Some(condition) = condition {
        sql.push_str("\n      AND ");
        sql.push_str(condition);
    }
    sql.push(';');
    sql
}

fn update_stanza(view: &str, bound: &BoundAttribute) -> String {
    let changed = changed_sql(view, bound);
    let mut stanza = String::new();
    if bound.multival {
        stanza.push_str(&array_guard(view, bound));
        stanza.push('\n');
    }
    stanza.push_str(&retract_stanza(bound, Some(&changed)));
    stanza.push('\n');
    if bound.multival {
        let element = codec::coercion_expr(bound.value_type, "j.value",
                                           &format!("{}.{}", view, bound.column));
        stanza.push_str(&format!("    INSERT INTO \"{table}\" (e, a, v_raw, tx)\n    \
                                  SELECT OLD.id, {attribute}, {element}, {tx}\n    \
                                  FROM {source}\n    \
                                  WHERE {changed};",
                                 table = bound.table,
                                 attribute = bound.entid,
                                 element = element,
                                 tx = ALLOCATE_TX,
                                 source = array_source(bound),
                                 changed = changed));
    } else {
        stanza.push_str(&format!("    INSERT INTO \"{table}\" (e, a, v_raw, tx)\n    \
                                  SELECT OLD.id, {attribute}, {value}, {tx}\n    \
                                  WHERE {new} IS NOT NULL AND {changed};",
                                 table = bound.table,
                                 attribute = bound.entid,
                                 value = coerce_new(view, bound),
                                 tx = ALLOCATE_TX,
                                 new = new_column(bound),
                                 changed = changed));
    }
    stanza
}

/// The three trigger programs for one target relation (`V` or
/// `V_current`). `view` parameterises the programs with the view's name
/// for abort messages.
pub fn trigger_ddl(view: &str, target: &str, chain: &JoinChain) -> Vec<String> {
    let attributes = chain.attributes();

    // Insert: allocate a fresh entity and a transaction, write one datom
    // per non-null column, then bump both counters.
    let mut insert = format!("CREATE TRIGGER \"{target}_insert\" INSTEAD OF INSERT ON \"{target}\"\n\
                              BEGIN\n{tx}\n",
                             target = target,
                             tx = record_transaction());
    for bound in &attributes {
        insert.push_str(&insert_stanza(view, bound, ALLOCATE_ENTITY));
        insert.push('\n');
    }
    insert.push_str(&bump_partition("user"));
    insert.push('\n');
    insert.push_str(&bump_partition("tx"));
    insert.push_str("\nEND");

    // Update: allocate a transaction, retract and reassert exactly the
    // changed attributes, then bump the tx counter.
    let mut update = format!("CREATE TRIGGER \"{target}_update\" INSTEAD OF UPDATE ON \"{target}\"\n\
                              BEGIN\n{tx}\n",
                             target = target,
                             tx = record_transaction());
    for bound in &attributes {
        update.push_str(&update_stanza(view, bound));
        update.push('\n');
    }
    update.push_str(&bump_partition("tx"));
    update.push_str("\nEND");

    // Delete: retract every current datom of the row's entity for the
    // view's attributes. Attributes outside this view are untouched.
    let mut delete = format!("CREATE TRIGGER \"{target}_delete\" INSTEAD OF DELETE ON \"{target}\"\n\
                              BEGIN\n{tx}\n",
                             target = target,
                             tx = record_transaction());
    for bound in &attributes {
        delete.push_str(&retract_stanza(bound, None));
        delete.push('\n');
    }
    delete.push_str(&bump_partition("tx"));
    delete.push_str("\nEND");

    vec![insert, update, delete]
}
