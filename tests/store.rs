// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

extern crate env_logger;
extern crate palimpsest;
extern crate rusqlite;
extern crate serde_json;
extern crate uuid;

use rusqlite::types::Value;

use palimpsest::{
    DbError,
    Entid,
    Store,
    entid_from_parts,
};

fn open() -> Store {
    let _ = env_logger::try_init();
    Store::open_in_memory().expect("in-memory store")
}

fn open_with_persons() -> Store {
    let mut store = open();
    store.define_attribute("person/name", "text", "one", None, None).expect("person/name");
    store.define_attribute("person/email", "text", "one", Some("identity"), None)
        .expect("person/email");
    store.define_view("persons", &["person/name", "person/email"], &[], Some("people we know"))
        .expect("persons");
    store
}

/// The id of the most recently allocated transaction.
fn latest_tx(store: &Store) -> Entid {
    let rows = store
        .q("SELECT id FROM transactions ORDER BY id DESC LIMIT 1", &[])
        .expect("latest tx");
    match rows[0][0] {
        Value::Integer(tx) => tx,
        ref v => panic!("expected integer tx, got {:?}", v),
    }
}

fn text(row: &[Value]) -> &str {
    match row[0] {
        Value::Text(ref s) => s,
        ref v => panic!("expected text, got {:?}", v),
    }
}

fn count(store: &Store, sql: &str) -> i64 {
    match store.q(sql, &[]).expect(sql)[0][0] {
        Value::Integer(n) => n,
        ref v => panic!("expected integer count, got {:?}", v),
    }
}

// Scenario: bootstrap inspection.

#[test]
fn test_bootstrap_inspection() {
    let store = open();

    assert_eq!(store.attr_id("db/ident").expect("db/ident"), 1);
    assert_eq!(store.attr_id("db.type/ref").expect("db.type/ref"), 112);
    assert_eq!(store.attr_id("db.cardinality/many").expect("many"), 201);

    let partitions = store
        .q("SELECT ident FROM partitions ORDER BY id", &[])
        .expect("partitions");
    let idents: Vec<&str> = partitions.iter().map(|row| text(row)).collect();
    assert_eq!(idents, vec!["db", "tx", "user"]);

    // Transaction 0 exists and carries all system datoms.
    assert_eq!(count(&store, "SELECT COUNT(*) FROM transactions WHERE id = 0"), 1);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM datoms WHERE tx > 0"), 0);
}

#[test]
fn test_allocator_boundaries() {
    let store = open();
    assert_eq!(store.allocate_entity("user").expect("entity"), entid_from_parts(2, 1));
    assert_eq!(store.new_transaction().expect("tx"), entid_from_parts(1, 1));
    match store.allocate_entity("scratch") {
        Err(DbError::UnknownPartition(ref p)) => assert_eq!(p, "scratch"),
        x => panic!("expected UnknownPartition, got {:?}", x),
    }
}

// Scenario: define attribute and view.

#[test]
fn test_define_attribute_and_view() {
    let store = open_with_persons();

    assert_eq!(count(&store, "SELECT COUNT(*) FROM persons"), 0);

    // The generated child relation exists and projects a stored typed
    // column over the raw value.
    let ddl = store
        .q("SELECT sql FROM sqlite_master WHERE name = 'attr_person_name'", &[])
        .expect("ddl");
    let ddl = text(&ddl[0]);
    assert!(ddl.contains("v_typed TEXT GENERATED ALWAYS AS (v_raw) STORED"), "{}", ddl);
    assert!(ddl.contains("CHECK (a = "), "{}", ddl);

    // Introspection sees both the attributes and the view.
    assert_eq!(count(&store,
                     "SELECT COUNT(*) FROM defined_attributes WHERE ident LIKE 'person/%'"),
               2);
    let defined = store
        .q("SELECT required_attributes FROM defined_views WHERE name = 'persons'", &[])
        .expect("defined_views");
    assert_eq!(text(&defined[0]), "[\"person/email\",\"person/name\"]");
}

// Scenario: insert, update, as-of.

#[test]
fn test_insert_update_as_of() {
    let store = open_with_persons();

    let alice = store
        .insert_row("persons", &[("name", &"Alice"), ("email", &"a@x")])
        .expect("insert");
    let t1 = latest_tx(&store);

    store.conn()
        .execute("UPDATE persons SET name = 'Alicia' WHERE id = ?", [alice])
        .expect("update");
    let t2 = latest_tx(&store);
    assert!(t2 > t1);

    let current = store.q("SELECT name FROM persons", &[]).expect("current");
    assert_eq!(text(&current[0]), "Alicia");

    let at_t1 = store.q_as_of("SELECT name FROM persons", &[], Some(t1)).expect("as of t1");
    assert_eq!(text(&at_t1[0]), "Alice");

    let at_t2 = store.q_as_of("SELECT name FROM persons", &[], Some(t2)).expect("as of t2");
    assert_eq!(text(&at_t2[0]), "Alicia");

    // The email attribute was untouched by the update.
    assert_eq!(count(&store, "SELECT COUNT(*) FROM attr_person_email"), 1);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM attr_person_name"), 2);
}

#[test]
fn test_value_unchanged_update_writes_no_datom() {
    let store = open_with_persons();
    store.insert_row("persons", &[("name", &"Alice"), ("email", &"a@x")]).expect("insert");

    store.conn()
        .execute("UPDATE persons SET name = 'Alice', email = 'a@x'", [])
        .expect("no-op update");

    assert_eq!(count(&store, "SELECT COUNT(*) FROM attr_person_name"), 1);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM attr_person_email"), 1);
    assert_eq!(count(&store,
                     "SELECT COUNT(*) FROM attr_person_name WHERE retracted_by IS NOT NULL"),
               0);
}

// Scenario: delete preserves history.

#[test]
fn test_delete_preserves_history() {
    let store = open_with_persons();
    let alice = store
        .insert_row("persons", &[("name", &"Alice"), ("email", &"a@x")])
        .expect("insert");
    let t2 = latest_tx(&store);

    store.conn()
        .execute("DELETE FROM persons WHERE id = ?", [alice])
        .expect("delete");

    assert_eq!(count(&store, "SELECT COUNT(*) FROM persons"), 0);

    let historical = store
        .q_as_of("SELECT COUNT(*) FROM persons", &[], Some(t2))
        .expect("as of t2");
    assert_eq!(historical[0][0], Value::Integer(1));

    // The datoms are retracted, not deleted.
    assert_eq!(count(&store, "SELECT COUNT(*) FROM attr_person_name"), 1);
    assert_eq!(count(&store,
                     "SELECT COUNT(*) FROM attr_person_name WHERE retracted_by IS NOT NULL"),
               1);

    // Deleting again touches nothing: the row is already invisible.
    store.conn().execute("DELETE FROM persons WHERE id = ?", [alice]).expect("idempotent");
    assert_eq!(count(&store,
                     "SELECT COUNT(*) FROM attr_person_name WHERE retracted_by IS NOT NULL"),
               1);
}

// Scenario: cardinality many.

#[test]
fn test_cardinality_many_folds_to_array() {
    let mut store = open();
    store.define_attribute("person/name", "text", "one", None, None).expect("person/name");
    store.define_attribute("person/tag", "text", "many", None, None).expect("person/tag");
    store.define_view("tagged_persons", &["person/name", "person/tag"], &[], None)
        .expect("tagged_persons");

    store.insert_row("tagged_persons", &[("name", &"Bob"), ("tag", &"[\"t1\",\"t2\"]")])
        .expect("insert");

    assert_eq!(count(&store, "SELECT COUNT(*) FROM attr_person_tag"), 2);

    let rows = store.q("SELECT tag FROM tagged_persons", &[]).expect("rows");
    assert_eq!(rows.len(), 1);
    let tags: Vec<String> = serde_json::from_str(text(&rows[0])).expect("json array");
    let mut sorted = tags.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["t1", "t2"]);
}

#[test]
fn test_optional_attributes_join_left() {
    let mut store = open();
    store.define_attribute("person/name", "text", "one", None, None).expect("person/name");
    store.define_attribute("person/nick", "text", "one", None, None).expect("person/nick");
    store.define_view("persons", &["person/name"], &["person/nick"], None).expect("view");

    store.insert_row("persons", &[("name", &"Carol"), ("nick", &Option::<String>::None)])
        .expect("insert");

    // A null optional column produces no datom at all.
    assert_eq!(count(&store, "SELECT COUNT(*) FROM attr_person_nick"), 0);

    let rows = store.q("SELECT name, nick FROM persons", &[]).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], Value::Null);

    // Setting the optional later asserts its first datom.
    store.conn().execute("UPDATE persons SET nick = 'Caz'", []).expect("update");
    assert_eq!(count(&store, "SELECT COUNT(*) FROM attr_person_nick"), 1);
}

// Scenario: concurrent as-of queries.

#[test]
fn test_as_of_queries_do_not_disturb_the_session() {
    let store = open_with_persons();
    store.insert_row("persons", &[("name", &"Alice"), ("email", &"a@x")]).expect("insert");
    let t1 = latest_tx(&store);
    store.conn().execute("UPDATE persons SET name = 'Alicia'", []).expect("update");
    let t2 = latest_tx(&store);

    // Interleaved as-of queries with different visibility points each see
    // their own state.
    for _ in 0..3 {
        let a = store.q_as_of("SELECT name FROM persons", &[], Some(t1)).expect("t1");
        let b = store.q_as_of("SELECT name FROM persons", &[], Some(t2)).expect("t2");
        assert_eq!(text(&a[0]), "Alice");
        assert_eq!(text(&b[0]), "Alicia");
    }

    // The session context is untouched.
    assert_eq!(store.get_as_of().expect("as of"), None);
    let current = store.q("SELECT name FROM persons", &[]).expect("current");
    assert_eq!(text(&current[0]), "Alicia");
}

#[test]
fn test_with_as_of_restores_on_both_paths() {
    let store = open_with_persons();
    store.insert_row("persons", &[("name", &"Alice"), ("email", &"a@x")]).expect("insert");
    let t1 = latest_tx(&store);

    let seen = store.with_as_of(t1, |store| {
        assert_eq!(store.get_as_of().expect("inner as of"), Some(t1));
        Ok(store.q("SELECT name FROM persons", &[])?.len())
    }).expect("with_as_of");
    assert_eq!(seen, 1);
    assert_eq!(store.get_as_of().expect("as of"), None);

    let failed: palimpsest::Result<()> = store.with_as_of(t1, |_| {
        Err(DbError::UnknownView("nope".to_string()))
    });
    assert!(failed.is_err());
    assert_eq!(store.get_as_of().expect("as of"), None);
}

#[test]
fn test_set_as_of_scopes_the_whole_session() {
    let store = open_with_persons();
    store.insert_row("persons", &[("name", &"Alice"), ("email", &"a@x")]).expect("insert");
    let t1 = latest_tx(&store);
    store.conn().execute("DELETE FROM persons", []).expect("delete");

    store.set_as_of(Some(t1)).expect("set");
    assert_eq!(count(&store, "SELECT COUNT(*) FROM persons"), 1);
    store.set_as_of(None).expect("unset");
    assert_eq!(count(&store, "SELECT COUNT(*) FROM persons"), 0);
}

// Round trips through the value codec.

#[test]
fn test_typed_round_trips() {
    let mut store = open();
    store.define_attribute("sample/count", "int8", "one", None, None).expect("int8");
    store.define_attribute("sample/flag", "bool", "one", None, None).expect("bool");
    store.define_attribute("sample/seen", "timestamptz", "one", None, None).expect("ts");
    store.define_attribute("sample/key", "uuid", "one", None, None).expect("uuid");
    store.define_attribute("sample/blob", "jsonb", "one", None, None).expect("jsonb");
    store.define_view("samples",
                      &["sample/count", "sample/flag", "sample/seen", "sample/key", "sample/blob"],
                      &[], None)
        .expect("samples");

    let key = uuid::Uuid::new_v4().hyphenated().to_string();
    store.insert_row("samples", &[
        ("count", &42i64),
        ("flag", &"true"),
        ("seen", &"2018-04-01T12:00:00+02:00"),
        ("key", &key.to_uppercase()),
        ("blob", &"{ \"a\" : [1, 2] }"),
    ]).expect("insert");

    let rows = store
        .q("SELECT count, flag, seen, key, blob FROM samples", &[])
        .expect("rows");
    assert_eq!(rows[0][0], Value::Integer(42));
    assert_eq!(rows[0][1], Value::Integer(1));
    // The instant is normalised to UTC milliseconds.
    assert_eq!(rows[0][2], Value::Text("2018-04-01T10:00:00.000Z".to_string()));
    // The uuid is normalised to lowercase.
    assert_eq!(rows[0][3], Value::Text(key));
    // The json is normalised to its minimal form.
    assert_eq!(rows[0][4], Value::Text("{\"a\":[1,2]}".to_string()));
}

#[test]
fn test_value_coercion_aborts_the_write() {
    let mut store = open();
    store.define_attribute("sample/count", "int8", "one", None, None).expect("int8");
    store.define_view("samples", &["sample/count"], &[], None).expect("samples");

    let result = store.insert_row("samples", &[("count", &"twelve")]);
    match result {
        Err(DbError::ValueCoercion(ref m)) => assert!(m.contains("samples.count")),
        x => panic!("expected ValueCoercion, got {:?}", x),
    }
    // The abort rolled back the whole row write, transaction included.
    assert_eq!(count(&store, "SELECT COUNT(*) FROM samples"), 0);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM attr_sample_count"), 0);
}

// Facts about transactions are ordinary datoms.

#[test]
fn test_transaction_entities_can_carry_facts() {
    let mut store = open();
    store.define_attribute("audit/reason", "text", "one", None, None).expect("audit/reason");
    store.define_attribute("person/name", "text", "one", None, None).expect("person/name");
    store.define_view("persons", &["person/name"], &[], None).expect("persons");

    store.insert_row("persons", &[("name", &"Alice")]).expect("insert");
    let t1 = latest_tx(&store);

    // Record why t1 happened, as a datom about the transaction entity.
    let reason_attr = store.attr_id("audit/reason").expect("attr");
    let t2 = store.new_transaction().expect("tx");
    store.conn()
        .execute("INSERT INTO attr_audit_reason (e, a, v_raw, tx) VALUES (?, ?, 'import', ?)",
                 [t1, reason_attr, t2])
        .expect("fact about tx");

    let rows = store
        .q("SELECT v_typed FROM attr_audit_reason WHERE e = ? AND retracted_by IS NULL", &[&t1])
        .expect("rows");
    assert_eq!(text(&rows[0]), "import");

    let instant = store.transaction_instant(t1).expect("instant");
    assert!(instant.timestamp() > 0);
}

#[test]
fn test_view_lifecycle_updates_generated_sql() {
    let mut store = open_with_persons();
    store.define_attribute("person/nick", "text", "one", None, None).expect("nick");

    store.update_view("persons", palimpsest::ViewUpdate {
        optional: Some(vec!["person/nick".to_string()]),
        ..Default::default()
    }).expect("updated");

    // The recompiled view projects the new optional column.
    let rows = store.q("SELECT id, email, name, nick FROM persons", &[]).expect("rows");
    assert!(rows.is_empty());

    store.delete_view("persons").expect("deleted");
    assert!(store.q("SELECT * FROM persons", &[]).is_err());
    match store.delete_view("persons") {
        Err(DbError::UnknownView(_)) => {},
        x => panic!("expected UnknownView, got {:?}", x),
    }
}
