// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use std::path::Path;

use itertools::Itertools;
use ordered_float::OrderedFloat;
use rusqlite;

use palimpsest_core::{
    Entid,
    TypedValue,
    ValueType,
    entid_from_parts,
};
use palimpsest_sql::{
    QueryBuilder,
    SQLiteQueryBuilder,
};

use bootstrap;
use errors::{
    DbError,
    Result,
};
use metadata;
use types::{
    Metadata,
    Partition,
    PartitionMap,
};

/// The schema version stamped into `PRAGMA user_version`.
pub const CURRENT_VERSION: i32 = 1;

/// Open a SQLite connection to the given path, or in memory if the path is
/// empty, and apply connection pragmas.
pub fn new_connection<T>(uri: T) -> rusqlite::Result<rusqlite::Connection>
    where T: AsRef<Path> {
    let conn = match uri.as_ref().to_string_lossy().len() {
        0 => rusqlite::Connection::open_in_memory()?,
        _ => rusqlite::Connection::open(uri)?,
    };

    conn.execute_batch("
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ")?;

    Ok(conn)
}

fn schema_version(conn: &rusqlite::Connection) -> Result<i32> {
    let version = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Create the fixed relations and seed the store if this connection points
/// at an empty database, then materialise the metadata either way.
pub fn ensure_initialized(conn: &rusqlite::Connection) -> Result<Metadata> {
    if schema_version(conn)? < CURRENT_VERSION {
        info!("initializing new store");
        conn.execute_batch("BEGIN")?;
        let seeded = create_tables(conn).and_then(|_| bootstrap::bootstrap(conn));
        match seeded {
            Ok(()) => {
                conn.pragma_update(None, "user_version", CURRENT_VERSION)?;
                conn.execute_batch("COMMIT")?;
            },
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e);
            },
        }
    }
    metadata::read_metadata(conn)
}

fn create_tables(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute_batch("
        CREATE TABLE partitions (
            id INTEGER NOT NULL PRIMARY KEY,
            ident TEXT NOT NULL UNIQUE,
            next_id INTEGER NOT NULL
        );
        CREATE TABLE transactions (
            id INTEGER NOT NULL PRIMARY KEY,
            instant TEXT NOT NULL
        );
        CREATE TABLE as_of_tx (tx INTEGER);
    ")?;
    Ok(())
}

/// Mint a fresh entity id from the named partition.
///
/// The counter bump and the read happen in one statement, so concurrent
/// allocators serialise on the partitions row and no id is handed out
/// twice. Counters are not gap-repaired: an aborted transaction wastes the
/// ids it allocated.
pub fn allocate_entity(conn: &rusqlite::Connection, partition: &str) -> Result<Entid> {
    let allocated = conn.query_row(
        "UPDATE partitions SET next_id = next_id + 1 WHERE ident = ? \
         RETURNING (id << 48) | (next_id - 1)",
        [partition],
        |row| row.get(0));
    match allocated {
        Ok(entid) => Ok(entid),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            Err(DbError::UnknownPartition(partition.to_string()))
        },
        Err(e) => Err(e.into()),
    }
}

/// Mint a transaction: an entity in the `tx` partition, recorded with its
/// wall-clock instant.
pub fn new_transaction(conn: &rusqlite::Connection) -> Result<Entid> {
    let tx = allocate_entity(conn, "tx")?;
    conn.execute(
        "INSERT INTO transactions (id, instant) VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        [tx])?;
    Ok(tx)
}

/// Resolve an attribute ident to its entid by way of the `db/ident` datoms.
pub fn attr_id(conn: &rusqlite::Connection, ident: &str) -> Result<Entid> {
    let entid = conn.query_row(
        "SELECT e FROM attr_db_ident WHERE v_typed = ? AND retracted_by IS NULL",
        [ident],
        |row| row.get(0));
    match entid {
        Ok(entid) => Ok(entid),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            Err(DbError::UnknownAttribute(ident.to_string()))
        },
        Err(e) => Err(e.into()),
    }
}

pub fn read_partition_map(conn: &rusqlite::Connection) -> Result<PartitionMap> {
    let mut stmt = conn.prepare("SELECT id, ident, next_id FROM partitions")?;
    let mut map = PartitionMap::new();
    let rows = stmt.query_and_then([], |row| -> Result<Partition> {
        Ok(Partition {
            id: row.get::<_, i64>(0)? as u16,
            ident: row.get(1)?,
            next_id: row.get(2)?,
        })
    })?;
    for partition in rows {
        let partition = partition?;
        map.insert(partition.ident.clone(), partition);
    }
    Ok(map)
}

/// Recreate the parent `datoms` relation as the union of every attribute's
/// child relation. SQLite has no table inheritance, so the parent is a view
/// over the registry of members; insertions always target a child.
pub fn regenerate_datoms_view(conn: &rusqlite::Connection, metadata: &Metadata) -> Result<()> {
    conn.execute("DROP VIEW IF EXISTS datoms", [])?;

    let tables = metadata.attribute_tables();
    if tables.is_empty() {
        return Ok(());
    }

    let mut builder = SQLiteQueryBuilder::new();
    builder.push_sql("CREATE VIEW datoms (e, a, v_raw, tx, retracted_by) AS ");
    builder.push_sql(&tables
        .iter()
        .map(|t| format!("SELECT e, a, v_raw, tx, retracted_by FROM \"{}\"", t))
        .join(" UNION ALL "));
    conn.execute(&builder.finish().sql, [])?;
    Ok(())
}

/// Conversion of raw stored values back into `TypedValue`, the read-path
/// half of the codec.
pub trait TypedSQLValue: Sized {
    fn from_sql_value(value: rusqlite::types::Value, value_type: ValueType) -> Result<Self>;
}

impl TypedSQLValue for TypedValue {
    fn from_sql_value(value: rusqlite::types::Value, value_type: ValueType) -> Result<TypedValue> {
        use rusqlite::types::Value;

        let mismatch = |value: &Value| {
            DbError::ValueCoercion(format!("stored value {:?} does not match {}", value, value_type))
        };

        match (value_type, value) {
            (ValueType::Text, Value::Text(s)) => Ok(TypedValue::Text(s)),
            (ValueType::Int4, Value::Integer(i)) => {
                if i < -2147483648 || i > 2147483647 {
                    return Err(DbError::ValueCoercion(format!("{} out of range for int4", i)));
                }
                Ok(TypedValue::Int4(i as i32))
            },
            (ValueType::Int8, Value::Integer(i)) => Ok(TypedValue::Int8(i)),
            (ValueType::Float4, Value::Real(f)) => Ok(TypedValue::Float4(OrderedFloat(f as f32))),
            (ValueType::Float4, Value::Integer(i)) => Ok(TypedValue::Float4(OrderedFloat(i as f32))),
            (ValueType::Float8, Value::Real(f)) => Ok(TypedValue::Float8(OrderedFloat(f))),
            (ValueType::Float8, Value::Integer(i)) => Ok(TypedValue::Float8(OrderedFloat(i as f64))),
            (ValueType::Numeric, Value::Integer(i)) => Ok(TypedValue::Numeric(i.to_string())),
            (ValueType::Numeric, Value::Real(f)) => Ok(TypedValue::Numeric(f.to_string())),
            (ValueType::Numeric, Value::Text(s)) => Ok(TypedValue::Numeric(s)),
            (ValueType::Boolean, Value::Integer(i)) => Ok(TypedValue::Boolean(i != 0)),
            (ValueType::Bytes, Value::Blob(b)) => Ok(TypedValue::Bytes(b)),
            (ValueType::Ref, Value::Integer(i)) => Ok(TypedValue::Ref(i)),
            (vt @ ValueType::Instant, Value::Text(ref s))
            | (vt @ ValueType::Date, Value::Text(ref s))
            | (vt @ ValueType::Uuid, Value::Text(ref s))
            | (vt @ ValueType::Json, Value::Text(ref s)) => {
                TypedValue::from_canonical_string(vt, s)
                    .map_err(|e| DbError::ValueCoercion(e.to_string()))
            },
            (_, ref v) => Err(mismatch(v)),
        }
    }
}

/// The first id allocated from a partition, relative to its bootstrap
/// counter. Exposed for tests and for clients reasoning about id layout.
pub fn first_entid_of(partition_id: u16) -> Entid {
    entid_from_parts(partition_id, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use palimpsest_core::{
        PART_TX,
        PART_USER,
        counter_of,
        partition_of,
    };

    fn open_seeded() -> (rusqlite::Connection, Metadata) {
        let _ = ::env_logger::try_init();
        let conn = new_connection("").expect("connection");
        let metadata = ensure_initialized(&conn).expect("initialized");
        (conn, metadata)
    }

    #[test]
    fn test_bootstrap_partitions() {
        let (conn, _) = open_seeded();
        let partitions = read_partition_map(&conn).expect("partitions");
        let idents: Vec<&str> = partitions.keys().map(|s| s.as_str()).collect();
        assert_eq!(idents, vec!["db", "tx", "user"]);
        assert_eq!(partitions["db"].next_id, 300);
        assert_eq!(partitions["tx"].next_id, 1);
        assert_eq!(partitions["user"].next_id, 1);
    }

    #[test]
    fn test_allocation_is_monotonic_and_partitioned() {
        let (conn, _) = open_seeded();
        let first = allocate_entity(&conn, "user").expect("entid");
        let second = allocate_entity(&conn, "user").expect("entid");
        assert_eq!(first, first_entid_of(PART_USER));
        assert_eq!(partition_of(first), PART_USER);
        assert_eq!(counter_of(first), 1);
        assert_eq!(second, first + 1);
    }

    #[test]
    fn test_unknown_partition() {
        let (conn, _) = open_seeded();
        match allocate_entity(&conn, "nope") {
            Err(DbError::UnknownPartition(ref p)) => assert_eq!(p, "nope"),
            x => panic!("expected UnknownPartition, got {:?}", x),
        }
    }

    #[test]
    fn test_transactions_are_recorded_in_order() {
        let (conn, _) = open_seeded();
        let t1 = new_transaction(&conn).expect("tx");
        let t2 = new_transaction(&conn).expect("tx");
        assert_eq!(t1, first_entid_of(PART_TX));
        assert!(t2 > t1);

        let instants: Vec<String> = {
            let mut stmt = conn.prepare("SELECT instant FROM transactions ORDER BY id").expect("prepare");
            let rows = stmt.query_map([], |row| row.get(0)).expect("rows");
            rows.collect::<rusqlite::Result<Vec<String>>>().expect("instants")
        };
        // Bootstrap transaction 0 plus the two we allocated.
        assert_eq!(instants.len(), 3);
        let mut sorted = instants.clone();
        sorted.sort();
        assert_eq!(instants, sorted);
    }

    #[test]
    fn test_attr_id_resolves_bootstrap_idents() {
        let (conn, _) = open_seeded();
        assert_eq!(attr_id(&conn, "db/ident").expect("db/ident"), 1);
        assert_eq!(attr_id(&conn, "db.type/ref").expect("db.type/ref"), 112);
        assert_eq!(attr_id(&conn, "db.cardinality/many").expect("many"), 201);
        match attr_id(&conn, "nope/nope") {
            Err(DbError::UnknownAttribute(_)) => {},
            x => panic!("expected UnknownAttribute, got {:?}", x),
        }
    }

    #[test]
    fn test_typed_sql_value_round_trip() {
        let v = TypedValue::from_sql_value(rusqlite::types::Value::Integer(1), ValueType::Boolean)
            .expect("bool");
        assert_eq!(v, TypedValue::Boolean(true));
        assert!(TypedValue::from_sql_value(rusqlite::types::Value::Text("x".into()), ValueType::Int8).is_err());
    }
}
