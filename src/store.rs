// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The store handle.
//!
//! A `Store` owns one SQLite connection and the metadata materialised from
//! it. One handle is one session: the as-of context set through it scopes
//! to this handle and no other.

use std::path::Path;

use chrono::{
    DateTime,
    Utc,
};
use rusqlite;
use rusqlite::types::ToSql;

use palimpsest_core::{
    Entid,
    PART_USER,
    entid_from_parts,
};
use palimpsest_db::{
    DbError,
    Metadata,
    Result,
    ViewUpdate,
    db,
    registry,
    views,
    visibility,
};
use palimpsest_sql::{
    QueryBuilder,
    SQLiteQueryBuilder,
};

/// A handle to a palimpsest store.
pub struct Store {
    conn: rusqlite::Connection,
    metadata: Metadata,
}

/// Rows come back as plain SQL values; the caller knows the shape of what
/// it asked for.
pub type Row = Vec<rusqlite::types::Value>;

impl Store {
    /// Open the store at `path`, seeding it if it is empty.
    pub fn open<T>(path: T) -> Result<Store> where T: AsRef<Path> {
        let conn = db::new_connection(path).map_err(DbError::Sqlite)?;
        let metadata = db::ensure_initialized(&conn)?;
        Ok(Store {
            conn: conn,
            metadata: metadata,
        })
    }

    /// Open a fresh in-memory store. Each call is its own database.
    pub fn open_in_memory() -> Result<Store> {
        Store::open("")
    }

    /// Raw relational access to the generated views and the fixed
    /// relations.
    pub fn conn(&self) -> &rusqlite::Connection {
        &self.conn
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    // Schema administration.

    /// Declare an attribute and provision its typed child relation.
    pub fn define_attribute(&mut self,
                            ident: &str,
                            value_type: &str,
                            cardinality: &str,
                            unique: Option<&str>,
                            doc: Option<&str>)
                            -> Result<Entid> {
        registry::define_attribute(&self.conn, &mut self.metadata,
                                   ident, value_type, cardinality, unique, doc)
    }

    /// Declare a view over declared attributes and compile its three SQL
    /// views and triggers.
    pub fn define_view(&mut self,
                       name: &str,
                       required: &[&str],
                       optional: &[&str],
                       doc: Option<&str>)
                       -> Result<Entid> {
        let required: Vec<String> = required.iter().map(|s| s.to_string()).collect();
        let optional: Vec<String> = optional.iter().map(|s| s.to_string()).collect();
        views::define_view(&self.conn, &mut self.metadata, name, &required, &optional, doc)
    }

    pub fn update_view(&mut self, name: &str, update: ViewUpdate) -> Result<()> {
        views::update_view(&self.conn, &mut self.metadata, name, update)
    }

    pub fn delete_view(&mut self, name: &str) -> Result<()> {
        views::delete_view(&self.conn, &mut self.metadata, name)
    }

    // Allocation and lookup.

    pub fn allocate_entity(&self, partition: &str) -> Result<Entid> {
        db::allocate_entity(&self.conn, partition)
    }

    pub fn new_transaction(&self) -> Result<Entid> {
        db::new_transaction(&self.conn)
    }

    pub fn attr_id(&self, ident: &str) -> Result<Entid> {
        db::attr_id(&self.conn, ident)
    }

    /// The wall-clock instant recorded for a transaction.
    pub fn transaction_instant(&self, tx: Entid) -> Result<DateTime<Utc>> {
        let instant: String = self.conn
            .query_row("SELECT instant FROM transactions WHERE id = ?", [tx], |row| row.get(0))
            .map_err(DbError::from)?;
        DateTime::parse_from_rfc3339(&instant)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DbError::ValueCoercion(format!("bad transaction instant {:?}: {}", instant, e)))
    }

    // Queries.

    /// Evaluate `sql` against the session's current visibility context.
    pub fn q(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query(params)?;
        let mut out = vec![];
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(row.get::<_, rusqlite::types::Value>(i)?);
            }
            out.push(values);
        }
        Ok(out)
    }

    /// Evaluate `sql` as of the given transaction, or as of "now" when
    /// `tx` is `None`, without disturbing the session's as-of context.
    ///
    /// The context is set inside a savepoint that is rolled back once the
    /// query has run, so the setting is transaction-local even on error.
    pub fn q_as_of(&self, sql: &str, params: &[&dyn ToSql], tx: Option<Entid>) -> Result<Vec<Row>> {
        self.conn.execute_batch("SAVEPOINT q_as_of")?;
        let result = visibility::set_as_of(&self.conn, tx)
            .and_then(|_| self.q(sql, params));
        self.conn.execute_batch("ROLLBACK TO q_as_of; RELEASE q_as_of")?;
        result
    }

    // The session-scoped as-of context.

    pub fn set_as_of(&self, tx: Option<Entid>) -> Result<()> {
        visibility::set_as_of(&self.conn, tx)
    }

    pub fn get_as_of(&self) -> Result<Option<Entid>> {
        visibility::get_as_of(&self.conn)
    }

    /// Run `f` with the as-of context set to `tx`, restoring the previous
    /// context afterwards whether `f` succeeds or fails.
    pub fn with_as_of<T, F>(&self, tx: Entid, f: F) -> Result<T>
        where F: FnOnce(&Store) -> Result<T> {
        let previous = self.get_as_of()?;
        self.set_as_of(Some(tx))?;
        let result = f(self);
        self.set_as_of(previous)?;
        result
    }

    // Row convenience.

    /// Insert one row into a generated view and return the entity id the
    /// DML translator allocated for it.
    pub fn insert_row(&self, view: &str, columns: &[(&str, &dyn ToSql)]) -> Result<Entid> {
        let mut builder = SQLiteQueryBuilder::new();
        builder.push_sql("INSERT INTO ");
        builder.push_identifier(view)
            .map_err(|_| DbError::BadViewName(view.to_string()))?;
        builder.push_sql(" (");
        builder.push_interposed(columns.iter(), ", ", |b, &(name, _)| b.push_identifier(name))
            .map_err(|_| DbError::BadViewName(view.to_string()))?;
        builder.push_sql(") VALUES (");
        let mut first = true;
        for _ in columns {
            if !first {
                builder.push_sql(", ");
            }
            first = false;
            builder.push_sql("?");
        }
        builder.push_sql(")");

        let params: Vec<&dyn ToSql> = columns.iter().map(|&(_, v)| v).collect();
        self.conn.execute(&builder.finish().sql, params.as_slice())?;

        // The insert trigger allocated from `user` and bumped the counter.
        let counter: i64 = self.conn
            .query_row("SELECT next_id - 1 FROM partitions WHERE ident = 'user'", [], |row| row.get(0))
            .map_err(DbError::from)?;
        Ok(entid_from_parts(PART_USER, counter))
    }
}
