// Copyright 2016 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

#![allow(dead_code)]

/// Low-level functions for testing.

use std::io::{
    Write,
};

use rusqlite;
use rusqlite::types::ToSql;
use tabwriter::TabWriter;

use bootstrap;
use db::TypedSQLValue;
use errors::Result;
use types::{
    Entid,
    Metadata,
    TypedValue,
};

/// Represents a *datom* (assertion) in the store.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub struct Datom {
    pub e: Entid,
    pub a: Entid,
    pub v: TypedValue,
    pub tx: Entid,
    pub retracted_by: Option<Entid>,
}

/// Represents a set of datoms (assertions) in the store.
///
/// To make comparison easier, we deterministically order by the ascending
/// tuple ordering determined by `(e, a, v, tx)`.
pub struct Datoms(pub Vec<Datom>);

impl Datoms {
    pub fn new(mut datoms: Vec<Datom>) -> Datoms {
        datoms.sort_unstable();
        Datoms(datoms)
    }
}

/// Return the set of datoms in the store with transaction id strictly
/// greater than the given `tx`, ordered by `(e, a, v, tx)`.
///
/// Reads the child relations directly rather than the union view so the
/// typed value can be decoded with its attribute's logical type.
pub fn datoms_after(conn: &rusqlite::Connection, metadata: &Metadata, tx: Entid) -> Result<Datoms> {
    let mut datoms = vec![];
    for known in metadata.attributes.values() {
        let mut stmt = conn.prepare(&format!(
            "SELECT e, a, v_raw, tx, retracted_by FROM \"{}\" WHERE tx > ?", known.table))?;
        let rows = stmt.query_and_then([tx], |row| -> Result<Datom> {
            let v: rusqlite::types::Value = row.get(2)?;
            Ok(Datom {
                e: row.get(0)?,
                a: row.get(1)?,
                v: TypedValue::from_sql_value(v, known.attribute.value_type)?,
                tx: row.get(3)?,
                retracted_by: row.get(4)?,
            })
        })?;
        for datom in rows {
            datoms.push(datom?);
        }
    }
    Ok(Datoms::new(datoms))
}

/// Return the set of datoms in the store, not including the bootstrap
/// datoms of transaction 0.
pub fn datoms(conn: &rusqlite::Connection, metadata: &Metadata) -> Result<Datoms> {
    datoms_after(conn, metadata, bootstrap::TX0)
}

/// Execute the given `sql` query with the given `params` and format the
/// results as a tab-and-newline formatted string suitable for debug
/// printing.
///
/// The query is printed followed by a newline, then the returned columns
/// followed by a newline, and then the data rows and columns.  All columns
/// are aligned.
pub fn dump_sql_query(conn: &rusqlite::Connection, sql: &str, params: &[&dyn ToSql]) -> Result<String> {
    let mut stmt: rusqlite::Statement = conn.prepare(sql)?;

    let mut tw = TabWriter::new(Vec::new()).padding(2);
    write!(&mut tw, "{}\n", sql).unwrap();

    let column_count = stmt.column_count();
    let column_names: Vec<String> = stmt.column_names().into_iter().map(|c| c.to_string()).collect();
    for column_name in column_names {
        write!(&mut tw, "{}\t", column_name).unwrap();
    }
    write!(&mut tw, "\n").unwrap();

    let r: Result<Vec<_>> = stmt.query_and_then(params, |row| -> Result<()> {
        for i in 0..column_count {
            let value: rusqlite::types::Value = row.get(i)?;
            write!(&mut tw, "{:?}\t", value).unwrap();
        }
        write!(&mut tw, "\n").unwrap();
        Ok(())
    })?.collect();
    r?;

    let dump = String::from_utf8(tw.into_inner().unwrap()).unwrap();
    Ok(dump)
}
