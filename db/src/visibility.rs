// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Temporal visibility.
//!
//! SQLite has no session variables, so the as-of context lives in the
//! one-row configuration table `as_of_tx(tx)`, created at bootstrap with a
//! NULL row. Generated views read it with a scalar subquery: one read per
//! query, and per-connection scope, which is exactly the session-variable
//! contract. A NULL `tx` means "current".
//!
//! A datom is visible at T iff it was asserted at or before T and not
//! retracted at or before T.

use rusqlite;

use palimpsest_core::Entid;

use errors::Result;

/// The scalar subquery reading the as-of context.
pub const AS_OF_SQL: &'static str = "(SELECT tx FROM as_of_tx)";

fn qualify(alias: Option<&str>, column: &str) -> String {
    match alias {
        Some(a) => format!("{}.{}", a, column),
        None => column.to_string(),
    }
}

/// The current-state filter: the datom has not been retracted.
pub fn current_sql(alias: Option<&str>) -> String {
    format!("{} IS NULL", qualify(alias, "retracted_by"))
}

/// The as-of filter: asserted at or before the as-of point, and either
/// never retracted or retracted after it.
pub fn visible_sql(alias: Option<&str>) -> String {
    let tx = qualify(alias, "tx");
    let retracted_by = qualify(alias, "retracted_by");
    format!("({tx} <= {as_of} AND ({r} IS NULL OR {r} > {as_of}))",
            tx = tx,
            r = retracted_by,
            as_of = AS_OF_SQL)
}

/// The branch filters of the dispatching view. The two are mutually
/// exclusive on the configuration row, so only one branch of the UNION
/// produces rows for any given query.
pub fn dispatch_current_sql() -> String {
    format!("{} IS NULL", AS_OF_SQL)
}

pub fn dispatch_history_sql() -> String {
    format!("{} IS NOT NULL", AS_OF_SQL)
}

pub fn get_as_of(conn: &rusqlite::Connection) -> Result<Option<Entid>> {
    let tx = conn.query_row("SELECT tx FROM as_of_tx", [], |row| row.get(0))?;
    Ok(tx)
}

pub fn set_as_of(conn: &rusqlite::Connection, tx: Option<Entid>) -> Result<()> {
    conn.execute("UPDATE as_of_tx SET tx = ?", [tx])?;
    Ok(())
}
