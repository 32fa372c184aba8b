// Copyright 2016 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! A small builder for SQL text aimed at SQLite.
//!
//! The view compiler and the DML translator assemble `CREATE VIEW` and
//! `CREATE TRIGGER` programs out of structural pieces; this crate owns the
//! printing. Identifiers and text literals pass through quoting so that a
//! stored ident can never break out of the statement it is printed into.

extern crate failure;
#[macro_use]
extern crate failure_derive;

/// A complete SQL string ready to hand to the host engine.
pub struct SQLQuery {
    pub sql: String,
}

#[derive(Debug, Fail)]
pub enum BuildQueryError {
    #[fail(display = "invalid identifier: {:?}", _0)]
    InvalidIdentifier(String),
}

pub type BuildQueryResult = Result<(), BuildQueryError>;

/// Gathers SQL text fragment by fragment.
///
/// Implementations are free to target other hosts; only the SQLite printer
/// exists today.
pub trait QueryBuilder {
    /// Push raw SQL text. The caller vouches for it.
    fn push_sql(&mut self, sql: &str);

    /// Push a quoted identifier, rejecting embedded NULs.
    fn push_identifier(&mut self, identifier: &str) -> BuildQueryResult;

    /// Push a single-quoted text literal.
    fn push_text_literal(&mut self, value: &str) -> BuildQueryResult;

    fn finish(self) -> SQLQuery;
}

/// The SQLite printer. Identifiers are double-quoted with `""` escaping,
/// literals single-quoted with `''` escaping.
pub struct SQLiteQueryBuilder {
    pub sql: String,
}

impl SQLiteQueryBuilder {
    pub fn new() -> SQLiteQueryBuilder {
        SQLiteQueryBuilder { sql: String::new() }
    }

    /// Push `sep` between each invocation of `f`, not before the first.
    /// Convenient for comma-separated lists.
    pub fn push_interposed<T, I, F>(&mut self, items: I, sep: &str, mut f: F) -> BuildQueryResult
        where I: IntoIterator<Item = T>,
              F: FnMut(&mut SQLiteQueryBuilder, T) -> BuildQueryResult {
        let mut first = true;
        for item in items {
            if !first {
                self.push_sql(sep);
            }
            first = false;
            f(self, item)?;
        }
        Ok(())
    }
}

impl QueryBuilder for SQLiteQueryBuilder {
    fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn push_identifier(&mut self, identifier: &str) -> BuildQueryResult {
        if identifier.contains('\0') {
            return Err(BuildQueryError::InvalidIdentifier(identifier.to_string()));
        }
        self.sql.push('"');
        self.sql.push_str(&identifier.replace('"', "\"\""));
        self.sql.push('"');
        Ok(())
    }

    fn push_text_literal(&mut self, value: &str) -> BuildQueryResult {
        if value.contains('\0') {
            return Err(BuildQueryError::InvalidIdentifier(value.to_string()));
        }
        self.sql.push('\'');
        self.sql.push_str(&value.replace('\'', "''"));
        self.sql.push('\'');
        Ok(())
    }

    fn finish(self) -> SQLQuery {
        SQLQuery { sql: self.sql }
    }
}
