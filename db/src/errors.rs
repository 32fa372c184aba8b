// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use rusqlite;

pub type Result<T> = ::std::result::Result<T, DbError>;

/// Everything the write path can refuse to do.
///
/// All of these abort the enclosing host transaction; the read path never
/// raises any of them. Host-engine failures pass through unchanged as
/// `Sqlite`, except that coercion aborts raised inside generated trigger
/// programs are recognised by their message and folded into
/// `ValueCoercion`.
#[derive(Debug, Fail)]
pub enum DbError {
    #[fail(display = "no such partition: {}", _0)]
    UnknownPartition(String),

    #[fail(display = "no attribute defined for ident: {}", _0)]
    UnknownAttribute(String),

    #[fail(display = "no such value type: {}", _0)]
    UnknownValueType(String),

    #[fail(display = "no such cardinality: {}", _0)]
    UnknownCardinality(String),

    #[fail(display = "value coercion failed: {}", _0)]
    ValueCoercion(String),

    #[fail(display = "view {} has no required attributes", _0)]
    ViewHasNoRequiredAttributes(String),

    #[fail(display = "attribute already defined: {}", _0)]
    AttributeAlreadyDefined(String),

    #[fail(display = "no view defined with name: {}", _0)]
    UnknownView(String),

    #[fail(display = "not a valid attribute ident: {}", _0)]
    BadIdent(String),

    #[fail(display = "not a valid view name: {}", _0)]
    BadViewName(String),

    #[fail(display = "bad schema assertion: {}", _0)]
    BadSchemaAssertion(String),

    #[fail(display = "SQL error: {}", _0)]
    Sqlite(#[fail(cause)] rusqlite::Error),
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> DbError {
        match e {
            rusqlite::Error::SqliteFailure(_, Some(ref msg)) if msg.starts_with("value coercion") => {
                DbError::ValueCoercion(msg.clone())
            },
            other => DbError::Sqlite(other),
        }
    }
}
