// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Palimpsest is an embedded bitemporal tuplestore. Every fact is an
//! immutable datom `(entity, attribute, value, transaction, retracted_by)`;
//! a SQL-shaped projection of declared views sits on top, and any query can
//! be evaluated as of any past transaction. Schema is data: attribute and
//! view definitions are themselves datoms, so the store describes itself.
//!
//! The [`Store`](store/struct.Store.html) handle owns a SQLite connection
//! and exposes the whole client surface: declaring attributes and views,
//! allocation, queries, and the as-of session context.

extern crate chrono;
extern crate rusqlite;

extern crate palimpsest_core;
extern crate palimpsest_db;
extern crate palimpsest_sql;

pub mod store;

pub use palimpsest_core::{
    Entid,
    TypedValue,
    Unique,
    ValueType,
    counter_of,
    entid_from_parts,
    partition_of,
};

pub use palimpsest_db::{
    DbError,
    KnownAttribute,
    Metadata,
    Result,
    TypedSQLValue,
    ViewDefinition,
    ViewUpdate,
};

pub use store::Store;
