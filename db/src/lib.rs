// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The storage engine of the palimpsest store: bootstrap, allocation,
//! the attribute registry, the view compiler, the DML translator, and
//! temporal visibility, all on top of an embedded SQLite database.

#[cfg(test)]
extern crate env_logger;
extern crate failure;
#[macro_use]
extern crate failure_derive;
extern crate itertools;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate ordered_float;
extern crate rusqlite;
extern crate tabwriter;

extern crate palimpsest_core;
extern crate palimpsest_sql;

pub mod bootstrap;
mod codec;
pub mod db;
pub mod debug;
pub mod dml;
pub mod entids;
pub mod errors;
mod metadata;
pub mod registry;
mod schema;
pub mod types;
pub mod views;
pub mod visibility;

pub use db::{
    CURRENT_VERSION,
    TypedSQLValue,
    allocate_entity,
    attr_id,
    ensure_initialized,
    new_connection,
    new_transaction,
    read_partition_map,
};

pub use errors::{
    DbError,
    Result,
};

pub use registry::{
    RelationSpec,
    define_attribute,
};

pub use types::{
    AttributeMap,
    KnownAttribute,
    Metadata,
    Partition,
    PartitionMap,
    ViewDefinition,
    ViewMap,
};

pub use views::{
    ViewUpdate,
    define_view,
    delete_view,
    regenerate_view,
    update_view,
};

pub use visibility::{
    get_as_of,
    set_as_of,
};
